use std::{
    ffi::OsString,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use kv_trace::{oplog::OperationLogWriter, record::OperationRecord};

/// Removes a store directory so that it is recreated empty.
///
/// Returns whether anything was removed.
pub fn clean_store_dir(path: &Path) -> anyhow::Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    std::fs::remove_dir_all(path)
        .with_context(|| format!("Failed to clean store directory {:?}", path))?;
    tracing::info!("Removed existing store at {}", path.display());

    Ok(true)
}

/// The path of `<prefix>_<file name of log>`, placed in `out_dir` if given and
/// next to the log otherwise.
pub fn prefixed_log_path(
    log: &Path,
    prefix: &str,
    out_dir: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let file_name = log
        .file_name()
        .ok_or_else(|| anyhow!("{:?} does not name a file", log))?;

    let mut name = OsString::from(format!("{prefix}_"));
    name.push(file_name);

    let dir = out_dir
        .or_else(|| log.parent())
        .unwrap_or_else(|| Path::new(""));
    Ok(dir.join(name))
}

/// Writes a fresh log holding `records`, replacing any existing file.
pub fn write_log<'a, I>(path: &Path, records: I) -> anyhow::Result<usize>
where
    I: IntoIterator<Item = &'a OperationRecord>,
{
    let file =
        File::create(path).with_context(|| format!("Failed to create log {:?}", path))?;
    let mut writer = OperationLogWriter::new(BufWriter::new(file))?;
    writer.append_all(records)?;

    let rows = writer.rows_written();
    writer
        .finish()
        .with_context(|| format!("Failed to flush log {:?}", path))?;

    Ok(rows)
}
