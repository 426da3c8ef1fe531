//! The statistics report printed after a replay.

use std::{
    fmt::{self, Display},
    io,
    path::Path,
};

use log::debug;
use serde::Serialize;
use walkdir::WalkDir;

use crate::{
    replay::OperationStats,
    store::{EngineProperty, KeyValueStore, StoreError, NUM_LEVELS},
    summary::group_thousands,
};

const REPORT_WIDTH: usize = 100;

/// One engine property the engine reported.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PropertyValue {
    /// The property.
    pub property: EngineProperty,
    /// Its value, as the engine rendered it.
    pub value: String,
}

/// Everything known about a store after a replay.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StatsReport {
    /// The properties the engine exposes, in report order.
    pub properties: Vec<PropertyValue>,
    /// Bytes used by the store directory, if the store lives on disk.
    pub disk_size_bytes: Option<u64>,
    /// Number of keys in the store.
    pub key_count: u64,
    /// Totals of the replay that filled the store.
    pub replay: OperationStats,
}

impl StatsReport {
    /// Queries `store` for every reportable property.
    pub fn collect<S>(store: &S, replay: OperationStats) -> Result<Self, StoreError>
    where
        S: KeyValueStore + ?Sized,
    {
        let properties = EngineProperty::report_set()
            .into_iter()
            .filter_map(|property| {
                store
                    .property(property)
                    .map(|value| PropertyValue { property, value })
            })
            .collect();

        let disk_size_bytes = store.path().and_then(|path| match dir_size(path) {
            Ok(size) => Some(size),
            Err(e) => {
                debug!("Could not size {:?}: {}", path, e);
                None
            }
        });

        Ok(Self {
            properties,
            disk_size_bytes,
            key_count: store.key_count()?,
            replay,
        })
    }

    /// The value of a property, if the engine reported it.
    pub fn property(&self, property: EngineProperty) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.property == property)
            .map(|p| p.value.as_str())
    }
}

fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{}", "-".repeat(REPORT_WIDTH))?;
    writeln!(f, "\n{title}:")?;
    writeln!(f, "{}", "-".repeat(REPORT_WIDTH))
}

/// Total size of the regular files below `path`.
pub fn dir_size<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    let mut size = 0;
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file() {
            size += entry.metadata()?.len();
        }
    }

    Ok(size)
}

impl Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(REPORT_WIDTH))?;
        writeln!(f, "Storage Engine Internal Statistics")?;
        writeln!(f, "{}", "=".repeat(REPORT_WIDTH))?;
        if let Some(stats) = self.property(EngineProperty::Stats) {
            writeln!(f, "{stats}")?;
        }

        section(f, "SSTable Statistics")?;
        if let Some(sstables) = self.property(EngineProperty::SsTables) {
            writeln!(f, "{sstables}")?;
        }

        section(f, "Files Per Level")?;
        for level in 0..NUM_LEVELS {
            if let Some(files) = self.property(EngineProperty::FilesAtLevel(level)) {
                writeln!(f, "Level {level}: {files}")?;
            }
        }

        section(f, "Memory Usage")?;
        if let Some(cache) = self.property(EngineProperty::BlockCacheUsage) {
            writeln!(f, "Block Cache: {cache}")?;
        }
        if let Some(mem) = self.property(EngineProperty::ApproximateMemoryUsage) {
            writeln!(f, "Approximate Memory Usage: {mem} bytes")?;
        }

        section(f, "I/O Statistics")?;
        if let Some(io) = self.property(EngineProperty::IoStats) {
            writeln!(f, "{io}")?;
        }

        section(f, "Compaction Statistics")?;
        if let Some(count) = self.property(EngineProperty::CompactionCount) {
            writeln!(f, "Compaction Count: {count}")?;
        }
        if let Some(amp) = self.property(EngineProperty::WriteAmplification) {
            writeln!(f, "Write Amplification: {amp}")?;
        }

        writeln!(f, "{}", "=".repeat(REPORT_WIDTH))?;
        writeln!(f, "Storage Information")?;
        writeln!(f, "{}", "=".repeat(REPORT_WIDTH))?;
        if let Some(size) = self.disk_size_bytes {
            writeln!(
                f,
                "Database Size on Disk: {} bytes ({:.2} MB)",
                size,
                size as f64 / (1024.0 * 1024.0)
            )?;
        }
        writeln!(f, "Total Keys in Database: {}", self.key_count)?;

        writeln!(f, "\nSize Per Level:")?;
        for level in 0..NUM_LEVELS {
            match self.property(EngineProperty::SizeBytesAtLevel(level)) {
                Some(size) if !size.is_empty() && size != "0" => {
                    writeln!(f, "  Level {level}: {size} bytes")?;
                }
                _ => (),
            }
        }

        let r = &self.replay;
        writeln!(f, "{}", "=".repeat(REPORT_WIDTH))?;
        writeln!(f, "Replay Statistics")?;
        writeln!(f, "{}", "=".repeat(REPORT_WIDTH))?;
        writeln!(f, "Total Operations: {}", group_thousands(r.total_ops))?;
        writeln!(
            f,
            "GET: {}  PUT: {}  DELETE: {}",
            group_thousands(r.get_ops),
            group_thousands(r.put_ops),
            group_thousands(r.delete_ops)
        )?;
        writeln!(f, "Bytes Written: {}", group_thousands(r.bytes_written))?;
        writeln!(f, "Bytes Read: {}", group_thousands(r.bytes_read))?;
        write!(f, "Skipped: {}", group_thousands(r.skipped.total()))
    }
}
