use std::path::PathBuf;

use clap::{Parser, ValueHint};

/// Splits an operation log into its account-trie records (`MPT_<log>`) and
/// the leaf-only subset of them (`baseline_<log>`), then prints a summary.
#[derive(Parser)]
#[command(version = kv_tools::version())]
pub(crate) struct Cli {
    /// Path to the operation log.
    #[arg(long, env = "KV_EXTRACT_CSV", value_hint = ValueHint::FilePath)]
    pub(crate) csv: PathBuf,

    /// Directory to write the derived logs to. Defaults to the log's
    /// directory.
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub(crate) out_dir: Option<PathBuf>,

    /// Also decode and list the accounts held by the leaves.
    #[arg(long)]
    pub(crate) accounts: bool,

    /// Number of accounts to list with `--accounts`.
    #[arg(long, default_value_t = 20)]
    pub(crate) limit: usize,
}
