use std::path::PathBuf;

use clap::{Parser, ValueHint};

/// Flags the Go style normalization applies to.
pub(crate) const LONG_FLAGS: &[&str] = &["csv", "db", "clean", "json"];

/// Replays an operation log against a fresh RocksDB store and prints the
/// engine's statistics.
///
/// Usage:
///
/// `kv_replay -csv baseline_leveldb_operations.csv -db ./test_db -clean`
#[derive(Debug, Parser)]
#[command(version = kv_tools::version())]
pub(crate) struct Cli {
    /// Path to the operation log to replay.
    #[arg(long, env = "KV_REPLAY_CSV", value_hint = ValueHint::FilePath)]
    pub(crate) csv: PathBuf,

    /// Path to the store directory. Created if it does not exist.
    #[arg(long, env = "KV_REPLAY_DB", value_hint = ValueHint::DirPath)]
    pub(crate) db: PathBuf,

    /// Delete the existing store before replaying.
    #[arg(long)]
    pub(crate) clean: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}
