//! Shared plumbing for the `kv_replay` and `kv_extract` binaries.

pub mod args;
pub mod fs;
pub mod tracing;

/// Common information for the `--version` CLI flags.
pub fn version() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
