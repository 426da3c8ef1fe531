use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use kv_tools::{args::normalize_go_style_flags, fs::clean_store_dir};
use kv_trace::{
    oplog::read_log_rows, replay::replay_rows, report::StatsReport, store::RocksStore,
};
use tracing::info;

use self::kv_replay::*;
mod kv_replay {
    pub mod cli;
}

fn main() -> Result<()> {
    dotenv().ok();
    kv_tools::tracing::init();

    let args = cli::Cli::parse_from(normalize_go_style_flags(
        std::env::args_os(),
        cli::LONG_FLAGS,
    ));
    let report = run(&args)?;

    match args.json {
        true => println!("{}", serde_json::to_string_pretty(&report)?),
        false => println!("{report}"),
    }

    Ok(())
}

/// Replays the log into the store and collects the report.
fn run(args: &cli::Cli) -> Result<StatsReport> {
    if args.clean {
        clean_store_dir(&args.db)?;
    }

    let store = RocksStore::open(&args.db)
        .with_context(|| format!("Error opening store at {:?}", args.db))?;
    let rows = read_log_rows(&args.csv).context("Error reading operation log")?;
    info!("Replaying {} rows from {:?}", rows.len(), args.csv);

    let stats = replay_rows(&store, &rows);
    StatsReport::collect(&store, stats).context("Error collecting store statistics")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{cli::Cli, run};

    fn args(csv: &str, dir: &std::path::Path, clean: bool) -> Cli {
        Cli {
            csv: dir.join(csv),
            db: dir.join("db"),
            clean,
            json: false,
        }
    }

    #[test]
    fn unreadable_logs_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&args("absent.csv", dir.path(), false)).is_err());

        fs::write(
            dir.path().join("empty.csv"),
            "Operation,KeyHex,ValueHex,KeySize,ValueSize,Type\n",
        )
        .unwrap();
        assert!(run(&args("empty.csv", dir.path(), false)).is_err());
    }

    #[test]
    fn replays_into_a_cleaned_store() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("ops.csv"),
            "Operation,KeyHex,ValueHex,KeySize,ValueSize,Type\n\
             PUT,4101,aa,2,1,PATH_ACCOUNT_TRIE\n\
             GET,4101,aa,2,1,PATH_ACCOUNT_TRIE\n",
        )
        .unwrap();

        let report = run(&args("ops.csv", dir.path(), true)).unwrap();
        assert_eq!(report.key_count, 1);
        assert_eq!(report.replay.put_ops, 1);
        assert_eq!(report.replay.bytes_read, 1);

        // Cleaning again starts from an empty store.
        let report = run(&args("ops.csv", dir.path(), true)).unwrap();
        assert_eq!(report.key_count, 1);
        assert_eq!(report.replay.total_ops, 2);
    }
}
