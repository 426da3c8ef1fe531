use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use ethereum_types::U256;
use kv_tools::fs::{prefixed_log_path, write_log};
use kv_trace::{
    extract::{account_trie_records, extract_leaves, AccountLeaf},
    oplog::read_log_rows,
    record::{OpKind, OperationRecord},
    summary::{group_thousands, BaselineComparison, OperationSummary},
};
use tracing::{info, warn};

use self::kv_extract::*;
mod kv_extract {
    pub mod cli;
}

const WEI_PER_ETH_EXP: usize = 18;

fn main() -> Result<()> {
    dotenv().ok();
    kv_tools::tracing::init();

    let args = cli::Cli::parse();

    let rows = read_log_rows(&args.csv).context("Error reading operation log")?;
    let mut undecodable = 0usize;
    let records: Vec<OperationRecord> = rows
        .iter()
        .filter_map(|row| match row.decode() {
            Ok(record) => Some(record),
            Err(e) => {
                undecodable += 1;
                warn!("Skipping row {}: {}", row, e);
                None
            }
        })
        .collect();
    info!(
        "Decoded {} of {} rows from {:?}",
        records.len(),
        rows.len(),
        args.csv
    );

    let mpt: Vec<_> = account_trie_records(records.iter().cloned()).collect();
    let leaves: Vec<_> = extract_leaves(mpt.iter().cloned()).collect();

    let out_dir = args.out_dir.as_deref();
    let mpt_path = prefixed_log_path(&args.csv, "MPT", out_dir)?;
    let baseline_path = prefixed_log_path(&args.csv, "baseline", out_dir)?;
    let mpt_rows = write_log(&mpt_path, &mpt)?;
    let leaf_rows = write_log(&baseline_path, &leaves)?;
    info!("Wrote {} rows to {:?}", mpt_rows, mpt_path);
    info!("Wrote {} rows to {:?}", leaf_rows, baseline_path);

    println!("{}", OperationSummary::from_records(&records));
    println!();
    println!("{}", BaselineComparison::from_records(&records));

    if undecodable > 0 {
        println!("\nSkipped {} undecodable rows", group_thousands(undecodable as u64));
    }

    if args.accounts {
        print_accounts(&leaves, args.limit);
    }

    Ok(())
}

fn print_accounts(leaves: &[OperationRecord], limit: usize) {
    let accounts: Vec<_> = leaves
        .iter()
        .filter_map(|record| match AccountLeaf::decode(record) {
            Ok(leaf) => Some((record.kind(), leaf)),
            Err(e) => {
                warn!("Skipping leaf {}: {}", record, e);
                None
            }
        })
        .collect();

    println!("\nAccount leaves (first {} of {}):", limit.min(accounts.len()), accounts.len());
    println!("{:<66} {:>8} {:>30} {:>4}", "Account Hash", "Nonce", "Balance (wei)", "Op");
    for (kind, leaf) in accounts.iter().take(limit) {
        println!(
            "{:<66} {:>8} {:>30} {:>4}",
            format!("{:?}", leaf.account_hash),
            leaf.account.nonce.to_string(),
            leaf.account.balance.to_string(),
            kind.wire_name()
        );
    }

    let gets = accounts.iter().filter(|(k, _)| *k == OpKind::Get).count();
    let puts = accounts.iter().filter(|(k, _)| *k == OpKind::Put).count();
    println!("\nGET: {}  PUT: {}", group_thousands(gets as u64), group_thousands(puts as u64));

    let total = accounts
        .iter()
        .fold(U256::zero(), |acc, (_, leaf)| acc.saturating_add(leaf.account.balance));
    let (eth, wei) = total.div_mod(U256::exp10(WEI_PER_ETH_EXP));
    println!("Total balance: {total} wei ({eth}.{:0>18} ETH)", wei.to_string());
}
