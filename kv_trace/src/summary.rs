//! Per-namespace operation counts and the MPT versus leaf-only comparison.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;

use crate::{
    classify::Namespace,
    extract::is_account_leaf,
    record::{OpKind, OperationRecord},
};

const TABLE_WIDTH: usize = 120;

/// Operation counts and value bytes for one set of records.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OpTally {
    /// Number of gets.
    pub gets: u64,
    /// Number of puts.
    pub puts: u64,
    /// Number of deletes, range deletes included.
    pub deletes: u64,
    /// Value bytes returned by gets.
    pub get_bytes: u64,
    /// Value bytes written by puts.
    pub put_bytes: u64,
}

impl OpTally {
    /// Counts one record.
    pub fn add(&mut self, record: &OperationRecord) {
        let value_len = record.value_len() as u64;
        match record.kind() {
            OpKind::Get => {
                self.gets += 1;
                self.get_bytes += value_len;
            }
            OpKind::Put => {
                self.puts += 1;
                self.put_bytes += value_len;
            }
            OpKind::Delete | OpKind::DeleteRange => self.deletes += 1,
        }
    }

    fn merge(&mut self, other: &OpTally) {
        self.gets += other.gets;
        self.puts += other.puts;
        self.deletes += other.deletes;
        self.get_bytes += other.get_bytes;
        self.put_bytes += other.put_bytes;
    }
}

impl<'a> FromIterator<&'a OperationRecord> for OpTally {
    fn from_iter<T: IntoIterator<Item = &'a OperationRecord>>(iter: T) -> Self {
        let mut tally = OpTally::default();
        for record in iter {
            tally.add(record);
        }
        tally
    }
}

/// How many operations of a log fall into each namespace.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OperationSummary {
    by_namespace: BTreeMap<Namespace, OpTally>,
}

impl OperationSummary {
    /// Summarizes a set of records.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a OperationRecord>,
    {
        let mut summary = Self::default();
        for record in records {
            summary
                .by_namespace
                .entry(record.namespace())
                .or_default()
                .add(record);
        }
        summary
    }

    /// The tally of one namespace.
    pub fn namespace(&self, namespace: Namespace) -> OpTally {
        self.by_namespace
            .get(&namespace)
            .copied()
            .unwrap_or_default()
    }

    /// The tally across all namespaces.
    pub fn total(&self) -> OpTally {
        let mut total = OpTally::default();
        for tally in self.by_namespace.values() {
            total.merge(tally);
        }
        total
    }
}

fn count_with_bytes(count: u64, bytes: u64) -> String {
    format!("{} ({}B)", group_thousands(count), group_thousands(bytes))
}

/// Formats a number with `,` separating groups of three digits.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn summary_row(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    description: &str,
    t: OpTally,
) -> fmt::Result {
    writeln!(
        f,
        "{:<25} {:<25} {:>23} {:>23} {:>10}",
        name,
        description,
        count_with_bytes(t.gets, t.get_bytes),
        count_with_bytes(t.puts, t.put_bytes),
        group_thousands(t.deletes)
    )
}

impl Display for OperationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(TABLE_WIDTH))?;
        writeln!(f, "Summary Table (by Type):")?;
        writeln!(f, "{}", "=".repeat(TABLE_WIDTH))?;
        writeln!(
            f,
            "{:<25} {:<25} {:>23} {:>23} {:>10}",
            "Type", "Description", "GET", "PUT", "DELETE"
        )?;
        writeln!(f, "{}", "-".repeat(TABLE_WIDTH))?;

        for ns in Namespace::CLASSIFIED {
            summary_row(f, &ns.to_string(), ns.description(), self.namespace(ns))?;
        }
        writeln!(f, "{}", "-".repeat(TABLE_WIDTH))?;
        summary_row(f, "TOTAL", "All Operations", self.total())
    }
}

/// Percentage of `part` in `whole`, or 0 when `whole` is 0.
fn percent(part: u64, whole: u64) -> f64 {
    match whole {
        0 => 0.0,
        _ => part as f64 / whole as f64 * 100.0,
    }
}

/// Extra percentage of `full` over `base`, or 0 when `base` is 0.
fn overhead(full: u64, base: u64) -> f64 {
    match base {
        0 => 0.0,
        _ => (full as f64 - base as f64) / base as f64 * 100.0,
    }
}

/// All account-trie traffic (the MPT) against the leaf-only subset of it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BaselineComparison {
    /// Every account-trie record.
    pub mpt: OpTally,
    /// The account-trie records whose values are leaves.
    pub baseline: OpTally,
}

/// Percentages per operation kind. Byte figures have no delete column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OpPercentages {
    /// Of gets.
    pub gets: f64,
    /// Of puts.
    pub puts: f64,
    /// Of deletes.
    pub deletes: f64,
    /// Of get bytes.
    pub get_bytes: f64,
    /// Of put bytes.
    pub put_bytes: f64,
}

impl BaselineComparison {
    /// Tallies the account-trie records of a log and their leaf subset.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a OperationRecord>,
    {
        let mut comparison = Self::default();
        for record in records {
            if record.namespace() != Namespace::AccountTriePath {
                continue;
            }

            comparison.mpt.add(record);
            if is_account_leaf(record) {
                comparison.baseline.add(record);
            }
        }
        comparison
    }

    /// The baseline as a share of the MPT.
    pub fn baseline_share(&self) -> OpPercentages {
        let (m, b) = (&self.mpt, &self.baseline);
        OpPercentages {
            gets: percent(b.gets, m.gets),
            puts: percent(b.puts, m.puts),
            deletes: percent(b.deletes, m.deletes),
            get_bytes: percent(b.get_bytes, m.get_bytes),
            put_bytes: percent(b.put_bytes, m.put_bytes),
        }
    }

    /// How much larger the MPT is than the baseline.
    pub fn mpt_overhead(&self) -> OpPercentages {
        let (m, b) = (&self.mpt, &self.baseline);
        OpPercentages {
            gets: overhead(m.gets, b.gets),
            puts: overhead(m.puts, b.puts),
            deletes: overhead(m.deletes, b.deletes),
            get_bytes: overhead(m.get_bytes, b.get_bytes),
            put_bytes: overhead(m.put_bytes, b.put_bytes),
        }
    }
}

impl Display for BaselineComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(TABLE_WIDTH))?;
        writeln!(f, "Baseline Comparison (MPT vs Baseline):")?;
        writeln!(f, "{}", "=".repeat(TABLE_WIDTH))?;
        writeln!(
            f,
            "{:<50} {:>23} {:>23} {:>10}",
            "Metric", "GET", "PUT", "DELETE"
        )?;
        writeln!(f, "{}", "-".repeat(TABLE_WIDTH))?;

        for (label, t) in [
            ("MPT (PATH_ACCOUNT_TRIE)", self.mpt),
            ("Baseline (Leaf Nodes)", self.baseline),
        ] {
            writeln!(
                f,
                "{:<50} {:>23} {:>23} {:>10}",
                label,
                count_with_bytes(t.gets, t.get_bytes),
                count_with_bytes(t.puts, t.put_bytes),
                group_thousands(t.deletes)
            )?;
        }
        writeln!(f, "{}", "-".repeat(TABLE_WIDTH))?;

        let share = self.baseline_share();
        writeln!(
            f,
            "{:<50} {:>23} {:>23} {:>10}",
            "Baseline % of MPT (count)",
            format!("{:.2}%", share.gets),
            format!("{:.2}%", share.puts),
            format!("{:.2}%", share.deletes)
        )?;
        writeln!(
            f,
            "{:<50} {:>23} {:>23} {:>10}",
            "Baseline % of MPT (bytes)",
            format!("{:.2}%", share.get_bytes),
            format!("{:.2}%", share.put_bytes),
            "N/A"
        )?;
        writeln!(f, "{}", "-".repeat(TABLE_WIDTH))?;

        let extra = self.mpt_overhead();
        writeln!(
            f,
            "{:<50} {:>23} {:>23} {:>10}",
            "MPT overhead vs Baseline (count)",
            format!("+{:.2}%", extra.gets),
            format!("+{:.2}%", extra.puts),
            format!("+{:.2}%", extra.deletes)
        )?;
        writeln!(
            f,
            "{:<50} {:>23} {:>23} {:>10}",
            "MPT overhead vs Baseline (bytes)",
            format!("+{:.2}%", extra.get_bytes),
            format!("+{:.2}%", extra.put_bytes),
            "N/A"
        )
    }
}
