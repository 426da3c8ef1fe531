//! Re-executing an operation log against a store.
//!
//! Replay works on raw [`LogRow`]s rather than decoded records: a row whose
//! value is malformed still counts towards the totals of its operation, and
//! only a row whose key cannot be decoded is ignored outright.

use log::{info, trace};
use serde::Serialize;

use crate::{
    record::{decode_hex, LogRow, OpKind},
    store::KeyValueStore,
};

/// Why a row had no effect on the store.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum SkipReason {
    /// The key is not valid hex. The row is not counted at all.
    MalformedKey,
    /// The value (or range end) is not valid hex.
    MalformedValue,
    /// The operation name is not one of the known kinds.
    UnknownOperation,
    /// A get found nothing.
    MissingKey,
    /// The engine returned an error.
    EngineFailure,
}

/// What replaying one row did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplayOutcome {
    /// The row was applied to the store.
    Applied,
    /// The row was skipped.
    Skipped(SkipReason),
}

/// Skipped rows, by reason.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SkipCounts {
    /// See [`SkipReason::MalformedKey`].
    pub malformed_key: u64,
    /// See [`SkipReason::MalformedValue`].
    pub malformed_value: u64,
    /// See [`SkipReason::UnknownOperation`].
    pub unknown_operation: u64,
    /// See [`SkipReason::MissingKey`].
    pub missing_key: u64,
    /// See [`SkipReason::EngineFailure`].
    pub engine_failure: u64,
}

impl SkipCounts {
    fn count(&mut self, reason: SkipReason) {
        let counter = match reason {
            SkipReason::MalformedKey => &mut self.malformed_key,
            SkipReason::MalformedValue => &mut self.malformed_value,
            SkipReason::UnknownOperation => &mut self.unknown_operation,
            SkipReason::MissingKey => &mut self.missing_key,
            SkipReason::EngineFailure => &mut self.engine_failure,
        };
        *counter += 1;
    }

    /// Total number of skipped rows.
    pub const fn total(&self) -> u64 {
        self.malformed_key
            + self.malformed_value
            + self.unknown_operation
            + self.missing_key
            + self.engine_failure
    }
}

/// Totals of a replay.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct OperationStats {
    /// Rows whose key decoded, whatever happened next.
    pub total_ops: u64,
    /// Get rows.
    pub get_ops: u64,
    /// Put rows.
    pub put_ops: u64,
    /// Delete and range delete rows.
    pub delete_ops: u64,
    /// Value bytes successfully written.
    pub bytes_written: u64,
    /// Value bytes returned by gets that hit.
    pub bytes_read: u64,
    /// Rows that had no effect.
    pub skipped: SkipCounts,
}

/// Replays rows against a store, one at a time, in order.
#[derive(Debug)]
pub struct Replayer<'a, S: ?Sized> {
    store: &'a S,
    stats: OperationStats,
}

impl<'a, S: KeyValueStore + ?Sized> Replayer<'a, S> {
    /// Starts a replay with zeroed totals.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            stats: OperationStats::default(),
        }
    }

    /// Totals so far.
    pub const fn stats(&self) -> &OperationStats {
        &self.stats
    }

    /// Replays every row and returns the totals.
    pub fn replay<'r, I>(mut self, rows: I) -> OperationStats
    where
        I: IntoIterator<Item = &'r LogRow>,
    {
        for row in rows {
            self.apply(row);
        }

        info!(
            "Replayed {} operations ({} skipped)",
            self.stats.total_ops,
            self.stats.skipped.total()
        );
        self.stats
    }

    /// Replays one row.
    pub fn apply(&mut self, row: &LogRow) -> ReplayOutcome {
        let outcome = self.execute(row);
        if let ReplayOutcome::Skipped(reason) = outcome {
            trace!("Skipped {} row for key {}: {:?}", row.operation, row.key_hex, reason);
            self.stats.skipped.count(reason);
        }

        outcome
    }

    fn execute(&mut self, row: &LogRow) -> ReplayOutcome {
        let Ok(key) = decode_hex(&row.key_hex) else {
            return ReplayOutcome::Skipped(SkipReason::MalformedKey);
        };
        self.stats.total_ops += 1;

        let Ok(kind) = row.operation.parse::<OpKind>() else {
            return ReplayOutcome::Skipped(SkipReason::UnknownOperation);
        };

        let stats = &mut self.stats;
        let res = match kind {
            OpKind::Get => {
                stats.get_ops += 1;
                match self.store.get(&key) {
                    Ok(Some(value)) => {
                        stats.bytes_read += value.len() as u64;
                        Ok(())
                    }
                    Ok(None) => return ReplayOutcome::Skipped(SkipReason::MissingKey),
                    Err(e) => Err(e),
                }
            }
            OpKind::Put => {
                stats.put_ops += 1;
                let Ok(value) = decode_hex(&row.value_hex) else {
                    return ReplayOutcome::Skipped(SkipReason::MalformedValue);
                };
                self.store
                    .put(&key, &value)
                    .map(|()| stats.bytes_written += value.len() as u64)
            }
            OpKind::Delete => {
                stats.delete_ops += 1;
                self.store.delete(&key)
            }
            OpKind::DeleteRange => {
                stats.delete_ops += 1;
                let Ok(end) = decode_hex(&row.value_hex) else {
                    return ReplayOutcome::Skipped(SkipReason::MalformedValue);
                };
                self.store.delete_range(&key, &end)
            }
        };

        match res {
            Ok(()) => ReplayOutcome::Applied,
            Err(e) => {
                trace!("Engine failure on {}: {}", row.operation, e);
                ReplayOutcome::Skipped(SkipReason::EngineFailure)
            }
        }
    }
}

/// Replays every row against `store`.
pub fn replay_rows<'r, S, I>(store: &S, rows: I) -> OperationStats
where
    S: KeyValueStore + ?Sized,
    I: IntoIterator<Item = &'r LogRow>,
{
    Replayer::new(store).replay(rows)
}
