//! Store wrappers that log every classified operation they see.
//!
//! [`RecordingStore`] decorates any [`KeyValueStore`]. Single operations are
//! appended to the log as they happen, while a [`RecordingBatch`] holds its
//! intents back until [`commit`][RecordingBatch::commit], which appends them
//! as one contiguous block before writing them to the engine.
//!
//! Logging never changes what the engine returns. A failed log write is
//! reported with `warn!` and counted in [`RecorderStats`].

use std::{
    io::{self, Write},
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    oplog::OperationLogWriter,
    record::{OpKind, OperationRecord},
    store::{BatchOp, EngineProperty, KeyValueStore, StoreError},
};

/// Counters kept by a [`RecordingStore`].
#[derive(Debug, Default)]
pub struct RecorderStats {
    recorded: AtomicU64,
    unclassified: AtomicU64,
    log_failures: AtomicU64,
}

/// A point in time copy of [`RecorderStats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RecorderCounts {
    /// Records appended to the log.
    pub recorded: u64,
    /// Operations dropped because their key is unclassified.
    pub unclassified: u64,
    /// Records lost to log write failures.
    pub log_failures: u64,
}

impl RecorderStats {
    /// Reads all counters.
    pub fn counts(&self) -> RecorderCounts {
        RecorderCounts {
            recorded: self.recorded.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            log_failures: self.log_failures.load(Ordering::Relaxed),
        }
    }
}

/// A [`KeyValueStore`] that logs the classified operations it forwards.
#[derive(Debug)]
pub struct RecordingStore<E, W: Write> {
    engine: E,
    log: Mutex<Option<OperationLogWriter<W>>>,
    stats: RecorderStats,
}

impl<E, W: Write> RecordingStore<E, W> {
    /// Wraps `engine`, logging to `log`.
    pub fn new(engine: E, log: OperationLogWriter<W>) -> Self {
        Self {
            engine,
            log: Mutex::new(Some(log)),
            stats: RecorderStats::default(),
        }
    }

    /// The wrapped engine.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Counters of what has been recorded so far.
    pub const fn stats(&self) -> &RecorderStats {
        &self.stats
    }

    /// Whether operations are still being logged.
    pub fn is_recording(&self) -> bool {
        self.log.lock().is_some()
    }

    /// Flushes and detaches the log, handing back its sink.
    ///
    /// Later operations still reach the engine but are no longer recorded.
    /// Returns `None` if the log was already closed.
    pub fn close_log(&self) -> io::Result<Option<W>> {
        let writer = self.log.lock().take();
        match writer {
            Some(writer) => {
                debug!("Closing operation log after {} rows", writer.rows_written());
                writer.finish().map(Some)
            }
            None => Ok(None),
        }
    }

    /// Starts an empty batch against this store.
    pub fn batch(&self) -> RecordingBatch<'_, E, W> {
        RecordingBatch {
            store: self,
            ops: Vec::new(),
            value_size: 0,
        }
    }

    fn record(&self, kind: OpKind, key: &[u8], value: Option<&[u8]>) {
        let Some(record) = self.classify(kind, key, value) else {
            return;
        };

        self.append(std::slice::from_ref(&record));
    }

    fn classify(&self, kind: OpKind, key: &[u8], value: Option<&[u8]>) -> Option<OperationRecord> {
        let record = OperationRecord::classified(kind, key, value);
        if record.is_none() {
            self.stats.unclassified.fetch_add(1, Ordering::Relaxed);
        }

        record
    }

    /// Appends records as one block, under a single lock acquisition.
    fn append(&self, records: &[OperationRecord]) {
        if records.is_empty() {
            return;
        }

        let mut log = self.log.lock();
        let Some(writer) = log.as_mut() else {
            return;
        };

        let res = match records {
            [record] => writer.append(record),
            _ => writer.append_all(records),
        };
        match res {
            Ok(()) => {
                self.stats
                    .recorded
                    .fetch_add(records.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("Failed to append {} operation records: {}", records.len(), e);
                self.stats
                    .log_failures
                    .fetch_add(records.len() as u64, Ordering::Relaxed);
            }
        }
    }

    fn record_batch(&self, ops: &[BatchOp]) {
        let records: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                BatchOp::Put { key, value } if !key.is_empty() && !value.is_empty() => {
                    self.classify(OpKind::Put, key, Some(value))
                }
                BatchOp::Delete { key } if !key.is_empty() => {
                    self.classify(OpKind::Delete, key, None)
                }
                BatchOp::DeleteRange { start, end } if !start.is_empty() => {
                    self.classify(OpKind::DeleteRange, start, Some(end))
                }
                _ => None,
            })
            .collect();

        self.append(&records);
    }
}

impl<E: KeyValueStore, W: Write> KeyValueStore for RecordingStore<E, W> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.engine.get(key)?;
        if let Some(value) = value.as_deref() {
            if !key.is_empty() && !value.is_empty() {
                self.record(OpKind::Get, key, Some(value));
            }
        }

        Ok(value)
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.engine.has(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if !key.is_empty() && !value.is_empty() {
            self.record(OpKind::Put, key, Some(value));
        }

        self.engine.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        if !key.is_empty() {
            self.record(OpKind::Delete, key, None);
        }

        self.engine.delete(key)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        self.record_batch(&ops);
        self.engine.write_batch(ops)
    }

    fn key_count(&self) -> Result<u64, StoreError> {
        self.engine.key_count()
    }

    fn property(&self, property: EngineProperty) -> Option<String> {
        self.engine.property(property)
    }

    fn path(&self) -> Option<&Path> {
        self.engine.path()
    }
}

/// Operations buffered against a [`RecordingStore`] until committed.
///
/// A batch is meant to be filled and committed from one thread.
#[derive(Debug)]
pub struct RecordingBatch<'a, E, W: Write> {
    store: &'a RecordingStore<E, W>,
    ops: Vec<BatchOp>,
    value_size: usize,
}

impl<E: KeyValueStore, W: Write> RecordingBatch<'_, E, W> {
    /// Queues a write.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.value_size += key.len() + value.len();
        self.ops.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: &[u8]) {
        self.value_size += key.len();
        self.ops.push(BatchOp::Delete { key: key.to_vec() });
    }

    /// Queues the removal of every key in `[start, end)`.
    pub fn delete_range(&mut self, start: &[u8], end: &[u8]) {
        self.value_size += start.len() + end.len();
        self.ops.push(BatchOp::DeleteRange {
            start: start.to_vec(),
            end: end.to_vec(),
        });
    }

    /// Bytes of keys and values queued so far.
    pub const fn value_size(&self) -> usize {
        self.value_size
    }

    /// Number of queued intents.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drops every queued intent.
    pub fn reset(&mut self) {
        self.ops.clear();
        self.value_size = 0;
    }

    /// Logs every classified intent in insertion order, then applies them all
    /// to the engine as one atomic batch.
    ///
    /// The batch is empty afterwards and can be reused.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        let ops = std::mem::take(&mut self.ops);
        self.value_size = 0;

        self.store.record_batch(&ops);
        self.store.engine.write_batch(ops)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    };

    use hex_literal::hex;

    use super::{RecorderCounts, RecordingStore};
    use crate::{
        oplog::{OperationLogReader, OperationLogWriter},
        record::{LogRow, OpKind},
        store::{KeyValueStore, MemoryStore},
        testing_utils::common_setup,
    };

    type TestRecorder = RecordingStore<MemoryStore, Vec<u8>>;

    fn recorder() -> TestRecorder {
        RecordingStore::new(
            MemoryStore::new(),
            OperationLogWriter::new(Vec::new()).unwrap(),
        )
    }

    fn logged_rows(store: &TestRecorder) -> Vec<LogRow> {
        let sink = store.close_log().unwrap().unwrap();
        OperationLogReader::new(io::Cursor::new(sink))
            .rows()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    /// A sink that starts refusing writes once `broken` is set.
    #[derive(Debug, Default)]
    struct FlakySink {
        broken: Arc<AtomicBool>,
    }

    impl io::Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.broken.load(Ordering::Relaxed) {
                true => Err(io::Error::new(io::ErrorKind::Other, "disk full")),
                false => Ok(buf.len()),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn classified_operations_are_logged_in_order() {
        common_setup();
        let store = recorder();

        store.put(&hex!("41060c"), &hex!("c20102")).unwrap();
        store.get(&hex!("41060c")).unwrap();
        store.put(b"LastBlock", b"ignored").unwrap();
        store.delete(&hex!("41060c")).unwrap();

        let rows = logged_rows(&store);
        let ops: Vec<_> = rows.iter().map(|r| r.operation.as_str()).collect();
        assert_eq!(ops, vec!["PUT", "GET", "DELETE"]);
        assert_eq!(rows[2].value_hex, "");
        assert_eq!(rows[2].value_size, "0");

        assert_eq!(
            store.stats().counts(),
            RecorderCounts {
                recorded: 3,
                unclassified: 1,
                log_failures: 0
            }
        );
    }

    #[test]
    fn misses_and_empty_operands_are_not_logged() {
        let store = recorder();

        assert_eq!(store.get(&hex!("4101")).unwrap(), None);
        store.put(&hex!("4101"), &[]).unwrap();
        store.put(&[], b"value").unwrap();
        store.delete(&[]).unwrap();
        assert!(!store.has(&hex!("4102")).unwrap());

        assert!(logged_rows(&store).is_empty());
        assert_eq!(store.stats().counts(), RecorderCounts::default());
    }

    #[test]
    fn engine_results_pass_through() {
        let store = recorder();
        store.put(&hex!("4101"), b"v").unwrap();

        assert_eq!(store.get(&hex!("4101")).unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.engine().key_count().unwrap(), 1);
    }

    #[test]
    fn log_failures_do_not_fail_operations() {
        common_setup();
        let sink = FlakySink::default();
        let broken = Arc::clone(&sink.broken);
        let store = RecordingStore::new(
            MemoryStore::new(),
            OperationLogWriter::new(sink).unwrap(),
        );

        store.put(&hex!("4101"), b"v").unwrap();
        broken.store(true, Ordering::Relaxed);
        store.put(&hex!("4102"), b"v").unwrap();
        store.delete(&hex!("4101")).unwrap();

        assert_eq!(store.get(&hex!("4102")).unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.engine().key_count().unwrap(), 1);
        assert_eq!(
            store.stats().counts(),
            RecorderCounts {
                recorded: 1,
                unclassified: 0,
                log_failures: 3
            }
        );
    }

    #[test]
    fn closing_the_log_stops_recording() {
        let store = recorder();
        store.put(&hex!("4101"), b"v").unwrap();
        assert!(store.is_recording());

        let sink = store.close_log().unwrap().unwrap();
        assert!(!store.is_recording());
        assert!(store.close_log().unwrap().is_none());

        store.put(&hex!("4102"), b"v").unwrap();
        assert_eq!(store.engine().key_count().unwrap(), 2);
        assert_eq!(store.stats().counts().recorded, 1);
        assert_eq!(
            String::from_utf8(sink).unwrap().lines().count(),
            2,
            "header and one row"
        );
    }

    #[test]
    fn batches_log_like_individual_puts() {
        let pairs = [
            (hex!("4101").to_vec(), b"one".to_vec()),
            (hex!("4102").to_vec(), b"two".to_vec()),
            (b"untracked".to_vec(), b"three".to_vec()),
            ([0x33; 32].to_vec(), b"four".to_vec()),
        ];

        let single = recorder();
        for (k, v) in &pairs {
            single.put(k, v).unwrap();
        }

        let batched = recorder();
        let mut batch = batched.batch();
        for (k, v) in &pairs {
            batch.put(k, v);
        }
        assert_eq!(batch.len(), pairs.len());
        assert_eq!(batched.engine().key_count().unwrap(), 0);
        batch.commit().unwrap();
        assert!(batch.is_empty());

        assert_eq!(logged_rows(&single), logged_rows(&batched));
        assert_eq!(single.engine().entries(), batched.engine().entries());
    }

    #[test]
    fn range_deletes_are_logged_once() {
        let store = recorder();
        store.put(&hex!("4101"), b"v").unwrap();
        store.put(&hex!("4102"), b"v").unwrap();

        let mut batch = store.batch();
        batch.delete_range(&hex!("4100"), &hex!("4103"));
        batch.commit().unwrap();

        let rows = logged_rows(&store);
        assert_eq!(rows.len(), 3);
        let range = rows[2].decode().unwrap();
        assert_eq!(range.kind(), OpKind::DeleteRange);
        assert_eq!(range.key().as_ref(), hex!("4100"));
        assert_eq!(range.value().unwrap().as_ref(), hex!("4103"));
        assert_eq!(store.engine().key_count().unwrap(), 0);
    }

    #[test]
    fn reset_discards_queued_intents() {
        let store = recorder();
        let mut batch = store.batch();
        batch.put(&hex!("4101"), b"value");
        batch.delete(&hex!("4102"));
        assert_eq!(batch.value_size(), 2 + 5 + 2);

        batch.reset();
        assert_eq!(batch.value_size(), 0);
        batch.commit().unwrap();

        assert!(logged_rows(&store).is_empty());
        assert_eq!(store.engine().key_count().unwrap(), 0);
    }

    #[test]
    fn concurrent_writers_never_interleave_rows() {
        const THREADS: u8 = 8;
        const PUTS_PER_THREAD: u8 = 50;

        let store = Arc::new(recorder());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..PUTS_PER_THREAD {
                        store.put(&[b'A', t, i], &[t; 40]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rows = logged_rows(&store);
        assert_eq!(rows.len(), THREADS as usize * PUTS_PER_THREAD as usize);
        for row in rows {
            let record = row.decode().unwrap();
            let t = record.key()[1];
            assert_eq!(record.value().unwrap().as_ref(), [t; 40]);
        }
    }
}
