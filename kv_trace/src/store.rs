//! The storage engine seam.
//!
//! Everything in this crate talks to a store through [`KeyValueStore`]. Two
//! engines are provided: [`MemoryStore`], an ordered in-memory map, and (with
//! the `rocksdb` feature) `RocksStore`, an on-disk RocksDB instance.

use std::{collections::BTreeMap, fmt::Display, ops::Bound, path::Path};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of LSM levels that per-level properties are queried for.
pub const NUM_LEVELS: usize = 7;

/// Errors reported by a storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An engine specific failure.
    #[error("Storage engine error: {0}")]
    Engine(String),

    /// The store directory could not be prepared.
    #[error("Storage directory error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from RocksDB.
    #[cfg(feature = "rocksdb")]
    #[error(transparent)]
    Rocks(#[from] rocksdb::Error),
}

/// One intent of an atomic engine batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BatchOp {
    /// Write `value` under `key`.
    Put {
        /// The key.
        key: Vec<u8>,
        /// The value.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// The key.
        key: Vec<u8>,
    },
    /// Remove every key in `[start, end)`. An empty `end` means no upper
    /// bound.
    DeleteRange {
        /// First key removed.
        start: Vec<u8>,
        /// First key kept.
        end: Vec<u8>,
    },
}

/// A statistic an engine may be able to report about itself.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum EngineProperty {
    /// Free form engine statistics.
    Stats,
    /// Description of the on-disk tables.
    SsTables,
    /// Number of table files at the given level.
    FilesAtLevel(usize),
    /// Bytes held by the block cache.
    BlockCacheUsage,
    /// Bytes held by in-memory tables.
    ApproximateMemoryUsage,
    /// I/O statistics.
    IoStats,
    /// Number of compactions.
    CompactionCount,
    /// Ratio of bytes written to disk over bytes written by the user.
    WriteAmplification,
    /// Bytes of table files at the given level.
    SizeBytesAtLevel(usize),
}

impl EngineProperty {
    /// Every property a stats report asks for, in report order.
    pub fn report_set() -> Vec<EngineProperty> {
        let mut props = vec![EngineProperty::Stats, EngineProperty::SsTables];
        props.extend((0..NUM_LEVELS).map(EngineProperty::FilesAtLevel));
        props.extend([
            EngineProperty::BlockCacheUsage,
            EngineProperty::ApproximateMemoryUsage,
            EngineProperty::IoStats,
            EngineProperty::CompactionCount,
            EngineProperty::WriteAmplification,
        ]);
        props.extend((0..NUM_LEVELS).map(EngineProperty::SizeBytesAtLevel));
        props
    }
}

impl Display for EngineProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineProperty::Stats => write!(f, "Stats"),
            EngineProperty::SsTables => write!(f, "SSTables"),
            EngineProperty::FilesAtLevel(level) => write!(f, "Files at Level {level}"),
            EngineProperty::BlockCacheUsage => write!(f, "Block Cache Usage"),
            EngineProperty::ApproximateMemoryUsage => write!(f, "Approximate Memory Usage"),
            EngineProperty::IoStats => write!(f, "I/O Stats"),
            EngineProperty::CompactionCount => write!(f, "Compaction Count"),
            EngineProperty::WriteAmplification => write!(f, "Write Amplification"),
            EngineProperty::SizeBytesAtLevel(level) => write!(f, "Size at Level {level}"),
        }
    }
}

/// A key-value storage engine.
pub trait KeyValueStore {
    /// Reads the value under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Whether `key` is present.
    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Writes `value` under `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Removes every key in `[start, end)`.
    fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<(), StoreError> {
        self.write_batch(vec![BatchOp::DeleteRange {
            start: start.to_vec(),
            end: end.to_vec(),
        }])
    }

    /// Applies all intents atomically, in order.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;

    /// Number of keys currently stored.
    fn key_count(&self) -> Result<u64, StoreError>;

    /// Queries an engine statistic. `None` if the engine does not expose it.
    fn property(&self, _property: EngineProperty) -> Option<String> {
        None
    }

    /// The directory holding the store, for on-disk engines.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// An ordered in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every entry, in key order.
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn remove_range(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, start: &[u8], end: &[u8]) {
    let upper = match end.is_empty() {
        true => Bound::Unbounded,
        false => Bound::Excluded(end.to_vec()),
    };

    let doomed: Vec<_> = map
        .range((Bound::Included(start.to_vec()), upper))
        .map(|(k, _)| k.clone())
        .collect();
    for key in doomed {
        map.remove(&key);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
                BatchOp::DeleteRange { start, end } => {
                    if end.is_empty() || start < end {
                        remove_range(&mut entries, &start, &end);
                    }
                }
            }
        }

        Ok(())
    }

    fn key_count(&self) -> Result<u64, StoreError> {
        Ok(self.entries.read().len() as u64)
    }

    fn property(&self, property: EngineProperty) -> Option<String> {
        match property {
            EngineProperty::ApproximateMemoryUsage => {
                let bytes: usize = self
                    .entries
                    .read()
                    .iter()
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                Some(bytes.to_string())
            }
            _ => None,
        }
    }
}

#[cfg(feature = "rocksdb")]
mod rocks {
    use std::path::{Path, PathBuf};

    use log::{debug, info};
    use rocksdb::{IteratorMode, Options, WriteBatch, DB};

    use super::{BatchOp, EngineProperty, KeyValueStore, StoreError};

    /// Memtable size the store is opened with.
    pub const WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

    // Statistics names, as printed by `Options::get_statistics`.
    const COMPACTION_TIMES: &str = "rocksdb.compaction.times.micros";
    const USER_BYTES_WRITTEN: &str = "rocksdb.bytes.written";
    const FLUSH_BYTES_WRITTEN: &str = "rocksdb.flush.write.bytes";
    const COMPACTION_BYTES_WRITTEN: &str = "rocksdb.compact.write.bytes";

    /// A RocksDB instance on disk.
    pub struct RocksStore {
        db: DB,
        opts: Options,
        path: PathBuf,
    }

    impl std::fmt::Debug for RocksStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RocksStore")
                .field("path", &self.path)
                .finish_non_exhaustive()
        }
    }

    /// Reads the `COUNT` of a ticker or histogram out of a statistics dump.
    fn statistic_count(stats: &str, name: &str) -> Option<u64> {
        let line = stats.lines().find(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with(' '))
        })?;

        let mut tokens = line.split_whitespace();
        tokens.find(|&t| t == "COUNT")?;
        tokens.find(|&t| t != ":")?.parse().ok()
    }

    impl RocksStore {
        /// Opens the store at `path`, creating it and any missing parent
        /// directories.
        ///
        /// Statistics are enabled so that compaction counts and write
        /// amplification can be reported.
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
            let path = path.as_ref();
            std::fs::create_dir_all(path)?;

            let mut opts = Options::default();
            opts.create_if_missing(true);
            opts.set_write_buffer_size(WRITE_BUFFER_SIZE);
            opts.enable_statistics();

            let db = DB::open(&opts, path)?;
            info!("Opened RocksDB store at {:?}", path);

            Ok(Self {
                db,
                opts,
                path: path.to_path_buf(),
            })
        }

        fn property_name(property: EngineProperty) -> Option<String> {
            Some(match property {
                EngineProperty::Stats => "rocksdb.stats".to_string(),
                EngineProperty::SsTables => "rocksdb.sstables".to_string(),
                EngineProperty::FilesAtLevel(level) => {
                    format!("rocksdb.num-files-at-level{level}")
                }
                EngineProperty::BlockCacheUsage => "rocksdb.block-cache-usage".to_string(),
                EngineProperty::ApproximateMemoryUsage => {
                    "rocksdb.cur-size-all-mem-tables".to_string()
                }
                EngineProperty::IoStats => "rocksdb.dbstats".to_string(),
                // Derived from statistics or live files instead.
                EngineProperty::CompactionCount
                | EngineProperty::WriteAmplification
                | EngineProperty::SizeBytesAtLevel(_) => return None,
            })
        }

        fn statistics(&self) -> Option<String> {
            self.opts.get_statistics()
        }

        /// Number of compaction jobs run since the store was opened.
        fn compaction_count(&self) -> Option<String> {
            statistic_count(&self.statistics()?, COMPACTION_TIMES).map(|n| n.to_string())
        }

        /// Bytes written to table files (flushes and compactions) over bytes
        /// written by the user, since the store was opened.
        fn write_amplification(&self) -> Option<String> {
            let stats = self.statistics()?;
            let user = statistic_count(&stats, USER_BYTES_WRITTEN)?;
            if user == 0 {
                return None;
            }

            let flushed = statistic_count(&stats, FLUSH_BYTES_WRITTEN).unwrap_or_default();
            let compacted = statistic_count(&stats, COMPACTION_BYTES_WRITTEN).unwrap_or_default();
            Some(format!("{:.2}", (flushed + compacted) as f64 / user as f64))
        }

        /// Bytes of live table files at `level`.
        fn level_size(&self, level: usize) -> Option<String> {
            let files = match self.db.live_files() {
                Ok(files) => files,
                Err(e) => {
                    debug!("Live files unavailable: {}", e);
                    return None;
                }
            };

            let size: usize = files
                .iter()
                .filter(|file| usize::try_from(file.level).is_ok_and(|l| l == level))
                .map(|file| file.size)
                .sum();
            Some(size.to_string())
        }

        /// A key greater than every committed key and every key in `queued`,
        /// or `None` if there are no keys at all.
        fn upper_bound(&self, queued: Option<&[u8]>) -> Result<Option<Vec<u8>>, StoreError> {
            let committed = self
                .db
                .iterator(IteratorMode::End)
                .next()
                .transpose()?
                .map(|(key, _)| key.into_vec());

            let last = committed.into_iter().chain(queued.map(<[u8]>::to_vec)).max();
            Ok(last.map(|mut key| {
                key.push(0);
                key
            }))
        }
    }

    impl KeyValueStore for RocksStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.db.get(key)?)
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
            Ok(self.db.put(key, value)?)
        }

        fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
            Ok(self.db.delete(key)?)
        }

        fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
            let mut batch = WriteBatch::default();
            // Largest key put so far, which an unbounded range must also cover.
            let mut last_queued: Option<Vec<u8>> = None;

            for op in ops {
                match op {
                    BatchOp::Put { key, value } => {
                        if last_queued.as_ref().map_or(true, |last| key > *last) {
                            last_queued = Some(key.clone());
                        }
                        batch.put(key, value);
                    }
                    BatchOp::Delete { key } => batch.delete(key),
                    BatchOp::DeleteRange { start, end } => {
                        let end = match end.is_empty() {
                            true => match self.upper_bound(last_queued.as_deref())? {
                                Some(bound) => bound,
                                None => continue,
                            },
                            false => end,
                        };
                        if start < end {
                            batch.delete_range(start, end);
                        }
                    }
                }
            }

            debug!("Writing batch of {} entries", batch.len());
            Ok(self.db.write(batch)?)
        }

        fn key_count(&self) -> Result<u64, StoreError> {
            let mut count = 0;
            for entry in self.db.iterator(IteratorMode::Start) {
                entry?;
                count += 1;
            }

            Ok(count)
        }

        fn property(&self, property: EngineProperty) -> Option<String> {
            match property {
                EngineProperty::CompactionCount => return self.compaction_count(),
                EngineProperty::WriteAmplification => return self.write_amplification(),
                EngineProperty::SizeBytesAtLevel(level) => return self.level_size(level),
                _ => (),
            }

            let name = Self::property_name(property)?;
            match self.db.property_value(name.as_str()) {
                Ok(value) => value,
                Err(e) => {
                    debug!("Property {} unavailable: {}", name, e);
                    None
                }
            }
        }

        fn path(&self) -> Option<&Path> {
            Some(&self.path)
        }
    }

}

#[cfg(feature = "rocksdb")]
pub use rocks::{RocksStore, WRITE_BUFFER_SIZE};
