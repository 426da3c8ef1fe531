//! Instrumentation and offline analysis for the key-value traffic behind a
//! path-scheme Merkle-Patricia trie.
//!
//! The crate answers one question: how much of what a trie writes to its
//! backing store is internal structure (branch and extension nodes) rather
//! than the leaves that carry account data? It does so in three stages:
//! - [`RecordingStore`][recorder::RecordingStore] and
//!   [`RecordingBatch`][recorder::RecordingBatch] wrap any
//!   [`KeyValueStore`][store::KeyValueStore], [`classify`][classify::classify]
//!   every key they see and append the classified operations to an
//!   [`OperationLogWriter`][oplog::OperationLogWriter].
//! - [`extract_leaves`][extract::extract_leaves] filters a recorded log down
//!   to the account-trie records whose values decode to leaf nodes, giving a
//!   "leaf-only" baseline log.
//! - [`Replayer`][replay::Replayer] re-executes a log against a fresh store,
//!   after which a [`StatsReport`][report::StatsReport] collects what the
//!   engine has to say about itself.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod classify;
pub mod extract;
pub mod node;
pub mod oplog;
pub mod record;
pub mod recorder;
pub mod replay;
pub mod report;
pub mod store;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing_utils;
