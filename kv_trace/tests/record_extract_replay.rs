use std::fs;

use ethereum_types::{H256, U256};
use hex_literal::hex;
use kv_trace::{
    classify::{classify, Namespace},
    extract::{extract_leaves, AccountLeaf, AccountRlp},
    oplog::{read_log_rows, OperationLogReader, OperationLogWriter},
    record::{LogRow, OpKind},
    recorder::RecordingStore,
    replay::replay_rows,
    report::StatsReport,
    store::{KeyValueStore, MemoryStore},
    summary::BaselineComparison,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rlp::RlpStream;

const LEAF_KEY: [u8; 3] = hex!("41060c");
const EXTENSION_KEY: [u8; 2] = hex!("4101");
const PREFIXES: &[u8] = b"AOaox";

/// A leaf holding an empty account, 62 nibbles below `A 06 0c`.
fn account_leaf() -> Vec<u8> {
    let account = rlp::encode(&AccountRlp {
        nonce: U256::zero(),
        balance: U256::zero(),
        storage_root: H256::repeat_byte(0x56),
        code_hash: H256::repeat_byte(0xc5),
    });

    let mut path = vec![0x20];
    path.extend([0x9a; 31]);

    let mut s = RlpStream::new_list(2);
    s.append(&path).append(&account.to_vec());
    s.out().to_vec()
}

fn extension() -> Vec<u8> {
    let mut s = RlpStream::new_list(2);
    s.append(&vec![0x00, 0x60]).append(&vec![0xab; 32]);
    s.out().to_vec()
}

fn read_rows(sink: Vec<u8>) -> Vec<LogRow> {
    OperationLogReader::new(std::io::Cursor::new(sink))
        .rows()
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn leaf_fixture_has_the_expected_encoding() {
    let leaf = account_leaf();
    assert_eq!(&leaf[..4], hex!("f869a020"));
}

#[test]
fn recorded_leaf_survives_extraction_and_replays() {
    let store = RecordingStore::new(
        MemoryStore::new(),
        OperationLogWriter::new(Vec::new()).unwrap(),
    );
    store.put(&LEAF_KEY, &account_leaf()).unwrap();
    store.put(&EXTENSION_KEY, &extension()).unwrap();

    let rows = read_rows(store.close_log().unwrap().unwrap());
    assert_eq!(rows.len(), 2);

    let records: Vec<_> = rows.iter().map(|r| r.decode().unwrap()).collect();
    let leaves: Vec<_> = extract_leaves(records.clone()).collect();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].key().as_ref(), LEAF_KEY);

    let account = AccountLeaf::decode(&leaves[0]).unwrap();
    assert_eq!(account.account.balance, U256::zero());
    assert_eq!(account.account_hash.as_bytes()[0], 0x6c);

    let baseline: Vec<_> = leaves.iter().map(LogRow::from).collect();
    let fresh = MemoryStore::new();
    let stats = replay_rows(&fresh, &baseline);

    assert_eq!(stats.put_ops, 1);
    assert_eq!(stats.total_ops, 1);
    assert!(fresh.has(&LEAF_KEY).unwrap());
    assert!(!fresh.has(&EXTENSION_KEY).unwrap());

    let cmp = BaselineComparison::from_records(&records);
    assert_eq!(cmp.mpt.puts, 2);
    assert_eq!(cmp.baseline.puts, 1);
}

#[test]
fn replay_of_overwrite_and_delete() {
    let store = RecordingStore::new(
        MemoryStore::new(),
        OperationLogWriter::new(Vec::new()).unwrap(),
    );
    let (v1, v2) = (b"first value".to_vec(), b"second".to_vec());
    store.put(&LEAF_KEY, &v1).unwrap();
    store.put(&LEAF_KEY, &v2).unwrap();
    assert_eq!(store.get(&LEAF_KEY).unwrap(), Some(v2.clone()));
    store.delete(&LEAF_KEY).unwrap();

    let rows = read_rows(store.close_log().unwrap().unwrap());
    let fresh = MemoryStore::new();
    let stats = replay_rows(&fresh, &rows);

    assert_eq!(fresh.key_count().unwrap(), 0);
    assert_eq!(stats.bytes_read, v2.len() as u64);
    assert_eq!(stats.bytes_written, (v1.len() + v2.len()) as u64);

    let report = StatsReport::collect(&fresh, stats).unwrap();
    assert_eq!(report.key_count, 0);
}

#[test]
fn unprefixed_hash_length_delete_is_a_hash_trie_record() {
    let store = RecordingStore::new(
        MemoryStore::new(),
        OperationLogWriter::new(Vec::new()).unwrap(),
    );
    store.delete(&[0x5e; 32]).unwrap();

    let rows = read_rows(store.close_log().unwrap().unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].operation, "DELETE");
    assert_eq!(rows[0].namespace, "HASH_TRIE");
}

#[test]
fn batches_match_individual_puts_for_random_inputs() {
    let mut rng = StdRng::seed_from_u64(7);
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..200)
        .map(|_| {
            let mut key = vec![PREFIXES[rng.gen_range(0..PREFIXES.len())]];
            key.extend((0..rng.gen_range(0..40)).map(|_| rng.gen::<u8>()));
            let value = (0..rng.gen_range(0..16)).map(|_| rng.gen()).collect();
            (key, value)
        })
        .collect();

    let single = RecordingStore::new(
        MemoryStore::new(),
        OperationLogWriter::new(Vec::new()).unwrap(),
    );
    for (k, v) in &pairs {
        single.put(k, v).unwrap();
    }

    let batched = RecordingStore::new(
        MemoryStore::new(),
        OperationLogWriter::new(Vec::new()).unwrap(),
    );
    let mut batch = batched.batch();
    for (k, v) in &pairs {
        batch.put(k, v);
    }
    batch.commit().unwrap();

    assert_eq!(single.stats().counts(), batched.stats().counts());
    assert_eq!(
        read_rows(single.close_log().unwrap().unwrap()),
        read_rows(batched.close_log().unwrap().unwrap())
    );
}

#[test]
fn replay_reclassification_matches_the_recorded_type() {
    let store = RecordingStore::new(
        MemoryStore::new(),
        OperationLogWriter::new(Vec::new()).unwrap(),
    );
    let legacy = b"legacy node".to_vec();
    let legacy_key = keccak_hash::keccak(&legacy);

    store.put(&LEAF_KEY, &account_leaf()).unwrap();
    store.put(&[b'O'; 40], b"storage node").unwrap();
    store.put(&[b'a'; 33], b"snapshot account").unwrap();
    store.put(&[b'o'; 65], b"snapshot slot").unwrap();
    store.put(legacy_key.as_bytes(), &legacy).unwrap();
    store.get(&LEAF_KEY).unwrap();

    let rows = read_rows(store.close_log().unwrap().unwrap());
    assert_eq!(rows.len(), 6);

    for row in rows {
        let record = row.decode().unwrap();
        assert_ne!(record.namespace(), Namespace::Unclassified);
        let value = match record.kind() {
            OpKind::Get | OpKind::Put => record.value().map(|v| &v[..]),
            OpKind::Delete | OpKind::DeleteRange => None,
        };
        assert_eq!(classify(record.key(), value), record.namespace());
    }
}

#[test]
fn logs_on_disk_round_trip_through_the_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leveldb_operations.csv");

    let store = RecordingStore::new(
        MemoryStore::new(),
        OperationLogWriter::open(&path).unwrap(),
    );
    store.put(&LEAF_KEY, &account_leaf()).unwrap();
    store.close_log().unwrap();

    let rows = read_log_rows(&path).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(fs::read_to_string(&path)
        .unwrap()
        .starts_with("Operation,KeyHex,ValueHex,KeySize,ValueSize,Type\n"));
}
