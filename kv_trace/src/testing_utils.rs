use ethereum_types::{H256, U256};
use rlp::RlpStream;

use crate::extract::AccountRlp;

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

/// A short node with the given compact path whose second item is `value`.
pub(crate) fn leaf_node(compact_path: &[u8], value: &[u8]) -> Vec<u8> {
    let mut s = RlpStream::new_list(2);
    s.append(&compact_path.to_vec()).append(&value.to_vec());
    s.out().to_vec()
}

/// A short node pointing at a hashed child.
pub(crate) fn extension_node(compact_path: &[u8], child: &[u8]) -> Vec<u8> {
    leaf_node(compact_path, child)
}

/// A full node whose first child is a byte string starting with `first_byte`,
/// so it can be mistaken for a compact path if the item count is ignored.
pub(crate) fn branch_node(first_byte: u8) -> Vec<u8> {
    let mut s = RlpStream::new_list(17);
    s.append(&vec![first_byte, 0x12, 0x34]);
    for _ in 0..16 {
        s.append_empty_data();
    }
    s.out().to_vec()
}

/// An encoded account with an empty storage root and code hash.
pub(crate) fn account_rlp(nonce: u64, balance: u64) -> Vec<u8> {
    rlp::encode(&AccountRlp {
        nonce: U256::from(nonce),
        balance: U256::from(balance),
        storage_root: H256::repeat_byte(0x56),
        code_hash: H256::repeat_byte(0xc5),
    })
    .to_vec()
}
