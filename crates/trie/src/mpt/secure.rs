// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{proof_set::ProofSet, Trie, TrieId};
use alloy_primitives::{keccak256, Address, B256};

/// A trie with key hashing.
///
/// All access operations hash the key with Keccak-256 before indexing.
/// This prevents calling code from creating long chains of nodes that
/// increase the access time, and bounds every path at 64 nibbles.
///
/// Not safe for concurrent use.
#[derive(Debug, Clone)]
pub struct SecureTrie {
    trie: Trie,
}

impl SecureTrie {
    /// Creates an empty secure trie with the identity taken from `id`.
    pub fn new(id: &TrieId) -> Self {
        SecureTrie { trie: Trie::new(id) }
    }

    /// Associates `key` with `value` in the trie.
    ///
    /// The key is replaced by its Keccak-256 hash and the value is stored
    /// RLP-encoded with leading zero bytes removed. An empty value leaves
    /// the trie untouched.
    pub fn update_storage(&mut self, _addr: Address, key: &[u8], value: &[u8]) {
        let hk = self.hash_key(key);
        let v = alloy_rlp::encode(trim_left_zeroes(value));
        self.trie.update(hk.as_slice(), &v);
    }

    /// Retrieves the value associated with `key`, stripping the RLP
    /// wrapper the trie stores values in.
    pub fn get_storage(&self, key: &[u8]) -> alloy_rlp::Result<Option<Vec<u8>>> {
        let hk = self.hash_key(key);
        match self.trie.get(hk.as_slice()) {
            Some(mut raw) => {
                let content = alloy_rlp::Header::decode_bytes(&mut raw, false)?;
                Ok(Some(content.to_vec()))
            }
            None => Ok(None),
        }
    }

    /// Keccak-256 of the raw key; the namespace all trie paths live in.
    /// Proofs are constructed against hashed keys.
    pub fn hash_key(&self, key: &[u8]) -> B256 {
        keccak256(key)
    }

    /// Root hash of the trie.
    pub fn hash(&mut self) -> B256 {
        self.trie.hash()
    }

    /// Constructs a Merkle proof for the **hashed** key `key`. See
    /// [`Trie::prove`].
    pub fn prove(&self, key: &[u8], proof: &ProofSet) {
        self.trie.prove(key, proof)
    }

    /// Keccak hash of the owning account's address.
    pub fn owner(&self) -> B256 {
        self.trie.owner()
    }

    /// Updates since the last commit.
    pub fn uncommitted(&self) -> usize {
        self.trie.uncommitted()
    }

    /// See [`Trie::set_parallel_threshold`].
    pub fn set_parallel_threshold(&mut self, threshold: usize) {
        self.trie.set_parallel_threshold(threshold)
    }
}

/// Returns `bytes` without its leading zero bytes.
pub fn trim_left_zeroes(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpt::{proof::verify_proof, EMPTY_ROOT_HASH};
    use alloy_primitives::hex;

    fn secure_trie() -> SecureTrie {
        let owner = keccak256(Address::ZERO);
        SecureTrie::new(&TrieId::storage(B256::ZERO, owner, EMPTY_ROOT_HASH))
    }

    #[test]
    fn trim_zeroes() {
        assert_eq!(trim_left_zeroes(&[0, 0, 1, 0, 2]), &[1, 0, 2]);
        assert_eq!(trim_left_zeroes(&[1, 2]), &[1, 2]);
        assert_eq!(trim_left_zeroes(&[0, 0]), &[] as &[u8]);
        assert_eq!(trim_left_zeroes(&[]), &[] as &[u8]);
    }

    #[test]
    fn keys_are_hashed_values_rlp_encoded() {
        let key = hex!("0000000000000000000000000000000000000000000000000000000000000001");
        let value = hex!("0000000000000000000000000000000000000000000000000000000000000123");

        let mut secure = secure_trie();
        secure.update_storage(Address::ZERO, &key, trim_left_zeroes(&value));

        // equivalent plain-trie shape: hashed key, rlp(0x0123)
        let mut plain = Trie::new(&TrieId::storage(B256::ZERO, keccak256(Address::ZERO), EMPTY_ROOT_HASH));
        plain.update(keccak256(key).as_slice(), &hex!("820123"));

        assert_eq!(secure.hash(), plain.hash());
    }

    #[test]
    fn proof_against_hashed_namespace() {
        let key = hex!("0000000000000000000000000000000000000000000000000000000000000001");
        let value = hex!("0000000000000000000000000000000000000000000000000000000000000123");

        let mut secure = secure_trie();
        secure.update_storage(Address::ZERO, &key, &value);
        let root = secure.hash();

        let proof = ProofSet::new();
        let hashed = secure.hash_key(&key);
        secure.prove(hashed.as_slice(), &proof);

        let got = verify_proof(root, hashed.as_slice(), &proof).unwrap();
        assert_eq!(got.as_deref().map(|v| &**v), Some(&hex!("820123")[..]));
    }

    #[test]
    fn get_storage_strips_rlp_wrapper() {
        let key = hex!("0000000000000000000000000000000000000000000000000000000000000007");
        let value = hex!("00000000000000000000000000000000000000000000000000000000cafe0000");

        let mut secure = secure_trie();
        secure.update_storage(Address::ZERO, &key, &value);

        let got = secure.get_storage(&key).unwrap();
        assert_eq!(got.as_deref(), Some(&hex!("cafe0000")[..]));
        assert_eq!(secure.get_storage(&hex!("ff")).unwrap(), None);
    }

    #[test]
    fn owner_is_metadata_only() {
        // two tries with different owners agree on the root hash
        let mut a = SecureTrie::new(&TrieId::storage(B256::ZERO, keccak256(b"a"), EMPTY_ROOT_HASH));
        let mut b = SecureTrie::new(&TrieId::storage(B256::ZERO, keccak256(b"b"), EMPTY_ROOT_HASH));
        let key = hex!("00000000000000000000000000000000000000000000000000000000000000aa");
        a.update_storage(Address::ZERO, &key, &[0x07]);
        b.update_storage(Address::ZERO, &key, &[0x07]);
        assert_ne!(a.owner(), b.owner());
        assert_eq!(a.hash(), b.hash());
    }
}
