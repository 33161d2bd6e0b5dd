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

//! An in-memory Merkle Patricia trie.

use alloy_primitives::{Bytes, B256};

use encoding::{keybytes_to_hex, prefix_len};
use hasher::Hasher;
use node::{FullNode, Node, NodeFlag, ShortNode};

mod encoding;
mod hasher;
mod node;
pub(crate) mod proof;
pub(crate) mod proof_set;
pub(crate) mod rlp;
pub(crate) mod secure;

pub use alloy_trie::EMPTY_ROOT_HASH;

/// Number of unhashed leaves above which a root hashing operation spreads
/// the children of a full node across parallel workers.
pub const PARALLEL_HASH_THRESHOLD: usize = 100;

/// Identifier of a trie within a larger state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrieId {
    /// Root of the state the trie belongs to.
    pub state_root: B256,
    /// Keccak hash of the owning account's address.
    pub owner: B256,
    /// Root hash of the trie itself.
    pub root: B256,
}

impl TrieId {
    /// Identifier for the storage trie of account `owner` within the state
    /// rooted at `state_root`.
    pub fn storage(state_root: B256, owner: B256, root: B256) -> Self {
        TrieId { state_root, owner, root }
    }
}

/// A Merkle Patricia trie storing byte values under nibble paths.
///
/// The trie is purely in memory; the owner hash namespaces its identity
/// but takes no part in node hashing. Keys are routed by their hex-nibble
/// expansion, values live in leaf nodes behind the path terminator.
///
/// Not safe for concurrent mutation.
#[derive(Debug, Clone)]
pub struct Trie {
    root: Option<Node>,
    owner: B256,

    /// Leaves inserted since the last hashing operation. Does not map
    /// one-to-one to the number of actually unhashed nodes.
    unhashed: usize,
    /// Updates since the last commit.
    uncommitted: usize,

    parallel_threshold: usize,
}

impl Trie {
    /// Creates an empty trie with the identity taken from `id`.
    pub fn new(id: &TrieId) -> Self {
        Trie {
            root: None,
            owner: id.owner,
            unhashed: 0,
            uncommitted: 0,
            parallel_threshold: PARALLEL_HASH_THRESHOLD,
        }
    }

    /// Keccak hash of the owning account's address.
    pub fn owner(&self) -> B256 {
        self.owner
    }

    /// Whether the trie holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Updates since the last commit.
    pub fn uncommitted(&self) -> usize {
        self.uncommitted
    }

    /// Overrides the unhashed-leaf count above which root hashing uses
    /// parallel workers.
    pub fn set_parallel_threshold(&mut self, threshold: usize) {
        self.parallel_threshold = threshold;
    }

    /// Retrieves the value associated with `key`, if the trie contains it.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let hex = keybytes_to_hex(key);
        let mut key = hex.as_slice();
        let mut node = self.root.as_ref();
        loop {
            match node? {
                Node::Short(n) => {
                    if key.len() < n.key.len() || n.key[..] != key[..n.key.len()] {
                        return None;
                    }
                    key = &key[n.key.len()..];
                    node = Some(&n.val);
                }
                Node::Full(n) => {
                    node = n.children[key[0] as usize].as_ref();
                    key = &key[1..];
                }
                Node::Value(value) => return Some(value.as_ref()),
                Node::Hash(_) => panic!("MPT: unresolved node access"),
            }
        }
    }

    /// Associates `key` with `value` in the trie.
    ///
    /// An empty value leaves the trie untouched: removal is not supported.
    pub fn update(&mut self, key: &[u8], value: &[u8]) {
        self.unhashed += 1;
        self.uncommitted += 1;
        let k = keybytes_to_hex(key);
        if value.is_empty() {
            return;
        }
        let root = self.root.take();
        let (_, new_root) = Self::insert(root, &k, Node::Value(Bytes::copy_from_slice(value)));
        self.root = Some(new_root);
    }

    /// Inserts `value` at `key` below `node`, returning whether anything
    /// changed along with the replacement subtree. Every node on a changed
    /// path comes back dirty with no cached hash.
    fn insert(node: Option<Node>, key: &[u8], value: Node) -> (bool, Node) {
        if key.is_empty() {
            // at the target position; an equal value is reported clean
            if let (Some(Node::Value(old)), Node::Value(new)) = (&node, &value) {
                if old == new {
                    return (false, node.expect("checked above"));
                }
            }
            return (true, value);
        }
        match node {
            Some(Node::Short(short)) => {
                let ShortNode { key: skey, val, flags } = *short;
                let matchlen = prefix_len(key, &skey);
                if matchlen == skey.len() {
                    // the whole short key is a prefix, recurse into the child
                    let (dirty, child) = Self::insert(Some(val), &key[matchlen..], value);
                    let flags = if dirty { NodeFlag::dirty() } else { flags };
                    return (dirty, Node::Short(Box::new(ShortNode { key: skey, val: child, flags })));
                }
                // the paths diverge, branch out at the first differing nibble
                let mut branch = FullNode { flags: NodeFlag::dirty(), ..Default::default() };
                let (_, existing) = Self::insert(None, &skey[matchlen + 1..], val);
                branch.children[skey[matchlen] as usize] = Some(existing);
                let (_, fresh) = Self::insert(None, &key[matchlen + 1..], value);
                branch.children[key[matchlen] as usize] = Some(fresh);
                let branch = Node::Full(Box::new(branch));
                if matchlen == 0 {
                    // no common prefix, the branch replaces the short node
                    return (true, branch);
                }
                // a short node with the common prefix leads to the branch
                (
                    true,
                    Node::Short(Box::new(ShortNode {
                        key: key[..matchlen].to_vec(),
                        val: branch,
                        flags: NodeFlag::dirty(),
                    })),
                )
            }
            Some(Node::Full(mut full)) => {
                let idx = key[0] as usize;
                let child = full.children[idx].take();
                let (dirty, new_child) = Self::insert(child, &key[1..], value);
                full.children[idx] = Some(new_child);
                if dirty {
                    full.flags = NodeFlag::dirty();
                }
                (dirty, Node::Full(full))
            }
            None => {
                // empty trie or empty slot in a full node
                (
                    true,
                    Node::Short(Box::new(ShortNode {
                        key: key.to_vec(),
                        val: value,
                        flags: NodeFlag::dirty(),
                    })),
                )
            }
            Some(Node::Hash(_)) => panic!("MPT: unresolved node in insert"),
            Some(Node::Value(_)) => panic!("MPT: value node with trailing key"),
        }
    }

    /// Root hash of the trie. Does not write anywhere; usable at any time.
    pub fn hash(&mut self) -> B256 {
        let (hashed, cached) = self.hash_root();
        self.root = cached;
        match hashed {
            Node::Hash(hash) => hash,
            _ => unreachable!("forced root hashing yields a hash node"),
        }
    }

    fn hash_root(&mut self) -> (Node, Option<Node>) {
        let Some(root) = self.root.take() else {
            return (Node::Hash(EMPTY_ROOT_HASH), None);
        };
        // below the threshold a single worker handles the whole trie
        let mut hasher = Hasher::new(self.unhashed >= self.parallel_threshold);
        let (hashed, cached) = hasher.hash(root, true);
        hasher.release();
        self.unhashed = 0;
        (hashed, Some(cached))
    }

    pub(crate) fn root_node(&self) -> Option<&Node> {
        self.root.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{b256, hex, keccak256};
    use alloy_trie::{HashBuilder, Nibbles};
    use std::borrow::Borrow;

    fn test_trie() -> Trie {
        Trie::new(&TrieId::storage(B256::ZERO, keccak256(b"owner"), EMPTY_ROOT_HASH))
    }

    /// Reference root computed with alloy's hash builder.
    fn trie_root<K, V>(iter: impl IntoIterator<Item = impl Borrow<(K, V)>>) -> B256
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut hb = HashBuilder::default();
        let mut sorted: Vec<_> = iter.into_iter().collect();
        sorted.sort_by(|a, b| a.borrow().0.as_ref().cmp(b.borrow().0.as_ref()));
        for (key, val) in sorted.iter().map(Borrow::borrow) {
            hb.add_leaf(Nibbles::unpack(key), val.as_ref());
        }
        hb.root()
    }

    #[test]
    fn empty_root() {
        let mut trie = test_trie();
        assert_eq!(
            trie.hash(),
            b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
        );
        assert_eq!(trie.hash(), EMPTY_ROOT_HASH);
        assert!(trie.is_empty());
    }

    #[test]
    fn single_leaf_root() {
        let mut trie = test_trie();
        let key = hex!("0000000000000000000000000000000000000000000000000000000000000001");
        let value = hex!("0123");
        trie.update(&key, &value);
        assert_ne!(trie.hash(), EMPTY_ROOT_HASH);
        assert_eq!(trie.hash(), trie_root([(key, value)]));

        // the root must be a single leaf
        let root = trie.root_node().unwrap();
        let Node::Short(short) = root else { panic!("expected short node") };
        assert!(short.is_leaf());
    }

    #[test]
    fn shared_prefix_splits_into_branch() {
        // two keys sharing their first four nibbles
        let k1 = hex!("7777000000000000000000000000000000000000000000000000000000000000");
        let k2 = hex!("7777110000000000000000000000000000000000000000000000000000000000");
        let v1 = [0x11u8; 32];
        let v2 = [0x22u8; 32];

        let mut trie = test_trie();
        trie.update(&k1, &v1);
        trie.update(&k2, &v2);
        assert_eq!(trie.hash(), trie_root([(k1, v1), (k2, v2)]));

        // an extension with the shared prefix sits above a two-slot branch
        let Some(Node::Short(ext)) = trie.root_node() else { panic!("expected short node") };
        assert!(!ext.is_leaf());
        assert_eq!(ext.key, vec![7, 7, 7, 7]);
        let Node::Full(branch) = &ext.val else { panic!("expected full node") };
        assert_eq!(branch.child_count(), 2);
        assert!(branch.children[0].is_some());
        assert!(branch.children[1].is_some());
    }

    #[test]
    fn known_root() {
        // go-ethereum's classic insertion vector with its published root
        let mut trie = test_trie();
        trie.update(b"doe", b"reindeer");
        trie.update(b"dog", b"puppy");
        trie.update(b"dogglesworth", b"cat");
        assert_eq!(
            trie.hash(),
            b256!("8aad789dff2f538bca5d8ea56e8abe10f4c7ba3a5dea95fea4cd6e7c3a1168d3")
        );
    }

    #[test]
    fn get_returns_inserted_values() {
        let leaves = [
            ("painting", "place"),
            ("guest", "ship"),
            ("mud", "leave"),
            ("paper", "call"),
            ("gate", "boast"),
            ("tongue", "gain"),
            ("baseball", "wait"),
            ("tale", "lie"),
            ("mood", "cope"),
            ("menu", "fear"),
        ];
        let mut trie = test_trie();
        for (key, value) in leaves {
            trie.update(key.as_bytes(), value.as_bytes());
        }
        for (key, value) in leaves {
            assert_eq!(trie.get(key.as_bytes()), Some(value.as_bytes()));
        }
        assert_eq!(trie.get(b"unknown"), None);
        assert_eq!(trie.get(b"pain"), None);
        assert_eq!(trie.hash(), trie_root(&leaves));

        // reads keep working after the nodes have been collapsed and cached
        assert_eq!(trie.get(b"painting"), Some("place".as_bytes()));
    }

    #[test]
    fn overwrite_replaces_value() {
        let key = keccak256(b"slot");
        let mut trie = test_trie();
        trie.update(key.as_slice(), &[0x01]);
        trie.update(key.as_slice(), &[0x02]);

        let mut expect = test_trie();
        expect.update(key.as_slice(), &[0x02]);
        assert_eq!(trie.hash(), expect.hash());
    }

    #[test]
    fn overwrite_same_value_is_clean() {
        let key = keccak256(b"slot");
        let mut trie = test_trie();
        trie.update(key.as_slice(), &[0x01]);
        let root = trie.hash();
        trie.update(key.as_slice(), &[0x01]);
        assert_eq!(trie.hash(), root);
    }

    #[test]
    fn empty_value_is_noop() {
        let key = keccak256(b"slot");
        let mut trie = test_trie();
        trie.update(key.as_slice(), &[0x01]);
        let root = trie.hash();
        trie.update(keccak256(b"other").as_slice(), &[]);
        assert_eq!(trie.hash(), root);
        assert_eq!(trie.uncommitted(), 2);
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let leaves: Vec<(B256, Vec<u8>)> =
            (0u64..64).map(|i| (keccak256(i.to_be_bytes()), alloy_rlp::encode(i))).collect();

        let mut forward = test_trie();
        for (key, value) in &leaves {
            forward.update(key.as_slice(), value);
        }
        let mut reverse = test_trie();
        for (key, value) in leaves.iter().rev() {
            reverse.update(key.as_slice(), value);
        }
        let mut interleaved = test_trie();
        for (key, value) in leaves.iter().step_by(2).chain(leaves.iter().skip(1).step_by(2)) {
            interleaved.update(key.as_slice(), value);
        }

        let expect = trie_root(leaves.iter().map(|(k, v)| (k.as_slice(), v.as_slice())));
        assert_eq!(forward.hash(), expect);
        assert_eq!(reverse.hash(), expect);
        assert_eq!(interleaved.hash(), expect);
    }

    #[test]
    fn keccak_trie_matches_reference() {
        let leaves: Vec<(B256, Vec<u8>)> =
            (0u64..512).map(|i| (keccak256(i.to_be_bytes()), alloy_rlp::encode(i))).collect();

        let mut trie = test_trie();
        for (key, value) in &leaves {
            trie.update(key.as_slice(), value);
        }
        assert_eq!(trie.hash(), trie_root(leaves.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))));
    }

    #[test]
    fn parallel_threshold_does_not_change_root() {
        let leaves: Vec<(B256, Vec<u8>)> =
            (0u64..256).map(|i| (keccak256(i.to_be_bytes()), alloy_rlp::encode(i))).collect();

        let mut single = test_trie();
        single.set_parallel_threshold(usize::MAX);
        let mut parallel = test_trie();
        parallel.set_parallel_threshold(0);
        for (key, value) in &leaves {
            single.update(key.as_slice(), value);
            parallel.update(key.as_slice(), value);
        }
        assert_eq!(single.hash(), parallel.hash());
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let mut trie = test_trie();
        for i in 0u64..32 {
            trie.update(keccak256(i.to_be_bytes()).as_slice(), &alloy_rlp::encode(i));
        }
        let first = trie.hash();
        // the second call serves everything from the memoized hashes
        assert_eq!(trie.hash(), first);

        // mutating afterwards invalidates the affected path
        trie.update(keccak256(99u64.to_be_bytes()).as_slice(), &alloy_rlp::encode(99u64));
        assert_ne!(trie.hash(), first);
    }
}
