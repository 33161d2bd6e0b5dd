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

//! Merkle proof construction and verification.

use super::{
    encoding::keybytes_to_hex, hasher::Hasher, node::Node, proof_set::ProofSet, rlp::decode_node,
    Trie,
};
use alloy_primitives::{keccak256, Bytes, B256};
use thiserror::Error;

/// Errors raised while verifying a Merkle proof.
///
/// A proof that simply does not cover the key is not an error: it proves
/// absence and verification yields `None`.
#[derive(Debug, Error)]
pub enum ProofError {
    /// A node required by the traversal is absent from the proof set.
    #[error("proof node {index} (hash {hash}) missing")]
    MissingProofNode { index: usize, hash: B256 },
    /// A supplied node failed to decode into a valid trie node.
    #[error("bad proof node {index}: {cause}")]
    MalformedProofNode { index: usize, cause: alloy_rlp::Error },
}

impl Trie {
    /// Constructs a Merkle proof for `key`: every encoded node on the path
    /// to the value is written into `proof`.
    ///
    /// If the trie does not contain a value for the key, the proof holds
    /// all nodes of the longest existing prefix of the key (at least the
    /// root node), ending with the node that proves the absence.
    pub fn prove(&self, key: &[u8], proof: &ProofSet) {
        // Collect all nodes on the path to key.
        let hex = keybytes_to_hex(key);
        let mut key = hex.as_slice();
        let mut nodes: Vec<&Node> = Vec::new();
        let mut current = self.root_node();
        while !key.is_empty() {
            let Some(node) = current else { break };
            match node {
                Node::Short(n) => {
                    if key.len() < n.key.len() || n.key[..] != key[..n.key.len()] {
                        // the trie doesn't contain the key
                        current = None;
                    } else {
                        current = Some(&n.val);
                        key = &key[n.key.len()..];
                    }
                    nodes.push(node);
                }
                Node::Full(n) => {
                    current = n.children[key[0] as usize].as_ref();
                    key = &key[1..];
                    nodes.push(node);
                }
                Node::Hash(_) | Node::Value(_) => {
                    panic!("MPT: invalid node on proof path")
                }
            }
        }

        let mut hasher = Hasher::new(false);
        for (i, n) in nodes.iter().enumerate() {
            let (collapsed, hashed) = hasher.proof_hash(n);
            if matches!(hashed, Node::Hash(_)) || i == 0 {
                // nodes referenced by hash, and the root regardless of its
                // size, become proof elements
                let enc = collapsed.rlp_encoded();
                let hash = match hashed {
                    Node::Hash(hash) => hash,
                    _ => keccak256(&enc),
                };
                proof.put(hash, enc.into());
            }
        }
        hasher.release();
    }
}

/// Checks a Merkle proof: walks the encoded nodes in `proof` from the
/// claimed `root` towards `key` and returns the stored value.
///
/// `Ok(None)` means the proof shows the key is absent from the trie.
pub fn verify_proof(root: B256, key: &[u8], proof: &ProofSet) -> Result<Option<Bytes>, ProofError> {
    let hex = keybytes_to_hex(key);
    let mut key = hex.as_slice();
    let mut want = root;
    let mut index = 0;
    loop {
        let Some(buf) = proof.get(&want) else {
            return Err(ProofError::MissingProofNode { index, hash: want });
        };
        let node = decode_node(Some(&want), &buf)
            .map_err(|cause| ProofError::MalformedProofNode { index, cause })?;
        match get(&node, key, true) {
            (_, None) => {
                // the trie doesn't contain the key
                return Ok(None);
            }
            (key_rest, Some(Node::Hash(hash))) => {
                key = key_rest;
                want = *hash;
            }
            (_, Some(Node::Value(value))) => return Ok(Some(value.clone())),
            _ => unreachable!("resolved node returned from proof walk"),
        }
        index += 1;
    }
}

/// Returns the descendant of `node` at `key`, or `None` if no node with
/// that key exists. With `skip_resolved` the walk only yields at a hash
/// reference, a value, or a dead end; otherwise it yields at every step.
fn get<'n, 'k>(
    mut node: &'n Node,
    mut key: &'k [u8],
    skip_resolved: bool,
) -> (&'k [u8], Option<&'n Node>) {
    loop {
        match node {
            Node::Short(n) => {
                if key.len() < n.key.len() || n.key[..] != key[..n.key.len()] {
                    return (key, None);
                }
                node = &n.val;
                key = &key[n.key.len()..];
                if !skip_resolved {
                    return (key, Some(node));
                }
            }
            Node::Full(n) => {
                match n.children[key[0] as usize].as_ref() {
                    Some(child) => node = child,
                    None => return (&key[1..], None),
                }
                key = &key[1..];
                if !skip_resolved {
                    return (key, Some(node));
                }
            }
            Node::Hash(_) => return (key, Some(node)),
            Node::Value(_) => return (&[], Some(node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpt::{TrieId, EMPTY_ROOT_HASH};
    use alloy_primitives::hex;

    fn test_trie() -> Trie {
        Trie::new(&TrieId::storage(B256::ZERO, keccak256(b"owner"), EMPTY_ROOT_HASH))
    }

    #[test]
    fn single_key_proof_is_one_node() {
        let key = hex!("0000000000000000000000000000000000000000000000000000000000000001");
        let value = hex!("820123"); // rlp(0x0123), stored as-is by the raw trie
        let mut trie = test_trie();
        trie.update(&key, &value);
        let root = trie.hash();

        let proof = ProofSet::new();
        trie.prove(&key, &proof);
        assert_eq!(proof.len(), 1);

        let got = verify_proof(root, &key, &proof).unwrap();
        assert_eq!(got.as_deref().map(|v| &**v), Some(&hex!("820123")[..]));
    }

    #[test]
    fn proof_round_trip() {
        let leaves: Vec<(B256, Vec<u8>)> =
            (0u64..128).map(|i| (keccak256(i.to_be_bytes()), alloy_rlp::encode(i))).collect();
        let mut trie = test_trie();
        for (key, value) in &leaves {
            trie.update(key.as_slice(), value);
        }
        let root = trie.hash();

        for (key, value) in &leaves {
            let proof = ProofSet::new();
            trie.prove(key.as_slice(), &proof);
            let got = verify_proof(root, key.as_slice(), &proof).unwrap();
            assert_eq!(got.as_deref().map(|v| &**v), Some(value.as_slice()));
        }
    }

    #[test]
    fn proof_works_on_unhashed_trie() {
        // proving does not require a prior hashing pass
        let key = keccak256(b"slot");
        let mut trie = test_trie();
        trie.update(key.as_slice(), &[0x2a]);
        let proof = ProofSet::new();
        trie.prove(key.as_slice(), &proof);

        let root = trie.hash();
        let got = verify_proof(root, key.as_slice(), &proof).unwrap();
        assert_eq!(got.as_deref().map(|v| &**v), Some(&[0x2a][..]));
    }

    #[test]
    fn absence_proof_verifies_to_none() {
        let mut trie = test_trie();
        for i in 0u64..64 {
            trie.update(keccak256(i.to_be_bytes()).as_slice(), &alloy_rlp::encode(i));
        }
        let root = trie.hash();

        let absent = keccak256(b"not inserted");
        let proof = ProofSet::new();
        trie.prove(absent.as_slice(), &proof);
        assert!(!proof.is_empty());
        assert_eq!(verify_proof(root, absent.as_slice(), &proof).unwrap(), None);
    }

    #[test]
    fn absence_proof_first_nibble_divergence() {
        // a single leaf whose hashed path differs from the queried key in
        // the first nibble still produces a usable (one node) proof
        let mut present = keccak256(b"a");
        let mut absent = keccak256(b"b");
        present.0[0] = 0x00;
        absent.0[0] = 0xf0;

        let mut trie = test_trie();
        trie.update(present.as_slice(), &[0x01]);
        let root = trie.hash();

        let proof = ProofSet::new();
        trie.prove(absent.as_slice(), &proof);
        assert_eq!(proof.len(), 1);
        assert_eq!(verify_proof(root, absent.as_slice(), &proof).unwrap(), None);
    }

    #[test]
    fn missing_node_is_detected() {
        let mut trie = test_trie();
        for i in 0u64..64 {
            trie.update(keccak256(i.to_be_bytes()).as_slice(), &alloy_rlp::encode(i));
        }
        let root = trie.hash();
        let key = keccak256(0u64.to_be_bytes());

        // an empty proof is missing its root node
        let empty = ProofSet::new();
        match verify_proof(root, key.as_slice(), &empty) {
            Err(ProofError::MissingProofNode { index: 0, hash }) => assert_eq!(hash, root),
            other => panic!("expected missing root node, got {other:?}"),
        }

        // drop everything but the root node: the walk stops one level down
        let full = ProofSet::new();
        trie.prove(key.as_slice(), &full);
        let truncated = ProofSet::new();
        truncated.put(root, full.get(&root).unwrap());
        match verify_proof(root, key.as_slice(), &truncated) {
            Err(ProofError::MissingProofNode { index: 1, .. }) => {}
            other => panic!("expected missing inner node, got {other:?}"),
        }
    }

    #[test]
    fn malformed_node_is_detected() {
        let root = keccak256(b"whatever");
        let proof = ProofSet::new();
        proof.put(root, Bytes::copy_from_slice(&hex!("c3010203")));
        match verify_proof(root, keccak256(b"key").as_slice(), &proof) {
            Err(ProofError::MalformedProofNode { index: 0, .. }) => {}
            other => panic!("expected malformed node, got {other:?}"),
        }
    }
}
