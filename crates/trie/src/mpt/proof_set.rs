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

use alloy_primitives::{map::B256HashMap, Bytes, B256};
use std::sync::RwLock;

/// An ordered, write-once set of RLP-encoded trie nodes keyed by their
/// Keccak hash.
///
/// Many readers and a single writer may use the set concurrently; the
/// order of insertion is preserved.
#[derive(Debug, Default)]
pub struct ProofSet {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: B256HashMap<Bytes>,
    order: Vec<B256>,
    data_size: usize,
}

impl ProofSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node in the set. Re-inserting a known key is a no-op.
    pub fn put(&self, key: B256, value: Bytes) {
        let mut inner = self.inner.write().expect("proof set lock poisoned");
        if inner.nodes.contains_key(&key) {
            return;
        }
        inner.data_size += value.len();
        inner.order.push(key);
        inner.nodes.insert(key, value);
    }

    /// Returns a stored node.
    pub fn get(&self, key: &B256) -> Option<Bytes> {
        self.inner.read().expect("proof set lock poisoned").nodes.get(key).cloned()
    }

    /// Whether the set contains the given key.
    pub fn has(&self, key: &B256) -> bool {
        self.inner.read().expect("proof set lock poisoned").nodes.contains_key(key)
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.inner.read().expect("proof set lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accumulated size of the stored node encodings.
    pub fn data_size(&self) -> usize {
        self.inner.read().expect("proof set lock poisoned").data_size
    }

    /// The stored nodes in insertion order.
    pub fn nodes(&self) -> Vec<Bytes> {
        let inner = self.inner.read().expect("proof set lock poisoned");
        inner.order.iter().map(|key| inner.nodes[key].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[test]
    fn put_preserves_order() {
        let set = ProofSet::new();
        let entries: Vec<(B256, Bytes)> = (0u8..5)
            .map(|i| (keccak256([i]), Bytes::copy_from_slice(&[i; 3])))
            .collect();
        for (key, value) in &entries {
            set.put(*key, value.clone());
        }
        assert_eq!(set.len(), 5);
        assert_eq!(set.data_size(), 15);
        let nodes = set.nodes();
        for (i, (_, value)) in entries.iter().enumerate() {
            assert_eq!(&nodes[i], value);
        }
    }

    #[test]
    fn duplicate_put_is_noop() {
        let set = ProofSet::new();
        let key = keccak256(b"node");
        set.put(key, Bytes::copy_from_slice(b"first"));
        set.put(key, Bytes::copy_from_slice(b"second"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&key).unwrap().as_ref(), b"first");
        assert_eq!(set.data_size(), 5);
    }

    #[test]
    fn get_missing() {
        let set = ProofSet::new();
        assert!(set.get(&keccak256(b"missing")).is_none());
        assert!(!set.has(&keccak256(b"missing")));
        assert!(set.is_empty());
    }
}
