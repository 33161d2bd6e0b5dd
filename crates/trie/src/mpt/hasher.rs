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

use super::{
    encoding::hex_to_compact,
    node::{FullNode, Node, NodeFlag, ShortNode},
};
use alloy_primitives::keccak256;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::sync::Mutex;

/// Initial capacity of the encoding buffer, as large as a full node.
const ENCODE_BUF_CAP: usize = 550;

/// Pool of idle hashers; workers borrow from here and return when done.
static HASHER_POOL: Lazy<Mutex<Vec<Hasher>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Collapses node subtrees into their canonical hashes.
pub(crate) struct Hasher {
    buf: Vec<u8>,
    /// Whether to hash the children of a full node on parallel workers.
    parallel: bool,
}

impl Hasher {
    /// Borrows a hasher from the pool, creating one if the pool is empty.
    pub(crate) fn new(parallel: bool) -> Self {
        let pooled = HASHER_POOL.lock().expect("hasher pool poisoned").pop();
        let mut hasher =
            pooled.unwrap_or_else(|| Hasher { buf: Vec::with_capacity(ENCODE_BUF_CAP), parallel: false });
        hasher.parallel = parallel;
        hasher
    }

    /// Returns the hasher to the pool.
    pub(crate) fn release(mut self) {
        self.buf.clear();
        HASHER_POOL.lock().expect("hasher pool poisoned").push(self);
    }

    /// Collapses a node into its hashed form, returning the hashed node
    /// and a cached copy of the original with the hash memoized.
    ///
    /// The hashed form is a hash reference, or the collapsed node itself
    /// when its encoding is shorter than 32 bytes and `force` is not set.
    pub(crate) fn hash(&mut self, n: Node, force: bool) -> (Node, Node) {
        if let Some(hash) = n.cached_hash() {
            return (Node::Hash(hash), n);
        }
        match n {
            Node::Short(short) => {
                let (collapsed, mut cached) = self.hash_short_children(*short);
                let hashed = self.short_node_to_hash(collapsed, force);
                if let Node::Hash(hash) = &hashed {
                    cached.flags.hash = Some(*hash);
                }
                (hashed, Node::Short(Box::new(cached)))
            }
            Node::Full(full) => {
                let (collapsed, mut cached) = self.hash_full_children(*full);
                let hashed = self.full_node_to_hash(collapsed, force);
                if let Node::Hash(hash) = &hashed {
                    cached.flags.hash = Some(*hash);
                }
                (hashed, Node::Full(Box::new(cached)))
            }
            // value and hash nodes have no children and are left unchanged
            n => (n.clone(), n),
        }
    }

    /// Computes `(collapsed, hashed)` for a node on a proof path. Unlike
    /// [`Hasher::hash`] the caller keeps the collapsed copy, which is what
    /// gets RLP-encoded into the proof.
    pub(crate) fn proof_hash(&mut self, n: &Node) -> (Node, Node) {
        match n {
            Node::Short(short) => {
                let (collapsed, _) = self.hash_short_children((**short).clone());
                let collapsed = Node::Short(Box::new(collapsed));
                let hashed = self.node_to_hash(collapsed.clone(), false);
                (collapsed, hashed)
            }
            Node::Full(full) => {
                let (collapsed, _) = self.hash_full_children((**full).clone());
                let collapsed = Node::Full(Box::new(collapsed));
                let hashed = self.node_to_hash(collapsed.clone(), false);
                (collapsed, hashed)
            }
            other => (other.clone(), other.clone()),
        }
    }

    /// Collapses a short node: the key is converted to compact form and
    /// the child subtree replaced by its hashed form.
    fn hash_short_children(&mut self, n: ShortNode) -> (ShortNode, ShortNode) {
        let ShortNode { key, val, flags } = n;
        let (hashed_val, cached_val) = match val {
            child @ (Node::Short(_) | Node::Full(_)) => self.hash(child, false),
            child => (child.clone(), child),
        };
        let collapsed =
            ShortNode { key: hex_to_compact(&key), val: hashed_val, flags: NodeFlag::default() };
        let cached = ShortNode { key, val: cached_val, flags };
        (collapsed, cached)
    }

    /// Collapses a full node by hashing all 16 children. Above the
    /// parallel threshold each child is hashed on its own worker with a
    /// hasher borrowed from the pool; results merge in slot order.
    fn hash_full_children(&mut self, n: FullNode) -> (FullNode, FullNode) {
        let FullNode { mut children, flags } = n;
        let mut collapsed = FullNode::default();
        let mut cached = FullNode { flags, ..Default::default() };

        let value = children[16].take();
        if self.parallel {
            let hashed: Vec<(Option<Node>, Option<Node>)> = children[..16]
                .par_iter_mut()
                .map(|slot| match slot.take() {
                    Some(child) => {
                        let mut hasher = Hasher::new(false);
                        let pair = hasher.hash(child, false);
                        hasher.release();
                        (Some(pair.0), Some(pair.1))
                    }
                    None => (None, None),
                })
                .collect();
            for (i, (hashed_child, cached_child)) in hashed.into_iter().enumerate() {
                collapsed.children[i] = hashed_child;
                cached.children[i] = cached_child;
            }
        } else {
            for i in 0..16 {
                if let Some(child) = children[i].take() {
                    let (hashed_child, cached_child) = self.hash(child, false);
                    collapsed.children[i] = Some(hashed_child);
                    cached.children[i] = Some(cached_child);
                }
            }
        }
        collapsed.children[16] = value.clone();
        cached.children[16] = value;
        (collapsed, cached)
    }

    fn short_node_to_hash(&mut self, n: ShortNode, force: bool) -> Node {
        self.node_to_hash(Node::Short(Box::new(n)), force)
    }

    fn full_node_to_hash(&mut self, n: FullNode, force: bool) -> Node {
        self.node_to_hash(Node::Full(Box::new(n)), force)
    }

    /// Hashes the RLP encoding of a collapsed node. Encodings shorter than
    /// 32 bytes are not hashed unless forced; the node itself is returned
    /// so the parent can embed it.
    fn node_to_hash(&mut self, n: Node, force: bool) -> Node {
        self.buf.clear();
        n.encode_into(&mut self.buf);
        if self.buf.len() < 32 && !force {
            return n;
        }
        Node::Hash(keccak256(&self.buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;

    fn leaf(key: Vec<u8>, value: &[u8]) -> Node {
        Node::Short(Box::new(ShortNode {
            key,
            val: Node::Value(Bytes::copy_from_slice(value)),
            flags: NodeFlag::dirty(),
        }))
    }

    #[test]
    fn forced_root_always_hashes() {
        // the encoding is 5 bytes, far below the embedding limit
        let node = leaf(vec![7, 16], &[0x01, 0x23]);
        let mut hasher = Hasher::new(false);
        let (hashed, _) = hasher.hash(node, true);
        assert!(matches!(hashed, Node::Hash(_)));
        hasher.release();
    }

    #[test]
    fn small_nodes_embed() {
        let node = leaf(vec![7, 16], &[0x01, 0x23]);
        let mut hasher = Hasher::new(false);
        let (hashed, _) = hasher.hash(node, false);
        assert!(matches!(hashed, Node::Short(_)));
        hasher.release();
    }

    #[test]
    fn large_nodes_hash() {
        let node = leaf(vec![7, 16], &[0xab; 40]);
        let mut hasher = Hasher::new(false);
        let (hashed, _) = hasher.hash(node, false);
        assert!(matches!(hashed, Node::Hash(_)));
        hasher.release();
    }

    #[test]
    fn hash_memoizes() {
        let node = leaf(vec![7, 16], &[0xab; 40]);
        let mut hasher = Hasher::new(false);
        let (hashed, cached) = hasher.hash(node, false);
        let Node::Hash(expect) = hashed else { panic!("expected hash node") };
        assert_eq!(cached.cached_hash(), Some(expect));

        // hashing the cached node again returns the memoized value
        let (rehashed, _) = hasher.hash(cached, false);
        assert!(matches!(rehashed, Node::Hash(h) if h == expect));
        hasher.release();
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut branch = FullNode { flags: NodeFlag::dirty(), ..Default::default() };
        for i in 0..16u8 {
            branch.children[i as usize] = Some(leaf(vec![i, 16], &[i; 40]));
        }

        let mut sequential = Hasher::new(false);
        let (expect, _) = sequential.hash(Node::Full(Box::new(branch.clone())), true);
        sequential.release();

        let mut parallel = Hasher::new(true);
        let (got, _) = parallel.hash(Node::Full(Box::new(branch)), true);
        parallel.release();

        assert_eq!(expect, got);
    }
}
