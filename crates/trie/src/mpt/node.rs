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

use super::encoding::has_terminator;
use alloy_primitives::{Bytes, B256};

/// A node of the trie.
///
/// Empty child slots are represented as `Option::None` by the containing
/// node, so there is no explicit nil variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    /// A node with a single child; a leaf when the key carries the
    /// terminator nibble, an extension otherwise.
    Short(Box<ShortNode>),
    /// A 17-slot branch routing by one nibble.
    Full(Box<FullNode>),
    /// Reference to a node stored elsewhere, identified by its hash.
    Hash(B256),
    /// Raw stored bytes.
    Value(Bytes),
}

/// Caching metadata attached to short and full nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NodeFlag {
    /// Cached Keccak hash of the node's RLP encoding, if known.
    pub(crate) hash: Option<B256>,
    /// Whether the node carries changes not yet flushed anywhere.
    pub(crate) dirty: bool,
}

impl NodeFlag {
    /// Flag value for a freshly created or mutated node.
    pub(crate) fn dirty() -> Self {
        NodeFlag { hash: None, dirty: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShortNode {
    /// Hex-form key of the node. Never empty. Compact-form only in
    /// collapsed copies produced for hashing.
    pub(crate) key: Vec<u8>,
    pub(crate) val: Node,
    pub(crate) flags: NodeFlag,
}

/// Slots `0..=15` address children by nibble; slot 16 holds the value of a
/// path terminating at this branch. With secure keys every path is the
/// same length, so slot 16 stays empty; it is carried for RLP fidelity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FullNode {
    pub(crate) children: [Option<Node>; 17],
    pub(crate) flags: NodeFlag,
}

impl Node {
    /// The memoized hash of the node, if it has one.
    pub(crate) fn cached_hash(&self) -> Option<B256> {
        match self {
            Node::Short(n) => n.flags.hash,
            Node::Full(n) => n.flags.hash,
            Node::Hash(_) | Node::Value(_) => None,
        }
    }
}

#[allow(dead_code)]
impl ShortNode {
    /// Whether the node is a leaf, i.e. its child is the stored value.
    pub(crate) fn is_leaf(&self) -> bool {
        has_terminator(&self.key)
    }
}

#[allow(dead_code)]
impl FullNode {
    /// Number of occupied child slots.
    pub(crate) fn child_count(&self) -> usize {
        self.children.iter().flatten().count()
    }
}
