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
    encoding::{compact_to_hex, has_terminator},
    node::{FullNode, Node, NodeFlag, ShortNode},
};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::{Encodable, Header, PayloadView, EMPTY_STRING_CODE};

impl Node {
    /// Returns the RLP encoding of a collapsed node.
    ///
    /// The node must be collapsed: short-node keys in compact form,
    /// children already reduced to hash references or embedded nodes.
    pub(crate) fn rlp_encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.rlp_length());
        self.encode_into(&mut out);
        out
    }

    fn rlp_length(&self) -> usize {
        match self {
            Node::Short(n) => {
                let payload = n.key.as_slice().length() + n.val.rlp_length();
                Header { list: true, payload_length: payload }.length() + payload
            }
            Node::Full(n) => {
                let payload: usize = n
                    .children
                    .iter()
                    .map(|child| child.as_ref().map_or(1, Node::rlp_length))
                    .sum();
                Header { list: true, payload_length: payload }.length() + payload
            }
            Node::Hash(h) => h.as_slice().length(),
            Node::Value(v) => v.as_ref().length(),
        }
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Node::Short(n) => {
                let payload = n.key.as_slice().length() + n.val.rlp_length();
                Header { list: true, payload_length: payload }.encode(out);
                n.key.as_slice().encode(out);
                n.val.encode_into(out);
            }
            Node::Full(n) => {
                let payload: usize = n
                    .children
                    .iter()
                    .map(|child| child.as_ref().map_or(1, Node::rlp_length))
                    .sum();
                Header { list: true, payload_length: payload }.encode(out);
                for child in &n.children {
                    match child {
                        Some(node) => node.encode_into(out),
                        None => out.push(EMPTY_STRING_CODE),
                    }
                }
            }
            Node::Hash(h) => h.as_slice().encode(out),
            Node::Value(v) => v.as_ref().encode(out),
        }
    }
}

/// Decodes an RLP-encoded trie node, converting compact keys back to hex
/// form. The node's known hash, if any, is recorded in its flags.
pub(crate) fn decode_node(hash: Option<&B256>, buf: &[u8]) -> alloy_rlp::Result<Node> {
    match Header::decode_raw(&mut &buf[..])? {
        PayloadView::String(_) => Err(alloy_rlp::Error::Custom("expected node list")),
        PayloadView::List(items) => match items.len() {
            // leaf or extension node: 2-item node [ encodedPath, v ]
            2 => decode_short(hash, &items),
            // branch node: 17-item node [ v0 ... v15, value ]
            17 => decode_full(hash, &items),
            _ => Err(alloy_rlp::Error::Custom("invalid number of list elements")),
        },
    }
}

fn decode_short(hash: Option<&B256>, items: &[&[u8]]) -> alloy_rlp::Result<Node> {
    let compact = Header::decode_bytes(&mut &items[0][..], false)?;
    let key = compact_to_hex(compact);
    let flags = NodeFlag { hash: hash.copied(), dirty: false };
    if has_terminator(&key) {
        // leaf node, the value is a byte string
        let val = Header::decode_bytes(&mut &items[1][..], false)?;
        let val = Node::Value(Bytes::copy_from_slice(val));
        return Ok(Node::Short(Box::new(ShortNode { key, val, flags })));
    }
    let val = decode_ref(items[1])?
        .ok_or(alloy_rlp::Error::Custom("extension node with empty child"))?;
    Ok(Node::Short(Box::new(ShortNode { key, val, flags })))
}

fn decode_full(hash: Option<&B256>, items: &[&[u8]]) -> alloy_rlp::Result<Node> {
    let mut node = FullNode { flags: NodeFlag { hash: hash.copied(), dirty: false }, ..Default::default() };
    for (i, item) in items.iter().enumerate().take(16) {
        node.children[i] = decode_ref(item)?;
    }
    // slot 16 is a plain value, not a node reference
    let val = Header::decode_bytes(&mut &items[16][..], false)?;
    if !val.is_empty() {
        node.children[16] = Some(Node::Value(Bytes::copy_from_slice(val)));
    }
    Ok(Node::Full(Box::new(node)))
}

/// Decodes a child reference: an empty string for a missing child, a
/// 32-byte string for a hash reference, or a nested list for a node
/// embedded inline.
fn decode_ref(buf: &[u8]) -> alloy_rlp::Result<Option<Node>> {
    match Header::decode_raw(&mut &buf[..])? {
        PayloadView::List(_) => {
            // an embedded node must be shorter than a hash reference
            if buf.len() >= B256::len_bytes() {
                return Err(alloy_rlp::Error::Custom("oversized embedded node"));
            }
            decode_node(None, buf).map(Some)
        }
        PayloadView::String(payload) => match payload.len() {
            0 => Ok(None),
            32 => Ok(Some(Node::Hash(B256::from_slice(payload)))),
            _ => Err(alloy_rlp::Error::UnexpectedLength),
        },
    }
}
