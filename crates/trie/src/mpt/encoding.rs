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

//! Conversions between the three key encodings used by the trie.
//!
//! - KEYBYTES: the raw key, as handed to `update` and friends.
//! - HEX: one byte per nibble, optionally followed by the terminator
//!   `0x10`. Keys of this form are used exclusively inside nodes held in
//!   memory.
//! - COMPACT: the hex form packed back into bytes behind a flag nibble
//!   carrying the even/odd length and terminator bits. This is the form
//!   written to RLP.

/// Sentinel nibble marking the end of a leaf path.
pub(super) const TERMINATOR: u8 = 0x10;

/// Expands a key into one byte per nibble, appending the terminator.
pub(super) fn keybytes_to_hex(key: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(key.len() * 2 + 1);
    for byte in key {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles.push(TERMINATOR);
    nibbles
}

/// Packs a hex path into its compact form.
///
/// The first nibble of the output holds `2 * terminator + odd`; even-length
/// paths get a zero pad nibble after it so that the rest packs byte-aligned.
pub(super) fn hex_to_compact(hex: &[u8]) -> Vec<u8> {
    let mut hex = hex;
    let mut terminator = 0u8;
    if has_terminator(hex) {
        terminator = 1;
        hex = &hex[..hex.len() - 1];
    }
    let mut buf = vec![0u8; hex.len() / 2 + 1];
    buf[0] = terminator << 5; // the flag nibble
    if hex.len() % 2 == 1 {
        buf[0] |= 1 << 4; // odd flag
        buf[0] |= hex[0]; // first nibble is contained in the first byte
        hex = &hex[1..];
    }
    for (i, chunk) in hex.chunks_exact(2).enumerate() {
        buf[i + 1] = chunk[0] << 4 | chunk[1];
    }
    buf
}

/// Unpacks a compact path back into hex form. Inverse of [`hex_to_compact`].
pub(super) fn compact_to_hex(compact: &[u8]) -> Vec<u8> {
    if compact.is_empty() {
        return Vec::new();
    }
    let mut base = keybytes_to_hex(compact);
    // delete terminator flag
    if base[0] < 2 {
        base.pop();
    }
    // apply odd flag
    let chop = 2 - (base[0] & 1) as usize;
    base.drain(..chop);
    base
}

/// Length of the common prefix of `a` and `b`, in nibbles.
pub(super) fn prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|&(x, y)| x == y).count()
}

/// Whether the hex path ends with the terminator nibble.
pub(super) fn has_terminator(hex: &[u8]) -> bool {
    hex.last() == Some(&TERMINATOR)
}
