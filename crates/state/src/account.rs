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

use alloy_primitives::B256;
use storage_trie::EMPTY_ROOT_HASH;

/// An account as tracked by the state layer: a bare storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateAccount {
    /// Root of the account's storage trie.
    pub root: B256,
}

impl StateAccount {
    /// An account with no storage.
    pub fn empty() -> Self {
        StateAccount { root: EMPTY_ROOT_HASH }
    }
}

impl Default for StateAccount {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_account_has_empty_root() {
        assert_eq!(StateAccount::empty().root, EMPTY_ROOT_HASH);
        assert_eq!(StateAccount::default(), StateAccount::empty());
    }
}
