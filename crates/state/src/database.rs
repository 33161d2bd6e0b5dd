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

use crate::{config::Config, statedb::StateError};
use alloy_primitives::{keccak256, Address, B256};
use storage_trie::{SecureTrie, TrieId};
use tracing::debug;

/// Access to the tries backing the state.
///
/// Implementations must be shareable across the workers that flush state
/// objects in parallel.
pub trait Database: Send + Sync {
    /// Opens the storage trie of an account.
    fn open_storage_trie(
        &self,
        state_root: B256,
        address: Address,
        root: B256,
    ) -> Result<SecureTrie, StateError>;
}

/// In-memory [Database]: every open constructs a fresh secure trie owned
/// by the hash of the account's address.
///
/// A persistent node store would implement [Database] instead and load
/// the root node from disk.
#[derive(Debug, Clone, Default)]
pub struct CachingDb {
    config: Config,
}

impl CachingDb {
    pub fn new(config: Config) -> Self {
        CachingDb { config }
    }

    pub fn config(&self) -> Config {
        self.config
    }
}

impl Database for CachingDb {
    fn open_storage_trie(
        &self,
        state_root: B256,
        address: Address,
        root: B256,
    ) -> Result<SecureTrie, StateError> {
        // this backend only serves memory-resident tries
        assert!(self.config.in_memory_db_only, "CachingDb cannot open a persistent node store");
        debug!(%address, %root, "opening storage trie");
        let id = TrieId::storage(state_root, keccak256(address), root);
        let mut trie = SecureTrie::new(&id);
        trie.set_parallel_threshold(self.config.parallel_hash_threshold);
        Ok(trie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opened_trie_is_owned_by_address_hash() {
        let db = CachingDb::new(Config::default());
        let address = Address::repeat_byte(0x11);
        let trie = db.open_storage_trie(B256::ZERO, address, B256::ZERO).unwrap();
        assert_eq!(trie.owner(), keccak256(address));
    }

    #[test]
    #[should_panic(expected = "persistent node store")]
    fn rejects_persistent_mode() {
        let config = Config { in_memory_db_only: false, ..Config::default() };
        let db = CachingDb::new(config);
        let _ = db.open_storage_trie(B256::ZERO, Address::ZERO, B256::ZERO);
    }
}
