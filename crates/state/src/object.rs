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

use crate::{account::StateAccount, database::Database, journal::Journal, statedb::StateError};
use alloy_primitives::{keccak256, map::B256HashMap, Address, B256};
use storage_trie::{trim_left_zeroes, SecureTrie};
use tracing::{debug, trace};

/// A map of storage slots to their values.
pub(crate) type Storage = B256HashMap<B256>;

/// An account in the state database together with its staged storage
/// mutations.
///
/// Writes move through three stages: `set_state` puts them into dirty
/// storage, `finalise` promotes them to pending at the end of a
/// transaction, and `update_trie` pushes the net changes of the block
/// into the storage trie.
#[derive(Debug)]
pub struct StateObject {
    address: Address,
    addr_hash: B256,
    /// Account state at the last commit, `None` for a created account.
    origin: Option<StateAccount>,
    /// Account data with all mutations applied in the scope of the block.
    data: StateAccount,

    /// Storage trie, opened on first mutation flush.
    trie: Option<SecureTrie>,

    /// Slots modified in the current transaction.
    dirty_storage: Storage,
    /// Slots modified within the current block.
    pending_storage: Storage,
    /// Slots modified since the last commit, mapped to their value at the
    /// last commit. Decides whether a pending value is a net change.
    uncommitted_storage: Storage,
}

impl StateObject {
    pub(crate) fn new(address: Address, account: Option<StateAccount>) -> Self {
        StateObject {
            address,
            addr_hash: keccak256(address),
            origin: account,
            data: account.unwrap_or_default(),
            trie: None,
            dirty_storage: Storage::default(),
            pending_storage: Storage::default(),
            uncommitted_storage: Storage::default(),
        }
    }

    /// Address of the account.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Keccak hash of the account's address; the owner of its storage trie.
    pub fn addr_hash(&self) -> B256 {
        self.addr_hash
    }

    /// Storage root with all flushed mutations applied.
    pub fn root(&self) -> B256 {
        self.data.root
    }

    /// Account state at the last commit, if the account existed.
    pub fn origin(&self) -> Option<StateAccount> {
        self.origin
    }

    /// Retrieves the value associated with `key`, as seen by the current
    /// transaction.
    pub fn get_state(&self, key: B256) -> B256 {
        let (value, _) = self.get_state_with_origin(key);
        value
    }

    /// Retrieves a slot value along with its committed baseline.
    fn get_state_with_origin(&self, key: B256) -> (B256, B256) {
        let origin = self.get_committed_state(key);
        if let Some(value) = self.dirty_storage.get(&key) {
            return (*value, origin);
        }
        (origin, origin)
    }

    /// Retrieves the value associated with `key` without any mutations
    /// caused by the current execution.
    pub fn get_committed_state(&self, key: B256) -> B256 {
        if let Some(value) = self.pending_storage.get(&key) {
            return *value;
        }
        // no persistent layer to fall back to
        B256::ZERO
    }

    /// Updates a value in account storage and returns the previous value.
    ///
    /// Writing the value a slot already has is a no-op; writing a slot
    /// back to its committed baseline removes the dirty marker, so a fully
    /// reverted transaction leaves no trace beyond the journal.
    pub(crate) fn set_state(&mut self, key: B256, value: B256, journal: &mut Journal) -> B256 {
        let (prev, origin) = self.get_state_with_origin(key);
        if prev == value {
            return prev;
        }
        trace!(address = %self.address, %key, %value, %prev, "setting storage slot");
        journal.storage_change(self.address, key, prev, origin);
        self.set_state_inner(key, value, origin);
        prev
    }

    fn set_state_inner(&mut self, key: B256, value: B256, origin: B256) {
        if value == origin {
            self.dirty_storage.remove(&key);
            return;
        }
        self.dirty_storage.insert(key, value);
    }

    /// Moves all dirty storage slots into the pending area, tracking the
    /// committed baseline of each first-touched slot. Invoked at the end
    /// of every transaction.
    pub(crate) fn finalise(&mut self) {
        for (key, value) in self.dirty_storage.drain() {
            match self.uncommitted_storage.get(&key) {
                Some(origin) if *origin == value => {
                    // the slot is back at its committed value, drop the marker
                    self.uncommitted_storage.remove(&key);
                }
                Some(_) => {
                    // already tracked for commit
                }
                None => {
                    // first modification of the slot within this block; the
                    // in-memory layer's committed baseline is zero
                    self.uncommitted_storage.insert(key, B256::ZERO);
                }
            }
            self.pending_storage.insert(key, value);
        }
    }

    /// Persists the block's net storage changes into the storage trie,
    /// opening it if needed. Returns the trie, or `None` when there was
    /// nothing to flush and no trie had been opened before.
    ///
    /// Assumes all dirty slots have been finalised into pending storage.
    pub(crate) fn update_trie(
        &mut self,
        db: &dyn Database,
        state_root: B256,
    ) -> Result<Option<&mut SecureTrie>, StateError> {
        if self.uncommitted_storage.is_empty() {
            // nothing changed, don't bother with hashing anything
            return Ok(self.trie.as_mut());
        }
        self.storage_trie(db, state_root)?;
        let trie = self.trie.as_mut().expect("storage trie opened above");

        for (key, origin) in self.uncommitted_storage.drain() {
            let Some(value) = self.pending_storage.get(&key).copied() else {
                continue;
            };
            if value == origin {
                continue;
            }
            if value != B256::ZERO {
                trace!(address = %self.address, %key, %value, "writing storage slot");
                trie.update_storage(self.address, key.as_slice(), trim_left_zeroes(value.as_slice()));
            }
            // a zero value would be a deletion, which the trie does not support
        }
        Ok(Some(trie))
    }

    /// Flushes all staged storage mutations into the trie and recomputes
    /// the storage root.
    pub(crate) fn update_root(&mut self, db: &dyn Database, state_root: B256) {
        let trie = match self.update_trie(db, state_root) {
            Ok(Some(trie)) => trie,
            Ok(None) => return,
            Err(err) => {
                debug!(address = %self.address, %err, "storage trie update failed");
                return;
            }
        };
        let root = trie.hash();
        debug!(address = %self.address, %root, "updated storage root");
        self.data.root = root;
    }

    /// The storage trie, opening it if it has not been loaded yet.
    pub(crate) fn storage_trie(
        &mut self,
        db: &dyn Database,
        state_root: B256,
    ) -> Result<&mut SecureTrie, StateError> {
        if self.trie.is_none() {
            self.trie = Some(db.open_storage_trie(state_root, self.address, self.data.root)?);
        }
        Ok(self.trie.as_mut().expect("storage trie opened above"))
    }

    #[cfg(test)]
    pub(crate) fn dirty_len(&self) -> usize {
        self.dirty_storage.len()
    }

    #[cfg(test)]
    pub(crate) fn has_dirty(&self, key: &B256) -> bool {
        self.dirty_storage.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending_storage.len()
    }

    #[cfg(test)]
    pub(crate) fn uncommitted_len(&self) -> usize {
        self.uncommitted_storage.len()
    }
}
