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

use crate::{database::Database, journal::Journal, object::StateObject};
use alloy_primitives::{map::AddressHashMap, Address, B256};
use rayon::prelude::*;
use storage_trie::ProofSet;
use thiserror::Error;
use tracing::debug;

/// Errors returned by the state layer.
#[derive(Debug, Error)]
pub enum StateError {
    /// The queried address has no associated state object.
    #[error("no state object for address {0}")]
    AccountNotFound(Address),
}

/// Kinds of account mutation tracked between finalise and commit.
///
/// Deletion is out of scope, so updates are the only kind; the variant
/// keeps the accounting explicit where a deletion kind would slot in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    Update,
}

#[derive(Debug, Clone, Copy)]
struct Mutation {
    kind: MutationKind,
    applied: bool,
}

impl Mutation {
    fn is_delete(&self) -> bool {
        !matches!(self.kind, MutationKind::Update)
    }
}

/// The outcome of a [StateDB::commit].
#[derive(Debug, Clone)]
pub struct StateUpdate {
    /// Hash of the state before applying the mutations.
    pub origin_root: B256,
    /// Aggregate root after the mutations. An account trie spanning the
    /// objects is not maintained, so this is the zero placeholder.
    pub root: B256,
    /// Storage root of every account touched since the last commit.
    pub storage_roots: AddressHashMap<B256>,
}

/// Storage state bound to one trie per account.
///
/// All mutations are journaled and staged inside the per-account
/// [StateObject]s; nothing reaches a trie before
/// [intermediate_root](Self::intermediate_root) or [commit](Self::commit).
pub struct StateDB {
    db: Box<dyn Database>,
    objects: AddressHashMap<StateObject>,
    journal: Journal,
    /// Accounts mutated since the last commit.
    mutations: AddressHashMap<Mutation>,
    /// Root of the state this instance was opened against.
    original_root: B256,
}

impl StateDB {
    /// Creates a state database on top of `db`, rooted at `root`.
    pub fn new(root: B256, db: Box<dyn Database>) -> Self {
        StateDB {
            db,
            objects: AddressHashMap::default(),
            journal: Journal::default(),
            mutations: AddressHashMap::default(),
            original_root: root,
        }
    }

    /// Sets the storage slot `key` of `addr` to `value`, creating the
    /// account on first touch. Returns the previous value.
    pub fn set_state(&mut self, addr: Address, key: B256, value: B256) -> B256 {
        let journal = &mut self.journal;
        let object = self.objects.entry(addr).or_insert_with(|| StateObject::new(addr, None));
        object.set_state(key, value, journal)
    }

    /// The state object of `addr`, creating an empty account if none has
    /// been touched yet. Creation alone stages no mutation.
    pub fn get_or_create_object(&mut self, addr: Address) -> &StateObject {
        self.objects.entry(addr).or_insert_with(|| StateObject::new(addr, None))
    }

    /// Retrieves the storage slot `key` of `addr`; zero when the account
    /// or slot is unknown.
    pub fn get_state(&self, addr: Address, key: B256) -> B256 {
        self.objects.get(&addr).map(|object| object.get_state(key)).unwrap_or_default()
    }

    /// The state object of `addr`, if the account has been touched.
    pub fn state_object(&self, addr: Address) -> Option<&StateObject> {
        self.objects.get(&addr)
    }

    /// Storage root of `addr` as of the last root computation.
    pub fn storage_root(&self, addr: Address) -> Result<B256, StateError> {
        self.objects
            .get(&addr)
            .map(StateObject::root)
            .ok_or(StateError::AccountNotFound(addr))
    }

    /// Finalises every account touched by the journal, moving its dirty
    /// slots to pending and marking it as mutated.
    pub fn finalise(&mut self, _delete_empty: bool) {
        let dirty: Vec<Address> = self.journal.dirty_accounts().collect();
        for addr in dirty {
            let Some(object) = self.objects.get_mut(&addr) else { continue };
            object.finalise();
            // re-arm the mutation marker so the next root computation picks
            // the account up again
            self.mutations.insert(addr, Mutation { kind: MutationKind::Update, applied: false });
        }
    }

    /// Flushes every mutated account's staged storage into its trie and
    /// recomputes the storage roots, one worker per account.
    ///
    /// Returns the zero placeholder: an account trie aggregating the
    /// per-account roots is not maintained.
    pub fn intermediate_root(&mut self, delete_empty: bool) -> B256 {
        self.finalise(delete_empty);

        let db = &*self.db;
        let state_root = self.original_root;
        let mutations = &mut self.mutations;
        let workers: Vec<&mut StateObject> = self
            .objects
            .iter_mut()
            .filter_map(|(addr, object)| {
                let mutation = mutations.get_mut(addr)?;
                if mutation.applied || mutation.is_delete() {
                    return None;
                }
                mutation.applied = true;
                Some(object)
            })
            .collect();

        // objects are disjoint by address, so they can flush concurrently
        workers.into_par_iter().for_each(|object| object.update_root(db, state_root));

        B256::ZERO
    }

    /// Commits all staged mutations and returns the resulting roots.
    /// Callers read the per-account storage roots from the update.
    pub fn commit(&mut self, block_number: u64, delete_empty: bool) -> StateUpdate {
        let root = self.intermediate_root(delete_empty);
        let storage_roots: AddressHashMap<B256> = self
            .mutations
            .keys()
            .filter_map(|addr| self.objects.get(addr).map(|object| (*addr, object.root())))
            .collect();
        debug!(block_number, accounts = storage_roots.len(), "committed storage mutations");
        self.journal.reset();
        self.mutations.clear();
        StateUpdate { origin_root: self.original_root, root, storage_roots }
    }

    /// Merkle proof for one storage slot of `addr` against the account's
    /// current storage trie. The proof is keyed by the hashed slot key.
    pub fn storage_proof(&mut self, addr: Address, key: B256) -> Result<ProofSet, StateError> {
        let db = &*self.db;
        let state_root = self.original_root;
        let object = self.objects.get_mut(&addr).ok_or(StateError::AccountNotFound(addr))?;
        let trie = object.storage_trie(db, state_root)?;

        let proof = ProofSet::new();
        let hashed = trie.hash_key(key.as_slice());
        trie.prove(hashed.as_slice(), &proof);
        Ok(proof)
    }

    /// Number of live journal entries.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }
}
