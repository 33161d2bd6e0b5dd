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

use alloy_primitives::{map::AddressHashMap, Address, B256};

/// A single reversible modification applied to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JournalEntry {
    /// A storage slot of `account` changed from `prev_value`; `origin_value`
    /// is the committed baseline the slot had before any mutation.
    StorageChange { account: Address, key: B256, prev_value: B256, origin_value: B256 },
}

impl JournalEntry {
    /// The address whose state this entry touched.
    fn dirtied(&self) -> Address {
        match self {
            JournalEntry::StorageChange { account, .. } => *account,
        }
    }
}

/// The list of state modifications applied since the last commit.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    /// Current changes tracked by the journal.
    entries: Vec<JournalEntry>,
    /// Dirty accounts and the number of changes to each.
    dirties: AddressHashMap<usize>,
}

impl Journal {
    fn append(&mut self, entry: JournalEntry) {
        *self.dirties.entry(entry.dirtied()).or_default() += 1;
        self.entries.push(entry);
    }

    /// Records a storage slot change.
    pub(crate) fn storage_change(
        &mut self,
        account: Address,
        key: B256,
        prev_value: B256,
        origin_value: B256,
    ) {
        let entry = JournalEntry::StorageChange { account, key, prev_value, origin_value };
        tracing::trace!(?entry, "journal append");
        self.append(entry);
    }

    /// Addresses touched since the last reset.
    pub(crate) fn dirty_accounts(&self) -> impl Iterator<Item = Address> + '_ {
        self.dirties.keys().copied()
    }

    /// Number of live journal entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.dirties.clear();
    }
}
