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

//! Journaled account-storage state on top of secure Merkle Patricia tries.
//!
//! A [StateDB] owns one [StateObject] per touched account. Writes are
//! journaled and staged through dirty, pending and uncommitted storage
//! maps before [StateDB::intermediate_root] or [StateDB::commit] flushes
//! them into each account's storage trie.

mod account;
mod config;
mod database;
mod journal;
mod object;
mod statedb;

pub use account::StateAccount;
pub use config::Config;
pub use database::{CachingDb, Database};
pub use object::StateObject;
pub use statedb::{StateDB, StateError, StateUpdate};
