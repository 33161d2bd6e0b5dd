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

use storage_trie::PARALLEL_HASH_THRESHOLD;

/// Tunables recognized by the state layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of unhashed trie leaves above which root hashing spreads the
    /// children of a branch across parallel workers.
    pub parallel_hash_threshold: usize,
    /// Whether tries live purely in memory. The only supported mode today;
    /// a persistent node store would turn this off.
    pub in_memory_db_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config { parallel_hash_threshold: PARALLEL_HASH_THRESHOLD, in_memory_db_only: true }
    }
}
