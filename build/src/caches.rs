/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::{collections::HashMap, path::Path};

use crate::{history::ActionHistory, includes::IncludeDependencyCache, target::TargetContext};

/// Indices of one target's caches within a `CacheSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    pub history: usize,
    pub include_cache: usize,
}

/// Every persistent cache opened during a build. Each file is opened at most once, however many
/// targets share it.
#[derive(Debug, Default)]
pub struct CacheSet {
    histories: Vec<ActionHistory>,
    include_caches: Vec<IncludeDependencyCache>,
    by_path: HashMap<String, usize>,
}

fn key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

impl CacheSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the caches for `target` unless an earlier target already did.
    pub fn open(&mut self, target: &TargetContext) -> CacheHandle {
        let history_path = target.history_path();
        let history = match self.by_path.get(&key(&history_path)) {
            Some(&i) => i,
            None => {
                self.histories.push(ActionHistory::load(&history_path));
                let i = self.histories.len() - 1;
                self.by_path.insert(key(&history_path), i);
                i
            }
        };

        let include_path = target.include_cache_path();
        let include_cache = match self.by_path.get(&key(&include_path)) {
            Some(&i) => i,
            None => {
                self.include_caches
                    .push(IncludeDependencyCache::load(&include_path));
                let i = self.include_caches.len() - 1;
                self.by_path.insert(key(&include_path), i);
                i
            }
        };

        CacheHandle {
            history,
            include_cache,
        }
    }

    pub fn history(&self, handle: CacheHandle) -> &ActionHistory {
        &self.histories[handle.history]
    }

    pub fn include_cache(&self, handle: CacheHandle) -> &IncludeDependencyCache {
        &self.include_caches[handle.include_cache]
    }

    pub fn include_cache_mut(&mut self, handle: CacheHandle) -> &mut IncludeDependencyCache {
        &mut self.include_caches[handle.include_cache]
    }

    /// Both caches of a target, borrowed together.
    pub fn get_mut(
        &mut self,
        handle: CacheHandle,
    ) -> (&mut ActionHistory, &mut IncludeDependencyCache) {
        (
            &mut self.histories[handle.history],
            &mut self.include_caches[handle.include_cache],
        )
    }

    #[cfg(test)]
    fn num_histories(&self) -> usize {
        self.histories.len()
    }

    pub fn save_histories(&mut self) {
        for history in self.histories.iter_mut() {
            history.save();
        }
    }

    pub fn save_include_caches(&mut self) {
        for cache in self.include_caches.iter_mut() {
            cache.save();
        }
    }
}
