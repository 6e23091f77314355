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

use once_cell::unsync::OnceCell;
use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::warn;

use crate::{
    action::ActionId,
    disk_interface::{DiskInterface, FileStat},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How to find the headers of a source file. Attached to compile prerequisites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeContext {
    pub search_paths: Vec<PathBuf>,
    pub pch_name: Option<String>,
}

#[derive(Debug)]
pub struct FileItem {
    path: PathBuf,
    /// Lives on a remote machine; its directory is not ours to create.
    pub is_remote: bool,
    /// Added to the producing action's cost when the graph is linked.
    pub relative_cost: u64,
    pub include_context: Option<IncludeContext>,
    producing_action: Option<ActionId>,
    stat: OnceCell<Option<FileStat>>,
}

impl FileItem {
    fn new(path: PathBuf) -> Self {
        FileItem {
            path,
            is_remote: false,
            relative_cost: 0,
            include_context: None,
            producing_action: None,
            stat: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn producing_action(&self) -> Option<ActionId> {
        self.producing_action
    }

    /// Claims this item for `action`. Returns the existing producer if another action got here
    /// first.
    pub(crate) fn set_producing_action(&mut self, action: ActionId) -> Result<(), ActionId> {
        match self.producing_action {
            Some(existing) if existing != action => Err(existing),
            _ => {
                self.producing_action = Some(action);
                Ok(())
            }
        }
    }

    pub(crate) fn clear_producing_action(&mut self) {
        self.producing_action = None;
    }

    /// Memoized. An I/O error other than "not found" is logged and treated as a missing file.
    pub fn stat<D: DiskInterface>(&self, disk: &D) -> Option<FileStat> {
        *self.stat.get_or_init(|| match disk.stat(&self.path) {
            Ok(stat) => stat,
            Err(e) => {
                warn!("stat {}: {}", self.path.display(), e);
                None
            }
        })
    }

    pub fn exists<D: DiskInterface>(&self, disk: &D) -> bool {
        self.stat(disk).is_some()
    }

    pub fn last_write_time<D: DiskInterface>(&self, disk: &D) -> Option<SystemTime> {
        self.stat(disk).map(|s| s.modified)
    }

    /// Forget the memoized stat, e.g. after the file was deleted or rebuilt.
    pub fn reset_stat(&mut self) {
        self.stat = OnceCell::new();
    }

    /// Case-insensitive; `ext` has no leading dot.
    pub fn has_extension(&self, ext: &str) -> bool {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
            .unwrap_or(false)
    }
}

pub enum InsertResult {
    AlreadyExists(FileId),
    Inserted(FileId),
}

/// Interns every path the build mentions. The same path always yields the same `FileId`.
#[derive(Debug, Default)]
pub struct FileCache {
    items: Vec<FileItem>,
    map: HashMap<PathBuf, FileId>,
}

// Purely lexical: `a/./b` and `a/b` collapse, `..` is kept as-is since symlinks make it ambiguous.
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P: AsRef<Path>>(&mut self, path: P) -> InsertResult {
        let path = normalize(path.as_ref());
        match self.map.entry(path) {
            Entry::Occupied(e) => InsertResult::AlreadyExists(*e.get()),
            Entry::Vacant(e) => {
                let id = FileId(self.items.len());
                self.items.push(FileItem::new(e.key().clone()));
                e.insert(id);
                InsertResult::Inserted(id)
            }
        }
    }

    pub fn insert_and_get<P: AsRef<Path>>(&mut self, path: P) -> FileId {
        match self.insert(path) {
            InsertResult::AlreadyExists(id) => id,
            InsertResult::Inserted(id) => id,
        }
    }

    pub fn lookup<P: AsRef<Path>>(&self, path: P) -> Option<FileId> {
        self.map.get(&normalize(path.as_ref())).copied()
    }

    pub fn get(&self, id: FileId) -> &FileItem {
        &self.items[id.0]
    }

    pub fn get_mut(&mut self, id: FileId) -> &mut FileItem {
        &mut self.items[id.0]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &FileItem)> {
        self.items.iter().enumerate().map(|(i, item)| (FileId(i), item))
    }

    /// Drop every memoized stat so the next analysis pass sees the disk as it is now.
    pub fn reset_stats(&mut self) {
        for item in self.items.iter_mut() {
            item.reset_stat();
        }
    }
}

impl std::ops::Index<FileId> for FileCache {
    type Output = FileItem;

    fn index(&self, id: FileId) -> &FileItem {
        self.get(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::disk_interface::MemoryDiskInterface;

    #[test]
    fn same_path_same_id() {
        let mut cache = FileCache::new();
        let a = cache.insert_and_get("/src/a.cpp");
        let b = cache.insert_and_get("/src/./a.cpp");
        assert_eq!(a, b);
        assert!(matches!(cache.insert("/src/a.cpp"), InsertResult::AlreadyExists(id) if id == a));
        assert_eq!(cache.lookup("/src/a.cpp"), Some(a));
        assert_eq!(cache.lookup("/src/b.cpp"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn producing_action_is_set_once() {
        let mut cache = FileCache::new();
        let id = cache.insert_and_get("/out/a.o");
        let item = cache.get_mut(id);
        assert_eq!(item.set_producing_action(ActionId(0)), Ok(()));
        assert_eq!(item.set_producing_action(ActionId(0)), Ok(()));
        assert_eq!(item.set_producing_action(ActionId(3)), Err(ActionId(0)));
        assert_eq!(item.producing_action(), Some(ActionId(0)));
    }

    #[test]
    fn stat_is_memoized_until_reset() {
        let disk = MemoryDiskInterface::new();
        let mut cache = FileCache::new();
        let id = cache.insert_and_get("/out/a.o");
        assert!(!cache[id].exists(&disk));

        disk.touch("/out/a.o", MemoryDiskInterface::at(10));
        assert!(!cache[id].exists(&disk), "stale until reset");

        cache.reset_stats();
        assert_eq!(
            cache[id].last_write_time(&disk),
            Some(MemoryDiskInterface::at(10))
        );
    }

    #[test]
    fn extension_match_ignores_case() {
        let mut cache = FileCache::new();
        let id = cache.insert_and_get("/out/App.PDB");
        assert!(cache[id].has_extension("pdb"));
        assert!(!cache[id].has_extension("lib"));
    }
}
