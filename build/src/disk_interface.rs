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

use anvil_metrics::scoped_metric;
use std::{
    io::{ErrorKind, Result},
    path::Path,
    time::SystemTime,
};

/// What the build needs to know about a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub modified: SystemTime,
    pub len: u64,
    pub is_dir: bool,
}

/// Everything the core does to the filesystem goes through here, so tests can swap in
/// `MemoryDiskInterface`.
pub trait DiskInterface {
    /// `Ok(None)` if nothing exists at `p`.
    fn stat<P: AsRef<Path>>(&self, p: P) -> Result<Option<FileStat>>;
    fn read<P: AsRef<Path>>(&self, p: P) -> Result<Vec<u8>>;
    fn remove_file<P: AsRef<Path>>(&self, p: P) -> Result<()>;
    fn create_dir_all<P: AsRef<Path>>(&self, p: P) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDiskInterface;

impl DiskInterface for SystemDiskInterface {
    fn stat<P: AsRef<Path>>(&self, p: P) -> Result<Option<FileStat>> {
        scoped_metric!("stat");
        match std::fs::metadata(p) {
            Ok(metadata) => Ok(Some(FileStat {
                modified: metadata.modified()?,
                len: metadata.len(),
                is_dir: metadata.is_dir(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read<P: AsRef<Path>>(&self, p: P) -> Result<Vec<u8>> {
        scoped_metric!("read");
        std::fs::read(p)
    }

    fn remove_file<P: AsRef<Path>>(&self, p: P) -> Result<()> {
        std::fs::remove_file(p)
    }

    fn create_dir_all<P: AsRef<Path>>(&self, p: P) -> Result<()> {
        std::fs::create_dir_all(p)
    }
}

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryDiskInterface;

#[cfg(any(test, feature = "testing"))]
mod memory {
    use super::{DiskInterface, FileStat};
    use std::{
        cell::RefCell,
        collections::BTreeMap,
        io::{Error, ErrorKind, Result},
        path::{Path, PathBuf},
        time::{Duration, SystemTime},
    };

    #[derive(Debug, Clone)]
    struct Entry {
        contents: Vec<u8>,
        modified: SystemTime,
        is_dir: bool,
    }

    /// A fake filesystem with explicit timestamps.
    #[derive(Debug, Default)]
    pub struct MemoryDiskInterface {
        entries: RefCell<BTreeMap<PathBuf, Entry>>,
        removed: RefCell<Vec<PathBuf>>,
    }

    impl MemoryDiskInterface {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seconds since the epoch, handy for writing readable tests.
        pub fn at(secs: u64) -> SystemTime {
            SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
        }

        pub fn write<P: Into<PathBuf>, C: Into<Vec<u8>>>(
            &self,
            path: P,
            contents: C,
            modified: SystemTime,
        ) {
            self.entries.borrow_mut().insert(
                path.into(),
                Entry {
                    contents: contents.into(),
                    modified,
                    is_dir: false,
                },
            );
        }

        /// Creates or updates a non-empty file at `path` with the given mtime.
        pub fn touch<P: Into<PathBuf>>(&self, path: P, modified: SystemTime) {
            let path = path.into();
            let mut entries = self.entries.borrow_mut();
            match entries.get_mut(&path) {
                Some(entry) => entry.modified = modified,
                None => {
                    entries.insert(
                        path,
                        Entry {
                            contents: b"x".to_vec(),
                            modified,
                            is_dir: false,
                        },
                    );
                }
            }
        }

        pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
            self.entries.borrow().contains_key(path.as_ref())
        }

        pub fn remove<P: AsRef<Path>>(&self, path: P) {
            self.entries.borrow_mut().remove(path.as_ref());
        }

        /// Paths deleted through `DiskInterface::remove_file`, in order.
        pub fn removed(&self) -> Vec<PathBuf> {
            self.removed.borrow().clone()
        }
    }

    impl DiskInterface for MemoryDiskInterface {
        fn stat<P: AsRef<Path>>(&self, p: P) -> Result<Option<FileStat>> {
            Ok(self.entries.borrow().get(p.as_ref()).map(|e| FileStat {
                modified: e.modified,
                len: e.contents.len() as u64,
                is_dir: e.is_dir,
            }))
        }

        fn read<P: AsRef<Path>>(&self, p: P) -> Result<Vec<u8>> {
            match self.entries.borrow().get(p.as_ref()) {
                Some(e) if !e.is_dir => Ok(e.contents.clone()),
                _ => Err(Error::new(ErrorKind::NotFound, "not found")),
            }
        }

        fn remove_file<P: AsRef<Path>>(&self, p: P) -> Result<()> {
            match self.entries.borrow_mut().remove(p.as_ref()) {
                Some(_) => {
                    self.removed.borrow_mut().push(p.as_ref().to_owned());
                    Ok(())
                }
                None => Err(Error::new(ErrorKind::NotFound, "not found")),
            }
        }

        fn create_dir_all<P: AsRef<Path>>(&self, p: P) -> Result<()> {
            let mut entries = self.entries.borrow_mut();
            for dir in p.as_ref().ancestors() {
                if dir.as_os_str().is_empty() {
                    continue;
                }
                entries.entry(dir.to_owned()).or_insert(Entry {
                    contents: vec![],
                    modified: SystemTime::UNIX_EPOCH,
                    is_dir: true,
                });
            }
            Ok(())
        }
    }
}
