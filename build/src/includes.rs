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

//! Flattened include closures of source files, and the scanner that discovers them.

use anvil_metrics::scoped_metric;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::{
    cache_file::{self, Format},
    disk_interface::DiskInterface,
    file_cache::IncludeContext,
};

const FORMAT: Format = Format {
    name: "include dependency",
    magic: *b"FINC",
    version: 1,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDependencyInfo {
    pub pch_name: Option<String>,
    /// Every header reachable from the source, in discovery order, without duplicates.
    pub includes: Vec<PathBuf>,
}

fn key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

#[derive(Debug)]
pub struct IncludeDependencyCache {
    file_path: PathBuf,
    dependencies: HashMap<String, IncludeDependencyInfo>,
    dirty: bool,
}

impl IncludeDependencyCache {
    pub fn new<P: Into<PathBuf>>(file_path: P) -> Self {
        IncludeDependencyCache {
            file_path: file_path.into(),
            dependencies: HashMap::new(),
            dirty: false,
        }
    }

    /// A missing or unreadable file gives an empty cache.
    pub fn load<P: Into<PathBuf>>(file_path: P) -> Self {
        scoped_metric!("include_cache_load");
        let mut cache = Self::new(file_path);
        match cache_file::load(&cache.file_path, FORMAT) {
            Ok(Some(dependencies)) => cache.dependencies = dependencies,
            Ok(None) => {}
            Err(e) => warn!(
                "ignoring include dependency cache {}: {}",
                cache.file_path.display(),
                e
            ),
        }
        cache
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn get(&self, source: &Path) -> Option<&IncludeDependencyInfo> {
        self.dependencies.get(&key(source))
    }

    pub fn set(&mut self, source: &Path, info: IncludeDependencyInfo) {
        let k = key(source);
        if self.dependencies.get(&k) == Some(&info) {
            return;
        }
        self.dependencies.insert(k, info);
        self.dirty = true;
    }

    pub fn save(&mut self) {
        if !self.dirty {
            return;
        }
        scoped_metric!("include_cache_save");
        match cache_file::save(&self.file_path, FORMAT, &self.dependencies) {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(
                "failed to write include dependency cache {}: {}",
                self.file_path.display(),
                e
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub name: String,
    /// `"name"` rather than `<name>`.
    pub quoted: bool,
}

/// Finds `#include` and `#import` lines. Everything else in the file is ignored, including
/// whether the directive sits inside a comment or a disabled `#if` block.
pub fn parse_include_directives(text: &str) -> Vec<IncludeDirective> {
    let mut directives = vec![];
    for line in text.lines() {
        let rest = match line.trim_start().strip_prefix('#') {
            Some(rest) => rest.trim_start(),
            None => continue,
        };
        let rest = match rest
            .strip_prefix("include")
            .or_else(|| rest.strip_prefix("import"))
        {
            Some(rest) => rest.trim_start(),
            None => continue,
        };
        let (close, quoted) = match rest.chars().next() {
            Some('"') => ('"', true),
            Some('<') => ('>', false),
            _ => continue,
        };
        if let Some(end) = rest[1..].find(close) {
            let name = &rest[1..1 + end];
            if !name.is_empty() {
                directives.push(IncludeDirective {
                    name: name.to_owned(),
                    quoted,
                });
            }
        }
    }
    directives
}

/// Walks include directives to compute closures. Direct includes are memoized for the lifetime of
/// the scanner, keyed by search paths and file.
pub struct IncludeScanner<'a, D: DiskInterface> {
    disk: &'a D,
    direct: HashMap<Vec<PathBuf>, HashMap<PathBuf, Vec<PathBuf>>>,
}

impl<'a, D: DiskInterface> IncludeScanner<'a, D> {
    pub fn new(disk: &'a D) -> Self {
        IncludeScanner {
            disk,
            direct: HashMap::new(),
        }
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.disk.stat(path), Ok(Some(stat)) if !stat.is_dir)
    }

    fn resolve(&self, including: &Path, directive: &IncludeDirective, search_paths: &[PathBuf]) -> Option<PathBuf> {
        if directive.quoted {
            if let Some(dir) = including.parent() {
                let candidate: PathBuf = dir.join(&directive.name).components().collect();
                if self.is_file(&candidate) {
                    return Some(candidate);
                }
            }
        }
        search_paths
            .iter()
            .map(|dir| dir.join(&directive.name).components().collect::<PathBuf>())
            .find(|candidate| self.is_file(candidate))
    }

    fn direct_includes(&mut self, file: &Path, search_paths: &[PathBuf]) -> Vec<PathBuf> {
        if let Some(found) = self.direct.get(search_paths).and_then(|m| m.get(file)) {
            return found.clone();
        }
        let includes = match self.disk.read(file) {
            Ok(bytes) => parse_include_directives(&String::from_utf8_lossy(&bytes))
                .iter()
                .filter_map(|d| {
                    let resolved = self.resolve(file, d, search_paths);
                    if resolved.is_none() {
                        debug!("{}: skipping unresolved include {}", file.display(), d.name);
                    }
                    resolved
                })
                .collect(),
            Err(e) => {
                debug!("cannot scan {}: {}", file.display(), e);
                vec![]
            }
        };
        self.direct
            .entry(search_paths.to_vec())
            .or_default()
            .insert(file.to_owned(), includes.clone());
        includes
    }

    /// Every file reachable through includes from `source`, excluding `source` itself.
    pub fn closure(&mut self, source: &Path, context: &IncludeContext) -> IncludeDependencyInfo {
        scoped_metric!("include_scan");
        let mut seen: HashSet<PathBuf> = HashSet::new();
        seen.insert(source.to_owned());
        let mut includes = vec![];
        let mut stack = vec![source.to_owned()];
        while let Some(file) = stack.pop() {
            let direct = self.direct_includes(&file, &context.search_paths);
            // Reversed so the first include is visited first.
            for include in direct.into_iter().rev() {
                if seen.insert(include.clone()) {
                    stack.push(include);
                }
            }
            if file != source {
                includes.push(file);
            }
        }
        IncludeDependencyInfo {
            pch_name: context.pch_name.clone(),
            includes,
        }
    }
}
