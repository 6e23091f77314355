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
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

use crate::cache_file::{self, Format};

const FORMAT: Format = Format {
    name: "action history",
    magic: *b"AHIS",
    version: 1,
};

// Paths compare case-insensitively.
fn key(path: &Path) -> String {
    path.to_string_lossy().to_uppercase()
}

/// The command line that last produced each output, persisted between runs.
#[derive(Debug)]
pub struct ActionHistory {
    file_path: PathBuf,
    command_lines: HashMap<String, String>,
    dirty: bool,
}

impl ActionHistory {
    /// An empty history that will be written to `file_path`.
    pub fn new<P: Into<PathBuf>>(file_path: P) -> Self {
        ActionHistory {
            file_path: file_path.into(),
            command_lines: HashMap::new(),
            dirty: false,
        }
    }

    /// Never fails: a missing or unreadable file gives an empty history.
    pub fn load<P: Into<PathBuf>>(file_path: P) -> Self {
        scoped_metric!("history_load");
        let mut history = Self::new(file_path);
        match cache_file::load(&history.file_path, FORMAT) {
            Ok(Some(command_lines)) => {
                history.command_lines = command_lines;
                debug!(
                    "loaded {} history entries from {}",
                    history.command_lines.len(),
                    history.file_path.display()
                );
            }
            Ok(None) => {}
            Err(e) => warn!(
                "ignoring action history {}: {}",
                history.file_path.display(),
                e
            ),
        }
        history
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.command_lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_lines.is_empty()
    }

    pub fn producing_command_line(&self, produced: &Path) -> Option<&str> {
        self.command_lines.get(&key(produced)).map(String::as_str)
    }

    pub fn set_producing_command_line(&mut self, produced: &Path, command_line: &str) {
        self.command_lines
            .insert(key(produced), command_line.to_owned());
        self.dirty = true;
    }

    /// Writes the history if anything changed since it was loaded. Failures are logged.
    pub fn save(&mut self) {
        if !self.dirty {
            return;
        }
        scoped_metric!("history_save");
        match cache_file::save(&self.file_path, FORMAT, &self.command_lines) {
            Ok(()) => self.dirty = false,
            Err(e) => warn!(
                "failed to write action history {}: {}",
                self.file_path.display(),
                e
            ),
        }
    }
}
