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

use std::path::PathBuf;

pub const ACTION_HISTORY_FILE_NAME: &str = "ActionHistory.bin";
pub const INCLUDE_CACHE_FILE_NAME: &str = "FlatCPPIncludes.bin";

/// A build target: what to build, and where its caches live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetContext {
    pub name: String,
    /// This target's own intermediate directory.
    pub intermediate_dir: PathBuf,
    /// Intermediate directory shared by all non-monolithic, non-program targets.
    pub shared_intermediate_dir: PathBuf,
    pub is_monolithic: bool,
    pub is_program: bool,
    /// Files this target asks for. Empty means every action.
    pub outputs: Vec<PathBuf>,
}

impl TargetContext {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, intermediate_dir: P) -> Self {
        let intermediate_dir = intermediate_dir.into();
        TargetContext {
            name: name.into(),
            shared_intermediate_dir: intermediate_dir.clone(),
            intermediate_dir,
            is_monolithic: false,
            is_program: false,
            outputs: vec![],
        }
    }

    /// Monolithic builds and programs keep a private history; everything else shares one.
    pub fn history_path(&self) -> PathBuf {
        if self.is_monolithic || self.is_program {
            self.intermediate_dir.join(ACTION_HISTORY_FILE_NAME)
        } else {
            self.shared_intermediate_dir.join(ACTION_HISTORY_FILE_NAME)
        }
    }

    pub fn include_cache_path(&self) -> PathBuf {
        self.intermediate_dir.join(INCLUDE_CACHE_FILE_NAME)
    }
}
