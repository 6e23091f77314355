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

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Local,
    Distributed,
}

#[derive(Error, Debug)]
#[error("Unknown executor '{0}', expected 'local' or 'distributed'")]
pub struct ExecutorKindError(String);

impl std::str::FromStr for ExecutorKind {
    type Err = ExecutorKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ExecutorKind::Local),
            "distributed" => Ok(ExecutorKind::Distributed),
            e => Err(ExecutorKindError(e.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DistributedConfiguration {
    /// Lines of `name slots extra`. Defaults to `$HOME/.dmucs/hosts-info`.
    pub hosts_file: Option<PathBuf>,
    /// Where `distcc` and `gethost` live.
    pub executables_directory: PathBuf,
    pub allow_local_fallback: bool,
}

impl Default for DistributedConfiguration {
    fn default() -> Self {
        DistributedConfiguration {
            hosts_file: None,
            executables_directory: PathBuf::from("/usr/bin"),
            allow_local_fallback: true,
        }
    }
}

impl DistributedConfiguration {
    pub fn hosts_file(&self) -> Option<PathBuf> {
        self.hosts_file.clone().or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".dmucs/hosts-info"))
        })
    }
}

/// Knobs for one build. Every field has a default, so a manifest only lists what it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildConfiguration {
    /// Rebuild outputs whose recorded command line differs from the current one.
    pub use_action_history: bool,
    /// `.lib`, `.exp` and `.pdb` outputs don't count towards an action's last execution time.
    pub use_incremental_linking: bool,
    /// An outdated import library does not force its consumers to relink.
    pub ignore_outdated_import_libraries: bool,
    pub delete_all_outdated_produced_items: bool,
    pub skip_linking_when_nothing_to_compile: bool,
    pub use_include_dependency_cache: bool,
    /// Applied to the physical core count when hyperthreading is available.
    pub processor_count_multiplier: f64,
    pub max_processor_count: Option<usize>,
    pub log_detailed_action_stats: bool,
    pub print_debug_info: bool,
    pub executor: ExecutorKind,
    pub distributed: DistributedConfiguration,
}

impl Default for BuildConfiguration {
    fn default() -> Self {
        BuildConfiguration {
            use_action_history: true,
            use_incremental_linking: false,
            ignore_outdated_import_libraries: false,
            delete_all_outdated_produced_items: false,
            skip_linking_when_nothing_to_compile: false,
            use_include_dependency_cache: true,
            processor_count_multiplier: 1.0,
            max_processor_count: None,
            log_detailed_action_stats: false,
            print_debug_info: false,
            executor: ExecutorKind::Local,
            distributed: DistributedConfiguration::default(),
        }
    }
}

impl BuildConfiguration {
    /// Command lines are not comparable when a wrapper rewrites them on another machine.
    pub fn checks_command_lines(&self) -> bool {
        self.use_action_history && self.executor != ExecutorKind::Distributed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn executor_from_str() {
        assert_eq!("local".parse::<ExecutorKind>().ok(), Some(ExecutorKind::Local));
        assert_eq!(
            "distributed".parse::<ExecutorKind>().ok(),
            Some(ExecutorKind::Distributed)
        );
        let err = "remote".parse::<ExecutorKind>().expect_err("unknown");
        insta::assert_display_snapshot!(err, @"Unknown executor 'remote', expected 'local' or 'distributed'");
    }

    #[test]
    fn history_check_is_off_for_distributed_runs() {
        let mut config = BuildConfiguration::default();
        assert!(config.checks_command_lines());
        config.executor = ExecutorKind::Distributed;
        assert!(!config.checks_command_lines());
        config.executor = ExecutorKind::Local;
        config.use_action_history = false;
        assert!(!config.checks_command_lines());
    }
}
