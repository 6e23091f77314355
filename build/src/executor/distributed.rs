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

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{
    action::{Action, ActionId, ActionType},
    build_task::expand_environment_variables,
    config::DistributedConfiguration,
    graph::ActionGraph,
    interface::{ExecutionSummary, Executor},
    scheduler::Scheduler,
    status::StatusPrinter,
    BuildError,
};

use super::command_task;

/// Total compile slots advertised by a dmucs hosts file.
///
/// Each line is `host slots extra`, separated by single spaces. Lines with any other shape, or
/// with a slot count that does not parse, are ignored.
pub fn parse_hosts_info(text: &str) -> usize {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(' ').collect();
            if fields.len() == 3 {
                fields[1].parse::<usize>().ok()
            } else {
                None
            }
        })
        .sum()
}

/// Farms compiles and links out through `gethost` and `distcc`. Everything else runs locally,
/// under the same concurrency limit.
#[derive(Debug)]
pub struct DistributedExecutor {
    parallelism: usize,
    distcc: PathBuf,
    gethost: PathBuf,
    allow_local_fallback: bool,
    status: StatusPrinter,
    print_debug_info: bool,
}

impl DistributedExecutor {
    pub fn new(
        parallelism: usize,
        executables_directory: &Path,
        allow_local_fallback: bool,
        status: StatusPrinter,
    ) -> Self {
        DistributedExecutor {
            parallelism: parallelism.max(1),
            distcc: executables_directory.join("distcc"),
            gethost: executables_directory.join("gethost"),
            allow_local_fallback,
            status,
            print_debug_info: false,
        }
    }

    /// Sizes the executor from the hosts file. A missing or unreadable hosts file is an error.
    pub fn from_config(
        config: &DistributedConfiguration,
        status: StatusPrinter,
    ) -> Result<Self, BuildError> {
        let path = config.hosts_file().ok_or_else(|| BuildError::HostsInfo {
            path: PathBuf::from("$HOME/.dmucs/hosts-info"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "HOME is not set"),
        })?;
        let text = std::fs::read_to_string(&path).map_err(|source| BuildError::HostsInfo {
            path: path.clone(),
            source,
        })?;
        let slots = parse_hosts_info(&text);
        debug!("{} advertises {} slots", path.display(), slots);
        Ok(Self::new(
            slots,
            &config.executables_directory,
            config.allow_local_fallback,
            status,
        ))
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn print_debug_info(mut self, enabled: bool) -> Self {
        self.print_debug_info = enabled;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// The command line actually run for `action`. Compiles and links always go through distcc;
    /// other actions only when flagged `can_execute_remotely`.
    pub fn wrap_command(&self, action: &Action) -> String {
        let path = expand_environment_variables(action.command_path.as_deref().unwrap_or_default());
        let arguments = expand_environment_variables(&action.command_arguments);
        let remote = action.flags.can_execute_remotely
            || matches!(action.action_type, ActionType::Compile | ActionType::Link);
        if remote {
            format!(
                "{} --wait -1 \"{}\" {} {}",
                self.gethost.display(),
                self.distcc.display(),
                path,
                arguments
            )
        } else {
            format!("{} {}", path, arguments)
        }
    }
}

impl Executor for DistributedExecutor {
    fn name(&self) -> &'static str {
        "Distcc"
    }

    fn execute(
        &self,
        graph: &ActionGraph,
        actions: &[ActionId],
    ) -> Result<ExecutionSummary, BuildError> {
        info!(
            "distributing through {} and {}",
            self.gethost.display(),
            self.distcc.display()
        );
        let mut summary = Scheduler::new(graph, self.parallelism, &self.status)
            .print_debug_info(self.print_debug_info)
            .run(actions, |action| {
                let command = self.wrap_command(action);
                let mut task = command_task(action, command.clone());
                if !self.allow_local_fallback {
                    task = task.with_env("DISTCC_FALLBACK", "0");
                }
                (task, command)
            })?;
        summary.executor_name = self.name();
        Ok(summary)
    }
}
