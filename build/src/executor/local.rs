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

use crate::{
    action::ActionId,
    graph::ActionGraph,
    interface::{ExecutionSummary, Executor},
    scheduler::Scheduler,
    status::StatusPrinter,
    BuildError,
};

use super::{command_task, expanded_command};

/// Runs actions as child processes of this machine.
#[derive(Debug)]
pub struct LocalExecutor {
    parallelism: usize,
    status: StatusPrinter,
    print_debug_info: bool,
}

impl LocalExecutor {
    pub fn new(parallelism: usize, status: StatusPrinter) -> Self {
        LocalExecutor {
            parallelism: parallelism.max(1),
            status,
            print_debug_info: false,
        }
    }

    pub fn print_debug_info(mut self, enabled: bool) -> Self {
        self.print_debug_info = enabled;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }
}

impl Executor for LocalExecutor {
    fn name(&self) -> &'static str {
        "Local"
    }

    fn execute(
        &self,
        graph: &ActionGraph,
        actions: &[ActionId],
    ) -> Result<ExecutionSummary, BuildError> {
        let mut summary = Scheduler::new(graph, self.parallelism, &self.status)
            .print_debug_info(self.print_debug_info)
            .run(actions, |action| {
                let command = expanded_command(action);
                (command_task(action, command.clone()), command)
            })?;
        summary.executor_name = self.name();
        Ok(summary)
    }
}
