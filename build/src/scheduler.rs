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

//! Dependency-ordered dispatch of a batch of actions onto a `CommandPool`.

use anvil_metrics::scoped_metric;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::{
    action::{Action, ActionId},
    build_task::{CommandTaskResult, TaskOutcome},
    command_pool::{CommandPool, CommandPoolTask},
    graph::ActionGraph,
    interface::{ActionReport, ActionState, ExecutionSummary},
    status::StatusPrinter,
    BuildError,
};

/// What the scheduler needs to know about a finished task.
pub trait TaskResult: Send {
    fn succeeded(&self) -> bool;
    fn exit_code(&self) -> Option<i32>;
    /// Captured stdout and stderr, if any.
    fn output(&self) -> Option<(&[u8], &[u8])>;
    fn error(&self) -> Option<&dyn std::fmt::Display>;
}

impl TaskResult for CommandTaskResult {
    fn succeeded(&self) -> bool {
        self.is_ok()
    }

    fn exit_code(&self) -> Option<i32> {
        match self {
            Ok(output) => output.status.code(),
            Err(e) => e.exit_code(),
        }
    }

    fn output(&self) -> Option<(&[u8], &[u8])> {
        match self {
            Ok(output) => Some((&output.stdout, &output.stderr)),
            Err(crate::build_task::CommandTaskError::CommandFailed(output)) => {
                Some((&output.stdout, &output.stderr))
            }
            Err(_) => None,
        }
    }

    fn error(&self) -> Option<&dyn std::fmt::Display> {
        match self {
            Ok(_) => None,
            Err(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Running,
    Finished { succeeded: bool },
    /// Never started because a prerequisite failed.
    Blocked,
}

impl Slot {
    fn is_failure(self) -> bool {
        matches!(self, Slot::Finished { succeeded: false } | Slot::Blocked)
    }
}

enum Readiness {
    Ready,
    Waiting,
    PrerequisiteFailed,
}

pub struct Scheduler<'a> {
    graph: &'a ActionGraph,
    max_in_parallel: usize,
    status: &'a StatusPrinter,
    print_debug_info: bool,
}

impl<'a> Scheduler<'a> {
    pub fn new(graph: &'a ActionGraph, max_in_parallel: usize, status: &'a StatusPrinter) -> Self {
        Scheduler {
            graph,
            max_in_parallel: max_in_parallel.max(1),
            status,
            print_debug_info: false,
        }
    }

    pub fn print_debug_info(mut self, enabled: bool) -> Self {
        self.print_debug_info = enabled;
        self
    }

    fn readiness(
        &self,
        id: ActionId,
        in_batch: &HashSet<ActionId>,
        slots: &HashMap<ActionId, Slot>,
    ) -> Readiness {
        let mut readiness = Readiness::Ready;
        for producer in self.graph.prerequisite_actions(id) {
            if !in_batch.contains(&producer) {
                continue;
            }
            match slots.get(&producer) {
                Some(slot) if slot.is_failure() => return Readiness::PrerequisiteFailed,
                Some(Slot::Finished { succeeded: true }) => {}
                _ => readiness = Readiness::Waiting,
            }
        }
        readiness
    }

    /// Runs `actions` (in graph order) to completion. `make_task` builds the work for an action
    /// and returns the command line shown when debugging.
    pub fn run<T, R, F>(&self, actions: &[ActionId], mut make_task: F) -> Result<ExecutionSummary, BuildError>
    where
        T: CommandPoolTask<Result = TaskOutcome<R>>,
        R: TaskResult,
        F: FnMut(&Action) -> (T, String),
    {
        scoped_metric!("execute");
        let total = actions.len();
        let in_batch: HashSet<ActionId> = actions.iter().copied().collect();
        let pool = CommandPool::with_capacity(self.max_in_parallel);
        info!(
            "performing {} actions ({} in parallel)",
            total,
            self.max_in_parallel
        );

        let outcome = pool.run(|scope| {
            let mut summary = ExecutionSummary::default();
            let mut slots: HashMap<ActionId, Slot> = HashMap::with_capacity(total);
            let mut job_number = 0;
            let mut last_progress = usize::MAX;

            loop {
                let pending = actions
                    .iter()
                    .filter(|id| matches!(slots.get(id), None | Some(Slot::Running)))
                    .count();
                let mut executing = slots.values().filter(|s| **s == Slot::Running).count();
                if pending != last_progress {
                    debug!("progress: {}/{}", total - pending, total);
                    last_progress = pending;
                }
                if pending == 0 {
                    break;
                }

                let mut changed = false;
                for &id in actions {
                    if slots.contains_key(&id) {
                        continue;
                    }
                    match self.readiness(id, &in_batch, &slots) {
                        Readiness::Waiting => {}
                        Readiness::PrerequisiteFailed => {
                            debug!("{} skipped, a prerequisite failed", id);
                            slots.insert(id, Slot::Blocked);
                            summary.record(
                                self.graph.action(id).action_type,
                                ActionReport {
                                    id,
                                    state: ActionState::Skipped,
                                    exit_code: None,
                                    start_time: None,
                                    end_time: None,
                                },
                            );
                            changed = true;
                        }
                        Readiness::Ready if executing < self.max_in_parallel => {
                            let action = self.graph.action(id);
                            let (task, command) = make_task(action);
                            job_number += 1;
                            self.status.action_started(
                                job_number,
                                total,
                                action,
                                &command,
                                self.print_debug_info,
                            );
                            scope.enqueue(task);
                            slots.insert(id, Slot::Running);
                            executing += 1;
                            changed = true;
                        }
                        Readiness::Ready => {}
                    }
                }

                if executing == 0 {
                    if changed {
                        continue;
                    }
                    return Err(BuildError::Stalled(pending));
                }

                let finished = match scope.recv() {
                    Some(finished) => finished,
                    // Every worker is gone; the pool reports the panic.
                    None => return Ok(summary),
                };
                let action = self.graph.action(finished.id);
                let succeeded = finished.result.succeeded();
                if let Some((stdout, stderr)) = finished.result.output() {
                    self.status.action_output(stdout, stderr);
                }
                if let Some(error) = finished.result.error() {
                    self.status.action_failed(action, error);
                }
                slots.insert(finished.id, Slot::Finished { succeeded });
                let report = ActionReport {
                    id: finished.id,
                    state: if succeeded {
                        ActionState::Succeeded
                    } else {
                        ActionState::Failed
                    },
                    exit_code: finished.result.exit_code(),
                    start_time: Some(finished.start_time),
                    end_time: Some(finished.end_time),
                };
                if let Some(duration) = report.duration() {
                    anvil_metrics::record(action.action_type.metric_name(), duration);
                }
                summary.record(action.action_type, report);
            }
            Ok(summary)
        });

        match outcome {
            Ok(result) => result,
            Err(_) => Err(BuildError::WorkerPanicked),
        }
    }
}
