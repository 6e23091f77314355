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

use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime},
};

use crate::{
    action::{ActionId, ActionType},
    graph::ActionGraph,
    BuildError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Succeeded,
    /// Ran and exited non-zero, or could not be started.
    Failed,
    /// Never ran because a prerequisite failed. Counts as a failure.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ActionReport {
    pub id: ActionId,
    pub state: ActionState,
    pub exit_code: Option<i32>,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
}

impl ActionReport {
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionSummary {
    pub executor_name: &'static str,
    /// One report per action handed to the executor, in completion order.
    pub reports: Vec<ActionReport>,
    pub category_times: BTreeMap<ActionType, Duration>,
    /// Sum of all action durations.
    pub total_thread_time: Duration,
}

impl ExecutionSummary {
    pub fn succeeded(&self) -> bool {
        self.reports
            .iter()
            .all(|r| r.state == ActionState::Succeeded)
    }

    pub fn num_failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.state != ActionState::Succeeded)
            .count()
    }

    pub fn report(&self, id: ActionId) -> Option<&ActionReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub(crate) fn record(&mut self, action_type: ActionType, report: ActionReport) {
        if let Some(duration) = report.duration() {
            *self.category_times.entry(action_type).or_default() += duration;
            self.total_thread_time += duration;
        }
        self.reports.push(report);
    }
}

/// Runs a batch of actions to completion. Exactly one executor is chosen per build.
pub trait Executor {
    fn name(&self) -> &'static str;

    /// `actions` are in graph order and all outdated. Prerequisites produced outside the batch
    /// are assumed to be up to date. Per-action failures are reported in the summary; `Err` is
    /// reserved for failures of the executor itself.
    fn execute(
        &self,
        graph: &ActionGraph,
        actions: &[ActionId],
    ) -> Result<ExecutionSummary, BuildError>;
}
