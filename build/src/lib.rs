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

//! Incremental execution of a graph of build actions.
//!
//! The flow for one build is:
//! 1. Add actions to an `ActionGraph` and `finalize()` it. This links producers, rejects cycles and
//!    conflicting producers, and orders actions so the ones that unblock the most work come first.
//! 2. `get_actions_to_execute` decides which actions are outdated, using timestamps, the command
//!    line history and cached include closures.
//! 3. An `Executor` runs the outdated actions.
//!
//! `build` does all three and the bookkeeping around them.

extern crate petgraph;

use anvil_metrics::scoped_metric;
use std::{
    collections::{BTreeSet, HashSet},
    path::PathBuf,
};
use thiserror::Error;
use tracing::{debug, info};

pub mod action;
pub mod build_task;
mod cache_file;
pub mod caches;
pub mod command_pool;
pub mod config;
pub mod disk_interface;
pub mod executor;
pub mod file_cache;
pub mod graph;
pub mod history;
pub mod includes;
pub mod interface;
pub mod rebuilder;
pub mod scheduler;
pub mod status;
pub mod target;

#[cfg(test)]
mod property_tests;

pub use action::{Action, ActionFlags, ActionId, ActionType};
pub use caches::CacheSet;
pub use config::{BuildConfiguration, ExecutorKind};
pub use disk_interface::{DiskInterface, SystemDiskInterface};
pub use file_cache::{FileId, IncludeContext};
pub use graph::{ActionGraph, VisualizationType};
pub use interface::{ActionState, ExecutionSummary, Executor};
pub use rebuilder::{OutdatedActions, OutdatedReason};
pub use target::TargetContext;

use caches::CacheHandle;
use includes::IncludeScanner;
use rebuilder::{GatherContext, MTimeRebuilder};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{} is produced by both action {first} and action {second}", path.display())]
    AmbiguousProducer {
        path: PathBuf,
        first: ActionId,
        second: ActionId,
    },
    #[error("Action graph contains cycle!\n\n{description}")]
    Cycle {
        actions: Vec<ActionId>,
        description: String,
    },
    #[error("{} is not produced by any action", .0.display())]
    UnknownOutput(PathBuf),
    #[error("Failed to produce item: {}", .0.display())]
    MissingLinkOutput(PathBuf),
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read hosts file {}: {source}", path.display())]
    HostsInfo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("a worker thread panicked")]
    WorkerPanicked,
    #[error("{0} actions can never become ready")]
    Stalled(usize),
}

/// What `get_actions_to_execute` decided.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Outdated actions with a command, in graph order.
    pub to_execute: Vec<ActionId>,
    pub outdated: OutdatedActions,
}

/// Decides which of `prerequisites` have to run, and prepares the disk for running them.
///
/// Outdatedness is gathered once per distinct action history; an action examined against an
/// earlier target's history is not examined again. Outdated outputs are deleted as configured,
/// histories are saved and output directories created before this returns.
pub fn get_actions_to_execute<D: DiskInterface>(
    graph: &mut ActionGraph,
    prerequisites: &BTreeSet<ActionId>,
    targets: &[TargetContext],
    caches: &mut CacheSet,
    disk: &D,
    config: &BuildConfiguration,
) -> Result<Analysis, BuildError> {
    scoped_metric!("get_actions_to_execute");
    let outdated = {
        let mut rebuilder = MTimeRebuilder::new(graph, disk, config);
        let mut seen_histories = HashSet::new();
        for (index, target) in targets.iter().enumerate() {
            let handle = caches.open(target);
            if !seen_histories.insert(handle.history) {
                continue;
            }
            let (history, include_cache) = caches.get_mut(handle);
            let mut cx = GatherContext {
                target: index,
                history,
                includes: if config.use_include_dependency_cache {
                    Some(&*include_cache)
                } else {
                    None
                },
            };
            rebuilder.gather_all(&mut cx);
        }
        rebuilder.into_outdated()
    };

    rebuilder::delete_outdated_produced_items(graph, &outdated, disk, config);
    // Saved before anything runs. If a rebuild caused by changed arguments then fails, the old
    // output is left in place with the new command line recorded, and looks up to date next run.
    caches.save_histories();
    rebuilder::create_directories_for_produced_items(graph, &outdated, disk)?;

    let mut to_execute: Vec<ActionId> = graph
        .order()
        .iter()
        .copied()
        .filter(|id| {
            prerequisites.contains(id)
                && graph.action(*id).command_path.is_some()
                && outdated.is_outdated(*id)
        })
        .collect();

    if config.skip_linking_when_nothing_to_compile
        && to_execute
            .iter()
            .all(|id| graph.action(*id).action_type == ActionType::Link)
    {
        debug!("nothing to compile, skipping {} link actions", to_execute.len());
        to_execute.clear();
    }

    debug!(
        "{} outdated actions, {} to execute",
        outdated.num_outdated(),
        to_execute.len()
    );
    Ok(Analysis {
        to_execute,
        outdated,
    })
}

/// Everything a finished build knows.
#[derive(Debug)]
pub struct BuildReport {
    pub analysis: Analysis,
    pub summary: ExecutionSummary,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        self.summary.succeeded()
    }
}

/// The actions needed for the requested outputs of `targets`. A target without outputs asks for
/// everything.
fn requested_actions(
    graph: &ActionGraph,
    targets: &[TargetContext],
) -> Result<BTreeSet<ActionId>, BuildError> {
    if targets.is_empty() || targets.iter().any(|t| t.outputs.is_empty()) {
        return Ok(graph.order().iter().copied().collect());
    }
    let mut outputs = vec![];
    for output in targets.iter().flat_map(|t| t.outputs.iter()) {
        match graph.files().lookup(output) {
            Some(id) if graph.producer_of(id).is_some() => outputs.push(id),
            _ => return Err(BuildError::UnknownOutput(output.clone())),
        }
    }
    Ok(graph.prerequisite_actions_for(&outputs))
}

/// Finalizes `graph` if needed, runs whatever is outdated and updates the caches.
///
/// Failed actions do not make this return `Err`; check `BuildReport::succeeded`.
pub fn build<D: DiskInterface>(
    graph: &mut ActionGraph,
    targets: &[TargetContext],
    caches: &mut CacheSet,
    disk: &D,
    config: &BuildConfiguration,
    executor: &dyn Executor,
) -> Result<BuildReport, BuildError> {
    scoped_metric!("build");
    if !graph.is_finalized() {
        graph.finalize()?;
    }
    let requested = requested_actions(graph, targets)?;
    let analysis = get_actions_to_execute(graph, &requested, targets, caches, disk, config)?;

    let summary = if analysis.to_execute.is_empty() {
        info!("Target is up to date");
        ExecutionSummary {
            executor_name: executor.name(),
            ..Default::default()
        }
    } else {
        executor.execute(graph, &analysis.to_execute)?
    };

    for report in &summary.reports {
        let action = graph.action_mut(report.id);
        action.start_time = report.start_time;
        action.end_time = report.end_time;
    }
    // Commands changed the disk; stats taken during analysis are stale.
    graph.files_mut().reset_stats();

    if config.use_include_dependency_cache {
        rescan_includes(graph, targets, caches, disk, &analysis.outdated);
    }

    if !summary.reports.is_empty() {
        log_summary(graph, &summary, config.log_detailed_action_stats);
    }

    for report in &summary.reports {
        let action = graph.action(report.id);
        if report.state != ActionState::Succeeded || action.action_type != ActionType::Link {
            continue;
        }
        for &item in &action.produced_items {
            let item = &graph.files()[item];
            if !item.exists(disk) {
                return Err(BuildError::MissingLinkOutput(item.path().to_owned()));
            }
        }
    }

    Ok(BuildReport { analysis, summary })
}

/// Refreshes the include closures of sources whose compile action was outdated. Runs after
/// execution so generated headers can be found.
fn rescan_includes<D: DiskInterface>(
    graph: &ActionGraph,
    targets: &[TargetContext],
    caches: &mut CacheSet,
    disk: &D,
    outdated: &OutdatedActions,
) {
    let requests = outdated.rescan_requests();
    if requests.is_empty() {
        return;
    }
    scoped_metric!("rescan_includes");
    let handles: Vec<CacheHandle> = targets.iter().map(|t| caches.open(t)).collect();
    let mut scanner = IncludeScanner::new(disk);
    for request in requests {
        let handle = match handles.get(request.target) {
            Some(handle) => *handle,
            None => continue,
        };
        let item = &graph.files()[request.file];
        if let Some(context) = &item.include_context {
            let info = scanner.closure(item.path(), context);
            debug!(
                "{} has {} includes",
                item.path().display(),
                info.includes.len()
            );
            caches.include_cache_mut(handle).set(item.path(), info);
        }
    }
    caches.save_include_caches();
}

fn log_summary(graph: &ActionGraph, summary: &ExecutionSummary, detailed: bool) {
    if detailed {
        info!("^Action Type^Duration^Item^Status^PCH");
        for report in &summary.reports {
            let action = graph.action(report.id);
            info!(
                "^{}^{:.2}^{}^{:?}^{}",
                action.action_type,
                report.duration().unwrap_or_default().as_secs_f64(),
                action.status_description,
                report.state,
                action.flags.is_using_pch
            );
        }
    }
    for (action_type, time) in &summary.category_times {
        info!("{} took {:.2}s", action_type, time.as_secs_f64());
    }
    info!(
        "{} executor: {} actions, {:.2}s total thread time",
        summary.executor_name,
        summary.reports.len(),
        summary.total_thread_time.as_secs_f64()
    );
}
