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

//! The two ways of running a batch of actions.

mod distributed;
mod local;

pub use distributed::{parse_hosts_info, DistributedExecutor};
pub use local::LocalExecutor;

use tracing::debug;

use crate::{
    action::Action,
    build_task::{expand_environment_variables, CommandTask},
    config::{BuildConfiguration, ExecutorKind},
    interface::Executor,
    status::StatusPrinter,
    BuildError,
};

/// How many actions may run at once on this machine.
///
/// With hyperthreading, `multiplier` scales the physical core count (1.0 means "one per physical
/// core"). The result is capped by `max` and is never below one.
pub fn max_actions_in_parallel(
    physical: usize,
    logical: usize,
    multiplier: f64,
    max: Option<usize>,
) -> usize {
    let count = if physical < logical {
        (physical as f64 * multiplier) as usize
    } else {
        physical
    };
    let count = match max {
        Some(max) => count.min(max),
        None => count,
    };
    count.max(1)
}

/// Parallelism for the local machine, per `config`.
pub fn local_parallelism(config: &BuildConfiguration) -> usize {
    let physical = num_cpus::get_physical();
    let logical = num_cpus::get();
    let n = max_actions_in_parallel(
        physical,
        logical,
        config.processor_count_multiplier,
        config.max_processor_count,
    );
    debug!(
        "{} physical cores, {} logical cores, running {} actions in parallel",
        physical, logical, n
    );
    n
}

/// The shell command line for `action`, with `$(VAR)` references expanded.
pub(crate) fn expanded_command(action: &Action) -> String {
    let path = action.command_path.as_deref().unwrap_or_default();
    format!(
        "{} {}",
        expand_environment_variables(path),
        expand_environment_variables(&action.command_arguments)
    )
}

pub(crate) fn command_task(action: &Action, command: String) -> CommandTask {
    let working_directory =
        expand_environment_variables(&action.working_directory.to_string_lossy());
    CommandTask::new(action.id(), command, working_directory)
}

/// The executor `config` asks for. `parallelism` overrides the computed local parallelism.
pub fn executor_for_config(
    config: &BuildConfiguration,
    parallelism: Option<usize>,
    status: StatusPrinter,
) -> Result<Box<dyn Executor>, BuildError> {
    Ok(match config.executor {
        ExecutorKind::Local => Box::new(
            LocalExecutor::new(parallelism.unwrap_or_else(|| local_parallelism(config)), status)
                .print_debug_info(config.print_debug_info),
        ),
        ExecutorKind::Distributed => {
            let mut executor = DistributedExecutor::from_config(&config.distributed, status)?
                .print_debug_info(config.print_debug_info);
            if let Some(n) = parallelism {
                executor = executor.with_parallelism(n);
            }
            Box::new(executor)
        }
    })
}
