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

use anyhow::{self, bail, Context};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use anvil_builder::{
    build, executor::executor_for_config, status::StatusPrinter, CacheSet, ExecutorKind,
    SystemDiskInterface, VisualizationType,
};
use anvil_metrics::scoped_metric;

pub mod manifest;

use manifest::Manifest;

#[derive(Debug, PartialEq, Eq)]
pub enum DebugMode {
    Stats,
    /// Print why each action runs.
    Explain,
    /// Write the action graph in DOT format to this file.
    Graph(PathBuf),
}

#[derive(Error, Debug)]
#[error("Unknown debug setting '{0}', expected 'stats', 'explain' or 'graph=<file>'")]
pub struct DebugModeError(String);

impl std::str::FromStr for DebugMode {
    type Err = DebugModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stats" => Ok(DebugMode::Stats),
            "explain" => Ok(DebugMode::Explain),
            s if s.starts_with("graph=") && s.len() > "graph=".len() => {
                Ok(DebugMode::Graph(PathBuf::from(&s["graph=".len()..])))
            }
            e => Err(DebugModeError(e.to_owned())),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub execution_dir: Option<String>,
    pub manifest: String,
    /// Overrides the computed number of actions run at once.
    pub parallelism: Option<usize>,
    pub debug_modes: Vec<DebugMode>,
    pub executor: Option<ExecutorKind>,
    pub no_history: bool,
    /// Target names from the manifest. Empty means all of them.
    pub targets: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            execution_dir: None,
            manifest: "anvil.json".to_owned(),
            parallelism: None,
            debug_modes: vec![],
            executor: None,
            no_history: false,
            targets: vec![],
        }
    }
}

pub fn run(config: Config) -> anyhow::Result<()> {
    if let Some(dir) = &config.execution_dir {
        std::env::set_current_dir(&dir).with_context(|| format!("changing to {} for -C", &dir))?;
    }

    let metrics_enabled = config.debug_modes.iter().any(|v| v == &DebugMode::Stats);
    if metrics_enabled {
        anvil_metrics::enable();
    }

    let manifest_path = std::env::current_dir()
        .context("finding the current directory")?
        .join(&config.manifest);
    let mut loaded = {
        scoped_metric!("load_manifest");
        Manifest::load(&manifest_path)?.into_build(&config.targets)?
    };

    let build_config = &mut loaded.config;
    if let Some(executor) = config.executor {
        build_config.executor = executor;
    }
    if config.no_history {
        build_config.use_action_history = false;
    }

    loaded.graph.finalize()?;
    for mode in &config.debug_modes {
        if let DebugMode::Graph(path) = mode {
            std::fs::write(path, loaded.graph.to_dot(VisualizationType::ActionsWithFiles))
                .with_context(|| format!("writing graph to {}", path.display()))?;
        }
    }

    let executor = executor_for_config(&loaded.config, config.parallelism, StatusPrinter::stderr())
        .context("setting up the executor")?;
    let mut caches = CacheSet::new();
    let report = build(
        &mut loaded.graph,
        &loaded.targets,
        &mut caches,
        &SystemDiskInterface,
        &loaded.config,
        &*executor,
    )?;

    if config.debug_modes.contains(&DebugMode::Explain) {
        for &id in &report.analysis.to_execute {
            let action = loaded.graph.action(id);
            for reason in report.analysis.outdated.reasons(id) {
                eprintln!("anvil explain: {} {}: {}", id, action.status_description, reason);
            }
        }
    }

    if metrics_enabled {
        anvil_metrics::dump();
    }

    if !report.succeeded() {
        bail!("{} actions failed", report.summary.num_failed());
    }
    info!("build succeeded");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_modes_parse() {
        assert_eq!("stats".parse::<DebugMode>().ok(), Some(DebugMode::Stats));
        assert_eq!("explain".parse::<DebugMode>().ok(), Some(DebugMode::Explain));
        assert_eq!(
            "graph=out.dot".parse::<DebugMode>().ok(),
            Some(DebugMode::Graph(PathBuf::from("out.dot")))
        );
        let err = "graph=".parse::<DebugMode>().expect_err("missing file");
        insta::assert_display_snapshot!(err, @"Unknown debug setting 'graph=', expected 'stats', 'explain' or 'graph=<file>'");
    }
}
