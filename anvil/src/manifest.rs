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

//! The JSON description of a build.
//!
//! ```json
//! {
//!   "targets": [{ "name": "app", "intermediate_dir": "Intermediate/app" }],
//!   "config": { "skip_linking_when_nothing_to_compile": true },
//!   "files": [{ "path": "src/a.cpp", "include_paths": ["include"] }],
//!   "actions": [
//!     { "type": "compile", "command_path": "cc", "arguments": "-c src/a.cpp -o obj/a.o",
//!       "prerequisites": ["src/a.cpp"], "produced": ["obj/a.o"] }
//!   ]
//! }
//! ```
//!
//! Relative paths are relative to the manifest's directory.

use anvil_builder::{
    Action, ActionFlags, ActionGraph, ActionType, BuildConfiguration, IncludeContext,
    TargetContext,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetEntry {
    name: String,
    intermediate_dir: PathBuf,
    #[serde(default)]
    shared_intermediate_dir: Option<PathBuf>,
    #[serde(default)]
    is_monolithic: bool,
    #[serde(default)]
    is_program: bool,
    #[serde(default)]
    outputs: Vec<PathBuf>,
}

/// Extra facts about a file that actions mention.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileEntry {
    path: PathBuf,
    #[serde(default)]
    remote: bool,
    #[serde(default)]
    relative_cost: u64,
    /// Present for sources whose includes should be tracked.
    #[serde(default)]
    include_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionEntry {
    #[serde(rename = "type")]
    action_type: ActionType,
    #[serde(default)]
    command_path: Option<String>,
    #[serde(default)]
    arguments: String,
    #[serde(default)]
    working_directory: Option<PathBuf>,
    #[serde(default)]
    prerequisites: Vec<PathBuf>,
    #[serde(default)]
    produced: Vec<PathBuf>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    flags: ActionFlags,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    targets: Vec<TargetEntry>,
    #[serde(default)]
    config: Option<BuildConfiguration>,
    #[serde(default)]
    files: Vec<FileEntry>,
    actions: Vec<ActionEntry>,
    #[serde(skip)]
    base: PathBuf,
}

/// A manifest turned into something `anvil_builder::build` accepts.
#[derive(Debug)]
pub struct LoadedManifest {
    pub graph: ActionGraph,
    pub targets: Vec<TargetContext>,
    pub config: BuildConfiguration,
}

impl Manifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Manifest, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_owned(),
            source,
        })?;
        let base = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_owned(),
            _ => PathBuf::from("."),
        };
        Self::parse(&text, base).map_err(|source| ManifestError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Parses manifest text. Relative paths resolve against `base`.
    pub fn parse<P: Into<PathBuf>>(text: &str, base: P) -> Result<Manifest, serde_json::Error> {
        let mut manifest: Manifest = serde_json::from_str(text)?;
        manifest.base = base.into();
        Ok(manifest)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base.join(path)
    }

    /// Builds the graph, keeping only the targets named in `selected` (all of them when empty).
    /// A manifest without targets gets one that keeps its caches in `.anvil` beside the manifest.
    pub fn into_build(self, selected: &[String]) -> Result<LoadedManifest, ManifestError> {
        let mut graph = ActionGraph::new();
        for entry in &self.files {
            let id = graph.file(self.resolve(&entry.path));
            let item = graph.files_mut().get_mut(id);
            item.is_remote = entry.remote;
            item.relative_cost = entry.relative_cost;
            if let Some(search_paths) = &entry.include_paths {
                item.include_context = Some(IncludeContext {
                    search_paths: search_paths.iter().map(|p| self.resolve(p)).collect(),
                    pch_name: entry.pch.clone(),
                });
            }
        }

        for entry in &self.actions {
            let prerequisites: Vec<_> = entry
                .prerequisites
                .iter()
                .map(|p| graph.file(self.resolve(p)))
                .collect();
            let produced: Vec<_> = entry
                .produced
                .iter()
                .map(|p| graph.file(self.resolve(p)))
                .collect();
            let mut action = Action::new(entry.action_type)
                .with_prerequisites(prerequisites)
                .with_produced(produced)
                .with_flags(entry.flags.clone())
                .with_working_directory(match &entry.working_directory {
                    Some(dir) => self.resolve(dir),
                    None => self.base.clone(),
                });
            if let Some(path) = &entry.command_path {
                action = action.with_command(path.clone(), entry.arguments.clone());
            }
            if let Some(status) = &entry.status {
                action = action.with_status(status.clone());
            }
            action.command_description = entry.description.clone();
            graph.add_action(action);
        }

        for name in selected {
            if !self.targets.iter().any(|t| &t.name == name) {
                return Err(ManifestError::UnknownTarget(name.clone()));
            }
        }
        let mut targets: Vec<TargetContext> = self
            .targets
            .iter()
            .filter(|t| selected.is_empty() || selected.contains(&t.name))
            .map(|t| {
                let intermediate_dir = self.resolve(&t.intermediate_dir);
                TargetContext {
                    shared_intermediate_dir: match &t.shared_intermediate_dir {
                        Some(dir) => self.resolve(dir),
                        None => intermediate_dir.clone(),
                    },
                    is_monolithic: t.is_monolithic,
                    is_program: t.is_program,
                    outputs: t.outputs.iter().map(|o| self.resolve(o)).collect(),
                    ..TargetContext::new(t.name.clone(), intermediate_dir)
                }
            })
            .collect();
        if targets.is_empty() {
            targets.push(TargetContext::new("default", self.base.join(".anvil")));
        }

        Ok(LoadedManifest {
            graph,
            targets,
            config: self.config.unwrap_or_default(),
        })
    }
}
