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
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::file_cache::FileId;

/// Index of an action in its `ActionGraph`. Ids are handed out in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub(crate) usize);

impl ActionId {
    pub fn index(self) -> usize {
        self.0
    }

    /// The 1-based number shown to users.
    pub fn unique_id(self) -> usize {
        self.0 + 1
    }
}

impl Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.unique_id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    BuildProject,
    Compile,
    CreateAppBundle,
    GenerateDebugInfo,
    Link,
}

impl ActionType {
    /// Name of the cumulative time counter for this category.
    pub fn metric_name(self) -> &'static str {
        match self {
            ActionType::BuildProject => "action:build_project",
            ActionType::Compile => "action:compile",
            ActionType::CreateAppBundle => "action:create_app_bundle",
            ActionType::GenerateDebugInfo => "action:generate_debug_info",
            ActionType::Link => "action:link",
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ActionFlags {
    /// May be handed to a distributed backend.
    pub can_execute_remotely: bool,
    pub is_using_pch: bool,
    /// `.lib` outputs of this action are import libraries.
    pub produces_import_library: bool,
    /// Delete the produced items before running when outdated.
    pub should_delete_produced_items: bool,
    /// Print a `[n/total]` status line when the action starts.
    pub should_output_status: bool,
    /// Log the full command line when the action starts.
    pub print_debug_info: bool,
}

impl Default for ActionFlags {
    fn default() -> Self {
        ActionFlags {
            can_execute_remotely: false,
            is_using_pch: false,
            produces_import_library: false,
            should_delete_produced_items: false,
            should_output_status: true,
            print_debug_info: false,
        }
    }
}

/// One build step.
///
/// Actions are built with the `with_*` methods and handed to `ActionGraph::add_action`, which
/// assigns the id. The derived fields (cost, dependent count) are filled in by
/// `ActionGraph::finalize`; the timestamps by the executor.
#[derive(Debug, Clone)]
pub struct Action {
    pub(crate) id: ActionId,
    pub action_type: ActionType,
    pub prerequisite_items: Vec<FileId>,
    pub produced_items: Vec<FileId>,
    /// Actions without a command are tracked but never executed.
    pub command_path: Option<String>,
    pub command_arguments: String,
    pub working_directory: PathBuf,
    pub command_description: Option<String>,
    pub status_description: String,
    pub flags: ActionFlags,
    pub(crate) relative_cost: u64,
    pub(crate) num_total_dependent_actions: usize,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Action {
            id: ActionId(usize::MAX),
            action_type,
            prerequisite_items: vec![],
            produced_items: vec![],
            command_path: None,
            command_arguments: String::new(),
            working_directory: PathBuf::from("."),
            command_description: None,
            status_description: "...".to_owned(),
            flags: ActionFlags::default(),
            relative_cost: 0,
            num_total_dependent_actions: 0,
            start_time: None,
            end_time: None,
        }
    }

    pub fn with_command<P: Into<String>, A: Into<String>>(mut self, path: P, arguments: A) -> Self {
        self.command_path = Some(path.into());
        self.command_arguments = arguments.into();
        self
    }

    pub fn with_prerequisites<I: IntoIterator<Item = FileId>>(mut self, items: I) -> Self {
        self.prerequisite_items.extend(items);
        self
    }

    pub fn with_produced<I: IntoIterator<Item = FileId>>(mut self, items: I) -> Self {
        self.produced_items.extend(items);
        self
    }

    pub fn with_working_directory<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.working_directory = dir.as_ref().to_owned();
        self
    }

    pub fn with_status<S: Into<String>>(mut self, status: S) -> Self {
        self.status_description = status.into();
        self
    }

    pub fn with_flags(mut self, flags: ActionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn relative_cost(&self) -> u64 {
        self.relative_cost
    }

    pub fn num_total_dependent_actions(&self) -> usize {
        self.num_total_dependent_actions
    }

    /// The string recorded in the action history for each produced item.
    pub fn command_line(&self) -> Option<String> {
        self.command_path
            .as_ref()
            .map(|path| format!("{} {}", path, self.command_arguments))
    }

    /// "Compile", "Link" or similar; falls back to the command's file name.
    pub fn display_command_description(&self) -> String {
        if let Some(desc) = &self.command_description {
            return desc.clone();
        }
        self.command_path
            .as_ref()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start).ok(),
            _ => None,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.command_path {
            write!(f, "{} - ", path)?;
        }
        write!(f, "{}", self.command_arguments)
    }
}
