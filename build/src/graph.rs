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

use anvil_metrics::scoped_metric;
use petgraph::{
    dot::{Config, Dot},
    graph::NodeIndex,
    Graph,
};
use std::{
    collections::{BTreeSet, HashMap},
    fmt::Write,
    path::Path,
};
use tracing::debug;

use crate::{
    action::{Action, ActionId},
    file_cache::{FileCache, FileId},
    BuildError,
};

/// How far dependent counts propagate when ordering actions.
const MAX_DEPENDENT_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationType {
    OnlyActions,
    ActionsWithFiles,
}

/// All actions of one build invocation and the files they mention.
///
/// Edges are implicit: an action depends on another if one of its prerequisites is produced by
/// the other. `finalize()` resolves those edges, rejects cycles and sorts the actions so the ones
/// that unblock the most work come first.
#[derive(Debug, Default)]
pub struct ActionGraph {
    files: FileCache,
    actions: Vec<Action>,
    order: Vec<ActionId>,
    finalized: bool,
}

impl ActionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `path`, returning its id.
    pub fn file<P: AsRef<Path>>(&mut self, path: P) -> FileId {
        self.files.insert_and_get(path)
    }

    pub fn files(&self) -> &FileCache {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileCache {
        &mut self.files
    }

    pub fn add_action(&mut self, mut action: Action) -> ActionId {
        let id = ActionId(self.actions.len());
        action.id = id;
        self.actions.push(action);
        self.order.push(id);
        self.finalized = false;
        id
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id.0]
    }

    pub fn action_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.actions[id.0]
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Action ids in graph order. Before `finalize()` this is assignment order.
    pub fn order(&self) -> &[ActionId] {
        &self.order
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.order.iter().map(move |id| &self.actions[id.0])
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn finalize(&mut self) -> Result<(), BuildError> {
        scoped_metric!("graph_finalize");
        self.link()?;
        self.detect_cycles()?;
        self.sort_for_parallelism();
        self.finalized = true;
        debug!("action graph finalized with {} actions", self.actions.len());
        Ok(())
    }

    fn link(&mut self) -> Result<(), BuildError> {
        let ids: Vec<FileId> = self.files.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.files.get_mut(id).clear_producing_action();
        }

        for action in self.actions.iter_mut() {
            action.relative_cost = 0;
            for &produced in &action.produced_items {
                let item = self.files.get_mut(produced);
                if let Err(first) = item.set_producing_action(action.id) {
                    return Err(BuildError::AmbiguousProducer {
                        path: item.path().to_owned(),
                        first,
                        second: action.id,
                    });
                }
                action.relative_cost += item.relative_cost;
            }
        }
        Ok(())
    }

    pub fn producer_of(&self, file: FileId) -> Option<ActionId> {
        self.files[file].producing_action()
    }

    /// Producers of `id`'s prerequisites, without duplicates, in prerequisite order.
    pub fn prerequisite_actions(&self, id: ActionId) -> Vec<ActionId> {
        let mut producers = vec![];
        for &item in &self.actions[id.0].prerequisite_items {
            if let Some(producer) = self.producer_of(item) {
                if !producers.contains(&producer) {
                    producers.push(producer);
                }
            }
        }
        producers
    }

    fn detect_cycles(&self) -> Result<(), BuildError> {
        let mut non_cyclic = vec![false; self.actions.len()];
        let mut waits_on: HashMap<ActionId, Vec<ActionId>> = HashMap::new();
        loop {
            let mut found_new = false;
            for action in &self.actions {
                if non_cyclic[action.id.0] {
                    continue;
                }
                let mut only_non_cyclic = true;
                for producer in self.prerequisite_actions(action.id) {
                    if !non_cyclic[producer.0] {
                        only_non_cyclic = false;
                        let waiting = waits_on.entry(action.id).or_default();
                        if !waiting.contains(&producer) {
                            waiting.push(producer);
                        }
                    }
                }
                if only_non_cyclic {
                    non_cyclic[action.id.0] = true;
                    found_new = true;
                }
            }
            if !found_new {
                break;
            }
        }

        let cyclic: Vec<ActionId> = self
            .actions
            .iter()
            .map(|a| a.id)
            .filter(|id| !non_cyclic[id.0])
            .collect();
        if cyclic.is_empty() {
            return Ok(());
        }

        let mut description = String::new();
        for &id in &cyclic {
            let _ = self.describe_cyclic_action(&mut description, id, &waits_on);
        }
        Err(BuildError::Cycle {
            actions: cyclic,
            description,
        })
    }

    fn describe_cyclic_action(
        &self,
        out: &mut String,
        id: ActionId,
        waits_on: &HashMap<ActionId, Vec<ActionId>>,
    ) -> std::fmt::Result {
        let action = self.action(id);
        writeln!(
            out,
            "Action {}: {}",
            id,
            action.command_path.as_deref().unwrap_or("")
        )?;
        writeln!(out, "\twith arguments: {}", action.command_arguments)?;
        for &item in &action.prerequisite_items {
            writeln!(out, "\tdepends on: {}", self.files[item].path().display())?;
        }
        for &item in &action.produced_items {
            writeln!(out, "\tproduces:   {}", self.files[item].path().display())?;
        }
        writeln!(out, "\tdepends on cyclic actions:")?;
        for &other in waits_on.get(&id).map(Vec::as_slice).unwrap_or(&[]) {
            let produced = &self.action(other).produced_items;
            if produced.len() == 1 {
                writeln!(
                    out,
                    "\t\t{} (produces: {})",
                    other,
                    self.files[produced[0]].path().display()
                )?;
            } else {
                writeln!(out, "\t\t{}", other)?;
                for &item in produced {
                    writeln!(out, "\t\t\tproduces:   {}", self.files[item].path().display())?;
                }
            }
        }
        writeln!(out)
    }

    // Heuristic ordering. Each pass folds the dependents of every direct dependent into its
    // producer's set, so after N passes a set reaches roughly N hops downstream.
    fn sort_for_parallelism(&mut self) {
        let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.actions.len()];
        for _ in 0..MAX_DEPENDENT_DEPTH {
            for dependent in 0..self.actions.len() {
                for producer in self.prerequisite_actions(ActionId(dependent)) {
                    let transitive = dependents[dependent].clone();
                    let set = &mut dependents[producer.0];
                    set.insert(dependent);
                    set.extend(transitive);
                }
            }
        }
        for (action, set) in self.actions.iter_mut().zip(dependents.iter()) {
            action.num_total_dependent_actions = set.len();
        }

        let actions = &self.actions;
        self.order = actions.iter().map(|a| a.id).collect();
        self.order.sort_by(|a, b| {
            let (a, b) = (&actions[a.0], &actions[b.0]);
            b.num_total_dependent_actions
                .cmp(&a.num_total_dependent_actions)
                .then(b.relative_cost.cmp(&a.relative_cost))
                .then(b.prerequisite_items.len().cmp(&a.prerequisite_items.len()))
        });
    }

    /// Every action needed to produce `outputs`, following producers transitively.
    pub fn prerequisite_actions_for(&self, outputs: &[FileId]) -> BTreeSet<ActionId> {
        let mut gathered = BTreeSet::new();
        let mut stack: Vec<ActionId> = outputs.iter().filter_map(|&f| self.producer_of(f)).collect();
        while let Some(id) = stack.pop() {
            if gathered.insert(id) {
                stack.extend(self.prerequisite_actions(id));
            }
        }
        gathered
    }

    /// Graphviz rendering of the graph, for debugging.
    pub fn to_dot(&self, kind: VisualizationType) -> String {
        let mut graph: Graph<String, &'static str> = Graph::new();
        let action_nodes: Vec<NodeIndex> = self
            .actions
            .iter()
            .map(|a| {
                graph.add_node(format!(
                    "{} {} {}",
                    a.id,
                    a.display_command_description(),
                    a.status_description
                ))
            })
            .collect();

        match kind {
            VisualizationType::OnlyActions => {
                for action in &self.actions {
                    for producer in self.prerequisite_actions(action.id) {
                        graph.add_edge(action_nodes[producer.0], action_nodes[action.id.0], "");
                    }
                }
            }
            VisualizationType::ActionsWithFiles => {
                let mut file_nodes: HashMap<FileId, NodeIndex> = HashMap::new();
                let mut file_node = |graph: &mut Graph<String, &'static str>, id: FileId| {
                    *file_nodes
                        .entry(id)
                        .or_insert_with(|| graph.add_node(self.files[id].path().display().to_string()))
                };
                for action in &self.actions {
                    for &item in &action.prerequisite_items {
                        let node = file_node(&mut graph, item);
                        graph.add_edge(node, action_nodes[action.id.0], "");
                    }
                    for &item in &action.produced_items {
                        let node = file_node(&mut graph, item);
                        graph.add_edge(action_nodes[action.id.0], node, "");
                    }
                }
            }
        }
        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}
