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

use proptest::prelude::*;

use crate::{
    action::{Action, ActionId, ActionType},
    config::BuildConfiguration,
    disk_interface::MemoryDiskInterface,
    graph::ActionGraph,
    history::ActionHistory,
    rebuilder::{GatherContext, MTimeRebuilder, OutdatedActions},
};

/// Two compiles feeding a link. `None` means the file does not exist.
#[derive(Debug, Clone)]
struct Scenario {
    sources: [Option<u64>; 2],
    objects: [Option<u64>; 2],
    app: Option<u64>,
    /// Whether the history already knows each action's command line.
    seeded: [bool; 3],
}

fn mtime() -> impl Strategy<Value = Option<u64>> {
    prop_oneof![
        1 => Just(None),
        4 => (1u64..100).prop_map(Some),
    ]
}

fn scenario() -> impl Strategy<Value = Scenario> {
    (
        [mtime(), mtime()],
        [mtime(), mtime()],
        mtime(),
        [any::<bool>(), any::<bool>(), any::<bool>()],
    )
        .prop_map(|(sources, objects, app, seeded)| Scenario {
            sources,
            objects,
            app,
            seeded,
        })
}

const SOURCES: [&str; 2] = ["/s/a.cpp", "/s/b.cpp"];
const OBJECTS: [&str; 2] = ["/o/a.o", "/o/b.o"];
const APP: &str = "/o/app";

fn graph() -> (ActionGraph, [ActionId; 3]) {
    let mut graph = ActionGraph::new();
    let mut ids = vec![];
    let objects: Vec<_> = OBJECTS.iter().map(|o| graph.file(o)).collect();
    for (i, source) in SOURCES.iter().enumerate() {
        let source = graph.file(source);
        ids.push(
            graph.add_action(
                Action::new(ActionType::Compile)
                    .with_command("cc", format!("-c {}", SOURCES[i]))
                    .with_prerequisites(vec![source])
                    .with_produced(vec![objects[i]]),
            ),
        );
    }
    let app = graph.file(APP);
    ids.push(
        graph.add_action(
            Action::new(ActionType::Link)
                .with_command("ld", "-o app a.o b.o")
                .with_prerequisites(objects)
                .with_produced(vec![app]),
        ),
    );
    graph.finalize().expect("dag");
    (graph, [ids[0], ids[1], ids[2]])
}

fn disk_for(scenario: &Scenario) -> MemoryDiskInterface {
    let disk = MemoryDiskInterface::new();
    let files = SOURCES
        .iter()
        .zip(scenario.sources.iter())
        .chain(OBJECTS.iter().zip(scenario.objects.iter()))
        .chain(std::iter::once((&APP, &scenario.app)));
    for (path, time) in files {
        if let Some(secs) = time {
            disk.touch(*path, MemoryDiskInterface::at(*secs));
        }
    }
    disk
}

fn history_for(
    graph: &ActionGraph,
    ids: &[ActionId; 3],
    scenario: &Scenario,
    dir: &std::path::Path,
) -> ActionHistory {
    let mut history = ActionHistory::new(dir.join("ActionHistory.bin"));
    for (id, seeded) in ids.iter().zip(scenario.seeded.iter()) {
        if !seeded {
            continue;
        }
        let action = graph.action(*id);
        for &item in &action.produced_items {
            history.set_producing_command_line(
                graph.files()[item].path(),
                &action.command_line().expect("command"),
            );
        }
    }
    history
}

fn analyse(
    graph: &ActionGraph,
    disk: &MemoryDiskInterface,
    history: &mut ActionHistory,
) -> OutdatedActions {
    let config = BuildConfiguration::default();
    let mut rebuilder = MTimeRebuilder::new(graph, disk, &config);
    rebuilder.gather_all(&mut GatherContext {
        target: 0,
        history,
        includes: None,
    });
    rebuilder.into_outdated()
}

proptest! {
    #[test]
    fn analysis_is_idempotent(scenario in scenario()) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (graph, ids) = graph();
        let disk = disk_for(&scenario);
        let mut history = history_for(&graph, &ids, &scenario, dir.path());

        // The first pass may repair the history; after that nothing changes.
        analyse(&graph, &disk, &mut history);
        history.save();
        prop_assert!(!history.is_dirty());

        let second = analyse(&graph, &disk, &mut history);
        prop_assert!(!history.is_dirty(), "second pass rewrote the history");
        let third = analyse(&graph, &disk, &mut history);
        for id in ids.iter() {
            prop_assert_eq!(second.is_outdated(*id), third.is_outdated(*id));
            prop_assert_eq!(second.reasons(*id), third.reasons(*id));
        }
    }

    #[test]
    fn outdated_producers_make_consumers_outdated(scenario in scenario()) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (graph, ids) = graph();
        let disk = disk_for(&scenario);
        let mut history = history_for(&graph, &ids, &scenario, dir.path());
        let outdated = analyse(&graph, &disk, &mut history);
        if outdated.is_outdated(ids[0]) || outdated.is_outdated(ids[1]) {
            prop_assert!(outdated.is_outdated(ids[2]));
        }
    }

    #[test]
    fn missing_outputs_are_always_outdated(scenario in scenario()) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (graph, ids) = graph();
        let disk = disk_for(&scenario);
        let mut history = history_for(&graph, &ids, &scenario, dir.path());
        let outdated = analyse(&graph, &disk, &mut history);
        for (i, object) in scenario.objects.iter().enumerate() {
            if object.is_none() {
                prop_assert!(outdated.is_outdated(ids[i]));
            }
        }
        if scenario.app.is_none() {
            prop_assert!(outdated.is_outdated(ids[2]));
        }
    }

    #[test]
    fn unknown_command_lines_are_outdated(scenario in scenario()) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (graph, ids) = graph();
        let disk = disk_for(&scenario);
        let mut history = history_for(&graph, &ids, &scenario, dir.path());
        let outdated = analyse(&graph, &disk, &mut history);
        for (id, seeded) in ids.iter().zip(scenario.seeded.iter()) {
            if !seeded {
                prop_assert!(outdated.is_outdated(*id));
            }
        }
    }

    #[test]
    fn forward_edges_never_form_a_cycle(
        edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40)
    ) {
        let mut graph = ActionGraph::new();
        let outputs: Vec<_> = (0..12).map(|i| graph.file(format!("/o/{}", i))).collect();
        let mut actions: Vec<Action> = (0..12)
            .map(|i| {
                Action::new(ActionType::Compile)
                    .with_command("step", i.to_string())
                    .with_produced(vec![outputs[i]])
            })
            .collect();
        for (a, b) in edges {
            let (from, to) = if a < b { (a, b) } else { (b, a) };
            if from != to {
                actions[to].prerequisite_items.push(outputs[from]);
            }
        }
        for action in actions {
            graph.add_action(action);
        }
        prop_assert!(graph.finalize().is_ok());
        for &id in graph.order() {
            for producer in graph.prerequisite_actions(id) {
                prop_assert!(graph.action(producer).num_total_dependent_actions() >= 1);
            }
        }
    }
}
