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

//! Decides which actions have to run again.

use anvil_metrics::scoped_metric;
use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, warn};

use crate::{
    action::{ActionId, ActionType},
    config::BuildConfiguration,
    disk_interface::DiskInterface,
    file_cache::FileId,
    graph::ActionGraph,
    history::ActionHistory,
    includes::IncludeDependencyCache,
    BuildError,
};

/// Inputs may look up to this much newer than outputs without forcing a rebuild, to absorb clock
/// differences on network copies.
const TIMESTAMP_SLOP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutdatedReason {
    MissingOutput(PathBuf),
    /// Zero-sized outputs are usually left behind by an aborted build.
    EmptyOutput(PathBuf),
    CommandLineChanged {
        output: PathBuf,
        previous: Option<String>,
        current: String,
    },
    OutdatedPrerequisite {
        prerequisite: PathBuf,
        producer: ActionId,
    },
    NewerPrerequisite(PathBuf),
    NewerInclude {
        source: PathBuf,
        include: PathBuf,
    },
}

impl Display for OutdatedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutdatedReason::MissingOutput(p) => write!(f, "output {} doesn't exist", p.display()),
            OutdatedReason::EmptyOutput(p) => write!(f, "output {} is empty", p.display()),
            OutdatedReason::CommandLineChanged {
                output,
                previous,
                current,
            } => write!(
                f,
                "{} was produced by a different command line (was: {}, now: {})",
                output.display(),
                previous.as_deref().unwrap_or("<none>"),
                current
            ),
            OutdatedReason::OutdatedPrerequisite {
                prerequisite,
                producer,
            } => write!(
                f,
                "prerequisite {} is produced by outdated action {}",
                prerequisite.display(),
                producer
            ),
            OutdatedReason::NewerPrerequisite(p) => {
                write!(f, "prerequisite {} is newer than the last execution", p.display())
            }
            OutdatedReason::NewerInclude { source, include } => write!(
                f,
                "{} includes {} which is newer than the last execution",
                source.display(),
                include.display()
            ),
        }
    }
}

/// A source file whose include closure should be rediscovered once the build has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescanRequest {
    /// Index of the target whose include cache receives the result.
    pub target: usize,
    pub file: FileId,
}

/// The result of analysing a graph.
#[derive(Debug, Default)]
pub struct OutdatedActions {
    outdated: HashMap<ActionId, bool>,
    reasons: HashMap<ActionId, Vec<OutdatedReason>>,
    rescan: Vec<RescanRequest>,
}

impl OutdatedActions {
    /// Actions that were never examined count as up to date.
    pub fn is_outdated(&self, id: ActionId) -> bool {
        self.outdated.get(&id).copied().unwrap_or(false)
    }

    pub fn reasons(&self, id: ActionId) -> &[OutdatedReason] {
        self.reasons.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn num_outdated(&self) -> usize {
        self.outdated.values().filter(|o| **o).count()
    }

    pub fn rescan_requests(&self) -> &[RescanRequest] {
        &self.rescan
    }
}

/// The caches consulted while examining one target's actions.
pub struct GatherContext<'c> {
    pub target: usize,
    pub history: &'c mut ActionHistory,
    pub includes: Option<&'c IncludeDependencyCache>,
}

/// Timestamp based outdatedness, with command line history and cached include closures.
///
/// Results are memoized per action for the lifetime of the rebuilder, so a prerequisite shared by
/// many actions is examined once. The graph must have been finalized: the upstream check recurses
/// through producers and relies on there being no cycles.
pub struct MTimeRebuilder<'a, D: DiskInterface> {
    graph: &'a ActionGraph,
    disk: &'a D,
    config: &'a BuildConfiguration,
    result: OutdatedActions,
    include_stats: HashMap<PathBuf, Option<SystemTime>>,
}

fn is_newer(time: SystemTime, last_execution: Option<SystemTime>) -> bool {
    match last_execution {
        Some(last) => match time.duration_since(last) {
            Ok(diff) => diff > TIMESTAMP_SLOP,
            Err(_) => false,
        },
        None => false,
    }
}

impl<'a, D: DiskInterface> MTimeRebuilder<'a, D> {
    pub fn new(graph: &'a ActionGraph, disk: &'a D, config: &'a BuildConfiguration) -> Self {
        MTimeRebuilder {
            graph,
            disk,
            config,
            result: OutdatedActions::default(),
            include_stats: HashMap::new(),
        }
    }

    /// Examines every action in the graph.
    pub fn gather_all(&mut self, cx: &mut GatherContext<'_>) {
        scoped_metric!("gather_outdated");
        for &id in self.graph.order() {
            self.is_action_outdated(id, cx);
        }
    }

    pub fn into_outdated(self) -> OutdatedActions {
        self.result
    }

    fn include_mtime(&mut self, path: &Path) -> Option<SystemTime> {
        if let Some(cached) = self.include_stats.get(path) {
            return *cached;
        }
        let mtime = match self.disk.stat(path) {
            Ok(stat) => stat.map(|s| s.modified),
            Err(e) => {
                warn!("stat {}: {}", path.display(), e);
                None
            }
        };
        self.include_stats.insert(path.to_owned(), mtime);
        mtime
    }

    pub fn is_action_outdated(&mut self, id: ActionId, cx: &mut GatherContext<'_>) -> bool {
        if let Some(&outdated) = self.result.outdated.get(&id) {
            return outdated;
        }
        let graph = self.graph;
        let files = graph.files();
        let action = graph.action(id);
        let mut reasons = vec![];

        let command_line = if self.config.checks_command_lines() {
            action.command_line()
        } else {
            None
        };

        let mut last_execution: Option<SystemTime> = None;
        for &produced in &action.produced_items {
            let item = &files[produced];
            if let Some(current) = &command_line {
                let previous = cx.history.producing_command_line(item.path());
                let matches = previous
                    .map(|p| p.eq_ignore_ascii_case(current))
                    .unwrap_or(false);
                if !matches {
                    reasons.push(OutdatedReason::CommandLineChanged {
                        output: item.path().to_owned(),
                        previous: previous.map(str::to_owned),
                        current: current.clone(),
                    });
                    cx.history
                        .set_producing_command_line(item.path(), current);
                }
            }

            match item.stat(self.disk) {
                Some(stat) if item.is_remote || stat.len > 0 || stat.is_dir => {
                    if self.config.use_incremental_linking
                        && (item.has_extension("lib")
                            || item.has_extension("exp")
                            || item.has_extension("pdb"))
                    {
                        continue;
                    }
                    if last_execution.map_or(true, |last| stat.modified < last) {
                        last_execution = Some(stat.modified);
                    }
                }
                Some(_) => reasons.push(OutdatedReason::EmptyOutput(item.path().to_owned())),
                None => reasons.push(OutdatedReason::MissingOutput(item.path().to_owned())),
            }
        }

        if reasons.is_empty() {
            for &prerequisite in &action.prerequisite_items {
                let item = &files[prerequisite];
                let producer = item.producing_action();
                let is_import_library = producer
                    .map(|p| graph.action(p).flags.produces_import_library)
                    .unwrap_or(false)
                    && item.has_extension("lib");
                if is_import_library && self.config.ignore_outdated_import_libraries {
                    continue;
                }
                if let Some(producer) = producer {
                    if self.is_action_outdated(producer, cx) {
                        reasons.push(OutdatedReason::OutdatedPrerequisite {
                            prerequisite: item.path().to_owned(),
                            producer,
                        });
                    }
                }
                if let Some(mtime) = item.last_write_time(self.disk) {
                    if is_newer(mtime, last_execution) {
                        reasons.push(OutdatedReason::NewerPrerequisite(item.path().to_owned()));
                    }
                }
                if !reasons.is_empty() {
                    break;
                }
            }
        }

        if reasons.is_empty() && action.action_type == ActionType::Compile {
            if let Some(includes) = cx.includes {
                'sources: for &prerequisite in &action.prerequisite_items {
                    let source = files[prerequisite].path();
                    let info = match includes.get(source) {
                        Some(info) => info,
                        None => continue,
                    };
                    for include in &info.includes {
                        if let Some(mtime) = self.include_mtime(include) {
                            if is_newer(mtime, last_execution) {
                                reasons.push(OutdatedReason::NewerInclude {
                                    source: source.to_owned(),
                                    include: include.clone(),
                                });
                                break 'sources;
                            }
                        }
                    }
                }
            }
        }

        let outdated = !reasons.is_empty();
        if outdated {
            for reason in &reasons {
                debug!("{} {}: {}", id, action.status_description, reason);
            }
            if action.action_type == ActionType::Compile {
                for &prerequisite in &action.prerequisite_items {
                    if files[prerequisite].include_context.is_some() {
                        self.result.rescan.push(RescanRequest {
                            target: cx.target,
                            file: prerequisite,
                        });
                    }
                }
            }
            self.result.reasons.insert(id, reasons);
        }
        self.result.outdated.insert(id, outdated);
        outdated
    }
}

/// Removes outputs of outdated actions that must not survive into the next execution.
pub fn delete_outdated_produced_items<D: DiskInterface>(
    graph: &mut ActionGraph,
    outdated: &OutdatedActions,
    disk: &D,
    config: &BuildConfiguration,
) {
    let ids: Vec<ActionId> = graph
        .order()
        .iter()
        .copied()
        .filter(|id| outdated.is_outdated(*id))
        .collect();
    for id in ids {
        let produced = graph.action(id).produced_items.clone();
        let delete_flag = graph.action(id).flags.should_delete_produced_items;
        for item_id in produced {
            let item = graph.files_mut().get_mut(item_id);
            if !item.exists(disk) {
                continue;
            }
            let stale_pdb = !config.use_incremental_linking && item.has_extension("pdb");
            if config.delete_all_outdated_produced_items || stale_pdb || delete_flag {
                debug!("deleting outdated item {}", item.path().display());
                if let Err(e) = disk.remove_file(item.path()) {
                    warn!("failed to delete {}: {}", item.path().display(), e);
                }
                item.reset_stat();
            }
        }
    }
}

/// Makes sure every outdated action can write its outputs.
pub fn create_directories_for_produced_items<D: DiskInterface>(
    graph: &ActionGraph,
    outdated: &OutdatedActions,
    disk: &D,
) -> Result<(), BuildError> {
    for &id in graph.order() {
        if !outdated.is_outdated(id) {
            continue;
        }
        for &item_id in &graph.action(id).produced_items {
            let item = &graph.files()[item_id];
            if item.is_remote {
                continue;
            }
            if let Some(dir) = item.path().parent() {
                if dir.as_os_str().is_empty() {
                    continue;
                }
                let exists = matches!(disk.stat(dir), Ok(Some(_)));
                if !exists {
                    disk.create_dir_all(dir)
                        .map_err(|source| BuildError::CreateDirectory {
                            path: dir.to_owned(),
                            source,
                        })?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        action::{Action, ActionFlags},
        disk_interface::MemoryDiskInterface,
        file_cache::IncludeContext,
        includes::IncludeDependencyInfo,
    };

    fn at(secs: u64) -> SystemTime {
        MemoryDiskInterface::at(secs)
    }

    struct Fixture {
        graph: ActionGraph,
        compile_a: ActionId,
        compile_b: ActionId,
        link: ActionId,
    }

    fn fixture() -> Fixture {
        let mut graph = ActionGraph::new();
        let a_cpp = graph.file("/s/a.cpp");
        let b_cpp = graph.file("/s/b.cpp");
        let a_o = graph.file("/o/a.o");
        let b_o = graph.file("/o/b.o");
        let app = graph.file("/o/app");
        graph.files_mut().get_mut(a_cpp).include_context = Some(IncludeContext::default());
        let compile_a = graph.add_action(
            Action::new(ActionType::Compile)
                .with_command("cc", "-c a.cpp")
                .with_prerequisites(vec![a_cpp])
                .with_produced(vec![a_o]),
        );
        let compile_b = graph.add_action(
            Action::new(ActionType::Compile)
                .with_command("cc", "-c b.cpp")
                .with_prerequisites(vec![b_cpp])
                .with_produced(vec![b_o]),
        );
        let link = graph.add_action(
            Action::new(ActionType::Link)
                .with_command("ld", "a.o b.o")
                .with_prerequisites(vec![a_o, b_o])
                .with_produced(vec![app]),
        );
        graph.finalize().expect("dag");
        Fixture {
            graph,
            compile_a,
            compile_b,
            link,
        }
    }

    fn up_to_date_disk() -> MemoryDiskInterface {
        let disk = MemoryDiskInterface::new();
        disk.touch("/s/a.cpp", at(10));
        disk.touch("/s/b.cpp", at(10));
        disk.touch("/o/a.o", at(20));
        disk.touch("/o/b.o", at(20));
        disk.touch("/o/app", at(30));
        disk
    }

    fn seeded_history(graph: &ActionGraph) -> ActionHistory {
        let mut history = ActionHistory::new("/unused/ActionHistory.bin");
        for action in graph.actions() {
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
        config: &BuildConfiguration,
        history: &mut ActionHistory,
        includes: Option<&IncludeDependencyCache>,
    ) -> OutdatedActions {
        let mut rebuilder = MTimeRebuilder::new(graph, disk, config);
        rebuilder.gather_all(&mut GatherContext {
            target: 0,
            history,
            includes,
        });
        rebuilder.into_outdated()
    }

    #[test]
    fn everything_fresh() {
        let f = fixture();
        let disk = up_to_date_disk();
        let mut history = seeded_history(&f.graph);
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert_eq!(result.num_outdated(), 0);
        assert!(result.rescan_requests().is_empty());
    }

    #[test]
    fn missing_output_forces_rebuild() {
        let f = fixture();
        let disk = up_to_date_disk();
        disk.remove("/o/app");
        let mut history = seeded_history(&f.graph);
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert!(result.is_outdated(f.link));
        assert!(!result.is_outdated(f.compile_a));
        assert_eq!(
            result.reasons(f.link),
            &[OutdatedReason::MissingOutput(PathBuf::from("/o/app"))]
        );
    }

    #[test]
    fn empty_output_forces_rebuild() {
        let f = fixture();
        let disk = up_to_date_disk();
        disk.write("/o/b.o", "", at(20));
        let mut history = seeded_history(&f.graph);
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert!(result.is_outdated(f.compile_b));
        assert!(result.is_outdated(f.link));
    }

    #[test]
    fn newer_source_propagates_downstream() {
        let f = fixture();
        let disk = up_to_date_disk();
        disk.touch("/s/b.cpp", at(25));
        let mut history = seeded_history(&f.graph);
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert!(!result.is_outdated(f.compile_a));
        assert!(result.is_outdated(f.compile_b));
        assert!(result.is_outdated(f.link));
        assert_eq!(
            result.reasons(f.link),
            &[OutdatedReason::OutdatedPrerequisite {
                prerequisite: PathBuf::from("/o/b.o"),
                producer: f.compile_b,
            }]
        );
    }

    #[test]
    fn one_second_of_slop_is_tolerated() {
        let f = fixture();
        let disk = up_to_date_disk();
        disk.touch("/s/a.cpp", at(21));
        let mut history = seeded_history(&f.graph);
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert!(!result.is_outdated(f.compile_a));
    }

    #[test]
    fn command_line_drift_rewrites_history() {
        let mut f = fixture();
        let disk = up_to_date_disk();
        let mut history = seeded_history(&f.graph);
        f.graph.action_mut(f.compile_a).command_arguments = "-O2 -c a.cpp".to_owned();
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert!(result.is_outdated(f.compile_a));
        assert!(result.is_outdated(f.link));
        assert_eq!(
            history.producing_command_line(Path::new("/o/a.o")),
            Some("cc -O2 -c a.cpp")
        );

        let second = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert!(!second.is_outdated(f.compile_a), "history healed itself");
    }

    #[test]
    fn command_line_comparison_ignores_case() {
        let f = fixture();
        let disk = up_to_date_disk();
        let mut history = seeded_history(&f.graph);
        history.set_producing_command_line(Path::new("/o/a.o"), "CC -C A.CPP");
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        assert!(!result.is_outdated(f.compile_a));
    }

    #[test]
    fn history_is_ignored_for_distributed_runs() {
        let f = fixture();
        let disk = up_to_date_disk();
        let mut history = ActionHistory::new("/unused");
        let config = BuildConfiguration {
            executor: crate::config::ExecutorKind::Distributed,
            ..Default::default()
        };
        let result = analyse(&f.graph, &disk, &config, &mut history, None);
        assert_eq!(result.num_outdated(), 0);
        assert!(!history.is_dirty());
    }

    #[test]
    fn import_libraries_can_be_ignored() {
        let mut graph = ActionGraph::new();
        let dll_src = graph.file("/s/dll.o");
        let lib = graph.file("/o/dll.lib");
        let exe = graph.file("/o/app.exe");
        let producer = graph.add_action(
            Action::new(ActionType::Link)
                .with_command("link", "/dll")
                .with_prerequisites(vec![dll_src])
                .with_produced(vec![lib])
                .with_flags(ActionFlags {
                    produces_import_library: true,
                    ..Default::default()
                }),
        );
        let consumer = graph.add_action(
            Action::new(ActionType::Link)
                .with_command("link", "app")
                .with_prerequisites(vec![lib])
                .with_produced(vec![exe]),
        );
        graph.finalize().expect("dag");

        let disk = MemoryDiskInterface::new();
        disk.touch("/s/dll.o", at(50));
        disk.touch("/o/dll.lib", at(20));
        disk.touch("/o/app.exe", at(30));
        let mut history = seeded_history(&graph);

        let strict = analyse(&graph, &disk, &Default::default(), &mut history, None);
        assert!(strict.is_outdated(producer));
        assert!(strict.is_outdated(consumer));

        let config = BuildConfiguration {
            ignore_outdated_import_libraries: true,
            ..Default::default()
        };
        let lenient = analyse(&graph, &disk, &config, &mut history, None);
        assert!(lenient.is_outdated(producer));
        assert!(!lenient.is_outdated(consumer));
    }

    #[test]
    fn incremental_linking_ignores_pdb_timestamps() {
        let mut graph = ActionGraph::new();
        let obj = graph.file("/o/a.o");
        let exe = graph.file("/o/app.exe");
        let pdb = graph.file("/o/app.pdb");
        let link = graph.add_action(
            Action::new(ActionType::Link)
                .with_command("link", "a.o")
                .with_prerequisites(vec![obj])
                .with_produced(vec![exe, pdb]),
        );
        graph.finalize().expect("dag");
        let disk = MemoryDiskInterface::new();
        disk.touch("/o/a.o", at(20));
        disk.touch("/o/app.exe", at(30));
        disk.touch("/o/app.pdb", at(5));
        let mut history = seeded_history(&graph);

        let full = analyse(&graph, &disk, &Default::default(), &mut history, None);
        assert!(full.is_outdated(link));

        let config = BuildConfiguration {
            use_incremental_linking: true,
            ..Default::default()
        };
        let incremental = analyse(&graph, &disk, &config, &mut history, None);
        assert!(!incremental.is_outdated(link));
    }

    #[test]
    fn newer_cached_include_outdates_compile_and_requests_rescan() {
        let f = fixture();
        let disk = up_to_date_disk();
        disk.touch("/s/a.h", at(40));
        let mut includes = IncludeDependencyCache::new("/unused");
        includes.set(
            Path::new("/s/a.cpp"),
            IncludeDependencyInfo {
                pch_name: None,
                includes: vec![PathBuf::from("/s/a.h")],
            },
        );
        let mut history = seeded_history(&f.graph);
        let result = analyse(
            &f.graph,
            &disk,
            &Default::default(),
            &mut history,
            Some(&includes),
        );
        assert!(result.is_outdated(f.compile_a));
        assert!(!result.is_outdated(f.compile_b));
        assert_eq!(
            result.rescan_requests(),
            &[RescanRequest {
                target: 0,
                file: f.graph.files().lookup("/s/a.cpp").expect("known"),
            }]
        );
    }

    #[test]
    fn pdbs_are_deleted_unless_linking_incrementally() {
        let mut graph = ActionGraph::new();
        let obj = graph.file("/o/a.o");
        let exe = graph.file("/o/app.exe");
        let pdb = graph.file("/o/app.pdb");
        graph.add_action(
            Action::new(ActionType::Link)
                .with_command("link", "a.o")
                .with_prerequisites(vec![obj])
                .with_produced(vec![exe, pdb]),
        );
        graph.finalize().expect("dag");
        let disk = MemoryDiskInterface::new();
        disk.touch("/o/a.o", at(50));
        disk.touch("/o/app.exe", at(30));
        disk.touch("/o/app.pdb", at(30));
        let mut history = seeded_history(&graph);
        let config = BuildConfiguration::default();
        let result = analyse(&graph, &disk, &config, &mut history, None);
        delete_outdated_produced_items(&mut graph, &result, &disk, &config);
        assert_eq!(disk.removed(), vec![PathBuf::from("/o/app.pdb")]);
        assert!(!graph.files()[pdb].exists(&disk));
    }

    fn stale_a_cpp_disk() -> MemoryDiskInterface {
        let disk = up_to_date_disk();
        disk.touch("/s/a.cpp", at(25));
        disk
    }

    #[test]
    fn every_outdated_output_is_deleted_when_configured() {
        let mut f = fixture();
        let disk = stale_a_cpp_disk();
        let mut history = seeded_history(&f.graph);
        let config = BuildConfiguration {
            delete_all_outdated_produced_items: true,
            ..Default::default()
        };
        let result = analyse(&f.graph, &disk, &config, &mut history, None);
        assert!(!result.is_outdated(f.compile_b));
        delete_outdated_produced_items(&mut f.graph, &result, &disk, &config);
        let mut removed = disk.removed();
        removed.sort();
        assert_eq!(removed, vec![PathBuf::from("/o/a.o"), PathBuf::from("/o/app")]);
        assert!(disk.exists("/o/b.o"));
    }

    #[test]
    fn actions_can_ask_for_their_outputs_to_be_deleted() {
        let mut f = fixture();
        let flags = ActionFlags {
            should_delete_produced_items: true,
            ..Default::default()
        };
        f.graph.action_mut(f.compile_a).flags = flags.clone();
        f.graph.action_mut(f.compile_b).flags = flags;
        let disk = stale_a_cpp_disk();
        let mut history = seeded_history(&f.graph);
        let config = BuildConfiguration::default();
        let result = analyse(&f.graph, &disk, &config, &mut history, None);
        assert!(result.is_outdated(f.link));
        delete_outdated_produced_items(&mut f.graph, &result, &disk, &config);
        // compile_b is up to date and the link did not ask.
        assert_eq!(disk.removed(), vec![PathBuf::from("/o/a.o")]);
    }

    #[test]
    fn directories_are_created_for_outdated_local_outputs() {
        let mut f = fixture();
        let remote = f.graph.file("/remote/app");
        f.graph.files_mut().get_mut(remote).is_remote = true;
        f.graph.action_mut(f.link).produced_items.push(remote);
        f.graph.finalize().expect("dag");
        let disk = MemoryDiskInterface::new();
        disk.touch("/s/a.cpp", at(10));
        disk.touch("/s/b.cpp", at(10));
        let mut history = ActionHistory::new("/unused");
        let result = analyse(&f.graph, &disk, &Default::default(), &mut history, None);
        create_directories_for_produced_items(&f.graph, &result, &disk).expect("mkdir");
        assert!(disk.exists("/o"));
        assert!(!disk.exists("/remote"));
    }
}
