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

use std::{fs, path::Path};

use anvil::{run, Config, DebugMode};

const MANIFEST: &str = r#"{
    "targets": [{ "name": "app", "intermediate_dir": "Intermediate" }],
    "files": [{ "path": "a.c", "include_paths": ["include"] }],
    "actions": [
        { "type": "compile", "command_path": "cat", "arguments": "a.c > obj/a.o",
          "prerequisites": ["a.c"], "produced": ["obj/a.o"], "status": "a.c" },
        { "type": "link", "command_path": "cat", "arguments": "obj/a.o > bin/app",
          "prerequisites": ["obj/a.o"], "produced": ["bin/app"], "status": "app" }
    ]
}"#;

fn config(root: &Path) -> Config {
    Config {
        manifest: root.join("anvil.json").to_string_lossy().into_owned(),
        parallelism: Some(2),
        ..Config::default()
    }
}

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("anvil.json"), MANIFEST).expect("write manifest");
    fs::create_dir(dir.path().join("include")).expect("include dir");
    fs::write(dir.path().join("include/a.h"), "#define A 1\n").expect("write a.h");
    fs::write(dir.path().join("a.c"), "#include <a.h>\nint a;\n").expect("write a.c");
    dir
}

#[test]
fn builds_from_a_manifest() {
    let dir = setup();
    run(config(dir.path())).expect("build succeeded");
    assert_eq!(
        fs::read_to_string(dir.path().join("bin/app")).expect("app"),
        "#include <a.h>\nint a;\n"
    );
    assert!(dir.path().join("Intermediate/ActionHistory.bin").exists());
    assert!(dir.path().join("Intermediate/FlatCPPIncludes.bin").exists());
}

#[test]
fn writes_the_graph_when_asked() {
    let dir = setup();
    let dot = dir.path().join("graph.dot");
    let mut config = config(dir.path());
    config.debug_modes = vec![DebugMode::Explain, DebugMode::Graph(dot.clone())];
    run(config).expect("build succeeded");
    let text = fs::read_to_string(&dot).expect("graph written");
    assert!(text.starts_with("digraph"));
}

#[test]
fn failed_actions_fail_the_run() {
    let dir = setup();
    fs::remove_file(dir.path().join("a.c")).expect("remove a.c");
    let err = run(config(dir.path())).expect_err("compile fails");
    assert_eq!(err.to_string(), "2 actions failed");
    assert!(!dir.path().join("bin/app").exists());
}

#[test]
fn unknown_target_is_reported() {
    let dir = setup();
    let mut config = config(dir.path());
    config.targets = vec!["game".to_owned()];
    let err = run(config).expect_err("no such target");
    assert_eq!(err.to_string(), "unknown target 'game'");
}

#[test]
fn missing_manifest_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = run(config(dir.path())).expect_err("no manifest");
    assert!(err.to_string().starts_with("reading "));
}
