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
    path::PathBuf,
    process::{Command, Output},
    time::SystemTime,
};

use thiserror::Error;

use crate::{action::ActionId, command_pool::CommandPoolTask};

#[derive(Error, Debug)]
pub enum CommandTaskError {
    #[error("{0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("failed with {}", .0.status)]
    CommandFailed(Output),
}

impl CommandTaskError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandTaskError::SpawnFailed(_) => None,
            CommandTaskError::CommandFailed(output) => output.status.code(),
        }
    }
}

pub type CommandTaskResult = Result<Output, CommandTaskError>;

/// What a worker hands back for every task it ran.
#[derive(Debug)]
pub struct TaskOutcome<R> {
    pub id: ActionId,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub result: R,
}

/// Replaces `$(NAME)` with the value of the environment variable `NAME`. Unset variables expand to
/// nothing.
pub fn expand_environment_variables(text: &str) -> String {
    expand_with(text, |name| std::env::var(name).ok())
}

fn expand_with<F: Fn(&str) -> Option<String>>(text: &str, lookup: F) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let name_len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if name_len > 0 && after[name_len..].starts_with(')') {
            out.push_str(&lookup(&after[..name_len]).unwrap_or_default());
            rest = &after[name_len + 1..];
        } else {
            out.push_str("$(");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

/// A shell command run on a worker thread.
#[derive(Debug, Clone)]
pub struct CommandTask {
    id: ActionId,
    command: String,
    working_directory: PathBuf,
    env: Vec<(String, String)>,
}

impl CommandTask {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(id: ActionId, command: S, working_directory: P) -> Self {
        CommandTask {
            id,
            command: command.into(),
            working_directory: working_directory.into(),
            env: vec![],
        }
    }

    pub fn with_env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn run_command(&self) -> CommandTaskResult {
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_directory)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .output()?;
        if !output.status.success() {
            return Err(CommandTaskError::CommandFailed(output));
        }
        Ok(output)
    }
}

impl CommandPoolTask for CommandTask {
    type Result = TaskOutcome<CommandTaskResult>;

    fn run(&self) -> Self::Result {
        let start_time = SystemTime::now();
        let result = self.run_command();
        TaskOutcome {
            id: self.id,
            start_time,
            end_time: SystemTime::now(),
            result,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "ROOT" => Some("/opt/sdk".to_owned()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_and_unknown_variables() {
        assert_eq!(
            expand_with("$(ROOT)/bin/cc -I$(EMPTY)inc $(MISSING)x", fake_env),
            "/opt/sdk/bin/cc -Iinc x"
        );
    }

    #[test]
    fn leaves_malformed_references_alone() {
        assert_eq!(expand_with("$(ROOT", fake_env), "$(ROOT");
        assert_eq!(expand_with("$() $ (ROOT)", fake_env), "$() $ (ROOT)");
        assert_eq!(expand_with("a$$(ROOT)", fake_env), "a$/opt/sdk");
    }

    #[test]
    fn successful_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let task = CommandTask::new(ActionId(0), "echo hi > out.txt && echo $GREETING", dir.path())
            .with_env("GREETING", "hello");
        let outcome = task.run();
        let output = outcome.result.expect("command succeeded");
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
        assert!(dir.path().join("out.txt").exists());
        assert!(outcome.end_time >= outcome.start_time);
    }

    #[test]
    fn failing_command_reports_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let outcome = CommandTask::new(ActionId(3), "exit 3", dir.path()).run();
        assert_eq!(outcome.id, ActionId(3));
        let err = outcome.result.expect_err("non-zero exit");
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn missing_working_directory_fails_to_spawn() {
        let outcome = CommandTask::new(ActionId(0), "true", "/definitely/not/here").run();
        assert!(matches!(
            outcome.result,
            Err(CommandTaskError::SpawnFailed(_))
        ));
    }
}
