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

use console::Term;
use tracing::{info, warn};

use crate::action::Action;

/// User-facing lines printed while actions run. Only the dispatch thread prints, so lines from
/// different actions never interleave.
#[derive(Debug)]
pub struct StatusPrinter {
    term: Option<Term>,
}

impl StatusPrinter {
    pub fn stderr() -> Self {
        StatusPrinter {
            term: Some(Term::stderr()),
        }
    }

    /// Prints nothing. Used by tests and embedders that report on their own.
    pub fn quiet() -> Self {
        StatusPrinter { term: None }
    }

    fn line(&self, text: &str) {
        if let Some(term) = &self.term {
            if let Err(e) = term.write_line(text) {
                warn!("writing status: {}", e);
            }
        }
    }

    /// `[job/total] Compile a.cpp`, or the full command when debugging.
    pub fn action_started(
        &self,
        job: usize,
        total: usize,
        action: &Action,
        command: &str,
        print_debug_info: bool,
    ) {
        if print_debug_info || action.flags.print_debug_info {
            info!("Executing: {}", command);
            self.line(&format!("Executing: {}", command));
        } else if action.flags.should_output_status {
            let description = action.display_command_description();
            if description.is_empty() {
                self.line(&action.status_description);
            } else {
                self.line(&format!(
                    "[{}/{}] {} {}",
                    job, total, description, action.status_description
                ));
            }
        }
    }

    /// Whatever the command printed, passed through once it finished.
    pub fn action_output(&self, stdout: &[u8], stderr: &[u8]) {
        for stream in &[stdout, stderr] {
            let text = String::from_utf8_lossy(stream);
            let text = text.trim_end();
            if !text.is_empty() {
                self.line(text);
            }
        }
    }

    pub fn action_failed(&self, action: &Action, error: &dyn std::fmt::Display) {
        self.line(&format!("FAILED: {} ({})", action.status_description, error));
    }
}
