// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Output for humans or as JSON lines.
//!
//! Everything the console prints goes through [`Printer`]. In JSON mode each
//! line is one object tagged with an `event` field; session notifications keep
//! the tags of [`SessionEvent`].

use std::{fmt::Display, fmt::Write as _, path::PathBuf};

use dbgp_common::{Breakpoint, StackFrame, VariableNode};
use dbgp_protocol::EngineError;
use dbgp_session::{parse::format_value, SessionEvent, SessionStatus};
use serde::Serialize;
use tracing::warn;

/// Command output that is not a session notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Report {
    EvalResult { expression: String, value: String },
    Source { file: PathBuf, text: String },
    Stack { frames: Vec<StackFrame> },
    Variables { frame: usize, variables: Vec<VariableNode> },
    Breakpoints { breakpoints: Vec<Breakpoint> },
    Status { status: SessionStatus, error: Option<String> },
    Error { message: String },
    Notice { message: String },
}

/// Writes notifications and command output to stdout.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn event(&self, event: &SessionEvent) {
        if self.json {
            self.print_json(event);
        } else if let Some(text) = render_event(event) {
            println!("{text}");
        }
    }

    pub fn report(&self, report: Report) {
        if self.json {
            self.print_json(&report);
        } else {
            println!("{}", render_report(&report));
        }
    }

    pub fn error(&self, error: &dyn Display) {
        self.report(Report::Error { message: format!("{error:#}") });
    }

    pub fn notice(&self, message: impl Into<String>) {
        self.report(Report::Notice { message: message.into() });
    }

    pub fn eval(&self, expression: &str, result: Result<String, EngineError>) {
        match result {
            Ok(value) => self.report(Report::EvalResult { expression: expression.to_string(), value }),
            Err(e) => self.error(&format!("{expression}: {e}")),
        }
    }

    pub fn source(&self, file: PathBuf, result: Result<String, EngineError>) {
        match result {
            Ok(text) => self.report(Report::Source { file, text }),
            Err(e) => self.error(&format!("{}: {e}", file.display())),
        }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Failed to serialize output: {e}"),
        }
    }
}

/// Human rendering of a notification; `None` for ones not worth a line.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    let text = match event {
        SessionEvent::Listening { addr } => format!("Listening for engines on {addr}"),
        SessionEvent::Connected { peer } => format!("Engine connected from {peer}"),
        SessionEvent::EngineAttached { language, file, .. } => {
            let file = file.as_ref().map(|f| f.display().to_string()).unwrap_or_else(|| "?".into());
            match language {
                Some(language) => format!("Debugging {file} ({language})"),
                None => format!("Debugging {file}"),
            }
        }
        SessionEvent::Disconnected => "Engine disconnected".to_string(),
        SessionEvent::StatusChanged { status } => format!("[{status}]"),
        SessionEvent::ErrorChanged { message } => format!("error: {}", message.as_deref()?),
        SessionEvent::StackReplaced { frames } => {
            let top = frames.first()?;
            format!("Stopped in {} at {}:{}", top.function, top.file.display(), top.line)
        }
        SessionEvent::FrameLoaded { frame } => render_variables(frame.index, &frame.variables),
        SessionEvent::VariableLoaded { frame, variable } => {
            let mut out = String::new();
            render_variable(&mut out, *frame, variable, 0);
            out.trim_end().to_string()
        }
        SessionEvent::BreakpointsChanged { .. } => return None,
    };
    Some(text)
}

/// Human rendering of command output.
pub fn render_report(report: &Report) -> String {
    match report {
        Report::EvalResult { value, .. } => value.clone(),
        Report::Source { text, .. } => text.trim_end().to_string(),
        Report::Stack { frames } if frames.is_empty() => "No stack".to_string(),
        Report::Stack { frames } => frames
            .iter()
            .map(|f| format!("#{:<2} {} at {}:{}", f.index, f.function, f.file.display(), f.line))
            .collect::<Vec<_>>()
            .join("\n"),
        Report::Variables { frame, variables } => render_variables(*frame, variables),
        Report::Breakpoints { breakpoints } if breakpoints.is_empty() => "No breakpoints".to_string(),
        Report::Breakpoints { breakpoints } => breakpoints
            .iter()
            .map(|b| match &b.engine_id {
                Some(id) => format!("{b} [engine id {id}]"),
                None => b.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Report::Status { status, error: Some(error) } => format!("{status} (last error: {error})"),
        Report::Status { status, error: None } => status.to_string(),
        Report::Error { message } => format!("error: {message}"),
        Report::Notice { message } => message.clone(),
    }
}

fn render_variables(frame: usize, variables: &[VariableNode]) -> String {
    if variables.is_empty() {
        return format!("Frame #{frame}: no variables");
    }
    let mut out = format!("Frame #{frame}:\n");
    for variable in variables {
        render_variable(&mut out, frame, variable, 1);
    }
    out.trim_end().to_string()
}

fn render_variable(out: &mut String, frame: usize, node: &VariableNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{} = {}", node.name, format_value(node));
    for child in &node.children {
        render_variable(out, frame, child, depth + 1);
    }
    if !node.is_fully_loaded() {
        let more = node.declared_child_count - node.children.len();
        let _ = writeln!(out, "{indent}  ... {more} more (expand {frame} {})", node.full_name);
    }
}
