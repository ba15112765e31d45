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

//! Typed DBGp commands.
//!
//! A [`Command`] is a verb plus ordered single-letter options and an optional
//! data payload. It is serialized as
//! `<verb> -i <transaction_id> [-x value]... [-- base64(data)]`, with options in
//! the order they were added, so the same command always produces the same line.

use std::fmt::Display;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::ProtocolError;

/// Integer correlating one command with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command verbs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `status`
    Status,
    /// `feature_get`
    FeatureGet,
    /// `feature_set`
    FeatureSet,
    /// `run`
    Run,
    /// `step_into`
    StepInto,
    /// `step_over`
    StepOver,
    /// `step_out`
    StepOut,
    /// `stop`
    Stop,
    /// `detach`
    Detach,
    /// `breakpoint_set`
    BreakpointSet,
    /// `breakpoint_get`
    BreakpointGet,
    /// `breakpoint_update`
    BreakpointUpdate,
    /// `breakpoint_remove`
    BreakpointRemove,
    /// `breakpoint_list`
    BreakpointList,
    /// `stack_depth`
    StackDepth,
    /// `stack_get`
    StackGet,
    /// `context_names`
    ContextNames,
    /// `context_get`
    ContextGet,
    /// `property_get`
    PropertyGet,
    /// `property_value`
    PropertyValue,
    /// `source`
    Source,
    /// `eval`
    Eval,
    /// Any other verb, such as engine extensions.
    Custom(String),
}

impl CommandKind {
    /// The verb as written on the wire.
    pub fn verb(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::FeatureGet => "feature_get",
            Self::FeatureSet => "feature_set",
            Self::Run => "run",
            Self::StepInto => "step_into",
            Self::StepOver => "step_over",
            Self::StepOut => "step_out",
            Self::Stop => "stop",
            Self::Detach => "detach",
            Self::BreakpointSet => "breakpoint_set",
            Self::BreakpointGet => "breakpoint_get",
            Self::BreakpointUpdate => "breakpoint_update",
            Self::BreakpointRemove => "breakpoint_remove",
            Self::BreakpointList => "breakpoint_list",
            Self::StackDepth => "stack_depth",
            Self::StackGet => "stack_get",
            Self::ContextNames => "context_names",
            Self::ContextGet => "context_get",
            Self::PropertyGet => "property_get",
            Self::PropertyValue => "property_value",
            Self::Source => "source",
            Self::Eval => "eval",
            Self::Custom(verb) => verb,
        }
    }

    /// Maps a verb to its kind; unknown verbs become [`CommandKind::Custom`].
    pub fn from_verb(verb: &str) -> Self {
        match verb {
            "status" => Self::Status,
            "feature_get" => Self::FeatureGet,
            "feature_set" => Self::FeatureSet,
            "run" => Self::Run,
            "step_into" => Self::StepInto,
            "step_over" => Self::StepOver,
            "step_out" => Self::StepOut,
            "stop" => Self::Stop,
            "detach" => Self::Detach,
            "breakpoint_set" => Self::BreakpointSet,
            "breakpoint_get" => Self::BreakpointGet,
            "breakpoint_update" => Self::BreakpointUpdate,
            "breakpoint_remove" => Self::BreakpointRemove,
            "breakpoint_list" => Self::BreakpointList,
            "stack_depth" => Self::StackDepth,
            "stack_get" => Self::StackGet,
            "context_names" => Self::ContextNames,
            "context_get" => Self::ContextGet,
            "property_get" => Self::PropertyGet,
            "property_value" => Self::PropertyValue,
            "source" => Self::Source,
            "eval" => Self::Eval,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Whether the command resumes execution.
    pub fn is_continuation(&self) -> bool {
        matches!(self, Self::Run | Self::StepInto | Self::StepOver | Self::StepOut)
    }
}

/// A command without its transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    args: Vec<(char, String)>,
    data: Option<String>,
}

impl Command {
    /// A command with no options.
    pub fn new(kind: CommandKind) -> Self {
        Self { kind, args: Vec::new(), data: None }
    }

    /// Adds `-flag value`. A later value for the same flag replaces the earlier one.
    pub fn arg(mut self, flag: char, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.args.iter_mut().find(|(f, _)| *f == flag) {
            Some(existing) => existing.1 = value,
            None => self.args.push((flag, value)),
        }
        self
    }

    /// Sets the data payload, sent base64-encoded after `--`.
    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// The verb.
    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Options in insertion order.
    pub fn args(&self) -> &[(char, String)] {
        &self.args
    }

    /// Value of one option.
    pub fn arg_value(&self, flag: char) -> Option<&str> {
        self.args.iter().find(|(f, _)| *f == flag).map(|(_, v)| v.as_str())
    }

    /// Decoded data payload.
    pub fn data_value(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// `status`
    pub fn status() -> Self {
        Self::new(CommandKind::Status)
    }

    /// `run`
    pub fn run() -> Self {
        Self::new(CommandKind::Run)
    }

    /// `step_into`
    pub fn step_into() -> Self {
        Self::new(CommandKind::StepInto)
    }

    /// `step_over`
    pub fn step_over() -> Self {
        Self::new(CommandKind::StepOver)
    }

    /// `step_out`
    pub fn step_out() -> Self {
        Self::new(CommandKind::StepOut)
    }

    /// `stop`
    pub fn stop() -> Self {
        Self::new(CommandKind::Stop)
    }

    /// `detach`
    pub fn detach() -> Self {
        Self::new(CommandKind::Detach)
    }

    /// `feature_get -n <name>`
    pub fn feature_get(name: &str) -> Self {
        Self::new(CommandKind::FeatureGet).arg('n', name)
    }

    /// `feature_set -n <name> -v <value>`
    pub fn feature_set(name: &str, value: impl ToString) -> Self {
        Self::new(CommandKind::FeatureSet).arg('n', name).arg('v', value)
    }

    /// `breakpoint_set -t line -f <uri> -n <line>`, disabled ones carry `-s disabled`.
    pub fn breakpoint_set_line(file_uri: &str, line: u32, enabled: bool) -> Self {
        let cmd = Self::new(CommandKind::BreakpointSet).arg('t', "line").arg('f', file_uri).arg('n', line);
        if enabled {
            cmd
        } else {
            cmd.arg('s', "disabled")
        }
    }

    /// `breakpoint_set -t call -m <function>`, disabled ones carry `-s disabled`.
    pub fn breakpoint_set_call(function: &str, enabled: bool) -> Self {
        let cmd = Self::new(CommandKind::BreakpointSet).arg('t', "call").arg('m', function);
        if enabled {
            cmd
        } else {
            cmd.arg('s', "disabled")
        }
    }

    /// `breakpoint_update -d <id> -s enabled|disabled`
    pub fn breakpoint_update(id: &str, enabled: bool) -> Self {
        Self::new(CommandKind::BreakpointUpdate)
            .arg('d', id)
            .arg('s', if enabled { "enabled" } else { "disabled" })
    }

    /// `breakpoint_remove -d <id>`
    pub fn breakpoint_remove(id: &str) -> Self {
        Self::new(CommandKind::BreakpointRemove).arg('d', id)
    }

    /// `breakpoint_list`
    pub fn breakpoint_list() -> Self {
        Self::new(CommandKind::BreakpointList)
    }

    /// `stack_depth`
    pub fn stack_depth() -> Self {
        Self::new(CommandKind::StackDepth)
    }

    /// `stack_get`, the whole stack
    pub fn stack_get() -> Self {
        Self::new(CommandKind::StackGet)
    }

    /// `context_names -d <depth>`
    pub fn context_names(depth: usize) -> Self {
        Self::new(CommandKind::ContextNames).arg('d', depth)
    }

    /// `context_get -d <depth> -c <context>`
    pub fn context_get(depth: usize, context: u32) -> Self {
        Self::new(CommandKind::ContextGet).arg('d', depth).arg('c', context)
    }

    /// `property_get -d <depth> -c <context> -n <full name> -p <page>`
    pub fn property_get(full_name: &str, depth: usize, context: u32, page: usize) -> Self {
        Self::new(CommandKind::PropertyGet)
            .arg('d', depth)
            .arg('c', context)
            .arg('n', full_name)
            .arg('p', page)
    }

    /// `source -f <uri>`
    pub fn source(file_uri: &str) -> Self {
        Self::new(CommandKind::Source).arg('f', file_uri)
    }

    /// `eval -- base64(<expression>)`
    pub fn eval(expression: &str) -> Self {
        Self::new(CommandKind::Eval).data(expression)
    }

    /// Writes the command line for transaction `id`.
    ///
    /// Fails if the verb or an option value contains a NUL byte, which would
    /// end the command early on the wire. The data payload is base64 and
    /// never needs checking.
    pub fn serialize(&self, id: TransactionId) -> Result<String, ProtocolError> {
        let verb = self.kind.verb();
        if verb.is_empty() || verb.contains(|c: char| c == '\0' || c.is_whitespace()) {
            return Err(ProtocolError::InvalidCommand(format!("bad verb {verb:?}")));
        }

        let mut line = format!("{verb} -i {id}");
        for (flag, value) in &self.args {
            if value.contains('\0') {
                return Err(ProtocolError::InvalidCommand(format!(
                    "NUL byte in -{flag} of {verb}: {value:?}"
                )));
            }
            line.push_str(&format!(" -{flag} {}", quote(value)));
        }
        if let Some(data) = &self.data {
            line.push_str(" -- ");
            line.push_str(&BASE64.encode(data.as_bytes()));
        }
        Ok(line)
    }

    /// Parses a command line back into a command and its transaction id.
    pub fn parse(line: &str) -> Result<(Self, TransactionId), ProtocolError> {
        let invalid = |why: &str| ProtocolError::InvalidCommand(format!("{why}: {line:?}"));

        let (head, data) = match line.find(" -- ") {
            Some(pos) => (&line[..pos], Some(line[pos + 4..].trim())),
            None => (line.strip_suffix(" --").unwrap_or(line), None),
        };

        let mut tokens = tokenize(head).map_err(invalid)?.into_iter();
        let verb = tokens.next().ok_or_else(|| invalid("empty command"))?;
        let mut command = Self::new(CommandKind::from_verb(&verb));
        let mut id = None;

        while let Some(token) = tokens.next() {
            let flag = match token.strip_prefix('-').map(|f| f.chars().collect::<Vec<_>>()) {
                Some(chars) if chars.len() == 1 => chars[0],
                _ => return Err(invalid("expected an option")),
            };
            let value = tokens.next().ok_or_else(|| invalid("option without value"))?;
            if flag == 'i' {
                let parsed = value.parse::<u64>().map_err(|_| invalid("bad transaction id"))?;
                id = Some(TransactionId(parsed));
            } else {
                command = command.arg(flag, value);
            }
        }

        if let Some(data) = data {
            let bytes = BASE64.decode(data).map_err(|_| invalid("data is not base64"))?;
            let text = String::from_utf8(bytes).map_err(|_| invalid("data is not UTF-8"))?;
            command = command.data(text);
        }

        let id = id.ok_or_else(|| invalid("missing -i"))?;
        Ok((command, id))
    }
}

fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"');
    if !needs_quotes {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn tokenize(line: &str) -> Result<Vec<String>, &'static str> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(first) = chars.next() else { break };

        let mut token = String::new();
        if first == '"' {
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => token.push(escaped),
                        None => return Err("dangling escape"),
                    },
                    Some('"') => break,
                    Some(c) => token.push(c),
                    None => return Err("unterminated quote"),
                }
            }
        } else {
            token.push(first);
            while let Some(c) = chars.peek().copied() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_simple_verbs() {
        assert_eq!(Command::step_into().serialize(TransactionId(5)).unwrap(), "step_into -i 5");
        assert_eq!(Command::run().serialize(TransactionId(1)).unwrap(), "run -i 1");
        assert_eq!(Command::stack_get().serialize(TransactionId(9)).unwrap(), "stack_get -i 9");
    }

    #[test]
    fn test_serialize_options_in_order() {
        let cmd = Command::breakpoint_set_line("file:///var/www/index.php", 12, true);
        assert_eq!(
            cmd.serialize(TransactionId(3)).unwrap(),
            "breakpoint_set -i 3 -t line -f file:///var/www/index.php -n 12"
        );

        let cmd = Command::breakpoint_set_call("main", false);
        assert_eq!(cmd.serialize(TransactionId(4)).unwrap(), "breakpoint_set -i 4 -t call -m main -s disabled");

        let cmd = Command::property_get("$arr['a b']", 0, 0, 2);
        assert_eq!(
            cmd.serialize(TransactionId(8)).unwrap(),
            "property_get -i 8 -d 0 -c 0 -n \"$arr['a b']\" -p 2"
        );
    }

    #[test]
    fn test_serialize_escapes_quotes() {
        let cmd = Command::property_get("$a[\"k\"]", 1, 0, 0);
        assert_eq!(
            cmd.serialize(TransactionId(2)).unwrap(),
            "property_get -i 2 -d 1 -c 0 -n \"$a[\\\"k\\\"]\" -p 0"
        );
    }

    #[test]
    fn test_serialize_data_is_base64() {
        let cmd = Command::eval("1 + 2");
        assert_eq!(cmd.serialize(TransactionId(6)).unwrap(), "eval -i 6 -- MSArIDI=");
    }

    #[test]
    fn test_arg_replaces_existing_flag() {
        let cmd = Command::status().arg('x', 1).arg('x', 2);
        assert_eq!(cmd.args(), &[('x', "2".to_string())]);
    }

    #[test]
    fn test_parse_inverts_serialize() {
        let commands = vec![
            Command::step_over(),
            Command::feature_set("max_children", 32),
            Command::breakpoint_update("1820001", false),
            Command::property_get("$o->list[\"x y\"]", 2, 1, 3),
            Command::eval("strlen(\"hello\") > 3"),
            Command::new(CommandKind::Custom("xcmd_profiler_name_get".to_string())),
        ];

        for (i, cmd) in commands.into_iter().enumerate() {
            let id = TransactionId(i as u64 + 10);
            let (parsed, parsed_id) = Command::parse(&cmd.serialize(id).unwrap()).unwrap();
            assert_eq!(parsed, cmd);
            assert_eq!(parsed_id, id);
        }
    }

    #[test]
    fn test_serialize_rejects_nul() {
        let cmd = Command::breakpoint_set_call("a\0b", true);
        assert!(matches!(cmd.serialize(TransactionId(1)), Err(ProtocolError::InvalidCommand(_))));

        let cmd = Command::new(CommandKind::Custom("x\0y".to_string()));
        assert!(cmd.serialize(TransactionId(1)).is_err());

        // NUL inside the data payload is base64-encoded and harmless.
        let line = Command::eval("\"a\0b\"").serialize(TransactionId(2)).unwrap();
        assert!(!line.contains('\0'));
    }

    #[test]
    fn test_query_builders() {
        let id = TransactionId(4);
        assert_eq!(
            Command::feature_get("supports_async").serialize(id).unwrap(),
            "feature_get -i 4 -n supports_async"
        );
        assert_eq!(Command::breakpoint_list().serialize(id).unwrap(), "breakpoint_list -i 4");
        assert_eq!(Command::context_names(2).serialize(id).unwrap(), "context_names -i 4 -d 2");

        let (parsed, _) = Command::parse("context_names -i 4 -d 2").unwrap();
        assert_eq!(parsed, Command::context_names(2));
        assert_eq!(parsed.kind(), &CommandKind::ContextNames);
    }

    #[test]
    fn test_parse_reads_options() {
        let (cmd, id) = Command::parse("context_get -i 12 -d 1 -c 0").unwrap();
        assert_eq!(id, TransactionId(12));
        assert_eq!(cmd.kind(), &CommandKind::ContextGet);
        assert_eq!(cmd.arg_value('d'), Some("1"));
        assert_eq!(cmd.arg_value('c'), Some("0"));
        assert_eq!(cmd.arg_value('n'), None);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("run").is_err());
        assert!(Command::parse("run -i x").is_err());
        assert!(Command::parse("run -i 1 -d").is_err());
        assert!(Command::parse("run -i 1 junk").is_err());
        assert!(Command::parse("eval -i 1 -n \"open").is_err());
        assert!(Command::parse("eval -i 1 -- !!!").is_err());
    }

    #[test]
    fn test_continuation_kinds() {
        assert!(CommandKind::Run.is_continuation());
        assert!(CommandKind::StepOut.is_continuation());
        assert!(!CommandKind::Stop.is_continuation());
        assert!(!CommandKind::StackGet.is_continuation());
    }
}
