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

//! Console command parsing.

use std::{path::PathBuf, str::FromStr};

use dbgp_common::BreakpointLocation;
use eyre::{bail, eyre, Result, WrapErr};

/// Command summary printed by `help`.
pub const HELP: &str = "\
commands:
  run | continue | c            run to the next breakpoint
  step | s                      step into
  next | n                      step over
  out | o                       step out
  stop                          end the script
  detach                        let the script finish without the debugger
  break [<file>:<line> | <function>()]
                                set a breakpoint, or list them
  delete <location>             remove a breakpoint
  enable <location>             enable a breakpoint
  disable <location>            disable a breakpoint
  eval <expression>             evaluate in the current frame
  stack                         show the call stack
  frame <n>                     show the variables of frame n
  vars                          show the variables of the innermost frame
  expand [<frame>] <name>       load more children of a variable
  source <file>                 print the engine's copy of a file
  status                        show the session status
  quit | q                      exit";

/// A line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Run,
    StepIn,
    StepOver,
    StepOut,
    Stop,
    Detach,
    /// Set a breakpoint, or list them when no location is given
    Break(Option<BreakpointLocation>),
    Delete(BreakpointLocation),
    Enable(BreakpointLocation),
    Disable(BreakpointLocation),
    Eval(String),
    Stack,
    Frame(usize),
    Vars,
    Expand {
        /// Stack frame index
        frame: usize,
        /// Full name of the variable
        full_name: String,
    },
    Source(PathBuf),
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = eyre::Report;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb {
            "run" | "continue" | "c" => Self::Run,
            "step" | "s" => Self::StepIn,
            "next" | "n" => Self::StepOver,
            "out" | "o" => Self::StepOut,
            "stop" => Self::Stop,
            "detach" => Self::Detach,
            "break" | "b" if rest.is_empty() => Self::Break(None),
            "break" | "b" => Self::Break(Some(location(rest)?)),
            "delete" | "d" => Self::Delete(location(rest)?),
            "enable" => Self::Enable(location(rest)?),
            "disable" => Self::Disable(location(rest)?),
            "eval" | "p" if rest.is_empty() => bail!("eval needs an expression"),
            "eval" | "p" => Self::Eval(rest.to_string()),
            "stack" | "bt" => Self::Stack,
            "frame" | "f" => Self::Frame(index(rest)?),
            "vars" => Self::Vars,
            "expand" | "x" => expand(rest)?,
            "source" if rest.is_empty() => bail!("source needs a file"),
            "source" => Self::Source(PathBuf::from(rest)),
            "status" => Self::Status,
            "help" | "h" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            "" => bail!("empty command"),
            other => bail!("unknown command `{other}`, try `help`"),
        };
        Ok(command)
    }
}

fn location(arg: &str) -> Result<BreakpointLocation> {
    arg.parse().wrap_err_with(|| format!("invalid breakpoint location `{arg}`"))
}

fn index(arg: &str) -> Result<usize> {
    arg.parse().map_err(|_| eyre!("expected a frame number, got `{arg}`"))
}

/// `expand <name>` or `expand <frame> <name>`.
fn expand(rest: &str) -> Result<ConsoleCommand> {
    if rest.is_empty() {
        bail!("expand needs a variable name");
    }
    let (frame, full_name) = match rest.split_once(char::is_whitespace) {
        Some((first, name)) if first.parse::<usize>().is_ok() => (index(first)?, name.trim()),
        _ => (0, rest),
    };
    Ok(ConsoleCommand::Expand { frame, full_name: full_name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ConsoleCommand {
        line.parse().unwrap()
    }

    #[test]
    fn test_continuation_aliases() {
        assert_eq!(parse("run"), ConsoleCommand::Run);
        assert_eq!(parse("c"), ConsoleCommand::Run);
        assert_eq!(parse("  step "), ConsoleCommand::StepIn);
        assert_eq!(parse("n"), ConsoleCommand::StepOver);
        assert_eq!(parse("out"), ConsoleCommand::StepOut);
        assert_eq!(parse("q"), ConsoleCommand::Quit);
    }

    #[test]
    fn test_breakpoint_commands() {
        assert_eq!(parse("break"), ConsoleCommand::Break(None));
        assert_eq!(
            parse("break /var/www/index.php:12"),
            ConsoleCommand::Break(Some(BreakpointLocation::line("/var/www/index.php", 12)))
        );
        assert_eq!(
            parse("disable render()"),
            ConsoleCommand::Disable(BreakpointLocation::function("render"))
        );
        assert!("delete".parse::<ConsoleCommand>().is_err());
        assert!("break index.php:x".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_eval_keeps_the_whole_expression() {
        assert_eq!(parse("eval  $a + strlen('x y')"), ConsoleCommand::Eval("$a + strlen('x y')".into()));
        assert!("eval".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_expand_with_and_without_frame() {
        assert_eq!(
            parse("expand $list"),
            ConsoleCommand::Expand { frame: 0, full_name: "$list".into() }
        );
        assert_eq!(
            parse("x 2 $a[\"k y\"]"),
            ConsoleCommand::Expand { frame: 2, full_name: "$a[\"k y\"]".into() }
        );
        assert!("expand".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_frame_index() {
        assert_eq!(parse("frame 3"), ConsoleCommand::Frame(3));
        assert!("frame top".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_unknown_command() {
        let err = "jump 12".parse::<ConsoleCommand>().unwrap_err();
        assert!(err.to_string().contains("unknown command `jump`"));
    }
}
