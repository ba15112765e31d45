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

//! DBGp Client - Remote Script Debugger
//!
//! Console front-end: waits for a DBGp engine (Xdebug and friends) to connect,
//! prints what the session reports and reads debugger commands from stdin.

use std::path::PathBuf;

use clap::Parser;
use dbgp_common::{logging::init_logging, Breakpoint, DebuggerConfig};
use dbgp_session::{LoadOutcome, Session, SessionEvent};
use eyre::{Result, WrapErr};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

mod console;
mod printer;

use console::{ConsoleCommand, HELP};
use printer::{Printer, Report};

/// Command-line interface for the DBGp console debugger
#[derive(Debug, Parser)]
#[command(name = "dbgp")]
#[command(about = "Console debugger for DBGp engines such as Xdebug")]
#[command(version)]
pub struct Cli {
    /// Port to listen on for engine connections (overrides the config file)
    #[arg(long, env = "DBGP_PORT")]
    pub port: Option<u16>,

    /// Address to listen on (overrides the config file)
    #[arg(long)]
    pub bind: Option<String>,

    /// Configuration file (default: $DBGP_CONFIG or ~/.dbgp.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Exit once the engine disconnects instead of waiting for the next one
    #[arg(long)]
    pub no_auto_attach: bool,

    /// Run to the first breakpoint instead of stopping on the first line
    #[arg(long)]
    pub no_break_on_first_line: bool,

    /// Print output as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Breakpoint to set at start-up (`<file>:<line>` or `<function>()`), repeatable
    #[arg(long = "break", value_name = "LOCATION")]
    pub breakpoints: Vec<String>,

    /// Also write logs to a daily rolling file
    #[arg(long)]
    pub log_file: bool,
}

impl Cli {
    /// Configuration file values with the command-line overrides applied.
    fn debugger_config(&self) -> Result<DebuggerConfig> {
        let mut config = match &self.config {
            Some(path) => DebuggerConfig::load_from(path)?,
            None => DebuggerConfig::load()?,
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if self.no_auto_attach {
            config.auto_attach = false;
        }
        if self.no_break_on_first_line {
            config.break_on_first_line = false;
        }
        config.breakpoints.extend(self.breakpoints.iter().cloned());
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_logging("dbgp", cli.log_file)?;

    let config = cli.debugger_config()?;
    let auto_attach = config.auto_attach;
    let initial = config
        .breakpoints
        .iter()
        .map(|location| {
            location.parse::<Breakpoint>().wrap_err_with(|| format!("invalid breakpoint `{location}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    let (events_tx, mut events) = mpsc::unbounded_channel::<SessionEvent>();
    let mut session = Session::new(config, events_tx)?;
    for breakpoint in initial {
        let location = breakpoint.loc.to_string();
        session.add_breakpoint(breakpoint).wrap_err_with(|| format!("invalid breakpoint `{location}`"))?;
    }

    let printer = Printer::new(cli.json);
    session.start();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            alive = session.process_next() => {
                if !alive {
                    tracing::error!("Transport stopped unexpectedly");
                    break;
                }
            }
            Some(event) = events.recv() => {
                if on_event(&mut session, printer, event, auto_attach) == Flow::Quit {
                    break;
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line.wrap_err("failed to read stdin")? else {
                    tracing::info!("Input closed, shutting down...");
                    break;
                };
                if on_line(&mut session, printer, &line) == Flow::Quit {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.close();
    Ok(())
}

fn on_event(session: &mut Session, printer: Printer, event: SessionEvent, auto_attach: bool) -> Flow {
    printer.event(&event);
    match event {
        // Show the locals of every new stop location.
        SessionEvent::StackReplaced { frames } if !frames.is_empty() => {
            if let Err(e) = session.load_stack_frame(0) {
                printer.error(&e);
            }
        }
        SessionEvent::Disconnected if !auto_attach => return Flow::Quit,
        _ => {}
    }
    Flow::Continue
}

fn on_line(session: &mut Session, printer: Printer, line: &str) -> Flow {
    if line.trim().is_empty() {
        return Flow::Continue;
    }
    match line.parse::<ConsoleCommand>() {
        Ok(ConsoleCommand::Quit) => return Flow::Quit,
        Ok(command) => {
            if let Err(e) = execute(session, printer, command) {
                printer.error(&e);
            }
        }
        Err(e) => printer.error(&e),
    }
    Flow::Continue
}

fn execute(session: &mut Session, printer: Printer, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Run => {
            session.run()?;
        }
        ConsoleCommand::StepIn => {
            session.step_in()?;
        }
        ConsoleCommand::StepOver => {
            session.step_over()?;
        }
        ConsoleCommand::StepOut => {
            session.step_out()?;
        }
        ConsoleCommand::Stop => {
            session.stop()?;
        }
        ConsoleCommand::Detach => {
            session.detach()?;
        }
        ConsoleCommand::Break(None) => {
            printer.report(Report::Breakpoints { breakpoints: session.breakpoints().all().to_vec() });
        }
        ConsoleCommand::Break(Some(location)) => {
            if !session.add_breakpoint(Breakpoint::new(location.clone()))? {
                printer.notice(format!("Breakpoint already set at {location}"));
            }
        }
        ConsoleCommand::Delete(location) => {
            session.remove_breakpoint(&location)?;
        }
        ConsoleCommand::Enable(location) => session.set_breakpoint_enabled(&location, true)?,
        ConsoleCommand::Disable(location) => session.set_breakpoint_enabled(&location, false)?,
        ConsoleCommand::Eval(expression) => {
            let shown = expression.clone();
            session.evaluate(&expression, move |result| printer.eval(&shown, result))?;
        }
        ConsoleCommand::Stack => {
            printer.report(Report::Stack { frames: session.stack().to_vec() });
        }
        ConsoleCommand::Frame(index) => show_frame(session, printer, index)?,
        ConsoleCommand::Vars => show_frame(session, printer, 0)?,
        ConsoleCommand::Expand { frame, full_name } => {
            if session.load_variable_children(frame, &full_name)? == LoadOutcome::AlreadyLoaded {
                if let Some(variable) = session.frame(frame).and_then(|f| f.variable(&full_name)) {
                    printer.report(Report::Variables { frame, variables: vec![variable.clone()] });
                }
            }
        }
        ConsoleCommand::Source(file) => {
            let shown = file.clone();
            session.fetch_source(&file, move |result| printer.source(shown, result))?;
        }
        ConsoleCommand::Status => {
            printer.report(Report::Status {
                status: session.status(),
                error: session.last_error().map(str::to_string),
            });
        }
        ConsoleCommand::Help => printer.notice(HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

/// Prints a frame's variables, loading them first if needed; the load
/// result arrives as a notification.
fn show_frame(session: &mut Session, printer: Printer, index: usize) -> Result<()> {
    if session.load_stack_frame(index)? == LoadOutcome::AlreadyLoaded {
        if let Some(frame) = session.frame(index) {
            printer.report(Report::Variables { frame: index, variables: frame.variables.clone() });
        }
    }
    Ok(())
}
