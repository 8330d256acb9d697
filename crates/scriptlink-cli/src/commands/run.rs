//! Run command - launch a runtime and drive it from stdin

use super::repl::{self, LineCommand};
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use scriptlink_config::{Config, DisplayConfig};
use scriptlink_debug::{Breakpoint, LaunchConfig, Session, Target};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Working directory for the runtime
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Fixed debug port (default: first free port in the configured range)
    #[arg(long)]
    pub port: Option<u16>,

    /// Breakpoint set before the program starts (repeatable)
    #[arg(long = "break", value_name = "FILE:LINE", value_parser = repl::parse_location)]
    pub breaks: Vec<(String, u32)>,

    /// Suspend on every thrown exception
    #[arg(long)]
    pub break_exceptions: bool,

    /// Runtime command line; `{port}` is replaced by the debug port
    #[arg(last = true, required = true, value_name = "RUNTIME")]
    pub runtime: Vec<String>,
}

impl RunArgs {
    fn launch_config(&self) -> Result<LaunchConfig> {
        let (command, args) = self
            .runtime
            .split_first()
            .context("No runtime command given")?;

        let mut launch = LaunchConfig::new(command).args(args.iter().cloned());
        if let Some(cwd) = &self.cwd {
            launch = launch.cwd(cwd.clone());
        }
        if let Some(port) = self.port {
            launch = launch.port(port);
        }
        Ok(launch)
    }
}

/// Whether the input loop keeps reading
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Run command
pub async fn run(config: &Config, args: RunArgs) -> Result<()> {
    let session = Session::new(&config.connection);
    let mut events = session.subscribe().await;

    for (file, line) in &args.breaks {
        session
            .breakpoints()
            .add(Breakpoint::line(file.clone(), *line))
            .await
            .with_context(|| format!("Failed to add breakpoint {}:{}", file, line))?;
    }
    if args.break_exceptions {
        session
            .breakpoints()
            .add(Breakpoint::exception(true, true))
            .await
            .context("Failed to add exception breakpoint")?;
    }

    let launch = args.launch_config()?;
    let target = Target::start(&launch, &config.connection, &session)
        .await
        .with_context(|| format!("Failed to start '{}'", launch.command))?;

    info!(
        target_id = %target.id(),
        port = target.port(),
        version = target.runtime_version().unwrap_or("unknown"),
        "Attached to runtime"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", output::format_event(&event));
                if event.is_terminal() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match repl::parse_line(&line) {
                    Ok(Some(command)) => {
                        if execute(&target, command, &config.display).await == Flow::Quit {
                            target.terminate().await;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                },
                Ok(None) => {
                    debug!("stdin closed; waiting for the runtime to exit");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    target.terminate().await;
    Ok(())
}

/// Execute one line command, reporting failures without leaving the loop
async fn execute(target: &Target, command: LineCommand, display: &DisplayConfig) -> Flow {
    let result = match command {
        LineCommand::Resume => target.resume().await,
        LineCommand::StepInto => target.step_into().await,
        LineCommand::StepOver => target.step_over().await,
        LineCommand::StepReturn => target.step_return().await,
        LineCommand::Suspend => target.suspend().await,
        LineCommand::Backtrace => target.stack_frames().await.map(|frames| {
            for frame in frames.iter() {
                println!("{}", output::format_frame(frame));
            }
        }),
        LineCommand::Evaluate(expression) => {
            // Evaluate in the top frame when suspended, globally otherwise
            let frame = match target.stack_frames().await {
                Ok(frames) => frames.first().map(|f| f.index),
                Err(_) => None,
            };
            target.evaluate(&expression, frame).await.map(|evaluation| {
                println!(
                    "{}",
                    evaluation.render_truncated(display.render_depth, display.max_value_length)
                );
            })
        }
        LineCommand::AddBreakpoint { file, line } => {
            let breakpoint = Breakpoint::line(file, line);
            let id = breakpoint.id;
            target
                .add_breakpoint(breakpoint)
                .await
                .map(|()| println!("breakpoint {} set", id))
        }
        LineCommand::RemoveBreakpoint { file, line } => {
            let found = target
                .breakpoints()
                .await
                .into_iter()
                .find(|bp| bp.location() == Some((file.as_str(), line)));
            match found {
                Some(breakpoint) => target
                    .remove_breakpoint(&breakpoint)
                    .await
                    .map(|()| println!("breakpoint {} removed", breakpoint.id)),
                None => {
                    eprintln!("no breakpoint at {}:{}", file, line);
                    Ok(())
                }
            }
        }
        LineCommand::Scripts => {
            for script in target.scripts().await {
                println!("{}", output::format_script(&script));
            }
            Ok(())
        }
        LineCommand::Help => {
            println!("{}", repl::HELP);
            Ok(())
        }
        LineCommand::Quit => return Flow::Quit,
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(runtime: &[&str]) -> RunArgs {
        RunArgs {
            cwd: Some(PathBuf::from("/srv/app")),
            port: Some(5860),
            breaks: Vec::new(),
            break_exceptions: false,
            runtime: runtime.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_launch_config_from_args() {
        let launch = args(&["node", "--debug-brk={port}", "main.js"])
            .launch_config()
            .unwrap();
        assert_eq!(launch.command, "node");
        assert_eq!(launch.command_line(5860), "node --debug-brk=5860 main.js");
        assert_eq!(launch.port, Some(5860));
        assert_eq!(launch.cwd, Some(PathBuf::from("/srv/app")));
    }

    #[test]
    fn test_launch_config_requires_command() {
        assert!(args(&[]).launch_config().is_err());
    }
}
