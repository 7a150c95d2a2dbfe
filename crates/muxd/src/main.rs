//! muxd CLI: run command scripts through the engine.
//!
//! Reads a script file and/or `-e` command strings, feeds them to a single
//! client's command queue and exits with the client's return code. With
//! `--control` the process emits JSON lines for guard markers and
//! notifications, the way a control-mode consumer would see them.

#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use muxd_core::logging::{LogConfig, LogFormat, init_logging};
use muxd_core::notify::{ControlObserver, NotificationEvent};
use muxd_core::report::{GuardMarker, GuardObserver, StdioReporter};
use muxd_core::{CmdQueue, Runtime, command_table};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

#[derive(Parser)]
#[command(name = "muxd", version, about = "Scriptable terminal-multiplexer command engine")]
struct Cli {
    /// Script file of commands, one per line (`;` separates on a line)
    script: Option<PathBuf>,

    /// Command string to run (repeatable, runs after the script)
    #[arg(short = 'e', long = "exec", value_name = "COMMANDS")]
    exec: Vec<String>,

    /// Emit guard markers and notifications as JSON lines
    #[arg(long)]
    control: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MUXD_LOG", default_value = "warn")]
    log_level: String,

    /// Log as JSON lines instead of pretty output
    #[arg(long)]
    log_json: bool,
}

/// Streams control-mode output as JSON lines on stdout.
struct ControlOutput;

impl GuardObserver for ControlOutput {
    fn guard(&self, marker: &GuardMarker) {
        if let Ok(line) = serde_json::to_string(&serde_json::json!({ "guard": marker })) {
            println!("{line}");
        }
    }
}

impl ControlObserver for ControlOutput {
    fn notification(&self, event: &NotificationEvent) {
        let session = event.session.as_ref().map(|s| s.borrow().name.clone());
        let window = event.window.as_ref().map(|w| w.borrow().name.clone());
        let value = serde_json::json!({
            "notify": event.kind,
            "session": session,
            "window": window,
        });
        if let Ok(line) = serde_json::to_string(&value) {
            println!("{line}");
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let rt = Runtime::new(command_table());
    let client = rt.new_client("cli", cli.control);
    let cmdq = CmdQueue::new(Some(Rc::clone(&client)));
    cmdq.set_reporter(Rc::new(StdioReporter));
    if cli.control {
        let output = Rc::new(ControlOutput);
        cmdq.set_guard_observer(Rc::clone(&output) as Rc<dyn GuardObserver>);
        rt.bus().add_observer(output as Rc<dyn ControlObserver>);
    }

    let mut sources: Vec<String> = Vec::new();
    if let Some(path) = &cli.script {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read script {}", path.display()))?;
        sources.push(text);
    }
    sources.extend(cli.exec.iter().cloned());
    if sources.is_empty() {
        bail!("nothing to run: give a script file or -e commands");
    }

    for source in &sources {
        let list = rt
            .table()
            .parse_script(source)
            .with_context(|| format!("bad command: {source}"))?;
        cmdq.run(&rt, list);
    }

    if cmdq.is_waiting() {
        tracing::warn!("queue still suspended on exit (unsignalled wait-for)");
        return Ok(1);
    }
    Ok(client.borrow().retcode)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&LogConfig {
        level: cli.log_level.clone(),
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
    });

    match run(&cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("muxd: {err:#}");
            ExitCode::FAILURE
        }
    }
}
