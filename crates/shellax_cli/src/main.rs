//! shellax: a line-oriented command interpreter
//!
//! Reads one line at a time, parses it into a pipeline and runs it. A line
//! ending in `?` lists completions instead of running anything.

mod completion;
mod config;

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use nix::sys::signal::{signal, SigHandler, Signal};
use shellax::shell::{ReapedChild, DEFAULT_IDENTITY};
use shellax::{execute, parse, ExecuteResult, ShellState};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::ShellConfig;

const USAGE: &str = "\
Usage: shellax [OPTIONS]

Options:
  --config <path>   Read configuration from <path>
  -c <line>         Execute one line and exit with its status
  --dump-commands   Print each parsed command chain before running it
  --help            Show this message
";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    command: Option<String>,
    dump_commands: bool,
    help: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config requires a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "-c" => {
                    parsed.command = Some(args.next().context("-c requires a command line")?);
                }
                "--dump-commands" => parsed.dump_commands = true,
                "-h" | "--help" => parsed.help = true,
                other => bail!("unknown argument: {other}"),
            }
        }
        Ok(parsed)
    }
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(exit_status_byte(code)),
        Err(err) => {
            eprintln!("-{DEFAULT_IDENTITY}: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Only the low 8 bits of a status reach the parent, as with `exit(3)`:
/// `exit 256` reports 0 and `exit -1` reports 255.
fn exit_status_byte(code: i32) -> u8 {
    (code & 0xff) as u8
}

fn run() -> Result<i32> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        print!("{USAGE}");
        return Ok(0);
    }

    let config = ShellConfig::load(args.config.as_deref())?;
    init_tracing(&config)?;
    debug!(?config, "config.loaded");

    let state = ShellState::new(config.identity.as_str())
        .with_announce_background(config.announce_background);

    if let Some(line) = args.command {
        return Ok(run_line(&line, &state, args.dump_commands).exit_code());
    }

    let interactive = io::stdin().is_terminal();
    if interactive {
        ignore_interrupts()?;
    }

    repl(&state, &config, interactive, args.dump_commands)
}

/// Install the subscriber; `SHELLAX_LOG` wins over the configured filter.
fn init_tracing(config: &ShellConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_env("SHELLAX_LOG") {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)
            .with_context(|| format!("invalid log filter {:?}", config.log_filter))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| anyhow!("initialising logger: {err}"))
}

/// Leave terminal interrupts to the foreground pipeline.
fn ignore_interrupts() -> Result<()> {
    for sig in [Signal::SIGINT, Signal::SIGQUIT] {
        // SAFETY: SIG_IGN installs no handler code.
        unsafe { signal(sig, SigHandler::SigIgn) }
            .with_context(|| format!("ignoring {}", sig.as_str()))?;
    }
    Ok(())
}

// ============================================================================
// Read-Eval Loop
// ============================================================================

fn repl(state: &ShellState, config: &ShellConfig, interactive: bool, dump: bool) -> Result<i32> {
    let mut input = io::stdin().lock();
    let mut buf = Vec::new();

    loop {
        announce_reaped(state, config.announce_background);

        if interactive {
            print!("{}", config.prompt);
            io::stdout().flush().context("writing prompt")?;
        }

        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            // End of input behaves like `exit`
            Ok(0) => {
                if interactive {
                    println!();
                }
                return Ok(0);
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("reading standard input"),
        }

        let line = String::from_utf8_lossy(&buf);
        if let ExecuteResult::Exit(code) = run_line(&line, state, dump) {
            return Ok(code);
        }
    }
}

fn run_line(line: &str, state: &ShellState, dump: bool) -> ExecuteResult {
    let chain = parse(line);
    if dump && !chain.is_empty() {
        print!("{chain}");
    }

    if chain.auto_complete {
        for candidate in completion::candidates(&chain, state) {
            println!("{candidate}");
        }
        return ExecuteResult::from_exit_code(0);
    }

    execute(&chain, state)
}

fn announce_reaped(state: &ShellState, announce: bool) {
    for ReapedChild { pid, status } in state.reap_background() {
        if !announce {
            continue;
        }
        match status {
            0 => eprintln!("[{pid}] Done"),
            code => eprintln!("[{pid}] Exit {code}"),
        }
    }
}
