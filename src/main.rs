mod builtin;
mod editor;
mod eval;
mod events;
mod global;
mod job;
mod parser;
mod plan;
mod signal;
mod types;

use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use nix::unistd;
use tracing::warn;

use builtin::Flow;
use editor::{LineSource, ReadResult};
use global::{Identity, SetupError, State};

const PROMPT: &str = "$ ";
const HISTORY_FILE_NAME: &str = ".pish_history";

/// A small interactive command interpreter with pipes, redirections and background jobs.
#[derive(Debug, clap::Parser)]
#[command(name = "pish", version)]
struct Args {
	/// Script to read commands from instead of standard input.
	script: Option<PathBuf>,

	/// Enable debug output for a category of events.
	#[arg(long = "trace", value_enum)]
	trace: Vec<events::TraceEvent>,

	/// History file used in interactive mode.
	#[arg(long, value_name = "PATH")]
	history_file: Option<PathBuf>,

	/// Do not load or save history.
	#[arg(long, conflicts_with = "history_file")]
	no_history: bool,
}

impl Args {
	fn history_path(&self) -> Option<PathBuf> {
		if self.no_history {
			return None;
		}
		self.history_file.clone()
			.or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(HISTORY_FILE_NAME)))
	}
}

/// Replaces standard input with `path`, so a script is read exactly like piped input.
fn redirect_stdin(path: &PathBuf) -> Result<(), SetupError> {
	let file = fs::File::open(path)
		.map_err(|e| SetupError::Script { path: path.clone(), source: e })?;
	unistd::dup2(file.as_raw_fd(), libc::STDIN_FILENO)
		.map_err(|e| SetupError::Script { path: path.clone(), source: io::Error::from(e) })?;
	Ok(())
}

fn setup(args: &Args) -> Result<State, SetupError> {
	if let Some(ref script) = args.script {
		redirect_stdin(script)?;
	}
	let interactive = args.script.is_none() && io::stdin().is_terminal();

	let (identity, editor): (Option<Identity>, Box<dyn LineSource>) = if interactive {
		(Some(Identity::lookup()?), Box::new(editor::Interactive::new(args.history_path())?))
	} else {
		(None, Box::new(editor::Plain::new(io::stdin().lock())))
	};
	let state = State::new(identity, editor)?;
	signal::install().map_err(SetupError::Signals)?;
	Ok(state)
}

/// Reacts to signals recorded since the last line, on the main thread.
fn signal_hook(state: &mut State) {
	match signal::poll() {
		signal::Pending::Idle => {},
		signal::Pending::Interrupt => state.editor.reset(),
		signal::Pending::Quit => {
			println!();
			let _ = builtin::builtin_history(state, &[]);
			state.editor.reset();
		},
	}
}

fn run(args: Args) -> anyhow::Result<()> {
	let mut state = setup(&args).context("setup failed")?;

	loop {
		signal_hook(&mut state);
		if let Some(header) = state.header() {
			println!("{}", header);
			let _ = io::stdout().flush();
		}
		let line = match state.editor.read_line(PROMPT)? {
			ReadResult::Input(line) => line,
			ReadResult::Interrupted => continue,
			ReadResult::Eof => {
				if state.is_interactive() {
					println!();
				}
				break;
			},
		};
		if eval::eval_line(&mut state, &line)? == Flow::Exit {
			break;
		}
	}

	if let Err(e) = state.editor.save() {
		warn!("cannot save history: {}", e);
	}
	drop(state);
	job::drain_children().context("while waiting for children at exit")?;
	Ok(())
}

fn main() -> ExitCode {
	let args = Args::parse();
	events::init(&args.trace);
	match run(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("pish: {:#}", e);
			ExitCode::FAILURE
		},
	}
}
