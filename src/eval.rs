use std::ffi::{CString, NulError};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use nix::errno::Errno;
use nix::sys::signal::{self, SigSet, SigmaskHow, Signal};
use nix::unistd;
use tracing::debug;

use crate::builtin::{self, Flow};
use crate::global::{self, SetupError};
use crate::job::{self, Job, JobBuilder};
use crate::parser;
use crate::plan::{self, OpenPlan, PlanError};
use crate::signal::SigchldBlock;
use crate::types::*;

const PROGNAME: &str = "pish";

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
	#[error(transparent)]
	Plan(#[from] PlanError),
	#[error("fork failed: {0}")]
	Fork(#[source] nix::Error),
	#[error("cannot block SIGCHLD: {0}")]
	Mask(#[source] nix::Error),
	#[error("wait failed: {0}")]
	Wait(#[source] nix::Error),
	#[error("argument contains a NUL byte: {0}")]
	Nul(#[from] NulError),
}

fn report(msg: &dyn std::fmt::Display) {
	let mut stderr = io::stderr();
	let _ = writeln!(stderr, "{}: {}", PROGNAME, msg);
	let _ = stderr.flush();
}

fn to_argv(command: &Command) -> Result<Vec<CString>, NulError> {
	command.argv.iter().map(|a| CString::new(a.as_bytes())).collect()
}

fn install_fd(fd: Option<&std::os::fd::OwnedFd>, target: RawFd) -> nix::Result<()> {
	if let Some(fd) = fd {
		if fd.as_raw_fd() != target {
			unistd::dup2(fd.as_raw_fd(), target)?;
		}
	}
	Ok(())
}

fn child_error(argv0: &CString, what: &[u8], e: Errno) {
	let mut stderr = io::stderr();
	let _ = stderr.write_all(PROGNAME.as_bytes());
	let _ = stderr.write_all(b": ");
	let _ = stderr.write_all(argv0.as_bytes());
	let _ = stderr.write_all(what);
	let _ = stderr.write_all(e.desc().as_bytes());
	let _ = stderr.write_all(b"\n");
}

/// Pre-exec phase of stage `i`: install its two descriptors, close every descriptor the
/// plan owns, then replace the process image. Never returns.
fn exec_stage(plan: &OpenPlan, i: usize, argv: &[CString], mask: Option<&SigSet>) -> ! {
	if let Some(mask) = mask {
		let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None);
	}

	let slot = &plan.slots[i];
	let installed = install_fd(slot.stdin.as_ref(), libc::STDIN_FILENO)
		.and_then(|_| install_fd(slot.stdout.as_ref(), libc::STDOUT_FILENO));
	if let Err(e) = installed {
		child_error(&argv[0], b": cannot set up descriptors: ", e);
		// SAFETY: _exit is async-signal-safe and skips the parent's atexit handlers.
		unsafe { libc::_exit(e as i32) }
	}

	for slot in &plan.slots {
		for fd in slot.stdin.iter().chain(slot.stdout.iter()) {
			if fd.as_raw_fd() > libc::STDERR_FILENO {
				let _ = unistd::close(fd.as_raw_fd());
			}
		}
	}

	let e = match unistd::execvp(&argv[0], argv) {
		Err(e) => e,
		Ok(never) => match never {},
	};
	child_error(&argv[0], b": execvp failed: ", e);
	// SAFETY: as above.
	unsafe { libc::_exit(e as i32) }
}

/// Forks one child per command, left to right. The parent keeps none of the plan's
/// descriptors afterwards. If a fork fails, children already started are killed.
pub fn launch(plan: OpenPlan, commands: &[Command], mask: Option<&SigSet>) -> Result<Job, ExecError> {
	let argvs = commands.iter().map(to_argv).collect::<Result<Vec<_>, _>>()?;

	let mut job_builder = JobBuilder::new(commands.len());
	for (i, argv) in argvs.iter().enumerate() {
		match job_builder.push_fork() {
			Ok(unistd::ForkResult::Parent { child }) => {
				debug!(target: "commands", "started {:?} as {}", argv, child);
			},
			Ok(unistd::ForkResult::Child) => exec_stage(&plan, i, argv, mask),
			Err(e) => {
				drop(plan);
				for pid in job_builder.pids() {
					let _ = signal::kill(pid, Signal::SIGKILL);
				}
				return Err(ExecError::Fork(e));
			},
		}
	}
	drop(plan);
	Ok(job_builder.build())
}

/// Launches a parsed pipeline and, unless it is asynchronous, waits for it.
pub fn run_pipeline(pipeline: &Pipeline) -> Result<Option<i32>, ExecError> {
	let open = plan::build(pipeline).open()?;

	if pipeline.is_async {
		let job = launch(open, &pipeline.commands, None)?;
		debug!(target: "jobs", "background job {:?}", job.processes.iter().map(|pr| pr.pid).collect::<Vec<_>>());
		return Ok(None);
	}

	let block = SigchldBlock::new().map_err(ExecError::Mask)?;
	let launched = launch(open, &pipeline.commands, Some(block.previous()));
	// on failure the guard's drop unblocks SIGCHLD and the handler reaps killed children
	let mut job = launched?;
	job::wait_foreground(&mut job).map_err(ExecError::Wait)?;
	drop(block);
	Ok(job.last_code())
}

/// Parses and runs one input line. Only fatal setup failures are returned; everything else
/// is reported to the user and the loop continues.
pub fn eval_line(state: &mut global::State, line: &[u8]) -> Result<Flow, SetupError> {
	let pipeline = match parser::parse(line) {
		Ok(ParseOutcome::Empty) => return Ok(Flow::Continue),
		Ok(ParseOutcome::Pipeline(p)) => p,
		Err(e) => {
			report(&e);
			return Ok(Flow::Continue);
		},
	};

	let first = &pipeline.commands[0];
	if let Some(func) = builtin::match_builtin(first.name()) {
		return match func(state, first.arguments()) {
			Ok(flow) => Ok(flow),
			Err(builtin::BuiltinError::Fatal(e)) => Err(e),
			Err(e) => {
				let mut stderr = io::stderr();
				let _ = writeln!(stderr, "{}", e);
				Ok(Flow::Continue)
			},
		};
	}

	match run_pipeline(&pipeline) {
		Ok(code) => debug!(target: "jobs", "exit status {:?}", code),
		Err(e) => {
			debug!(target: "commands", "pipeline aborted: {:?}", e);
			report(&e);
		},
	}
	Ok(Flow::Continue)
}
