//! Signal handling for the interpreter.
//!
//! Handlers only flip atomic flags or reap exited children with a non-blocking `waitpid`.
//! Everything the user can see happens later, on the main thread, through [`poll`].

use std::sync::atomic::{AtomicBool, Ordering};

use libc::c_int;
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

static INTERRUPT_PENDING: AtomicBool = AtomicBool::new(false);
static QUIT_PENDING: AtomicBool = AtomicBool::new(false);

/// What the main loop has to react to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Pending {
	Idle,
	Interrupt,
	/// Also implies an interrupt.
	Quit,
}

fn reap_exited() {
	loop {
		match wait::waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
			Ok(WaitStatus::StillAlive) | Err(_) => break,
			Ok(_) => {},
		}
	}
}

extern "C" fn handle_signal(signum: c_int) {
	let saved = Errno::last_raw();
	match signum {
		libc::SIGINT => INTERRUPT_PENDING.store(true, Ordering::SeqCst),
		libc::SIGQUIT => QUIT_PENDING.store(true, Ordering::SeqCst),
		libc::SIGCHLD => reap_exited(),
		_ => {},
	}
	Errno::set_raw(saved);
}

pub fn install() -> nix::Result<()> {
	let action = SigAction::new(SigHandler::Handler(handle_signal), SaFlags::SA_RESTART, SigSet::empty());
	for &sig in [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGCHLD].iter() {
		// SAFETY: the handler only touches atomics and calls async-signal-safe waitpid.
		unsafe { signal::sigaction(sig, &action) }?;
	}
	debug!(target: "signals", "handlers installed");
	Ok(())
}

/// Marks an interrupt as pending from ordinary code, e.g. when the line editor consumed Ctrl-C itself.
pub fn raise_interrupt() {
	INTERRUPT_PENDING.store(true, Ordering::SeqCst);
}

/// Same for a quit, e.g. when the line editor read Ctrl-\ as a key.
pub fn raise_quit() {
	QUIT_PENDING.store(true, Ordering::SeqCst);
}

fn summarize(interrupted: bool, quit: bool) -> Pending {
	if quit {
		Pending::Quit
	} else if interrupted {
		Pending::Interrupt
	} else {
		Pending::Idle
	}
}

/// Reports what is pending without clearing it.
pub fn peek() -> Pending {
	summarize(INTERRUPT_PENDING.load(Ordering::SeqCst), QUIT_PENDING.load(Ordering::SeqCst))
}

/// Takes and clears whatever the handlers recorded since the last call.
pub fn poll() -> Pending {
	let interrupted = INTERRUPT_PENDING.swap(false, Ordering::SeqCst);
	let quit = QUIT_PENDING.swap(false, Ordering::SeqCst);
	let pending = summarize(interrupted, quit);
	if pending != Pending::Idle {
		debug!(target: "signals", "pending: {:?}", pending);
	}
	pending
}

/// Keeps SIGCHLD blocked while alive, so the handler cannot reap children a foreground
/// wait is responsible for.
#[derive(Debug)]
pub struct SigchldBlock {
	previous: SigSet,
}

impl SigchldBlock {
	pub fn new() -> nix::Result<SigchldBlock> {
		let mut blocked = SigSet::empty();
		blocked.add(Signal::SIGCHLD);
		let mut previous = SigSet::empty();
		signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut previous))?;
		Ok(SigchldBlock { previous: previous })
	}

	/// The mask in effect before blocking; forked children reinstall it before exec.
	pub fn previous(&self) -> &SigSet {
		&self.previous
	}
}

impl Drop for SigchldBlock {
	fn drop(&mut self) {
		let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
	}
}
