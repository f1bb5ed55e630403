use std::io::{self, Write};

use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};
use tracing::debug;

pub trait WaitStatusExt {
	fn code(self) -> Option<i32>;
}

impl WaitStatusExt for WaitStatus {
	/// Exit code in the shell convention: 128 + signal number for killed processes.
	fn code(self) -> Option<i32> {
		match self {
			WaitStatus::Exited(_, code) => Some(code),
			WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	/// Filled in once the process has been reaped by a foreground wait.
	pub status: Option<WaitStatus>,
}

/// The children launched for one pipeline, in command order.
#[derive(Debug, Default)]
pub struct Job {
	pub processes: Vec<Process>,
}

impl Job {
	pub fn is_empty(&self) -> bool {
		self.processes.is_empty()
	}

	pub fn is_finished(&self) -> bool {
		self.processes.iter().all(|pr| pr.status.is_some())
	}

	/// Stores `status` if it belongs to this job; returns whether it did.
	pub fn record(&mut self, status: WaitStatus) -> bool {
		let pid = match status.pid() {
			Some(pid) => pid,
			None => return false,
		};
		match self.processes.iter_mut().find(|pr| pr.pid == pid) {
			Some(pr) => {
				pr.status = Some(status);
				true
			},
			None => false,
		}
	}

	pub fn last_code(&self) -> Option<i32> {
		self.processes.last().and_then(|pr| pr.status).and_then(|s| s.code())
	}
}

#[derive(Debug, Default)]
pub struct JobBuilder {
	imp: Job,
}

impl JobBuilder {
	pub fn new(size_hint: usize) -> JobBuilder {
		JobBuilder {
			imp: Job { processes: Vec::with_capacity(size_hint) }
		}
	}

	/// Forks once, recording the child's pid on the parent side.
	pub fn push_fork(&mut self) -> nix::Result<unistd::ForkResult> {
		// SAFETY: the interpreter is single-threaded, and the child only dups, closes and execs.
		let r = unsafe { unistd::fork() }?;
		if let unistd::ForkResult::Parent { child } = r {
			self.imp.processes.push(Process { pid: child, status: None });
		}
		Ok(r)
	}

	pub fn pids(&self) -> Vec<Pid> {
		self.imp.processes.iter().map(|pr| pr.pid).collect()
	}

	pub fn build(self) -> Job {
		self.imp
	}
}

/// Waits for any child until every process of `job` has been reaped. Callers hold SIGCHLD
/// blocked so none of them can be reaped elsewhere first; children of background jobs that
/// exit meanwhile are reaped here too.
pub fn wait_foreground(job: &mut Job) -> nix::Result<()> {
	while !job.is_finished() {
		match wait::wait() {
			Ok(status) => {
				if job.record(status) {
					debug!(target: "jobs", "reaped {:?}", status);
				} else {
					debug!(target: "jobs", "reaped background child {:?}", status);
				}
			},
			Err(Errno::EINTR) => continue,
			Err(Errno::ECHILD) => break,
			Err(e) => return Err(e),
		}
	}
	debug!(target: "jobs", "foreground job done, last status {:?}", job.last_code());
	Ok(())
}

/// Waits until the interpreter has no children left. Used when leaving the read loop.
pub fn drain_children() -> nix::Result<()> {
	match wait::waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
		Ok(_) => {
			let mut stderr = io::stderr();
			let _ = writeln!(stderr, "Waiting for child processes to finish");
		},
		Err(Errno::ECHILD) => return Ok(()),
		Err(e) => return Err(e),
	}
	loop {
		match wait::wait() {
			Ok(status) => debug!(target: "jobs", "reaped {:?} at exit", status),
			Err(Errno::EINTR) => continue,
			Err(Errno::ECHILD) => return Ok(()),
			Err(e) => return Err(e),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use nix::sys::signal::Signal;

	fn job(pids: &[i32]) -> Job {
		Job {
			processes: pids.iter().map(|&p| Process { pid: Pid::from_raw(p), status: None }).collect(),
		}
	}

	#[test]
	fn record_matches_by_pid() {
		let mut j = job(&[10, 11]);
		assert!(!j.is_finished());
		assert!(j.record(WaitStatus::Exited(Pid::from_raw(11), 3)));
		assert!(!j.record(WaitStatus::Exited(Pid::from_raw(99), 0)));
		assert!(!j.record(WaitStatus::StillAlive));
		assert!(!j.is_finished());
		assert_eq!(j.last_code(), Some(3));
		assert!(j.record(WaitStatus::Signaled(Pid::from_raw(10), Signal::SIGPIPE, false)));
		assert!(j.is_finished());
		assert_eq!(j.processes[0].status.and_then(|s| s.code()), Some(141));
	}

	#[test]
	fn empty_job_is_finished() {
		let j = JobBuilder::new(2).build();
		assert!(j.is_empty());
		assert!(j.is_finished());
		assert_eq!(j.last_code(), None);
	}
}
