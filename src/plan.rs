use std::fs;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::unistd;
use tracing::debug;

use crate::types::*;

const REDIRECT_FILE_MODE: u32 = 0o666;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
	#[error("{}: {}", .path.display(), .source)]
	Open {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("cannot create pipe: {0}")]
	Pipe(#[from] nix::Error),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StdinSource {
	Inherit,
	File(PathBuf),
	/// Read end of the pipe with this index.
	Pipe(usize),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum StdoutSink {
	Inherit,
	File(PathBuf, OpenMode),
	/// Write end of the pipe with this index.
	Pipe(usize),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StagePlan {
	pub stdin: StdinSource,
	pub stdout: StdoutSink,
}

/// Descriptor wiring for a pipeline, decided before anything is opened.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ProcessPlan {
	pub pipes: usize,
	pub stages: Vec<StagePlan>,
}

pub fn build(pipeline: &Pipeline) -> ProcessPlan {
	let n = pipeline.commands.len();
	let mut stages: Vec<StagePlan> = (0 .. n)
		.map(|_| StagePlan { stdin: StdinSource::Inherit, stdout: StdoutSink::Inherit })
		.collect();

	if let Some(ref path) = pipeline.stdin_file {
		stages[0].stdin = StdinSource::File(path.clone());
	}
	if let Some(ref path) = pipeline.stdout_file {
		stages[n - 1].stdout = StdoutSink::File(path.clone(), pipeline.attributes.open_mode());
	}
	for i in 1 .. n {
		stages[i].stdin = StdinSource::Pipe(i - 1);
		stages[i - 1].stdout = StdoutSink::Pipe(i - 1);
	}

	ProcessPlan { pipes: n.saturating_sub(1), stages: stages }
}

/// Descriptors one stage will install as its standard streams; `None` keeps the inherited one.
#[derive(Debug, Default)]
pub struct Slot {
	pub stdin: Option<OwnedFd>,
	pub stdout: Option<OwnedFd>,
}

/// A plan whose files and pipes are open. Every descriptor is owned by exactly one slot,
/// so dropping the plan closes all of them.
#[derive(Debug)]
pub struct OpenPlan {
	pub slots: Vec<Slot>,
}

fn open_stdin(path: &Path) -> Result<OwnedFd, PlanError> {
	let file = fs::OpenOptions::new()
		.read(true)
		.open(path)
		.map_err(|e| PlanError::Open { path: path.to_owned(), source: e })?;
	Ok(OwnedFd::from(file))
}

fn open_stdout(path: &Path, mode: OpenMode) -> Result<OwnedFd, PlanError> {
	let mut oopt = fs::OpenOptions::new();
	oopt.write(true).mode(REDIRECT_FILE_MODE);
	let _ = match mode {
		OpenMode::Exclusive => oopt.create_new(true),
		OpenMode::Append => oopt.append(true).create(true),
		OpenMode::Truncate => oopt.truncate(true).create(true),
	};
	let file = oopt.open(path)
		.map_err(|e| PlanError::Open { path: path.to_owned(), source: e })?;
	Ok(OwnedFd::from(file))
}

impl ProcessPlan {
	/// Opens redirection files and creates the pipe table. On failure everything opened so
	/// far is closed again.
	pub fn open(&self) -> Result<OpenPlan, PlanError> {
		let mut slots: Vec<Slot> = self.stages.iter().map(|_| Slot::default()).collect();
		let mut read_ends: Vec<Option<OwnedFd>> = Vec::with_capacity(self.pipes);
		let mut write_ends: Vec<Option<OwnedFd>> = Vec::with_capacity(self.pipes);
		for _ in 0 .. self.pipes {
			let (pipe_read, pipe_write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
			read_ends.push(Some(pipe_read));
			write_ends.push(Some(pipe_write));
		}

		for (stage, slot) in self.stages.iter().zip(slots.iter_mut()) {
			slot.stdin = match stage.stdin {
				StdinSource::Inherit => None,
				StdinSource::File(ref path) => Some(open_stdin(path)?),
				StdinSource::Pipe(i) => read_ends[i].take(),
			};
			slot.stdout = match stage.stdout {
				StdoutSink::Inherit => None,
				StdoutSink::File(ref path, mode) => Some(open_stdout(path, mode)?),
				StdoutSink::Pipe(i) => write_ends[i].take(),
			};
		}

		let plan = OpenPlan { slots: slots };
		debug!(target: "commands", "descriptor plan: {:?}", plan.raw_fds());
		Ok(plan)
	}
}

impl OpenPlan {
	/// Raw numbers of every descriptor the plan owns, in slot order.
	pub fn raw_fds(&self) -> Vec<RawFd> {
		self.slots.iter()
			.flat_map(|slot| slot.stdin.iter().chain(slot.stdout.iter()))
			.map(|fd| fd.as_raw_fd())
			.collect()
	}
}
