use std::ffi::OsString;
use std::ops;
use std::path::PathBuf;

/// Flags naming the symbol that ended a command or carried a redirection.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Attributes(u8);

impl Attributes {
	pub const NONE: Attributes = Attributes(0);
	pub const APPEND: Attributes = Attributes(1);
	pub const TRUNC: Attributes = Attributes(1 << 1);
	pub const EXCL: Attributes = Attributes(1 << 2);
	pub const PIPE: Attributes = Attributes(1 << 3);
	pub const STDOUT: Attributes = Attributes(1 << 4);
	pub const STDERR: Attributes = Attributes(1 << 5);
	pub const STDIN: Attributes = Attributes(1 << 6);

	const OPEN_MODE: Attributes = Attributes(1 | 1 << 1 | 1 << 2);

	pub fn contains(self, other: Attributes) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// Merges a stdout redirection, replacing any open mode recorded before it.
	pub fn set_stdout(&mut self, redirect: Attributes) {
		self.0 &= !Attributes::OPEN_MODE.0;
		self.0 |= redirect.0;
	}

	pub fn open_mode(self) -> OpenMode {
		if self.contains(Attributes::APPEND) {
			OpenMode::Append
		} else if self.contains(Attributes::TRUNC) {
			OpenMode::Truncate
		} else {
			OpenMode::Exclusive
		}
	}
}

impl ops::BitOr for Attributes {
	type Output = Attributes;
	fn bitor(self, rhs: Attributes) -> Attributes {
		Attributes(self.0 | rhs.0)
	}
}

impl ops::BitOrAssign for Attributes {
	fn bitor_assign(&mut self, rhs: Attributes) {
		self.0 |= rhs.0;
	}
}

/// How a stdout redirection file is opened.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OpenMode { Exclusive, Append, Truncate }

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Command {
	pub argv: Vec<OsString>,
}

impl Command {
	pub fn name(&self) -> &OsString {
		&self.argv[0]
	}

	pub fn arguments(&self) -> &[OsString] {
		&self.argv[1..]
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pipeline {
	pub commands: Vec<Command>,
	pub stdin_file: Option<PathBuf>,
	pub stdout_file: Option<PathBuf>,
	pub attributes: Attributes,
	pub is_async: bool,
}

/// Result of parsing one input line.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
	/// Blank or comment-only line.
	Empty,
	Pipeline(Pipeline),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stdout_mode_is_replaced() {
		let mut attrs = Attributes::STDIN;
		attrs.set_stdout(Attributes::STDOUT | Attributes::APPEND);
		assert_eq!(attrs.open_mode(), OpenMode::Append);
		attrs.set_stdout(Attributes::STDOUT | Attributes::TRUNC);
		assert_eq!(attrs.open_mode(), OpenMode::Truncate);
		assert!(!attrs.contains(Attributes::APPEND));
		assert!(attrs.contains(Attributes::STDIN | Attributes::STDOUT));
	}

	#[test]
	fn stderr_and_stdin_are_distinct() {
		assert!(!(Attributes::STDERR | Attributes::STDOUT).contains(Attributes::STDIN));
		assert_eq!(Attributes::default().open_mode(), OpenMode::Exclusive);
		assert!(Attributes::NONE.is_empty());
	}
}
