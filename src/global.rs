use std::env;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;

use nix::unistd::{self, User};

use crate::editor::{EditorError, LineSource};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
	#[error("cannot determine working directory: {0}")]
	Cwd(#[source] io::Error),
	#[error("cannot determine host name: {0}")]
	Hostname(#[source] nix::Error),
	#[error("cannot determine login name")]
	Login,
	#[error("{}: {}", .path.display(), .source)]
	Script {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("cannot install signal handlers: {0}")]
	Signals(#[source] nix::Error),
	#[error(transparent)]
	Editor(#[from] EditorError),
}

/// Who is running the interpreter and where; shown in the interactive prompt header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
	pub login: String,
	pub hostname: String,
}

impl Identity {
	pub fn lookup() -> Result<Identity, SetupError> {
		let hostname: OsString = unistd::gethostname().map_err(SetupError::Hostname)?;
		let login = match User::from_uid(unistd::getuid()) {
			Ok(Some(user)) => user.name,
			_ => env::var("LOGNAME").or_else(|_| env::var("USER")).map_err(|_| SetupError::Login)?,
		};
		Ok(Identity { login: login, hostname: hostname.to_string_lossy().into_owned() })
	}
}

pub struct State {
	pub cwd: PathBuf,
	/// Present only in interactive mode.
	pub identity: Option<Identity>,
	pub editor: Box<dyn LineSource>,
}

impl State {
	pub fn new(identity: Option<Identity>, editor: Box<dyn LineSource>) -> Result<State, SetupError> {
		let cwd = env::current_dir().map_err(SetupError::Cwd)?;
		Ok(State { cwd: cwd, identity: identity, editor: editor })
	}

	pub fn is_interactive(&self) -> bool {
		self.identity.is_some()
	}

	pub fn refresh_cwd(&mut self) -> Result<(), SetupError> {
		self.cwd = env::current_dir().map_err(SetupError::Cwd)?;
		Ok(())
	}

	/// Line printed above the input prompt, e.g. `alice@box /home/alice`.
	pub fn header(&self) -> Option<String> {
		self.identity.as_ref()
			.map(|id| format!("{}@{} {}", id.login, id.hostname, self.cwd.display()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::editor::Plain;
	use std::io::Cursor;

	#[test]
	fn header_only_when_interactive() {
		let editor = Box::new(Plain::new(Cursor::new(vec![])));
		let mut state = State::new(None, editor).unwrap();
		assert!(!state.is_interactive());
		assert_eq!(state.header(), None);

		state.identity = Some(Identity { login: "alice".to_string(), hostname: "box".to_string() });
		state.cwd = PathBuf::from("/tmp");
		assert_eq!(state.header(), Some("alice@box /tmp".to_string()));
	}
}
