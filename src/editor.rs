use std::borrow::Cow;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use reedline::{
	EditCommand, EditMode, Emacs, FileBackedHistory, History, HistoryItem, KeyCode, KeyModifiers,
	Keybindings, Prompt, PromptEditMode, PromptHistorySearch, Reedline, ReedlineError,
	ReedlineEvent, ReedlineRawEvent, SearchDirection, SearchQuery, Signal,
};
use tracing::{debug, warn};

use crate::signal::{self, Pending};

pub const HISTORY_CAPACITY: usize = 1000;

// Returned by reedline as the "line" when editing was abandoned; never executed.
const QUIT_KEY_COMMAND: &str = "\x1c:quit";
const PENDING_SIGNAL_COMMAND: &str = "\x1c:signal";

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
	#[error("cannot read input: {0}")]
	Io(#[from] io::Error),
	#[error("history: {0}")]
	History(#[from] ReedlineError),
}

pub enum ReadResult {
	Input(Vec<u8>),
	/// The line was abandoned because of an interrupt or quit; the matching flag is pending.
	Interrupted,
	Eof,
}

/// Where input lines come from.
pub trait LineSource {
	fn read_line(&mut self, prompt: &str) -> Result<ReadResult, EditorError>;

	/// Discards the partially edited line and starts over on a fresh one.
	fn reset(&mut self);

	/// Retained entries, oldest first.
	fn history(&self) -> Vec<String>;

	/// Writes retained history back to its file, if there is one.
	fn save(&mut self) -> Result<(), EditorError> {
		Ok(())
	}
}

struct ShellPrompt<'a>(&'a str);

impl<'a> Prompt for ShellPrompt<'a> {
	fn render_prompt_left(&self) -> Cow<'_, str> {
		Cow::Borrowed(self.0)
	}

	fn render_prompt_right(&self) -> Cow<'_, str> {
		Cow::Borrowed("")
	}

	fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
		Cow::Borrowed("")
	}

	fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
		Cow::Borrowed("> ")
	}

	fn render_prompt_history_search_indicator(&self, history_search: PromptHistorySearch) -> Cow<'_, str> {
		Cow::Owned(format!("(search: {}) ", history_search.term))
	}
}

/// Abandons the current line: the buffer is cleared first, so nothing half typed can be
/// submitted afterwards.
fn abandon_line(command: &str) -> ReedlineEvent {
	ReedlineEvent::Multiple(vec![
		ReedlineEvent::Edit(vec![EditCommand::Clear]),
		ReedlineEvent::ExecuteHostCommand(command.to_string()),
	])
}

fn compose_key_bindings() -> Keybindings {
	let mut key_bindings = reedline::default_emacs_keybindings();
	// the terminal reports Ctrl-\ as Ctrl-4 in raw mode
	for key in ['\\', '4'] {
		key_bindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char(key), abandon_line(QUIT_KEY_COMMAND));
	}
	key_bindings
}

/// Emacs editing that gives up the line as soon as a signal is pending, before the key
/// that woke the editor takes effect.
struct SignalAwareEditMode {
	inner: Emacs,
}

impl SignalAwareEditMode {
	fn new(key_bindings: Keybindings) -> SignalAwareEditMode {
		SignalAwareEditMode { inner: Emacs::new(key_bindings) }
	}
}

impl EditMode for SignalAwareEditMode {
	fn parse_event(&mut self, event: ReedlineRawEvent) -> ReedlineEvent {
		match signal::peek() {
			Pending::Idle => self.inner.parse_event(event),
			pending => {
				debug!(target: "signals", "abandoning line: {:?}", pending);
				abandon_line(PENDING_SIGNAL_COMMAND)
			},
		}
	}

	fn edit_mode(&self) -> PromptEditMode {
		self.inner.edit_mode()
	}
}

/// Terminal line editing with persistent history.
pub struct Interactive {
	reedline: Reedline,
}

impl Interactive {
	pub fn new(history_file: Option<PathBuf>) -> Result<Interactive, EditorError> {
		let edit_mode = SignalAwareEditMode::new(compose_key_bindings());
		let mut reedline = Reedline::create().with_edit_mode(Box::new(edit_mode));
		if let Some(path) = history_file {
			let history = FileBackedHistory::with_file(HISTORY_CAPACITY, path)?;
			reedline = reedline.with_history(Box::new(history));
		}
		Ok(Interactive { reedline: reedline })
	}
}

impl LineSource for Interactive {
	fn read_line(&mut self, prompt: &str) -> Result<ReadResult, EditorError> {
		match self.reedline.read_line(&ShellPrompt(prompt))? {
			Signal::Success(ref line) if line == PENDING_SIGNAL_COMMAND => Ok(ReadResult::Interrupted),
			Signal::Success(ref line) if line == QUIT_KEY_COMMAND => {
				signal::raise_quit();
				Ok(ReadResult::Interrupted)
			},
			Signal::Success(line) => Ok(ReadResult::Input(line.into_bytes())),
			Signal::CtrlD => Ok(ReadResult::Eof),
			_ => {
				signal::raise_interrupt();
				Ok(ReadResult::Interrupted)
			},
		}
	}

	fn reset(&mut self) {
		let _ = writeln!(io::stdout());
		self.reedline.run_edit_commands(&[EditCommand::Clear]);
	}

	fn history(&self) -> Vec<String> {
		let query = SearchQuery::everything(SearchDirection::Forward, None);
		match self.reedline.history().search(query) {
			Ok(items) => items.into_iter().map(|item: HistoryItem| item.command_line).collect(),
			Err(e) => {
				warn!("cannot list history: {}", e);
				vec![]
			},
		}
	}

	fn save(&mut self) -> Result<(), EditorError> {
		self.reedline.sync_history()?;
		Ok(())
	}
}

/// Reads lines from a script or a non-terminal stdin. Keeps no history.
pub struct Plain<R> {
	reader: R,
}

impl<R: BufRead> Plain<R> {
	pub fn new(reader: R) -> Plain<R> {
		Plain { reader: reader }
	}
}

impl<R: BufRead> LineSource for Plain<R> {
	fn read_line(&mut self, _prompt: &str) -> Result<ReadResult, EditorError> {
		let mut line: Vec<u8> = vec![];
		if self.reader.read_until(b'\n', &mut line)? == 0 {
			return Ok(ReadResult::Eof);
		}
		if line.last() == Some(&b'\n') {
			line.pop();
		}
		Ok(ReadResult::Input(line))
	}

	fn reset(&mut self) {}

	fn history(&self) -> Vec<String> {
		vec![]
	}
}
