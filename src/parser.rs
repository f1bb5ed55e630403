use std::ffi::OsString;
use std::fmt;
use std::mem;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

use tracing::debug;

use crate::types::*;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Stream { Stdin, Stdout }

impl fmt::Display for Stream {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match *self {
			Stream::Stdin => write!(f, "stdin"),
			Stream::Stdout => write!(f, "stdout"),
		}
	}
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
	#[error("Expected nothing after &")]
	TrailingGarbageAfterAsync,
	#[error("Missing file to redirect {0}")]
	MissingRedirectionTarget(Stream),
	#[error("Only redirection symbols expected after stdout redirection")]
	SymbolAfterStdoutRedirection,
	#[error("Unexpected pipe after stdout redirection")]
	PipeAfterStdoutRedirection,
	#[error("Missing command")]
	EmptyCommand,
}

type ParseResult<T> = Result<T, ParseError>;

/// Why `read_word` stopped.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum StopReason {
	/// The cursor was already at the end; no word was present at all.
	AtEnd,
	EndOfLine,
	Whitespace,
}

impl StopReason {
	fn is_end(self) -> bool {
		self != StopReason::Whitespace
	}
}

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn at_end(&self) -> bool {
		self.i >= self.line.len()
	}

	/// Appends the next word to `word`, resolving quotes and escapes.
	fn read_word(&mut self, word: &mut Vec<u8>) -> StopReason {
		if self.at_end() {
			return StopReason::AtEnd;
		}
		let mut in_quotes = false;
		let mut escaped = false;
		while let Some(&c) = self.line.get(self.i) {
			self.i += 1;
			if escaped {
				word.push(c);
				escaped = false;
				continue;
			}
			match c {
				b'\\' if !in_quotes => escaped = true,
				// inside quotes only the quote and the backslash itself can be escaped
				b'\\' if matches!(self.line.get(self.i), Some(&b'"') | Some(&b'\\')) => escaped = true,
				b'"' => in_quotes = !in_quotes,
				b'#' if !in_quotes => {
					self.i = self.line.len();
					return StopReason::EndOfLine;
				},
				c if !in_quotes && Parser::is_whitespace(c) => return StopReason::Whitespace,
				c => word.push(c),
			}
		}
		StopReason::EndOfLine
	}

	fn parse_symbol(&mut self) -> Attributes {
		let (flags, len) = match (self.line.get(self.i), self.line.get(self.i + 1)) {
			(Some(&b'>'), Some(&b'>')) => (Attributes::STDOUT | Attributes::APPEND, 2),
			(Some(&b'>'), Some(&b'|')) => (Attributes::STDOUT | Attributes::TRUNC, 2),
			(Some(&b'>'), _) => (Attributes::STDOUT | Attributes::EXCL, 1),
			(Some(&b'|'), _) => (Attributes::PIPE, 1),
			(Some(&b'<'), _) => (Attributes::STDIN, 1),
			_ => (Attributes::NONE, 0),
		};
		self.i += len;
		self.skip_whitespaces();
		flags
	}

	/// Consumes a trailing `&`; anything but whitespace after it is an error.
	fn parse_async(&mut self) -> ParseResult<bool> {
		if self.line.get(self.i) != Some(&b'&') {
			return Ok(false);
		}
		self.i += 1;
		self.skip_whitespaces();
		if !self.at_end() {
			return Err(ParseError::TrailingGarbageAfterAsync);
		}
		Ok(true)
	}

	fn seal(argv: Vec<OsString>) -> ParseResult<Command> {
		if argv.is_empty() {
			return Err(ParseError::EmptyCommand);
		}
		Ok(Command { argv: argv })
	}

	fn parse_pipeline(&mut self) -> ParseResult<ParseOutcome> {
		let mut commands: Vec<Command> = vec![];
		let mut argv: Vec<OsString> = vec![];
		let mut stdin_file: Option<PathBuf> = None;
		let mut stdout_file: Option<PathBuf> = None;
		let mut attributes = Attributes::NONE;
		let mut is_async = false;
		let mut redirect_sealed = false;

		loop {
			self.skip_whitespaces();
			if self.parse_async()? {
				is_async = true;
				break;
			}

			let symbol = self.parse_symbol();
			if symbol.contains(Attributes::PIPE) {
				if redirect_sealed {
					return Err(ParseError::PipeAfterStdoutRedirection);
				}
				commands.push(Parser::seal(mem::take(&mut argv))?);
			}

			let mut word: Vec<u8> = vec![];
			let mut stop = self.read_word(&mut word);
			if stop.is_end() && word.is_empty() && symbol.is_empty() && argv.is_empty() && commands.is_empty() {
				return Ok(ParseOutcome::Empty);
			}

			if symbol.contains(Attributes::STDIN) {
				if word.is_empty() {
					return Err(ParseError::MissingRedirectionTarget(Stream::Stdin));
				}
				attributes |= Attributes::STDIN;
				stdin_file = Some(PathBuf::from(OsString::from_vec(word)));
				self.skip_whitespaces();
				if self.parse_async()? {
					is_async = true;
					stop = StopReason::EndOfLine;
				}
			} else if symbol.contains(Attributes::STDOUT) {
				if word.is_empty() {
					return Err(ParseError::MissingRedirectionTarget(Stream::Stdout));
				}
				attributes.set_stdout(symbol);
				stdout_file = Some(PathBuf::from(OsString::from_vec(word)));
				redirect_sealed = true;
			} else if !word.is_empty() {
				if redirect_sealed {
					return Err(ParseError::SymbolAfterStdoutRedirection);
				}
				argv.push(OsString::from_vec(word));
			}

			if stop.is_end() {
				break;
			}
		}

		commands.push(Parser::seal(argv)?);
		if commands.len() > 1 {
			attributes |= Attributes::PIPE;
		}
		Ok(ParseOutcome::Pipeline(Pipeline {
			commands: commands,
			stdin_file: stdin_file,
			stdout_file: stdout_file,
			attributes: attributes,
			is_async: is_async,
		}))
	}
}

pub fn parse(line: &[u8]) -> ParseResult<ParseOutcome> {
	let mut parser = Parser { line: line, i: 0 };
	let outcome = parser.parse_pipeline();
	debug!(target: "parse", "{:?} -> {:?}", String::from_utf8_lossy(line), outcome);
	outcome
}
