use std::env;
use std::ffi::{OsStr, OsString};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;

use tracing::debug;

use crate::global::{self, SetupError};

/// Whether the read loop keeps going after a built-in.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow { Continue, Exit }

#[derive(Debug, thiserror::Error)]
pub enum BuiltinError {
	#[error("{0}")]
	Usage(&'static str),
	#[error("cd: {}: {}", .dir.to_string_lossy(), .source)]
	Chdir {
		dir: OsString,
		#[source]
		source: io::Error,
	},
	#[error("{0}: {1}: invalid variable name")]
	InvalidName(&'static str, String),
	#[error("export: {0}: invalid value")]
	InvalidValue(String),
	#[error("export: {0}: variable already set, use -o to overwrite")]
	AlreadySet(String),
	#[error(transparent)]
	Fatal(#[from] SetupError),
}

type BuiltinResult = Result<Flow, BuiltinError>;

pub type Builtin = fn(&mut global::State, &[OsString]) -> BuiltinResult;

fn valid_name(name: &OsStr) -> bool {
	!name.is_empty() && !name.as_bytes().iter().any(|&b| b == b'=' || b == 0)
}

pub fn builtin_cd(state: &mut global::State, args: &[OsString]) -> BuiltinResult {
	if args.len() != 1 {
		return Err(BuiltinError::Usage("cd: Expected single argument"));
	}
	env::set_current_dir(&args[0])
		.map_err(|e| BuiltinError::Chdir { dir: args[0].clone(), source: e })?;
	state.refresh_cwd()?;
	debug!(target: "commands", "cwd is now {}", state.cwd.display());
	Ok(Flow::Continue)
}

pub fn builtin_exit(_: &mut global::State, _: &[OsString]) -> BuiltinResult {
	Ok(Flow::Exit)
}

pub fn builtin_history(state: &mut global::State, _: &[OsString]) -> BuiltinResult {
	let mut stdout = io::stdout();
	for (i, line) in state.editor.history().iter().enumerate() {
		let _ = writeln!(stdout, "{}\t{}", i, line);
	}
	let _ = stdout.flush();
	Ok(Flow::Continue)
}

pub fn builtin_export(_: &mut global::State, args: &[OsString]) -> BuiltinResult {
	if args.len() < 2 {
		return Err(BuiltinError::Usage("export: Expected at least 2 arguments"));
	}
	let (overwrite, name, value) = if args[0] == "-o" {
		if args.len() != 3 {
			return Err(BuiltinError::Usage("export: Expected 2 arguments"));
		}
		(true, &args[1], &args[2])
	} else {
		(false, &args[0], &args[1])
	};
	if !valid_name(name) {
		return Err(BuiltinError::InvalidName("export", name.to_string_lossy().into_owned()));
	}
	if value.as_bytes().contains(&0) {
		return Err(BuiltinError::InvalidValue(name.to_string_lossy().into_owned()));
	}
	if !overwrite && env::var_os(name).is_some() {
		return Err(BuiltinError::AlreadySet(name.to_string_lossy().into_owned()));
	}
	env::set_var(name, value);
	Ok(Flow::Continue)
}

pub fn builtin_unexport(_: &mut global::State, args: &[OsString]) -> BuiltinResult {
	if args.len() != 1 {
		return Err(BuiltinError::Usage("unexport: Expected 1 argument"));
	}
	if !valid_name(&args[0]) {
		return Err(BuiltinError::InvalidName("unexport", args[0].to_string_lossy().into_owned()));
	}
	env::remove_var(&args[0]);
	Ok(Flow::Continue)
}

pub fn match_builtin(name: &OsStr) -> Option<Builtin> {
	match name.as_bytes() {
		b"cd" => Some(builtin_cd),
		b"exit" => Some(builtin_exit),
		b"history" => Some(builtin_history),
		b"export" => Some(builtin_export),
		b"unexport" => Some(builtin_unexport),
		_ => None,
	}
}
