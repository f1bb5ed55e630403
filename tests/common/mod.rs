#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

pub struct Run {
	pub code: Option<i32>,
	pub stdout: String,
	pub stderr: String,
}

/// Runs the interpreter non-interactively in `dir`, feeding `script` on stdin.
pub fn pish(dir: &Path, script: &str) -> Run {
	pish_with_args(dir, &[], script)
}

pub fn pish_with_args(dir: &Path, args: &[&str], script: &str) -> Run {
	let mut child = Command::new(env!("CARGO_BIN_EXE_pish"))
		.args(args)
		.current_dir(dir)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.expect("spawn pish");
	child.stdin.take().unwrap().write_all(script.as_bytes()).unwrap();
	let out = child.wait_with_output().expect("wait pish");
	Run {
		code: out.status.code(),
		stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
		stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
	}
}
