mod common;

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use common::{pish, pish_with_args};
use pretty_assertions::assert_eq;

#[test]
fn pipes_connect_stages() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "echo hello world | tr a-z A-Z | tr -d O\n");
	assert_eq!(run.stdout, "HELL WRLD\n");
	assert_eq!(run.code, Some(0));
}

#[test]
fn quoting_and_comments() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "echo \"a  b\"   c # ignored\necho \"x\\\"y\"\n# nothing\n\n   \n");
	assert_eq!(run.stdout, "a  b c\nx\"y\n");
	assert_eq!(run.stderr, "");
}

#[test]
fn redirections_open_modes() {
	let dir = tempfile::tempdir().unwrap();
	fs::write(dir.path().join("in.txt"), "b\na\nc\n").unwrap();
	let run = pish(dir.path(), "\
sort < in.txt > sorted.txt
echo again > sorted.txt
echo more >> sorted.txt
tr a-z A-Z < in.txt >| upper.txt
");
	assert_eq!(fs::read_to_string(dir.path().join("sorted.txt")).unwrap(), "a\nb\nc\nmore\n");
	assert_eq!(fs::read_to_string(dir.path().join("upper.txt")).unwrap(), "B\nA\nC\n");
	assert!(run.stderr.contains("sorted.txt"), "{}", run.stderr);
}

#[test]
fn missing_input_file_aborts_pipeline() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "cat < missing.txt | tr a-z A-Z >> out.txt\necho next\n");
	assert!(run.stderr.starts_with("pish: missing.txt: "), "{}", run.stderr);
	assert!(!dir.path().join("out.txt").exists());
	assert_eq!(run.stdout, "next\n");
}

#[test]
fn syntax_errors_discard_the_line() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "\
echo a | cat > out.txt extra
echo a > out.txt | cat
echo a &x
echo a >
echo still running
");
	assert_eq!(run.stdout, "still running\n");
	assert_eq!(run.stderr, "\
pish: Only redirection symbols expected after stdout redirection
pish: Unexpected pipe after stdout redirection
pish: Expected nothing after &
pish: Missing file to redirect stdout
");
	assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn exec_failure_stays_in_child() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "pish-no-such-command arg | tr a-z A-Z\necho after\n");
	assert!(run.stderr.contains("pish: pish-no-such-command: execvp failed: "), "{}", run.stderr);
	assert_eq!(run.stdout, "after\n");
	assert_eq!(run.code, Some(0));
}

#[test]
fn exec_failure_exits_with_errno() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish_with_args(dir.path(), &["--trace", "jobs"], "pish-no-such-command\n");
	// ENOENT
	assert!(run.stderr.contains("exit status Some(2)"), "{}", run.stderr);
	assert!(!run.stderr.contains('\x1b'), "{:?}", run.stderr);
}

#[test]
fn stages_do_not_inherit_pipe_descriptors() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "ls /proc/self/fd\nls /proc/self/fd | cat | cat\n");
	let lines: Vec<&str> = run.stdout.lines().collect();
	assert_eq!(lines.len() % 2, 0, "{}", run.stdout);
	let (alone, piped) = lines.split_at(lines.len() / 2);
	assert_eq!(alone, piped);
}

#[test]
fn background_job_does_not_block() {
	let dir = tempfile::tempdir().unwrap();
	let marker = dir.path().join("marker");
	let start = Instant::now();
	let mut child = Command::new(env!("CARGO_BIN_EXE_pish"))
		.current_dir(dir.path())
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.spawn()
		.unwrap();
	child.stdin.take().unwrap().write_all(b"sleep 3 &\ntouch marker\n").unwrap();

	while !marker.exists() {
		assert!(start.elapsed() < Duration::from_secs(2), "next line waited for the background job");
		thread::sleep(Duration::from_millis(20));
	}

	let out = child.wait_with_output().unwrap();
	let stderr = String::from_utf8_lossy(&out.stderr);
	// the job was still running when input ended, so the exit drain had to wait for it
	assert!(stderr.contains("Waiting for child processes to finish"), "{}", stderr);
	assert!(start.elapsed() >= Duration::from_millis(2900));
}

#[test]
fn finished_background_jobs_leave_no_zombies() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "\
true &
true | true &
sleep 0.5
sh -c \"ps -o stat=,comm= --ppid $PPID\"
");
	let children: Vec<&str> = run.stdout.lines().map(str::trim).collect();
	assert!(!children.is_empty(), "{}", run.stderr);
	assert!(children.iter().all(|line| !line.starts_with('Z')), "{:?}", children);
}

#[test]
fn script_file_argument() {
	let dir = tempfile::tempdir().unwrap();
	let script = dir.path().join("script.pish");
	fs::write(&script, "echo from script\nexit\necho unreachable\n").unwrap();
	let out = std::process::Command::new(env!("CARGO_BIN_EXE_pish"))
		.arg(&script)
		.output()
		.unwrap();
	assert_eq!(String::from_utf8_lossy(&out.stdout), "from script\n");
	assert_eq!(out.status.code(), Some(0));

	let out = std::process::Command::new(env!("CARGO_BIN_EXE_pish"))
		.arg(dir.path().join("missing.pish"))
		.output()
		.unwrap();
	assert_eq!(out.status.code(), Some(1));
}
