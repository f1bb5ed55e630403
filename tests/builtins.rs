mod common;

use common::pish;
use pretty_assertions::assert_eq;

#[test]
fn export_and_unexport() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "\
export PISH_VAR first
printenv PISH_VAR
export PISH_VAR second
printenv PISH_VAR
export -o PISH_VAR third
printenv PISH_VAR
unexport PISH_VAR
printenv PISH_VAR
echo end
");
	assert_eq!(run.stdout, "first\nfirst\nthird\nend\n");
	assert_eq!(run.stderr, "export: PISH_VAR: variable already set, use -o to overwrite\n");
}

#[test]
fn cd_changes_directory_for_children() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::create_dir(dir.path().join("sub")).unwrap();
	let run = pish(dir.path(), "cd sub\npwd\ncd\ncd /nonexistent-pish-dir\n");
	let expected = dir.path().canonicalize().unwrap().join("sub");
	assert_eq!(run.stdout.trim_end(), expected.to_str().unwrap());
	assert!(run.stderr.contains("cd: Expected single argument"));
	assert!(run.stderr.contains("cd: /nonexistent-pish-dir: "));
}

#[test]
fn exit_stops_reading() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "echo before\nexit\necho after\n");
	assert_eq!(run.stdout, "before\n");
	assert_eq!(run.code, Some(0));
}

#[test]
fn history_is_empty_without_a_terminal() {
	let dir = tempfile::tempdir().unwrap();
	let run = pish(dir.path(), "echo x\nhistory\n");
	assert_eq!(run.stdout, "x\n");
}
