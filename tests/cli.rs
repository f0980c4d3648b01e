//! End-to-end checks against the built `idleguard` binary.

use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn idleguard(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_idleguard"))
        .args(args)
        .env_remove("IDLEGUARD_LOG")
        .output()
        .expect("failed to run idleguard")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn no_arguments_is_a_usage_error() {
    let output = idleguard(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("Usage"));
}

#[test]
fn timeout_without_command_is_a_usage_error() {
    let output = idleguard(&["5"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("Usage"));
    assert!(output.stdout.is_empty());
}

#[test]
fn non_numeric_timeout_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let script = format!("touch {}", marker.display());

    let output = idleguard(&["soon", "sh", "-c", &script]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("invalid idle timeout 'soon'"));
    assert!(stderr.contains("Usage"));
    assert!(!marker.exists(), "child must not be spawned on a usage error");
}

#[test]
fn negative_timeout_is_a_usage_error() {
    let output = idleguard(&["-2", "true"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("invalid idle timeout '-2'"));
}

#[test]
fn help_exits_zero() {
    let output = idleguard(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("IDLE_TIMEOUT_SECONDS"));
}

#[test]
fn child_exit_code_is_propagated() {
    let output = idleguard(&["5", "sh", "-c", "exit 7"]);
    assert_eq!(output.status.code(), Some(7));
    assert!(!stderr_of(&output).contains("No output for"));
}

#[test]
fn output_is_forwarded_unchanged() {
    let output = idleguard(&[
        "5",
        "sh",
        "-c",
        r"printf 'one\ntwo\000\377'; printf 'oops' >&2",
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, b"one\ntwo\x00\xff".to_vec());
    assert_eq!(output.stderr, b"oops".to_vec());
}

#[test]
fn arguments_are_not_shell_parsed() {
    let output = idleguard(&["5", "printf", "%s|%s", "a b", "$HOME"]);
    assert_eq!(output.stdout, b"a b|$HOME".to_vec());
}

#[test]
fn missing_program_fails_with_one() {
    let output = idleguard(&["5", "nonexistent-binary-xyz"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_of(&output).contains("failed to spawn nonexistent-binary-xyz"));
}

#[test]
fn idle_child_is_killed_with_124() {
    let start = Instant::now();
    let output = idleguard(&["1", "sh", "-c", "printf a; sleep 10; printf b"]);
    let elapsed = start.elapsed();

    assert_eq!(output.status.code(), Some(124));
    assert_eq!(output.stdout, b"a".to_vec());
    assert!(stderr_of(&output).contains("[idleguard] No output for 1 seconds. Killing process..."));
    assert!(elapsed >= Duration::from_secs(1));
    // timeout + poll interval + drain, with slack; well under the sleep
    assert!(elapsed < Duration::from_secs(6));
}

#[test]
fn stdin_is_inherited_by_the_child() {
    use std::io::Write;
    use std::process::Stdio;

    let mut child = Command::new(env!("CARGO_BIN_EXE_idleguard"))
        .args(["5", "cat"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"piped through\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, b"piped through\n".to_vec());
}

#[test]
fn output_survives_a_parent_that_reads_late() {
    use std::io::Read;
    use std::process::Stdio;

    let mut child = Command::new(env!("CARGO_BIN_EXE_idleguard"))
        .args(["30", "sh", "-c", "head -c 100000 /dev/zero"])
        .env_remove("IDLEGUARD_LOG")
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    // The child is done long before anyone reads; the pipe stays full.
    std::thread::sleep(Duration::from_secs(3));

    let mut stdout = Vec::new();
    child.stdout.take().unwrap().read_to_end(&mut stdout).unwrap();
    let status = child.wait().unwrap();

    assert_eq!(status.code(), Some(0));
    assert_eq!(stdout.len(), 100_000);
}
