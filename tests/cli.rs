//! End-to-end checks of the `dockerlink` binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn unresolvable_cli_exits_with_search_path() {
    let mut cmd = Command::cargo_bin("dockerlink").unwrap();
    cmd.env("PATH", "/nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("DOCKER_COM_DOCKER_CLI")
        .arg("ps")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "com.docker.cli: executable file not found in $PATH",
        ))
        .stderr(predicate::str::contains("Current PATH : /nonexistent"));
}

#[cfg(unix)]
#[test]
fn child_output_and_exit_code_pass_through() {
    let mut cmd = Command::cargo_bin("dockerlink").unwrap();
    cmd.env("DOCKER_COM_DOCKER_CLI", "/bin/sh")
        .env_remove("DOCKERLINK_NO_LINKS")
        .args(["-c", "echo hello; echo oops >&2; exit 5"])
        .assert()
        .code(5)
        .stdout("hello\n")
        .stderr(predicate::str::contains("oops"));
}

#[cfg(unix)]
#[test]
fn no_links_flag_inherits_stdout() {
    let mut cmd = Command::cargo_bin("dockerlink").unwrap();
    cmd.args(["--dockerlink-no-links", "--dockerlink-cli", "/bin/sh"])
        .args(["-c", "printf 'no newline'"])
        .assert()
        .success()
        .stdout("no newline");
}
