//! Error types for delegation.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("{binary}: executable file not found in $PATH")]
    NotFound { binary: String },

    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for delegated command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("delegated command failed: {0}")]
    Exited(ExitStatus),
}

impl DelegateError {
    /// Exit code the shim should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DelegateError::Exited(status) => status_code(*status),
            _ => 1,
        }
    }
}

/// Exit code of a finished child; `128 + signal` when it was killed.
pub fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    terminated_by_signal(status)
}

#[cfg(unix)]
fn terminated_by_signal(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => 128 + signal,
        None => 1,
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: ExitStatus) -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn exit_codes() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(DelegateError::Exited(ExitStatus::from_raw(3 << 8)).exit_code(), 3);
        // Raw wait status 15 = killed by SIGTERM.
        assert_eq!(DelegateError::Exited(ExitStatus::from_raw(15)).exit_code(), 143);
        assert_eq!(
            DelegateError::NotFound {
                binary: "com.docker.cli".into()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn not_found_message() {
        let e = DelegateError::NotFound {
            binary: "com.docker.cli".into(),
        };
        assert_eq!(
            e.to_string(),
            "com.docker.cli: executable file not found in $PATH"
        );
    }
}
