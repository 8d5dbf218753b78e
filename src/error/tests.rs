use super::*;
use crate::future::CallError;
use crate::subprocess::{CommandFailure, ExecError, ExitStatus};
use std::sync::Arc;

#[test]
fn test_pexec_error_construction() {
    // Test config error
    let err = PexecError::config("Configuration file not found");
    assert!(matches!(err, PexecError::Config { .. }));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(err.code(), ErrorCode::CONFIG_GENERIC);

    // Test execution error
    let err = PexecError::execution("Command failed");
    assert!(matches!(err, PexecError::Execution { .. }));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(err.code(), ErrorCode::EXEC_GENERIC);

    // Test scheduling error
    let err = PexecError::scheduling(
        ErrorCode::SCHED_DUPLICATE_KEY,
        "duplicate",
        Some("lint".to_string()),
    );
    assert!(matches!(err, PexecError::Scheduling { .. }));
    assert_eq!(err.exit_code(), 6);
    assert_eq!(err.code(), ErrorCode::SCHED_DUPLICATE_KEY);

    // Test other error
    let err = PexecError::other("Unknown error");
    assert!(matches!(err, PexecError::Other { .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(err.code(), ErrorCode::OTHER_GENERIC);
}

#[test]
fn test_error_with_context() {
    let err = PexecError::config("Config error").with_context("Additional context");
    let err_str = err.to_string();
    assert!(err_str.contains("Config error"));
    assert!(err_str.contains("Additional context"));
}

#[test]
fn test_error_with_source() {
    let source_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
    let err = PexecError::execution("Execution error").with_source(source_err);

    let err_str = err.to_string();
    assert!(err_str.contains("Execution error"));
    assert!(err_str.contains("[E4000]"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_user_messages() {
    let err = PexecError::config_with_code(
        ErrorCode::CONFIG_INVALID_VALUE,
        "bad value",
        Some("/etc/pexec.toml".into()),
    );
    assert_eq!(
        err.user_message(),
        "Configuration problem in /etc/pexec.toml: bad value"
    );

    let err = PexecError::scheduling(ErrorCode::SCHED_KEY_ALREADY_SET, "renamed", Some("a".into()));
    assert_eq!(err.user_message(), "Future 'a': renamed");

    let err =
        PexecError::execution_with_code(ErrorCode::EXEC_TIMEOUT, "too slow", Some("sleep 9".into()));
    assert_eq!(err.user_message(), "Command 'sleep 9' failed: too slow");
}

#[test]
fn test_exec_error_conversion() {
    // Test CommandNotFound
    let err: PexecError = ExecError::CommandNotFound {
        command: "git".to_string(),
    }
    .into();
    assert!(matches!(err, PexecError::Execution { .. }));
    assert_eq!(err.code(), ErrorCode::EXEC_COMMAND_NOT_FOUND);

    // Test Spawn
    let err: PexecError = ExecError::Spawn {
        command: "git".to_string(),
        source: Arc::new(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )),
    }
    .into();
    assert_eq!(err.code(), ErrorCode::EXEC_SPAWN_FAILED);

    // Test CommandFailed
    let failure = CommandFailure {
        command: "false".to_string(),
        status: ExitStatus::Error(1),
        stdout: Vec::new(),
        stderr: b"boom\n".to_vec(),
        killed_by_timeout: false,
        timeout: None,
    };
    let err: PexecError = ExecError::CommandFailed(failure).into();
    assert_eq!(err.code(), ErrorCode::EXEC_SUBPROCESS_FAILED);
    if let PexecError::Execution { exit_code, .. } = &err {
        assert_eq!(*exit_code, Some(1));
    }
    assert!(err.to_string().contains("boom"));

    // Test Signal
    let failure = CommandFailure {
        command: "sleep 5".to_string(),
        status: ExitStatus::Signal(9),
        stdout: Vec::new(),
        stderr: Vec::new(),
        killed_by_timeout: false,
        timeout: None,
    };
    let err: PexecError = ExecError::CommandFailed(failure).into();
    assert_eq!(err.code(), ErrorCode::EXEC_SIGNAL_RECEIVED);

    // Test StdinClosed
    let err: PexecError = ExecError::StdinClosed {
        command: "cat".to_string(),
    }
    .into();
    assert_eq!(err.code(), ErrorCode::EXEC_STDIN_ERROR);
}

#[test]
fn test_call_error_conversion() {
    let err: PexecError = CallError::new("division by zero").into();
    assert_eq!(err.code(), ErrorCode::SCHED_CALL_FAILED);
    assert!(err.to_string().contains("division by zero"));
}

#[test]
fn test_error_code_descriptions() {
    assert_eq!(
        describe_error_code(ErrorCode::CONFIG_NOT_FOUND),
        "Configuration file not found"
    );
    assert_eq!(
        describe_error_code(ErrorCode::EXEC_SPAWN_FAILED),
        "Failed to spawn subprocess"
    );
    assert_eq!(
        describe_error_code(ErrorCode::SCHED_KEY_ALREADY_SET),
        "Future key has already been assigned"
    );
}
