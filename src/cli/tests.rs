use super::args::{Cli, Commands};
use super::run::{build_futures, run_commands, RunCommand};
use crate::config::EngineConfig;
use crate::future::Deferred;
use clap::Parser;
use std::time::Duration;

#[test]
fn test_parse_run_arguments() {
    let cli = Cli::try_parse_from([
        "pexec", "-vv", "run", "--limit", "3", "--timeout", "1.5", "--keep-going", "echo a",
        "echo b",
    ])
    .unwrap();

    assert_eq!(cli.verbose, 2);
    let Commands::Run {
        limit,
        timeout,
        keep_going,
        file,
        commands,
    } = cli.command;
    assert_eq!(limit, Some(3));
    assert_eq!(timeout, Some(1.5));
    assert!(keep_going);
    assert!(file.is_none());
    assert_eq!(commands, vec!["echo a", "echo b"]);
}

#[test]
fn test_file_conflicts_with_commands() {
    assert!(Cli::try_parse_from(["pexec", "run", "--file", "cmds.txt", "echo a"]).is_err());
}

#[test]
fn test_build_futures_assigns_keys_in_input_order() {
    let lines = vec!["echo one".to_string(), "echo 'two three'".to_string()];
    let futures = build_futures(&lines, Some(Duration::from_secs(5)), &EngineConfig::default())
        .unwrap();

    assert_eq!(futures[0].key().as_str(), "#1");
    assert_eq!(futures[1].key().as_str(), "#2");
    assert_eq!(futures[1].command().args, vec!["two three"]);
}

#[test]
fn test_run_commands_reports_each_command() {
    let run = RunCommand {
        limit: Some(2),
        keep_going: true,
        commands: vec!["echo alpha".to_string(), "sh -c 'exit 4'".to_string()],
        ..Default::default()
    };

    let mut out = Vec::new();
    let all_ok = run_commands(&run, &EngineConfig::default(), &mut out).unwrap();
    let report = String::from_utf8(out).unwrap();

    assert!(!all_ok);
    assert!(report.contains("exit=0 echo alpha"));
    assert!(report.contains("alpha\n"));
    assert!(report.contains("exit=4"));
}

#[test]
fn test_run_commands_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("commands.txt");
    std::fs::write(&path, "# comment\n\necho from-file\n").unwrap();

    let run = RunCommand {
        file: Some(path),
        ..Default::default()
    };
    let mut out = Vec::new();
    assert!(run_commands(&run, &EngineConfig::default(), &mut out).unwrap());
    assert!(String::from_utf8(out).unwrap().contains("from-file"));
}

#[test]
fn test_run_commands_requires_input() {
    let mut out = Vec::new();
    assert!(run_commands(&RunCommand::default(), &EngineConfig::default(), &mut out).is_err());
}
