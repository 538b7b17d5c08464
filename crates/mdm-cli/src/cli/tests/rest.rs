//! Tests for list, active, cancel, dir, clean.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_list() {
    assert!(matches!(parse(&["mdm", "list"]), CliCommand::List));
}

#[test]
fn cli_parse_active() {
    assert!(matches!(parse(&["mdm", "active"]), CliCommand::Active));
}

#[test]
fn cli_parse_cancel() {
    let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
    match parse(&["mdm", "cancel", id]) {
        CliCommand::Cancel { task_id } => assert_eq!(task_id, id),
        _ => panic!("expected Cancel"),
    }
}

#[test]
fn cli_parse_dir() {
    match parse(&["mdm", "dir"]) {
        CliCommand::Dir { path } => assert!(path.is_none()),
        _ => panic!("expected Dir"),
    }
    match parse(&["mdm", "dir", "/srv/models"]) {
        CliCommand::Dir { path } => assert_eq!(path, Some(PathBuf::from("/srv/models"))),
        _ => panic!("expected Dir"),
    }
}

#[test]
fn cli_parse_clean() {
    assert!(matches!(parse(&["mdm", "clean"]), CliCommand::Clean));
}

#[test]
fn cli_rejects_unknown_command() {
    assert!(Cli::try_parse_from(["mdm", "pause", "1"]).is_err());
}
