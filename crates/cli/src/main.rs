// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `fvde`: forensic tooling for Apple Core Storage / FileVault Drive
//! Encryption volumes (spec.md §1). Thin binary wiring `clap` subcommands
//! onto the library crates' public APIs.

mod args;
mod check;
mod dmsetup;
mod dump_cmd;
mod errors;
mod keyring;
mod signal;
mod unlock;

use std::process::ExitCode;

use clap::Parser;
use fvde_types::ErrorKind;

use crate::args::{Cli, Command};
use crate::errors::CliError;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).format_timestamp(None).init();
}

fn run(cli: &Cli, abort: &fvde_types::AbortFlag) -> Result<(), CliError> {
    match &cli.command {
        Command::Dmsetup(args) => dmsetup::run(args),
        Command::Dump(args) => dump_cmd::run(args, abort),
        Command::Check(args) => check::run(args, abort),
    }
}

/// Maps a [`CliError`]'s [`ErrorKind`] to a process exit code. `AbortRequested`
/// and `Locked` get their own codes so scripts driving this tool can tell a
/// cooperative abort or a locked volume apart from a hard failure.
fn exit_code(kind: ErrorKind) -> ExitCode {
    match kind {
        ErrorKind::AbortRequested => ExitCode::from(130),
        ErrorKind::Locked => ExitCode::from(75),
        ErrorKind::InvalidArgument | ErrorKind::UnsupportedValue => ExitCode::from(64),
        _ => ExitCode::FAILURE,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let abort = signal::install();

    match run(&cli, abort) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for (i, frame) in e.frames().iter().enumerate() {
                if i == 0 {
                    log::error!("{frame}");
                } else {
                    log::error!("  caused by: {frame}");
                }
            }
            exit_code(e.kind())
        }
    }
}
