// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry point: installs color-eyre and ANSI support, parses argv, sets up
//! `tracing`, then runs [`Cli::exec`] to completion on a multi-thread tokio
//! runtime and translates its outcome into a process exit code.

mod adapters;
mod cli;
mod errors;
mod mangen;
mod output;

use camino::Utf8PathBuf;
use clap::Parser;

use crate::cli::Cli;
use crate::errors::ExpectedError;
use crate::output::OutputContext;

/// Hidden man-page-generation mode, invoked as `3pio mangen [output-dir]`.
/// Handled ahead of [`Cli::parse`] rather than as a real clap subcommand,
/// since `Cli::command` is a required trailing-var-arg positional and
/// cannot cleanly coexist with a `#[command(subcommand)]` variant.
const MANGEN_SUBCOMMAND: &str = "mangen";

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    let mut argv = std::env::args_os();
    let program = argv.next();
    let rest: Vec<_> = argv.collect();

    if rest.first().and_then(|arg| arg.to_str()) == Some(MANGEN_SUBCOMMAND) {
        let output_dir = rest.get(1).map(|arg| Utf8PathBuf::from(arg.to_string_lossy().as_ref()));
        if let Err(err) = mangen::generate(output_dir) {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let cli = match Cli::try_parse_from(program.into_iter().chain(rest)) {
        Ok(cli) => cli,
        Err(source) => {
            let err = ExpectedError::Usage { source };
            err.display_to_stderr(&OutputContext::default());
            std::process::exit(err.process_exit_code());
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(output::resolve_log_filter(cli.verbose)))
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(cli.exec()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            err.display_to_stderr(&cli.output_context());
            std::process::exit(err.process_exit_code());
        }
    }
}
