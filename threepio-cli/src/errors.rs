// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The top-level error type this binary actually exits on: one enum that
//! maps every externally-visible failure kind to a process exit code and a
//! one-line diagnostic, with the colorized rendering kept separate from the
//! `#[error(...)]` string (which exists mainly for `Debug`/log output).

use owo_colors::{OwoColorize, Stream};
use threepio_metadata::ThreePioExitCode;

use crate::output::OutputContext;

#[derive(Debug, thiserror::Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("refused: {diagnostic}")]
    Refusal { diagnostic: &'static str },

    #[error("no test runner detected in command: {command}")]
    DetectionFailure { command: String },

    #[error("failed to spawn child process")]
    SpawnFailure {
        #[source]
        source: threepio_core::ProcessError,
    },

    #[error("failed to materialize adapter")]
    AdapterFailure {
        #[source]
        source: crate::adapters::AdapterError,
    },

    #[error("failed to set up the event transport")]
    TransportFailure {
        #[source]
        source: threepio_core::TransportError,
    },

    /// A consumer (orchestrator) invariant was violated -- distinct from any
    /// failing test, which is reported via the exit code of the child
    /// itself, never via this variant.
    #[error("internal consumer invariant violated")]
    ConsumerInvariantFailure {
        #[source]
        source: threepio_core::RenderError,
    },

    #[error("run terminated by signal")]
    SignalTermination,

    #[error("invalid command line")]
    Usage {
        #[source]
        source: clap::Error,
    },
}

impl ExpectedError {
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Refusal { .. } => ThreePioExitCode::REFUSED_MODE,
            Self::DetectionFailure { .. } => ThreePioExitCode::DETECTION_FAILED,
            Self::SpawnFailure { .. } => ThreePioExitCode::SPAWN_FAILED,
            Self::AdapterFailure { .. } => ThreePioExitCode::SPAWN_FAILED,
            Self::TransportFailure { .. } => ThreePioExitCode::SPAWN_FAILED,
            Self::ConsumerInvariantFailure { .. } => ThreePioExitCode::CONSUMER_INVARIANT_FAILURE,
            Self::SignalTermination => ThreePioExitCode::SIGNAL_TERMINATED,
            Self::Usage { source } => source.exit_code(),
        }
    }

    /// Prints a one-line, colorized diagnostic to stderr, keeping error
    /// rendering out of the `Display` impl used for logging.
    pub fn display_to_stderr(&self, output: &OutputContext) {
        let colored = output.color_enabled(Stream::Stderr);
        let label = |text: &str| -> String {
            if colored {
                format!("{}", text.red().bold())
            } else {
                text.to_string()
            }
        };
        match self {
            Self::Refusal { diagnostic } => {
                eprintln!("{} {diagnostic}", label("error:"));
            }
            Self::DetectionFailure { command } => {
                eprintln!("{} no known test runner recognized in `{command}`", label("error:"));
            }
            Self::SpawnFailure { source } => {
                eprintln!("{} {source}", label("error:"));
            }
            Self::AdapterFailure { source } => {
                eprintln!("{} {source}", label("error:"));
            }
            Self::TransportFailure { source } => {
                eprintln!("{} {source}", label("error:"));
            }
            Self::ConsumerInvariantFailure { source } => {
                eprintln!("{} {source}", label("internal error:"));
            }
            Self::SignalTermination => {
                eprintln!("{} run interrupted", label("error:"));
            }
            Self::Usage { source } => {
                eprint!("{source}");
            }
        }
    }
}
