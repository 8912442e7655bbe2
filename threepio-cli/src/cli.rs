// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The command-line surface: a thin `clap::Parser` struct (the "entire tail
//! of argv is the test command" shape, via `trailing_var_arg`) plus the
//! `exec` method that wires registry detection, adapter materialization,
//! the process controller, and the orchestrator together into one run.

use camino::Utf8PathBuf;
use chrono::Utc;
use clap::{ArgAction, Parser};
use tracing::{debug, info};

use threepio_core::native::{cargo_nextest::CargoNextestProcessor, cargo_test::CargoTestProcessor, go_test::GoTestProcessor};
use threepio_core::{
    ChildTermination, Orchestrator, ProcessController, RefusedMode, Renderer, RunCommand, RunId,
    RunMeta, TransportReader, TransportRecord, TransportWriter, definitions, detect, refuse, rewrite,
};
use threepio_metadata::ThreePioExitCode;

use crate::adapters;
use crate::errors::ExpectedError;
use crate::output::{Color, OutputContext};

/// The environment variable carrying the transport file's path, exported
/// to the child (and, redundantly, injected by source substitution into
/// any materialized adapter, since environment inheritance alone cannot be
/// trusted through every monorepo tool chain).
pub const TRANSPORT_PATH_ENV: &str = "THREEPIO_IPC_PATH";

#[derive(Debug, Parser)]
#[command(
    name = "3pio",
    version,
    about = "Wraps a test command and produces a structured, hierarchical on-disk report.",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Colorize console output.
    #[arg(long, value_enum, default_value_t = Color::Auto, global = true)]
    pub color: Color,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Override the `.3pio/runs/` root (default: `<cwd>/.3pio/runs`).
    #[arg(long, value_name = "DIR")]
    pub run_dir: Option<Utf8PathBuf>,

    /// The test command to run, exactly as it would be invoked directly.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

impl Cli {
    pub fn output_context(&self) -> OutputContext {
        OutputContext::new(self.color)
    }

    /// Runs the wrapped test command to completion and returns the process
    /// exit code 3pio itself should exit with: the child's own exit code on
    /// a normal finish, or one of [`ThreePioExitCode`]'s reserved values for
    /// a 3pio-side failure.
    pub async fn exec(&self) -> Result<i32, ExpectedError> {
        let cwd = std::env::current_dir()
            .ok()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        if let Some(mode) = refuse(&self.command) {
            return Err(ExpectedError::Refusal {
                diagnostic: refused_diagnostic(mode),
            });
        }

        let Some(detection) = detect(&self.command, &cwd) else {
            return Err(ExpectedError::DetectionFailure {
                command: self.command.join(" "),
            });
        };
        let runner_name = detection.definition.name();
        info!(runner = runner_name, "detected test runner");

        let now = Utc::now();
        let seed = now.timestamp_nanos_opt().unwrap_or(0) as u64 ^ u64::from(std::process::id());
        let run_id = RunId::generate(now, seed);

        let mut run = RunMeta::new(
            run_id.clone(),
            cwd.clone(),
            RunCommand {
                original: self.command.clone(),
                rewritten: Vec::new(),
            },
            Some(runner_name),
            now,
        );
        if let Some(run_dir_override) = &self.run_dir {
            run.run_dir = run_dir_override.join(run_id.as_str());
        }
        std::fs::create_dir_all(&run.run_dir).ok();

        let transport_path = run.run_dir.join("ipc").join(format!("{run_id}.jsonl"));
        if let Some(parent) = transport_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let mut extra_env = vec![(TRANSPORT_PATH_ENV.to_string(), transport_path.to_string())];
        let adapter_path = if detection.definition.requires_adapter() {
            let file_name = detection
                .definition
                .adapter_file_name()
                .expect("requires_adapter implies adapter_file_name");
            let adapter_dir = run.run_dir.join("adapters");
            let path = adapters::materialize(&adapter_dir, file_name, &transport_path)
                .map_err(|source| ExpectedError::AdapterFailure { source })?;
            Some(path)
        } else {
            None
        };

        let rewritten = rewrite(&detection, &self.command, adapter_path.as_deref());
        run.command.rewritten = rewritten.argv.clone();
        extra_env.extend(rewritten.extra_env);

        debug!(argv = ?rewritten.argv, "rewritten command");

        // Creates the transport file up front so the reader below can open
        // it for reading before any producer (external adapter process or
        // the native-processor emit closure) has written a single byte.
        TransportWriter::create(&transport_path)
            .await
            .map_err(|source| ExpectedError::TransportFailure { source })?;

        let renderer = Renderer::new(run.run_dir.clone()).map_err(|source| ExpectedError::ConsumerInvariantFailure { source })?;
        let orchestrator = Orchestrator::new(renderer);

        let native_processor = native_processor_for(runner_name);

        let reader = TransportReader::open(&transport_path)
            .await
            .map_err(|source| ExpectedError::TransportFailure { source })?;

        let (tx, mut rx) = tokio::sync::mpsc::channel(1024);
        let stop_reading = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_reading_clone = stop_reading.clone();
        let reader_task = tokio::spawn(async move {
            let _ = reader
                .run(tx, move || stop_reading_clone.load(std::sync::atomic::Ordering::SeqCst))
                .await;
        });

        let apply_task_orchestrator = std::sync::Arc::new(orchestrator);
        let apply_task_handle = apply_task_orchestrator.clone();
        let consumer_task = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match record {
                    TransportRecord::Event(event) => {
                        if let Err(err) = apply_task_handle.apply(event) {
                            debug!(%err, "failed to apply event");
                        }
                    }
                    TransportRecord::Malformed { line, reason } => {
                        apply_task_handle.note_malformed_line(&line, &reason);
                    }
                }
            }
        });

        // Native processors run inside this same process and have no
        // adapter of their own to append to the transport file, so the
        // `emit` closure does that job for them directly: every synthesized
        // event still reaches the single transport file the reader task
        // above is tailing, keeping "the orchestrator drains transport" the
        // one and only event path regardless of producer kind.
        let sync_transport = native_processor
            .is_some()
            .then(|| std::fs::OpenOptions::new().append(true).open(&transport_path))
            .transpose()
            .map_err(|source| ExpectedError::TransportFailure {
                source: threepio_core::TransportError::Open {
                    path: transport_path.clone(),
                    source,
                },
            })?
            .map(std::sync::Mutex::new);
        let emit_native_event = |event: threepio_metadata::Event| {
            let Some(file) = sync_transport.as_ref() else {
                return;
            };
            let Ok(mut line) = serde_json::to_string(&event) else {
                return;
            };
            line.push('\n');
            if let Ok(mut file) = file.lock() {
                use std::io::Write;
                let _ = file.write_all(line.as_bytes());
                let _ = file.sync_data();
            }
        };

        let process_controller = ProcessController::new(run.run_dir.join("output.log"));
        let termination = process_controller
            .run(&rewritten.argv, &extra_env, Some(&cwd), native_processor, emit_native_event)
            .await
            .map_err(|source| ExpectedError::SpawnFailure { source })?;

        stop_reading.store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = reader_task.await;
        let _ = consumer_task.await;

        let signal_terminated = matches!(termination, ChildTermination::KilledAfterGracePeriod(_));

        run.finished_at = Some(Utc::now());
        let exit_code = match termination {
            ChildTermination::Exited(status) => status.code().unwrap_or(ThreePioExitCode::INTERNAL_ERROR),
            ChildTermination::KilledAfterGracePeriod(_) => ThreePioExitCode::SIGNAL_TERMINATED,
        };
        run.exit_code = Some(exit_code);

        apply_task_orchestrator
            .finalize(&mut run)
            .map_err(|source| ExpectedError::ConsumerInvariantFailure { source })?;

        if signal_terminated {
            return Err(ExpectedError::SignalTermination);
        }

        Ok(exit_code)
    }
}

fn native_processor_for(runner_name: &str) -> Option<Box<dyn threepio_core::native::NativeProcessor>> {
    match runner_name {
        "go-test" => Some(Box::new(GoTestProcessor::new())),
        "cargo-test" => Some(Box::new(CargoTestProcessor::new())),
        "cargo-nextest" => Some(Box::new(CargoNextestProcessor::new())),
        _ => None,
    }
}

fn refused_diagnostic(mode: RefusedMode) -> &'static str {
    mode.diagnostic()
}

/// Every runner name [`definitions`] can produce, used only to assert (in
/// tests) that [`native_processor_for`] and the adapter-requiring branch in
/// [`Cli::exec`] jointly cover the full registry.
#[cfg(test)]
fn all_runner_names() -> Vec<&'static str> {
    definitions().iter().map(|d| d.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_runner_is_either_native_or_adapter_based() {
        for name in all_runner_names() {
            let is_native = native_processor_for(name).is_some();
            let def = definitions().iter().find(|d| d.name() == name).unwrap();
            assert_eq!(is_native, !def.requires_adapter(), "{name} mismatch");
        }
    }

    #[test]
    fn trailing_var_arg_captures_the_whole_test_command() {
        let cli = Cli::try_parse_from(["3pio", "--color", "never", "npm", "test", "--", "--watchAll=false"]).unwrap();
        assert_eq!(cli.color, Color::Never);
        assert_eq!(cli.command, vec!["npm", "test", "--", "--watchAll=false"]);
    }
}
