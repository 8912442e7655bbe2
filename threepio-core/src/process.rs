// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawns the rewritten command, tees its stdout/stderr to the terminal, the
//! on-disk `output.log`, and (for native-processor runners) a
//! [`NativeProcessor`], and forwards shutdown signals to the child's whole
//! process group.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use fs_err::tokio as fs;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

use threepio_metadata::Event;

use crate::native::NativeProcessor;
use crate::signal::{ShutdownSignal, SignalHandler};

/// How long to wait after a forwarded SIGINT/SIGTERM before escalating to
/// SIGKILL on the child's process group.
const GRACE_PERIOD: Duration = Duration::from_secs(10);

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open output log at {path}")]
    OpenLog {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to output log")]
    WriteLog(#[source] io::Error),
    #[error("failed to wait on child process")]
    Wait(#[source] io::Error),
}

/// How the child's lifetime ended.
#[derive(Debug)]
pub enum ChildTermination {
    /// Exited on its own (successfully or not).
    Exited(ExitStatus),
    /// Killed after a forwarded shutdown signal went unheeded past the
    /// grace period.
    KilledAfterGracePeriod(ShutdownSignal),
}

/// Runs one child process to completion, feeding its output to `processor`
/// (if the detected runner has no adapter of its own) and to `output_log`,
/// while mirroring it to the terminal and forwarding shutdown signals.
pub struct ProcessController {
    output_log_path: Utf8PathBuf,
}

impl ProcessController {
    pub fn new(output_log_path: Utf8PathBuf) -> Self {
        Self { output_log_path }
    }

    /// Spawns `argv` (already rewritten by the registry) with `extra_env`
    /// merged into the current environment, running until the child exits
    /// or a forwarded shutdown signal escalates to a kill.
    pub async fn run(
        &self,
        argv: &[String],
        extra_env: &[(String, String)],
        cwd: Option<&Utf8Path>,
        mut processor: Option<Box<dyn NativeProcessor>>,
        mut emit: impl FnMut(Event),
    ) -> Result<ChildTermination, ProcessError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ProcessError::Spawn {
                command: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in extra_env {
            command.env(key, value);
        }
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        set_process_group(&mut command);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            command: argv.join(" "),
            source,
        })?;

        let mut output_log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_log_path)
            .await
            .map_err(|source| ProcessError::OpenLog {
                path: self.output_log_path.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take().map(Reader::new_out);
        let mut stderr = child.stderr.take().map(Reader::new_err);

        let mut signals = SignalHandler::new().ok();
        let mut killed_by: Option<ShutdownSignal> = None;

        let status = loop {
            tokio::select! {
                biased;

                result = child.wait() => {
                    let status = result.map_err(ProcessError::Wait)?;
                    drain_remaining(&mut stdout, &mut stderr, &mut output_log, processor.as_deref_mut(), &mut emit).await?;
                    break status;
                }

                Some(chunk) = read_some(&mut stdout), if stdout.is_some() => {
                    feed_chunk(Stream::Stdout, &chunk, &mut output_log, processor.as_deref_mut(), &mut emit).await?;
                }

                Some(chunk) = read_some(&mut stderr), if stderr.is_some() => {
                    feed_chunk(Stream::Stderr, &chunk, &mut output_log, processor.as_deref_mut(), &mut emit).await?;
                }

                signal = recv_signal(&mut signals) => {
                    if let Some(signal) = signal {
                        forward_and_wait(&mut child, signal).await;
                        killed_by = Some(signal);
                    }
                }
            }

            if killed_by.is_some() {
                match tokio::time::timeout(GRACE_PERIOD, child.wait()).await {
                    Ok(Ok(status)) => {
                        drain_remaining(&mut stdout, &mut stderr, &mut output_log, processor.as_deref_mut(), &mut emit).await?;
                        break status;
                    }
                    Ok(Err(source)) => return Err(ProcessError::Wait(source)),
                    Err(_) => {
                        kill_process_group(&child);
                        let status = child.wait().await.map_err(ProcessError::Wait)?;
                        drain_remaining(&mut stdout, &mut stderr, &mut output_log, processor.as_deref_mut(), &mut emit).await?;
                        if let Some(mut processor) = processor {
                            processor.finalize(&mut emit);
                        }
                        output_log.flush().await.map_err(ProcessError::WriteLog)?;
                        return Ok(ChildTermination::KilledAfterGracePeriod(
                            killed_by.expect("killed_by is Some"),
                        ));
                    }
                }
            }
        };

        if let Some(mut processor) = processor {
            processor.finalize(&mut emit);
        }
        output_log.flush().await.map_err(ProcessError::WriteLog)?;

        Ok(ChildTermination::Exited(status))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Stream {
    Stdout,
    Stderr,
}

enum ReaderInner {
    Out(ChildStdout),
    Err(ChildStderr),
}

struct Reader {
    inner: ReaderInner,
    kind: Stream,
    done: bool,
}

impl Reader {
    fn new_out(r: ChildStdout) -> Self {
        Self { inner: ReaderInner::Out(r), kind: Stream::Stdout, done: false }
    }
    fn new_err(r: ChildStderr) -> Self {
        Self { inner: ReaderInner::Err(r), kind: Stream::Stderr, done: false }
    }

    async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; READ_CHUNK];
        let n = match &mut self.inner {
            ReaderInner::Out(r) => r.read(&mut buf).await,
            ReaderInner::Err(r) => r.read(&mut buf).await,
        };
        match n {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some(buf)
            }
            Err(err) => {
                warn!(%err, stream = ?self.kind, "error reading child output stream");
                self.done = true;
                None
            }
        }
    }
}

async fn read_some(reader: &mut Option<Reader>) -> Option<Vec<u8>> {
    match reader {
        Some(r) => {
            let chunk = r.read_chunk().await;
            if chunk.is_none() {
                *reader = None;
            }
            chunk
        }
        None => std::future::pending().await,
    }
}

async fn recv_signal(signals: &mut Option<SignalHandler>) -> Option<ShutdownSignal> {
    match signals {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

async fn feed_chunk(
    stream: Stream,
    chunk: &[u8],
    output_log: &mut fs::File,
    processor: Option<&mut dyn NativeProcessor>,
    emit: &mut dyn FnMut(Event),
) -> Result<(), ProcessError> {
    print_to_terminal(stream, chunk);
    output_log.write_all(chunk).await.map_err(ProcessError::WriteLog)?;
    if let Some(processor) = processor {
        match stream {
            Stream::Stdout => processor.feed_stdout(chunk, emit),
            Stream::Stderr => processor.feed_stderr(chunk, emit),
        }
    }
    Ok(())
}

fn print_to_terminal(stream: Stream, chunk: &[u8]) {
    use std::io::Write;
    match stream {
        Stream::Stdout => {
            let _ = std::io::stdout().write_all(chunk);
        }
        Stream::Stderr => {
            let _ = std::io::stderr().write_all(chunk);
        }
    }
}

/// Drains whatever is left in the pipes after the child has exited, so a
/// burst of output written right before exit is never lost.
async fn drain_remaining(
    stdout: &mut Option<Reader>,
    stderr: &mut Option<Reader>,
    output_log: &mut fs::File,
    mut processor: Option<&mut dyn NativeProcessor>,
    emit: &mut dyn FnMut(Event),
) -> Result<(), ProcessError> {
    loop {
        let mut any = false;
        if let Some(r) = stdout.as_mut() {
            if let Some(chunk) = r.read_chunk().await {
                feed_chunk(Stream::Stdout, &chunk, output_log, processor.as_deref_mut(), emit).await?;
                any = true;
            } else {
                *stdout = None;
            }
        }
        if let Some(r) = stderr.as_mut() {
            if let Some(chunk) = r.read_chunk().await {
                feed_chunk(Stream::Stderr, &chunk, output_log, processor.as_deref_mut(), emit).await?;
                any = true;
            } else {
                *stderr = None;
            }
        }
        if !any {
            break;
        }
    }
    Ok(())
}

async fn forward_and_wait(child: &mut Child, signal: ShutdownSignal) {
    debug!(?signal, "forwarding shutdown signal to child process group");
    send_signal_to_group(child, signal);
}

#[cfg(unix)]
fn set_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn set_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn send_signal_to_group(child: &Child, signal: ShutdownSignal) {
    let Some(pid) = child.id() else { return };
    let sig = match signal {
        ShutdownSignal::Interrupt => libc::SIGINT,
        ShutdownSignal::Terminate => libc::SIGTERM,
    };
    unsafe {
        libc::kill(-(pid as i32), sig);
    }
}

#[cfg(not(unix))]
fn send_signal_to_group(child: &Child, _signal: ShutdownSignal) {
    let _ = child.id();
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Some(pid) = child.id() else { return };
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[tokio::test]
    async fn runs_a_trivial_command_to_completion() {
        let dir = Utf8TempDir::new().unwrap();
        let controller = ProcessController::new(dir.path().join("output.log"));
        let mut events = Vec::new();
        let result = controller
            .run(
                &["echo".to_string(), "hello".to_string()],
                &[],
                None,
                None,
                |event| events.push(event),
            )
            .await
            .unwrap();
        match result {
            ChildTermination::Exited(status) => assert!(status.success()),
            other => panic!("unexpected termination: {other:?}"),
        }
        let log = fs_err::read_to_string(dir.path().join("output.log")).unwrap();
        assert!(log.contains("hello"));
    }

    #[tokio::test]
    async fn rejects_an_empty_argv() {
        let dir = Utf8TempDir::new().unwrap();
        let controller = ProcessController::new(dir.path().join("output.log"));
        let result = controller.run(&[], &[], None, None, |_| {}).await;
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
