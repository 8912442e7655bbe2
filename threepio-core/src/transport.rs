// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The event transport: a single line-delimited, append-only JSON file that
//! carries [`threepio_metadata::Event`] records from one or more producers
//! (in-process adapters, native output processors) to the orchestrator.
//!
//! The reader tails the file in chunks rather than draining a pipe: the
//! file keeps growing as the child runs, so each read is a `fill_buf`-style
//! chunk boundary, with a carry buffer for any partial line left at the end
//! of a chunk.

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err::tokio as fs;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use threepio_metadata::Event;

/// Chunk size for each tail-follow read. Large enough to keep up with a
/// busy producer without reading line-by-line.
const CHUNK_SIZE: usize = 256 * 1024;

/// Carry buffer starts here and is allowed to grow to accommodate a single
/// oversized record (huge captured output embedded in one event).
const INITIAL_CARRY_CAPACITY: usize = 64 * 1024;
const MAX_CARRY_CAPACITY: usize = 16 * 1024 * 1024;

/// How long to sleep between reads once EOF has been reached but the
/// producer may still write more.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open event transport file at {path}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write event transport record")]
    Write(#[source] io::Error),
    #[error("failed to read event transport file")]
    Read(#[source] io::Error),
}

/// The producer side of the transport. Opens the file once in append mode
/// and keeps the handle for the run's lifetime; every write is followed by
/// an fsync, since 3pio's own native processors are the only producers that
/// run inside this binary (in-process JS/Python adapters are separate OS
/// processes with their own file handle, materialized with the same
/// append-plus-fsync discipline).
pub struct TransportWriter {
    file: fs::File,
    path: Utf8PathBuf,
}

impl TransportWriter {
    pub async fn create(path: &Utf8Path) -> Result<Self, TransportError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| TransportError::Open {
                path: path.to_owned(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Serializes `event` as one JSON line and durably appends it.
    pub async fn write_event(&mut self, event: &Event) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(event).map_err(|e| {
            TransportError::Write(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(TransportError::Write)?;
        // Metadata durability (e.g. file length after append) is not load
        // bearing here -- only the bytes matter once read back -- so
        // sync_data is preferred over sync_all for the per-event cost.
        self.file.sync_data().await.map_err(TransportError::Write)?;
        Ok(())
    }
}

/// A decoded transport record: either a well-formed event, or a line that
/// failed to parse (surfaced, not dropped -- malformed input from an
/// adapter bug must not silently vanish).
#[derive(Debug)]
pub enum TransportRecord {
    Event(Event),
    Malformed { line: String, reason: String },
}

/// The consumer side of the transport. Tails the file from its start,
/// growing a carry buffer across partial trailing lines, and continues
/// polling past EOF until told the producer side is finished and a final
/// drain has completed.
pub struct TransportReader {
    file: fs::File,
    carry: BytesMut,
}

impl TransportReader {
    pub async fn open(path: &Utf8Path) -> Result<Self, TransportError> {
        let file = fs::File::open(path)
            .await
            .map_err(|source| TransportError::Open {
                path: path.to_owned(),
                source,
            })?;
        Ok(Self {
            file,
            carry: BytesMut::with_capacity(INITIAL_CARRY_CAPACITY),
        })
    }

    /// Runs the tail-follow loop, sending each decoded record to `tx`.
    /// Blocks (never drops) when `tx`'s channel is full, per the transport's
    /// backpressure contract. Returns once `should_stop` reports true AND a
    /// final zero-byte read confirms no more data is pending.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<TransportRecord>,
        mut should_stop: impl FnMut() -> bool,
    ) -> Result<(), TransportError> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self
                .file
                .read(&mut buf)
                .await
                .map_err(TransportError::Read)?;

            if n == 0 {
                if should_stop() {
                    // One last read to catch anything written between the
                    // previous read and the stop signal.
                    let trailing = self.file.read(&mut buf).await.map_err(TransportError::Read)?;
                    if trailing > 0 {
                        self.ingest(&buf[..trailing], &tx).await;
                        continue;
                    }
                    break;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            self.ingest(&buf[..n], &tx).await;

            if self.carry.len() > MAX_CARRY_CAPACITY {
                warn!(
                    carry_bytes = self.carry.len(),
                    "event transport carry buffer exceeded expected bound; a producer may be \
                     emitting an unbounded single line"
                );
            }
        }
        Ok(())
    }

    async fn ingest(&mut self, chunk: &[u8], tx: &mpsc::Sender<TransportRecord>) {
        self.carry.extend_from_slice(chunk);
        loop {
            let Some(newline_at) = self.carry.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line_bytes = self.carry.split_to(newline_at + 1);
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).into_owned();
            if line.trim().is_empty() {
                continue;
            }
            let record = match Event::parse_line(&line) {
                Ok(event) => TransportRecord::Event(event),
                Err(err) => {
                    debug!(%err, "malformed transport line");
                    TransportRecord::Malformed {
                        line,
                        reason: err.to_string(),
                    }
                }
            };
            if tx.send(record).await.is_err() {
                // Receiver gone (orchestrator shut down); nothing left to do.
                return;
            }
        }
    }
}
