// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run identity and process-wide metadata.
//!
//! `RunId` generation injects the clock (and, for the human-readable
//! suffix, an RNG seed) as explicit parameters rather than reading
//! `Utc::now()` internally, so generation stays deterministic under test.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::fmt;

const ADJECTIVES: &[&str] = &[
    "brave", "calm", "eager", "fleet", "gentle", "jovial", "keen", "lucid", "mellow", "nimble",
    "placid", "quiet", "rapid", "sturdy", "tidy", "vivid", "witty", "zesty",
];

const NOUNS: &[&str] = &[
    "falcon", "otter", "badger", "heron", "marten", "osprey", "lynx", "finch", "gecko", "ibex",
    "swift", "wren", "cobra", "stoat", "raven", "viper", "crane", "moth",
];

/// The identifier for one invocation of 3pio: a sortable timestamp prefix
/// plus a short adjective-noun suffix for human readability in a terminal
/// or shell-completion list.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Builds a run id from an explicit timestamp and seed, so callers (and
    /// tests) never depend on wall-clock time or process-global RNG state.
    pub fn generate(now: DateTime<Utc>, seed: u64) -> Self {
        let adjective = ADJECTIVES[(seed as usize) % ADJECTIVES.len()];
        let noun = NOUNS[(seed as usize / ADJECTIVES.len()) % NOUNS.len()];
        Self(format!(
            "{}-{adjective}-{noun}",
            now.format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The observed and rewritten forms of the user's command, kept side by
/// side for the run manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunCommand {
    pub original: Vec<String>,
    pub rewritten: Vec<String>,
}

/// Process-wide, immutable-once-set run metadata. The mutable group tree
/// and per-group report state live in [`crate::orchestrator::Orchestrator`];
/// this struct carries everything else about one run's lifecycle.
#[derive(Clone, Debug)]
pub struct RunMeta {
    pub run_id: RunId,
    pub root_dir: Utf8PathBuf,
    pub run_dir: Utf8PathBuf,
    pub command: RunCommand,
    pub detected_runner: Option<&'static str>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl RunMeta {
    pub fn new(
        run_id: RunId,
        root_dir: Utf8PathBuf,
        command: RunCommand,
        detected_runner: Option<&'static str>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let run_dir = root_dir.join(".3pio").join("runs").join(run_id.as_str());
        Self {
            run_id,
            root_dir,
            run_dir,
            command,
            detected_runner,
            started_at,
            finished_at: None,
            exit_code: None,
        }
    }
}
