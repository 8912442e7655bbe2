// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wire record exchanged between producers (adapters and native
//! processors) and the orchestrator, one JSON object per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::{GroupOutcome, TestStatus};

/// An error attached to a failing [`TestCase`](crate::TestCase).
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct TestError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// The phase in which a group-level (not test-level) failure occurred.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupErrorPhase {
    Setup,
    Teardown,
}

/// The error payload of a `testGroupError` event.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct GroupError {
    pub message: String,
    pub phase: GroupErrorPhase,
}

/// Accumulated pass/fail/skip counts for a group, as reported by a
/// `testGroupResult` event.
///
/// `setup_failed` is advisory: it is not itself a count of tests, but a flag
/// some producers set when the group's own setup/fixture step failed even
/// though zero individual tests could be attributed to that failure.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct GroupTotals {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_failed: Option<bool>,
}

impl GroupTotals {
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.skipped
    }
}

/// The kind of out-of-band failure recorded by a `testGroupError` event.
///
/// This is an open string rather than a closed enum because adapters are
/// free to report producer-specific error types; only `SETUP_FAILURE` is
/// synthesized by the native processors, and is the only value the
/// orchestrator itself ever constructs.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GroupErrorType(pub String);

impl GroupErrorType {
    pub const SETUP_FAILURE: &'static str = "SETUP_FAILURE";

    pub fn setup_failure() -> Self {
        Self(Self::SETUP_FAILURE.to_string())
    }

    pub fn is_setup_failure(&self) -> bool {
        self.0 == Self::SETUP_FAILURE
    }
}

/// The wire event schema. Tagged on `eventType`; every variant's payload is
/// flattened into the same JSON object as the tag (`#[serde(tag = ...)]`
/// rather than `#[serde(tag = ..., content = ...)]`), so each line on the
/// wire is a single flat JSON object with its discriminant alongside the
/// rest of the fields.
///
/// Unknown `eventType` values deserialize into [`Event::Other`] instead of
/// failing, so an older consumer stays forward-compatible with a newer
/// producer's vocabulary.
///
/// `duration_ms` fields carry an explicit `#[serde(rename = "duration_ms")]`
/// to opt out of the blanket `camelCase` rule: the wire vocabulary fixes it
/// as snake_case (every adapter emits `duration_ms` literally), unlike the
/// rest of the payload fields.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "eventType", rename_all = "camelCase")]
pub enum Event {
    TestGroupDiscovered {
        group_name: String,
        parent_names: Vec<String>,
    },
    TestGroupStart {
        group_name: String,
        parent_names: Vec<String>,
    },
    TestCase {
        test_name: String,
        parent_names: Vec<String>,
        status: TestStatus,
        #[serde(rename = "duration_ms")]
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<TestError>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stdout: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stderr: Option<String>,
    },
    TestGroupResult {
        group_name: String,
        parent_names: Vec<String>,
        status: GroupOutcome,
        #[serde(rename = "duration_ms")]
        duration_ms: u64,
        totals: GroupTotals,
    },
    TestGroupError {
        group_name: String,
        parent_names: Vec<String>,
        error_type: GroupErrorType,
        #[serde(rename = "duration_ms")]
        duration_ms: u64,
        error: GroupError,
    },
    CollectionStart {
        collected: u32,
    },
    CollectionFinish {
        collected: u32,
    },
    RunComplete {},
    StdoutChunk {
        file_path: String,
        chunk: String,
    },
    StderrChunk {
        file_path: String,
        chunk: String,
    },
    /// Catch-all for any `eventType` this version of the schema doesn't
    /// recognize. Preserved verbatim in `ipc/<runId>.jsonl`; never affects
    /// the exit code or the group tree.
    #[serde(other)]
    Other,
}

impl Event {
    /// Parses a single line of the transport file.
    ///
    /// On a malformed line this returns the raw JSON value (if the line at
    /// least parses as JSON) or the original text, so the caller can log a
    /// one-line diagnostic without losing the record. This mirrors the
    /// `Other` fallback: a parse failure on a single line must never be
    /// fatal for the stream.
    pub fn parse_line(line: &str) -> Result<Self, EventParseError> {
        serde_json::from_str(line).map_err(|source| EventParseError {
            line: line.to_string(),
            source,
        })
    }

    /// Best-effort extraction of the group-name/parent-names path this event
    /// refers to, for events that name a group. Returns `None` for events
    /// that don't carry a group path (`collectionStart`, `runComplete`,
    /// `Other`, and the legacy chunk events, which are path-scoped by file
    /// rather than by group).
    pub fn group_path(&self) -> Option<Vec<&str>> {
        match self {
            Event::TestGroupDiscovered {
                group_name,
                parent_names,
            }
            | Event::TestGroupStart {
                group_name,
                parent_names,
            }
            | Event::TestGroupResult {
                group_name,
                parent_names,
                ..
            }
            | Event::TestGroupError {
                group_name,
                parent_names,
                ..
            } => {
                let mut path: Vec<&str> = parent_names.iter().map(String::as_str).collect();
                path.push(group_name.as_str());
                Some(path)
            }
            Event::TestCase { parent_names, .. } => {
                Some(parent_names.iter().map(String::as_str).collect())
            }
            _ => None,
        }
    }
}

/// A line from the transport that didn't parse as a valid [`Event`].
#[derive(Debug)]
pub struct EventParseError {
    pub line: String,
    pub source: serde_json::Error,
}

impl std::fmt::Display for EventParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed event line ({}): {:.200}", self.source, self.line)
    }
}

impl std::error::Error for EventParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// An event whose `eventType` round-tripped through [`Event::Other`]. Kept
/// around only so the raw `ipc/` writer can still persist the original JSON
/// verbatim rather than losing unknown fields to the catch-all variant.
pub fn reparse_as_value(line: &str) -> Option<Value> {
    serde_json::from_str(line).ok()
}
