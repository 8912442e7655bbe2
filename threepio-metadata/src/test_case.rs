// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leaf-level test result types, shared between the orchestrator's group
//! tree and the report renderer.

use serde::{Deserialize, Serialize};

use crate::event::TestError;
use crate::status::TestStatus;

/// A single test result, owned by exactly one [`Group`](crate::Group).
///
/// Created when first observed via a `testCase` event; never mutated
/// afterward. A duplicate `testCase` for the same `name` arriving later is
/// ignored by the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[non_exhaustive]
pub struct TestCase {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, status: TestStatus, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status,
            duration_ms,
            error: None,
            stdout: None,
            stderr: None,
        }
    }
}
