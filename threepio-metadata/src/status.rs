// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status vocabularies shared between the wire event schema and the on-disk
//! report tree.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of a single [`TestCase`](crate::TestCase).
///
/// This is a strict subset of [`ReportStatus`]: a leaf test can never be
/// `NO_TESTS`, `ERROR`, `RUNNING`, or `PENDING` in its own right.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    /// True if this outcome should count as a failure for rollup purposes.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        })
    }
}

/// The outcome recorded in a `testGroupResult` event.
///
/// Distinct from [`ReportStatus`] because a group result event can never
/// carry the transient `RUNNING`/`PENDING` states or the out-of-band `ERROR`
/// state (that's reserved for `testGroupError`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupOutcome {
    Pass,
    Fail,
    Skip,
    NoTests,
}

impl fmt::Display for GroupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::NoTests => "NO_TESTS",
        })
    }
}

/// The full status vocabulary used by the on-disk report tree.
///
/// This is the stable vocabulary fixed by the report format: exactly these
/// seven strings appear in `test-run.md` and every `reports/.../index.md`.
/// Ordering matters: [`ReportStatus::worst_of`] resolves ties the way the
/// orchestrator's finalization rule requires (FAIL beats SKIP beats PASS
/// beats NO_TESTS).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    Running,
    Pass,
    Fail,
    Skip,
    NoTests,
    Error,
}

impl ReportStatus {
    /// Whether this status is terminal (no further transitions are valid).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Whether this status should be treated as a failure for exit-code and
    /// ancestor-propagation purposes.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }

    /// Combines two statuses using the priority order the orchestrator uses
    /// to finalize a group from its children: FAIL > SKIP > PASS > NO_TESTS.
    /// `ERROR` always wins outright, since it indicates the group itself
    /// failed outside the scope of any test.
    pub fn worst_of(self, other: Self) -> Self {
        fn rank(s: ReportStatus) -> u8 {
            match s {
                ReportStatus::Error => 5,
                ReportStatus::Fail => 4,
                ReportStatus::Skip => 3,
                ReportStatus::Pass => 2,
                ReportStatus::NoTests => 1,
                ReportStatus::Running | ReportStatus::Pending => 0,
            }
        }
        if rank(self) >= rank(other) { self } else { other }
    }
}

impl From<TestStatus> for ReportStatus {
    fn from(value: TestStatus) -> Self {
        match value {
            TestStatus::Pass => Self::Pass,
            TestStatus::Fail => Self::Fail,
            TestStatus::Skip => Self::Skip,
        }
    }
}

impl From<GroupOutcome> for ReportStatus {
    fn from(value: GroupOutcome) -> Self {
        match value {
            GroupOutcome::Pass => Self::Pass,
            GroupOutcome::Fail => Self::Fail,
            GroupOutcome::Skip => Self::Skip,
            GroupOutcome::NoTests => Self::NoTests,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::NoTests => "NO_TESTS",
            Self::Error => "ERROR",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn worst_of_priority() {
        assert_eq!(
            ReportStatus::Fail.worst_of(ReportStatus::Skip),
            ReportStatus::Fail
        );
        assert_eq!(
            ReportStatus::Skip.worst_of(ReportStatus::Pass),
            ReportStatus::Skip
        );
        assert_eq!(
            ReportStatus::Pass.worst_of(ReportStatus::NoTests),
            ReportStatus::Pass
        );
        assert_eq!(
            ReportStatus::Error.worst_of(ReportStatus::Fail),
            ReportStatus::Error
        );
    }

    #[test]
    fn serde_round_trip_matches_disk_vocabulary() {
        let s = serde_json::to_string(&ReportStatus::NoTests).unwrap();
        assert_eq!(s, "\"NO_TESTS\"");
        let s = serde_json::to_string(&ReportStatus::Error).unwrap();
        assert_eq!(s, "\"ERROR\"");
    }
}
