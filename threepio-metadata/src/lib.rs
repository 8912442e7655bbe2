// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured event schema and report data types shared between the 3pio
//! engine (`threepio-core`) and anything that wants to read a completed run
//! (the CLI, and potentially external tooling) without re-implementing the
//! wire format.
//!
//! This crate is pure data: no process spawning, no file I/O beyond serde's
//! own (de)serialization, no async runtime dependency.

pub mod duration;
mod event;
mod exit_codes;
mod status;
mod test_case;

pub use event::{
    Event, EventParseError, GroupError, GroupErrorPhase, GroupErrorType, GroupTotals, TestError,
    reparse_as_value,
};
pub use exit_codes::ThreePioExitCode;
pub use status::{GroupOutcome, ReportStatus, TestStatus};
pub use test_case::TestCase;
