// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Documented exit codes for `3pio` failures.
//!
//! `3pio` is mostly a transparent wrapper: on a successful observation its
//! own exit code mirrors the child's. This module documents the small set
//! of codes 3pio produces on its own account, for cases where it never got
//! as far as observing a child exit code at all.

/// Documented exit codes that `3pio` itself may produce, as opposed to
/// exit codes forwarded verbatim from the observed child process.
///
/// Unknown/unexpected internal failures fall back to [`Self::INTERNAL_ERROR`].
pub enum ThreePioExitCode {}

impl ThreePioExitCode {
    /// The child exited zero and no consumer invariant was violated.
    pub const OK: i32 = 0;

    /// The requested command is a refused mode (watch/coverage) and was
    /// never spawned.
    pub const REFUSED_MODE: i32 = 10;

    /// No runner definition matched the given argv.
    pub const DETECTION_FAILED: i32 = 11;

    /// The child process could not be spawned at all.
    pub const SPAWN_FAILED: i32 = 12;

    /// A panic or other invariant failure occurred inside the consumer
    /// (orchestrator) itself, distinct from any test failure.
    pub const CONSUMER_INVARIANT_FAILURE: i32 = 13;

    /// The run was terminated by a signal (SIGINT/SIGTERM/SIGHUP) before the
    /// child exited on its own.
    pub const SIGNAL_TERMINATED: i32 = 130;

    /// Catch-all for internal errors that don't have a more specific code.
    pub const INTERNAL_ERROR: i32 = 1;
}
