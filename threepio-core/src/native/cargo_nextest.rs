// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parses `cargo nextest run --message-format libtest-json` output. Shares
//! its record shape with [`super::cargo_test`], but each record already
//! names its package, so there is no need to interleave stderr to recover
//! crate qualification, and the suite-terminal event is `finished` rather
//! than `ok`.

use serde::Deserialize;
use tracing::debug;

use threepio_metadata::{Event, GroupOutcome, GroupTotals, TestError, TestStatus, duration::seconds_to_ms};

use super::{LineSplitter, NestedGroupTracker, NativeProcessor};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LibtestLine {
    Suite {
        event: String,
        #[serde(default)]
        test_count: Option<u32>,
        #[serde(default)]
        passed: Option<u32>,
        #[serde(default)]
        failed: Option<u32>,
        #[serde(default)]
        ignored: Option<u32>,
        #[serde(default)]
        exec_time: Option<f64>,
    },
    Test {
        event: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        exec_time: Option<f64>,
        #[serde(default)]
        stdout: Option<String>,
        #[serde(default)]
        stderr: Option<String>,
    },
}

struct SuiteState {
    test_count: u32,
}

/// Splits a nextest-qualified name (`package$module::leaf` or plain
/// `package$leaf`) into a root (the package) and the `::`-separated segments
/// that follow the `$`.
fn split_qualified_name(name: &str) -> (Vec<String>, Vec<String>) {
    match name.split_once('$') {
        Some((package, rest)) => (
            vec![package.to_string()],
            rest.split("::").map(str::to_string).collect(),
        ),
        None => (Vec::new(), name.split("::").map(str::to_string).collect()),
    }
}

pub struct CargoNextestProcessor {
    stdout_splitter: LineSplitter,
    tracker: NestedGroupTracker,
    current_suite: Option<SuiteState>,
    current_root: Vec<String>,
}

impl CargoNextestProcessor {
    pub fn new() -> Self {
        Self {
            stdout_splitter: LineSplitter::new(),
            tracker: NestedGroupTracker::new(),
            current_suite: None,
            current_root: Vec::new(),
        }
    }

    fn handle_line(&mut self, line: &str, emit: &mut dyn FnMut(Event)) {
        let parsed: LibtestLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(%err, %line, "non-JSON line from cargo-nextest, skipping");
                return;
            }
        };

        match parsed {
            LibtestLine::Suite {
                event,
                test_count,
                passed,
                failed,
                ignored,
                exec_time,
            } => match event.as_str() {
                "started" => {
                    self.current_suite = Some(SuiteState {
                        test_count: test_count.unwrap_or(0),
                    });
                }
                "finished" => {
                    let Some(suite) = self.current_suite.take() else {
                        return;
                    };
                    self.finish_suite(suite, passed, failed, ignored, exec_time, emit);
                }
                _ => {}
            },
            LibtestLine::Test {
                event,
                name,
                exec_time,
                stdout,
                stderr,
            } => {
                let Some(name) = name else {
                    return;
                };
                match event.as_str() {
                    "started" => {}
                    "ok" | "failed" | "ignored" => {
                        self.emit_test_case(&name, &event, exec_time, stdout, stderr, emit);
                    }
                    _ => {}
                }
            }
        }
    }

    fn emit_test_case(
        &mut self,
        name: &str,
        event: &str,
        exec_time: Option<f64>,
        stdout: Option<String>,
        stderr: Option<String>,
        emit: &mut dyn FnMut(Event),
    ) {
        let (root, segments) = split_qualified_name(name);
        self.current_root = root.clone();
        let parent_names = self.tracker.ensure_ancestors(&root, &segments, emit);
        let leaf = segments.last().cloned().unwrap_or_else(|| name.to_string());

        let status = match event {
            "ok" => TestStatus::Pass,
            "failed" => TestStatus::Fail,
            _ => TestStatus::Skip,
        };
        let error = if status == TestStatus::Fail {
            Some(TestError {
                message: stderr
                    .clone()
                    .or_else(|| stdout.clone())
                    .unwrap_or_else(|| format!("{name} failed")),
                stack: None,
            })
        } else {
            None
        };

        emit(Event::TestCase {
            test_name: leaf,
            parent_names,
            status,
            duration_ms: seconds_to_ms(exec_time.unwrap_or(0.0)),
            error,
            stdout,
            stderr,
        });
    }

    fn finish_suite(
        &mut self,
        suite: SuiteState,
        passed: Option<u32>,
        failed: Option<u32>,
        ignored: Option<u32>,
        exec_time: Option<f64>,
        emit: &mut dyn FnMut(Event),
    ) {
        let totals = GroupTotals {
            passed: passed.unwrap_or(0),
            failed: failed.unwrap_or(0),
            skipped: ignored.unwrap_or(0),
            setup_failed: None,
        };
        let status = if suite.test_count == 0 && totals.total() == 0 {
            GroupOutcome::NoTests
        } else if totals.failed > 0 {
            GroupOutcome::Fail
        } else if totals.passed > 0 {
            GroupOutcome::Pass
        } else {
            GroupOutcome::Skip
        };

        let root = std::mem::take(&mut self.current_root);
        let group_name = root.last().cloned().unwrap_or_default();
        let parent_names = root[..root.len().saturating_sub(1)].to_vec();

        emit(Event::TestGroupResult {
            group_name,
            parent_names,
            status,
            duration_ms: seconds_to_ms(exec_time.unwrap_or(0.0)),
            totals,
        });
    }
}

impl Default for CargoNextestProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeProcessor for CargoNextestProcessor {
    fn feed_stdout(&mut self, chunk: &[u8], emit: &mut dyn FnMut(Event)) {
        let mut lines = Vec::new();
        self.stdout_splitter.feed(chunk, |line| lines.push(line.to_string()));
        for line in lines {
            self.handle_line(&line, emit);
        }
    }

    fn feed_stderr(&mut self, _chunk: &[u8], _emit: &mut dyn FnMut(Event)) {}

    fn finalize(&mut self, emit: &mut dyn FnMut(Event)) {
        if let Some(suite) = self.current_suite.take() {
            self.finish_suite(suite, None, None, None, None, emit);
        }
    }
}
