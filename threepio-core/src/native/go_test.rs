// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parses `go test -json` output into the common event schema.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::debug;

use threepio_metadata::{
    Event, GroupError, GroupErrorPhase, GroupErrorType, GroupOutcome, GroupTotals, TestError,
    TestStatus, duration::seconds_to_ms,
};

use super::{LineSplitter, NativeProcessor};

#[derive(Deserialize)]
struct GoTestLine {
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Package", default)]
    package: Option<String>,
    #[serde(rename = "Test", default)]
    test: Option<String>,
    #[serde(rename = "Output", default)]
    output: Option<String>,
    #[serde(rename = "Elapsed", default)]
    elapsed: Option<f64>,
}

#[derive(Default)]
struct PackageState {
    passed: u32,
    failed: u32,
    skipped: u32,
    no_test_files: bool,
    buffered_output: Vec<String>,
    result_emitted: bool,
}

#[derive(Default)]
struct TestBuffer {
    output: String,
}

pub struct GoTestProcessor {
    splitter: LineSplitter,
    packages: HashMap<String, PackageState>,
    package_order: Vec<String>,
    discovered: HashSet<Vec<String>>,
    test_buffers: HashMap<(String, String), TestBuffer>,
}

impl GoTestProcessor {
    pub fn new() -> Self {
        Self {
            splitter: LineSplitter::new(),
            packages: HashMap::new(),
            package_order: Vec::new(),
            discovered: HashSet::new(),
            test_buffers: HashMap::new(),
        }
    }

    fn package_mut(&mut self, package: &str) -> &mut PackageState {
        if !self.packages.contains_key(package) {
            self.packages.insert(package.to_string(), PackageState::default());
            self.package_order.push(package.to_string());
        }
        self.packages.get_mut(package).expect("just inserted")
    }

    fn ensure_discovered(&mut self, path: &[String], emit: &mut dyn FnMut(Event)) {
        if self.discovered.contains(path) {
            return;
        }
        let group_name = path.last().expect("non-empty path").clone();
        let parent_names = path[..path.len() - 1].to_vec();
        emit(Event::TestGroupDiscovered {
            group_name: group_name.clone(),
            parent_names: parent_names.clone(),
        });
        emit(Event::TestGroupStart {
            group_name,
            parent_names,
        });
        self.discovered.insert(path.to_vec());
    }

    fn handle_run(&mut self, package: &str, test: &str, emit: &mut dyn FnMut(Event)) {
        self.ensure_discovered(&[package.to_string()], emit);
        self.package_mut(package);

        let segments: Vec<&str> = test.split('/').collect();
        let mut path = vec![package.to_string()];
        for segment in &segments[..segments.len().saturating_sub(1)] {
            path.push(segment.to_string());
            self.ensure_discovered(&path, emit);
        }
    }

    fn handle_output(&mut self, package: &str, test: Option<&str>, output: &str) {
        if let Some(test) = test {
            self.test_buffers
                .entry((package.to_string(), test.to_string()))
                .or_default()
                .output
                .push_str(output);
            return;
        }
        if output.contains("[no test files]") {
            self.package_mut(package).no_test_files = true;
        }
        self.package_mut(package).buffered_output.push(output.to_string());
    }

    fn handle_test_terminal(
        &mut self,
        package: &str,
        test: &str,
        status: TestStatus,
        elapsed: Option<f64>,
        emit: &mut dyn FnMut(Event),
    ) {
        let segments: Vec<&str> = test.split('/').collect();
        let leaf = segments.last().copied().unwrap_or(test).to_string();
        let mut parent_names = vec![package.to_string()];
        parent_names.extend(segments[..segments.len() - 1].iter().map(|s| s.to_string()));

        let buffer = self
            .test_buffers
            .remove(&(package.to_string(), test.to_string()));
        let output = buffer.map(|b| b.output).filter(|s| !s.is_empty());

        let error = if status == TestStatus::Fail {
            Some(TestError {
                message: output.clone().unwrap_or_else(|| format!("{test} failed")),
                stack: None,
            })
        } else {
            None
        };

        let pkg = self.package_mut(package);
        match status {
            TestStatus::Pass => pkg.passed += 1,
            TestStatus::Fail => pkg.failed += 1,
            TestStatus::Skip => pkg.skipped += 1,
        }

        emit(Event::TestCase {
            test_name: leaf,
            parent_names,
            status,
            duration_ms: seconds_to_ms(elapsed.unwrap_or(0.0)),
            error,
            stdout: output,
            stderr: None,
        });
    }

    fn handle_package_terminal(
        &mut self,
        package: &str,
        action: &str,
        elapsed: Option<f64>,
        emit: &mut dyn FnMut(Event),
    ) {
        self.package_mut(package);
        self.finalize_package(package, Some(action), elapsed, emit);
    }

    fn finalize_package(
        &mut self,
        package: &str,
        action: Option<&str>,
        elapsed: Option<f64>,
        emit: &mut dyn FnMut(Event),
    ) {
        let Some(state) = self.packages.get_mut(package) else {
            return;
        };
        if state.result_emitted {
            return;
        }
        state.result_emitted = true;

        let totals = GroupTotals {
            passed: state.passed,
            failed: state.failed,
            skipped: state.skipped,
            setup_failed: None,
        };

        let status = if state.no_test_files {
            GroupOutcome::NoTests
        } else if let Some(action) = action {
            match action {
                "pass" => GroupOutcome::Pass,
                "fail" => GroupOutcome::Fail,
                _ => GroupOutcome::Skip,
            }
        } else if state.failed > 0 {
            GroupOutcome::Fail
        } else if state.passed > 0 {
            GroupOutcome::Pass
        } else if state.skipped > 0 {
            GroupOutcome::Skip
        } else {
            GroupOutcome::NoTests
        };

        emit(Event::TestGroupResult {
            group_name: package.to_string(),
            parent_names: Vec::new(),
            status,
            duration_ms: seconds_to_ms(elapsed.unwrap_or(0.0)),
            totals,
        });

        if status == GroupOutcome::Fail && totals.total() == 0 {
            let message = filter_package_output(&state.buffered_output, package);
            emit(Event::TestGroupError {
                group_name: package.to_string(),
                parent_names: Vec::new(),
                error_type: GroupErrorType::setup_failure(),
                duration_ms: seconds_to_ms(elapsed.unwrap_or(0.0)),
                error: GroupError {
                    message,
                    phase: GroupErrorPhase::Setup,
                },
            });
        }
    }

    fn process_line(&mut self, line: &str, emit: &mut dyn FnMut(Event)) {
        let parsed: GoTestLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(%err, %line, "non-JSON line from go test, skipping");
                return;
            }
        };
        let Some(package) = parsed.package else {
            return;
        };

        match parsed.action.as_str() {
            "run" => {
                if let Some(test) = parsed.test.as_deref() {
                    self.handle_run(&package, test, emit);
                }
            }
            "output" => {
                self.handle_output(&package, parsed.test.as_deref(), parsed.output.as_deref().unwrap_or(""));
            }
            "pass" | "fail" | "skip" => {
                if let Some(test) = parsed.test.as_deref() {
                    let status = match parsed.action.as_str() {
                        "pass" => TestStatus::Pass,
                        "fail" => TestStatus::Fail,
                        _ => TestStatus::Skip,
                    };
                    self.handle_test_terminal(&package, test, status, parsed.elapsed, emit);
                } else {
                    self.handle_package_terminal(&package, &parsed.action, parsed.elapsed, emit);
                }
            }
            _ => {}
        }
    }
}

impl Default for GoTestProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeProcessor for GoTestProcessor {
    fn feed_stdout(&mut self, chunk: &[u8], emit: &mut dyn FnMut(Event)) {
        let mut lines = Vec::new();
        self.splitter.feed(chunk, |line| lines.push(line.to_string()));
        for line in lines {
            self.process_line(&line, emit);
        }
    }

    fn feed_stderr(&mut self, _chunk: &[u8], _emit: &mut dyn FnMut(Event)) {
        // go test -json writes everything of interest to stdout.
    }

    fn finalize(&mut self, emit: &mut dyn FnMut(Event)) {
        let packages: Vec<String> = self.package_order.clone();
        for package in packages {
            self.finalize_package(&package, None, None, emit);
        }
    }
}

fn filter_package_output(lines: &[String], package: &str) -> String {
    let redundant_fail_prefix = format!("FAIL\t{package}\t");
    lines
        .iter()
        .filter(|line| {
            !line.starts_with("=== RUN")
                && !line.starts_with("--- PASS")
                && !line.starts_with("--- FAIL")
                && !line.starts_with("--- SKIP")
                && !line.starts_with("ok\t")
                && !line.starts_with("?\t")
                && !line.starts_with(&redundant_fail_prefix)
        })
        .cloned()
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_as_chunk(lines: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn emits_discovery_and_result_for_simple_package() {
        let mut proc = GoTestProcessor::new();
        let mut events = Vec::new();
        let chunk = lines_as_chunk(&[
            r#"{"Action":"run","Package":"example.com/foo","Test":"TestBar"}"#,
            r#"{"Action":"pass","Package":"example.com/foo","Test":"TestBar","Elapsed":0.01}"#,
            r#"{"Action":"pass","Package":"example.com/foo","Elapsed":0.02}"#,
        ]);
        proc.feed_stdout(&chunk, &mut |e| events.push(e));

        assert!(matches!(events[0], Event::TestGroupDiscovered { .. }));
        assert!(matches!(events[1], Event::TestGroupStart { .. }));
        assert!(matches!(events[2], Event::TestCase { status: TestStatus::Pass, .. }));
        assert!(matches!(
            events[3],
            Event::TestGroupResult {
                status: GroupOutcome::Pass,
                ..
            }
        ));
    }

    #[test]
    fn splits_subtests_into_nested_groups() {
        let mut proc = GoTestProcessor::new();
        let mut events = Vec::new();
        let chunk = lines_as_chunk(&[
            r#"{"Action":"run","Package":"p","Test":"TestFoo"}"#,
            r#"{"Action":"run","Package":"p","Test":"TestFoo/sub"}"#,
            r#"{"Action":"pass","Package":"p","Test":"TestFoo/sub","Elapsed":0.01}"#,
        ]);
        proc.feed_stdout(&chunk, &mut |e| events.push(e));

        let discovered_names: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                Event::TestGroupDiscovered { group_name, .. } => Some(group_name.clone()),
                _ => None,
            })
            .collect();
        assert!(discovered_names.contains(&"p".to_string()));
        assert!(discovered_names.contains(&"TestFoo".to_string()));

        let test_case = events
            .iter()
            .find(|e| matches!(e, Event::TestCase { .. }))
            .unwrap();
        if let Event::TestCase { test_name, parent_names, .. } = test_case {
            assert_eq!(test_name, "sub");
            assert_eq!(parent_names, &vec!["p".to_string(), "TestFoo".to_string()]);
        }
    }

    #[test]
    fn no_test_files_marks_group_no_tests() {
        let mut proc = GoTestProcessor::new();
        let mut events = Vec::new();
        let chunk = lines_as_chunk(&[
            r#"{"Action":"output","Package":"p","Output":"?   \tp\t[no test files]\n"}"#,
            r#"{"Action":"skip","Package":"p","Elapsed":0}"#,
        ]);
        proc.feed_stdout(&chunk, &mut |e| events.push(e));
        assert!(matches!(
            events.last().unwrap(),
            Event::TestGroupResult {
                status: GroupOutcome::NoTests,
                ..
            }
        ));
    }

    #[test]
    fn compile_failure_synthesizes_setup_failure() {
        let mut proc = GoTestProcessor::new();
        let mut events = Vec::new();
        let chunk = lines_as_chunk(&[
            r#"{"Action":"output","Package":"p","Output":"# p\n"}"#,
            r#"{"Action":"output","Package":"p","Output":"./foo.go:1:1: undefined: bar\n"}"#,
            r#"{"Action":"output","Package":"p","Output":"FAIL\tp\t[build failed]\n"}"#,
            r#"{"Action":"fail","Package":"p","Elapsed":0}"#,
        ]);
        proc.feed_stdout(&chunk, &mut |e| events.push(e));

        let error_event = events
            .iter()
            .find(|e| matches!(e, Event::TestGroupError { .. }))
            .expect("should synthesize a setup failure");
        if let Event::TestGroupError { error_type, error, .. } = error_event {
            assert!(error_type.is_setup_failure());
            assert!(error.message.contains("undefined: bar"));
        }
    }

    #[test]
    fn finalize_infers_status_for_packages_without_terminal_action() {
        let mut proc = GoTestProcessor::new();
        let mut events = Vec::new();
        let chunk = lines_as_chunk(&[
            r#"{"Action":"run","Package":"p","Test":"TestBar"}"#,
            r#"{"Action":"fail","Package":"p","Test":"TestBar","Elapsed":0.01}"#,
        ]);
        proc.feed_stdout(&chunk, &mut |e| events.push(e));
        proc.finalize(&mut |e| events.push(e));

        assert!(matches!(
            events.last().unwrap(),
            Event::TestGroupResult {
                status: GroupOutcome::Fail,
                ..
            }
        ));
    }
}
