// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end exercise of runner detection/rewriting and the orchestrator's
//! group tree against synthetic event streams, without spawning a real
//! child process.

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;

use threepio_core::registry::{detect, rewrite};
use threepio_core::render::Renderer;
use threepio_core::run::{RunCommand, RunId, RunMeta};
use threepio_core::Orchestrator;
use threepio_metadata::{Event, GroupOutcome, GroupTotals, ReportStatus, TestStatus};

fn s(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn run_meta(root: &camino::Utf8Path) -> RunMeta {
    let now = chrono::DateTime::parse_from_rfc3339("2026-07-27T14:32:05Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let run_id = RunId::generate(now, 7);
    RunMeta::new(
        run_id,
        root.to_owned(),
        RunCommand {
            original: s(&["npm", "test"]),
            rewritten: s(&["npm", "test"]),
        },
        Some("jest"),
        now,
    )
}

#[test]
fn detects_and_rewrites_npm_test_wrapping_jest() {
    let dir = Utf8TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("package.json"),
        r#"{"scripts": {"test": "jest --ci"}}"#,
    )
    .unwrap();

    let argv = s(&["npm", "test"]);
    let detection = detect(&argv, dir.path()).expect("npm test should resolve to jest");
    assert_eq!(detection.definition.name(), "jest");
    assert!(detection.definition.requires_adapter());

    let adapter_path = Utf8PathBuf::from("/tmp/jest-adapter.cjs");
    let rewritten = rewrite(&detection, &argv, Some(&adapter_path));
    assert_eq!(
        rewritten.argv,
        s(&["npm", "test", "--", "--reporters", "/tmp/jest-adapter.cjs"])
    );
}

#[test]
fn detects_cargo_nextest_without_adapter() {
    let dir = Utf8TempDir::new().unwrap();
    let argv = s(&["cargo", "nextest", "run"]);
    let detection = detect(&argv, dir.path()).expect("should detect cargo-nextest");
    assert_eq!(detection.definition.name(), "cargo-nextest");
    assert!(!detection.definition.requires_adapter());

    let rewritten = rewrite(&detection, &argv, None);
    assert!(rewritten.argv.contains(&"--message-format".to_string()));
    assert!(rewritten.argv.contains(&"libtest-json".to_string()));
}

#[test]
fn unrecognized_command_is_not_detected() {
    let dir = Utf8TempDir::new().unwrap();
    let argv = s(&["ls", "-la"]);
    assert!(detect(&argv, dir.path()).is_none());
}

/// Feeds a synthetic nested event stream (two suites, one nested failure)
/// through the orchestrator and checks the resulting on-disk reports and
/// exit-relevant status without touching a real process or transport file.
#[test]
fn orchestrator_builds_group_tree_and_writes_reports() {
    let dir = Utf8TempDir::new().unwrap();
    let mut run = run_meta(dir.path());
    let renderer = Renderer::new(run.run_dir.clone()).unwrap();
    let orchestrator = Orchestrator::new(renderer);

    orchestrator
        .apply(Event::TestGroupDiscovered {
            group_name: "unit".to_string(),
            parent_names: vec![],
        })
        .unwrap();
    orchestrator
        .apply(Event::TestGroupStart {
            group_name: "unit".to_string(),
            parent_names: vec![],
        })
        .unwrap();
    orchestrator
        .apply(Event::TestGroupDiscovered {
            group_name: "math".to_string(),
            parent_names: vec!["unit".to_string()],
        })
        .unwrap();
    orchestrator
        .apply(Event::TestCase {
            test_name: "adds".to_string(),
            parent_names: vec!["unit".to_string(), "math".to_string()],
            status: TestStatus::Pass,
            duration_ms: 3,
            error: None,
            stdout: None,
            stderr: None,
        })
        .unwrap();
    orchestrator
        .apply(Event::TestCase {
            test_name: "divides".to_string(),
            parent_names: vec!["unit".to_string(), "math".to_string()],
            status: TestStatus::Fail,
            duration_ms: 5,
            error: Some(threepio_metadata::TestError {
                message: "divide by zero".to_string(),
                stack: None,
            }),
            stdout: None,
            stderr: None,
        })
        .unwrap();
    orchestrator
        .apply(Event::TestGroupResult {
            group_name: "math".to_string(),
            parent_names: vec!["unit".to_string()],
            status: GroupOutcome::Fail,
            duration_ms: 8,
            totals: GroupTotals {
                passed: 1,
                failed: 1,
                skipped: 0,
                setup_failed: None,
            },
        })
        .unwrap();
    orchestrator
        .apply(Event::TestGroupResult {
            group_name: "unit".to_string(),
            parent_names: vec![],
            status: GroupOutcome::Fail,
            duration_ms: 8,
            totals: GroupTotals {
                passed: 1,
                failed: 1,
                skipped: 0,
                setup_failed: None,
            },
        })
        .unwrap();

    assert!(orchestrator.any_failures());

    orchestrator.finalize(&mut run).unwrap();
    assert!(run.finished_at.is_some());

    let manifest_path = run.run_dir.join("test-run.md");
    assert!(manifest_path.exists());
    let manifest = std::fs::read_to_string(&manifest_path).unwrap();
    assert!(manifest.contains("unit"));

    let math_report = run
        .run_dir
        .join("reports")
        .join("unit")
        .join("math")
        .join("index.md");
    assert!(math_report.exists());
    let body = std::fs::read_to_string(&math_report).unwrap();
    assert!(body.contains("divides"));
    assert!(body.contains("divide by zero"));
}

/// A group with no terminal result event by the time `finalize` runs is
/// inferred leaf-first from its children rather than left PENDING forever.
#[test]
fn orchestrator_infers_missing_terminal_result_on_finalize() {
    let dir = Utf8TempDir::new().unwrap();
    let mut run = run_meta(dir.path());
    let renderer = Renderer::new(run.run_dir.clone()).unwrap();
    let orchestrator = Orchestrator::new(renderer);

    orchestrator
        .apply(Event::TestGroupDiscovered {
            group_name: "suite".to_string(),
            parent_names: vec![],
        })
        .unwrap();
    orchestrator
        .apply(Event::TestGroupStart {
            group_name: "suite".to_string(),
            parent_names: vec![],
        })
        .unwrap();
    orchestrator
        .apply(Event::TestCase {
            test_name: "only_test".to_string(),
            parent_names: vec!["suite".to_string()],
            status: TestStatus::Pass,
            duration_ms: 1,
            error: None,
            stdout: None,
            stderr: None,
        })
        .unwrap();

    assert!(!orchestrator.any_failures());
    orchestrator.finalize(&mut run).unwrap();

    let report_path = run.run_dir.join("reports").join("suite").join("index.md");
    let body = std::fs::read_to_string(&report_path).unwrap();
    assert!(body.contains(&ReportStatus::Pass.to_string()) || body.contains("PASS"));
    assert!(body.contains("- totals: 1 passed, 0 failed, 0 skipped\n"));
}
