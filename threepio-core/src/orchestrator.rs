// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single consumer of the event stream: applies each event to the
//! group tree, drives the per-group state machine, and triggers debounced
//! incremental report writes.
//!
//! The tree and the per-group write-debounce table are guarded by one
//! `std::sync::Mutex` -- even though in practice a single task drives every
//! call here, the lock keeps the door open for the inline-failure printer
//! and a future status query to read a consistent snapshot without taking
//! over the consumer loop.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use threepio_metadata::{Event, GroupError, GroupErrorType, ReportStatus, TestStatus};

use crate::group_tree::{GroupErrorRecord, GroupTree};
use crate::render::{RenderError, Renderer};
use crate::run::RunMeta;

/// Minimum interval between two report writes for the same group, to avoid
/// thrashing the filesystem under very high event rates. A terminal
/// transition always writes immediately regardless of this interval.
const REPORT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How many failing tests to list in the inline failure block printed to
/// the console when a top-level group goes FAIL/ERROR.
const INLINE_FAILURE_LIMIT: usize = 5;

struct Inner {
    tree: GroupTree,
    last_write: HashMap<Vec<String>, Instant>,
    announced_top_level_failure: std::collections::HashSet<String>,
}

/// Owns the group tree and drives report writes as events arrive.
pub struct Orchestrator {
    inner: Mutex<Inner>,
    renderer: Renderer,
}

impl Orchestrator {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tree: GroupTree::new(),
                last_write: HashMap::new(),
                announced_top_level_failure: std::collections::HashSet::new(),
            }),
            renderer,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Applies one decoded event to the tree, writing through to the
    /// affected group's report (debounced) and, the first time a top-level
    /// group picks up a failing descendant, an inline console summary.
    pub fn apply(&self, event: Event) -> Result<(), RenderError> {
        let mut inner = self.inner.lock().expect("orchestrator lock poisoned");
        match event {
            Event::TestGroupDiscovered {
                group_name,
                parent_names,
            } => {
                inner.tree.ensure_path(&parent_names, &group_name);
            }
            Event::TestGroupStart {
                group_name,
                parent_names,
            } => {
                let group = inner.tree.ensure_path(&parent_names, &group_name);
                group.ensure_running();
            }
            Event::TestCase {
                test_name,
                parent_names,
                status,
                duration_ms,
                error,
                stdout,
                stderr,
            } => {
                let (parents, leaf) = match parent_names.split_last() {
                    Some((leaf, rest)) => (rest.to_vec(), leaf.clone()),
                    None => (Vec::new(), String::new()),
                };
                let newly_failed = {
                    let group = inner.tree.ensure_path(&parents, &leaf);
                    group.ensure_running();
                    let mut newly_failed = false;
                    if !group.tests.iter().any(|t| t.name == test_name) {
                        let mut case = threepio_metadata::TestCase::new(test_name, status, duration_ms);
                        case.error = error;
                        case.stdout = stdout;
                        case.stderr = stderr;
                        group.tests.push(case);
                        match status {
                            TestStatus::Pass => group.totals.passed += 1,
                            TestStatus::Fail => group.totals.failed += 1,
                            TestStatus::Skip => group.totals.skipped += 1,
                        }
                        if status.is_failure() {
                            group.has_failing_descendant = true;
                            newly_failed = true;
                        }
                    }
                    newly_failed
                };
                if newly_failed {
                    inner.tree.mark_path_failing(&parent_names);
                    self.maybe_announce_top_level_failure(&mut inner, &parent_names);
                }
            }
            Event::TestGroupResult {
                group_name,
                parent_names,
                status,
                totals,
                ..
            } => {
                let mut path = parent_names.clone();
                path.push(group_name.clone());

                let group = inner.tree.ensure_path(&parent_names, &group_name);
                let accumulated = group.totals;
                if accumulated.total() != totals.total() {
                    debug!(
                        group = %group_name,
                        payload_total = totals.total(),
                        accumulated_total = accumulated.total(),
                        "group totals disagree with accumulated test results; payload wins for display"
                    );
                }
                group.totals = totals;
                group.status = ReportStatus::from(status);
                group.finished_at.get_or_insert_with(Utc::now);
                let is_failure = group.status.is_failure();
                if is_failure {
                    group.has_failing_descendant = true;
                }

                if is_failure {
                    inner.tree.mark_path_failing(&path);
                }
                self.maybe_announce_top_level_failure(&mut inner, &path);
            }
            Event::TestGroupError {
                group_name,
                parent_names,
                error_type,
                error,
                ..
            } => {
                let mut path = parent_names.clone();
                path.push(group_name.clone());

                let group = inner.tree.ensure_path(&parent_names, &group_name);
                group.status = ReportStatus::Error;
                group.finished_at.get_or_insert_with(Utc::now);
                group.has_failing_descendant = true;
                group.error = Some(GroupErrorRecord {
                    error_type,
                    detail: error,
                });

                inner.tree.mark_path_failing(&path);
                self.maybe_announce_top_level_failure(&mut inner, &path);
            }
            Event::CollectionStart { .. } | Event::CollectionFinish { .. } => {
                // Advisory only; nothing in the tree changes.
            }
            Event::RunComplete {} => {
                // The process controller decides when to finalize (on
                // child-exit + drain), not on receipt of this sentinel
                // alone -- a producer may die before emitting it.
            }
            Event::StdoutChunk { .. } | Event::StderrChunk { .. } => {
                // Legacy path-scoped output, not attributed to a group;
                // nothing to update in the tree.
            }
            Event::Other => {
                warn!("unknown event kind received; ignoring");
            }
        }

        let dirty: Vec<Vec<String>> = inner.tree.leaf_first_paths();
        drop(inner);
        for path in dirty {
            self.write_path_debounced(&path)?;
        }
        Ok(())
    }

    fn maybe_announce_top_level_failure(&self, inner: &mut Inner, path: &[String]) {
        let Some(top) = path.first() else { return };
        let Some(group) = inner.tree.get_path(std::slice::from_ref(top)) else {
            return;
        };
        if !group.has_failing_descendant || inner.announced_top_level_failure.contains(top) {
            return;
        }
        inner.announced_top_level_failure.insert(top.clone());
        print_inline_failure_block(top, group, &self.renderer);
    }

    fn write_path_debounced(&self, path: &[String]) -> Result<(), RenderError> {
        let should_write = {
            let mut inner = self.inner.lock().expect("orchestrator lock poisoned");
            let Some(group) = inner.tree.get_path(path) else {
                return Ok(());
            };
            let terminal = group.is_terminal();
            let now = Instant::now();
            let due = match inner.last_write.get(path) {
                Some(last) => terminal || now.duration_since(*last) >= REPORT_DEBOUNCE,
                None => true,
            };
            if due {
                inner.last_write.insert(path.to_vec(), now);
            }
            due
        };
        if !should_write {
            return Ok(());
        }
        let inner = self.inner.lock().expect("orchestrator lock poisoned");
        let Some(group) = inner.tree.get_path(path) else {
            return Ok(());
        };
        self.renderer.write_group_report(path, group)
    }

    /// Records a transport line that failed to parse. Logged, never fatal.
    pub fn note_malformed_line(&self, line: &str, reason: &str) {
        debug!(%reason, line = %truncate(line, 200), "malformed transport line, skipping");
    }

    /// After child-exit + transport drain: finalizes any group still in
    /// PENDING/RUNNING by inferring its status from accumulated children,
    /// leaf-first, then writes every group's final report plus the
    /// top-level manifest.
    pub fn finalize(&self, run: &mut RunMeta) -> Result<(), RenderError> {
        let paths = {
            let mut inner = self.inner.lock().expect("orchestrator lock poisoned");
            inner.tree.finalize_pending();
            inner.tree.leaf_first_paths()
        };
        for path in &paths {
            let inner = self.inner.lock().expect("orchestrator lock poisoned");
            if let Some(group) = inner.tree.get_path(path) {
                self.renderer.write_group_report(path, group)?;
            }
        }
        run.finished_at = Some(Utc::now());
        let inner = self.inner.lock().expect("orchestrator lock poisoned");
        self.renderer.write_manifest(run, &inner.tree)
    }

    /// True if any top-level group finished in a failing state, for
    /// exit-code purposes when the child's own code doesn't already say so.
    pub fn any_failures(&self) -> bool {
        let inner = self.inner.lock().expect("orchestrator lock poisoned");
        inner.tree.roots.iter().any(|r| r.status.is_failure())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

fn print_inline_failure_block(top_name: &str, group: &crate::group_tree::Group, renderer: &Renderer) {
    let report_path = renderer.group_report_path(std::slice::from_ref(&top_name.to_string()));
    eprintln!();
    eprintln!("FAIL {top_name}");
    let failing: Vec<&threepio_metadata::TestCase> = collect_failing(group)
        .into_iter()
        .take(INLINE_FAILURE_LIMIT)
        .collect();
    for test in &failing {
        eprintln!("  - {}", test.name);
    }
    eprintln!("  report: {report_path}");
    eprintln!();
}

fn collect_failing(group: &crate::group_tree::Group) -> Vec<&threepio_metadata::TestCase> {
    let mut out: Vec<&threepio_metadata::TestCase> = group
        .tests
        .iter()
        .filter(|t| t.status.is_failure())
        .collect();
    for child in &group.children {
        out.extend(collect_failing(child));
    }
    out
}

/// Constructs the `testGroupError` payload the native processors and this
/// module both need when synthesizing a setup failure, factored here so
/// `threepio-core::native` and any future producer share one constructor.
pub fn setup_failure_error(message: String) -> (GroupErrorType, GroupError) {
    (
        GroupErrorType::setup_failure(),
        GroupError {
            message,
            phase: threepio_metadata::GroupErrorPhase::Setup,
        },
    )
}
