// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The on-disk report layout: `output.log`, `test-run.md`,
//! `reports/<group-path>/index.md`, and the `ipc/<runId>.jsonl` transport
//! file.
//!
//! Every markdown write goes through [`atomic_write`] (write-temp-then-
//! rename), so a reader polling these files never observes a half-written
//! file.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use swrite::{SWrite, swrite};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use threepio_metadata::ReportStatus;

use crate::group_tree::Group;
use crate::run::{RunId, RunMeta};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create report directory {path}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write report file {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Write-temp-then-rename: writes `contents` to a sibling temp file, then
/// renames it over `path`, so a concurrent reader either sees the old
/// contents or the new ones in full, never a partial write.
pub fn atomic_write(path: &Utf8Path, contents: &str) -> Result<(), RenderError> {
    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(dir).map_err(|source| RenderError::CreateDir {
        path: dir.to_owned(),
        source,
    })?;
    let tmp_name = format!(".{}.tmp-{:x}", path.file_name().unwrap_or("report"), xxh3_64(contents.as_bytes()));
    let tmp_path = dir.join(tmp_name);
    fs::write(&tmp_path, contents).map_err(|source| RenderError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| RenderError::Write {
        path: path.to_owned(),
        source,
    })?;
    Ok(())
}

/// Replaces filesystem-hostile characters in a single path segment (a
/// group name) with `_`. Applied per-segment so the original directory
/// hierarchy is preserved rather than flattened into one escaped string.
pub fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Resolves group paths to on-disk report directories, disambiguating two
/// *distinct* full paths that happen to sanitize to the same string with a
/// short stable suffix derived from a hash of the original path. Paths that
/// are genuinely the same group never collide with themselves, since the
/// group tree already guarantees path uniqueness.
#[derive(Default)]
pub struct PathRegistry {
    // sanitized relative path -> the first original path that claimed it
    claims: Mutex<HashMap<Utf8PathBuf, Vec<String>>>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the relative directory (under `reports/`) for `path`.
    pub fn resolve(&self, path: &[String]) -> Utf8PathBuf {
        let mut rel = Utf8PathBuf::new();
        for segment in path {
            rel.push(sanitize_segment(segment));
        }

        let mut claims = self.claims.lock().expect("path registry lock poisoned");
        match claims.get(&rel) {
            None => {
                claims.insert(rel.clone(), path.to_vec());
                rel
            }
            Some(owner) if owner == path => rel,
            Some(_) => {
                let suffix = format!("{:x}", xxh3_64(path.join("\u{1f}").as_bytes()) & 0xffff_ffff);
                let disambiguated = {
                    let mut r = rel.clone();
                    let last = r
                        .file_name()
                        .map(|n| format!("{n}-{suffix}"))
                        .unwrap_or_else(|| suffix.clone());
                    r.pop();
                    r.push(last);
                    r
                };
                claims.insert(disambiguated.clone(), path.to_vec());
                disambiguated
            }
        }
    }
}

/// Owns the run directory and writes every file in the on-disk report
/// layout.
pub struct Renderer {
    run_dir: Utf8PathBuf,
    paths: PathRegistry,
}

impl Renderer {
    pub fn new(run_dir: Utf8PathBuf) -> Result<Self, RenderError> {
        fs::create_dir_all(&run_dir).map_err(|source| RenderError::CreateDir {
            path: run_dir.clone(),
            source,
        })?;
        fs::create_dir_all(run_dir.join("reports")).map_err(|source| RenderError::CreateDir {
            path: run_dir.join("reports"),
            source,
        })?;
        fs::create_dir_all(run_dir.join("ipc")).map_err(|source| RenderError::CreateDir {
            path: run_dir.join("ipc"),
            source,
        })?;
        Ok(Self {
            run_dir,
            paths: PathRegistry::new(),
        })
    }

    pub fn run_dir(&self) -> &Utf8Path {
        &self.run_dir
    }

    pub fn output_log_path(&self) -> Utf8PathBuf {
        self.run_dir.join("output.log")
    }

    pub fn ipc_path(&self, run_id: &RunId) -> Utf8PathBuf {
        self.run_dir.join("ipc").join(format!("{run_id}.jsonl"))
    }

    /// The on-disk directory a group's report lives under (not including
    /// `index.md`), relative to `run_dir`.
    pub fn group_report_dir(&self, path: &[String]) -> Utf8PathBuf {
        self.run_dir.join("reports").join(self.paths.resolve(path))
    }

    pub fn group_report_path(&self, path: &[String]) -> Utf8PathBuf {
        self.group_report_dir(path).join("index.md")
    }

    /// Writes (or rewrites) one group's report file.
    pub fn write_group_report(&self, path: &[String], group: &Group) -> Result<(), RenderError> {
        let body = render_group_markdown(path, group, self);
        atomic_write(&self.group_report_path(path), &body)
    }

    /// Writes the top-level run manifest.
    pub fn write_manifest(&self, run: &RunMeta, tree: &crate::group_tree::GroupTree) -> Result<(), RenderError> {
        let body = render_manifest_markdown(run, tree, self);
        atomic_write(&self.run_dir.join("test-run.md"), &body)
    }
}

fn status_counts(totals: &threepio_metadata::GroupTotals) -> (u32, u32, u32) {
    (totals.passed, totals.failed, totals.skipped)
}

fn relative_link(from_dir: &Utf8Path, to: &Utf8Path) -> Utf8PathBuf {
    pathdiff(to, from_dir)
}

/// A minimal relative-path diff; both inputs are always descendants of the
/// same run directory, so a common-prefix strip suffices (no `..` needed
/// except to climb out of the `from` side's own directory).
fn pathdiff(to: &Utf8Path, from: &Utf8Path) -> Utf8PathBuf {
    let to_comps: Vec<&str> = to.components().map(|c| c.as_str()).collect();
    let from_comps: Vec<&str> = from.components().map(|c| c.as_str()).collect();
    let common = to_comps
        .iter()
        .zip(from_comps.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = Utf8PathBuf::new();
    for _ in common..from_comps.len() {
        out.push("..");
    }
    for comp in &to_comps[common..] {
        out.push(comp);
    }
    out
}

fn render_group_markdown(path: &[String], group: &Group, renderer: &Renderer) -> String {
    let mut out = String::new();
    let name = path.last().cloned().unwrap_or_default();
    swrite!(out, "# {name}\n\n");
    swrite!(out, "- status: {}\n", group.status);
    if let (Some(started), Some(finished)) = (group.started_at, group.finished_at) {
        swrite!(out, "- duration_ms: {}\n", (finished - started).num_milliseconds().max(0));
    }
    let (passed, failed, skipped) = status_counts(&group.totals);
    swrite!(out, "- totals: {passed} passed, {failed} failed, {skipped} skipped\n");

    if let Some(err) = &group.error {
        swrite!(out, "\n## Error\n\n");
        swrite!(out, "- type: {}\n", err.error_type.0);
        swrite!(out, "- phase: {:?}\n", err.detail.phase);
        swrite!(out, "\n```\n{}\n```\n", err.detail.message);
    }

    if !group.tests.is_empty() {
        swrite!(out, "\n## Tests\n\n");
        for test in &group.tests {
            swrite!(out, "- [{}] {} ({} ms)\n", test.status, test.name, test.duration_ms);
            if let Some(error) = &test.error {
                swrite!(out, "\n  ```\n  {}\n  ```\n\n", error.message.replace('\n', "\n  "));
            }
        }
    }

    if !group.children.is_empty() {
        swrite!(out, "\n## Subgroups\n\n");
        let this_dir = renderer.group_report_dir(path);
        for child in &group.children {
            let mut child_path = path.to_vec();
            child_path.push(child.name.clone());
            let child_report = renderer.group_report_path(&child_path);
            let link = relative_link(&this_dir, &child_report);
            swrite!(out, "- [{}]({}) -- {}\n", child.name, link, child.status);
        }
    }

    out
}

fn render_manifest_markdown(run: &RunMeta, tree: &crate::group_tree::GroupTree, renderer: &Renderer) -> String {
    let mut out = String::new();
    swrite!(out, "# Test run {}\n\n", run.run_id);
    swrite!(out, "- run_id: {}\n", run.run_id);
    swrite!(out, "- started_at: {}\n", run.started_at.to_rfc3339());
    if let Some(finished) = run.finished_at {
        swrite!(out, "- finished_at: {}\n", finished.to_rfc3339());
    }
    swrite!(
        out,
        "- status: {}\n",
        overall_status(tree).map(|s| s.to_string()).unwrap_or_else(|| "RUNNING".to_string())
    );
    if let Some(runner) = run.detected_runner {
        swrite!(out, "- detected_runner: {runner}\n");
    }
    swrite!(out, "- command: `{}`\n", run.command.original.join(" "));
    if run.command.rewritten != run.command.original {
        swrite!(out, "- rewritten_command: `{}`\n", run.command.rewritten.join(" "));
    }

    let (groups, cases, passed, failed, skipped) = totals(tree);
    swrite!(out, "- total test groups: {groups}\n");
    swrite!(out, "- total test cases: {cases} ({passed} passed, {failed} failed, {skipped} skipped)\n");

    swrite!(out, "\n## Groups\n\n");
    swrite!(out, "| Group | Status | Report |\n|---|---|---|\n");
    for root in &tree.roots {
        write_group_row(&mut out, &[root.name.clone()], root, renderer, run.run_dir.as_path());
    }

    out
}

fn write_group_row(out: &mut String, path: &[String], group: &Group, renderer: &Renderer, run_dir: &Utf8Path) {
    let report_path = renderer.group_report_path(path);
    let link = relative_link(run_dir, &report_path);
    swrite!(out, "| {} | {} | [{}]({}) |\n", path.join(" / "), group.status, "report", link);
    for child in &group.children {
        let mut child_path = path.to_vec();
        child_path.push(child.name.clone());
        write_group_row(out, &child_path, child, renderer, run_dir);
    }
}

fn overall_status(tree: &crate::group_tree::GroupTree) -> Option<ReportStatus> {
    let mut worst: Option<ReportStatus> = None;
    for root in &tree.roots {
        worst = Some(match worst {
            Some(w) => w.worst_of(root.status),
            None => root.status,
        });
    }
    worst
}

fn totals(tree: &crate::group_tree::GroupTree) -> (u32, u32, u32, u32, u32) {
    let mut groups = 0u32;
    let mut cases = 0u32;
    let mut passed = 0u32;
    let mut failed = 0u32;
    let mut skipped = 0u32;
    for root in &tree.roots {
        walk_totals(root, &mut groups, &mut cases, &mut passed, &mut failed, &mut skipped);
    }
    (groups, cases, passed, failed, skipped)
}

fn walk_totals(
    group: &Group,
    groups: &mut u32,
    cases: &mut u32,
    passed: &mut u32,
    failed: &mut u32,
    skipped: &mut u32,
) {
    *groups += 1;
    for test in &group.tests {
        *cases += 1;
        match test.status {
            threepio_metadata::TestStatus::Pass => *passed += 1,
            threepio_metadata::TestStatus::Fail => *failed += 1,
            threepio_metadata::TestStatus::Skip => *skipped += 1,
        }
    }
    for child in &group.children {
        walk_totals(child, groups, cases, passed, failed, skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn sanitize_replaces_hostile_characters_but_keeps_segments_distinct() {
        assert_eq!(sanitize_segment("test_client"), "test_client");
        assert_eq!(sanitize_segment("a/b"), "a_b");
    }

    #[test]
    fn distinct_paths_resolve_to_distinct_directories_even_with_shared_basename() {
        let registry = PathRegistry::new();
        let a = registry.resolve(&["actix-http".to_string(), "test_client".to_string()]);
        let b = registry.resolve(&["awc".to_string(), "test_client".to_string()]);
        assert_ne!(a, b);
        assert_eq!(a, Utf8PathBuf::from("actix-http/test_client"));
        assert_eq!(b, Utf8PathBuf::from("awc/test_client"));
    }

    #[test]
    fn same_path_resolves_stably_and_repeatedly() {
        let registry = PathRegistry::new();
        let a = registry.resolve(&["pkg".to_string()]);
        let b = registry.resolve(&["pkg".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn colliding_sanitized_names_get_a_stable_disambiguating_suffix() {
        let registry = PathRegistry::new();
        let a = registry.resolve(&["weird/name".to_string()]);
        let b = registry.resolve(&["weird:name".to_string()]);
        assert_ne!(a, b);
        assert_eq!(a, Utf8PathBuf::from("weird_name"));
        assert!(b.as_str().starts_with("weird_name-"));
    }

    #[test]
    fn group_markdown_totals_reflect_test_cases_on_an_implicitly_finalized_group() {
        let dir = Utf8TempDir::new().unwrap();
        let renderer = Renderer::new(dir.path().join("run")).unwrap();
        let mut group = Group::default();
        group.name = "suite".to_string();
        group.tests.push(threepio_metadata::TestCase::new(
            "a".to_string(),
            threepio_metadata::TestStatus::Pass,
            1,
        ));
        group.tests.push(threepio_metadata::TestCase::new(
            "b".to_string(),
            threepio_metadata::TestStatus::Fail,
            1,
        ));
        group.totals = threepio_metadata::GroupTotals {
            passed: 1,
            failed: 1,
            skipped: 0,
            setup_failed: None,
        };
        group.status = group.inferred_status();

        let body = render_group_markdown(&["suite".to_string()], &group, &renderer);
        assert!(body.contains("- status: FAIL\n"));
        assert!(body.contains("- totals: 1 passed, 1 failed, 0 skipped\n"));
    }

    #[test]
    fn atomic_write_produces_full_contents_not_a_partial_file() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("nested").join("report.md");
        atomic_write(&path, "hello\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
