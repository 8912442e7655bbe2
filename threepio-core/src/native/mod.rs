// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Native output processors: for runners with no in-process adapter (Go
//! test, cargo test, cargo-nextest), these read the runner's own structured
//! output on stdout/stderr and synthesize [`Event`]s directly, in place of
//! an external adapter process.

pub mod cargo_nextest;
pub mod go_test;

use std::collections::HashSet;

use threepio_metadata::Event;

/// A stateful parser fed chunks of a child's stdout/stderr as they arrive.
pub trait NativeProcessor: Send {
    fn feed_stdout(&mut self, chunk: &[u8], emit: &mut dyn FnMut(Event));
    fn feed_stderr(&mut self, chunk: &[u8], emit: &mut dyn FnMut(Event));
    /// Called once, after the child has exited and no more chunks will
    /// arrive: finalizes any group still tracked as running by inferring
    /// its status from accumulated test results.
    fn finalize(&mut self, emit: &mut dyn FnMut(Event));
}

/// Line-buffers an incoming byte chunk against a carry buffer, invoking
/// `on_line` for each complete line (without its trailing newline). Shared
/// by all three processors, which all consume line-oriented output.
pub(crate) struct LineSplitter {
    carry: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn new() -> Self {
        Self { carry: Vec::new() }
    }

    pub(crate) fn feed(&mut self, chunk: &[u8], mut on_line: impl FnMut(&str)) {
        self.carry.extend_from_slice(chunk);
        let mut start = 0;
        while let Some(rel_nl) = self.carry[start..].iter().position(|b| *b == b'\n') {
            let end = start + rel_nl;
            let line = String::from_utf8_lossy(&self.carry[start..end]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            on_line(line);
            start = end + 1;
        }
        self.carry.drain(..start);
    }
}

/// Tracks which group paths have already been announced, and emits
/// `testGroupDiscovered`/`testGroupStart` for any new ones along a path.
/// Shared by the two libtest-JSON-based processors (cargo test, cargo
/// nextest), whose test names decompose into `root :: segment :: ... ::
/// leaf` hierarchies the same way.
#[derive(Default)]
pub(crate) struct NestedGroupTracker {
    discovered: HashSet<Vec<String>>,
}

impl NestedGroupTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Ensures every non-leaf segment of `root` followed by `segments[..len
    /// - 1]` has been discovered+started, returning the leaf's
    /// `parent_names`.
    pub(crate) fn ensure_ancestors(
        &mut self,
        root: &[String],
        segments: &[String],
        emit: &mut dyn FnMut(Event),
    ) -> Vec<String> {
        let mut path: Vec<String> = Vec::new();
        for segment in root {
            self.announce(&path, segment, emit);
            path.push(segment.clone());
        }
        for segment in &segments[..segments.len().saturating_sub(1)] {
            self.announce(&path, segment, emit);
            path.push(segment.clone());
        }
        path
    }

    fn announce(&mut self, parent_names: &[String], group_name: &str, emit: &mut dyn FnMut(Event)) {
        let mut full = parent_names.to_vec();
        full.push(group_name.to_string());
        if self.discovered.contains(&full) {
            return;
        }
        emit(Event::TestGroupDiscovered {
            group_name: group_name.to_string(),
            parent_names: parent_names.to_vec(),
        });
        emit(Event::TestGroupStart {
            group_name: group_name.to_string(),
            parent_names: parent_names.to_vec(),
        });
        self.discovered.insert(full);
    }
}
