// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hierarchical group tree the orchestrator assembles from the event
//! stream. Path-keyed, with ordered children and a parallel name→index map
//! per node: a plain recursive `Vec<Group>` would make repeated lookups by
//! name O(n) at every level, so each node also carries a
//! `HashMap<String, usize>` sibling index.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use threepio_metadata::{GroupError, GroupErrorType, GroupTotals, ReportStatus, TestCase};

/// A group's terminal error, when it failed outside the scope of any single
/// test (compile failure, fixture setup, import error).
#[derive(Clone, Debug)]
pub struct GroupErrorRecord {
    pub error_type: GroupErrorType,
    pub detail: GroupError,
}

/// One node in the tree: a test suite, file, describe-block, or package,
/// depending on the runner's own hierarchy.
#[derive(Clone, Debug)]
pub struct Group {
    pub name: String,
    pub status: ReportStatus,
    pub tests: Vec<TestCase>,
    pub children: Vec<Group>,
    child_index: HashMap<String, usize>,
    pub totals: GroupTotals,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<GroupErrorRecord>,
    /// Set as soon as any test case or descendant group fails, propagated
    /// upward immediately so the renderer can show inline failures before
    /// the group itself reaches a terminal state.
    pub has_failing_descendant: bool,
}

impl Group {
    fn new(name: String) -> Self {
        Self {
            name,
            status: ReportStatus::Pending,
            tests: Vec::new(),
            children: Vec::new(),
            child_index: HashMap::new(),
            totals: GroupTotals::default(),
            started_at: None,
            finished_at: None,
            error: None,
            has_failing_descendant: false,
        }
    }

    /// Returns the existing child named `name`, or creates a new PENDING one
    /// appended at the end (implicit discovery).
    fn child_mut(&mut self, name: &str) -> &mut Group {
        if let Some(&idx) = self.child_index.get(name) {
            return &mut self.children[idx];
        }
        let idx = self.children.len();
        self.children.push(Group::new(name.to_string()));
        self.child_index.insert(name.to_string(), idx);
        &mut self.children[idx]
    }

    pub fn child(&self, name: &str) -> Option<&Group> {
        self.child_index.get(name).map(|&idx| &self.children[idx])
    }

    /// Marks this group RUNNING if it is still PENDING (a started event, or
    /// any child event implicitly starting it).
    pub fn ensure_running(&mut self) {
        if self.status == ReportStatus::Pending {
            self.status = ReportStatus::Running;
            self.started_at.get_or_insert_with(Utc::now);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Computes this group's status from its accumulated children and direct
    /// tests (FAIL beats SKIP beats PASS beats NO_TESTS), used both for
    /// cross-checking an explicit `testGroupResult` payload and for
    /// finalizing groups that never received one.
    pub fn inferred_status(&self) -> ReportStatus {
        let mut worst: Option<ReportStatus> = None;
        for test in &self.tests {
            worst = Some(match worst {
                Some(w) => w.worst_of(ReportStatus::from(test.status)),
                None => ReportStatus::from(test.status),
            });
        }
        for child in &self.children {
            worst = Some(match worst {
                Some(w) => w.worst_of(child.status),
                None => child.status,
            });
        }
        worst.unwrap_or(ReportStatus::NoTests)
    }
}

impl Default for Group {
    fn default() -> Self {
        Group::new(String::new())
    }
}

/// The full forest of top-level groups for a run, plus the same ordered
/// children + name index shape at the root level.
#[derive(Clone, Debug, Default)]
pub struct GroupTree {
    pub roots: Vec<Group>,
    root_index: HashMap<String, usize>,
}

impl GroupTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn root_mut(&mut self, name: &str) -> &mut Group {
        if let Some(&idx) = self.root_index.get(name) {
            return &mut self.roots[idx];
        }
        let idx = self.roots.len();
        self.roots.push(Group::new(name.to_string()));
        self.root_index.insert(name.to_string(), idx);
        &mut self.roots[idx]
    }

    /// Walks (creating PENDING groups as needed) the path described by
    /// `parent_names` followed by `group_name`, returning the leaf.
    pub fn ensure_path(&mut self, parent_names: &[String], group_name: &str) -> &mut Group {
        let Some((first, rest)) = parent_names.split_first() else {
            return self.root_mut(group_name);
        };
        let mut node = self.root_mut(first);
        for segment in rest {
            node.ensure_running();
            node = node.child_mut(segment);
        }
        node.ensure_running();
        node.child_mut(group_name)
    }

    /// Sets `has_failing_descendant` on every group along `path`, root to
    /// leaf, so an ancestor's flag is visible immediately rather than only
    /// after that ancestor itself reaches a terminal status.
    pub fn mark_path_failing(&mut self, path: &[String]) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        let mut node = self.root_mut(first);
        node.has_failing_descendant = true;
        for segment in rest {
            node = node.child_mut(segment);
            node.has_failing_descendant = true;
        }
    }

    pub fn get_path(&self, path: &[String]) -> Option<&Group> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(*self.root_index.get(first)?)?;
        for segment in rest {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// All paths in leaf-first (post-order) traversal order, so that
    /// finalizing a parent always sees already-finalized children.
    pub fn leaf_first_paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        for root in &self.roots {
            let mut prefix = vec![root.name.clone()];
            collect_leaf_first(root, &mut prefix, &mut out);
        }
        out
    }

    /// Finalizes every group still in PENDING/RUNNING by inferring its
    /// status from accumulated children, visiting leaves first.
    pub fn finalize_pending(&mut self) {
        for root in &mut self.roots {
            finalize_node(root);
        }
    }
}

fn collect_leaf_first(group: &Group, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    for child in &group.children {
        prefix.push(child.name.clone());
        collect_leaf_first(child, prefix, out);
        prefix.pop();
    }
    out.push(prefix.clone());
}

fn finalize_node(group: &mut Group) {
    for child in &mut group.children {
        finalize_node(child);
    }
    if !group.is_terminal() {
        group.status = group.inferred_status();
        group.finished_at.get_or_insert_with(Utc::now);
    }
}
