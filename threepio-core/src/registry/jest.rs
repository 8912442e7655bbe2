// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;

use super::{
    ExitInterpretation, RewrittenCommand, RunnerDefinition, matches_resolved,
    resolved_runner_token_index,
};

#[derive(Debug)]
pub(super) struct Jest;

impl RunnerDefinition for Jest {
    fn name(&self) -> &'static str {
        "jest"
    }

    fn matches(&self, argv: &[String]) -> bool {
        matches_resolved(argv, &["jest"])
    }

    fn requires_adapter(&self) -> bool {
        true
    }

    fn adapter_file_name(&self) -> Option<&'static str> {
        Some("jest-adapter.cjs")
    }

    fn rewrite(&self, argv: &[String], adapter_path: Option<&Utf8Path>) -> RewrittenCommand {
        let adapter_path = adapter_path.expect("jest requires a materialized adapter");
        let mut out = argv.to_vec();
        let runner_idx = resolved_runner_token_index(&out).expect("matches() already confirmed");

        // Inject `--reporters <adapterPath>` immediately after the runner
        // token. If any positional arguments (test file paths) follow the
        // runner, jest would otherwise try to interpret the reporter's own
        // path as a test file pattern, so a `--` is inserted just before
        // those positionals.
        let insert_at = runner_idx + 1;
        out.splice(
            insert_at..insert_at,
            ["--reporters".to_string(), adapter_path.to_string()],
        );

        let first_positional = out
            .iter()
            .enumerate()
            .skip(insert_at + 2)
            .find(|(_, a)| !a.starts_with('-'));
        if let Some((idx, _)) = first_positional {
            out.insert(idx, "--".to_string());
        }

        RewrittenCommand {
            argv: out,
            extra_env: Vec::new(),
        }
    }

    fn injected_flags(&self, adapter_path: Option<&Utf8Path>) -> Vec<String> {
        let adapter_path = adapter_path.expect("jest requires a materialized adapter");
        vec!["--reporters".to_string(), adapter_path.to_string()]
    }

    fn interpret_exit_code(&self, code: i32) -> ExitInterpretation {
        ExitInterpretation { success: code == 0 }
    }
}
