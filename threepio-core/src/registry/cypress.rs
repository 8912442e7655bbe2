// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;

use super::{
    ExitInterpretation, RewrittenCommand, RunnerDefinition, matches_resolved,
    resolved_runner_token_index,
};

#[derive(Debug)]
pub(super) struct Cypress;

impl RunnerDefinition for Cypress {
    fn name(&self) -> &'static str {
        "cypress"
    }

    fn matches(&self, argv: &[String]) -> bool {
        matches_resolved(argv, &["cypress"])
    }

    fn requires_adapter(&self) -> bool {
        true
    }

    fn adapter_file_name(&self) -> Option<&'static str> {
        Some("cypress-adapter.cjs")
    }

    fn rewrite(&self, argv: &[String], adapter_path: Option<&Utf8Path>) -> RewrittenCommand {
        let adapter_path = adapter_path.expect("cypress requires a materialized adapter");
        let mut out = argv.to_vec();
        let runner_idx = resolved_runner_token_index(&out).expect("matches() already confirmed");

        if out.get(runner_idx + 1).map(String::as_str) != Some("run") {
            out.insert(runner_idx + 1, "run".to_string());
        }

        out.push("--reporter".to_string());
        out.push(adapter_path.to_string());

        RewrittenCommand {
            argv: out,
            extra_env: Vec::new(),
        }
    }

    fn injected_flags(&self, adapter_path: Option<&Utf8Path>) -> Vec<String> {
        let adapter_path = adapter_path.expect("cypress requires a materialized adapter");
        vec!["--reporter".to_string(), adapter_path.to_string()]
    }

    fn interpret_exit_code(&self, code: i32) -> ExitInterpretation {
        ExitInterpretation { success: code == 0 }
    }
}
