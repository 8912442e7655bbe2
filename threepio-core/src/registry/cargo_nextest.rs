// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;

use super::{ExitInterpretation, RewrittenCommand, RunnerDefinition, basename, first_token_is};

#[derive(Debug)]
pub(super) struct CargoNextest;

impl CargoNextest {
    fn nextest_token_index(argv: &[String]) -> Option<usize> {
        if basename(argv.first()?) == "cargo-nextest" {
            return Some(0);
        }
        if first_token_is(argv, &["cargo"]) && argv.get(1).map(String::as_str) == Some("nextest") {
            return Some(1);
        }
        None
    }
}

impl RunnerDefinition for CargoNextest {
    fn name(&self) -> &'static str {
        "cargo-nextest"
    }

    fn matches(&self, argv: &[String]) -> bool {
        Self::nextest_token_index(argv).is_some()
    }

    fn requires_adapter(&self) -> bool {
        false
    }

    fn rewrite(&self, argv: &[String], _adapter_path: Option<&Utf8Path>) -> RewrittenCommand {
        let mut out = argv.to_vec();
        let nextest_idx = Self::nextest_token_index(&out).expect("matches() already confirmed");

        if out.get(nextest_idx + 1).map(String::as_str) != Some("run") {
            out.insert(nextest_idx + 1, "run".to_string());
        }

        if !out.iter().any(|a| a == "--message-format") {
            out.push("--message-format".to_string());
            out.push("libtest-json".to_string());
        }

        RewrittenCommand {
            argv: out,
            extra_env: Vec::new(),
        }
    }

    fn interpret_exit_code(&self, code: i32) -> ExitInterpretation {
        ExitInterpretation { success: code == 0 }
    }
}
