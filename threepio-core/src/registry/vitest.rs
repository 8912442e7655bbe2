// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;

use super::{
    ExitInterpretation, RewrittenCommand, RunnerDefinition, matches_resolved,
    resolved_runner_token_index,
};

const KNOWN_SUBCOMMANDS: &[&str] = &["run", "watch", "bench", "typecheck", "list", "related", "init"];

#[derive(Debug)]
pub(super) struct Vitest;

impl RunnerDefinition for Vitest {
    fn name(&self) -> &'static str {
        "vitest"
    }

    fn matches(&self, argv: &[String]) -> bool {
        matches_resolved(argv, &["vitest"])
    }

    fn requires_adapter(&self) -> bool {
        true
    }

    fn adapter_file_name(&self) -> Option<&'static str> {
        Some("vitest-adapter.mjs")
    }

    fn rewrite(&self, argv: &[String], adapter_path: Option<&Utf8Path>) -> RewrittenCommand {
        let adapter_path = adapter_path.expect("vitest requires a materialized adapter");
        let mut out = argv.to_vec();
        let runner_idx = resolved_runner_token_index(&out).expect("matches() already confirmed");
        let insert_at = runner_idx + 1;

        out.splice(
            insert_at..insert_at,
            [
                "--reporter".to_string(),
                adapter_path.to_string(),
                "--reporter".to_string(),
                "default".to_string(),
            ],
        );

        // A bare `vitest` (or `vitest --some-flag`) without an explicit
        // subcommand defaults to watch mode. Force single-run mode by
        // inserting `run` right after the runner token, before the injected
        // reporter flags, unless the next positional is already a known
        // subcommand.
        let next_after_runner = out.get(insert_at + 4).map(String::as_str);
        let needs_run = match next_after_runner {
            Some(tok) if KNOWN_SUBCOMMANDS.contains(&tok) => false,
            Some(tok) if tok.starts_with('-') => false,
            Some(_non_subcommand_positional) => true,
            None => true,
        };
        if needs_run {
            out.insert(insert_at, "run".to_string());
        }

        RewrittenCommand {
            argv: out,
            extra_env: Vec::new(),
        }
    }

    fn injected_flags(&self, adapter_path: Option<&Utf8Path>) -> Vec<String> {
        let adapter_path = adapter_path.expect("vitest requires a materialized adapter");
        vec![
            "--reporter".to_string(),
            adapter_path.to_string(),
            "--reporter".to_string(),
            "default".to_string(),
        ]
    }

    fn interpret_exit_code(&self, code: i32) -> ExitInterpretation {
        ExitInterpretation { success: code == 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_vitest_gets_run_and_default_reporter() {
        let argv = s(&["vitest"]);
        let rewritten = Vitest.rewrite(&argv, Some(Utf8Path::new("/tmp/vitest-adapter.mjs")));
        assert_eq!(
            rewritten.argv,
            s(&[
                "vitest",
                "run",
                "--reporter",
                "/tmp/vitest-adapter.mjs",
                "--reporter",
                "default"
            ])
        );
        assert_eq!(
            rewritten
                .argv
                .iter()
                .filter(|a| a.as_str() == "--reporter")
                .count(),
            2
        );
    }

    #[test]
    fn explicit_run_subcommand_is_not_duplicated() {
        let argv = s(&["vitest", "run"]);
        let rewritten = Vitest.rewrite(&argv, Some(Utf8Path::new("/tmp/vitest-adapter.mjs")));
        assert_eq!(
            rewritten.argv,
            s(&[
                "vitest",
                "run",
                "--reporter",
                "/tmp/vitest-adapter.mjs",
                "--reporter",
                "default",
            ])
        );
    }

    #[test]
    fn flag_after_runner_does_not_trigger_run_insertion() {
        let argv = s(&["vitest", "--coverage"]);
        let rewritten = Vitest.rewrite(&argv, Some(Utf8Path::new("/tmp/vitest-adapter.mjs")));
        assert!(!rewritten.argv.contains(&"run".to_string()));
    }
}
