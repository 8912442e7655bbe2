// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;

use super::{ExitInterpretation, RewrittenCommand, RunnerDefinition, basename, first_token_is};

/// The pytest plugin module name injected via `-p`. The adapter is
/// materialized as `<dir>/threepio_pytest_adapter.py`, importable under this
/// name once that directory is prepended to `PYTHONPATH`.
const ADAPTER_MODULE: &str = "threepio_pytest_adapter";

#[derive(Debug)]
pub(super) struct Pytest;

impl Pytest {
    /// Returns the index just after the runner token proper: `1` for a bare
    /// `pytest` invocation, or the index just after `-m pytest` for a
    /// `python -m pytest` invocation.
    fn insertion_point(argv: &[String]) -> usize {
        if first_token_is(argv, &["pytest"]) {
            return 1.min(argv.len());
        }
        // `python -m pytest ...` / `python3 -m pytest ...`
        for (idx, window) in argv.windows(2).enumerate() {
            if window[0] == "-m" && window[1] == "pytest" {
                return (idx + 2).min(argv.len());
            }
        }
        1.min(argv.len())
    }
}

impl RunnerDefinition for Pytest {
    fn name(&self) -> &'static str {
        "pytest"
    }

    fn matches(&self, argv: &[String]) -> bool {
        if first_token_is(argv, &["pytest"]) {
            return true;
        }
        let is_python = argv
            .first()
            .map(|t| matches!(basename(t).as_str(), "python" | "python3"))
            .unwrap_or(false);
        is_python
            && argv
                .windows(2)
                .any(|w| w[0] == "-m" && w[1] == "pytest")
    }

    fn requires_adapter(&self) -> bool {
        true
    }

    fn adapter_file_name(&self) -> Option<&'static str> {
        Some("threepio_pytest_adapter.py")
    }

    fn rewrite(&self, argv: &[String], adapter_path: Option<&Utf8Path>) -> RewrittenCommand {
        let adapter_path = adapter_path.expect("pytest requires a materialized adapter");
        let mut out = argv.to_vec();
        let at = Self::insertion_point(&out);
        out.splice(at..at, ["-p".to_string(), ADAPTER_MODULE.to_string()]);

        let adapter_dir = adapter_path
            .parent()
            .map(|p| p.to_string())
            .unwrap_or_default();

        RewrittenCommand {
            argv: out,
            extra_env: vec![("PYTHONPATH".to_string(), adapter_dir)],
        }
    }

    fn interpret_exit_code(&self, code: i32) -> ExitInterpretation {
        // pytest uses exit code 5 for "no tests collected", which is not
        // itself an execution failure from 3pio's point of view -- the
        // group tree will show NO_TESTS groups, but the wrapper's exit code
        // still mirrors the child's verbatim, so this is informational
        // only, not used to override the final exit code.
        ExitInterpretation {
            success: code == 0 || code == 5,
        }
    }
}
