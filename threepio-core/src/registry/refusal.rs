// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Refuses watch and coverage modes at the CLI boundary, before any child
//! is spawned.

use super::{basename, first_token_is};

/// A watch or coverage invocation recognized and refused before spawn.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RefusedMode {
    Watch,
    Coverage,
}

impl RefusedMode {
    pub fn diagnostic(self) -> &'static str {
        match self {
            Self::Watch => {
                "3pio does not support watch mode; pass a one-shot test command instead"
            }
            Self::Coverage => {
                "3pio does not support coverage runs; pass the plain test command instead"
            }
        }
    }
}

/// The `--watch` / `--watchAll` flags are refused wherever they appear in
/// the argv, not just as the first token, since they can follow the runner
/// name or a package-manager front-end.
///
/// `pytest-watch`/`ptw` are refused by the name of the invoked binary, not
/// by flag, since they are themselves dedicated watch-mode wrappers. Bare
/// `vitest` without an explicit subcommand is *not* refused here -- the
/// vitest runner definition's rewrite forces single-run mode by inserting
/// `run` instead, an auto-correction rather than an outright refusal.
pub fn refuse(argv: &[String]) -> Option<RefusedMode> {
    if first_token_is(argv, &["pytest-watch", "ptw"]) {
        return Some(RefusedMode::Watch);
    }
    if first_token_is(argv, &["nyc", "c8"]) {
        return Some(RefusedMode::Coverage);
    }
    if first_token_is(argv, &["cargo"])
        && matches!(argv.get(1).map(String::as_str), Some("tarpaulin") | Some("llvm-cov"))
    {
        return Some(RefusedMode::Coverage);
    }

    for token in argv {
        if token == "--watch" || token == "--watchAll" {
            return Some(RefusedMode::Watch);
        }
        if token == "--coverage" || token == "--cov" || token.starts_with("--cov-report") {
            return Some(RefusedMode::Coverage);
        }
    }

    // A standalone `ptw`/`pytest-watch` invoked after a package-manager
    // front-end (rare, but `npx ptw` is valid) is still refused: check the
    // second token's basename too.
    if argv.len() > 1 && matches!(basename(&argv[1]).as_str(), "pytest-watch" | "ptw") {
        return Some(RefusedMode::Watch);
    }

    None
}
