// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pattern-matches an argv against the set of known test runners and
//! rewrites it to inject reporters or native output flags.
//!
//! The registry is a closed, compiled-in table: runner definitions are not
//! user-extensible, so a plain static array is the right idiom here.

mod cargo_nextest;
mod cypress;
mod jest;
mod mocha;
mod package_manager;
mod pytest;
mod refusal;
mod vitest;

use camino::Utf8Path;
use std::fmt;

pub use package_manager::WrapKind;
pub use refusal::{RefusedMode, refuse};

/// A fully-resolved rewritten command, ready to hand to the process
/// controller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RewrittenCommand {
    pub argv: Vec<String>,
    /// Extra environment variables the rewritten command needs set, beyond
    /// the transport-path variable every invocation gets (for example
    /// pytest's module-search-path prefix, or cargo test's unstable-options
    /// bootstrap flag).
    pub extra_env: Vec<(String, String)>,
}

/// How to interpret a child's raw exit code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExitInterpretation {
    pub success: bool,
}

/// A definition recognizing one test runner and knowing how to rewrite its
/// argv to emit structured telemetry.
pub trait RunnerDefinition: fmt::Debug + Sync {
    /// A short, stable name for logging and reports (`"jest"`, `"go-test"`).
    fn name(&self) -> &'static str;

    /// Whether this argv invokes this runner directly (including through a
    /// pass-through front-end like `npx jest` or `pnpm exec jest`, where the
    /// runner's own token is still present somewhere in argv). Must match on
    /// the **basename** of that token, never a substring match anywhere in
    /// the command line.
    fn matches(&self, argv: &[String]) -> bool;

    /// Whether this runner needs an in-process adapter materialized to disk
    /// before spawning. `false` for the three native-processor runners
    /// (Go test, cargo test, cargo-nextest).
    fn requires_adapter(&self) -> bool;

    /// The file name the adapter should be materialized under, if any.
    fn adapter_file_name(&self) -> Option<&'static str> {
        None
    }

    /// Rewrites a **direct** invocation of this runner (its own token is
    /// present in `argv`) to inject the reporter/native-format flags it
    /// needs.
    fn rewrite(&self, argv: &[String], adapter_path: Option<&Utf8Path>) -> RewrittenCommand;

    /// The bare flag tokens needed to enable this runner's reporter, with no
    /// positional-argument awareness. Used when this runner is invoked
    /// transitively through a package-manager script (`npm test`), where the
    /// runner's own token never appears in the observed argv at all, so
    /// there is no "runner token" to inject relative to -- the flags are
    /// instead appended after (or without) a `--` separator by the
    /// package-manager wrapping logic in [`rewrite`].
    ///
    /// Only implemented by the JS-ecosystem runners that package-manager
    /// scripts can wrap (jest, vitest, cypress, mocha); native-processor
    /// runners and pytest are never invoked this way.
    fn injected_flags(&self, _adapter_path: Option<&Utf8Path>) -> Vec<String> {
        unreachable!("{} is never invoked through a package-manager script", self.name())
    }

    /// Interprets the child's raw exit code.
    fn interpret_exit_code(&self, code: i32) -> ExitInterpretation {
        ExitInterpretation { success: code == 0 }
    }
}

/// A successfully detected runner, plus how it was reached.
#[derive(Debug)]
pub struct Detection {
    pub definition: &'static dyn RunnerDefinition,
    /// `Some` if this runner was detected by inspecting a package-manager
    /// script body rather than found directly in argv; carries the
    /// separator policy that applies when rewriting.
    pub wrap: Option<WrapKind>,
}

/// Returns the basename of a token, with a trailing `.exe` (Windows)
/// stripped, for basename-precise comparisons.
pub(crate) fn basename(token: &str) -> String {
    let base = Utf8Path::new(token)
        .file_name()
        .unwrap_or(token)
        .to_string();
    base.strip_suffix(".exe").unwrap_or(&base).to_string()
}

/// Resolves the index of "the runner's own token" in a direct (possibly
/// pass-through-wrapped) invocation, or `None` if this argv shape requires
/// package-manager script inspection instead (`npm test`, `yarn run build`,
/// `pnpm test`, `bun test`, `deno task x`).
///
/// This single function is what lets `npx jest`, `bunx jest`, `pnpm exec
/// jest`, `pnpm dlx jest`, `yarn dlx jest`, `bun x jest`, `npm exec jest`,
/// and bare `yarn jest` all resolve to the same basename check as a bare
/// `jest` invocation.
pub(crate) fn resolved_runner_token_index(argv: &[String]) -> Option<usize> {
    let first = basename(argv.first()?);
    match first.as_str() {
        "npx" | "bunx" => argv.get(1).map(|_| 1),
        "npm" if argv.get(1).map(String::as_str) == Some("exec") => argv.get(2).map(|_| 2),
        "pnpm" if matches!(argv.get(1).map(String::as_str), Some("exec") | Some("dlx")) => {
            argv.get(2).map(|_| 2)
        }
        "yarn" if argv.get(1).map(String::as_str) == Some("dlx") => argv.get(2).map(|_| 2),
        "bun" if argv.get(1).map(String::as_str) == Some("x") => argv.get(2).map(|_| 2),
        "yarn" => match argv.get(1).map(String::as_str) {
            Some("test") | Some("run") | None => None,
            Some(_) => Some(1),
        },
        _ => Some(0),
    }
}

/// True if `argv[0]`'s basename is one of `names`. Used by runners that are
/// never invoked through a pass-through front-end (go test, cargo test,
/// cargo-nextest, pytest's watch-mode siblings).
pub(crate) fn first_token_is(argv: &[String], names: &[&str]) -> bool {
    argv.first()
        .map(|t| names.contains(&basename(t).as_str()))
        .unwrap_or(false)
}

/// True if the token at the runner's resolved position matches `names`.
pub(crate) fn matches_resolved(argv: &[String], names: &[&str]) -> bool {
    resolved_runner_token_index(argv)
        .and_then(|idx| argv.get(idx))
        .map(|tok| names.contains(&basename(tok).as_str()))
        .unwrap_or(false)
}

/// Finds the index of the first bare `--` separator in argv, if any.
pub(crate) fn separator_index(argv: &[String]) -> Option<usize> {
    argv.iter().position(|a| a == "--")
}

/// Ensures exactly one `--` separator exists, inserting one at `at` if the
/// input has none, and reusing the existing one otherwise. Returns the
/// index of the separator in the resulting vector.
pub(crate) fn ensure_separator(argv: &mut Vec<String>, at: usize) -> usize {
    match separator_index(argv) {
        Some(idx) => idx,
        None => {
            let at = at.min(argv.len());
            argv.insert(at, "--".to_string());
            at
        }
    }
}

/// The full, deterministically ordered table of known runner definitions.
/// `detect` iterates this table and returns the first match.
pub fn definitions() -> &'static [&'static dyn RunnerDefinition] {
    static DEFS: &[&dyn RunnerDefinition] = &[
        &cargo_nextest::CargoNextest,
        &cargo_test::CargoTest,
        &go_test::GoTest,
        &cypress::Cypress,
        &vitest::Vitest,
        &jest::Jest,
        &mocha::Mocha,
        &pytest::Pytest,
    ];
    DEFS
}

/// Given a raw argv (already past any refused-mode check), resolves the
/// underlying runner, inspecting a package-manager manifest if the argv
/// names a wrapped script.
pub fn detect(argv: &[String], project_root: &Utf8Path) -> Option<Detection> {
    if let Some(found) = definitions().iter().copied().find(|d| d.matches(argv)) {
        return Some(Detection {
            definition: found,
            wrap: None,
        });
    }
    package_manager::detect_wrapped_script(argv, project_root, definitions())
}

/// Rewrites `argv` according to a [`Detection`], handling both direct
/// invocations (delegated to the definition's own [`RunnerDefinition::rewrite`])
/// and package-manager-wrapped scripts (separator policy applied here, then
/// the definition's bare [`RunnerDefinition::injected_flags`] appended).
pub fn rewrite(
    detection: &Detection,
    argv: &[String],
    adapter_path: Option<&Utf8Path>,
) -> RewrittenCommand {
    match detection.wrap {
        None => detection.definition.rewrite(argv, adapter_path),
        Some(WrapKind::SeparatorRequired) => {
            let mut out = argv.to_vec();
            ensure_separator(&mut out, out.len());
            out.extend(detection.definition.injected_flags(adapter_path));
            RewrittenCommand {
                argv: out,
                extra_env: Vec::new(),
            }
        }
        Some(WrapKind::NoSeparator) => {
            let mut out = argv.to_vec();
            out.extend(detection.definition.injected_flags(adapter_path));
            RewrittenCommand {
                argv: out,
                extra_env: Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_directory_and_exe_suffix() {
        assert_eq!(basename("jest"), "jest");
        assert_eq!(basename("/home/jest-user/mytool"), "mytool");
        assert_eq!(basename("C:\\tools\\jest.exe"), "jest");
    }

    #[test]
    fn resolved_token_covers_passthrough_front_ends() {
        let npx = vec!["npx".to_string(), "jest".to_string()];
        assert_eq!(resolved_runner_token_index(&npx), Some(1));

        let pnpm_exec = vec!["pnpm".to_string(), "exec".to_string(), "jest".to_string()];
        assert_eq!(resolved_runner_token_index(&pnpm_exec), Some(2));

        let npm_exec = vec!["npm".to_string(), "exec".to_string(), "jest".to_string()];
        assert_eq!(resolved_runner_token_index(&npm_exec), Some(2));

        let yarn_direct = vec!["yarn".to_string(), "jest".to_string()];
        assert_eq!(resolved_runner_token_index(&yarn_direct), Some(1));

        let yarn_test = vec!["yarn".to_string(), "test".to_string()];
        assert_eq!(resolved_runner_token_index(&yarn_test), None);
    }

    #[test]
    fn resolved_token_rejects_substring_lookalikes() {
        assert!(!matches_resolved(&["jest-codemods".to_string()], &["jest"]));
        assert!(!matches_resolved(
            &["/home/jest-user/mytool".to_string()],
            &["jest"]
        ));
        assert!(matches_resolved(&["jest".to_string()], &["jest"]));
        assert!(matches_resolved(
            &["npm".to_string(), "exec".to_string(), "jest".to_string()],
            &["jest"]
        ));
    }

    #[test]
    fn ensure_separator_reuses_existing() {
        let mut argv = vec!["a".to_string(), "--".to_string(), "b".to_string()];
        let idx = ensure_separator(&mut argv, 0);
        assert_eq!(idx, 1);
        assert_eq!(argv, vec!["a", "--", "b"]);
    }

    #[test]
    fn ensure_separator_inserts_when_missing() {
        let mut argv = vec!["a".to_string(), "b".to_string()];
        let idx = ensure_separator(&mut argv, 1);
        assert_eq!(idx, 1);
        assert_eq!(argv, vec!["a", "--", "b"]);
    }
}
