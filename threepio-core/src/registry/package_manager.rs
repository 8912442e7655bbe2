// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolves a runner invoked transitively through a package-manager script
//! (`npm test`, `pnpm run unit`, `yarn test`, `bun test`, `deno task e2e`).
//!
//! These never carry the runner's own token in the observed argv -- the
//! command that actually runs jest/vitest/etc. lives inside a manifest file
//! on disk.

use camino::Utf8Path;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{Detection, RunnerDefinition, basename};

/// Whether the package manager forwards extra CLI arguments to the wrapped
/// script verbatim (no separator needed) or requires a `--` to distinguish
/// them from its own flags.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WrapKind {
    SeparatorRequired,
    NoSeparator,
}

#[derive(Deserialize, Default)]
struct PackageJson {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
struct DenoConfig {
    #[serde(default)]
    tasks: BTreeMap<String, String>,
}

enum Manifest {
    Npm,
    Deno,
}

struct WrappedScript {
    manifest: Manifest,
    script_name: String,
    wrap: WrapKind,
}

/// Recognizes the argv shape of a package-manager-wrapped script
/// invocation and determines which manifest and script name to inspect.
fn recognize(argv: &[String]) -> Option<WrappedScript> {
    let front = basename(argv.first()?);
    match front.as_str() {
        "npm" | "pnpm" | "bun" => match argv.get(1).map(String::as_str) {
            Some("test") => Some(WrappedScript {
                manifest: Manifest::Npm,
                script_name: "test".to_string(),
                wrap: WrapKind::SeparatorRequired,
            }),
            Some("run") => argv.get(2).map(|name| WrappedScript {
                manifest: Manifest::Npm,
                script_name: name.clone(),
                wrap: WrapKind::SeparatorRequired,
            }),
            _ => None,
        },
        "yarn" => match argv.get(1).map(String::as_str) {
            Some("test") => Some(WrappedScript {
                manifest: Manifest::Npm,
                script_name: "test".to_string(),
                wrap: WrapKind::NoSeparator,
            }),
            Some("run") => argv.get(2).map(|name| WrappedScript {
                manifest: Manifest::Npm,
                script_name: name.clone(),
                wrap: WrapKind::NoSeparator,
            }),
            _ => None,
        },
        "deno" if argv.get(1).map(String::as_str) == Some("task") => {
            argv.get(2).map(|name| WrappedScript {
                manifest: Manifest::Deno,
                script_name: name.clone(),
                wrap: WrapKind::SeparatorRequired,
            })
        }
        _ => None,
    }
}

fn script_body(manifest: &Manifest, project_root: &Utf8Path, script_name: &str) -> Option<String> {
    match manifest {
        Manifest::Npm => {
            let contents = fs_err::read_to_string(project_root.join("package.json")).ok()?;
            let parsed: PackageJson = serde_json::from_str(&contents).ok()?;
            parsed.scripts.get(script_name).cloned()
        }
        Manifest::Deno => {
            for candidate in ["deno.jsonc", "deno.json"] {
                if let Ok(contents) = fs_err::read_to_string(project_root.join(candidate)) {
                    if let Ok(parsed) = serde_json::from_str::<DenoConfig>(&contents) {
                        if let Some(body) = parsed.tasks.get(script_name) {
                            return Some(body.clone());
                        }
                    }
                }
            }
            None
        }
    }
}

/// Attempts to resolve `argv` as a package-manager-wrapped script,
/// inspecting the project's manifest to find which runner the named script
/// transitively invokes.
pub(super) fn detect_wrapped_script(
    argv: &[String],
    project_root: &Utf8Path,
    definitions: &'static [&'static dyn RunnerDefinition],
) -> Option<Detection> {
    let wrapped = recognize(argv)?;
    let body = script_body(&wrapped.manifest, project_root, &wrapped.script_name)?;
    let tokens = shell_words::split(&body).ok()?;
    let definition = definitions.iter().copied().find(|d| d.matches(&tokens))?;
    Some(Detection {
        definition,
        wrap: Some(wrapped.wrap),
    })
}
