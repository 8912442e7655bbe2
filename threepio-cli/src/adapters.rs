// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Materializes the embedded in-process adapter sources to disk, injecting
//! the transport path by string substitution rather than relying solely on
//! an inherited environment variable, since environment variables don't
//! always propagate through deeply nested child processes spawned by
//! monorepo tool chains.

use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use thiserror::Error;

/// The sentinel substring replaced with the literal transport file path
/// during materialization. Bracketed so it can never collide with a
/// plausible piece of adapter source.
const TRANSPORT_PATH_SENTINEL: &str = "__THREEPIO_TRANSPORT_PATH__";

const JEST_ADAPTER: &str = include_str!("../adapters/jest-adapter.cjs");
const VITEST_ADAPTER: &str = include_str!("../adapters/vitest-adapter.mjs");
const CYPRESS_ADAPTER: &str = include_str!("../adapters/cypress-adapter.cjs");
const MOCHA_ADAPTER: &str = include_str!("../adapters/mocha-adapter.cjs");
const PYTEST_ADAPTER: &str = include_str!("../adapters/threepio_pytest_adapter.py");

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no embedded adapter source for file name {0}")]
    Unknown(String),
    #[error("failed to materialize adapter at {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn source_for(file_name: &str) -> Result<&'static str, AdapterError> {
    match file_name {
        "jest-adapter.cjs" => Ok(JEST_ADAPTER),
        "vitest-adapter.mjs" => Ok(VITEST_ADAPTER),
        "cypress-adapter.cjs" => Ok(CYPRESS_ADAPTER),
        "mocha-adapter.cjs" => Ok(MOCHA_ADAPTER),
        "threepio_pytest_adapter.py" => Ok(PYTEST_ADAPTER),
        other => Err(AdapterError::Unknown(other.to_string())),
    }
}

/// Writes the named adapter's source into `dir`, with `transport_path`
/// substituted for the sentinel, returning the materialized file's path.
pub fn materialize(
    dir: &Utf8Path,
    file_name: &'static str,
    transport_path: &Utf8Path,
) -> Result<Utf8PathBuf, AdapterError> {
    let template = source_for(file_name)?;
    let rendered = template.replace(TRANSPORT_PATH_SENTINEL, transport_path.as_str());

    fs::create_dir_all(dir).map_err(|source| AdapterError::Write {
        path: dir.to_owned(),
        source,
    })?;
    let path = dir.join(file_name);
    fs::write(&path, rendered).map_err(|source| AdapterError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn substitutes_the_transport_path_sentinel() {
        let dir = Utf8TempDir::new().unwrap();
        let transport = dir.path().join("ipc").join("run.jsonl");
        let path = materialize(dir.path(), "jest-adapter.cjs", &transport).unwrap();
        let rendered = fs::read_to_string(&path).unwrap();
        assert!(!rendered.contains(TRANSPORT_PATH_SENTINEL));
        assert!(rendered.contains(transport.as_str()));
    }

    #[test]
    fn rejects_an_unknown_adapter_name() {
        let dir = Utf8TempDir::new().unwrap();
        let transport = dir.path().join("ipc.jsonl");
        let err = materialize(dir.path(), "not-a-real-adapter.js", &transport).unwrap_err();
        assert!(matches!(err, AdapterError::Unknown(_)));
    }

    #[test]
    fn every_known_adapter_file_name_resolves() {
        for name in [
            "jest-adapter.cjs",
            "vitest-adapter.mjs",
            "cypress-adapter.cjs",
            "mocha-adapter.cjs",
            "threepio_pytest_adapter.py",
        ] {
            assert!(source_for(name).is_ok(), "{name} should resolve");
        }
    }
}
