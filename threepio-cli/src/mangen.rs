// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Renders a man page for the binary to stdout or a directory. Hidden
//! subcommand, not part of the documented interface.

use camino::Utf8PathBuf;
use clap::CommandFactory;
use clap_mangen::Man;
use thiserror::Error;

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ManGenError {
    #[error("failed to create man page output directory {path}")]
    CreateOutputDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render man page to {path}")]
    Render {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Renders `3pio.1` either to stdout (`output_dir` is `None`) or to
/// `<output_dir>/man1/3pio.1`.
pub fn generate(output_dir: Option<Utf8PathBuf>) -> Result<(), ManGenError> {
    let command = Cli::command();
    let man = Man::new(command).manual("3pio Manual");

    match output_dir {
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            man.render(&mut lock).map_err(|source| ManGenError::Render {
                path: "<stdout>".into(),
                source,
            })
        }
        Some(mut dir) => {
            dir.push("man1");
            std::fs::create_dir_all(&dir).map_err(|source| ManGenError::CreateOutputDir {
                path: dir.clone(),
                source,
            })?;
            let path = dir.join("3pio.1");
            let mut file = std::fs::File::create(&path).map_err(|source| ManGenError::Render {
                path: path.clone(),
                source,
            })?;
            man.render(&mut file)
                .map_err(|source| ManGenError::Render { path, source })
        }
    }
}
