// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console color/verbosity policy, built on `owo-colors` + `supports-color`
//! since `threepio-core` already standardizes on `tracing`.

use std::fmt;

use clap::ValueEnum;
use owo_colors::Stream;

/// The `--color` flag's value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum Color {
    Auto,
    Always,
    Never,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        })
    }
}

/// Resolved output policy for one invocation: whether to colorize stdout and
/// stderr, and how verbose `tracing` output should be.
#[derive(Copy, Clone, Debug)]
pub struct OutputContext {
    pub color: Color,
    stdout_color: bool,
    stderr_color: bool,
}

impl OutputContext {
    pub fn new(color: Color) -> Self {
        let (stdout_color, stderr_color) = match color {
            Color::Always => (true, true),
            Color::Never => (false, false),
            Color::Auto => (
                supports_color::on(Stream::Stdout).is_some(),
                supports_color::on(Stream::Stderr).is_some(),
            ),
        };
        Self {
            color,
            stdout_color,
            stderr_color,
        }
    }

    /// Whether owo-colors should emit escapes for the given stream, honoring
    /// the resolved `--color` policy rather than re-querying the terminal.
    pub fn color_enabled(&self, stream: Stream) -> bool {
        match stream {
            Stream::Stdout => self.stdout_color,
            Stream::Stderr => self.stderr_color,
            _ => false,
        }
    }
}

impl Default for OutputContext {
    fn default() -> Self {
        Self::new(Color::Auto)
    }
}

/// The tracing verbosity selected by `-v`/`-vv` and the `THREEPIO_LOG`
/// environment variable override. Repeated `-v` flags raise the floor;
/// `THREEPIO_LOG` always wins when set.
pub fn resolve_log_filter(verbose_count: u8) -> String {
    if let Ok(explicit) = std::env::var("THREEPIO_LOG") {
        return explicit;
    }
    match verbose_count {
        0 => "warn".to_string(),
        1 => "info".to_string(),
        _ => "debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_and_never_are_not_environment_dependent() {
        let always = OutputContext::new(Color::Always);
        assert!(always.color_enabled(Stream::Stdout));
        let never = OutputContext::new(Color::Never);
        assert!(!never.color_enabled(Stream::Stdout));
    }

    #[test]
    fn log_filter_escalates_with_verbosity() {
        // SAFETY: test runs single-threaded with respect to this var via serial execution
        // within this process; THREEPIO_LOG is not otherwise set in the test environment.
        unsafe { std::env::remove_var("THREEPIO_LOG") };
        assert_eq!(resolve_log_filter(0), "warn");
        assert_eq!(resolve_log_filter(1), "info");
        assert_eq!(resolve_log_filter(2), "debug");
    }
}
