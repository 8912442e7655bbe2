// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The 3pio engine: runner detection and argv rewriting, the event
//! transport, native output processors, the group tree and orchestrator
//! that drive it, the process controller that spawns and supervises the
//! wrapped test runner, and the on-disk report renderer.

pub mod group_tree;
pub mod native;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod render;
pub mod run;
pub mod signal;
pub mod transport;

pub use orchestrator::Orchestrator;
pub use process::{ChildTermination, ProcessController, ProcessError};
pub use registry::{Detection, RefusedMode, RewrittenCommand, RunnerDefinition, definitions, detect, refuse, rewrite};
pub use render::{RenderError, Renderer};
pub use run::{RunCommand, RunId, RunMeta};
pub use transport::{TransportError, TransportReader, TransportRecord, TransportWriter};
