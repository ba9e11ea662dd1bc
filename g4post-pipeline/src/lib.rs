//! g4post-pipeline: configurable chains of transforms over hit data.
//!
//! A run configuration lists module descriptors. Each descriptor resolves to
//! one variant of a closed set of module kinds with validated parameters;
//! the resulting [`Pipeline`] runs the modules in order on one
//! [`ProcessingContext`](g4post_core::ProcessingContext) per batch.
//!
//! # Key Components
//!
//! - [`ModuleDescriptor`] - a `modules` entry as written in the configuration
//! - [`Module`] / [`ModuleKind`] - resolved, validated steps
//! - [`Pipeline`] - ordered execution and static variable checks
//! - [`RunConfig`] - the complete run configuration
//! - [`Resources`] - geometry tables and the run registry shared by workers

mod config;
mod descriptor;
mod error;
mod module;
mod params;
mod pipeline;
pub mod resources;

pub use config::{InputSpec, Mode, OutputFormat, RunConfig, DEFAULT_MEMORY_FRACTION};
pub use descriptor::ModuleDescriptor;
pub use error::{Error, Result};
pub use module::{Acceptance, Module, ModuleKind};
pub use pipeline::Pipeline;
pub use resources::{load_geometry, load_run_registry, Resources, DEFAULT_SURFACE};
