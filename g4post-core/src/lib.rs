//! g4post-core: ragged arrays and the shared processing context.
//!
//! This crate provides the data model every g4post transform works on:
//! nested sequences of variable depth, their dynamically typed column
//! wrapper, and the lock-step recursion used to walk co-indexed arrays.
//!

pub mod aligned;
pub mod column;
pub mod context;
pub mod error;
pub mod ragged;

pub use aligned::{map_aligned, Aligned, Level};
pub use column::{Column, DType};
pub use context::ProcessingContext;
pub use error::{ensure_same_len, Error, Result};
pub use ragged::Ragged;
