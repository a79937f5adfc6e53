//! Foundation types shared across the jrs-connector workspace.
//!
//! This crate has no `jrs-*` dependencies of its own — every other crate in
//! the workspace depends on it, never the other way around.

mod error;
pub mod codes;

pub use error::{Error, Result};
