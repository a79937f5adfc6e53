//! Service lifecycle harness, bounded-concurrency primitives, and JSON-RPC
//! envelope helpers shared by the connector.
//!
//! - [`config`] — configuration for the main-process harness specialization.
//! - [`lifecycle`] — the startable/stoppable service capability interface,
//!   a nested-children harness, periodic iteration, and the main-process
//!   specialization.
//! - [`parallel`] — a bounded-concurrency async worker pool.
//! - [`sequential`] — a strict-FIFO single-writer queue.
//! - [`rpc`] — JSON-RPC 2.0 envelope builders.

pub mod config;
pub mod lifecycle;
pub mod parallel;
pub mod rpc;
pub mod sequential;

pub use jrs_foundation::{Error, Result};
