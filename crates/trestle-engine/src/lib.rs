//! Context, Runner, Poller, and Handler Registry (C2-C5).
//!
//! This crate has no externally-visible surface of its own beyond what
//! `trestle`'s façade re-exports - it's the scheduling machinery the
//! façade drives.

pub mod context;
pub mod poller;
pub mod registry;
pub mod runner;

pub use context::WorkflowContext;
pub use poller::Poller;
pub use registry::{HandlerFn, HandlerFuture, HandlerRegistry};
pub use runner::Runner;
