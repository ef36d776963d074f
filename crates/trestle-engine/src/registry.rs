//! Handler Registry (C2)
//!
//! A mapping from `handler_id` to a user-supplied async procedure. Mirrors
//! the shape of the teacher's `WorkflowRegistry` (`engine/registry.rs`) -
//! factories stored behind a type-erasing `Box`/`Arc` - narrowed from
//! per-workflow-type factories to a flat `handler_id -> handler` map, since
//! this engine has no typed workflow struct to construct.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use trestle_core::Value;

use crate::context::WorkflowContext;

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

pub type HandlerFn = Arc<dyn Fn(WorkflowContext, Value) -> HandlerFuture + Send + Sync>;

/// Populated before `poll` is invoked; reads during polling must be safe
/// against concurrent dispatches, hence the `RwLock` rather than an
/// unsynchronized `HashMap`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, HandlerFn>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `handler_id`, replacing any prior
    /// registration under the same id.
    pub fn register<F, Fut>(&self, handler_id: impl Into<String>, handler: F)
    where
        F: Fn(WorkflowContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let wrapped: HandlerFn = Arc::new(move |ctx, input| Box::pin(handler(ctx, input)));
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .insert(handler_id.into(), wrapped);
    }

    /// `None` if nothing is registered under `handler_id`.
    pub fn get(&self, handler_id: &str) -> Option<HandlerFn> {
        self.handlers
            .read()
            .expect("handler registry lock poisoned")
            .get(handler_id)
            .cloned()
    }
}
