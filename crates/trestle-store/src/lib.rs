//! Store Gateway (C1)
//!
//! Durable state for workflow instances, step outputs, and nap wake times.
//! `StoreGateway` is the seam: production code talks to `PostgresStore`,
//! tests talk to `InMemoryStore`.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::StoreError;
pub use gateway::StoreGateway;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
