//! `trestle`: a durable workflow execution engine backed by Postgres.
//!
//! A workflow is a user-supplied async procedure registered under a
//! `handler_id`. `Client::start` submits an instance by id; worker
//! processes call `Client::poll` to claim and run due instances; an
//! external caller may `Client::wait` on completion. See `trestle_core`,
//! `trestle_store`, and `trestle_engine` for the pieces this façade wires
//! together.
//!
//! ```ignore
//! use trestle::{Client, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::init(EngineConfig::from_env()).await?;
//!     client.register_handler("greet", |_ctx, input| async move {
//!         Ok(serde_json::json!(format!("hello, {input}")))
//!     });
//!
//!     client.start("w1", "greet", serde_json::json!("world")).await?;
//!
//!     let client_for_poll = client.clone();
//!     tokio::spawn(async move { client_for_poll.poll(|| false).await });
//!
//!     let result = client.wait("w1", 10, std::time::Duration::from_millis(100)).await?;
//!     println!("{result}");
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use trestle_core::{Clock, EngineError, Result, StatusAndResult, SystemClock, Value, WorkflowStatus};
use trestle_engine::{HandlerRegistry, Poller, Runner};
use trestle_store::{PostgresStore, StoreError, StoreGateway};

pub use trestle_core::{Clock as EngineClock, EngineConfig, EngineError, FakeClock, Value as WorkflowValue};
pub use trestle_engine::WorkflowContext;
pub use trestle_store::InMemoryStore;

/// The externally-visible engine boundary: `init`, `close`, `start`,
/// `wait`, `register_handler`, `poll`.
///
/// Cheap to clone: every field is an `Arc`.
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn StoreGateway>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    runner: Arc<Runner>,
}

impl Client {
    /// Opens the store connection and creates the schema, the way a
    /// Mongo-flavored `init()` would open its connection and create its
    /// collections/indexes.
    pub async fn init(config: EngineConfig) -> Result<Self> {
        let store = PostgresStore::connect(&config.db_url)
            .await
            .map_err(|e| EngineError::Store(e.into()))?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Build a `Client` over an already-constructed store - the seam tests
    /// use to substitute `InMemoryStore` for `PostgresStore`.
    pub fn with_store(store: Arc<dyn StoreGateway>, config: EngineConfig) -> Self {
        Self::with_store_and_clock(store, Arc::new(SystemClock), config)
    }

    /// As `with_store`, but with an explicit clock - the seam the fake-clock
    /// test scenarios use.
    pub fn with_store_and_clock(
        store: Arc<dyn StoreGateway>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let registry = Arc::new(HandlerRegistry::new());
        let runner = Arc::new(Runner::new(
            store.clone(),
            registry.clone(),
            clock.clone(),
            config.clone(),
        ));
        Self {
            store,
            registry,
            clock,
            config,
            runner,
        }
    }

    /// Closes the store connection. Idempotent on the in-memory double.
    pub async fn close(&self) {
        self.store.close().await;
    }

    /// Registers `handler` under `handler_id`, replacing any prior
    /// registration under the same id. Must happen before `poll` is called
    /// for the handler to be resolvable.
    pub fn register_handler<F, Fut>(&self, handler_id: impl Into<String>, handler: F)
    where
        F: Fn(WorkflowContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.registry.register(handler_id, handler);
    }

    /// Submits a new instance. Fails with `WorkflowAlreadyStarted` if
    /// `workflow_id` collides with an existing row (the distinguished
    /// contract this façade picked - see the design ledger for the
    /// alternative boolean-return contract this supersedes).
    #[instrument(skip(self, input), fields(workflow_id = %workflow_id.as_ref()))]
    pub async fn start(
        &self,
        workflow_id: impl AsRef<str>,
        handler_id: impl AsRef<str>,
        input: Value,
    ) -> Result<()> {
        let workflow_id = workflow_id.as_ref();
        let handler_id = handler_id.as_ref();
        let now = self.clock.now();
        self.store
            .insert_instance(workflow_id, handler_id, input, now)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(id) => EngineError::workflow_already_started(id),
                other => EngineError::Store(other.into()),
            })
    }

    /// Polls `findStatusAndResult` up to `retries` times, sleeping
    /// `pause_interval` between probes. Returns the recorded result once
    /// `status=finished`; fails with `WaitTimeout` if the budget is
    /// exhausted first. `aborted` is not a distinguished outcome - it falls
    /// through to `WaitTimeout` like any other non-terminal status.
    #[instrument(skip(self), fields(workflow_id))]
    pub async fn wait(
        &self,
        workflow_id: &str,
        retries: u32,
        pause_interval: Duration,
    ) -> Result<Value> {
        for attempt in 0..retries {
            match self.store.find_status_and_result(workflow_id).await {
                Ok(StatusAndResult {
                    status: WorkflowStatus::Finished,
                    result,
                }) => return Ok(result.unwrap_or(Value::Null)),
                Ok(_) => {}
                Err(StoreError::NotFound(id)) => return Err(EngineError::workflow_not_found(id)),
                Err(other) => return Err(EngineError::Store(other.into())),
            }

            if attempt + 1 < retries {
                tokio::time::sleep(pause_interval).await;
            }
        }

        Err(EngineError::wait_timeout(workflow_id))
    }

    /// Runs the claim/dispatch loop until `should_stop` returns true or a
    /// Runner surfaces an infrastructure failure.
    pub async fn poll(&self, should_stop: impl FnMut() -> bool + Send) -> Result<()> {
        let poller = Poller::new(
            self.store.clone(),
            self.runner.clone(),
            self.clock.clone(),
            self.config.clone(),
        );
        poller.poll(should_stop).await
    }
}
