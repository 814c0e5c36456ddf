pub mod memory;
pub mod postgres;
pub mod traits;

use std::sync::Arc;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use traits::{EventStore, TaskLedger};

/// The two durable stores the orchestrator writes through.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub ledger: Arc<dyn TaskLedger>,
}

impl Stores {
    pub fn new(events: Arc<dyn EventStore>, ledger: Arc<dyn TaskLedger>) -> Self {
        Self { events, ledger }
    }

    pub fn in_memory() -> Self {
        Self::shared(Arc::new(InMemoryStore::new()))
    }

    /// Uses one backend for both the event log and the ledger.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: EventStore + TaskLedger + 'static,
    {
        Self {
            events: store.clone(),
            ledger: store,
        }
    }
}
