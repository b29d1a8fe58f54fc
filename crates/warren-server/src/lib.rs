//! Warren Server Library
//!
//! HTTP front end and the sample `WorkerActor` for the Warren runtime.

pub mod api;
pub mod models;
pub mod state;
pub mod worker;

use std::sync::Arc;
use tracing::info;
use warren_core::{Error, Result, StorageBackend, WarrenConfig};
use warren_runtime::{Runtime, RuntimeBuilder};
use warren_storage::{FileStore, MemoryStore};
use worker::{WorkerActor, WORKER_ACTOR_TYPE};

pub use state::AppState;

/// Register the actor types this server hosts
pub fn register_actor_types(builder: RuntimeBuilder) -> RuntimeBuilder {
    builder.register_actor(WORKER_ACTOR_TYPE, WorkerActor)
}

/// Build a runtime from configuration, opening the configured store
pub async fn build_runtime(config: &WarrenConfig) -> Result<Runtime> {
    config.validate()?;

    let builder = register_actor_types(RuntimeBuilder::new()).with_config(&config.actor);
    let builder = match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store; state is lost on exit");
            builder.with_store(Arc::new(MemoryStore::new()))
        }
        StorageBackend::File => {
            let data_dir =
                config
                    .storage
                    .data_dir
                    .as_ref()
                    .ok_or_else(|| Error::InvalidConfiguration {
                        field: "storage.data_dir".into(),
                        reason: "required when backend is file".into(),
                    })?;
            builder.with_store(Arc::new(FileStore::open(data_dir).await?))
        }
    };
    builder.build()
}
