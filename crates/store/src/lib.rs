//! Storage backends for SideChat branches and merged knowledge.

pub mod file_backend;
pub mod in_memory;
mod state;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod conformance;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use sidechat_config::StoreConfig;
use sidechat_core::error::StoreError;
use sidechat_core::store::BranchStore;
use std::sync::Arc;
use tracing::info;

/// Build the backend named by the configuration.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn BranchStore>, StoreError> {
    let store: Arc<dyn BranchStore> = match config.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "file" => Arc::new(FileStore::new(config.resolved_path())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("Failed to create store directory: {e}"))
                })?;
            }
            Arc::new(SqliteStore::new(&format!("sqlite://{}", path.display())).await?)
        }
        other => {
            return Err(StoreError::Unavailable(format!(
                "Unsupported store backend '{other}'"
            )));
        }
    };
    info!(backend = store.name(), "Store opened");
    Ok(store)
}
