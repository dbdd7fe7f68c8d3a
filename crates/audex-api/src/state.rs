//! Application state.

use std::sync::Arc;

use audex_queue::{JobQueue, RedisJobQueue};
use audex_storage::{BlobStore, S3BlobStore};

use crate::auth::{AuthClient, HttpAuthClient};
use crate::config::ApiConfig;

/// Shared application state.
///
/// Client handles are built once at startup and injected here by
/// reference; handlers never construct their own connections, so tests can
/// substitute the in-memory backends.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn BlobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub auth: Arc<dyn AuthClient>,
}

impl AppState {
    /// Create state with the production backends.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = S3BlobStore::from_env().await?;
        let queue = RedisJobQueue::from_env()?;
        queue.init().await?;
        let auth = HttpAuthClient::from_env()?;

        Ok(Self::with_clients(
            config,
            Arc::new(store),
            Arc::new(queue),
            Arc::new(auth),
        ))
    }

    /// Create state from explicit client handles.
    pub fn with_clients(
        config: ApiConfig,
        store: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
        auth: Arc<dyn AuthClient>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            auth,
        }
    }
}
