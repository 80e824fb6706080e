//! Shared store handle with lazy establishment and invalidation

use std::future::Future;
use std::sync::Arc;
use tessera_common::Result;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::mongo::MongoConnector;
use crate::store::{Connector, DocumentStore};

/// Owns the single store handle every component borrows.
///
/// The handle is created on first use and kept until [`close`](Self::close)
/// or until an operation fails with a connection error, after which the next
/// call connects again.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    handle: RwLock<Option<Arc<dyn DocumentStore>>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            handle: RwLock::new(None),
        }
    }

    /// Manager for the MongoDB deployment named by `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(MongoConnector::new(config.connection_settings())))
    }

    /// Current handle, connecting first if there is none
    pub async fn handle(&self) -> Result<Arc<dyn DocumentStore>> {
        if let Some(handle) = self.handle.read().await.as_ref() {
            return Ok(handle.clone());
        }

        let mut slot = self.handle.write().await;
        // Another caller may have connected while we waited for the lock
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let handle = self.connector.connect().await?;
        info!(
            target_url = %self.connector.target(),
            backend = handle.backend(),
            "store connection established"
        );
        *slot = Some(handle.clone());
        Ok(handle)
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Run `operation` on the current handle.
    ///
    /// A connection error drops the handle it ran on, so the next call
    /// reconnects. Other errors leave the handle in place.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn DocumentStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = self.handle().await?;
        let result = operation(handle.clone()).await;
        if let Err(error) = &result {
            if error.is_connection_error() {
                self.invalidate(&handle, &error.to_string()).await;
            }
        }
        result
    }

    /// Forget `handle` if it is still the current one.
    ///
    /// In-flight operations keep their clone and finish on their own.
    pub async fn invalidate(&self, handle: &Arc<dyn DocumentStore>, reason: &str) {
        let mut slot = self.handle.write().await;
        let current = slot
            .as_ref()
            .is_some_and(|current| same_handle(current, handle));
        if current {
            *slot = None;
            warn!(%reason, "store handle invalidated; next call reconnects");
        }
    }

    /// Shut the handle down; a later call connects again
    pub async fn close(&self) -> Result<()> {
        let handle = self.handle.write().await.take();
        match handle {
            Some(handle) => {
                handle.close().await?;
                info!(target_url = %self.connector.target(), "store connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn same_handle(a: &Arc<dyn DocumentStore>, b: &Arc<dyn DocumentStore>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
