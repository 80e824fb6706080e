//! Finds which collection holds a document with a given `_id`

use bson::{doc, Bson};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tessera_common::Result;
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::store::OperationOptions;

/// Prefix of server-managed collections, never searched
const SYSTEM_PREFIX: &str = "system.";

/// Searches every collection of the database for an identifier
pub struct CollectionProbe {
    connections: Arc<ConnectionManager>,
}

impl CollectionProbe {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Name of the collection holding a document with `_id == id`.
    ///
    /// All collections are searched concurrently and the first lookup that
    /// finds the id wins; the remaining lookups are dropped. If the id exists
    /// in several collections, which one is reported depends on completion
    /// order.
    ///
    /// A lookup that fails with a connection error fails the probe. Any other
    /// failed lookup counts as "not in that collection".
    pub async fn resolve_owner(&self, id: &Bson) -> Result<Option<String>> {
        self.connections
            .run(|store| async move {
                let names = store.list_collection_names().await?;
                let limit = OperationOptions::with_limit(1);

                let mut lookups: FuturesUnordered<_> = names
                    .into_iter()
                    .filter(|name| !name.starts_with(SYSTEM_PREFIX))
                    .map(|name| {
                        let store = store.clone();
                        let filter = doc! { "_id": id.clone() };
                        let limit = &limit;
                        async move {
                            let result = store.find(&name, filter, limit).await;
                            (name, result)
                        }
                    })
                    .collect();

                while let Some((name, result)) = lookups.next().await {
                    match result {
                        Ok(found) if !found.is_empty() => {
                            debug!(%id, collection = %name, "owner resolved");
                            return Ok(Some(name));
                        }
                        Ok(_) => {}
                        Err(error) if error.is_connection_error() => return Err(error),
                        Err(error) => {
                            warn!(collection = %name, %error, "owner lookup failed; treated as no match");
                        }
                    }
                }

                debug!(%id, "no collection holds id");
                Ok(None)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore};
    use bson::oid::ObjectId;
    use std::time::Duration;
    use tessera_common::TesseraError;

    fn probe(store: MemoryStore) -> (Arc<MemoryStore>, CollectionProbe) {
        let store = Arc::new(store);
        let connections = Arc::new(ConnectionManager::new(Arc::new(MemoryConnector::new(
            store.clone(),
        ))));
        (store, CollectionProbe::new(connections))
    }

    #[tokio::test]
    async fn test_single_owner() {
        let id = ObjectId::new();
        let (_, probe) = probe(
            MemoryStore::new()
                .with_collection("users", vec![doc! { "_id": 1 }])
                .with_collection("orders", vec![doc! { "_id": id }])
                .with_collection("empty", vec![]),
        );

        let owner = probe.resolve_owner(&Bson::ObjectId(id)).await.unwrap();
        assert_eq!(owner.as_deref(), Some("orders"));
    }

    #[tokio::test]
    async fn test_no_owner_is_not_an_error() {
        let (_, probe) = probe(MemoryStore::new().with_collection("users", vec![doc! { "_id": 1 }]));
        assert_eq!(probe.resolve_owner(&Bson::Int32(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_database() {
        let (_, probe) = probe(MemoryStore::new());
        assert_eq!(probe.resolve_owner(&Bson::Int32(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_system_collections_skipped() {
        let (store, probe) = probe(
            MemoryStore::new().with_collection("system.views", vec![doc! { "_id": 1 }]),
        );
        assert_eq!(probe.resolve_owner(&Bson::Int32(1)).await.unwrap(), None);
        assert!(store.calls().iter().all(|call| !matches!(
            call,
            crate::memory::StoreCall::Find { .. }
        )));
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let (store, probe) = probe(
            MemoryStore::new()
                .with_collection("slow", vec![doc! { "_id": 7 }])
                .with_collection("fast", vec![doc! { "_id": 7 }]),
        );
        store.delay_collection("slow", Duration::from_millis(200));

        let owner = probe.resolve_owner(&Bson::Int32(7)).await.unwrap();
        assert_eq!(owner.as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn test_lookup_errors_are_skipped() {
        let (store, probe) = probe(
            MemoryStore::new()
                .with_collection("broken", vec![])
                .with_collection("users", vec![doc! { "_id": 1 }]),
        );
        store.fail_collection("broken", TesseraError::Operation("unauthorized".to_string()));

        let owner = probe.resolve_owner(&Bson::Int32(1)).await.unwrap();
        assert_eq!(owner.as_deref(), Some("users"));
    }

    #[tokio::test]
    async fn test_connection_error_fails_probe() {
        let (store, probe) = probe(MemoryStore::new().with_collection("users", vec![]));
        store.fail_collection("users", TesseraError::Connection("reset".to_string()));

        let err = probe.resolve_owner(&Bson::Int32(1)).await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let (store, probe) = probe(MemoryStore::new());
        store.lose_connection();
        assert!(probe.resolve_owner(&Bson::Int32(1)).await.is_err());
    }
}
