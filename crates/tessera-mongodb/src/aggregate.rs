//! Federated query over several collections with provenance tagging

use bson::Document as BsonDocument;
use futures::future::try_join_all;
use std::sync::Arc;
use tessera_common::Result;
use tracing::debug;

use crate::dispatch::OperationDispatcher;
use crate::object::DatabaseObject;
use crate::probe::CollectionProbe;
use crate::store::OperationOptions;

/// Field added to every aggregated document
pub const PROVENANCE_FIELD: &str = "collection";

/// Provenance of a document no collection claims
pub const NO_OWNER: &str = "none";

/// Runs one find per database object and merges the results
pub struct CrossCollectionAggregator {
    dispatcher: Arc<OperationDispatcher>,
    probe: Arc<CollectionProbe>,
}

impl CrossCollectionAggregator {
    pub fn new(dispatcher: Arc<OperationDispatcher>, probe: Arc<CollectionProbe>) -> Self {
        Self { dispatcher, probe }
    }

    /// Query every object's collection concurrently.
    ///
    /// Results are concatenated in the order of `objects`, cut to `limit`,
    /// and each survivor is tagged with its owning collection. Any failed
    /// query or probe fails the whole call.
    pub async fn query_all(
        &self,
        objects: &mut [DatabaseObject],
        limit: Option<usize>,
    ) -> Result<Vec<BsonDocument>> {
        if objects.is_empty() {
            return Ok(Vec::new());
        }

        let options = OperationOptions::default();
        let per_collection = try_join_all(
            objects
                .iter_mut()
                .map(|object| self.dispatcher.find(&options, object)),
        )
        .await?;

        let mut merged: Vec<BsonDocument> = per_collection.into_iter().flatten().collect();
        let total = merged.len();
        if let Some(limit) = limit {
            merged.truncate(limit);
        }

        let owners = try_join_all(merged.iter().map(|document| async move {
            match document.get("_id") {
                Some(id) => self.probe.resolve_owner(id).await,
                None => Ok(None),
            }
        }))
        .await?;

        for (document, owner) in merged.iter_mut().zip(owners) {
            let owner = owner.unwrap_or_else(|| NO_OWNER.to_string());
            document.insert(PROVENANCE_FIELD, owner);
        }

        debug!(
            queries = objects.len(),
            total,
            returned = merged.len(),
            "aggregated query complete"
        );
        Ok(merged)
    }
}
