//! Public operation surface

use bson::{Bson, Document as BsonDocument};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tessera_common::Result;
use tracing::info;

use crate::aggregate::CrossCollectionAggregator;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::dispatch::OperationDispatcher;
use crate::large_object::{LargeObject, LargeObjectStore, LargeObjectWrite};
use crate::object::DatabaseObject;
use crate::probe::CollectionProbe;
use crate::store::{ChunkStream, OperationOptions, UpdateOutcome};

/// Entry point for applications: CRUD, federated search and large objects
pub struct Handler {
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<OperationDispatcher>,
    probe: Arc<CollectionProbe>,
    aggregator: CrossCollectionAggregator,
    large_objects: LargeObjectStore,
}

impl Handler {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self::assemble(connections, OperationDispatcher::new)
    }

    /// Handler for the deployment in `config`; connects lazily
    pub fn from_config(config: &Config) -> Self {
        let aliases = config.collections.clone();
        Self::assemble(Arc::new(ConnectionManager::from_config(config)), move |c| {
            OperationDispatcher::new(c).with_aliases(aliases)
        })
    }

    /// Handler for the deployment in `config`, failing early if the server
    /// does not answer a ping
    pub async fn connect(config: &Config) -> Result<Self> {
        let handler = Self::from_config(config);
        handler.ping().await?;
        info!(url = %config.connection_url(), "server reachable");
        Ok(handler)
    }

    fn assemble(
        connections: Arc<ConnectionManager>,
        dispatcher: impl FnOnce(Arc<ConnectionManager>) -> OperationDispatcher,
    ) -> Self {
        let dispatcher = Arc::new(dispatcher(connections.clone()));
        let probe = Arc::new(CollectionProbe::new(connections.clone()));
        Self {
            aggregator: CrossCollectionAggregator::new(dispatcher.clone(), probe.clone()),
            large_objects: LargeObjectStore::new(connections.clone()),
            connections,
            dispatcher,
            probe,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Insert `object.values` into `object.collection`, acknowledged by one node
    pub async fn insert(&self, object: &mut DatabaseObject) -> Result<Bson> {
        let options = OperationOptions::default().write_concern(1);
        self.dispatcher.insert(&options, object).await
    }

    pub async fn query(
        &self,
        options: &OperationOptions,
        object: &mut DatabaseObject,
    ) -> Result<Vec<BsonDocument>> {
        self.dispatcher.find(options, object).await
    }

    pub async fn query_one(&self, object: &mut DatabaseObject) -> Result<Option<BsonDocument>> {
        let found = self
            .dispatcher
            .find(&OperationOptions::with_limit(1), object)
            .await?;
        Ok(found.into_iter().next())
    }

    /// Search every object's collection and tag results with their owner
    pub async fn query_all(
        &self,
        objects: &mut [DatabaseObject],
        count: Option<usize>,
    ) -> Result<Vec<BsonDocument>> {
        self.aggregator.query_all(objects, count).await
    }

    /// Update the first match of `filter`, inserting it if nothing matches
    pub async fn insert_or_update(
        &self,
        filter: &mut DatabaseObject,
        update: BsonDocument,
    ) -> Result<UpdateOutcome> {
        let options = OperationOptions::default().upsert(true).write_concern(1);
        self.dispatcher.update_one(update, &options, filter).await
    }

    /// Collection holding a document with this `_id`, if any
    pub async fn resolve_owner(&self, id: &Bson) -> Result<Option<String>> {
        self.probe.resolve_owner(id).await
    }

    pub async fn write_large_object(&self, request: LargeObjectWrite) -> Result<LargeObject> {
        self.large_objects.write(request).await
    }

    /// Stream a local file into the large-object store
    pub async fn insert_file(
        &self,
        path: impl AsRef<Path>,
        request: LargeObjectWrite,
    ) -> Result<LargeObject> {
        self.large_objects.write_file(path, request).await
    }

    pub async fn read_large_object(&self, name: &str) -> Result<Bytes> {
        self.large_objects.read(name).await
    }

    pub async fn read_large_object_by_id(&self, id: &Bson) -> Result<Bytes> {
        self.large_objects.read_by_id(id).await
    }

    pub async fn open_read_stream(&self, name: &str) -> Result<ChunkStream> {
        self.large_objects.read_stream(name).await
    }

    pub async fn describe_large_object(&self, name: &str) -> Result<LargeObject> {
        self.large_objects.describe(name).await
    }

    pub async fn object_exists(&self, id: &Bson) -> Result<bool> {
        self.large_objects.exists(id).await
    }

    pub async fn remove_object(&self, id: &Bson) -> Result<()> {
        self.large_objects.remove(id).await
    }

    pub async fn file_is_listed(&self, name: &str) -> Result<bool> {
        self.large_objects.is_listed(name).await
    }

    pub async fn list_large_objects(&self) -> Result<Vec<String>> {
        self.large_objects.list_names().await
    }

    pub async fn ping(&self) -> Result<()> {
        self.connections
            .run(|store| async move { store.ping().await })
            .await
    }

    pub async fn is_connected(&self) -> bool {
        self.connections.is_connected().await
    }

    pub async fn close_connection(&self) -> Result<()> {
        self.connections.close().await
    }
}
