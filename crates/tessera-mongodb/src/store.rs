//! Backend seam: the operations every store implementation provides.
//!
//! Components never talk to the MongoDB driver directly. They borrow an
//! `Arc<dyn DocumentStore>` from the [`ConnectionManager`](crate::ConnectionManager)
//! and issue the primitives below.

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::sync::Arc;
use tessera_common::Result;

/// Finite, non-restartable sequence of payload chunks
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Options accepted by the generic operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationOptions {
    /// Maximum number of documents returned by a find (0 means no limit)
    pub limit: Option<i64>,
    /// Insert the filter document when an update matches nothing
    pub upsert: Option<bool>,
    /// Number of nodes that must acknowledge a write
    pub write_concern: Option<u32>,
}

impl OperationOptions {
    pub fn with_limit(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = Some(upsert);
        self
    }

    pub fn write_concern(mut self, nodes: u32) -> Self {
        self.write_concern = Some(nodes);
        self
    }
}

/// Result of an update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// Parameters of a chunked upload
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub id: Bson,
    pub filename: String,
    pub metadata: BsonDocument,
    pub chunk_size: u32,
}

/// Descriptor of a stored large object
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub id: Bson,
    pub filename: String,
    pub length: u64,
    pub chunk_size: u32,
    pub uploaded_at: DateTime<Utc>,
    pub metadata: Option<BsonDocument>,
}

/// Document store backend
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<()>;

    async fn list_collection_names(&self) -> Result<Vec<String>>;

    async fn find(
        &self,
        collection: &str,
        filter: BsonDocument,
        options: &OperationOptions,
    ) -> Result<Vec<BsonDocument>>;

    /// Insert a document and return its `_id`
    async fn insert_one(
        &self,
        collection: &str,
        document: BsonDocument,
        options: &OperationOptions,
    ) -> Result<Bson>;

    async fn update_one(
        &self,
        collection: &str,
        filter: BsonDocument,
        update: BsonDocument,
        options: &OperationOptions,
    ) -> Result<UpdateOutcome>;

    /// Stream chunks into a new large object; returns the number of bytes sent
    async fn upload(&self, file: FileUpload, chunks: ChunkStream) -> Result<u64>;

    /// Latest revision of the large object with this name
    async fn open_download_by_name(&self, filename: &str) -> Result<ChunkStream>;

    async fn open_download(&self, id: &Bson) -> Result<ChunkStream>;

    /// Latest revision's descriptor, if any object carries the name
    async fn find_file(&self, filename: &str) -> Result<Option<StoredFile>>;

    async fn file_exists(&self, id: &Bson) -> Result<bool>;

    async fn delete_file(&self, id: &Bson) -> Result<()>;

    async fn list_file_names(&self) -> Result<Vec<String>>;

    /// Shut the backend down; the handle is unusable afterwards
    async fn close(&self) -> Result<()>;
}

/// Produces store handles for the [`ConnectionManager`](crate::ConnectionManager)
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>>;

    /// Connection target for logs
    fn target(&self) -> String;
}
