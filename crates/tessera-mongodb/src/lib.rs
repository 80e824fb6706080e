//! MongoDB data-access layer for tessera
//!
//! Application code hands this crate generic `{ collection, values }`
//! objects and binary payloads without knowing where objects live.
//!
//! # Features
//! - Schema-validated insert, find and upsert with `$regex` marker rewriting
//! - Federated search across collections with owner resolution
//! - Chunked large-object storage (GridFS) with post-write verification
//! - Dotted-key metadata nesting
//! - One lazily-established, shared store handle
//! - In-memory backend with failure injection

pub mod aggregate;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod large_object;
pub mod memory;
pub mod mongo;
pub mod normalize;
pub mod object;
pub mod probe;
pub mod store;
pub mod unflatten;

pub use aggregate::{CrossCollectionAggregator, NO_OWNER, PROVENANCE_FIELD};
pub use config::{Config, ConnectionSettings, PoolConfig, PoolSection};
pub use connection::ConnectionManager;
pub use dispatch::{Operation, OperationDispatcher, OperationOutcome};
pub use handler::Handler;
pub use large_object::{LargeObject, LargeObjectStore, LargeObjectWrite, DEFAULT_CHUNK_SIZE};
pub use memory::{MemoryConnector, MemoryStore, StoreCall};
pub use mongo::{MongoConnector, MongoStore};
pub use normalize::normalize_regex;
pub use object::DatabaseObject;
pub use probe::CollectionProbe;
pub use store::{
    ChunkStream, Connector, DocumentStore, FileUpload, OperationOptions, StoredFile,
    UpdateOutcome,
};
pub use tessera_common::{Result, TesseraError};
pub use unflatten::{try_unflatten, unflatten, unflatten_value, UnflattenError};
