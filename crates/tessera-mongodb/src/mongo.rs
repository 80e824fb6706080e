//! MongoDB backend: pooled driver client plus its GridFS bucket

use async_trait::async_trait;
use bson::{doc, Bson, Document as BsonDocument};
use futures::io::AsyncWriteExt;
use futures::{StreamExt, TryStreamExt};
use mongodb::gridfs::{FilesCollectionDocument, GridFsBucket};
use mongodb::options::{
    Acknowledgment, ClientOptions, FindOptions, InsertOneOptions, ServerApi, ServerApiVersion,
    UpdateOptions, WriteConcern,
};
use mongodb::{Client, Collection, Database};
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::{ConnectionSettings, PoolConfig};
use crate::store::{
    ChunkStream, Connector, DocumentStore, FileUpload, OperationOptions, StoredFile,
    UpdateOutcome,
};

/// Read buffer used when turning a download into chunks
const DOWNLOAD_BUFFER: usize = 64 * 1024;

/// Store backed by a MongoDB deployment
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Build a pooled client; the driver connects on first use
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let mut client_options = ClientOptions::parse(&settings.url)
            .await
            .map_err(|e| TesseraError::Connection(format!("invalid connection URL: {}", e)))?;

        apply_pool_config(&mut client_options, &settings.pool);

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)
            .map_err(|e| TesseraError::Connection(e.to_string()))?;
        let database = client.database(&settings.database);

        Ok(Self { client, database })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }

    fn bucket(&self) -> GridFsBucket {
        self.database.gridfs_bucket(None)
    }
}

fn apply_pool_config(client_options: &mut ClientOptions, config: &PoolConfig) {
    if let Some(min) = config.min_pool_size {
        client_options.min_pool_size = Some(min);
    }
    if let Some(max) = config.max_pool_size {
        client_options.max_pool_size = Some(max);
    }
    if let Some(idle) = config.max_idle_time {
        client_options.max_idle_time = Some(idle);
    }
    if let Some(connect) = config.connect_timeout {
        client_options.connect_timeout = Some(connect);
    }
    if let Some(server_sel) = config.server_selection_timeout {
        client_options.server_selection_timeout = Some(server_sel);
    }
    if let Some(app) = &config.app_name {
        client_options.app_name = Some(app.clone());
    }
}

fn write_concern(options: &OperationOptions) -> Option<WriteConcern> {
    options
        .write_concern
        .map(|nodes| WriteConcern::builder().w(Acknowledgment::Nodes(nodes)).build())
}

fn stored_file(file: FilesCollectionDocument) -> StoredFile {
    StoredFile {
        id: file.id,
        filename: file.filename.unwrap_or_default(),
        length: file.length,
        chunk_size: file.chunk_size_bytes,
        uploaded_at: file.upload_date.to_chrono(),
        metadata: file.metadata,
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| TesseraError::Connection(format!("Ping failed: {}", e)))?;
        Ok(())
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        Ok(self.database.list_collection_names().await?)
    }

    async fn find(
        &self,
        collection: &str,
        filter: BsonDocument,
        options: &OperationOptions,
    ) -> Result<Vec<BsonDocument>> {
        let find_options = FindOptions::builder().limit(options.limit).build();
        let cursor = self
            .collection(collection)
            .find(filter)
            .with_options(find_options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_one(
        &self,
        collection: &str,
        document: BsonDocument,
        options: &OperationOptions,
    ) -> Result<Bson> {
        let insert_options = InsertOneOptions::builder()
            .write_concern(write_concern(options))
            .build();
        let result = self
            .collection(collection)
            .insert_one(document)
            .with_options(insert_options)
            .await?;
        Ok(result.inserted_id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: BsonDocument,
        update: BsonDocument,
        options: &OperationOptions,
    ) -> Result<UpdateOutcome> {
        let update_options = UpdateOptions::builder()
            .upsert(options.upsert)
            .write_concern(write_concern(options))
            .build();
        let result = self
            .collection(collection)
            .update_one(filter, update)
            .with_options(update_options)
            .await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn upload(&self, file: FileUpload, mut chunks: ChunkStream) -> Result<u64> {
        let mut upload = self
            .bucket()
            .open_upload_stream(&file.filename)
            .id(file.id)
            .chunk_size_bytes(file.chunk_size)
            .metadata(file.metadata)
            .await?;

        let mut written = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Leaves no partial object behind
                    upload.abort().await?;
                    return Err(e);
                }
            };
            upload.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        upload.close().await?;

        debug!(filename = %file.filename, bytes = written, "upload stream closed");
        Ok(written)
    }

    async fn open_download_by_name(&self, filename: &str) -> Result<ChunkStream> {
        let download = self.bucket().open_download_stream_by_name(filename).await?;
        Ok(ReaderStream::with_capacity(download.compat(), DOWNLOAD_BUFFER)
            .map_err(TesseraError::from)
            .boxed())
    }

    async fn open_download(&self, id: &Bson) -> Result<ChunkStream> {
        let download = self.bucket().open_download_stream(id.clone()).await?;
        Ok(ReaderStream::with_capacity(download.compat(), DOWNLOAD_BUFFER)
            .map_err(TesseraError::from)
            .boxed())
    }

    async fn find_file(&self, filename: &str) -> Result<Option<StoredFile>> {
        let cursor = self.bucket().find(doc! { "filename": filename }).await?;
        let files: Vec<FilesCollectionDocument> = cursor.try_collect().await?;
        Ok(files
            .into_iter()
            .max_by_key(|file| file.upload_date)
            .map(stored_file))
    }

    async fn file_exists(&self, id: &Bson) -> Result<bool> {
        let mut cursor = self.bucket().find(doc! { "_id": id.clone() }).await?;
        Ok(cursor.advance().await?)
    }

    async fn delete_file(&self, id: &Bson) -> Result<()> {
        self.bucket().delete(id.clone()).await?;
        Ok(())
    }

    async fn list_file_names(&self) -> Result<Vec<String>> {
        let cursor = self.bucket().find(doc! {}).await?;
        let files: Vec<FilesCollectionDocument> = cursor.try_collect().await?;
        Ok(files.into_iter().filter_map(|file| file.filename).collect())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        info!(database = %self.database.name(), "mongodb client shut down");
        Ok(())
    }
}

/// Connects [`MongoStore`] handles from [`ConnectionSettings`]
#[derive(Debug, Clone)]
pub struct MongoConnector {
    settings: ConnectionSettings,
}

impl MongoConnector {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        let store = MongoStore::connect(&self.settings).await?;
        Ok(Arc::new(store))
    }

    fn target(&self) -> String {
        self.settings.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_write_concern_from_options() {
        assert!(write_concern(&OperationOptions::default()).is_none());

        let concern = write_concern(&OperationOptions::default().write_concern(1)).unwrap();
        assert_eq!(concern.w, Some(Acknowledgment::Nodes(1)));
    }

    #[tokio::test]
    async fn test_pool_config_applied() {
        let mut client_options = ClientOptions::parse("mongodb://localhost:27017/app")
            .await
            .unwrap();
        let pool = PoolConfig {
            max_pool_size: Some(42),
            connect_timeout: Some(Duration::from_secs(3)),
            ..Default::default()
        };
        apply_pool_config(&mut client_options, &pool);

        assert_eq!(client_options.max_pool_size, Some(42));
        assert_eq!(client_options.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(client_options.app_name, Some("tessera".to_string()));
    }

    #[test]
    fn test_connector_target() {
        let settings = crate::Config::new("localhost", "app").connection_settings();
        let connector = MongoConnector::new(settings);
        assert_eq!(connector.target(), "mongodb://localhost:27017/app");
    }
}
