//! Chunked large-object storage with post-write verification

use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::connection::ConnectionManager;
use crate::store::{ChunkStream, DocumentStore, FileUpload, StoredFile};
use crate::unflatten::unflatten;

/// Chunk size used when the request does not set one (255 KiB)
pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

/// Metadata key holding the content type
pub const CONTENT_TYPE_KEY: &str = "contentType";

pub const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

/// A large object to store
#[derive(Debug, Clone)]
pub struct LargeObjectWrite {
    name: Option<String>,
    id: Option<Bson>,
    metadata: BsonDocument,
    payload: Bytes,
    content_type: Option<String>,
    chunk_size: u32,
    verify: bool,
}

impl Default for LargeObjectWrite {
    fn default() -> Self {
        Self {
            name: None,
            id: None,
            metadata: BsonDocument::new(),
            payload: Bytes::new(),
            content_type: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify: true,
        }
    }
}

impl LargeObjectWrite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use `id` instead of a generated ObjectId
    pub fn id(mut self, id: impl Into<Bson>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Metadata; dotted keys are nested before storage
    pub fn metadata(mut self, metadata: BsonDocument) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Read the object back after writing and compare lengths (default on)
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    fn checked_name(&self) -> Result<String> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or(TesseraError::MissingName)
    }

    fn prepare(&self, name: String) -> Result<FileUpload> {
        if self.chunk_size == 0 {
            return Err(TesseraError::Validation(
                "chunk size must be at least one byte".to_string(),
            ));
        }

        let mut metadata = unflatten(&self.metadata);
        match &self.content_type {
            Some(content_type) => {
                metadata.insert(CONTENT_TYPE_KEY, content_type.clone());
            }
            // A content type carried in the metadata wins over the default
            None => {
                if !matches!(metadata.get(CONTENT_TYPE_KEY), Some(Bson::String(_))) {
                    metadata.insert(CONTENT_TYPE_KEY, DEFAULT_CONTENT_TYPE);
                }
            }
        }

        Ok(FileUpload {
            id: self
                .id
                .clone()
                .unwrap_or_else(|| Bson::ObjectId(ObjectId::new())),
            filename: name,
            metadata,
            chunk_size: self.chunk_size,
        })
    }
}

/// A stored large object
#[derive(Debug, Clone, PartialEq)]
pub struct LargeObject {
    pub id: Bson,
    pub name: String,
    pub content_type: String,
    /// Nested metadata, without the content type
    pub metadata: BsonDocument,
    pub length: u64,
    pub chunk_size: u32,
}

impl LargeObject {
    fn from_upload(upload: FileUpload, length: u64) -> Self {
        Self::assemble(upload.id, upload.filename, Some(upload.metadata), length, upload.chunk_size)
    }

    fn assemble(
        id: Bson,
        name: String,
        metadata: Option<BsonDocument>,
        length: u64,
        chunk_size: u32,
    ) -> Self {
        let mut metadata = metadata.unwrap_or_default();
        let content_type = match metadata.remove(CONTENT_TYPE_KEY) {
            Some(Bson::String(content_type)) => content_type,
            _ => DEFAULT_CONTENT_TYPE.to_string(),
        };
        Self {
            id,
            name,
            content_type,
            metadata,
            length,
            chunk_size,
        }
    }
}

impl From<StoredFile> for LargeObject {
    fn from(file: StoredFile) -> Self {
        Self::assemble(file.id, file.filename, file.metadata, file.length, file.chunk_size)
    }
}

/// Reads and writes large objects through the store's chunked facility
pub struct LargeObjectStore {
    connections: Arc<ConnectionManager>,
}

impl LargeObjectStore {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    /// Store `request.payload` in chunks.
    ///
    /// Fails with `MissingName` or `NothingToInsert` before touching the
    /// store, and with `SizeMismatch` when verification reads back a
    /// different length.
    pub async fn write(&self, request: LargeObjectWrite) -> Result<LargeObject> {
        let name = request.checked_name()?;
        if request.metadata.is_empty() && request.payload.is_empty() {
            return Err(TesseraError::NothingToInsert);
        }
        let upload = request.prepare(name)?;
        let chunks = payload_chunks(request.payload.clone(), upload.chunk_size as usize);
        let expected = request.payload.len() as u64;

        self.write_chunks(upload, chunks, expected, request.verify)
            .await
    }

    /// Stream the file at `path` into the store; the request's payload is ignored
    pub async fn write_file(
        &self,
        path: impl AsRef<Path>,
        request: LargeObjectWrite,
    ) -> Result<LargeObject> {
        let name = request.checked_name()?;
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let expected = file.metadata().await?.len();
        if request.metadata.is_empty() && expected == 0 {
            return Err(TesseraError::NothingToInsert);
        }

        let upload = request.prepare(name)?;
        let chunks = ReaderStream::with_capacity(file, upload.chunk_size as usize)
            .map_err(TesseraError::from)
            .boxed();

        self.write_chunks(upload, chunks, expected, request.verify)
            .await
    }

    async fn write_chunks(
        &self,
        upload: FileUpload,
        chunks: ChunkStream,
        expected: u64,
        verify: bool,
    ) -> Result<LargeObject> {
        self.connections
            .run(|store| async move {
                let written = store.upload(upload.clone(), chunks).await?;
                info!(
                    name = %upload.filename,
                    id = %upload.id,
                    bytes = written,
                    "large object written"
                );

                if verify {
                    let actual = collect(store.open_download(&upload.id).await?).await?.len() as u64;
                    if actual != expected {
                        error!(
                            name = %upload.filename,
                            expected,
                            actual,
                            "large object verification failed"
                        );
                        return Err(TesseraError::SizeMismatch { expected, actual });
                    }
                }

                Ok(LargeObject::from_upload(upload, written))
            })
            .await
    }

    /// Whole payload of the latest object named `name`
    pub async fn read(&self, name: &str) -> Result<Bytes> {
        self.connections
            .run(|store| async move { collect(open_by_name(&store, name).await?).await })
            .await
    }

    pub async fn read_by_id(&self, id: &Bson) -> Result<Bytes> {
        self.connections
            .run(|store| async move { collect(store.open_download(id).await?).await })
            .await
    }

    /// Chunk stream of the latest object named `name`
    pub async fn read_stream(&self, name: &str) -> Result<ChunkStream> {
        self.connections
            .run(|store| async move { open_by_name(&store, name).await })
            .await
    }

    /// Descriptor of the latest object named `name`
    pub async fn describe(&self, name: &str) -> Result<LargeObject> {
        self.connections
            .run(|store| async move { store.find_file(name).await })
            .await?
            .map(LargeObject::from)
            .ok_or_else(|| TesseraError::NotFound(format!("no large object named {}", name)))
    }

    pub async fn exists(&self, id: &Bson) -> Result<bool> {
        self.connections
            .run(|store| async move { store.file_exists(id).await })
            .await
    }

    pub async fn remove(&self, id: &Bson) -> Result<()> {
        self.connections
            .run(|store| async move { store.delete_file(id).await })
            .await?;
        info!(%id, "large object removed");
        Ok(())
    }

    /// Whether any stored object carries `name`
    pub async fn is_listed(&self, name: &str) -> Result<bool> {
        Ok(self.list_names().await?.iter().any(|listed| listed == name))
    }

    pub async fn list_names(&self) -> Result<Vec<String>> {
        self.connections
            .run(|store| async move { store.list_file_names().await })
            .await
    }
}

async fn open_by_name(store: &Arc<dyn DocumentStore>, name: &str) -> Result<ChunkStream> {
    match store.open_download_by_name(name).await {
        Err(TesseraError::NotFound(_)) => Err(TesseraError::NotFound(format!(
            "no large object named {}",
            name
        ))),
        other => other,
    }
}

/// Drain a chunk stream; a failed chunk discards everything read so far
async fn collect(mut chunks: ChunkStream) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = chunks.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer.freeze())
}

fn payload_chunks(payload: Bytes, chunk_size: usize) -> ChunkStream {
    let chunks: Vec<Result<Bytes>> = (0..payload.len())
        .step_by(chunk_size)
        .map(|start| Ok(payload.slice(start..(start + chunk_size).min(payload.len()))))
        .collect();
    stream::iter(chunks).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore, StoreCall};
    use bson::doc;

    fn large_objects() -> (Arc<MemoryStore>, LargeObjectStore) {
        let store = Arc::new(MemoryStore::new());
        let connections = Arc::new(ConnectionManager::new(Arc::new(MemoryConnector::new(
            store.clone(),
        ))));
        (store, LargeObjectStore::new(connections))
    }

    #[tokio::test]
    async fn test_payload_chunks() {
        let chunks: Vec<Bytes> = payload_chunks(Bytes::from_static(b"abcdefg"), 3)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abc"),
                Bytes::from_static(b"def"),
                Bytes::from_static(b"g")
            ]
        );
        let empty: Vec<Bytes> = payload_chunks(Bytes::new(), 3).try_collect().await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (store, objects) = large_objects();
        let payload = vec![7u8; 1000];

        let written = objects
            .write(
                LargeObjectWrite::new("report.bin")
                    .payload(payload.clone())
                    .chunk_size(256)
                    .content_type("application/pdf")
                    .metadata(doc! { "owner.team": "ops" }),
            )
            .await
            .unwrap();
        assert_eq!(written.length, 1000);
        assert_eq!(written.content_type, "application/pdf");
        assert_eq!(written.metadata, doc! { "owner": { "team": "ops" } });
        assert_eq!(store.file_chunk_count("report.bin"), Some(4));
        assert_eq!(
            store.file_metadata("report.bin"),
            Some(doc! { "owner": { "team": "ops" }, "contentType": "application/pdf" })
        );

        let read = objects.read("report.bin").await.unwrap();
        assert_eq!(read.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn test_blank_name_rejected_without_store_call() {
        let (store, objects) = large_objects();
        for request in [
            LargeObjectWrite::default().payload(&b"x"[..]),
            LargeObjectWrite::new("   ").payload(&b"x"[..]),
        ] {
            let err = objects.write(request).await.unwrap_err();
            assert_eq!(err, TesseraError::MissingName);
        }
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_to_insert() {
        let (store, objects) = large_objects();
        let err = objects.write(LargeObjectWrite::new("empty")).await.unwrap_err();
        assert_eq!(err, TesseraError::NothingToInsert);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_only_object() {
        let (_, objects) = large_objects();
        let written = objects
            .write(LargeObjectWrite::new("marker").metadata(doc! { "kind": "placeholder" }))
            .await
            .unwrap();
        assert_eq!(written.length, 0);
        assert!(objects.read("marker").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_content_type_from_metadata_survives() {
        let (store, objects) = large_objects();
        let written = objects
            .write(
                LargeObjectWrite::new("notes.txt")
                    .payload(&b"hello"[..])
                    .metadata(doc! { "contentType": "text/plain", "k": 1 }),
            )
            .await
            .unwrap();
        assert_eq!(written.content_type, "text/plain");
        assert_eq!(written.metadata, doc! { "k": 1 });
        assert_eq!(
            store.file_metadata("notes.txt"),
            Some(doc! { "contentType": "text/plain", "k": 1 })
        );

        let described = objects.describe("notes.txt").await.unwrap();
        assert_eq!(described.content_type, "text/plain");

        // An explicit content type still overrides the metadata
        let written = objects
            .write(
                LargeObjectWrite::new("notes.md")
                    .payload(&b"hello"[..])
                    .content_type("text/markdown")
                    .metadata(doc! { "contentType": "text/plain" }),
            )
            .await
            .unwrap();
        assert_eq!(written.content_type, "text/markdown");
    }

    #[tokio::test]
    async fn test_truncating_store_reports_size_mismatch() {
        let (store, objects) = large_objects();
        store.truncate_uploads(10);

        let err = objects
            .write(LargeObjectWrite::new("big").payload(vec![1u8; 64]))
            .await
            .unwrap_err();
        assert_eq!(err, TesseraError::SizeMismatch { expected: 64, actual: 10 });
    }

    #[tokio::test]
    async fn test_verification_opt_out() {
        let (store, objects) = large_objects();
        store.truncate_uploads(10);

        let written = objects
            .write(LargeObjectWrite::new("big").payload(vec![1u8; 64]).verify(false))
            .await
            .unwrap();
        assert_eq!(written.length, 64);
        assert!(!store
            .calls()
            .iter()
            .any(|call| matches!(call, StoreCall::Download { .. })));
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_, objects) = large_objects();
        let err = objects.read("ghost").await.unwrap_err();
        assert_eq!(err, TesseraError::NotFound("no large object named ghost".to_string()));
    }

    #[tokio::test]
    async fn test_read_discards_partial_data() {
        let (store, objects) = large_objects();
        objects
            .write(LargeObjectWrite::new("clip").payload(vec![0u8; 30]).chunk_size(10))
            .await
            .unwrap();
        store.interrupt_downloads_after(1);

        let err = objects.read("clip").await.unwrap_err();
        assert!(matches!(err, TesseraError::Io(_)));
    }

    #[tokio::test]
    async fn test_exists_remove_and_listing() {
        let (_, objects) = large_objects();
        let written = objects
            .write(LargeObjectWrite::new("a.txt").id("file-1").payload(&b"hello"[..]))
            .await
            .unwrap();
        assert_eq!(written.id, Bson::String("file-1".to_string()));

        assert!(objects.exists(&written.id).await.unwrap());
        assert!(objects.is_listed("a.txt").await.unwrap());
        assert_eq!(objects.describe("a.txt").await.unwrap().length, 5);

        objects.remove(&written.id).await.unwrap();
        assert!(!objects.exists(&written.id).await.unwrap());
        assert!(!objects.is_listed("a.txt").await.unwrap());
        assert!(objects.remove(&written.id).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_revision_wins() {
        let (_, objects) = large_objects();
        for body in [&b"first"[..], &b"second"[..]] {
            objects
                .write(LargeObjectWrite::new("notes").payload(body))
                .await
                .unwrap();
        }
        assert_eq!(objects.read("notes").await.unwrap().as_ref(), b"second");
    }

    #[tokio::test]
    async fn test_write_file() {
        let (_, objects) = large_objects();
        let path = std::env::temp_dir().join(format!("tessera-{}.bin", ObjectId::new()));
        tokio::fs::write(&path, vec![3u8; 5000]).await.unwrap();

        let written = objects
            .write_file(&path, LargeObjectWrite::new("upload.bin").chunk_size(1024))
            .await
            .unwrap();
        assert_eq!(written.length, 5000);
        assert_eq!(objects.read("upload.bin").await.unwrap().len(), 5000);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
