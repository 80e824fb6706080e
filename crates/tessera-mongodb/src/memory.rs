//! In-process store backend.
//!
//! Holds collections and chunked large objects in memory and supports the
//! subset of MongoDB filter and update syntax the handler produces. Failures
//! can be injected per collection, for the whole connection, or on the
//! large-object channels, and every call is recorded.

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document as BsonDocument};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tessera_common::{Result, TesseraError};

use crate::store::{
    ChunkStream, Connector, DocumentStore, FileUpload, OperationOptions, StoredFile,
    UpdateOutcome,
};

/// A call received by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Ping,
    ListCollections,
    Find {
        collection: String,
        filter: BsonDocument,
        limit: Option<i64>,
    },
    Insert {
        collection: String,
        document: BsonDocument,
    },
    Update {
        collection: String,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    },
    Upload {
        filename: String,
    },
    Download {
        target: String,
    },
    FindFile {
        filename: String,
    },
    FileExists {
        id: Bson,
    },
    DeleteFile {
        id: Bson,
    },
    ListFiles,
    Close,
}

#[derive(Debug, Clone)]
struct MemoryFile {
    id: Bson,
    filename: String,
    metadata: BsonDocument,
    chunk_size: u32,
    chunks: Vec<Bytes>,
    uploaded_at: DateTime<Utc>,
}

impl MemoryFile {
    fn length(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    fn describe(&self) -> StoredFile {
        StoredFile {
            id: self.id.clone(),
            filename: self.filename.clone(),
            length: self.length(),
            chunk_size: self.chunk_size,
            uploaded_at: self.uploaded_at,
            metadata: Some(self.metadata.clone()),
        }
    }
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Vec<BsonDocument>>,
    files: Vec<MemoryFile>,
    collection_failures: HashMap<String, TesseraError>,
    collection_delays: HashMap<String, Duration>,
    connection_lost: bool,
    closed: bool,
    truncate_uploads_to: Option<usize>,
    interrupt_downloads_after: Option<usize>,
    calls: Vec<StoreCall>,
}

/// In-memory [`DocumentStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection (builder form)
    pub fn with_collection(self, name: &str, documents: Vec<BsonDocument>) -> Self {
        self.add_collection(name, documents);
        self
    }

    /// Seed a collection, appending to any existing documents
    pub fn add_collection(&self, name: &str, documents: Vec<BsonDocument>) {
        self.state
            .lock()
            .collections
            .entry(name.to_string())
            .or_default()
            .extend(documents);
    }

    pub fn documents(&self, collection: &str) -> Vec<BsonDocument> {
        self.state
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Every operation on `collection` fails with `error`
    pub fn fail_collection(&self, collection: &str, error: TesseraError) {
        self.state
            .lock()
            .collection_failures
            .insert(collection.to_string(), error);
    }

    /// Operations on `collection` complete only after `delay`
    pub fn delay_collection(&self, collection: &str, delay: Duration) {
        self.state
            .lock()
            .collection_delays
            .insert(collection.to_string(), delay);
    }

    /// Every call fails with a connection error until restored
    pub fn lose_connection(&self) {
        self.state.lock().connection_lost = true;
    }

    pub fn restore_connection(&self) {
        self.state.lock().connection_lost = false;
    }

    /// Keep only the first `bytes` of every upload while reporting success
    pub fn truncate_uploads(&self, bytes: usize) {
        self.state.lock().truncate_uploads_to = Some(bytes);
    }

    /// Download streams fail after yielding `chunks` chunks
    pub fn interrupt_downloads_after(&self, chunks: usize) {
        self.state.lock().interrupt_downloads_after = Some(chunks);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Make a closed store usable again, as a fresh connection would be
    pub fn reopen(&self) {
        self.state.lock().closed = false;
    }

    /// Stored metadata of the latest object named `filename`
    pub fn file_metadata(&self, filename: &str) -> Option<BsonDocument> {
        self.state
            .lock()
            .files
            .iter()
            .rev()
            .find(|f| f.filename == filename)
            .map(|f| f.metadata.clone())
    }

    /// Number of chunks of the latest object named `filename`
    pub fn file_chunk_count(&self, filename: &str) -> Option<usize> {
        self.state
            .lock()
            .files
            .iter()
            .rev()
            .find(|f| f.filename == filename)
            .map(|f| f.chunks.len())
    }

    /// Record the call and fail if the connection is unusable
    fn enter(&self, call: StoreCall) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.closed {
            return Err(TesseraError::Connection("store is closed".to_string()));
        }
        if state.connection_lost {
            return Err(TesseraError::Connection("connection lost".to_string()));
        }
        Ok(())
    }

    /// Injected delay and failure for a collection
    fn collection_gate(&self, collection: &str) -> (Option<Duration>, Option<TesseraError>) {
        let state = self.state.lock();
        (
            state.collection_delays.get(collection).copied(),
            state.collection_failures.get(collection).cloned(),
        )
    }

    async fn enter_collection(&self, call: StoreCall, collection: &str) -> Result<()> {
        self.enter(call)?;
        let (delay, failure) = self.collection_gate(collection);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn run_find(
        &self,
        collection: &str,
        filter: &BsonDocument,
        options: &OperationOptions,
    ) -> Result<Vec<BsonDocument>> {
        let state = self.state.lock();
        let Some(documents) = state.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for document in documents {
            if matches_filter(document, filter)? {
                found.push(document.clone());
            }
        }
        if let Some(limit) = options.limit.filter(|l| *l != 0) {
            found.truncate(limit.unsigned_abs() as usize);
        }
        Ok(found)
    }

    fn run_insert(&self, collection: &str, document: BsonDocument) -> Result<Bson> {
        let document = with_id(document);
        let id = document.get("_id").cloned().unwrap_or(Bson::Null);

        let mut state = self.state.lock();
        let documents = state.collections.entry(collection.to_string()).or_default();
        if documents.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(TesseraError::Operation(format!(
                "E11000 duplicate key error collection: {} dup key: {{ _id: {} }}",
                collection, id
            )));
        }
        documents.push(document);
        Ok(id)
    }

    fn run_update(
        &self,
        collection: &str,
        filter: &BsonDocument,
        update: &BsonDocument,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let mut state = self.state.lock();
        let documents = state.collections.entry(collection.to_string()).or_default();

        for document in documents.iter_mut() {
            if matches_filter(document, filter)? {
                let modified = apply_update(document, update)?;
                return Ok(UpdateOutcome {
                    matched: 1,
                    modified: u64::from(modified),
                    upserted_id: None,
                });
            }
        }

        if !upsert {
            return Ok(UpdateOutcome {
                matched: 0,
                modified: 0,
                upserted_id: None,
            });
        }

        let mut document = BsonDocument::new();
        for (key, value) in filter {
            if is_literal(value) {
                set_path(&mut document, key, value.clone())?;
            }
        }
        apply_update(&mut document, update)?;
        let document = with_id(document);
        let id = document.get("_id").cloned();
        documents.push(document);

        Ok(UpdateOutcome {
            matched: 0,
            modified: 0,
            upserted_id: id,
        })
    }

    fn store_file(&self, file: FileUpload, payload: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        if state.files.iter().any(|f| f.id == file.id) {
            return Err(TesseraError::Operation(format!(
                "E11000 duplicate key error collection: fs.files dup key: {{ _id: {} }}",
                file.id
            )));
        }

        let payload = match state.truncate_uploads_to {
            Some(limit) if payload.len() > limit => payload.slice(..limit),
            _ => payload,
        };
        let chunk_size = file.chunk_size.max(1) as usize;
        let chunks = (0..payload.len())
            .step_by(chunk_size)
            .map(|start| payload.slice(start..(start + chunk_size).min(payload.len())))
            .collect();

        state.files.push(MemoryFile {
            id: file.id,
            filename: file.filename,
            metadata: file.metadata,
            chunk_size: file.chunk_size,
            chunks,
            uploaded_at: Utc::now(),
        });
        Ok(())
    }

    fn download(&self, select: impl Fn(&MemoryFile) -> bool, missing: String) -> Result<ChunkStream> {
        let state = self.state.lock();
        let file = state
            .files
            .iter()
            .rev()
            .find(|f| select(f))
            .ok_or(TesseraError::NotFound(missing))?;

        let mut items: Vec<Result<Bytes>> = file.chunks.iter().cloned().map(Ok).collect();
        if let Some(after) = state.interrupt_downloads_after {
            if after < items.len() {
                items.truncate(after);
                items.push(Err(TesseraError::Io("download interrupted".to_string())));
            }
        }
        Ok(stream::iter(items).boxed())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.enter(StoreCall::Ping)
    }

    async fn list_collection_names(&self) -> Result<Vec<String>> {
        self.enter(StoreCall::ListCollections)?;
        Ok(self.state.lock().collections.keys().cloned().collect())
    }

    async fn find(
        &self,
        collection: &str,
        filter: BsonDocument,
        options: &OperationOptions,
    ) -> Result<Vec<BsonDocument>> {
        let call = StoreCall::Find {
            collection: collection.to_string(),
            filter: filter.clone(),
            limit: options.limit,
        };
        self.enter_collection(call, collection).await?;
        self.run_find(collection, &filter, options)
    }

    async fn insert_one(
        &self,
        collection: &str,
        document: BsonDocument,
        _options: &OperationOptions,
    ) -> Result<Bson> {
        let call = StoreCall::Insert {
            collection: collection.to_string(),
            document: document.clone(),
        };
        self.enter_collection(call, collection).await?;
        self.run_insert(collection, document)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: BsonDocument,
        update: BsonDocument,
        options: &OperationOptions,
    ) -> Result<UpdateOutcome> {
        let upsert = options.upsert.unwrap_or(false);
        let call = StoreCall::Update {
            collection: collection.to_string(),
            filter: filter.clone(),
            update: update.clone(),
            upsert,
        };
        self.enter_collection(call, collection).await?;
        self.run_update(collection, &filter, &update, upsert)
    }

    async fn upload(&self, file: FileUpload, mut chunks: ChunkStream) -> Result<u64> {
        self.enter(StoreCall::Upload {
            filename: file.filename.clone(),
        })?;

        let mut payload = BytesMut::new();
        while let Some(chunk) = chunks.next().await {
            payload.extend_from_slice(&chunk?);
        }
        let written = payload.len() as u64;

        self.store_file(file, payload.freeze())?;
        Ok(written)
    }

    async fn open_download_by_name(&self, filename: &str) -> Result<ChunkStream> {
        self.enter(StoreCall::Download {
            target: filename.to_string(),
        })?;
        self.download(
            |f| f.filename == filename,
            format!("no large object named {}", filename),
        )
    }

    async fn open_download(&self, id: &Bson) -> Result<ChunkStream> {
        self.enter(StoreCall::Download {
            target: id.to_string(),
        })?;
        self.download(|f| &f.id == id, format!("no large object with id {}", id))
    }

    async fn find_file(&self, filename: &str) -> Result<Option<StoredFile>> {
        self.enter(StoreCall::FindFile {
            filename: filename.to_string(),
        })?;
        let state = self.state.lock();
        Ok(state
            .files
            .iter()
            .rev()
            .find(|f| f.filename == filename)
            .map(MemoryFile::describe))
    }

    async fn file_exists(&self, id: &Bson) -> Result<bool> {
        self.enter(StoreCall::FileExists { id: id.clone() })?;
        Ok(self.state.lock().files.iter().any(|f| &f.id == id))
    }

    async fn delete_file(&self, id: &Bson) -> Result<()> {
        self.enter(StoreCall::DeleteFile { id: id.clone() })?;
        let mut state = self.state.lock();
        let before = state.files.len();
        state.files.retain(|f| &f.id != id);
        if state.files.len() == before {
            return Err(TesseraError::NotFound(format!(
                "no large object with id {}",
                id
            )));
        }
        Ok(())
    }

    async fn list_file_names(&self) -> Result<Vec<String>> {
        self.enter(StoreCall::ListFiles)?;
        Ok(self
            .state
            .lock()
            .files
            .iter()
            .map(|f| f.filename.clone())
            .collect())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall::Close);
        state.closed = true;
        Ok(())
    }
}

/// Hands out one shared [`MemoryStore`], counting connects
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    connects: AtomicUsize,
    refuse: AtomicBool,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Number of successful connects so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(AtomicOrdering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        if self.refuse.load(AtomicOrdering::SeqCst) {
            return Err(TesseraError::Connection("connection refused".to_string()));
        }
        self.store.reopen();
        self.connects.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.store.clone())
    }

    fn target(&self) -> String {
        "memory://".to_string()
    }
}

// ============================================================================
// Filter and update evaluation
// ============================================================================

fn with_id(document: BsonDocument) -> BsonDocument {
    if document.contains_key("_id") {
        return document;
    }
    let mut with_id = BsonDocument::new();
    with_id.insert("_id", ObjectId::new());
    with_id.extend(document);
    with_id
}

/// Values in a filter that an upsert copies into the new document
fn is_literal(value: &Bson) -> bool {
    match value {
        Bson::RegularExpression(_) => false,
        Bson::Document(doc) => !is_operator_document(doc),
        _ => true,
    }
}

fn is_operator_document(doc: &BsonDocument) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn lookup<'a>(document: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn matches_filter(document: &BsonDocument, filter: &BsonDocument) -> Result<bool> {
    for (key, expected) in filter {
        if key.starts_with('$') {
            return Err(TesseraError::Operation(format!(
                "unsupported query operator {}",
                key
            )));
        }
        if !value_matches(lookup(document, key), expected)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn value_matches(actual: Option<&Bson>, expected: &Bson) -> Result<bool> {
    match expected {
        Bson::RegularExpression(regex) => regex_matches(actual, &regex.pattern, &regex.options),
        Bson::Document(ops) if is_operator_document(ops) => operators_match(actual, ops),
        _ => Ok(match actual {
            Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
                items.iter().any(|item| bson_eq(item, expected))
            }
            Some(value) => bson_eq(value, expected),
            None => matches!(expected, Bson::Null),
        }),
    }
}

fn operators_match(actual: Option<&Bson>, ops: &BsonDocument) -> Result<bool> {
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => value_matches(actual, operand)?,
            "$ne" => !value_matches(actual, operand)?,
            "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
            "$in" => match operand {
                Bson::Array(candidates) => {
                    let mut any = false;
                    for candidate in candidates {
                        if value_matches(actual, candidate)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                _ => return Err(TesseraError::Operation("$in needs an array".to_string())),
            },
            "$gt" => compare(actual, operand) == Some(Ordering::Greater),
            "$gte" => matches!(compare(actual, operand), Some(Ordering::Greater | Ordering::Equal)),
            "$lt" => compare(actual, operand) == Some(Ordering::Less),
            "$lte" => matches!(compare(actual, operand), Some(Ordering::Less | Ordering::Equal)),
            "$regex" => match operand {
                Bson::String(pattern) => {
                    let options = ops.get_str("$options").unwrap_or_default();
                    regex_matches(actual, pattern, options)?
                }
                Bson::RegularExpression(regex) => {
                    regex_matches(actual, &regex.pattern, &regex.options)?
                }
                _ => return Err(TesseraError::Operation("$regex needs a string".to_string())),
            },
            "$options" => true,
            other => {
                return Err(TesseraError::Operation(format!(
                    "unsupported query operator {}",
                    other
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn regex_matches(actual: Option<&Bson>, pattern: &str, options: &str) -> Result<bool> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| TesseraError::Operation(format!("invalid regular expression: {}", e)))?;

    Ok(match actual {
        Some(Bson::String(value)) => regex.is_match(value),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(value) if regex.is_match(value))),
        _ => false,
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn bson_eq(left: &Bson, right: &Bson) -> bool {
    match (as_f64(left), as_f64(right)) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(actual: Option<&Bson>, operand: &Bson) -> Option<Ordering> {
    let actual = actual?;
    if let (Some(l), Some(r)) = (as_f64(actual), as_f64(operand)) {
        return l.partial_cmp(&r);
    }
    match (actual, operand) {
        (Bson::String(l), Bson::String(r)) => Some(l.cmp(r)),
        (Bson::DateTime(l), Bson::DateTime(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn set_path(document: &mut BsonDocument, path: &str, value: Bson) -> Result<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, BsonDocument::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(child)) => set_path(child, rest, value),
                _ => Err(TesseraError::Operation(format!(
                    "cannot create field {} in a non-document value",
                    path
                ))),
            }
        }
    }
}

fn unset_path(document: &mut BsonDocument, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}

/// Apply `$set`, `$unset` and `$inc`; returns whether the document changed
fn apply_update(document: &mut BsonDocument, update: &BsonDocument) -> Result<bool> {
    let before = document.clone();

    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(TesseraError::Operation(format!(
                "modifier {} needs a document",
                op
            )));
        };
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    let current = lookup(document, path).cloned().unwrap_or(Bson::Int32(0));
                    let next = match (&current, delta) {
                        (Bson::Int32(a), Bson::Int32(b)) => Bson::Int32(a + b),
                        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
                        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
                        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
                        _ => match (as_f64(&current), as_f64(delta)) {
                            (Some(a), Some(b)) => Bson::Double(a + b),
                            _ => {
                                return Err(TesseraError::Operation(format!(
                                    "cannot increment non-numeric field {}",
                                    path
                                )))
                            }
                        },
                    };
                    set_path(document, path, next)?;
                }
            }
            other if other.starts_with('$') => {
                return Err(TesseraError::Operation(format!(
                    "unsupported update operator {}",
                    other
                )))
            }
            _ => {
                return Err(TesseraError::Operation(
                    "update document requires atomic operators".to_string(),
                ))
            }
        }
    }

    Ok(*document != before)
}
