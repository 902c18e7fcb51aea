//! In-process document and file store
//!
//! Mirrors the behaviour the client relies on from the hosted backend:
//! store-assigned ids and millisecond timestamps, `$updatedAt` bumped on every
//! update, ordered listing with `cursorAfter`, and the reverse relationships
//! a user document exposes (`save`, `liked`). Failures and latency can be
//! injected per operation, and every call is recorded for assertions.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    Direction, DocumentId, DocumentStore, Fields, FileStore, Filter, ListQuery, PreviewOptions,
};
use crate::config::CollectionConfig;
use crate::domain::{related_id, Document, FileRef, ImageUpload};
use crate::error::{ClientError, ClientResult};

/// Limit applied when a list query sets none
pub const DEFAULT_LIST_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateDocument,
    GetDocument,
    UpdateDocument,
    DeleteDocument,
    ListDocuments,
    UploadFile,
    DeleteFile,
}

/// Kind of error an injected failure produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Transient,
    NotFound,
    Conflict,
}

impl Failure {
    fn into_error(self, op: StoreOp) -> ClientError {
        match self {
            Failure::Transient => ClientError::RequestFailed(format!("injected failure: {:?}", op)),
            Failure::NotFound => ClientError::NotFound(format!("injected failure: {:?}", op)),
            Failure::Conflict => ClientError::Conflict(format!("injected failure: {:?}", op)),
        }
    }
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCall {
    pub op: StoreOp,
    /// Collection or bucket
    pub target: String,
    pub id: Option<String>,
    pub fields: Option<Fields>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Vec<Document>>,
    files: HashMap<String, Vec<FileRef>>,
    failures: HashMap<StoreOp, (u32, Failure)>,
    calls: Vec<StoreCall>,
    last_timestamp: Option<DateTime<Utc>>,
    next_id: u64,
}

impl Inner {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(3);
        let stamp = match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    fn assign_id(&mut self, id: DocumentId) -> String {
        match id {
            DocumentId::Custom(id) => id,
            DocumentId::Unique => {
                self.next_id += 1;
                format!("{:020x}", self.next_id)
            }
        }
    }

    fn take_failure(&mut self, op: StoreOp) -> Option<ClientError> {
        let (remaining, failure) = self.failures.get_mut(&op)?;
        if *remaining == 0 {
            return None;
        }
        if *remaining != u32::MAX {
            *remaining -= 1;
        }
        Some(failure.into_error(op))
    }

    fn find(&self, collection: &str, id: &str) -> Option<&Document> {
        self.collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
    }
}

/// Deterministic [`DocumentStore`] + [`FileStore`] kept in memory
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    latency: Arc<Mutex<Option<Duration>>>,
    collections: CollectionConfig,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(CollectionConfig::default())
    }
}

impl MemoryStore {
    pub fn new(collections: CollectionConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            latency: Arc::new(Mutex::new(None)),
            collections,
        }
    }

    /// Insert a document as-is, keeping its id and timestamps
    pub fn seed(&self, collection: &str, document: Document) {
        let mut inner = self.inner.lock();
        if let Some(last) = inner.last_timestamp {
            if document.updated_at > last {
                inner.last_timestamp = Some(document.updated_at);
            }
        } else {
            inner.last_timestamp = Some(document.updated_at);
        }
        let docs = inner.collections.entry(collection.to_string()).or_default();
        docs.retain(|d| d.id != document.id);
        docs.push(Document {
            collection_id: collection.to_string(),
            ..document
        });
    }

    /// Build and insert a document from a JSON object of fields
    pub fn seed_fields(
        &self,
        collection: &str,
        id: &str,
        updated_at: DateTime<Utc>,
        fields: Value,
    ) -> Document {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        let document = Document {
            id: id.to_string(),
            collection_id: collection.to_string(),
            created_at: updated_at,
            updated_at,
            fields,
        };
        self.seed(collection, document.clone());
        document
    }

    /// Make the next `times` calls of `op` fail with a transient error
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        self.fail_next_with(op, times, Failure::Transient);
    }

    pub fn fail_next_with(&self, op: StoreOp, times: u32, failure: Failure) {
        self.inner.lock().failures.insert(op, (times, failure));
    }

    /// Make every call of `op` fail until [`MemoryStore::clear_failures`]
    pub fn fail_always(&self, op: StoreOp) {
        self.fail_next(op, u32::MAX);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Delay applied before every call
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn calls_of(&self, op: StoreOp) -> Vec<StoreCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Raw stored document, without relationship expansion
    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner.lock().find(collection, id).cloned()
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn files(&self, bucket: &str) -> Vec<FileRef> {
        self.inner
            .lock()
            .files
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    async fn begin(
        &self,
        op: StoreOp,
        target: &str,
        id: Option<&str>,
        fields: Option<&Fields>,
    ) -> ClientResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock();
        inner.calls.push(StoreCall {
            op,
            target: target.to_string(),
            id: id.map(str::to_string),
            fields: fields.cloned(),
        });

        match inner.take_failure(op) {
            Some(err) => {
                debug!(op = ?op, target, "Injected store failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Attach the reverse relationships of a user document
    fn expand(&self, inner: &Inner, collection: &str, mut doc: Document) -> Document {
        if collection != self.collections.users {
            return doc;
        }

        if !doc.fields.contains_key("save") {
            let saves: Vec<Value> = inner
                .collections
                .get(&self.collections.saves)
                .map(|saves| {
                    saves
                        .iter()
                        .filter(|s| s.relation_id("user").as_deref() == Some(doc.id.as_str()))
                        .map(|s| {
                            json!({
                                "$id": s.id,
                                "$collectionId": s.collection_id,
                                "$createdAt": s.created_at,
                                "$updatedAt": s.updated_at,
                                "post": s.relation_id("post"),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            doc.fields.insert("save".to_string(), Value::Array(saves));
        }

        if !doc.fields.contains_key("liked") {
            let liked: Vec<Value> = inner
                .collections
                .get(&self.collections.posts)
                .map(|posts| {
                    posts
                        .iter()
                        .filter(|p| p.relation_ids("likes").iter().any(|u| *u == doc.id))
                        .map(|p| json!({"$id": p.id}))
                        .collect()
                })
                .unwrap_or_default();
            doc.fields.insert("liked".to_string(), Value::Array(liked));
        }

        doc
    }
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortValue {
    Missing,
    Number(f64),
    Text(String),
    Time(DateTime<Utc>),
}

fn is_time_attribute(attribute: &str) -> bool {
    matches!(attribute, "$createdAt" | "$updatedAt")
}

fn sort_value(doc: &Document, attribute: &str) -> SortValue {
    match attribute {
        "$id" => SortValue::Text(doc.id.clone()),
        "$createdAt" => SortValue::Time(doc.created_at),
        "$updatedAt" => SortValue::Time(doc.updated_at),
        name => match doc.fields.get(name) {
            Some(value) => literal(name, value),
            None => SortValue::Missing,
        },
    }
}

fn literal(attribute: &str, value: &Value) -> SortValue {
    match value {
        Value::Number(n) => n.as_f64().map(SortValue::Number).unwrap_or(SortValue::Missing),
        Value::String(s) if is_time_attribute(attribute) => DateTime::parse_from_rfc3339(s)
            .map(|t| SortValue::Time(t.with_timezone(&Utc)))
            .unwrap_or_else(|_| SortValue::Text(s.clone())),
        Value::String(s) => SortValue::Text(s.clone()),
        Value::Object(_) => related_id(value)
            .map(SortValue::Text)
            .unwrap_or(SortValue::Missing),
        _ => SortValue::Missing,
    }
}

fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::Equal { attribute, value } => {
            let expected = literal(attribute, value);
            match doc.fields.get(attribute) {
                Some(Value::Array(items)) => items.iter().any(|v| literal(attribute, v) == expected),
                _ => sort_value(doc, attribute) == expected,
            }
        }
        Filter::Search { attribute, term } => {
            let haystack = match doc.fields.get(attribute) {
                Some(Value::String(s)) => s.to_lowercase(),
                _ => return false,
            };
            term.split_whitespace()
                .any(|word| haystack.contains(&word.to_lowercase()))
        }
        Filter::LessThan { attribute, value } => {
            let actual = sort_value(doc, attribute);
            actual != SortValue::Missing && actual < literal(attribute, value)
        }
        Filter::LessThanEqual { attribute, value } => {
            let actual = sort_value(doc, attribute);
            actual != SortValue::Missing && actual <= literal(attribute, value)
        }
    }
}

fn compare(a: &Document, b: &Document, query: &ListQuery) -> Ordering {
    for order in &query.orders {
        let ordering = sort_value(a, &order.attribute)
            .partial_cmp(&sort_value(b, &order.attribute))
            .unwrap_or(Ordering::Equal);
        let ordering = match order.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        collection: &str,
        id: DocumentId,
        fields: Fields,
    ) -> ClientResult<Document> {
        self.begin(
            StoreOp::CreateDocument,
            collection,
            Some(id.as_param()),
            Some(&fields),
        )
        .await?;

        let mut inner = self.inner.lock();
        let id = inner.assign_id(id);
        if inner.find(collection, &id).is_some() {
            return Err(ClientError::Conflict(format!("document {}/{}", collection, id)));
        }

        let now = inner.tick();
        let doc = Document {
            id,
            collection_id: collection.to_string(),
            created_at: now,
            updated_at: now,
            fields,
        };
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(doc.clone());

        Ok(self.expand(&inner, collection, doc))
    }

    async fn get_document(&self, collection: &str, id: &str) -> ClientResult<Document> {
        self.begin(StoreOp::GetDocument, collection, Some(id), None)
            .await?;

        let inner = self.inner.lock();
        let doc = inner
            .find(collection, id)
            .cloned()
            .ok_or_else(|| ClientError::not_found(collection, id))?;
        Ok(self.expand(&inner, collection, doc))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> ClientResult<Document> {
        self.begin(StoreOp::UpdateDocument, collection, Some(id), Some(&fields))
            .await?;

        let mut inner = self.inner.lock();
        let now = inner.tick();
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| ClientError::not_found(collection, id))?;

        doc.fields.extend(fields);
        doc.updated_at = now;
        let doc = doc.clone();

        Ok(self.expand(&inner, collection, doc))
    }

    async fn delete_document(&self, collection: &str, id: &str) -> ClientResult<()> {
        self.begin(StoreOp::DeleteDocument, collection, Some(id), None)
            .await?;

        let mut inner = self.inner.lock();
        let docs = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| ClientError::not_found(collection, id))?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Err(ClientError::not_found(collection, id));
        }
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        query: ListQuery,
    ) -> ClientResult<Vec<Document>> {
        self.begin(
            StoreOp::ListDocuments,
            collection,
            query.cursor_after.as_deref(),
            None,
        )
        .await?;

        let inner = self.inner.lock();
        let mut docs = inner.collections.get(collection).cloned().unwrap_or_default();
        // stable: insertion order breaks ties left by the requested ordering
        docs.sort_by(|a, b| compare(a, b, &query));

        if let Some(cursor) = &query.cursor_after {
            let position = docs
                .iter()
                .position(|d| &d.id == cursor)
                .ok_or_else(|| ClientError::not_found(collection, cursor))?;
            docs.drain(..=position);
        }

        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        Ok(docs
            .into_iter()
            .filter(|d| query.filters.iter().all(|f| matches_filter(d, f)))
            .take(limit)
            .map(|d| self.expand(&inner, collection, d))
            .collect())
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn upload_file(
        &self,
        bucket: &str,
        id: DocumentId,
        file: ImageUpload,
    ) -> ClientResult<FileRef> {
        self.begin(StoreOp::UploadFile, bucket, Some(id.as_param()), None)
            .await?;

        let mut inner = self.inner.lock();
        let id = inner.assign_id(id);
        let files = inner.files.entry(bucket.to_string()).or_default();
        if files.iter().any(|f| f.id == id) {
            return Err(ClientError::Conflict(format!("file {}/{}", bucket, id)));
        }

        let file_ref = FileRef {
            id,
            bucket_id: bucket.to_string(),
            name: file.name,
            size: file.bytes.len() as u64,
            mime_type: file.mime_type,
        };
        files.push(file_ref.clone());
        Ok(file_ref)
    }

    async fn delete_file(&self, bucket: &str, file_id: &str) -> ClientResult<()> {
        self.begin(StoreOp::DeleteFile, bucket, Some(file_id), None)
            .await?;

        let mut inner = self.inner.lock();
        let files = inner
            .files
            .get_mut(bucket)
            .ok_or_else(|| ClientError::not_found("file", file_id))?;
        let before = files.len();
        files.retain(|f| f.id != file_id);
        if files.len() == before {
            return Err(ClientError::not_found("file", file_id));
        }
        Ok(())
    }

    fn file_preview_url(
        &self,
        bucket: &str,
        file_id: &str,
        preview: &PreviewOptions,
    ) -> ClientResult<String> {
        Ok(format!(
            "memory://{}/{}/preview?width={}&height={}&gravity={}&quality={}",
            bucket, file_id, preview.width, preview.height, preview.gravity, preview.quality
        ))
    }
}
