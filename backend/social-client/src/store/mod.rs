//! Remote document and file store contract
//!
//! Everything the client persists goes through these two traits. The
//! [`appwrite`] module talks to the hosted backend over HTTP; [`memory`]
//! keeps the same semantics in process for tests and offline runs.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::domain::{Document, FileRef, ImageUpload};
use crate::error::ClientResult;

pub mod appwrite;
pub mod memory;

pub use appwrite::AppwriteStore;
pub use memory::{MemoryStore, StoreOp};

/// Document field map sent on create/update
pub type Fields = Map<String, Value>;

/// Id requested for a new document or file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentId {
    /// Let the store assign one
    Unique,
    Custom(String),
}

impl DocumentId {
    pub fn as_param(&self) -> &str {
        match self {
            DocumentId::Unique => "unique()",
            DocumentId::Custom(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equal { attribute: String, value: Value },
    /// Full-text search on an indexed attribute
    Search { attribute: String, term: String },
    LessThan { attribute: String, value: Value },
    LessThanEqual { attribute: String, value: Value },
}

impl Filter {
    pub fn equal(attribute: &str, value: impl Into<Value>) -> Self {
        Filter::Equal {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn search(attribute: &str, term: &str) -> Self {
        Filter::Search {
            attribute: attribute.to_string(),
            term: term.to_string(),
        }
    }

    pub fn less_than(attribute: &str, value: impl Into<Value>) -> Self {
        Filter::LessThan {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn less_than_equal(attribute: &str, value: impl Into<Value>) -> Self {
        Filter::LessThanEqual {
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }

    pub fn attribute(&self) -> &str {
        match self {
            Filter::Equal { attribute, .. }
            | Filter::Search { attribute, .. }
            | Filter::LessThan { attribute, .. }
            | Filter::LessThanEqual { attribute, .. } => attribute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub attribute: String,
    pub direction: Direction,
}

impl Order {
    pub fn desc(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            direction: Direction::Desc,
        }
    }

    pub fn asc(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            direction: Direction::Asc,
        }
    }
}

/// Filters, ordering and window for `list_documents`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
    pub limit: Option<usize>,
    /// Return only documents after this one in the requested ordering
    pub cursor_after: Option<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cursor_after(mut self, document_id: impl Into<String>) -> Self {
        self.cursor_after = Some(document_id.into());
        self
    }

    /// Render as Appwrite JSON query strings
    pub fn to_query_strings(&self) -> Vec<String> {
        let mut queries = Vec::new();

        for filter in &self.filters {
            let query = match filter {
                Filter::Equal { attribute, value } => {
                    json!({"method": "equal", "attribute": attribute, "values": [value]})
                }
                Filter::Search { attribute, term } => {
                    json!({"method": "search", "attribute": attribute, "values": [term]})
                }
                Filter::LessThan { attribute, value } => {
                    json!({"method": "lessThan", "attribute": attribute, "values": [value]})
                }
                Filter::LessThanEqual { attribute, value } => {
                    json!({"method": "lessThanEqual", "attribute": attribute, "values": [value]})
                }
            };
            queries.push(query.to_string());
        }

        for order in &self.orders {
            let method = match order.direction {
                Direction::Asc => "orderAsc",
                Direction::Desc => "orderDesc",
            };
            queries.push(json!({"method": method, "attribute": order.attribute}).to_string());
        }

        if let Some(limit) = self.limit {
            queries.push(json!({"method": "limit", "values": [limit]}).to_string());
        }

        if let Some(cursor) = &self.cursor_after {
            queries.push(json!({"method": "cursorAfter", "values": [cursor]}).to_string());
        }

        queries
    }
}

/// Image transformation applied when building a preview URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub gravity: String,
    pub quality: u8,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 2000,
            gravity: "top".to_string(),
            quality: 100,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(
        &self,
        collection: &str,
        id: DocumentId,
        fields: Fields,
    ) -> ClientResult<Document>;

    /// `NotFound` if the document does not exist
    async fn get_document(&self, collection: &str, id: &str) -> ClientResult<Document>;

    /// Partial update; only the given fields change
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> ClientResult<Document>;

    async fn delete_document(&self, collection: &str, id: &str) -> ClientResult<()>;

    /// `NotFound` if `query.cursor_after` names a document that does not exist
    async fn list_documents(&self, collection: &str, query: ListQuery)
        -> ClientResult<Vec<Document>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload_file(
        &self,
        bucket: &str,
        id: DocumentId,
        file: ImageUpload,
    ) -> ClientResult<FileRef>;

    async fn delete_file(&self, bucket: &str, file_id: &str) -> ClientResult<()>;

    /// URL of a resized preview; no request is made
    fn file_preview_url(
        &self,
        bucket: &str,
        file_id: &str,
        preview: &PreviewOptions,
    ) -> ClientResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_strings() {
        let query = ListQuery::new()
            .filter(Filter::equal("accountId", "acc-1"))
            .order(Order::desc("$updatedAt"))
            .order(Order::desc("$id"))
            .limit(11)
            .cursor_after("p9");

        let rendered: Vec<Value> = query
            .to_query_strings()
            .iter()
            .map(|q| serde_json::from_str(q).unwrap())
            .collect();

        assert_eq!(
            rendered,
            vec![
                json!({"method": "equal", "attribute": "accountId", "values": ["acc-1"]}),
                json!({"method": "orderDesc", "attribute": "$updatedAt"}),
                json!({"method": "orderDesc", "attribute": "$id"}),
                json!({"method": "limit", "values": [11]}),
                json!({"method": "cursorAfter", "values": ["p9"]}),
            ]
        );
    }

    #[test]
    fn test_document_id_param() {
        assert_eq!(DocumentId::Unique.as_param(), "unique()");
        assert_eq!(DocumentId::Custom("abc".into()).as_param(), "abc");
    }

    #[test]
    fn test_default_preview() {
        let preview = PreviewOptions::default();
        assert_eq!((preview.width, preview.height), (2000, 2000));
        assert_eq!(preview.gravity, "top");
        assert_eq!(preview.quality, 100);
    }
}
