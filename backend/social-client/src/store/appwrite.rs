use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::{DocumentId, DocumentStore, Fields, FileStore, ListQuery, PreviewOptions};
use crate::config::AppwriteConfig;
use crate::domain::{Document, FileRef, ImageUpload};
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Deserialize)]
struct DocumentList {
    #[allow(dead_code)]
    total: u64,
    documents: Vec<Document>,
}

/// Appwrite REST client
///
/// Sends the project header on every request, plus the API key or user JWT
/// when configured. Each request is bounded by `timeout`.
#[derive(Clone)]
pub struct AppwriteStore {
    http_client: Client,
    endpoint: String,
    project_id: String,
    database_id: String,
    timeout: Duration,
}

impl AppwriteStore {
    pub fn new(config: &AppwriteConfig, timeout: Duration) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("x-appwrite-project", header_value(&config.project_id)?);
        if let Some(key) = &config.api_key {
            headers.insert("x-appwrite-key", header_value(key)?);
        }
        if let Some(jwt) = &config.jwt {
            headers.insert("x-appwrite-jwt", header_value(jwt)?);
        }

        let http_client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            database_id: config.database_id.clone(),
            timeout,
        })
    }

    fn documents_url(&self, collection: &str) -> String {
        format!(
            "{}/databases/{}/collections/{}/documents",
            self.endpoint,
            urlencoding::encode(&self.database_id),
            urlencoding::encode(collection)
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.documents_url(collection), urlencoding::encode(id))
    }

    fn files_url(&self, bucket: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files",
            self.endpoint,
            urlencoding::encode(bucket)
        )
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> ClientResult<Response> {
        let response = resilience::with_timeout_result(self.timeout, async {
            request.send().await.map_err(ClientError::from)
        })
        .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!(status = %status, what, "Appwrite request failed");

        Err(ClientError::from_status(status, what, &body))
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> ClientResult<T> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn header_value(value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::Config(format!("Invalid header value: {}", value)))
}

#[async_trait]
impl DocumentStore for AppwriteStore {
    async fn create_document(
        &self,
        collection: &str,
        id: DocumentId,
        fields: Fields,
    ) -> ClientResult<Document> {
        debug!(collection, id = id.as_param(), "Creating document");

        let request = self
            .http_client
            .post(self.documents_url(collection))
            .json(&json!({"documentId": id.as_param(), "data": fields}));
        let what = format!("create {}/{}", collection, id.as_param());

        Self::json(self.send(request, &what).await?).await
    }

    async fn get_document(&self, collection: &str, id: &str) -> ClientResult<Document> {
        debug!(collection, id, "Fetching document");

        let request = self.http_client.get(self.document_url(collection, id));
        let what = format!("document {}/{}", collection, id);

        Self::json(self.send(request, &what).await?).await
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> ClientResult<Document> {
        debug!(collection, id, "Updating document");

        let request = self
            .http_client
            .patch(self.document_url(collection, id))
            .json(&json!({"data": fields}));
        let what = format!("document {}/{}", collection, id);

        Self::json(self.send(request, &what).await?).await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> ClientResult<()> {
        debug!(collection, id, "Deleting document");

        let request = self.http_client.delete(self.document_url(collection, id));
        self.send(request, &format!("document {}/{}", collection, id))
            .await?;
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        query: ListQuery,
    ) -> ClientResult<Vec<Document>> {
        let queries = query.to_query_strings();
        debug!(collection, queries = ?queries, "Listing documents");

        let params: Vec<(&str, String)> = queries.into_iter().map(|q| ("queries[]", q)).collect();
        let request = self
            .http_client
            .get(self.documents_url(collection))
            .query(&params);
        let what = match &query.cursor_after {
            Some(cursor) => format!("cursor document {}/{}", collection, cursor),
            None => format!("collection {}", collection),
        };

        let list: DocumentList = Self::json(self.send(request, &what).await?).await?;
        Ok(list.documents)
    }
}

#[async_trait]
impl FileStore for AppwriteStore {
    async fn upload_file(
        &self,
        bucket: &str,
        id: DocumentId,
        file: ImageUpload,
    ) -> ClientResult<FileRef> {
        debug!(bucket, name = %file.name, size = file.bytes.len(), "Uploading file");

        let part = Part::bytes(file.bytes)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| ClientError::ValidationFailed(format!("Invalid MIME type: {}", e)))?;
        let form = Form::new()
            .text("fileId", id.as_param().to_string())
            .part("file", part);

        let request = self.http_client.post(self.files_url(bucket)).multipart(form);
        let what = format!("upload {}/{}", bucket, file.name);

        Self::json(self.send(request, &what).await?).await
    }

    async fn delete_file(&self, bucket: &str, file_id: &str) -> ClientResult<()> {
        debug!(bucket, file_id, "Deleting file");

        let url = format!("{}/{}", self.files_url(bucket), urlencoding::encode(file_id));
        self.send(
            self.http_client.delete(url),
            &format!("file {}/{}", bucket, file_id),
        )
        .await?;
        Ok(())
    }

    fn file_preview_url(
        &self,
        bucket: &str,
        file_id: &str,
        preview: &PreviewOptions,
    ) -> ClientResult<String> {
        let raw = format!(
            "{}/{}/preview",
            self.files_url(bucket),
            urlencoding::encode(file_id)
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| ClientError::Config(format!("Invalid preview URL {}: {}", raw, e)))?;

        url.query_pairs_mut()
            .append_pair("width", &preview.width.to_string())
            .append_pair("height", &preview.height.to_string())
            .append_pair("gravity", &preview.gravity)
            .append_pair("quality", &preview.quality.to_string())
            .append_pair("project", &self.project_id);

        Ok(url.to_string())
    }
}
