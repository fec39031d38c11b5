//! Object-storage REST backend.
//!
//! Speaks the storage API used by the hosted backend the map app runs on:
//! objects live under `/storage/v1/object/<bucket>/<path>`, folders are implied by
//! path prefixes and show up in listings with a null `id`.

use std::sync::OnceLock;

use anyhow::Result;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use super::{BlobEntry, BlobError, BlobStore};

const LIST_LIMIT: usize = 1000;

pub struct HttpBlobStore {
    base_url: String,
    bucket: String,
    service_key: String,
    // Built on first use: the blocking client must not be constructed on an async worker.
    client: OnceLock<Client>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
    id: Option<String>,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, bucket: &str, service_key: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
            client: OnceLock::new(),
        })
    }

    fn client(&self) -> &Client {
        self.client.get_or_init(Client::new)
    }

    fn object_url(&self, rest: &str) -> String {
        format!("{}/storage/v1/object/{rest}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    /// Map a non-success response to a [`BlobError`], recognising "already exists"
    /// and "not found" bodies.
    fn check(&self, response: Response, path: &str) -> Result<Response, BlobError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        let lower = message.to_lowercase();
        if status.as_u16() == 409 || lower.contains("already exists") {
            return Err(BlobError::AlreadyExists(path.to_string()));
        }
        if status.as_u16() == 404 || lower.contains("not found") {
            return Err(BlobError::NotFound(path.to_string()));
        }
        Err(BlobError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

impl BlobStore for HttpBlobStore {
    fn remove(&self, path: &str) -> Result<(), BlobError> {
        let url = self.object_url(&self.bucket);
        let response = self
            .authorized(self.client().delete(&url))
            .json(&json!({ "prefixes": [path] }))
            .send()?;
        tolerate_missing(self.check(response, path).map(drop))
    }

    fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        let url = self.object_url("copy");
        let response = self
            .authorized(self.client().post(&url))
            .json(&json!({
                "bucketId": self.bucket,
                "sourceKey": from,
                "destinationKey": to,
            }))
            .send()?;
        self.check(response, to)?;
        Ok(())
    }

    fn upload(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobError> {
        let url = self.object_url(&format!("{}/{path}", self.bucket));
        let response = self
            .authorized(self.client().post(&url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes.to_vec())
            .send()?;
        self.check(response, path)?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, BlobError> {
        let url = self.object_url(&format!("list/{}", self.bucket));
        let items = collect_pages(LIST_LIMIT, |offset| {
            let response = self
                .authorized(self.client().post(&url))
                .json(&json!({
                    "prefix": prefix,
                    "limit": LIST_LIMIT,
                    "offset": offset,
                    "sortBy": { "column": "name", "order": "asc" },
                }))
                .send()?;
            Ok(self.check(response, prefix)?.json::<Vec<ListItem>>()?)
        })?;
        Ok(items
            .into_iter()
            .map(|item| BlobEntry {
                is_folder: item.id.is_none(),
                name: item.name,
            })
            .collect())
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        let url = self.object_url(&format!("{}/{path}", self.bucket));
        let response = self.authorized(self.client().get(&url)).send()?;
        Ok(self.check(response, path)?.bytes()?.to_vec())
    }
}

/// A missing object is already removed.
fn tolerate_missing(result: Result<(), BlobError>) -> Result<(), BlobError> {
    match result {
        Err(BlobError::NotFound(path)) => {
            tracing::debug!(%path, "remove: object already absent");
            Ok(())
        }
        other => other,
    }
}

/// Fetch pages of `limit` items until a short page comes back.
fn collect_pages<T, F>(limit: usize, mut fetch: F) -> Result<Vec<T>, BlobError>
where
    F: FnMut(usize) -> Result<Vec<T>, BlobError>,
{
    let mut items = Vec::new();
    loop {
        let page = fetch(items.len())?;
        let done = page.len() < limit;
        items.extend(page);
        if done {
            return Ok(items);
        }
    }
}
