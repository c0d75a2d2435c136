//! Supabase adapter: document rows via PostgREST, audio artifacts via
//! the storage API. One client implements both ports.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{DocumentRecord, DocumentStore, DocumentUpdate, ObjectStorage, StoreError};
use crate::config::Config;

/// Bucket holding produced narration artifacts.
const AUDIO_BUCKET: &str = "documents";

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", &self.service_key))
    }
}

#[async_trait]
impl DocumentStore for SupabaseClient {
    async fn get_document(&self, document_id: &str) -> Result<DocumentRecord, StoreError> {
        let url = format!(
            "{}/rest/v1/documents?id=eq.{}&select=content,summary",
            self.base_url, document_id
        );
        let response = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| StoreError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Service(format!(
                "document fetch failed ({})",
                response.status()
            )));
        }

        let mut rows: Vec<DocumentRecord> = response
            .json()
            .await
            .map_err(|e| StoreError::Service(e.to_string()))?;

        rows.pop()
            .ok_or_else(|| StoreError::NotFound(document_id.to_string()))
    }

    async fn update_document(
        &self,
        document_id: &str,
        update: DocumentUpdate,
    ) -> Result<(), StoreError> {
        let url = format!(
            "{}/rest/v1/documents?id=eq.{}",
            self.base_url, document_id
        );
        let response = self
            .authed(self.http.patch(&url))
            .json(&update)
            .send()
            .await
            .map_err(|e| StoreError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Service(format!(
                "document update failed ({})",
                response.status()
            )));
        }
        debug!(document_id, "document record updated");
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, AUDIO_BUCKET, path
        );
        let response = self
            .authed(self.http.post(&url))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await
            .map_err(|e| StoreError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Service(format!(
                "artifact upload failed ({})",
                response.status()
            )));
        }
        debug!(path, "artifact uploaded");
        Ok(path.to_string())
    }
}
