//! Thin typed client over the managed store's REST surface.
//!
//! Every table is reachable at `rest/v1/<table>` with filter, order, and
//! limit expressed as query parameters. Reads and writes carry the
//! signed-in user's bearer token plus the publishable API key; row-level
//! authorization happens in the backend, not here.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::utils::url::construct_endpoint_url;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("session expired or missing")]
    Unauthorized,

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("backend returned an empty result where a row was expected")]
    EmptyResult,
}

#[derive(Clone)]
pub struct RecordsClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: Option<String>,
    access_token: String,
}

impl RecordsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        anon_key: Option<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            anon_key,
            access_token: access_token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Swap the bearer token after a refresh without rebuilding resource
    /// handles.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            anon_key: self.anon_key.clone(),
            access_token: access_token.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        construct_endpoint_url(&self.base_url, &format!("rest/v1/{table}"))
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(&self.access_token);
        match &self.anon_key {
            Some(key) => request.header("apikey", key),
            None => request,
        }
    }

    /// `SELECT` rows matching the query parameters.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RecordsError> {
        let response = self
            .apply_auth(self.http.get(self.table_url(table)))
            .query(query)
            .send()
            .await?;
        Self::decode_rows(response).await
    }

    /// Insert one row and return the stored representation.
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<R, RecordsError> {
        let response = self
            .apply_auth(self.http.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let mut rows: Vec<R> = Self::decode_rows(response).await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }

    /// Patch rows matching the filters and return the stored
    /// representations.
    pub async fn update<P: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        patch: &P,
    ) -> Result<Vec<R>, RecordsError> {
        let response = self
            .apply_auth(self.http.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(filters)
            .json(patch)
            .send()
            .await?;
        Self::decode_rows(response).await
    }

    /// Insert-or-update keyed on the table's conflict target (presence
    /// rows are upserted on every heartbeat).
    pub async fn upsert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        on_conflict: &str,
        row: &T,
    ) -> Result<R, RecordsError> {
        let response = self
            .apply_auth(self.http.post(self.table_url(table)))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", on_conflict.to_string())])
            .json(row)
            .send()
            .await?;
        let mut rows: Vec<R> = Self::decode_rows(response).await?;
        if rows.is_empty() {
            return Err(RecordsError::EmptyResult);
        }
        Ok(rows.remove(0))
    }

    async fn decode_rows<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Vec<R>, RecordsError> {
        let status = response.status();
        if status.as_u16() == 401 {
            return Err(RecordsError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %message, "records request failed");
            return Err(RecordsError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

/// Filter helper: PostgREST-style equality, e.g. `eq("hospital_id", id)`.
pub fn eq(column: &'static str, value: impl Into<String>) -> (&'static str, String) {
    (column, format!("eq.{}", value.into()))
}
