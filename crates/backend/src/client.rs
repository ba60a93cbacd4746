//! Raw REST client: table operations, stored procedures and auth calls.

use std::time::Duration;

use labprompt_config::BackendConfig;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::BackendError;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A row filter. Only equality is needed by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// The query-string pair: `column=eq.value`.
    pub fn to_query(&self) -> (String, String) {
        (self.column.clone(), format!("eq.{}", self.value))
    }
}

/// PostgREST-style client authenticated with the service-role key.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    service_key: String,
    anon_key: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        let service_key = service_key.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: service_key.clone(),
            service_key,
            client,
        }
    }

    /// Build a client from configuration. Fails unless both the URL and the
    /// service-role key are set.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let (Some(url), Some(key)) = (&config.url, &config.service_role_key) else {
            return Err(BackendError::NotConfigured(
                "backend.url and backend.service_role_key are required".into(),
            ));
        };
        let mut client = Self::new(url, key);
        if let Some(anon) = &config.anon_key {
            client.anon_key = anon.clone();
        }
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn service_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn send_json(&self, request: RequestBuilder, what: &str) -> Result<Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            warn!(status, operation = what, body = %body, "Backend request failed");
            return Err(BackendError::Http {
                status,
                message: error_message(&body),
            });
        }
        debug!(status, operation = what, "Backend request succeeded");

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(format!("{what}: {e}")))
    }

    fn rows(value: Value) -> Vec<Value> {
        match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// `GET /rest/v1/{table}?select=...&col=eq.val`
    pub async fn select(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter],
    ) -> Result<Vec<Value>, BackendError> {
        let mut query = vec![("select".to_string(), columns.to_string())];
        query.extend(filters.iter().map(Filter::to_query));
        let request = self
            .service_request(Method::GET, &self.table_url(table))
            .query(&query);
        Ok(Self::rows(self.send_json(request, "select").await?))
    }

    pub async fn insert(&self, table: &str, row: &Value) -> Result<Vec<Value>, BackendError> {
        let request = self
            .service_request(Method::POST, &self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row);
        Ok(Self::rows(self.send_json(request, "insert").await?))
    }

    pub async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &Value,
    ) -> Result<Vec<Value>, BackendError> {
        let query: Vec<(String, String)> = filters.iter().map(Filter::to_query).collect();
        let request = self
            .service_request(Method::PATCH, &self.table_url(table))
            .header("Prefer", "return=representation")
            .query(&query)
            .json(patch);
        Ok(Self::rows(self.send_json(request, "update").await?))
    }

    /// Insert, or merge into the row that conflicts on `on_conflict`.
    pub async fn upsert(
        &self,
        table: &str,
        row: &Value,
        on_conflict: &str,
    ) -> Result<Vec<Value>, BackendError> {
        let request = self
            .service_request(Method::POST, &self.table_url(table))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .query(&[("on_conflict", on_conflict)])
            .json(row);
        Ok(Self::rows(self.send_json(request, "upsert").await?))
    }

    pub async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        if filters.is_empty() {
            return Err(BackendError::Decode(
                "refusing to delete without a filter".into(),
            ));
        }
        let query: Vec<(String, String)> = filters.iter().map(Filter::to_query).collect();
        let request = self
            .service_request(Method::DELETE, &self.table_url(table))
            .query(&query);
        self.send_json(request, "delete").await?;
        Ok(())
    }

    /// Call a stored procedure: `POST /rest/v1/rpc/{function}`.
    pub async fn rpc(&self, function: &str, args: &Value) -> Result<Value, BackendError> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let request = self.service_request(Method::POST, &url).json(args);
        self.send_json(request, "rpc").await
    }

    /// Resolve an end-user access token: `GET /auth/v1/user`.
    pub async fn auth_user(&self, access_token: &str) -> Result<Value, BackendError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let request = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);
        self.send_json(request, "auth_user").await
    }

    /// Create a user through the admin auth API: `POST /auth/v1/admin/users`.
    pub async fn admin_create_user(&self, body: &Value) -> Result<Value, BackendError> {
        let url = format!("{}/auth/v1/admin/users", self.base_url);
        let request = self.service_request(Method::POST, &url).json(body);
        self.send_json(request, "admin_create_user").await
    }
}

/// Pull a readable message out of a backend error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
