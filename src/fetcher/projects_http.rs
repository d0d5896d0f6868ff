//! HTTP client for the project-management REST API
//!
//! One request per call: rate limits are surfaced as
//! [`FetcherError::RateLimited`] with the server's retry-after hint and never
//! retried here. Suspension is the orchestrator's decision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::extractor::config::DEFAULT_RETRY_AFTER_MS;
use crate::fetcher::{Collection, FetcherError, FetcherResult, PageRequest, SourceClient};
use crate::metrics;
use crate::record::RecordType;
use crate::scope::SyncScope;

/// Production API root
pub const PROJECTS_API_BASE: &str = "https://projectsapi.zoho.com/restapi";

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client for portal, project and record endpoints
pub struct ProjectsHttpClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl ProjectsHttpClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `access_token` - OAuth access token sent as `Zoho-oauthtoken`
    /// * `base_url` - API root, e.g. [`PROJECTS_API_BASE`]
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized
    pub fn new(access_token: impl Into<String>, base_url: impl Into<String>) -> FetcherResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetcherError::HttpError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// API root in use
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Path of a collection relative to the API root
    fn endpoint(collection: &Collection, scope: &SyncScope) -> String {
        let portal = scope.portal_id();
        let project = scope.project_id();
        match collection {
            Collection::Projects => format!("/portal/{portal}/projects/"),
            Collection::Records(record_type) => format!(
                "/portal/{portal}/projects/{project}/{}/",
                Self::segment(*record_type)
            ),
            Collection::Children {
                record_type,
                parent_id,
            } => {
                let parent = record_type.parent().unwrap_or(*record_type);
                format!(
                    "/portal/{portal}/projects/{project}/{}/{parent_id}/comments/",
                    Self::segment(parent)
                )
            }
        }
    }

    fn segment(record_type: RecordType) -> &'static str {
        match record_type {
            RecordType::Users => "users",
            RecordType::Tasks | RecordType::TaskComments => "tasks",
            RecordType::Issues | RecordType::IssueComments => "issues",
        }
    }

    /// Paging and filter parameters; pages map onto 1-based `index`/`range`
    fn query(request: &PageRequest) -> Vec<(&'static str, String)> {
        let index = (request.page.max(1) as usize - 1) * request.page_size + 1;
        let mut params = vec![
            ("index", index.to_string()),
            ("range", request.page_size.to_string()),
        ];

        if let Some(since) = request.modified_since.as_deref() {
            match DateTime::parse_from_rfc3339(since) {
                Ok(ts) => params.push(("last_modified_time", ts.timestamp_millis().to_string())),
                Err(e) => warn!(since, error = %e, "Ignoring unparseable modified-since timestamp"),
            }
        }
        params
    }

    /// Retry-after in milliseconds; accepts delta-seconds or an HTTP date
    fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> u64 {
        let Some(raw) = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok()) else {
            return DEFAULT_RETRY_AFTER_MS;
        };
        let raw = raw.trim();

        if let Ok(seconds) = raw.parse::<u64>() {
            return seconds.saturating_mul(1000);
        }
        match DateTime::parse_from_rfc2822(raw) {
            Ok(at) => (at.with_timezone(&Utc) - now).num_milliseconds().max(0) as u64,
            Err(_) => {
                warn!(retry_after = raw, "Unparseable retry-after header, using default");
                DEFAULT_RETRY_AFTER_MS
            }
        }
    }

    /// Pull a readable message out of an error body
    fn error_message(status: StatusCode, body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .or_else(|| v.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("{status}: {body}"))
    }
}

#[async_trait]
impl SourceClient for ProjectsHttpClient {
    async fn get_page(&self, request: &PageRequest) -> FetcherResult<Value> {
        let url = format!(
            "{}{}",
            self.base_url,
            Self::endpoint(&request.collection, &request.scope)
        );
        let params = Self::query(request);
        let endpoint = request.collection.kind();

        debug!(url = %url, page = request.page, "Requesting page");

        let response = match self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Zoho-oauthtoken {}", self.access_token))
            .query(&params)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                metrics::record_source_request(endpoint, "network_error");
                return Err(FetcherError::NetworkError(e.to_string()));
            }
        };

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics::record_source_request(endpoint, "rate_limited");
            let retry_after_ms = Self::parse_retry_after(response.headers(), Utc::now());
            warn!(url = %url, retry_after_ms, "Source rate limit hit");
            return Err(FetcherError::RateLimited { retry_after_ms });
        }

        // Empty collections come back as 204 without a body
        if status == StatusCode::NO_CONTENT {
            metrics::record_source_request(endpoint, "ok");
            return Ok(Value::Null);
        }

        if status.is_client_error() || status.is_server_error() {
            metrics::record_source_request(endpoint, "error");
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = Self::error_message(status, &body);
            return Err(if status.is_server_error() {
                FetcherError::HttpError(format!("Server error {status}: {message}"))
            } else {
                FetcherError::ApiError(message)
            });
        }

        metrics::record_source_request(endpoint, "ok");
        response
            .json::<Value>()
            .await
            .map_err(|e| FetcherError::ParseError(format!("Failed to deserialize response: {e}")))
    }
}
