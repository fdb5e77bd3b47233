// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the directory service.
//!
//! Provides [`DirectoryClient`] which handles request construction, basic
//! authentication, and retry of transient errors.

use std::time::Duration;

use parley_config::model::DirectoryConfig;
use parley_core::types::{AccountSubject, PhoneNumber};
use parley_core::ParleyError;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, LookupRequest, LookupResponse};

/// Delay before retrying a transient failure.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Which remote operation a failure belongs to.
#[derive(Debug, Clone, Copy)]
enum Call {
    Lookup,
    Exists,
}

impl Call {
    fn error(
        self,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> ParleyError {
        match self {
            Call::Lookup => ParleyError::LookupFailed { message, source },
            Call::Exists => ParleyError::ExistenceCheckFailed { message, source },
        }
    }
}

/// HTTP client for directory lookups and existence checks.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
    max_retries: u32,
}

impl DirectoryClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self, ParleyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ParleyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            max_retries: config.max_retries,
        })
    }

    /// Overrides the base URL (wiremock, staging).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    /// Send a request, retrying 429/5xx up to `max_retries` times.
    ///
    /// Any other status is returned to the caller to interpret.
    async fn send(
        &self,
        call: Call,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, ParleyError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, ?call, "retrying directory request after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = self
                .authorize(build())
                .send()
                .await
                .map_err(|e| call.error(format!("HTTP request failed: {e}"), Some(Box::new(e))))?;

            let status = response.status();
            debug!(status = %status, attempt, ?call, "directory response received");

            if !is_transient_error(status) {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "transient directory error");
            last_error = Some(call.error(describe_error(status, &body), None));
        }

        Err(last_error.unwrap_or_else(|| call.error("request failed after retries".into(), None)))
    }

    /// Look up a batch of numbers.
    pub async fn lookup(&self, phone_numbers: &[PhoneNumber]) -> Result<LookupResponse, ParleyError> {
        let url = format!("{}/v1/directory/lookup", self.base_url);
        let body = LookupRequest {
            phone_numbers: phone_numbers.iter().map(PhoneNumber::as_str).collect(),
        };

        let response = self
            .send(Call::Lookup, || self.client.post(&url).json(&body))
            .await?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            Call::Lookup.error(format!("failed to read response body: {e}"), Some(Box::new(e)))
        })?;

        if !status.is_success() {
            return Err(Call::Lookup.error(describe_error(status, &text), None));
        }
        serde_json::from_str(&text).map_err(|e| {
            Call::Lookup.error(format!("failed to parse lookup response: {e}"), Some(Box::new(e)))
        })
    }

    /// Ask whether an account exists for `subject`.
    pub async fn exists(&self, subject: &AccountSubject) -> Result<bool, ParleyError> {
        let url = match subject {
            AccountSubject::Account(account) => self.endpoint(&["v1", "accounts", account.as_str()]),
            AccountSubject::PhoneNumber(phone) => {
                self.endpoint(&["v1", "accounts", "phone", phone.as_str()])
            }
        }
        .map_err(|message| Call::Exists.error(message, None))?;

        let response = self.send(Call::Exists, || self.client.head(url.clone())).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(Call::Exists.error(
                format!("unexpected status {status} checking {subject}"),
                None,
            )),
        }
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| format!("invalid directory base URL `{}`: {e}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|()| format!("directory base URL `{}` cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(api_err) => format!(
            "directory error ({}): {}",
            api_err.error.type_, api_err.error.message
        ),
        Err(_) => format!("directory returned {status}: {body}"),
    }
}
