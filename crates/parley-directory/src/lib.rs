// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP directory adapter for the Parley identity subsystem.
//!
//! This crate implements [`DirectoryAdapter`] against the directory service's
//! JSON lookup endpoint and HEAD-based existence checks.

pub mod client;
pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;
use parley_config::model::DirectoryConfig;
use parley_core::error::ParleyError;
use parley_core::traits::{DirectoryAdapter, PluginAdapter};
use parley_core::types::{
    AccountId, AccountSubject, AdapterType, HealthStatus, LookupResult, PhoneNumber,
};
use tracing::{debug, info, warn};

use crate::client::DirectoryClient;
use crate::types::LookupResponse;

/// Remote directory reached over HTTP, implementing [`DirectoryAdapter`].
pub struct HttpDirectory {
    client: DirectoryClient,
}

impl HttpDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self, ParleyError> {
        let client = DirectoryClient::new(config)?;
        info!(base_url = client.base_url(), "HTTP directory initialized");
        Ok(Self { client })
    }

    /// Creates a directory adapter pointing at a custom base URL.
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }
}

#[async_trait]
impl PluginAdapter for HttpDirectory {
    fn name(&self) -> &str {
        "http-directory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Directory
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // No health endpoint; a lookup would count against the rate limit.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("HTTP directory shutting down");
        Ok(())
    }
}

#[async_trait]
impl DirectoryAdapter for HttpDirectory {
    async fn lookup(
        &self,
        phone_numbers: &[PhoneNumber],
    ) -> Result<HashMap<PhoneNumber, LookupResult>, ParleyError> {
        if phone_numbers.is_empty() {
            return Ok(HashMap::new());
        }
        let response = self.client.lookup(phone_numbers).await?;
        Ok(convert_results(phone_numbers, response))
    }

    async fn exists(&self, subject: &AccountSubject) -> Result<bool, ParleyError> {
        self.client.exists(subject).await
    }
}

/// Convert the wire map into typed results.
///
/// Entries without an account id, with an unparseable key or id, or for a
/// number that was not requested are dropped.
fn convert_results(
    requested: &[PhoneNumber],
    response: LookupResponse,
) -> HashMap<PhoneNumber, LookupResult> {
    let mut results = HashMap::with_capacity(response.results.len());

    for (raw_phone, wire) in response.results {
        let phone = match PhoneNumber::parse(&raw_phone) {
            Ok(phone) => phone,
            Err(e) => {
                warn!(error = %e, "dropping lookup result with invalid phone number");
                continue;
            }
        };
        if !requested.contains(&phone) {
            debug!(phone = %phone, "ignoring lookup result for unrequested number");
            continue;
        }
        let Some(raw_account) = wire.account_id.filter(|a| !a.trim().is_empty()) else {
            continue;
        };
        let account_id = match AccountId::parse(&raw_account) {
            Ok(account_id) => account_id,
            Err(e) => {
                warn!(phone = %phone, error = %e, "dropping lookup result with invalid account id");
                continue;
            }
        };
        let secondary_id = wire.secondary_id.filter(|s| !s.is_empty());
        results.insert(phone, LookupResult { account_id, secondary_id });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WireResult;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn phone(raw: &str) -> PhoneNumber {
        PhoneNumber::parse(raw).unwrap()
    }

    fn wire(account: Option<&str>, secondary: Option<&str>) -> WireResult {
        WireResult {
            account_id: account.map(str::to_string),
            secondary_id: secondary.map(str::to_string),
        }
    }

    #[test]
    fn adapter_identity() {
        let directory = HttpDirectory::new(&DirectoryConfig::default()).unwrap();
        assert_eq!(directory.name(), "http-directory");
        assert_eq!(directory.adapter_type(), AdapterType::Directory);
    }

    #[test]
    fn conversion_normalizes_and_filters() {
        let requested = [phone("+13215559876"), phone("+16545559876"), phone("+17775550000")];
        let mut response = LookupResponse::default();
        response
            .results
            .insert("+1 321 555 9876".into(), wire(Some("ABC-1"), Some("sec-1")));
        // Secondary-only results carry no account.
        response
            .results
            .insert("+16545559876".into(), wire(None, Some("sec-2")));
        response.results.insert("+17775550000".into(), wire(Some("  "), None));
        response.results.insert("garbage".into(), wire(Some("x"), None));
        response.results.insert("+19995550000".into(), wire(Some("extra"), None));

        let results = convert_results(&requested, response);

        assert_eq!(results.len(), 1);
        let hit = &results[&phone("+13215559876")];
        assert_eq!(hit.account_id.as_str(), "abc-1");
        assert_eq!(hit.secondary_id.as_deref(), Some("sec-1"));
    }

    #[tokio::test]
    async fn empty_batch_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let directory = HttpDirectory::new(&DirectoryConfig::default())
            .unwrap()
            .with_base_url(&server.uri());
        assert!(directory.lookup(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_through_adapter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/directory/lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "+13215559876": {"accountId": "acct-1", "secondaryId": "s1"},
                    "+16545559876": {}
                }
            })))
            .mount(&server)
            .await;

        let directory = HttpDirectory::new(&DirectoryConfig::default())
            .unwrap()
            .with_base_url(&server.uri());
        let results = directory
            .lookup(&[phone("+13215559876"), phone("+16545559876")])
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[&phone("+13215559876")].account_id.as_str(), "acct-1");
    }

    #[tokio::test]
    async fn exists_through_adapter() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/v1/accounts/acct-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let directory = HttpDirectory::new(&DirectoryConfig::default())
            .unwrap()
            .with_base_url(&server.uri());
        let subject = AccountSubject::Account(AccountId::parse("acct-1").unwrap());
        assert!(!directory.exists(&subject).await.unwrap());
    }
}
