// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Directory service request/response wire types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Body of `POST /v1/directory/lookup`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest<'a> {
    pub phone_numbers: Vec<&'a str>,
}

/// Response of `POST /v1/directory/lookup`.
///
/// Numbers the directory does not know are simply absent from `results`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupResponse {
    #[serde(default)]
    pub results: HashMap<String, WireResult>,
}

/// One entry of a lookup response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResult {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub secondary_id: Option<String>,
}

/// Error body returned by the directory on 4xx/5xx.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}
