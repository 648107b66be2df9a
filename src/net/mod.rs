// Copyright (c) 2026 Routelens
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Network boundary collaborators.

use std::time::Duration;
use thiserror::Error;

/// Whois TCP client.
pub mod whois;
/// Traceroute/MTR runner.
pub mod traceroute;

/// Plain fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http: {0}")]
    Http(String),
}

/// Fetch a URL as text with a per-request timeout.
///
/// The body is returned for any HTTP status; callers that care about
/// status-dependent behavior inspect the body themselves.
pub async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    tracing::debug!(url, "fetching url");
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?;
    resp.text().await.map_err(|e| FetchError::Http(e.to_string()))
}
