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

//! Plain whois client: one TCP query, one response.

use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Whois errors.
#[derive(Debug, Error)]
pub enum WhoisError {
    /// No whois server configured.
    #[error("whois server not configured")]
    NotConfigured,
    /// Dial, write or read failure.
    #[error("whois io: {0}")]
    Io(String),
    /// The server did not answer within the timeout.
    #[error("whois timeout")]
    Timeout,
}

/// Capability to run a whois query. Substitutable in tests.
#[async_trait]
pub trait WhoisClient: Send + Sync {
    /// Query the server and return the raw response text.
    async fn query(&self, q: &str) -> Result<String, WhoisError>;
}

/// TCP whois client against a configured server.
#[derive(Clone, Debug)]
pub struct TcpWhois {
    server: String,
    timeout: Duration,
}

impl TcpWhois {
    /// Build from `host` or `host:port` (`:43` appended when missing).
    /// Returns `None` for an empty server string (whois disabled).
    pub fn from_config(server: &str) -> Option<Self> {
        if server.is_empty() {
            return None;
        }
        let server = if server.contains(':') {
            server.to_string()
        } else {
            format!("{server}:43")
        };
        Some(Self { server, timeout: Duration::from_secs(5) })
    }
}

#[async_trait]
impl WhoisClient for TcpWhois {
    async fn query(&self, q: &str) -> Result<String, WhoisError> {
        let run = async {
            let mut conn = TcpStream::connect(&self.server)
                .await
                .map_err(|e| WhoisError::Io(e.to_string()))?;
            conn.write_all(format!("{q}\r\n").as_bytes())
                .await
                .map_err(|e| WhoisError::Io(e.to_string()))?;
            let mut buf = Vec::with_capacity(4096);
            conn.read_to_end(&mut buf)
                .await
                .map_err(|e| WhoisError::Io(e.to_string()))?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        };
        tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| WhoisError::Timeout)?
    }
}

/// Pull an organisation/AS name out of a whois response.
///
/// Fields are tried in order across the whole response; the first hit wins.
pub fn extract_asn_name(txt: &str) -> Option<String> {
    const FIELDS: [&str; 5] = ["org-name", "OrgName", "as-name", "ASName", "descr"];
    for field in FIELDS {
        let Ok(re) = Regex::new(&format!(r"(?i)^{field}\s*[:=]\s*(.+)$")) else {
            continue;
        };
        for line in txt.lines() {
            if let Some(caps) = re.captures(line.trim()) {
                if let Some(m) = caps.get(1) {
                    return Some(m.as_str().trim().to_string());
                }
            }
        }
    }
    None
}
