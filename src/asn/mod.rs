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

//! ASN name cache: two-tier read path plus an out-of-band bulk refresh.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Disk tier over sled.
pub mod store;
/// Two-tier lookup with periodic bulk refresh.
pub mod lookup;
/// DNS/whois fallbacks above the bulk cache.
pub mod fallback;

/// One record of the bulk ASN dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsnRecord {
    /// Autonomous system number.
    pub asn: u32,
    /// Registered name.
    pub name: String,
    /// Classification (optional, may be empty).
    #[serde(default)]
    pub class: String,
    /// Country code (optional, may be empty).
    #[serde(default)]
    pub cc: String,
}

/// Freshness marker for the bulk dataset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AsnMetaIndex {
    /// Dataset generation timestamp (unix seconds).
    pub timestamp: i64,
    /// Dataset version string.
    #[serde(default)]
    pub version: String,
    /// Generation statistics.
    #[serde(default)]
    pub stats: AsnMetaStats,
    /// SHA-256 hex per file name.
    #[serde(default)]
    pub hash_list: HashMap<String, String>,
}

/// Statistics block of the meta index.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AsnMetaStats {
    /// Human-readable generation time.
    #[serde(default)]
    pub generated_at: String,
}
