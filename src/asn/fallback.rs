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

//! Name lookup above the bulk cache.
//!
//! Chain: bulk cache, then Cymru DNS TXT, then whois, then the literal
//! `AS<n>` string. DNS and whois answers are held in a short-term TTL
//! cache (24h by default) so the slow paths are not hammered.

use crate::asn::lookup::{parse_asn, AsnLookup};
use crate::net::whois::{extract_asn_name, WhoisClient};
use hickory_resolver::TokioAsyncResolver;
use lru_time_cache::LruCache;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Shown when the ASN text itself does not parse.
const LOOKUP_FAILURE: &str = "AS NAME LOOKUP FAILURE";

/// Fallback name resolver.
pub struct AsnResolver {
    bulk: Arc<AsnLookup>,
    cache: Mutex<LruCache<String, String>>,
    dns: Option<TokioAsyncResolver>,
    whois: Option<Arc<dyn WhoisClient>>,
}

/// Parse a Cymru TXT answer: pipe-separated, name in field five,
/// truncated at the first comma.
fn parse_cymru_txt(txt: &str) -> String {
    let parts: Vec<&str> = txt.split('|').collect();
    if parts.len() < 5 {
        return txt.trim().to_string();
    }
    let raw = parts[4].trim();
    raw.split(',').next().unwrap_or(raw).trim().to_string()
}

impl AsnResolver {
    /// Build the resolver chain. DNS comes from the system configuration;
    /// a failure there only disables the DNS step.
    pub fn new(
        bulk: Arc<AsnLookup>,
        whois: Option<Arc<dyn WhoisClient>>,
        cache_ttl: Duration,
    ) -> Self {
        let dns = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => Some(resolver),
            Err(e) => {
                warn!(error = %e, "system resolver unavailable, dns asn fallback disabled");
                None
            }
        };
        Self {
            bulk,
            cache: Mutex::new(LruCache::with_expiry_duration(cache_ttl)),
            dns,
            whois,
        }
    }

    fn cache_get(&self, asn: &str) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(asn).cloned()
    }

    fn cache_put(&self, asn: &str, name: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(asn.to_string(), name.to_string());
        }
    }

    async fn lookup_dns(&self, asn: &str) -> Option<String> {
        let dns = self.dns.as_ref()?;
        let fqdn = format!("as{asn}.asn.cymru.com.");
        let answer = dns.txt_lookup(fqdn).await.ok()?;
        let txt = answer.iter().next()?.to_string();
        let name = parse_cymru_txt(&txt);
        if name.is_empty() {
            return None;
        }
        Some(name)
    }

    async fn lookup_whois(&self, asn: &str) -> Option<String> {
        let whois = self.whois.as_ref()?;
        let txt = whois.query(&format!("AS{asn}")).await.ok()?;
        extract_asn_name(&txt)
    }

    /// Resolve a human name for `asn` (decimal digits, no `AS` prefix).
    ///
    /// Never fails: the final fallback is the literal `AS<n>` string.
    pub async fn lookup_name(&self, asn: &str) -> String {
        let Ok(parsed) = parse_asn(&format!("AS{asn}")) else {
            return LOOKUP_FAILURE.to_string();
        };

        if let Ok(record) = self.bulk.query(parsed) {
            if !record.name.is_empty() {
                return record.name;
            }
        }
        debug!(asn, "bulk asn lookup missed, falling back");

        if let Some(name) = self.cache_get(asn) {
            return name;
        }

        if let Some(name) = self.lookup_dns(asn).await {
            self.cache_put(asn, &name);
            return name;
        }

        if let Some(name) = self.lookup_whois(asn).await {
            self.cache_put(asn, &name);
            return name;
        }

        format!("AS{asn}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn::lookup::AsnLookupConfig;
    use crate::asn::AsnRecord;
    use crate::net::whois::WhoisError;
    use async_trait::async_trait;

    struct ScriptedWhois(String);

    #[async_trait]
    impl WhoisClient for ScriptedWhois {
        async fn query(&self, _q: &str) -> Result<String, WhoisError> {
            Ok(self.0.clone())
        }
    }

    fn bulk(dir: &std::path::Path) -> Arc<AsnLookup> {
        let cfg = AsnLookupConfig {
            data_dir: dir.to_string_lossy().to_string(),
            meta_url: "http://127.0.0.1:9/meta".to_string(),
            data_url: "http://127.0.0.1:9/data".to_string(),
            max_memory_items: 8,
            update_interval: Duration::from_secs(3600),
            http_timeout: Duration::from_secs(1),
            max_concurrent: 2,
        };
        Arc::new(AsnLookup::new(cfg).unwrap())
    }

    fn resolver_without_dns(bulk: Arc<AsnLookup>, whois: Option<Arc<dyn WhoisClient>>) -> AsnResolver {
        let mut resolver = AsnResolver::new(bulk, whois, Duration::from_secs(60));
        resolver.dns = None;
        resolver
    }

    #[test]
    fn cymru_txt_parsing() {
        assert_eq!(
            parse_cymru_txt("64500 | 192.0.2.0/24 | ZZ | ripe | Example Networks, ZZ"),
            "Example Networks"
        );
        assert_eq!(parse_cymru_txt("just text"), "just text");
    }

    #[tokio::test]
    async fn bulk_hit_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = bulk(dir.path());
        lookup
            .store()
            .put_batch(&[AsnRecord {
                asn: 64500,
                name: "BULK-NAME".to_string(),
                class: String::new(),
                cc: String::new(),
            }])
            .unwrap();

        let resolver = resolver_without_dns(lookup, None);
        assert_eq!(resolver.lookup_name("64500").await, "BULK-NAME");
    }

    #[tokio::test]
    async fn whois_fallback_and_ttl_cache() {
        let dir = tempfile::tempdir().unwrap();
        let whois: Arc<dyn WhoisClient> =
            Arc::new(ScriptedWhois("as-name: WHOIS-NAME\n".to_string()));
        let resolver = resolver_without_dns(bulk(dir.path()), Some(whois));

        assert_eq!(resolver.lookup_name("64500").await, "WHOIS-NAME");
        // Second call is served from the TTL cache.
        assert!(resolver.cache_get("64500").is_some());
    }

    #[tokio::test]
    async fn literal_fallback_when_everything_misses() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_without_dns(bulk(dir.path()), None);
        assert_eq!(resolver.lookup_name("64501").await, "AS64501");
    }

    #[tokio::test]
    async fn unparsable_asn_text() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_without_dns(bulk(dir.path()), None);
        assert_eq!(resolver.lookup_name("banana").await, LOOKUP_FAILURE);
    }
}
