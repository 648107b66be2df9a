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

//! BGP community definition registry.
//!
//! The RFC-1997/RFC-3765 well-known communities seed the matcher set at
//! startup. Each configured definition list URL is then fetched and added
//! as an additional matcher with its own display prefix, re-pulled every
//! ten minutes. Every refresh builds a complete new matcher list and swaps
//! it atomically; readers only ever observe full lists.

use crate::core::community::CommunityProcessor;
use crate::core::config::{CommunityListEntry, COMMUNITY_PULL_INTERVAL_SECS};
use crate::net::fetch_text;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

/// RFC 1997 / RFC 3765 well-known communities.
const RFC_COMMUNITY_DEFS: &str = "
65535:65281,Do not export the route outside the local AS (RFC1997)
65535:65282,Do not advertise the route to any BGP neighbor (RFC1997)
65535:65283,Do not export the route outside the local confederation (RFC1997)
65535:65284,Suggest not advertising the route to settlement-free peers (RFC3765)
";

/// Community registry errors.
#[derive(Debug, Error)]
pub enum CommunityRegistryError {
    /// HTTP failure fetching a definition list.
    #[error("fetch community list: {0}")]
    Fetch(String),
    /// The built-in matcher set failed to compile.
    #[error("compile community matcher")]
    Compile,
}

/// Hot-swapped set of community matchers.
pub struct CommunityRegistry {
    entries: Vec<CommunityListEntry>,
    timeout: Duration,
    http: reqwest::Client,
    processors: RwLock<Arc<Vec<CommunityProcessor>>>,
}

impl CommunityRegistry {
    /// Build the registry, seeded with the well-known RFC communities.
    pub fn new(entries: Vec<CommunityListEntry>, timeout_secs: u64) -> Result<Self, CommunityRegistryError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CommunityRegistryError::Fetch(e.to_string()))?;
        let seed = CommunityProcessor::new(RFC_COMMUNITY_DEFS, "")
            .map_err(|_| CommunityRegistryError::Compile)?;
        Ok(Self {
            entries,
            timeout: Duration::from_secs(timeout_secs),
            http,
            processors: RwLock::new(Arc::new(vec![seed])),
        })
    }

    /// Snapshot of the current matcher list.
    pub fn snapshot(&self) -> Arc<Vec<CommunityProcessor>> {
        self.processors
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|_| Arc::new(Vec::new()))
    }

    /// Run every matcher over `output`, in registration order.
    pub fn process_output(&self, output: &str) -> String {
        let processors = self.snapshot();
        let mut result = output.to_string();
        for processor in processors.iter() {
            result = processor.format_bgp_text(&result);
        }
        result
    }

    /// Fetch every configured list and swap in a fresh matcher set.
    ///
    /// A failed fetch drops that list from this cycle; the RFC seeds are
    /// always present.
    pub async fn pull(&self) {
        let mut next = Vec::with_capacity(self.entries.len() + 1);
        match CommunityProcessor::new(RFC_COMMUNITY_DEFS, "") {
            Ok(seed) => next.push(seed),
            Err(e) => error!(error = %e, "rfc community seed failed to compile"),
        }

        for entry in &self.entries {
            match fetch_text(&self.http, &entry.url, self.timeout).await {
                Ok(body) => match CommunityProcessor::new(&body, &entry.prefix) {
                    Ok(processor) => {
                        info!(url = %entry.url, prefix = %entry.prefix, "community list fetch ok");
                        next.push(processor);
                    }
                    Err(e) => {
                        error!(url = %entry.url, error = %e, "community list failed to compile");
                    }
                },
                Err(e) => {
                    error!(url = %entry.url, error = %e, "community list fetch failed");
                }
            }
        }

        if let Ok(mut guard) = self.processors.write() {
            *guard = Arc::new(next);
        }
    }

    /// Spawn the pull loop: one eager pull, then every ten minutes.
    pub fn spawn_puller(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let this = self;
        tokio::spawn(async move {
            info!("starting community definition pulling");
            this.pull().await;

            let mut ticker =
                tokio::time::interval(Duration::from_secs(COMMUNITY_PULL_INTERVAL_SECS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.pull().await;
                    }
                    _ = shutdown.changed() => {
                        info!("stopping community definition pulling");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_seeds_active_without_pull() {
        let registry = CommunityRegistry::new(Vec::new(), 5).unwrap();
        let out = registry.process_output("BGP.community: (65535, 65281)");
        assert!(
            out.contains("[Do not export the route outside the local AS (RFC1997)]"),
            "{out}"
        );
    }

    #[test]
    fn snapshot_is_stable_across_swaps() {
        let registry = CommunityRegistry::new(Vec::new(), 5).unwrap();
        let before = registry.snapshot();
        *registry.processors.write().unwrap() = Arc::new(Vec::new());
        // The old snapshot still holds the seeded matcher.
        assert_eq!(before.len(), 1);
        assert!(registry.snapshot().is_empty());
    }
}
