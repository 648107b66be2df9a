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

//! PoP list registry.
//!
//! The list of points of presence is a remote CSV (`id,name`) pulled every
//! ten minutes. An on-demand [`PopRegistry::notify`] triggers an
//! opportunistic pull, suppressed if the last successful pull was less than
//! one minute ago. Readers always see a fully-parsed snapshot; the list is
//! swapped atomically under a read-write lock.

use crate::core::config::{Config, POPS_MIN_PULL_INTERVAL_SECS, POPS_PULL_INTERVAL_SECS};
use crate::net::fetch_text;
use serde::Deserialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// PoP registry errors.
#[derive(Debug, Error)]
pub enum PopError {
    /// `servers.pull_url` is unset; the frontend cannot run without it.
    #[error("servers.pull_url is empty, need it to pull the pop list")]
    MissingUrl,
    /// The CSV document did not parse.
    #[error("parse pop list csv")]
    Parse,
    /// HTTP failure.
    #[error("fetch pop list: {0}")]
    Fetch(String),
}

/// One point of presence.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Pop {
    /// Identifier, used to build the proxy host name.
    pub id: String,
    /// Human-readable location.
    #[serde(rename = "name")]
    pub location: String,
}

/// Parse the PoP CSV (header `id,name`).
pub fn parse_pops_csv(data: &str) -> Result<Vec<Pop>, PopError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    let mut pops = Vec::new();
    for row in reader.deserialize::<Pop>() {
        let pop = row.map_err(|_| PopError::Parse)?;
        pops.push(pop);
    }
    Ok(pops)
}

/// Pulled, atomically swapped PoP list.
pub struct PopRegistry {
    url: String,
    timeout: Duration,
    http: reqwest::Client,
    pops: RwLock<Arc<Vec<Pop>>>,
    last_pull: Mutex<Option<Instant>>,
    notify_tx: mpsc::Sender<()>,
    notify_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl PopRegistry {
    /// Build the registry. A missing pull URL is a fatal config error.
    pub fn new(cfg: &Config) -> Result<Self, PopError> {
        if cfg.servers.pull_url.is_empty() {
            return Err(PopError::MissingUrl);
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PopError::Fetch(e.to_string()))?;
        let (notify_tx, notify_rx) = mpsc::channel(1);
        Ok(Self {
            url: cfg.servers.pull_url.clone(),
            timeout: Duration::from_secs(cfg.servers.timeout),
            http,
            pops: RwLock::new(Arc::new(Vec::new())),
            last_pull: Mutex::new(None),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
        })
    }

    /// Snapshot of the current list.
    pub fn get_all(&self) -> Arc<Vec<Pop>> {
        self.pops
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default()
    }

    /// Case-insensitive id lookup.
    pub fn get_by_id(&self, id: &str) -> Option<Pop> {
        self.get_all()
            .iter()
            .find(|pop| pop.id.eq_ignore_ascii_case(id))
            .cloned()
    }

    /// Request an opportunistic refresh. Never blocks; coalesces with any
    /// pending request.
    pub fn notify(&self) {
        let _ = self.notify_tx.try_send(());
    }

    async fn pull(&self) {
        let url = format!("{}?t={}", self.url, now_unix());
        let body = match fetch_text(&self.http, &url, self.timeout).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "failed to pull pop list");
                return;
            }
        };
        let pops = match parse_pops_csv(&body) {
            Ok(pops) => pops,
            Err(e) => {
                error!(error = %e, "failed to parse pop list");
                return;
            }
        };

        let count = pops.len();
        if let Ok(mut guard) = self.pops.write() {
            *guard = Arc::new(pops);
        }
        if let Ok(mut guard) = self.last_pull.lock() {
            *guard = Some(Instant::now());
        }
        info!(count, url = %self.url, "pulled pop list");
    }

    fn debounced(&self) -> bool {
        self.last_pull
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .map(|at| at.elapsed() < Duration::from_secs(POPS_MIN_PULL_INTERVAL_SECS))
            .unwrap_or(false)
    }

    /// Spawn the pull loop: one eager pull, then every ten minutes, plus
    /// debounced on-demand pulls.
    pub fn spawn_puller(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let this = self;
        tokio::spawn(async move {
            info!("starting pop list pulling");
            let mut notify_rx = match this.notify_rx.lock().ok().and_then(|mut g| g.take()) {
                Some(rx) => rx,
                None => {
                    error!("pop list puller already running");
                    return;
                }
            };

            this.pull().await;

            let mut ticker =
                tokio::time::interval(Duration::from_secs(POPS_PULL_INTERVAL_SECS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.pull().await;
                    }
                    Some(()) = notify_rx.recv() => {
                        if this.debounced() {
                            debug!("skipping pop list pull, min pull interval");
                        } else {
                            debug!("pulling pop list on demand");
                            this.pull().await;
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("stopping pop list pulling");
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

    const CSV: &str = "id,name\nfra1,Frankfurt\nnyc1,New York\n";

    fn registry() -> Arc<PopRegistry> {
        let mut cfg = Config::default();
        cfg.servers.pull_url = "http://127.0.0.1:9/pops.csv".to_string();
        Arc::new(PopRegistry::new(&cfg).unwrap())
    }

    #[test]
    fn missing_url_is_fatal() {
        let cfg = Config::default();
        assert!(matches!(PopRegistry::new(&cfg), Err(PopError::MissingUrl)));
    }

    #[test]
    fn csv_parses_ids_and_locations() {
        let pops = parse_pops_csv(CSV).unwrap();
        assert_eq!(
            pops,
            vec![
                Pop { id: "fra1".to_string(), location: "Frankfurt".to_string() },
                Pop { id: "nyc1".to_string(), location: "New York".to_string() },
            ]
        );
    }

    #[test]
    fn bad_csv_is_an_error() {
        assert!(parse_pops_csv("id,name\n\"broken").is_err());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = registry();
        *registry.pops.write().unwrap() = Arc::new(parse_pops_csv(CSV).unwrap());

        assert_eq!(registry.get_by_id("FRA1").unwrap().location, "Frankfurt");
        assert_eq!(registry.get_by_id("fra1").unwrap().id, "fra1");
        assert!(registry.get_by_id("lhr1").is_none());
    }

    #[test]
    fn empty_registry_reads_as_empty_list() {
        let registry = registry();
        assert!(registry.get_all().is_empty());
    }

    #[test]
    fn debounce_window() {
        let registry = registry();
        assert!(!registry.debounced());
        *registry.last_pull.lock().unwrap() = Some(Instant::now());
        assert!(registry.debounced());
    }
}
