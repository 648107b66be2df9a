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

//! Two-tier ASN lookup with periodic bulk refresh.
//!
//! ## Read path
//! 1. In-memory LRU (capacity 500 by default); a hit promotes to MRU.
//! 2. sled tier under `asn:<n>`; a hit is inserted into the LRU.
//! 3. Miss.
//!
//! ## Bulk refresh
//! A JSON meta-index carries the dataset timestamp and per-file SHA-256
//! hashes. When the timestamp advances, the gzipped CSV is downloaded,
//! verified, decompressed, verified again, parsed and written to the sled
//! tier in batches of 1000 records, after which the meta-index is persisted
//! and the applied timestamp advances. At most one refresh runs at a time;
//! queries keep being served from existing data throughout.
//!
//! ## Readiness
//! The cache is ready after the first refresh attempt completes, whether it
//! succeeded or not. A failed first refresh just means `NotFound` until a
//! later one succeeds.

use crate::asn::store::{AsnStore, StoreError};
use crate::asn::{AsnMetaIndex, AsnRecord};
use crate::core::config::AsnConfig;
use flate2::read::GzDecoder;
use lru::LruCache;
use std::collections::HashMap;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Lookup errors.
#[derive(Debug, Error)]
pub enum AsnError {
    /// The ASN is in neither tier.
    #[error("asn not found")]
    NotFound,
    /// The ASN text does not parse.
    #[error("invalid asn format")]
    InvalidAsn,
    /// A downloaded file does not match its meta-index hash.
    #[error("hash mismatch for {0}")]
    HashMismatch(String),
    /// Another refresh is already running.
    #[error("update already in progress")]
    RefreshInProgress,
    /// HTTP transport failure.
    #[error("transport: {0}")]
    Transport(String),
    /// Disk tier failure.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Gunzip failure.
    #[error("decompress")]
    Decompress,
    /// Filesystem failure.
    #[error("io")]
    Io,
    /// The batch worker was cancelled at the semaphore.
    #[error("cancelled")]
    Cancelled,
    /// The LRU mutex is poisoned.
    #[error("lock poisoned")]
    Poisoned,
}

/// Parse an `AS<n>` string into a number.
///
/// Leading/trailing whitespace is trimmed and the prefix is
/// case-insensitive; the prefix itself is mandatory.
pub fn parse_asn(s: &str) -> Result<u32, AsnError> {
    let s = s.trim().to_ascii_uppercase();
    let digits = s.strip_prefix("AS").ok_or(AsnError::InvalidAsn)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AsnError::InvalidAsn);
    }
    digits.parse::<u32>().map_err(|_| AsnError::InvalidAsn)
}

/// Tuning knobs for the lookup service.
#[derive(Clone, Debug)]
pub struct AsnLookupConfig {
    /// Data directory (sled tree, downloaded files, metadata.json).
    pub data_dir: String,
    /// Meta-index URL.
    pub meta_url: String,
    /// Gzipped CSV URL.
    pub data_url: String,
    /// LRU capacity.
    pub max_memory_items: usize,
    /// Bulk refresh interval.
    pub update_interval: Duration,
    /// HTTP timeout for dataset downloads.
    pub http_timeout: Duration,
    /// Batch query concurrency bound.
    pub max_concurrent: usize,
}

impl AsnLookupConfig {
    /// Defaults applied over the process configuration.
    pub fn from_config(cfg: &AsnConfig) -> Self {
        Self {
            data_dir: cfg.data_dir.clone(),
            meta_url: cfg.meta_url.clone(),
            data_url: cfg.data_url.clone(),
            max_memory_items: 500,
            update_interval: Duration::from_secs(24 * 60 * 60),
            http_timeout: Duration::from_secs(30),
            max_concurrent: 10,
        }
    }
}

/// Point-in-time statistics.
#[derive(Clone, Debug, Default)]
pub struct AsnStats {
    /// LRU hits.
    pub memory_hits: u64,
    /// Disk tier hits.
    pub disk_hits: u64,
    /// Misses across both tiers.
    pub misses: u64,
    /// Records currently in the LRU.
    pub memory_size: usize,
    /// Bytes used by the disk tier.
    pub disk_size_bytes: u64,
    /// Timestamp of the applied dataset (unix seconds, 0 = none).
    pub last_update: i64,
    /// Completed refreshes.
    pub update_count: u64,
    /// Whether a refresh is in flight.
    pub is_updating: bool,
}

/// Two-tier ASN lookup service.
pub struct AsnLookup {
    cfg: AsnLookupConfig,
    memory: Mutex<LruCache<u32, AsnRecord>>,
    store: AsnStore,
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
    is_updating: AtomicBool,
    last_update: AtomicI64,
    update_count: AtomicU64,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    ready_tx: watch::Sender<bool>,
}

struct UpdateGuard<'a>(&'a AtomicBool);

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(ring::digest::digest(&ring::digest::SHA256, bytes).as_ref())
}

fn verify_hash(bytes: &[u8], expected: Option<&String>, file: &str) -> Result<(), AsnError> {
    let Some(expected) = expected else {
        return Err(AsnError::HashMismatch(file.to_string()));
    };
    if sha256_hex(bytes) != *expected {
        return Err(AsnError::HashMismatch(file.to_string()));
    }
    Ok(())
}

/// Parse the bulk dataset CSV (`ASN,Name,Class,CC`, header row skipped).
///
/// Short rows and rows whose ASN does not parse are skipped.
fn parse_dataset_csv(bytes: &[u8]) -> Vec<AsnRecord> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let mut out = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else {
            continue;
        };
        if record.len() < 4 {
            continue;
        }
        let asn_text = record.get(0).unwrap_or_default().trim();
        let digits = asn_text.strip_prefix("AS").unwrap_or(asn_text);
        let Ok(asn) = digits.parse::<u32>() else {
            continue;
        };
        out.push(AsnRecord {
            asn,
            name: record.get(1).unwrap_or_default().to_string(),
            class: record.get(2).unwrap_or_default().to_string(),
            cc: record.get(3).unwrap_or_default().to_string(),
        });
    }
    out
}

impl AsnLookup {
    /// Open the service: creates the data directory, opens the disk tier
    /// and reloads the applied-dataset timestamp from `metadata.json`.
    pub fn new(cfg: AsnLookupConfig) -> Result<Self, AsnError> {
        std::fs::create_dir_all(&cfg.data_dir).map_err(|_| AsnError::Io)?;

        let db_path = PathBuf::from(&cfg.data_dir).join("db");
        let store = AsnStore::open(db_path.to_string_lossy().as_ref())?;

        let last_update = std::fs::read(PathBuf::from(&cfg.data_dir).join("metadata.json"))
            .ok()
            .and_then(|raw| serde_json::from_slice::<AsnMetaIndex>(&raw).ok())
            .map(|meta| meta.timestamp)
            .unwrap_or_default();

        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .map_err(|e| AsnError::Transport(e.to_string()))?;

        let capacity = NonZeroUsize::new(cfg.max_memory_items.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let (ready_tx, _) = watch::channel(false);

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(cfg.max_concurrent.max(1))),
            memory: Mutex::new(LruCache::new(capacity)),
            store,
            http,
            is_updating: AtomicBool::new(false),
            last_update: AtomicI64::new(last_update),
            update_count: AtomicU64::new(0),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ready_tx,
            cfg,
        })
    }

    /// Look up one ASN through both tiers.
    pub fn query(&self, asn: u32) -> Result<AsnRecord, AsnError> {
        {
            let mut memory = self.memory.lock().map_err(|_| AsnError::Poisoned)?;
            if let Some(record) = memory.get(&asn) {
                self.memory_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(record.clone());
            }
        }

        if let Some(record) = self.store.get(asn)? {
            self.disk_hits.fetch_add(1, Ordering::Relaxed);
            let mut memory = self.memory.lock().map_err(|_| AsnError::Poisoned)?;
            memory.push(asn, record.clone());
            return Ok(record);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Err(AsnError::NotFound)
    }

    /// Look up many ASNs concurrently, bounded by the semaphore.
    ///
    /// `NotFound` entries are silently omitted; any other error is surfaced
    /// after all workers complete.
    pub async fn batch_query(
        self: Arc<Self>,
        asns: &[u32],
    ) -> Result<HashMap<u32, AsnRecord>, AsnError> {
        let mut set = JoinSet::new();
        for &asn in asns {
            let this = Arc::clone(&self);
            set.spawn(async move {
                let _permit = this
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| AsnError::Cancelled)?;
                match this.query(asn) {
                    Ok(record) => Ok(Some((asn, record))),
                    Err(AsnError::NotFound) => Ok(None),
                    Err(e) => Err(e),
                }
            });
        }

        let mut results = HashMap::new();
        let mut first_err = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(Some((asn, record)))) => {
                    results.insert(asn, record);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
                Err(_) => {
                    if first_err.is_none() {
                        first_err = Some(AsnError::Cancelled);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Block until the first refresh attempt has completed.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether the first refresh attempt has completed.
    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Run one refresh cycle. Returns whether new data was applied.
    pub async fn check_and_update(&self) -> Result<bool, AsnError> {
        if self
            .is_updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AsnError::RefreshInProgress);
        }
        let _guard = UpdateGuard(&self.is_updating);

        let meta = self.download_meta().await?;
        if meta.timestamp <= self.last_update.load(Ordering::SeqCst) {
            return Ok(false);
        }

        self.download_and_import(&meta).await?;

        self.last_update.store(meta.timestamp, Ordering::SeqCst);
        self.update_count.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn download_meta(&self) -> Result<AsnMetaIndex, AsnError> {
        let url = format!("{}?t={}", self.cfg.meta_url, now_unix());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AsnError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AsnError::Transport(format!(
                "unexpected status {}",
                resp.status().as_u16()
            )));
        }
        resp.json::<AsnMetaIndex>()
            .await
            .map_err(|e| AsnError::Transport(e.to_string()))
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, AsnError> {
        let url = format!("{}?t={}", url, now_unix());
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AsnError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AsnError::Transport(format!(
                "unexpected status {}",
                resp.status().as_u16()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| AsnError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn download_and_import(&self, meta: &AsnMetaIndex) -> Result<(), AsnError> {
        let data_dir = PathBuf::from(&self.cfg.data_dir);

        let gz = self.download_file(&self.cfg.data_url).await?;
        verify_hash(&gz, meta.hash_list.get("asns.csv.gz"), "asns.csv.gz")?;
        tokio::fs::write(data_dir.join("asns.csv.gz"), &gz)
            .await
            .map_err(|_| AsnError::Io)?;

        let csv_bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, AsnError> {
            let mut out = Vec::new();
            GzDecoder::new(gz.as_slice())
                .read_to_end(&mut out)
                .map_err(|_| AsnError::Decompress)?;
            Ok(out)
        })
        .await
        .map_err(|_| AsnError::Decompress)??;

        verify_hash(&csv_bytes, meta.hash_list.get("asns.csv"), "asns.csv")?;
        tokio::fs::write(data_dir.join("asns.csv"), &csv_bytes)
            .await
            .map_err(|_| AsnError::Io)?;

        let records = parse_dataset_csv(&csv_bytes);
        info!(records = records.len(), "importing asn dataset");
        for chunk in records.chunks(1000) {
            self.store.put_batch(chunk)?;
        }
        self.store.flush().await?;

        let raw = serde_json::to_vec_pretty(meta).map_err(|_| AsnError::Io)?;
        tokio::fs::write(data_dir.join("metadata.json"), raw)
            .await
            .map_err(|_| AsnError::Io)?;
        Ok(())
    }

    /// Spawn the refresh loop: one eager attempt, then the fixed interval.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let this = self;
        tokio::spawn(async move {
            info!("fetching initial asn dataset");
            match this.check_and_update().await {
                Ok(true) => info!("initial asn dataset applied"),
                Ok(false) => info!("asn dataset already current"),
                Err(e) => error!(error = %e, "initial asn dataset fetch failed"),
            }
            // Ready after the first attempt, success or failure.
            let _ = this.ready_tx.send(true);

            let mut ticker = tokio::time::interval(this.cfg.update_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        info!("checking for asn dataset updates");
                        match this.check_and_update().await {
                            Ok(applied) => info!(applied, "asn dataset update completed"),
                            Err(e) => warn!(error = %e, "asn dataset update failed"),
                        }
                    }
                    _ = shutdown.changed() => {
                        this.semaphore.close();
                        return;
                    }
                }
            }
        })
    }

    /// Direct access to the disk tier.
    pub fn store(&self) -> &AsnStore {
        &self.store
    }

    /// Current statistics.
    pub fn stats(&self) -> AsnStats {
        AsnStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_size: self.memory.lock().map(|m| m.len()).unwrap_or_default(),
            disk_size_bytes: self.store.size_on_disk().unwrap_or_default(),
            last_update: self.last_update.load(Ordering::SeqCst),
            update_count: self.update_count.load(Ordering::SeqCst),
            is_updating: self.is_updating.load(Ordering::SeqCst),
        }
    }
}
