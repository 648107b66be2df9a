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

//! Persistent ASN record tier using sled.
//!
//! Records are stored as plain JSON under `asn:<number>` keys. sled already
//! compresses pages; per-record compression is deliberately not applied.

use crate::asn::AsnRecord;
use thiserror::Error;

/// Disk tier errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
    #[error("record codec")]
    Codec,
}

fn record_key(asn: u32) -> String {
    format!("asn:{asn}")
}

/// Disk tier wrapper.
#[derive(Clone)]
pub struct AsnStore {
    db: sled::Db,
}

impl AsnStore {
    /// Open the sled DB at `path` (a directory).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db })
    }

    /// Fetch one record.
    pub fn get(&self, asn: u32) -> Result<Option<AsnRecord>, StoreError> {
        let Some(raw) = self.db.get(record_key(asn)).map_err(|_| StoreError::DbIo)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&raw).map_err(|_| StoreError::Codec)?;
        Ok(Some(record))
    }

    /// Insert a batch of records atomically.
    pub fn put_batch(&self, records: &[AsnRecord]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for record in records {
            let value = serde_json::to_vec(record).map_err(|_| StoreError::Codec)?;
            batch.insert(record_key(record.asn).as_bytes(), value);
        }
        self.db.apply_batch(batch).map_err(|_| StoreError::DbIo)
    }

    /// Bytes used on disk.
    pub fn size_on_disk(&self) -> Result<u64, StoreError> {
        self.db.size_on_disk().map_err(|_| StoreError::DbIo)
    }

    /// Flush dirty pages to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await.map_err(|_| StoreError::DbIo)?;
        Ok(())
    }
}
