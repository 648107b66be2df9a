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

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

use crate::asn::lookup::AsnStats;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Requests handled by this service.
    pub requests_total: IntCounter,
    /// Requests rejected for bad parameters.
    pub bad_request_total: IntCounter,
    /// Requests rejected for signature failures.
    pub auth_failures_total: IntCounter,
    /// BIRD queries dispatched.
    pub bird_queries_total: IntCounter,
    /// Traceroutes dispatched.
    pub traceroute_total: IntCounter,

    /// ASN cache memory-tier hits.
    pub asn_memory_hits: IntGauge,
    /// ASN cache disk-tier hits.
    pub asn_disk_hits: IntGauge,
    /// ASN cache misses.
    pub asn_misses: IntGauge,
    /// Records currently in the ASN LRU.
    pub asn_memory_size: IntGauge,
    /// Bytes used by the ASN disk tier.
    pub asn_disk_bytes: IntGauge,
    /// Completed ASN dataset refreshes.
    pub asn_refresh_total: IntGauge,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total =
            IntCounter::new("routelens_requests_total", "Requests handled")
                .map_err(|_| MetricsError::Prom)?;
        let bad_request_total =
            IntCounter::new("routelens_bad_request_total", "Requests with bad parameters")
                .map_err(|_| MetricsError::Prom)?;
        let auth_failures_total = IntCounter::new(
            "routelens_auth_failures_total",
            "Requests with failed signatures",
        )
        .map_err(|_| MetricsError::Prom)?;
        let bird_queries_total =
            IntCounter::new("routelens_bird_queries_total", "BIRD queries dispatched")
                .map_err(|_| MetricsError::Prom)?;
        let traceroute_total =
            IntCounter::new("routelens_traceroute_total", "Traceroutes dispatched")
                .map_err(|_| MetricsError::Prom)?;

        let asn_memory_hits =
            IntGauge::new("routelens_asn_memory_hits", "ASN cache memory-tier hits")
                .map_err(|_| MetricsError::Prom)?;
        let asn_disk_hits =
            IntGauge::new("routelens_asn_disk_hits", "ASN cache disk-tier hits")
                .map_err(|_| MetricsError::Prom)?;
        let asn_misses = IntGauge::new("routelens_asn_misses", "ASN cache misses")
            .map_err(|_| MetricsError::Prom)?;
        let asn_memory_size =
            IntGauge::new("routelens_asn_memory_size", "Records in the ASN LRU")
                .map_err(|_| MetricsError::Prom)?;
        let asn_disk_bytes =
            IntGauge::new("routelens_asn_disk_bytes", "Bytes used by the ASN disk tier")
                .map_err(|_| MetricsError::Prom)?;
        let asn_refresh_total =
            IntGauge::new("routelens_asn_refresh_total", "Completed ASN refreshes")
                .map_err(|_| MetricsError::Prom)?;

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(bad_request_total.clone()),
            Box::new(auth_failures_total.clone()),
            Box::new(bird_queries_total.clone()),
            Box::new(traceroute_total.clone()),
            Box::new(asn_memory_hits.clone()),
            Box::new(asn_disk_hits.clone()),
            Box::new(asn_misses.clone()),
            Box::new(asn_memory_size.clone()),
            Box::new(asn_disk_bytes.clone()),
            Box::new(asn_refresh_total.clone()),
        ] {
            registry.register(collector).map_err(|_| MetricsError::Prom)?;
        }

        Ok(Self {
            registry,
            requests_total,
            bad_request_total,
            auth_failures_total,
            bird_queries_total,
            traceroute_total,
            asn_memory_hits,
            asn_disk_hits,
            asn_misses,
            asn_memory_size,
            asn_disk_bytes,
            asn_refresh_total,
        })
    }

    /// Copy ASN cache statistics into the gauges (called at scrape time).
    pub fn observe_asn(&self, stats: &AsnStats) {
        self.asn_memory_hits.set(stats.memory_hits as i64);
        self.asn_disk_hits.set(stats.disk_hits as i64);
        self.asn_misses.set(stats.misses as i64);
        self.asn_memory_size.set(stats.memory_size as i64);
        self.asn_disk_bytes.set(stats.disk_size_bytes as i64);
        self.asn_refresh_total.set(stats.update_count as i64);
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|_| MetricsError::Prom)?;
        String::from_utf8(buf).map_err(|_| MetricsError::Prom)
    }
}
