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

//! Routelens - a BGP looking-glass gateway.
//!
//! This repository provides:
//! - A line-oriented BIRD control-socket client with restricted-mode handshake
//! - Signed request transport between the frontend and per-PoP proxy agents
//! - Background data planes: PoP list puller, BGP community definitions,
//!   and a two-tier (memory + disk) ASN name cache with bulk refresh
//! - Output annotation (whois links, ASN hovers, community descriptions)
//! - Monitoring via Prometheus metrics and structured logging

/// Core protocol primitives (config, signing, BIRD client, parsers, validators).
pub mod core;
/// ASN name cache: sled disk tier, in-memory LRU, bulk refresh, fallbacks.
pub mod asn;
/// Pulled registries: PoP list and BGP community definitions.
pub mod registry;
/// Network boundary collaborators (HTTP fetch, whois, traceroute).
pub mod net;
/// HTTP services: proxy agent and frontend gateway.
pub mod service;
/// Observability (metrics containers).
pub mod monitoring;
