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

//! Process configuration.
//!
//! Configuration is a TOML file (path from `ROUTELENS_CONFIG`, default
//! `./config.toml`), with a handful of `ROUTELENS_*` environment overrides
//! applied on top. A missing file is not an error; every section has
//! defaults matching a stock deployment.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file")]
    Read,
    #[error("parse config file")]
    Parse,
}

/// Signature validity window for proxy requests, in seconds.
pub const SIGN_VALIDITY_SECS: i64 = 30;
/// PoP list pull interval.
pub const POPS_PULL_INTERVAL_SECS: u64 = 10 * 60;
/// Minimum gap between on-demand PoP list pulls.
pub const POPS_MIN_PULL_INTERVAL_SECS: u64 = 60;
/// BGP community definition pull interval.
pub const COMMUNITY_PULL_INTERVAL_SECS: u64 = 10 * 60;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_bird_socket() -> String {
    "/var/run/bird/bird.ctl".to_string()
}

fn default_proxy_port() -> u16 {
    10179
}

fn default_timeout() -> u64 {
    5
}

fn default_asn_data_dir() -> String {
    "./cache/asn_data".to_string()
}

/// Logging settings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogConfig {
    /// Log level or filter directive, used when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: String,
}

/// Listener settings shared by both binaries.
#[derive(Clone, Debug, Deserialize)]
pub struct NetConfig {
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port. Each binary supplies its own default (1790 / 10179).
    #[serde(default)]
    pub port: Option<u16>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self { host: default_host(), port: None }
    }
}

/// BIRD daemon settings (proxy side).
#[derive(Clone, Debug, Deserialize)]
pub struct BirdConfig {
    /// Path to the BIRD control socket.
    #[serde(default = "default_bird_socket")]
    pub socket: String,
}

impl Default for BirdConfig {
    fn default() -> Self {
        Self { socket: default_bird_socket() }
    }
}

/// ECDSA key material, hex-encoded DER.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthConfig {
    /// Private key (hex SEC1 DER). Required to sign outbound requests.
    #[serde(default)]
    pub privatekey: String,
    /// Public key (hex PKIX SPKI DER). Required on the proxy side.
    #[serde(default)]
    pub publickey: String,
}

/// Upstream server settings (frontend side).
#[derive(Clone, Debug, Deserialize)]
pub struct ServersConfig {
    /// URL of the PoP list CSV. Required by the frontend.
    #[serde(default)]
    pub pull_url: String,
    /// Suffix appended to the PoP id when building the proxy host name.
    #[serde(default)]
    pub proxy_suffix: String,
    /// Proxy agent port.
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    /// Outbound HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Whois server (`host` or `host:port`). Empty disables whois.
    #[serde(default)]
    pub whois: String,
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            pull_url: String::new(),
            proxy_suffix: String::new(),
            proxy_port: default_proxy_port(),
            timeout: default_timeout(),
            whois: String::new(),
        }
    }
}

/// Frontend rendering settings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FrontendConfig {
    /// Protocols whose name matches this regex are hidden from summaries.
    #[serde(default)]
    pub name_filter: String,
}

/// One remote community definition list.
#[derive(Clone, Debug, Deserialize)]
pub struct CommunityListEntry {
    /// Display prefix inserted before matched descriptions.
    #[serde(default)]
    pub prefix: String,
    /// URL of the definition file.
    pub url: String,
}

/// BGP community definition sources.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CommunitiesConfig {
    /// Additional definition lists fetched on top of the RFC seeds.
    #[serde(default)]
    pub list: Vec<CommunityListEntry>,
}

fn default_asn_meta_url() -> String {
    "https://cdn.akaere.online/https://raw.githubusercontent.com/Alice39s/BGP.Tools-OpenDB/refs/heads/auto-update/asns/index-meta.json".to_string()
}

fn default_asn_data_url() -> String {
    "https://cdn.akaere.online/https://raw.githubusercontent.com/Alice39s/BGP.Tools-OpenDB/refs/heads/auto-update/asns/asns.csv.gz".to_string()
}

/// Bulk ASN dataset settings.
#[derive(Clone, Debug, Deserialize)]
pub struct AsnConfig {
    /// Data directory for the disk tier and downloaded files.
    #[serde(default = "default_asn_data_dir")]
    pub data_dir: String,
    /// Meta-index URL.
    #[serde(default = "default_asn_meta_url")]
    pub meta_url: String,
    /// Gzipped CSV URL.
    #[serde(default = "default_asn_data_url")]
    pub data_url: String,
}

impl Default for AsnConfig {
    fn default() -> Self {
        Self {
            data_dir: default_asn_data_dir(),
            meta_url: default_asn_meta_url(),
            data_url: default_asn_data_url(),
        }
    }
}

/// Traceroute invocation settings (proxy side).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TracerouteConfig {
    /// Binary to run. Empty triggers autodetection.
    #[serde(default)]
    pub binary: String,
    /// Flags passed before the target.
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Configuration root.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Listener settings.
    #[serde(default)]
    pub net: NetConfig,
    /// BIRD socket settings.
    #[serde(default)]
    pub bird: BirdConfig,
    /// Signing keys.
    #[serde(default)]
    pub authentication: AuthConfig,
    /// Upstream servers.
    #[serde(default)]
    pub servers: ServersConfig,
    /// Frontend settings.
    #[serde(default)]
    pub frontend: FrontendConfig,
    /// Community definition sources.
    #[serde(default)]
    pub bgp_communities: CommunitiesConfig,
    /// Bulk ASN dataset settings.
    #[serde(default)]
    pub asn: AsnConfig,
    /// Traceroute settings.
    #[serde(default)]
    pub traceroute: TracerouteConfig,
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|_| ConfigError::Parse)
    }

    /// Load from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::Read)?;
        Self::from_toml(&raw)
    }

    /// Load from `ROUTELENS_CONFIG` (default `./config.toml`), tolerating a
    /// missing file, then apply environment overrides.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var("ROUTELENS_CONFIG").unwrap_or_else(|_| "./config.toml".to_string());
        let mut cfg = if Path::new(&path).exists() {
            Self::load(Path::new(&path))?
        } else {
            Self::default()
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Apply `ROUTELENS_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_nonempty("ROUTELENS_NET_HOST") {
            self.net.host = v;
        }
        if let Some(v) = env_nonempty("ROUTELENS_NET_PORT") {
            if let Ok(p) = v.parse::<u16>() {
                self.net.port = Some(p);
            }
        }
        if let Some(v) = env_nonempty("ROUTELENS_AUTH_PRIVATEKEY") {
            self.authentication.privatekey = v;
        }
        if let Some(v) = env_nonempty("ROUTELENS_AUTH_PUBLICKEY") {
            self.authentication.publickey = v;
        }
        if let Some(v) = env_nonempty("ROUTELENS_BIRD_SOCKET") {
            self.bird.socket = v;
        }
        if let Some(v) = env_nonempty("ROUTELENS_SERVERS_PULL_URL") {
            self.servers.pull_url = v;
        }
        if let Some(v) = env_nonempty("ROUTELENS_LOG_LEVEL") {
            self.log.level = v;
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = Config::from_toml("").expect("empty config");
        assert_eq!(cfg.net.host, "0.0.0.0");
        assert_eq!(cfg.net.port, None);
        assert_eq!(cfg.servers.proxy_port, 10179);
        assert_eq!(cfg.servers.timeout, 5);
        assert_eq!(cfg.bird.socket, "/var/run/bird/bird.ctl");
    }

    #[test]
    fn parses_log_level() {
        let cfg = Config::from_toml("[log]\nlevel = \"debug\"\n").expect("config");
        assert_eq!(cfg.log.level, "debug");
        assert!(Config::from_toml("").expect("config").log.level.is_empty());
    }

    #[test]
    fn parses_community_list() {
        let cfg = Config::from_toml(
            r#"
[servers]
pull_url = "https://example.net/pops.csv"
proxy_suffix = ".pop.example.net"

[[bgp_communities.list]]
prefix = "EX"
url = "https://example.net/communities.txt"
"#,
        )
        .expect("config");
        assert_eq!(cfg.servers.pull_url, "https://example.net/pops.csv");
        assert_eq!(cfg.bgp_communities.list.len(), 1);
        assert_eq!(cfg.bgp_communities.list[0].prefix, "EX");
    }
}
