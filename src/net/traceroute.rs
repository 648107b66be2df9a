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

//! Traceroute boundary: external binary invocation plus formatting.
//!
//! At startup the proxy autodetects a working binary by probing
//! `127.0.0.1`: a configured binary first, then `mtr`, then `traceroute`
//! with progressively simpler flag sets. When nothing works the endpoints
//! report traceroute as unsupported.

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::core::config::TracerouteConfig;

/// Traceroute errors.
#[derive(Debug, Error)]
pub enum TracerouteError {
    /// Empty query.
    #[error("empty target for traceroute")]
    EmptyTarget,
    /// The query does not split into shell words.
    #[error("malformed target for traceroute")]
    MalformedTarget,
    /// No working binary was detected.
    #[error("traceroute binary not configured")]
    NotSupported,
    /// The binary ran but failed.
    #[error("{0}")]
    Failed(String),
    /// The HTML view needs mtr JSON output.
    #[error("html traceroute requires mtr")]
    HtmlNotSupported,
    /// mtr JSON output did not parse.
    #[error("parse mtr output")]
    ParseOutput,
}

/// One traceroute hop.
#[derive(Clone, Debug, PartialEq)]
pub struct MtrHop {
    /// Time-to-live (hop index).
    pub ttl: u32,
    /// Responding address, `???` when unanswered.
    pub address_to: String,
    /// Whether the hop answered.
    pub success: bool,
    /// Probes sent.
    pub snt: u32,
    /// Loss percentage.
    pub loss: f64,
    /// Last round-trip time (ms).
    pub last: f64,
    /// Average round-trip time (ms).
    pub avg: f64,
    /// Best round-trip time (ms).
    pub best: f64,
    /// Worst round-trip time (ms).
    pub worst: f64,
}

/// A parsed traceroute run.
#[derive(Clone, Debug, Default)]
pub struct MtrResult {
    /// Destination address.
    pub dest_addr: String,
    /// Hops in TTL order.
    pub hops: Vec<MtrHop>,
}

/// Capability to run traceroutes. Substitutable in tests.
#[async_trait]
pub trait TracerouteRunner: Send + Sync {
    /// Run and return the raw text output.
    async fn text(&self, q: &str) -> Result<String, TracerouteError>;
    /// Run and return an HTML rendering.
    async fn html(&self, q: &str) -> Result<String, TracerouteError>;
}

/// Runner backed by a detected system binary.
#[derive(Clone, Debug)]
pub struct SystemTraceroute {
    binary: String,
    flags: Vec<String>,
}

async fn try_execute(cmd: &str, args: &[String], target: &[String]) -> Result<String, TracerouteError> {
    let output = Command::new(cmd)
        .args(args)
        .args(target)
        .output()
        .await
        .map_err(|e| TracerouteError::Failed(e.to_string()))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(combined)
    } else {
        Err(TracerouteError::Failed(combined))
    }
}

fn owned(flags: &[&str]) -> Vec<String> {
    flags.iter().map(|s| s.to_string()).collect()
}

/// Probe candidate binaries and return a working runner, if any.
pub async fn autodetect(cfg: &TracerouteConfig) -> Option<SystemTraceroute> {
    if !cfg.binary.is_empty() && !cfg.flags.is_empty() {
        return Some(SystemTraceroute {
            binary: cfg.binary.clone(),
            flags: cfg.flags.clone(),
        });
    }

    let mut candidates: Vec<(String, Vec<String>)> = Vec::new();
    if !cfg.binary.is_empty() {
        candidates.push((cfg.binary.clone(), owned(&["-q1", "-N32", "-w1"])));
        candidates.push((cfg.binary.clone(), owned(&["-q1", "-w1"])));
        candidates.push((cfg.binary.clone(), Vec::new()));
    }
    candidates.push(("mtr".to_string(), owned(&["-w", "-c1", "-Z1", "-G1", "-b"])));
    candidates.push(("traceroute".to_string(), owned(&["-q1", "-N32", "-w1"])));
    candidates.push(("traceroute".to_string(), owned(&["-q1", "-w1"])));
    candidates.push(("traceroute".to_string(), Vec::new()));

    let target = vec!["127.0.0.1".to_string()];
    for (binary, flags) in candidates {
        match try_execute(&binary, &flags, &target).await {
            Ok(_) => {
                info!(binary, ?flags, "traceroute autodetect success");
                return Some(SystemTraceroute { binary, flags });
            }
            Err(e) => {
                info!(binary, ?flags, error = %e, "traceroute autodetect failed, continuing");
            }
        }
    }

    warn!("traceroute autodetect failed, traceroute is disabled");
    None
}

fn split_target(q: &str) -> Result<Vec<String>, TracerouteError> {
    let q = q.trim();
    if q.is_empty() {
        return Err(TracerouteError::EmptyTarget);
    }
    shlex::split(q).ok_or(TracerouteError::MalformedTarget)
}

impl SystemTraceroute {
    fn is_mtr(&self) -> bool {
        std::path::Path::new(&self.binary)
            .file_name()
            .map(|n| n == "mtr")
            .unwrap_or(false)
    }
}

#[async_trait]
impl TracerouteRunner for SystemTraceroute {
    async fn text(&self, q: &str) -> Result<String, TracerouteError> {
        let target = split_target(q)?;
        try_execute(&self.binary, &self.flags, &target).await
    }

    async fn html(&self, q: &str) -> Result<String, TracerouteError> {
        if !self.is_mtr() {
            return Err(TracerouteError::HtmlNotSupported);
        }
        let target = split_target(q)?;
        let args = owned(&["--json", "-c1", "-b"]);
        let raw = try_execute(&self.binary, &args, &target).await?;
        let result = parse_mtr_json(&raw)?;
        Ok(render_html(&result))
    }
}

#[derive(Deserialize)]
struct MtrJsonReport {
    report: MtrJsonBody,
}

#[derive(Deserialize)]
struct MtrJsonBody {
    mtr: MtrJsonHeader,
    #[serde(default)]
    hubs: Vec<MtrJsonHub>,
}

#[derive(Deserialize)]
struct MtrJsonHeader {
    #[serde(default)]
    dst: String,
}

#[derive(Deserialize)]
struct MtrJsonHub {
    count: u32,
    host: String,
    #[serde(rename = "Loss%", default)]
    loss: f64,
    #[serde(rename = "Snt", default)]
    snt: u32,
    #[serde(rename = "Last", default)]
    last: f64,
    #[serde(rename = "Avg", default)]
    avg: f64,
    #[serde(rename = "Best", default)]
    best: f64,
    #[serde(rename = "Wrst", default)]
    worst: f64,
}

/// Parse `mtr --json` report output.
pub fn parse_mtr_json(raw: &str) -> Result<MtrResult, TracerouteError> {
    let report: MtrJsonReport =
        serde_json::from_str(raw).map_err(|_| TracerouteError::ParseOutput)?;

    let hops = report
        .report
        .hubs
        .into_iter()
        .map(|hub| {
            let success = hub.host != "???";
            MtrHop {
                ttl: hub.count,
                address_to: hub.host,
                success,
                snt: hub.snt,
                loss: hub.loss,
                last: hub.last,
                avg: hub.avg,
                best: hub.best,
                worst: hub.worst,
            }
        })
        .collect();

    Ok(MtrResult {
        dest_addr: report.report.mtr.dst,
        hops,
    })
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a parsed run as an HTML table.
pub fn render_html(result: &MtrResult) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<div class=\"traceroute\">\n");
    out.push_str(&format!(
        "<p>Start: {}, DestAddr: {}</p>\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        escape(&result.dest_addr)
    ));

    if result.hops.is_empty() {
        out.push_str("<p>Expected at least one hop</p>\n</div>\n");
        return out;
    }

    out.push_str("<table>\n<tr><th>Hop</th><th>Host</th><th>Loss%</th><th>Snt</th><th>Last</th><th>Avg</th><th>Best</th><th>Worst</th></tr>\n");
    for hop in &result.hops {
        if hop.success {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{:.1}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>\n",
                hop.ttl,
                escape(&hop.address_to),
                hop.loss,
                hop.snt,
                hop.last,
                hop.avg,
                hop.best,
                hop.worst
            ));
        } else {
            out.push_str(&format!(
                "<tr><td>{}</td><td>???</td><td>100.0</td><td>0</td><td>0.00</td><td>0.00</td><td>0.00</td><td>0.00</td></tr>\n",
                hop.ttl
            ));
        }
    }
    out.push_str("</table>\n</div>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MTR_JSON: &str = r#"{
      "report": {
        "mtr": {"src": "lg", "dst": "192.0.2.1", "tos": 0, "tests": 1},
        "hubs": [
          {"count": 1, "host": "gw.example.net", "Loss%": 0.0, "Snt": 1, "Last": 0.42, "Avg": 0.42, "Best": 0.42, "Wrst": 0.42},
          {"count": 2, "host": "???", "Loss%": 100.0, "Snt": 1, "Last": 0.0, "Avg": 0.0, "Best": 0.0, "Wrst": 0.0},
          {"count": 3, "host": "192.0.2.1", "Loss%": 0.0, "Snt": 1, "Last": 1.5, "Avg": 1.5, "Best": 1.5, "Wrst": 1.5}
        ]
      }
    }"#;

    #[test]
    fn parses_mtr_report() {
        let result = parse_mtr_json(MTR_JSON).unwrap();
        assert_eq!(result.dest_addr, "192.0.2.1");
        assert_eq!(result.hops.len(), 3);
        assert!(result.hops[0].success);
        assert!(!result.hops[1].success);
        assert_eq!(result.hops[2].ttl, 3);
        assert!((result.hops[2].avg - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn renders_unanswered_hops() {
        let result = parse_mtr_json(MTR_JSON).unwrap();
        let html = render_html(&result);
        assert!(html.contains("<td>???</td><td>100.0</td>"));
        assert!(html.contains("gw.example.net"));
        assert!(html.contains("DestAddr: 192.0.2.1"));
    }

    #[test]
    fn garbage_json_is_an_error() {
        assert!(matches!(
            parse_mtr_json("no json"),
            Err(TracerouteError::ParseOutput)
        ));
    }

    #[test]
    fn empty_and_malformed_targets() {
        assert!(matches!(split_target("  "), Err(TracerouteError::EmptyTarget)));
        assert!(matches!(
            split_target("192.0.2.1 \"unterminated"),
            Err(TracerouteError::MalformedTarget)
        ));
        assert_eq!(split_target("192.0.2.1").unwrap(), vec!["192.0.2.1"]);
    }
}
