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

//! BIRD output annotation: pure text to HTML.
//!
//! The input is HTML-escaped first, then annotated line by line:
//! `Neighbor AS:` / `Local AS:` numbers become whois links, `BGP.as_path:`
//! numbers become ASN-name hovers inside whois links, a trailing
//! `N filtered` on a `Routes:` line links to the filtered-route view, and
//! everything else gets FQDN / `[AS<n>` / IPv4 / IPv6 linkification. The
//! community matcher pass runs over the final result.
//!
//! ASN names are looked up before formatting (one batched resolve), so the
//! formatter itself stays synchronous.

use crate::core::community::CommunityProcessor;
use regex::{Captures, Regex};
use std::collections::HashMap;
use thiserror::Error;

/// Formatter errors.
#[derive(Debug, Error)]
pub enum FormatError {
    /// An annotation regex failed to compile.
    #[error("compile formatter patterns")]
    BadPattern,
}

/// HTML-escape `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Where the formatted output will be rendered.
#[derive(Clone, Debug, Default)]
pub struct FormatContext {
    /// PoP whose output this is; used for filtered-route links.
    pub pop_id: String,
    /// Protocol being displayed, when known.
    pub proto: Option<String>,
}

/// Compiled output formatter.
pub struct OutputFormatter {
    re_number: Regex,
    re_fqdn: Regex,
    re_as_bracket: Regex,
    re_ipv4: Regex,
    re_ipv6: Regex,
    re_filtered: Regex,
}

fn is_as_path_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("BGP.as_path:") || trimmed.starts_with("bgp_path:")
}

fn is_as_number_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("Neighbor AS:") || trimmed.starts_with("Local AS:")
}

fn is_routes_line(line: &str) -> bool {
    line.trim_start().starts_with("Routes:")
}

impl OutputFormatter {
    /// Compile the annotation regexes.
    pub fn new() -> Result<Self, FormatError> {
        let compile = |source: &str| Regex::new(source).map_err(|_| FormatError::BadPattern);
        Ok(Self {
            re_number: compile(r"(\d+)")?,
            re_fqdn: compile(r"([a-zA-Z0-9\-]*\.([a-zA-Z]{2,3}){1,2})(\s|$)")?,
            re_as_bracket: compile(r"\[AS(\d+)")?,
            re_ipv4: compile(r"(\d+\.\d+\.\d+\.\d+)")?,
            re_ipv6: compile(r"(?i)(([a-f\d]{0,4}:){3,10}[a-f\d]{0,4})")?,
            re_filtered: compile(r"(\d+) filtered")?,
        })
    }

    /// Extract the AS numbers referenced by `BGP.as_path:` / `bgp_path:`
    /// lines, in first-seen order without duplicates.
    ///
    /// Callers resolve these (batched) and hand the name map to
    /// [`OutputFormatter::format`].
    pub fn collect_as_path_asns(&self, raw: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for line in raw.lines() {
            if !is_as_path_line(line) {
                continue;
            }
            for m in self.re_number.find_iter(line) {
                let asn = m.as_str().to_string();
                if !seen.contains(&asn) {
                    seen.push(asn);
                }
            }
        }
        seen
    }

    fn format_line(
        &self,
        line: &str,
        ctx: &FormatContext,
        asn_names: &HashMap<String, String>,
    ) -> String {
        if is_as_number_line(line) {
            return self
                .re_number
                .replace_all(
                    line,
                    "<a href=\"/whois?q=AS${1}\" class=\"smart-whois\" target=\"_blank\">${1}</a>",
                )
                .into_owned();
        }

        if is_as_path_line(line) {
            return self
                .re_number
                .replace_all(line, |caps: &Captures| {
                    let asn = &caps[1];
                    let name = asn_names
                        .get(asn)
                        .cloned()
                        .unwrap_or_else(|| format!("AS{asn}"));
                    format!(
                        "<a href=\"/whois?q=AS{asn}\" class=\"smart-whois\" target=\"_blank\">\
                         <abbr class=\"smart-asn\" title=\"{}\">{asn}</abbr></a>",
                        escape_html(&name)
                    )
                })
                .into_owned();
        }

        if is_routes_line(line) {
            if let Some(proto) = ctx.proto.as_deref() {
                return self
                    .re_filtered
                    .replace_all(
                        line,
                        format!(
                            "<a href=\"/detail/{}?mode=filter&amp;q={proto}\" class=\"smart-filter\">${{1}} filtered</a>",
                            ctx.pop_id
                        )
                        .as_str(),
                    )
                    .into_owned();
            }
            return line.to_string();
        }

        let line = self.re_fqdn.replace_all(
            line,
            "<a href=\"/whois?q=${1}\" class=\"smart-whois\" target=\"_blank\">${1}</a>${3}",
        );
        let line = self.re_as_bracket.replace_all(
            &line,
            "[<a href=\"/whois?q=AS${1}\" class=\"smart-whois\" target=\"_blank\">AS${1}</a>",
        );
        let line = self.re_ipv4.replace_all(
            &line,
            "<a href=\"/whois?q=${1}\" class=\"smart-whois\" target=\"_blank\">${1}</a>",
        );
        self.re_ipv6
            .replace_all(
                &line,
                "<a href=\"/whois?q=${1}\" class=\"smart-whois\" target=\"_blank\">${1}</a>",
            )
            .into_owned()
    }

    /// Escape and annotate `raw`, then run the community matchers.
    pub fn format(
        &self,
        raw: &str,
        ctx: &FormatContext,
        asn_names: &HashMap<String, String>,
        communities: &[CommunityProcessor],
    ) -> String {
        let escaped = escape_html(raw);
        let mut result = String::with_capacity(escaped.len());
        for line in escaped.split('\n') {
            result.push_str(&self.format_line(line, ctx, asn_names));
            result.push('\n');
        }
        for processor in communities {
            result = processor.format_bgp_text(&result);
        }
        result
    }
}
