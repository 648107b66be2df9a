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

//! Parser for BIRD `show protocols` output.

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Summary parsing errors.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// The body was too short to be a table; it is the backend's error text.
    #[error("{0}")]
    Backend(String),
    /// The configured name filter is not a valid regex.
    #[error("bad name filter")]
    BadFilter,
}

/// One parsed protocol row.
#[derive(Clone, Debug, Serialize)]
pub struct SummaryRow {
    /// Protocol instance name.
    pub name: String,
    /// Protocol kind (BGP, OSPF, ...).
    pub proto: String,
    /// Routing table.
    pub table: String,
    /// Raw state column.
    pub state: String,
    /// Display colour derived from the state.
    #[serde(skip)]
    pub mapped_state: String,
    /// State change time.
    pub since: String,
    /// Free-form info column.
    pub info: String,
}

/// A parsed summary table.
#[derive(Clone, Debug, Default)]
pub struct SummaryTable {
    /// Raw response text.
    pub raw: String,
    /// Header columns (`Table` dropped).
    pub header: Vec<String>,
    /// Parsed, sorted, filtered rows.
    pub rows: Vec<SummaryRow>,
}

fn map_state(state: &str, info: &str) -> String {
    if info.contains("Passive") {
        return "blue".to_string();
    }
    match state {
        "up" => "green",
        "down" => "zinc",
        "start" => "red",
        _ => "",
    }
    .to_string()
}

/// Compiled `show protocols` parser.
#[derive(Debug)]
pub struct SummaryParser {
    row_re: Regex,
    name_filter: Option<Regex>,
}

impl SummaryParser {
    /// Build a parser. `name_filter` is a regex; matching rows are hidden.
    pub fn new(name_filter: &str) -> Result<Self, SummaryError> {
        let row_re = Regex::new(r"^([\w-]+)\s+(\w+)\s+([\w-]+)\s+(\w+)\s+([0-9\-\. :]+)(.*)$")
            .map_err(|_| SummaryError::BadFilter)?;
        let name_filter = if name_filter.is_empty() {
            None
        } else {
            Some(Regex::new(name_filter).map_err(|_| SummaryError::BadFilter)?)
        };
        Ok(Self { row_re, name_filter })
    }

    /// Parse one row. Returns `None` when the line does not look like a row.
    pub fn parse_row(&self, line: &str) -> Option<SummaryRow> {
        let caps = self.row_re.captures(line)?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        let state = field(4);
        let info = field(6);
        let mapped_state = map_state(&state, &info);
        Some(SummaryRow {
            name: field(1),
            proto: field(2),
            table: field(3),
            state,
            mapped_state,
            since: field(5),
            info,
        })
    }

    /// Parse a whole `show protocols` response.
    ///
    /// A body of one line or less is treated as a backend error message.
    pub fn parse(&self, data: &str) -> Result<SummaryTable, SummaryError> {
        let trimmed = data.trim();
        let lines: Vec<&str> = trimmed.split('\n').collect();
        if lines.len() <= 1 {
            return Err(SummaryError::Backend(trimmed.to_string()));
        }

        let mut table = SummaryTable {
            raw: data.to_string(),
            ..Default::default()
        };

        for col in lines[0].split_whitespace() {
            if col == "Table" {
                continue;
            }
            table.header.push(col.to_string());
        }

        let mut rows: Vec<&str> = lines[1..].to_vec();
        rows.sort_unstable();

        for line in rows {
            let Some(row) = self.parse_row(line) else {
                continue;
            };
            if let Some(filter) = &self.name_filter {
                if filter.is_match(&row.name) {
                    continue;
                }
            }
            table.rows.push(row);
        }

        Ok(table)
    }
}
