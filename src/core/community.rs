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
#![deny(missing_docs)]

//! BGP community pattern matching and output annotation.
//!
//! ## Definition format
//! One definition per line, `pattern,description`; `#` starts a comment.
//! A pattern is 2 (standard) or 3 (large) colon-separated parts. Inside a
//! part, a run of `x` of length n matches exactly n digits as one capture
//! group, the literal token `nnn` matches one or more digits as one group,
//! and anything else matches literally. Patterns are anchored.
//!
//! ## Descriptions
//! `$0`, `$1`, ... refer to captured groups left to right. Captured digit
//! groups are numerically normalised (leading zeros stripped) before
//! substitution.
//!
//! ## Scanning
//! The scanner recognises BIRD's printed tuple form `(a, b)` / `(a, b, c)`
//! anywhere in a line, normalises it to `a:b[:c]`, and looks it up in the
//! pool of matching arity only. Hits are rewritten to
//! `<abbr class="smart-community" title="(a, b)">[prefix: description]</abbr>`.
//! A tuple already sitting inside an `<abbr>` title attribute is left
//! alone, so a second pass over annotated output is a no-op.

use regex::Regex;
use thiserror::Error;

/// Community matcher errors.
#[derive(Debug, Error)]
pub enum CommunityError {
    /// The tuple scanner regex failed to compile.
    #[error("compile community scanner")]
    BadScanner,
}

/// One compiled community pattern.
#[derive(Debug)]
pub struct CommunityPattern {
    regex: Regex,
    description: String,
    group_count: usize,
}

impl CommunityPattern {
    /// Number of capture groups in the pattern.
    pub fn group_count(&self) -> usize {
        self.group_count
    }
}

/// A set of community definitions sharing one display prefix.
///
/// Standard (2-tuple) and large (3-tuple) patterns live in disjoint pools;
/// a 2-tuple input can only ever match a standard pattern.
#[derive(Debug)]
pub struct CommunityProcessor {
    out_prefix: String,
    standard: Vec<CommunityPattern>,
    large: Vec<CommunityPattern>,
    tuple_re: Regex,
}

/// Convert one colon-separated pattern part to regex source.
fn convert_wildcard_part(part: &str) -> (String, usize) {
    let bytes = part.as_bytes();
    let mut out = String::new();
    let mut groups = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let ch = bytes[i];

        if ch == b'x' {
            let mut j = i;
            while j < bytes.len() && bytes[j] == b'x' {
                j += 1;
            }
            let count = j - i;
            out.push_str(&format!("(\\d{{{count}}})"));
            groups += 1;
            i = j;
            continue;
        }

        if i + 3 <= bytes.len() && &bytes[i..i + 3] == b"nnn" {
            out.push_str("(\\d+)");
            groups += 1;
            i += 3;
            continue;
        }

        if br"\.+*?()|[]{}^$".contains(&ch) {
            out.push('\\');
        }
        out.push(ch as char);
        i += 1;
    }

    (out, groups)
}

impl CommunityProcessor {
    /// Compile a definition document. Unparsable definition lines are
    /// skipped; only a broken tuple scanner is an error.
    pub fn new(definitions: &str, out_prefix: &str) -> Result<Self, CommunityError> {
        let mut standard = Vec::new();
        let mut large = Vec::new();

        for line in definitions.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((pattern_str, description)) = line.split_once(',') else {
                continue;
            };
            let pattern_str = pattern_str.trim();
            let description = description.trim();

            let parts: Vec<&str> = pattern_str.split(':').collect();
            let is_large = parts.len() == 3;

            let mut source = String::from("^");
            let mut group_count = 0usize;
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    source.push(':');
                }
                let (converted, groups) = convert_wildcard_part(part.trim());
                source.push_str(&converted);
                group_count += groups;
            }
            source.push('$');

            let Ok(regex) = Regex::new(&source) else {
                continue;
            };

            let entry = CommunityPattern {
                regex,
                description: description.to_string(),
                group_count,
            };
            if is_large {
                large.push(entry);
            } else {
                standard.push(entry);
            }
        }

        // BIRD's printed form: (a, b) or (a, b, c).
        let tuple_re = Regex::new(r"\((\d+),\s*(\d+)(?:,\s*(\d+))?\)")
            .map_err(|_| CommunityError::BadScanner)?;

        Ok(Self {
            out_prefix: out_prefix.to_string(),
            standard,
            large,
            tuple_re,
        })
    }

    /// Number of compiled patterns, both pools.
    pub fn len(&self) -> usize {
        self.standard.len() + self.large.len()
    }

    /// Whether no patterns compiled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_matching(&self, normalized: &str, is_large: bool) -> Option<(&CommunityPattern, Vec<String>)> {
        let pool = if is_large { &self.large } else { &self.standard };
        for entry in pool {
            if let Some(caps) = entry.regex.captures(normalized) {
                let groups: Vec<String> = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str().to_string())
                    .collect();
                return Some((entry, groups));
            }
        }
        None
    }

    fn format_description(&self, desc: &str, groups: &[String]) -> String {
        let mut result = desc.to_string();
        for (i, group) in groups.iter().enumerate() {
            let normalized = match group.parse::<u64>() {
                Ok(n) => n.to_string(),
                Err(_) => group.clone(),
            };
            result = result.replace(&format!("${i}"), &normalized);
        }
        result
    }

    fn rewrite_line(&self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut last = 0usize;

        for m in self.tuple_re.find_iter(line) {
            out.push_str(&line[last..m.start()]);
            last = m.end();

            let original = m.as_str();

            // Do not re-annotate a tuple that is already the title of an
            // <abbr>; a second pass must be a fixed point.
            if out.ends_with("title=\"") {
                out.push_str(original);
                continue;
            }

            let normalized: String = original
                .replace([' ', '\n', '\r'], "")
                .trim_matches(|c| c == '(' || c == ')')
                .replace(',', ":");
            let is_large = normalized.matches(':').count() == 2;

            match self.find_matching(&normalized, is_large) {
                Some((entry, groups)) => {
                    let desc = self.format_description(&entry.description, &groups);
                    let display = if self.out_prefix.is_empty() {
                        format!("[{desc}]")
                    } else {
                        format!("[{}: {desc}]", self.out_prefix)
                    };
                    out.push_str(&format!(
                        "<abbr class=\"smart-community\" title=\"{original}\">{display}</abbr>"
                    ));
                }
                None => out.push_str(original),
            }
        }

        out.push_str(&line[last..]);
        out
    }

    /// Annotate every recognised community tuple in `s`.
    pub fn format_bgp_text(&self, s: &str) -> String {
        let folded = fold_multiline_communities(s);
        let mut result = String::with_capacity(folded.len());
        for (i, line) in folded.split('\n').enumerate() {
            if i > 0 {
                result.push('\n');
            }
            result.push_str(&self.rewrite_line(line));
        }
        result
    }
}

/// Join wrapped community lists before scanning.
///
/// A line containing `(` but no `)` starts a continuation; following lines
/// are appended with single spaces until one contains `)`.
fn fold_multiline_communities(s: &str) -> String {
    let lines: Vec<&str> = s.split('\n').collect();
    let mut result = String::with_capacity(s.len());
    let mut i = 0usize;

    while i < lines.len() {
        let line = lines[i];
        if line.contains('(') && !line.contains(')') {
            let mut joined = String::from(line);
            let mut j = i + 1;
            while j < lines.len() {
                joined.push(' ');
                joined.push_str(lines[j]);
                if lines[j].contains(')') {
                    break;
                }
                j += 1;
            }
            result.push_str(&joined);
            result.push('\n');
            i = j + 1;
        } else {
            result.push_str(line);
            if i < lines.len() - 1 {
                result.push('\n');
            }
            i += 1;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITIONS: &str = "
65535:666,exact match
65535:1xxx,triple X wildcard match $0
65535:xxx1,triple X wildcard match B $0
65535:x0,match single digit wildcard $0
65535:nnn,match any number $0
65535:0:nnn,large community test $0
65535:x:nnn,large wildcard $0 $1
";

    #[test]
    fn exact_match_with_prefix() {
        let p = CommunityProcessor::new(DEFINITIONS, "TEST").unwrap();
        let out = p.format_bgp_text("BGP.community: (65535, 666)");
        assert_eq!(
            out,
            "BGP.community: <abbr class=\"smart-community\" title=\"(65535, 666)\">[TEST: exact match]</abbr>"
        );
    }

    #[test]
    fn single_digit_wildcard() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let out = p.format_bgp_text("BGP.community: (65535, 10)");
        assert_eq!(
            out,
            "BGP.community: <abbr class=\"smart-community\" title=\"(65535, 10)\">[match single digit wildcard 1]</abbr>"
        );
    }

    #[test]
    fn nnn_matches_any_number() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let out = p.format_bgp_text("BGP.community: (65535, 123456)");
        assert_eq!(
            out,
            "BGP.community: <abbr class=\"smart-community\" title=\"(65535, 123456)\">[match any number 123456]</abbr>"
        );
    }

    #[test]
    fn large_community_matches_large_pool_only() {
        let p = CommunityProcessor::new(DEFINITIONS, "LARGE").unwrap();
        let out = p.format_bgp_text("BGP.large_community: (65535, 0, 400)");
        assert_eq!(
            out,
            "BGP.large_community: <abbr class=\"smart-community\" title=\"(65535, 0, 400)\">[LARGE: large community test 400]</abbr>"
        );
        // The same 3-tuple must never match a 2-tuple pattern: (65535, 666, 1)
        // misses even though 65535:666 exists in the standard pool.
        let out = p.format_bgp_text("BGP.large_community: (65535, 666, 1)");
        assert_eq!(out, "BGP.large_community: (65535, 666, 1)");
    }

    #[test]
    fn large_wildcard_groups() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let out = p.format_bgp_text("BGP.large_community: (65535, 3, 999)");
        assert_eq!(
            out,
            "BGP.large_community: <abbr class=\"smart-community\" title=\"(65535, 3, 999)\">[large wildcard 3 999]</abbr>"
        );
    }

    #[test]
    fn multiple_communities_in_one_line() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let out = p.format_bgp_text("BGP.community: (65535, 666) (65535, 10)");
        assert_eq!(
            out,
            "BGP.community: <abbr class=\"smart-community\" title=\"(65535, 666)\">[exact match]</abbr> \
             <abbr class=\"smart-community\" title=\"(65535, 10)\">[match single digit wildcard 1]</abbr>"
        );
    }

    #[test]
    fn wildcard_suffix_and_prefix() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let out = p.format_bgp_text("BGP.community: (65535, 1123)");
        assert!(out.contains("[triple X wildcard match 123]"), "{out}");

        let out = p.format_bgp_text("BGP.community: (65535, 9871)");
        assert!(out.contains("[triple X wildcard match B 987]"), "{out}");
    }

    #[test]
    fn leading_zeros_stripped_in_groups() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let out = p.format_bgp_text("BGP.community: (65535, 1023)");
        assert!(out.contains("[triple X wildcard match 23]"), "{out}");
        assert!(out.contains("title=\"(65535, 1023)\""), "{out}");
    }

    #[test]
    fn unknown_tuple_untouched() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let input = "BGP.community: (1, 2)";
        assert_eq!(p.format_bgp_text(input), input);
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let p = CommunityProcessor::new("# comment\n\n65535:666,boom\nnot a def\n", "").unwrap();
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn multiline_folding() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let input = "BGP.community: (65535,\n 666)";
        let out = p.format_bgp_text(input);
        // Folding joins with a single space (the wrapped line keeps its own
        // leading blank) and terminates the joined line.
        assert_eq!(
            out,
            "BGP.community: <abbr class=\"smart-community\" title=\"(65535,  666)\">[exact match]</abbr>\n"
        );
    }

    #[test]
    fn rescanning_annotated_output_is_a_fixed_point() {
        let p = CommunityProcessor::new(DEFINITIONS, "").unwrap();
        let input = "BGP.community: (65535, 666) (65535, 1023)";
        let once = p.format_bgp_text(input);
        let twice = p.format_bgp_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn literal_metacharacters_escaped() {
        // A malicious "pattern" full of regex syntax must not compile into
        // something that matches arbitrary communities.
        let p = CommunityProcessor::new(".*:.*,gotcha", "").unwrap();
        let input = "BGP.community: (65535, 666)";
        assert_eq!(p.format_bgp_text(input), input);
    }

    #[test]
    fn group_count_tracks_captures() {
        let p = CommunityProcessor::new("65535:x:nnn,two groups $0 $1", "").unwrap();
        assert_eq!(p.large[0].group_count(), 2);
    }
}
