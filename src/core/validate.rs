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

//! Query input validation.
//!
//! BIRD commands are built by literal interpolation; these validators are
//! the only defence against command injection.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Whether `s` is a parseable IPv4 or IPv6 address.
pub fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// Whether `s` is a parseable CIDR (mask required).
pub fn is_cidr(s: &str) -> bool {
    s.contains('/') && s.parse::<IpNetwork>().is_ok()
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    let inner_ok = bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-');
    inner_ok && bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric()
}

/// Whether `s` is a resolvable domain name.
///
/// IDNA ToASCII must succeed; the result must be at most 255 bytes with
/// LDH labels of 1-63 bytes. Bare IPs are rejected; a trailing dot is
/// allowed.
pub fn is_domain(s: &str) -> bool {
    if s.is_empty() || s.parse::<IpAddr>().is_ok() {
        return false;
    }
    let raw = s.strip_suffix('.').unwrap_or(s);
    if raw.is_empty() {
        return false;
    }
    let Ok(ascii) = idna::domain_to_ascii(raw) else {
        return false;
    };
    if ascii.is_empty() || ascii.len() > 255 {
        return false;
    }
    ascii.split('.').all(is_valid_label)
}

/// Whether `s` is a valid BIRD protocol name (`^[0-9A-Za-z_-]+$`).
pub fn is_valid_protocol(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_addresses() {
        assert!(is_ip("192.0.2.1"));
        assert!(is_ip("2001:db8::1"));
        assert!(!is_ip("192.0.2.0/24"));
        assert!(!is_ip("host.example.net"));
        assert!(!is_ip(""));
    }

    #[test]
    fn cidr_requires_mask() {
        assert!(is_cidr("192.0.2.0/24"));
        assert!(is_cidr("2001:db8::/32"));
        assert!(!is_cidr("192.0.2.1"));
        assert!(!is_cidr("192.0.2.0/33"));
        assert!(!is_cidr("banana/24"));
    }

    #[test]
    fn domains() {
        assert!(is_domain("example.net"));
        assert!(is_domain("example.net."));
        assert!(is_domain("a.b-c.example"));
        assert!(is_domain("xn--nxasmq6b.example"));
        assert!(!is_domain("192.0.2.1"));
        assert!(!is_domain("2001:db8::1"));
        assert!(!is_domain(""));
        assert!(!is_domain("."));
        assert!(!is_domain("-bad.example"));
        assert!(!is_domain("bad-.example"));
        let long_label = format!("{}.example", "a".repeat(64));
        assert!(!is_domain(&long_label));
    }

    #[test]
    fn protocol_names() {
        assert!(is_valid_protocol("upstream_v4-1"));
        assert!(is_valid_protocol("BGP64500"));
        assert!(!is_valid_protocol(""));
        assert!(!is_valid_protocol("bad name"));
        assert!(!is_valid_protocol("x'; configure"));
    }
}
