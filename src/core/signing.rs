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

//! Signed proxy requests: ECDSA P-256 over a canonical request string.
//!
//! ## Canonical string
//! `q=<raw-query>,ts=<unix-seconds>` with no escaping. A request is valid
//! while `now - ts <= 30s`; future timestamps are tolerated (upward clock
//! skew only).
//!
//! ## Key encoding
//! Private keys are hex-encoded SEC1 (RFC 5915) DER; public keys are
//! hex-encoded PKIX SPKI DER.
//!
//! ## Signature on the wire
//! Base64 of the JSON object `{"R":<dec>,"S":<dec>}` where R and S are the
//! ECDSA scalars as decimal JSON numbers. This shape is a compatibility
//! contract; do not replace it with ASN.1 DER or raw `r || s` bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use num_bigint::BigUint;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::core::config::SIGN_VALIDITY_SECS;

/// Signing errors.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Key material cannot be decoded.
    #[error("bad key")]
    BadKey,
    /// No private key is loaded; the process cannot sign.
    #[error("no private key loaded")]
    NoPrivateKey,
    /// Request timestamp is outside the validity window.
    #[error("request timestamp expired")]
    ClockSkew,
    /// Signature envelope cannot be decoded.
    #[error("malformed signature")]
    MalformedSignature,
    /// Signature does not verify against the canonical string.
    #[error("signature rejected")]
    Rejected,
}

/// A query signed for transport to a proxy agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    /// Raw query text.
    pub query: String,
    /// Unix timestamp (seconds) at signing time.
    pub ts: i64,
    /// Base64 signature envelope.
    pub signature: String,
}

#[derive(Serialize, Deserialize)]
struct WireSignature {
    #[serde(rename = "R")]
    r: serde_json::Number,
    #[serde(rename = "S")]
    s: serde_json::Number,
}

fn canonical_string(query: &str, ts: i64) -> String {
    format!("q={query},ts={ts}")
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Generate a fresh P-256 keypair using the system RNG.
pub fn generate_keypair() -> Result<(SecretKey, PublicKey), SigningError> {
    let rng = SystemRandom::new();
    // Rejection-sample until the scalar lands inside the curve order.
    for _ in 0..64 {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rng.fill(bytes.as_mut_slice()).map_err(|_| SigningError::BadKey)?;
        if let Ok(secret) = SecretKey::from_slice(bytes.as_slice()) {
            let public = secret.public_key();
            return Ok((secret, public));
        }
    }
    Err(SigningError::BadKey)
}

/// Export a private key as hex-encoded SEC1 DER.
pub fn export_private_key_hex(key: &SecretKey) -> Result<String, SigningError> {
    let der = key.to_sec1_der().map_err(|_| SigningError::BadKey)?;
    Ok(hex::encode(der.as_ref() as &[u8]))
}

/// Import a private key from hex-encoded SEC1 DER.
pub fn import_private_key_hex(text: &str) -> Result<SecretKey, SigningError> {
    let der = Zeroizing::new(hex::decode(text.trim()).map_err(|_| SigningError::BadKey)?);
    SecretKey::from_sec1_der(&der).map_err(|_| SigningError::BadKey)
}

/// Export a public key as hex-encoded PKIX SPKI DER.
pub fn export_public_key_hex(key: &PublicKey) -> Result<String, SigningError> {
    let der = key.to_public_key_der().map_err(|_| SigningError::BadKey)?;
    Ok(hex::encode(der.as_bytes()))
}

/// Import a public key from hex-encoded PKIX SPKI DER.
pub fn import_public_key_hex(text: &str) -> Result<PublicKey, SigningError> {
    let der = hex::decode(text.trim()).map_err(|_| SigningError::BadKey)?;
    PublicKey::from_public_key_der(&der).map_err(|_| SigningError::BadKey)
}

fn encode_signature(sig: &Signature) -> Result<String, SigningError> {
    let bytes = sig.to_bytes();
    let (rb, sb) = bytes.as_slice().split_at(32);
    let r_dec = BigUint::from_bytes_be(rb).to_str_radix(10);
    let s_dec = BigUint::from_bytes_be(sb).to_str_radix(10);
    let wire = WireSignature {
        r: r_dec.parse().map_err(|_| SigningError::MalformedSignature)?,
        s: s_dec.parse().map_err(|_| SigningError::MalformedSignature)?,
    };
    let json = serde_json::to_vec(&wire).map_err(|_| SigningError::MalformedSignature)?;
    Ok(BASE64.encode(json))
}

fn scalar_bytes(n: &serde_json::Number) -> Result<[u8; 32], SigningError> {
    let dec = n.to_string();
    let big = BigUint::parse_bytes(dec.as_bytes(), 10).ok_or(SigningError::MalformedSignature)?;
    let raw = big.to_bytes_be();
    if raw.len() > 32 {
        return Err(SigningError::MalformedSignature);
    }
    let mut out = [0u8; 32];
    out[32 - raw.len()..].copy_from_slice(&raw);
    Ok(out)
}

fn decode_signature(text: &str) -> Result<Signature, SigningError> {
    let json = BASE64.decode(text).map_err(|_| SigningError::MalformedSignature)?;
    let wire: WireSignature =
        serde_json::from_slice(&json).map_err(|_| SigningError::MalformedSignature)?;
    let r = scalar_bytes(&wire.r)?;
    let s = scalar_bytes(&wire.s)?;
    Signature::from_scalars(r, s).map_err(|_| SigningError::MalformedSignature)
}

/// Signs outbound proxy requests (frontend side).
#[derive(Clone)]
pub struct RequestSigner {
    key: SigningKey,
}

impl RequestSigner {
    /// Build from an imported private key.
    pub fn new(key: &SecretKey) -> Self {
        Self { key: SigningKey::from(key) }
    }

    /// Sign a query at an explicit timestamp.
    pub fn sign_at(&self, query: &str, ts: i64) -> Result<SignedRequest, SigningError> {
        let msg = canonical_string(query, ts);
        let sig: Signature = self.key.sign(msg.as_bytes());
        Ok(SignedRequest {
            query: query.to_string(),
            ts,
            signature: encode_signature(&sig)?,
        })
    }

    /// Sign a query stamped with the current time.
    pub fn sign(&self, query: &str) -> Result<SignedRequest, SigningError> {
        self.sign_at(query, now_unix())
    }
}

/// Verifies inbound proxy requests (proxy side).
#[derive(Clone)]
pub struct RequestVerifier {
    key: VerifyingKey,
}

impl RequestVerifier {
    /// Build from an imported public key.
    pub fn new(key: &PublicKey) -> Self {
        Self { key: VerifyingKey::from(key) }
    }

    /// Verify against an explicit `now` (unix seconds).
    pub fn verify_at(&self, req: &SignedRequest, now: i64) -> Result<(), SigningError> {
        if req.ts < now - SIGN_VALIDITY_SECS {
            return Err(SigningError::ClockSkew);
        }
        let sig = decode_signature(&req.signature)?;
        let msg = canonical_string(&req.query, req.ts);
        self.key
            .verify(msg.as_bytes(), &sig)
            .map_err(|_| SigningError::Rejected)
    }

    /// Verify against the current time.
    pub fn verify(&self, req: &SignedRequest) -> Result<(), SigningError> {
        self.verify_at(req, now_unix())
    }
}
