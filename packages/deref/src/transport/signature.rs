//! HTTP Signatures (draft-cavage-http-signatures-12) for signed GETs.
//!
//! Outbound fetches are signed with the requesting local user's Ed25519 key
//! over `(request-target) host date`. [`SignatureHeader`] is the receiving
//! side, used by the end-to-end suite to check that every fetch arrives
//! signed by the expected key.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

const SIGNED_HEADERS: &str = "(request-target) host date";
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// A local actor's signing identity.
pub struct Signer {
    key_id: String,
    key: SigningKey,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("key_id", &self.key_id).finish()
    }
}

impl Signer {
    pub fn new(key_id: impl Into<String>, key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            key,
        }
    }

    /// A fresh random key under `key_id`.
    pub fn generate(key_id: impl Into<String>) -> Self {
        Self::new(key_id, SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// `Date` and `Signature` header values for one request to `host`.
    pub fn sign_request(&self, method: &str, path: &str, host: &str) -> (String, String) {
        let date = httpdate::fmt_http_date(SystemTime::now());
        let signed = format!(
            "(request-target): {} {path}\nhost: {host}\ndate: {date}",
            method.to_ascii_lowercase()
        );
        let sig = self.key.sign(signed.as_bytes()).to_bytes();
        let header = format!(
            "keyId=\"{}\",algorithm=\"ed25519\",headers=\"{SIGNED_HEADERS}\",signature=\"z{}\"",
            self.key_id,
            bs58::encode(sig).into_string()
        );
        (date, header)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed Signature header: {0}")]
    Malformed(&'static str),

    #[error("unsupported algorithm {0:?}")]
    Algorithm(String),

    #[error("signed header {0} is missing from the request")]
    MissingHeader(String),

    #[error("date {0:?} is outside the accepted clock skew")]
    Skewed(String),

    #[error("signature does not verify")]
    Mismatch,
}

/// A parsed `Signature` request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub key_id: String,
    pub algorithm: Option<String>,
    /// Names of the signed headers, in signing order.
    pub headers: Vec<String>,
    signature: [u8; 64],
}

impl FromStr for SignatureHeader {
    type Err = SignatureError;

    /// Parameters are `name="value"` pairs separated by commas. Values
    /// may themselves contain commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut params = HashMap::new();
        let mut rest = s.trim();
        while !rest.is_empty() {
            let (name, tail) = rest
                .split_once('=')
                .ok_or(SignatureError::Malformed("parameter without value"))?;
            let (value, tail) = tail
                .trim_start()
                .strip_prefix('"')
                .and_then(|t| t.split_once('"'))
                .ok_or(SignatureError::Malformed("unquoted value"))?;
            params.insert(name.trim(), value);
            rest = tail.trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }

        let key_id = params
            .get("keyId")
            .ok_or(SignatureError::Malformed("no keyId"))?;
        let encoded = params
            .get("signature")
            .and_then(|s| s.strip_prefix('z'))
            .ok_or(SignatureError::Malformed("no base58btc signature"))?;
        let signature = bs58::decode(encoded)
            .into_vec()
            .ok()
            .and_then(|b| <[u8; 64]>::try_from(b).ok())
            .ok_or(SignatureError::Malformed("signature is not 64 bytes"))?;

        Ok(Self {
            key_id: key_id.to_string(),
            algorithm: params.get("algorithm").map(|a| a.to_string()),
            headers: params
                .get("headers")
                .unwrap_or(&"date")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            signature,
        })
    }
}

impl SignatureHeader {
    /// Check the signature over a request, reading header values via
    /// `header`. A signed `date` must be within five minutes of now.
    pub fn verify(
        &self,
        method: &str,
        path_and_query: &str,
        header: impl Fn(&str) -> Option<String>,
        key: &VerifyingKey,
    ) -> Result<(), SignatureError> {
        if let Some(alg) = &self.algorithm {
            if !alg.eq_ignore_ascii_case("ed25519") && alg != "hs2019" {
                return Err(SignatureError::Algorithm(alg.clone()));
            }
        }

        let mut lines = Vec::with_capacity(self.headers.len());
        for name in &self.headers {
            if name == "(request-target)" {
                lines.push(format!(
                    "{name}: {} {path_and_query}",
                    method.to_ascii_lowercase()
                ));
                continue;
            }
            let value = header(name).ok_or_else(|| SignatureError::MissingHeader(name.clone()))?;
            if name == "date" && !within_skew(&value) {
                return Err(SignatureError::Skewed(value));
            }
            lines.push(format!("{name}: {value}"));
        }

        key.verify(
            lines.join("\n").as_bytes(),
            &Signature::from_bytes(&self.signature),
        )
        .map_err(|_| SignatureError::Mismatch)
    }
}

fn within_skew(date: &str) -> bool {
    let Ok(at) = httpdate::parse_http_date(date) else {
        return false;
    };
    let now = SystemTime::now();
    let skew = now
        .duration_since(at)
        .or_else(|_| at.duration_since(now))
        .unwrap_or_default();
    skew <= MAX_CLOCK_SKEW
}
