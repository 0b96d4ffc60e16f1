//! Signed cursor tokens
//!
//! A token is `base64url(claims_json) "." base64url(hmac_sha256(claims_json))`.
//! Clients treat it as opaque; the signature stops them from forging
//! positions. Any token that fails to parse or verify is reported as
//! `CursorNotFound`.

use crate::error::{BrookError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of generated signing keys
const HMAC_KEY_BYTES: usize = 32;

/// Opaque cursor handle given to consumers
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorToken(String);

impl CursorToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CursorToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CursorToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CursorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CursorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are long; the prefix is enough to tell them apart in logs
        let shown: String = self.0.chars().take(12).collect();
        write!(f, "CursorToken({}…)", shown)
    }
}

/// What a token resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum CursorClaims {
    /// Client-held position
    Simple {
        stream_id: String,
        partition: u32,
        offset: i64,
        issued_at_ms: i64,
    },
    /// Server-held position of one group member on one partition.
    /// `offset` is set only for groups that commit explicitly, and holds
    /// the position to read from and to commit.
    Group {
        stream_id: String,
        group: String,
        instance: String,
        partition: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<i64>,
        issued_at_ms: i64,
    },
}

impl CursorClaims {
    pub(crate) fn stream_id(&self) -> &str {
        match self {
            CursorClaims::Simple { stream_id, .. } | CursorClaims::Group { stream_id, .. } => {
                stream_id
            }
        }
    }

    pub(crate) fn partition(&self) -> u32 {
        match self {
            CursorClaims::Simple { partition, .. } | CursorClaims::Group { partition, .. } => {
                *partition
            }
        }
    }
}

/// Signs and verifies cursor tokens
pub(crate) struct CursorCodec {
    key: Vec<u8>,
}

impl fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorCodec").finish_non_exhaustive()
    }
}

impl CursorCodec {
    pub(crate) fn new(secret: &[u8]) -> Self {
        Self {
            key: secret.to_vec(),
        }
    }

    /// Codec with a random key; its tokens do not survive a restart
    pub(crate) fn random() -> Self {
        let mut key = vec![0u8; HMAC_KEY_BYTES];
        rand::thread_rng().fill(&mut key[..]);
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| BrookError::Config(format!("cursor secret: {}", e)))
    }

    pub(crate) fn encode(&self, claims: &CursorClaims) -> Result<CursorToken> {
        let payload = serde_json::to_vec(claims)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Ok(CursorToken(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        )))
    }

    pub(crate) fn decode(&self, token: &CursorToken) -> Result<CursorClaims> {
        let not_found = || BrookError::CursorNotFound(truncate(token.as_str()));

        let (payload, signature) = token.as_str().split_once('.').ok_or_else(not_found)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| not_found())?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| not_found())?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| not_found())?;

        serde_json::from_slice(&payload).map_err(|_| not_found())
    }
}

fn truncate(token: &str) -> String {
    token.chars().take(16).collect()
}
