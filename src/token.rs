//! Tenant token issuance.
//!
//! Every call produces a fresh signature over fresh timestamps; nothing is
//! cached or reused between calls.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::Header;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::TokenConfig;
use crate::keys::SigningKey;
use crate::{Error, Result};

/// Claim names owned by the issuer; custom claims may not override these.
const RESERVED_CLAIMS: [&str; 5] = ["iss", "sub", "aud", "iat", "exp"];

/// Signed claim set
#[derive(Debug, Serialize)]
pub struct TokenClaims {
    /// Issuer URL
    pub iss: String,
    /// Fixed tenant identity
    pub sub: String,
    /// Downstream service URL
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp), always `iat + ttl`
    pub exp: i64,
    /// Deployment-variant custom claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Issues short-lived tenant identity tokens under the shared signing key.
#[derive(Debug)]
pub struct TokenIssuer {
    key: Arc<SigningKey>,
    issuer: String,
    subject: String,
    audience: String,
    ttl_secs: i64,
}

impl TokenIssuer {
    /// Build an issuer from the startup configuration and the shared key
    #[must_use]
    pub fn new(config: &TokenConfig, key: Arc<SigningKey>) -> Self {
        Self {
            key,
            issuer: config.issuer.clone(),
            subject: config.subject.clone(),
            audience: config.audience.clone(),
            ttl_secs: i64::try_from(config.ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Issue a freshly signed compact token.
    ///
    /// `iat` and `exp` derive from a single clock read. Custom claims merge
    /// into the payload but never displace the reserved claim set.
    ///
    /// # Errors
    ///
    /// [`Error::Signing`] if the cryptographic backend rejects the operation.
    pub fn issue(&self, custom: Option<&Map<String, Value>>) -> Result<String> {
        let now = Utc::now().timestamp();

        let mut extra = Map::new();
        if let Some(custom) = custom {
            for (name, value) in custom {
                if RESERVED_CLAIMS.contains(&name.as_str()) {
                    continue;
                }
                extra.insert(name.clone(), value.clone());
            }
        }

        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: self.subject.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + self.ttl_secs,
            extra,
        };

        let mut header = Header::new(self.key.algorithm());
        header.kid = self.key.key_id().map(str::to_owned);

        jsonwebtoken::encode(&header, &claims, self.key.encoding()).map_err(Error::Signing)
    }
}
