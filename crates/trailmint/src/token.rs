//! OpenID Connect identity tokens.
//!
//! The token's cryptographic envelope is never verified here: the proving
//! service checks the provider's signature when it builds the proof, and the
//! ledger checks the proof. This module only decodes the claims and checks
//! structure and expiry, failing closed on anything unexpected.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

/// Reasons an identity token is unusable.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No token is stored or the token is empty.
    #[error("no identity token")]
    Missing,

    /// Not three dot-separated segments.
    #[error("identity token is not a compact JWS")]
    Malformed,

    /// The payload segment is not base64url.
    #[error("identity token payload is not base64url: {0}")]
    Encoding(String),

    /// The payload is not a JSON claims object.
    #[error("identity token claims are not valid JSON: {0}")]
    Claims(String),

    /// A required claim is absent or empty.
    #[error("identity token is missing the `{0}` claim")]
    MissingClaim(&'static str),

    /// `exp <= now`.
    #[error("identity token expired at {exp} (now {now})")]
    Expired {
        /// The token's `exp` claim.
        exp: u64,
        /// The time it was checked against.
        now: u64,
    },

    /// The token's nonce does not match the login session that requested it.
    #[error("identity token nonce does not match the login session")]
    NonceMismatch,
}

/// The `aud` claim: a single client id or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "client-id"`
    One(String),
    /// `"aud": ["client-id", ...]`
    Many(Vec<String>),
}

impl Audience {
    /// The client id used for address derivation: the sole value, or the
    /// first entry of a list.
    #[must_use]
    #[expect(clippy::ref_patterns, reason = "payloads are borrowed from a dereferenced self")]
    pub fn primary(&self) -> Option<&str> {
        match *self {
            Self::One(ref aud) => Some(aud.as_str()),
            Self::Many(ref auds) => auds.first().map(String::as_str),
        }
    }
}

/// Claims as they appear on the wire; everything optional so that a
/// missing claim is reported by name rather than as a JSON error.
#[derive(Clone, Debug, Default, Deserialize)]
struct RawClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
}

/// Decoded claims of a structurally valid token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claims {
    /// Issuer (`iss`).
    pub issuer: String,
    /// Stable per-user subject id (`sub`).
    pub subject: String,
    /// Client id (`aud`, primary value).
    pub audience: String,
    /// Expiry, seconds since the Unix epoch (`exp`).
    pub expires_at: u64,
    /// Issue time (`iat`), if present.
    pub issued_at: Option<u64>,
    /// Email (`email`), used for salt derivation.
    pub email: Option<String>,
    /// Nonce echoed by the provider (`nonce`).
    pub nonce: Option<String>,
}

/// An identity token together with its decoded claims.
///
/// Received once per login redirect and never mutated. Serializes as the raw
/// compact token.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityToken {
    raw: String,
    claims: Claims,
}

impl IdentityToken {
    /// Decode the claims without checking expiry.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(TokenError::Missing);
        }

        let mut segments = trimmed.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| TokenError::Encoding(err.to_string()))?;
        let claims: RawClaims =
            serde_json::from_slice(&decoded).map_err(|err| TokenError::Claims(err.to_string()))?;

        let non_empty = |value: Option<String>, name: &'static str| {
            value
                .filter(|text| !text.is_empty())
                .ok_or(TokenError::MissingClaim(name))
        };

        let audience = claims
            .aud
            .as_ref()
            .and_then(Audience::primary)
            .map(str::to_owned);

        Ok(Self {
            raw: trimmed.to_owned(),
            claims: Claims {
                issuer: non_empty(claims.iss, "iss")?,
                subject: non_empty(claims.sub, "sub")?,
                audience: non_empty(audience, "aud")?,
                expires_at: claims.exp.ok_or(TokenError::MissingClaim("exp"))?,
                issued_at: claims.iat,
                email: claims.email.filter(|email| !email.is_empty()),
                nonce: claims.nonce,
            },
        })
    }

    /// Decode and require `exp > now`.
    pub fn validate(raw: &str, now: u64) -> Result<Self, TokenError> {
        let token = Self::parse(raw)?;
        token.check_expiry(now)?;
        Ok(token)
    }

    /// Require `exp > now`.
    pub const fn check_expiry(&self, now: u64) -> Result<(), TokenError> {
        if self.claims.expires_at > now {
            Ok(())
        } else {
            Err(TokenError::Expired {
                exp: self.claims.expires_at,
                now,
            })
        }
    }

    /// Require the token's nonce to equal `expected`.
    pub fn check_nonce(&self, expected: &str) -> Result<(), TokenError> {
        match self.claims.nonce.as_deref() {
            Some(nonce) if nonce == expected => Ok(()),
            Some(_) | None => Err(TokenError::NonceMismatch),
        }
    }

    /// The compact token as received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The decoded claims.
    #[must_use]
    pub const fn claims(&self) -> &Claims {
        &self.claims
    }
}

impl TryFrom<String> for IdentityToken {
    type Error = TokenError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<IdentityToken> for String {
    fn from(token: IdentityToken) -> Self {
        token.raw
    }
}

/// Whether `raw` is a structurally valid, unexpired token at `now`.
///
/// Never fails: every decode error maps to `false` with a logged
/// diagnostic.
#[must_use]
pub fn is_valid(raw: &str, now: u64) -> bool {
    match IdentityToken::validate(raw, now) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(error = %err, "identity token rejected");
            false
        }
    }
}

/// Seconds since the Unix epoch, saturating at zero for clocks set before
/// 1970.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
