
#![forbid(unsafe_code)]

//! RS256 identity-token verification against a user pool's published JWKS.
//!
//! A [`Verifier`] fetches the pool's key set once, when it is built, and
//! every [`Verifier::verify`] call awaits that same fetch. Keys are never
//! refreshed for the lifetime of the verifier.

pub mod claims;
pub mod jwk;
pub mod keyset;
pub mod signature;
pub mod token;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use claims::{Aud, Claims};
pub use jwk::{jwk_to_pem, pem_to_jwk, Jwk, Jwks};
pub use keyset::{FetchError, HttpsFetcher, JwksFetcher, KeySet, KeySetCache};
pub use token::{decode, decode_complete, DecodedToken, Header};
pub use verifier::Verifier;

use serde::{Deserialize, Serialize};

/// The only `token_use` value this crate accepts.
pub const ID_TOKEN_USE: &str = "id";

/// The only signing algorithm this crate accepts.
pub const RS256: &str = "RS256";

/// Default host for user pool issuers; `{region}` is replaced by the pool id prefix.
pub const DEFAULT_ISSUER_HOST: &str = "cognito-idp.{region}.amazonaws.com";

/// Connect and read timeout of the default JWKS fetcher.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOptions {
    pub leeway_secs: i64,
    pub now: Option<i64>,
    pub issuer_host_template: String,
    pub fetch_timeout_secs: u64,
}
impl Default for VerifyOptions {
    fn default() -> Self {
        Self { leeway_secs: 0, now: None, issuer_host_template: DEFAULT_ISSUER_HOST.to_string(), fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS }
    }
}
impl VerifyOptions {
    pub fn with_leeway(mut self, secs: i64) -> Self { self.leeway_secs = secs; self }
    pub fn with_now(mut self, now: i64) -> Self { self.now = Some(now); self }
    pub fn with_issuer_host(mut self, template: &str) -> Self { self.issuer_host_template = template.to_string(); self }
    pub fn with_fetch_timeout(mut self, secs: u64) -> Self { self.fetch_timeout_secs = secs; self }

    /// Current unix time, honouring the `now` override.
    pub fn now(&self) -> i64 { self.now.unwrap_or_else(now_ts) }
}

/// Every way a verification can fail.
///
/// `Clone` because a single key-set failure is handed to every pending and
/// future `verify` call on the same verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("jwks fetch failed: {0}")]
    KeySetFetch(String),
    #[error("jwks parse error: {0}")]
    KeySetParse(String),
    #[error("bad jwk: {0}")]
    KeyFormat(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("no key in jwks for kid {0:?}")]
    UnknownKeyId(String),
    #[error("issuer mismatch: expected {expected}, got {actual:?}")]
    IssuerMismatch { expected: String, actual: String },
    #[error("token_use must be 'id', not {0:?}")]
    InvalidTokenUse(String),
    #[error("alg not allowed (expected RS256, got {0:?})")]
    AlgorithmNotAllowed(String),
    #[error("invalid signature")]
    SignatureInvalid,
    #[error("claim 'exp' expired")]
    TokenExpired,
    #[error("claim 'nbf' in future")]
    TokenNotYetValid,
}

/// Fieldless mirror of [`VerifyError`] for callers that only branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    KeySetFetch,
    KeySetParse,
    KeyFormat,
    MalformedToken,
    UnknownKeyId,
    IssuerMismatch,
    InvalidTokenUse,
    AlgorithmNotAllowed,
    SignatureInvalid,
    TokenExpired,
    TokenNotYetValid,
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::KeySetFetch(_) => ErrorKind::KeySetFetch,
            VerifyError::KeySetParse(_) => ErrorKind::KeySetParse,
            VerifyError::KeyFormat(_) => ErrorKind::KeyFormat,
            VerifyError::MalformedToken(_) => ErrorKind::MalformedToken,
            VerifyError::UnknownKeyId(_) => ErrorKind::UnknownKeyId,
            VerifyError::IssuerMismatch { .. } => ErrorKind::IssuerMismatch,
            VerifyError::InvalidTokenUse(_) => ErrorKind::InvalidTokenUse,
            VerifyError::AlgorithmNotAllowed(_) => ErrorKind::AlgorithmNotAllowed,
            VerifyError::SignatureInvalid => ErrorKind::SignatureInvalid,
            VerifyError::TokenExpired => ErrorKind::TokenExpired,
            VerifyError::TokenNotYetValid => ErrorKind::TokenNotYetValid,
        }
    }

    /// True for failures of the cryptographic check itself, as opposed to
    /// structural, policy, or key-set failures.
    pub fn is_cryptographic(&self) -> bool {
        matches!(self, VerifyError::SignatureInvalid)
    }
}

pub fn now_ts() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
