use std::sync::Arc;

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::claims::{self, Claims};
use crate::keyset::{issuer_url_for, jwks_url_for, HttpsFetcher, JwksFetcher, KeySet, KeySetCache};
use crate::signature::verify_decoded;
use crate::token::{decode_complete, DecodedToken};
use crate::{VerifyError, VerifyOptions};

/// Verifies ID tokens issued by one user pool.
///
/// The pool's JWKS is requested as soon as the verifier is built. Every
/// [`verify`](Self::verify) call waits on that single request, and its
/// outcome (keys or error) is kept for the life of the verifier. Keys that
/// the pool rotates in later are not picked up; build a new verifier.
#[derive(Debug, Clone)]
pub struct Verifier {
    user_pool_id: String,
    issuer_url: String,
    opts: VerifyOptions,
    keys: KeySetCache,
}

impl Verifier {
    /// Fetches keys over HTTPS with default options.
    pub fn new(user_pool_id: &str) -> Self {
        Self::with_options(user_pool_id, &HttpsFetcher::default(), VerifyOptions::default())
    }

    pub fn with_https(user_pool_id: &str, opts: VerifyOptions) -> Self {
        let fetcher = HttpsFetcher::with_timeout(opts.fetch_timeout_secs);
        Self::with_options(user_pool_id, &fetcher, opts)
    }

    /// Fetches keys through `fetcher`, which is called exactly once, here.
    pub fn with_fetcher<F: JwksFetcher + ?Sized>(user_pool_id: &str, fetcher: &F) -> Self {
        Self::with_options(user_pool_id, fetcher, VerifyOptions::default())
    }

    pub fn with_options<F: JwksFetcher + ?Sized>(user_pool_id: &str, fetcher: &F, opts: VerifyOptions) -> Self {
        let issuer_url = issuer_url_for(user_pool_id, &opts.issuer_host_template);
        let keys = KeySetCache::new(&jwks_url_for(&issuer_url), fetcher);
        Self { user_pool_id: user_pool_id.to_string(), issuer_url, opts, keys }
    }

    pub fn user_pool_id(&self) -> &str { &self.user_pool_id }
    pub fn issuer_url(&self) -> &str { &self.issuer_url }
    pub fn jwks_uri(&self) -> &str { self.keys.jwks_uri() }
    pub fn options(&self) -> &VerifyOptions { &self.opts }

    /// The pool's key set, once the fetch has finished.
    pub async fn key_set(&self) -> Result<Arc<KeySet>, VerifyError> {
        self.keys.get().await
    }

    /// Decodes and verifies `token`, returning its claims.
    ///
    /// Steps, each failing with its own error: wait for the key set, decode
    /// the token, find the key for its `kid`, check `iss` and `token_use`,
    /// then check the RS256 signature and `exp`/`nbf`.
    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let keys = self.keys.get().await?;
        self.verify_with_key_set(token, &keys)
    }

    /// Synchronous [`verify`](Self::verify) against an already resolved key set.
    pub fn verify_with_key_set(&self, token: &str, keys: &KeySet) -> Result<Claims, VerifyError> {
        let decoded = decode_complete(token)?;
        let kid = decoded.header.kid.as_deref()
            .ok_or_else(|| VerifyError::MalformedToken("missing kid in header".into()))?;
        let pem = keys.get(kid).ok_or_else(|| {
            warn!(kid = %kid, jwks_uri = %self.jwks_uri(), "kid not in jwks");
            VerifyError::UnknownKeyId(kid.to_string())
        })?;
        debug!(kid = %kid, "verifying token");
        self.check(&decoded, pem)
    }

    /// Verifies `token` against one PEM key, skipping the key set.
    pub fn verify_with_pem(&self, token: &str, pem: &str) -> Result<Claims, VerifyError> {
        let decoded = decode_complete(token)?;
        self.check(&decoded, pem)
    }

    /// Payload of `token`, unverified.
    pub fn decode(&self, token: &str) -> Result<Map<String, Json>, VerifyError> {
        crate::token::decode(token)
    }

    /// Header, payload and signature of `token`, unverified.
    pub fn decode_complete(&self, token: &str) -> Result<DecodedToken, VerifyError> {
        decode_complete(token)
    }

    // Issuer and token_use are checked on the still-unverified payload so that
    // foreign or access tokens are turned away before any RSA work.
    fn check(&self, decoded: &DecodedToken, pem: &str) -> Result<Claims, VerifyError> {
        let unverified = Claims::from_payload(decoded.payload.clone())?;
        claims::validate(&unverified, &self.issuer_url)
            .and_then(|_| verify_decoded(decoded, pem, &self.opts))
            .inspect_err(|e| warn!(issuer = %self.issuer_url, error = %e, "token rejected"))
    }
}
