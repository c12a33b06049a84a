//! One-shot JWKS fetch and the kid -> PEM map built from it.
//!
//! The fetch is started when a [`KeySetCache`] is created and its outcome is
//! memoized in a [`Shared`] future: every caller awaits the same fetch, and a
//! failure is returned to every caller. There is no refresh.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::jwk::{jwk_to_pem, Jwk};
use crate::{VerifyError, DEFAULT_FETCH_TIMEOUT_SECS};

/// Failure reported by a [`JwksFetcher`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected status {0}: {1}")]
    Status(u16, String),
    #[error("io error: {0}")]
    Io(String),
    #[error("fetch canceled")]
    Canceled,
}

/// Retrieves the JWKS document body for a URL.
///
/// Implemented for any `Fn(String) -> impl Future<Output = Result<String, FetchError>>`,
/// so tests can hand a closure to the verifier.
pub trait JwksFetcher {
    fn fetch(&self, url: String) -> BoxFuture<'static, Result<String, FetchError>>;
}

impl<F, Fut> JwksFetcher for F
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<String, FetchError>> + Send + 'static,
{
    fn fetch(&self, url: String) -> BoxFuture<'static, Result<String, FetchError>> {
        self(url).boxed()
    }
}

static DEFAULT_AGENT: Lazy<ureq::Agent> = Lazy::new(|| agent_with_timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)));

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout_connect(timeout).timeout_read(timeout).build()
}

/// Plain HTTPS GET through `ureq`.
///
/// The blocking request runs on its own thread and is handed back through a
/// oneshot channel, so the returned future can be polled by any executor.
#[derive(Debug, Clone)]
pub struct HttpsFetcher { agent: ureq::Agent }

impl Default for HttpsFetcher {
    fn default() -> Self { Self { agent: DEFAULT_AGENT.clone() } }
}

impl HttpsFetcher {
    pub fn with_timeout(secs: u64) -> Self { Self { agent: agent_with_timeout(Duration::from_secs(secs)) } }
}

impl JwksFetcher for HttpsFetcher {
    fn fetch(&self, url: String) -> BoxFuture<'static, Result<String, FetchError>> {
        let agent = self.agent.clone();
        let (tx, rx) = oneshot::channel();
        let spawned = std::thread::Builder::new().name("jwks-fetch".into()).spawn(move || {
            let _ = tx.send(get_blocking(&agent, &url));
        });
        if let Err(e) = spawned {
            // tx went down with the closure, so rx resolves to Canceled
            warn!(error = %e, "could not spawn jwks fetch thread");
        }
        async move { rx.await.unwrap_or(Err(FetchError::Canceled)) }.boxed()
    }
}

fn get_blocking(agent: &ureq::Agent, url: &str) -> Result<String, FetchError> {
    match agent.get(url).call() {
        Ok(resp) => resp.into_string().map_err(|e| FetchError::Io(e.to_string())),
        Err(ureq::Error::Status(code, resp)) => Err(FetchError::Status(code, resp.status_text().to_string())),
        Err(e) => Err(FetchError::Http(e.to_string())),
    }
}

/// Issuer URL for a user pool. The region is the pool id up to the first `_`;
/// that convention is assumed, not checked.
pub fn issuer_url_for(user_pool_id: &str, host_template: &str) -> String {
    let region = user_pool_id.split('_').next().unwrap_or(user_pool_id);
    let host = host_template.replace("{region}", region);
    format!("https://{host}/{user_pool_id}")
}

pub fn jwks_url_for(issuer_url: &str) -> String {
    format!("{issuer_url}/.well-known/jwks.json")
}

/// Immutable kid -> PEM map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet { pems: HashMap<String, String> }

#[derive(Deserialize)]
struct RawJwks { keys: Vec<Json> }

impl KeySet {
    /// Parses a JWKS body. A body that is not `{"keys": [...]}` is a
    /// `KeySetParse` error; a bad entry inside it is a `KeyFormat` error.
    pub fn from_json(body: &str) -> Result<Self, VerifyError> {
        let raw: RawJwks = serde_json::from_str(body).map_err(|e| VerifyError::KeySetParse(e.to_string()))?;
        let keys = raw.keys.into_iter()
            .map(|v| serde_json::from_value::<Jwk>(v).map_err(|e| VerifyError::KeyFormat(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_jwks(&keys)
    }

    pub fn from_jwks(keys: &[Jwk]) -> Result<Self, VerifyError> {
        let mut pems = HashMap::with_capacity(keys.len());
        for jwk in keys {
            let kid = jwk.kid.clone().ok_or_else(|| VerifyError::KeyFormat("missing 'kid'".into()))?;
            let pem = jwk_to_pem(jwk)?;
            if pems.insert(kid.clone(), pem).is_some() {
                warn!(kid = %kid, "duplicate kid in jwks, keeping the later key");
            }
        }
        Ok(Self { pems })
    }

    pub fn get(&self, kid: &str) -> Option<&str> { self.pems.get(kid).map(String::as_str) }
    pub fn contains(&self, kid: &str) -> bool { self.pems.contains_key(kid) }
    pub fn len(&self) -> usize { self.pems.len() }
    pub fn is_empty(&self) -> bool { self.pems.is_empty() }
    pub fn kids(&self) -> impl Iterator<Item = &str> { self.pems.keys().map(String::as_str) }
}

type SharedKeySet = Shared<BoxFuture<'static, Result<Arc<KeySet>, VerifyError>>>;

/// The key set of one issuer, fetched exactly once.
#[derive(Clone)]
pub struct KeySetCache {
    jwks_uri: String,
    keys: SharedKeySet,
}

impl fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetCache")
            .field("jwks_uri", &self.jwks_uri)
            .field("resolved", &self.keys.peek().is_some())
            .finish()
    }
}

impl KeySetCache {
    /// Calls `fetcher` once, right away, and memoizes the parsed result.
    pub fn new<F: JwksFetcher + ?Sized>(jwks_uri: &str, fetcher: &F) -> Self {
        info!(jwks_uri = %jwks_uri, "fetching jwks");
        let pending = fetcher.fetch(jwks_uri.to_string());
        let uri = jwks_uri.to_string();
        let keys = async move {
            let body = pending.await.map_err(|e| {
                warn!(jwks_uri = %uri, error = %e, "jwks fetch failed");
                VerifyError::KeySetFetch(e.to_string())
            })?;
            let set = KeySet::from_json(&body).inspect_err(|e| warn!(jwks_uri = %uri, error = %e, "jwks rejected"))?;
            debug!(jwks_uri = %uri, keys = set.len(), "jwks loaded");
            Ok(Arc::new(set))
        }
        .boxed()
        .shared();
        Self { jwks_uri: jwks_uri.to_string(), keys }
    }

    pub fn jwks_uri(&self) -> &str { &self.jwks_uri }

    /// Waits for the one fetch to finish. Every call sees the same outcome.
    pub async fn get(&self) -> Result<Arc<KeySet>, VerifyError> {
        self.keys.clone().await
    }

    /// The outcome, if some caller has already driven the fetch to completion.
    pub fn peek(&self) -> Option<Result<Arc<KeySet>, VerifyError>> {
        self.keys.peek().cloned()
    }
}
