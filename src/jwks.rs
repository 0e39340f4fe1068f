// Process-wide cache for issuer JWKS documents so the identity provider's
// public keys are not refetched on every request.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use log::info;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::AuthError;

/// How long a fetched key set stays fresh in the global cache. Bounded so
/// identity-provider key rotation is eventually picked up.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Timeout for the JWKS HTTP fetch; an unreachable issuer fails the request
/// instead of hanging it.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub fn jwks_url(issuer: &str) -> String {
    format!("{}/.well-known/jwks.json", issuer)
}

// Fetching is behind a trait to allow for unit testing without a network.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<JwkSet, AuthError>;
}

pub struct HttpKeyFetcher {
    client: reqwest::Client,
}

impl HttpKeyFetcher {
    pub fn new() -> HttpKeyFetcher {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build the JWKS HTTP client");
        HttpKeyFetcher { client }
    }
}

impl Default for HttpKeyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch_keys(&self, jwks_url: &str) -> Result<JwkSet, AuthError> {
        let response = self.client.get(jwks_url).send().await?.error_for_status()?;
        let keys = response.json::<JwkSet>().await?;
        Ok(keys)
    }
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct JwksCache {
    fetcher: Box<dyn KeyFetcher>,
    /// `None` means entries never expire for the lifetime of the process.
    max_age: Option<Duration>,
    entries: RwLock<HashMap<String, CachedKeys>>,
}

impl JwksCache {
    pub fn new(fetcher: Box<dyn KeyFetcher>, max_age: Option<Duration>) -> JwksCache {
        JwksCache {
            fetcher,
            max_age,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return the key set for `jwks_url`, fetching it at most once per
    /// freshness window. A fetch or parse failure is fatal for the calling
    /// request; nothing is cached on failure.
    pub async fn get_keys(&self, jwks_url: &str) -> Result<JwkSet, AuthError> {
        {
            let entries = self.entries.read();
            if let Some(cached) = entries.get(jwks_url) {
                let fresh = self
                    .max_age
                    .map_or(true, |max_age| cached.fetched_at.elapsed() < max_age);
                if fresh {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let keys = self.fetcher.fetch_keys(jwks_url).await?;
        info!("Fetched {} JWKs from {}", keys.keys.len(), jwks_url);

        self.entries.write().insert(
            jwks_url.to_string(),
            CachedKeys {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(keys)
    }
}

static GLOBAL_CACHE: Lazy<JwksCache> =
    Lazy::new(|| JwksCache::new(Box::new(HttpKeyFetcher::new()), Some(DEFAULT_MAX_AGE)));

/// The cache shared by every invocation within one warm process.
pub fn global() -> &'static JwksCache {
    &GLOBAL_CACHE
}
