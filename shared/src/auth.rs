//! Cognito ID token verification against a cached JWKS.

use crate::config::Config;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// How long a fetched key set is served before the next request refreshes it.
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);
const JWKS_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Verified identity of the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token missing kid header")]
    MissingKeyId,
    #[error("token key {0} not found in JWKS")]
    UnknownKeyId(String),
    #[error("failed to fetch JWKS: {0}")]
    KeyFetch(String),
    #[error("token rejected: {0}")]
    Invalid(String),
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Jwk {
    pub kid: String,
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
}

impl Jwk {
    fn algorithm(&self) -> Result<Algorithm, AuthError> {
        self.alg
            .as_deref()
            .unwrap_or("RS256")
            .parse()
            .map_err(|_| AuthError::Invalid(format!("unsupported key algorithm on {}", self.kid)))
    }

    fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        if self.kty != "RSA" {
            return Err(AuthError::Invalid(format!("unsupported key type {}", self.kty)));
        }
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| AuthError::Invalid(format!("invalid key {}: {}", self.kid, e)))
    }
}

/// Where signing keys come from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<Jwks, AuthError>;
}

/// Fetches the user pool's well-known JWKS document.
pub struct HttpKeySource {
    http_client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(url: impl Into<String>) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(JWKS_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AuthError::KeyFetch(format!("failed building HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self) -> Result<Jwks, AuthError> {
        tracing::debug!(url = %self.url, "Fetching JWKS");
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyFetch(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(format!("invalid JWKS JSON: {}", e)))
    }
}

/// Fixed key set, for tests and local runs.
pub struct StaticKeySource(pub Jwks);

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch(&self) -> Result<Jwks, AuthError> {
        Ok(self.0.clone())
    }
}

struct CachedKeys {
    jwks: Arc<Jwks>,
    fetched_at: Instant,
}

/// Single shared slot holding the last fetched key set.
///
/// Refresh is lazy and unsynchronized: concurrent requests that all see a
/// stale slot each fetch, and the last write wins.
pub struct KeyCache {
    source: Arc<dyn KeySource>,
    ttl: Duration,
    slot: RwLock<Option<CachedKeys>>,
}

impl KeyCache {
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            slot: RwLock::new(None),
        }
    }

    pub async fn keys(&self) -> Result<Arc<Jwks>, AuthError> {
        self.keys_at(Instant::now()).await
    }

    pub(crate) async fn keys_at(&self, now: Instant) -> Result<Arc<Jwks>, AuthError> {
        {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref() {
                if now.saturating_duration_since(cached.fetched_at) < self.ttl {
                    return Ok(Arc::clone(&cached.jwks));
                }
            }
        }

        let jwks = Arc::new(self.source.fetch().await?);
        tracing::info!(keys = jwks.keys.len(), "JWKS cache refreshed");
        *self.slot.write().await = Some(CachedKeys {
            jwks: Arc::clone(&jwks),
            fetched_at: now,
        });
        Ok(jwks)
    }
}

/// Verifies bearer ID tokens issued by the configured user pool.
pub struct TokenVerifier {
    keys: KeyCache,
    audience: String,
    issuer: String,
}

impl TokenVerifier {
    pub fn new(source: Arc<dyn KeySource>, audience: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            keys: KeyCache::new(source, JWKS_CACHE_TTL),
            audience: audience.into(),
            issuer: issuer.into(),
        }
    }

    pub fn from_config(config: &Config, source: Arc<dyn KeySource>) -> Self {
        Self::new(source, config.cognito_client_id.clone(), config.issuer())
    }

    /// Verify the value of an `Authorization` header and return its claims.
    pub async fn verify(&self, authorization: Option<&str>) -> Result<Claims, AuthError> {
        let token = extract_token(authorization)?;

        let header = decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;

        let jwks = self.keys.keys().await?;
        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.clone()))?;

        let algorithm = jwk.algorithm()?;
        if header.alg != algorithm {
            return Err(AuthError::Invalid(format!(
                "token alg {:?} does not match key alg {:?}",
                header.alg, algorithm
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &jwk.decoding_key()?, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })?
            .claims;

        // Checked against the wall clock even though decode already validated exp.
        if now_unix_secs() > claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}

fn extract_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization.unwrap_or_default().trim_start();
    let token = match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => &value[7..],
        _ => value,
    }
    .trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// RSA key pair and matching JWKS used to mint tokens in tests.
#[cfg(test)]
pub(crate) mod test_keys {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub const SIGNING_KEY_PEM: &str = include_str!("../testdata/signing_key.pem");
    pub const JWKS_JSON: &str = include_str!("../testdata/jwks.json");
    pub const KID: &str = "test-key-1";

    pub fn jwks() -> Jwks {
        serde_json::from_str(JWKS_JSON).unwrap()
    }

    pub fn mint(kid: Option<&str>, claims: &Claims) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM.as_bytes()).unwrap();
        encode(&header, claims, &key).unwrap()
    }

    pub fn claims_for(config: &Config, sub: &str, exp: u64) -> Claims {
        Claims {
            sub: sub.to_string(),
            aud: config.cognito_client_id.clone(),
            iss: config.issuer(),
            exp,
            email: None,
        }
    }

    pub fn now() -> u64 {
        now_unix_secs()
    }
}
