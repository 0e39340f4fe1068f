use thiserror::Error;

/// Everything that can go wrong between receiving an event and answering it.
/// All variants are fatal for the current request; there are no retries.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("event has no headers section")]
    MissingHeaders,

    #[error("no Authorization header, or header has no bearer token field")]
    MissingAuthorization,

    #[error("malformed token: {0}")]
    TokenDecode(String),

    #[error("no JWK matching kid `{0}` in the issuer's key set")]
    KeyNotFound(String),

    #[error("token signature verification failed")]
    SignatureVerification,

    #[error("token is expired")]
    TokenExpired,

    #[error("no tenant_id attribute found in claims")]
    MissingTenantClaim,

    #[error("JWKS fetch failed: {0}")]
    JwksFetch(#[from] reqwest::Error),

    #[error("AssumeRole failed: {0}")]
    AssumeRole(String),

    #[error("tenant data query failed: {0}")]
    DataQuery(String),
}
