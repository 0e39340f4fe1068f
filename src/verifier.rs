// Turns a raw request header map into verified claims, or fails with the
// specific reason so the handler can log it before masking it.
use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::jwks::{jwks_url, JwksCache};

/// Claims we actually read, typed instead of duck-typed dictionary access.
/// The tenant identifier is optional here; the handler decides what a missing
/// value means for the response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub exp: u64,
    #[serde(rename = "custom:tenant_id", default)]
    pub tenant_id: Option<String>,
}

/// Only the issuer is read before the signature check.
#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
    iss: String,
}

/// Extract the bearer token from `headers`, verify it against its issuer's
/// published keys, and return it together with the now-trusted claims.
///
/// Verification order: locate header, peek `iss` (unverified), resolve the
/// signing key by `kid` from the issuer's JWKS, verify the RS256 signature,
/// then check `exp` with zero leeway (a token expiring exactly now is still
/// valid).
pub async fn process_token(
    headers: &HashMap<String, String>,
    jwks: &JwksCache,
) -> Result<(String, Claims), AuthError> {
    let raw_value = headers
        .get("Authorization")
        .or_else(|| headers.get("authorization"))
        .ok_or(AuthError::MissingAuthorization)?;

    // Second whitespace-delimited field; the scheme is ignored positionally.
    let token = raw_value
        .split_whitespace()
        .nth(1)
        .ok_or(AuthError::MissingAuthorization)?;

    let issuer = peek_issuer(token)?;
    let user_pool_id = issuer.rsplit('/').next().unwrap_or_default();
    debug!("Token issued by user pool {}", user_pool_id);

    let key_set = jwks.get_keys(&jwks_url(&issuer)).await?;

    let header =
        decode_header(token).map_err(|e| AuthError::TokenDecode(format!("bad header: {}", e)))?;
    let kid = header
        .kid
        .ok_or_else(|| AuthError::TokenDecode("token has no `kid` header field".to_string()))?;

    let jwk = find_kid_in_key_set(&kid, &key_set)?;
    let decoding_key = decoding_key_for(&jwk)?;
    let claims = decode_and_validate(token, &decoding_key)?;

    Ok((token.to_string(), claims))
}

// Decode the payload segment without verification, only to discover `iss`.
fn peek_issuer(token: &str) -> Result<String, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::TokenDecode("token is not in compact JWS form".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::TokenDecode(format!("payload is not base64url: {}", e)))?;
    let unverified: UnverifiedClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::TokenDecode(format!("payload is not claims JSON: {}", e)))?;
    Ok(unverified.iss)
}

// Linear scan; JWKS sets are small (typically under ten keys).
fn find_kid_in_key_set(kid: &str, key_set: &JwkSet) -> Result<Jwk, AuthError> {
    match key_set.find(kid) {
        Some(jwk) => Ok(jwk.clone()),
        None => Err(AuthError::KeyNotFound(kid.to_string())),
    }
}

// Build the decoding key from a JWK. We only support RSA keys (RS256).
fn decoding_key_for(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    match jwk.algorithm {
        AlgorithmParameters::RSA(ref rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| AuthError::TokenDecode(format!("bad RSA components in JWK: {}", e))),
        _ => Err(AuthError::TokenDecode(
            "unsupported JWK key type, only RSA is accepted".to_string(),
        )),
    }
}

fn decode_and_validate(token: &str, decoding_key: &DecodingKey) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;
    // Zero leeway: expired strictly when current time > exp.
    validation.leeway = 0;
    validation.validate_aud = false;

    match decode::<Claims>(token, decoding_key, &validation) {
        Ok(token_data) => Ok(token_data.claims),
        Err(e) => Err(match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::SignatureVerification,
            _ => AuthError::TokenDecode(e.to_string()),
        }),
    }
}
