use chrono::Utc;
use gatehouse_app_gateway_core::{Identity, JwtAlgorithm, JwtKeyPair};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

/// How long a signed assertion stays valid, sized for a single HTTP
/// exchange. Assertions are re-minted on every request, never cached: the
/// caller behind a tunnel connection may change between requests.
pub const ASSERTION_TTL_SECS: i64 = 60;

/// Claims asserted to the backend on the caller's behalf.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct AssertionClaims {
    pub sub: String,
    pub email: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Signs a bearer assertion binding `identity` for one forwarded call.
pub(crate) fn sign_assertion(
    keys: &JwtKeyPair,
    cluster: &str,
    identity: &Identity,
) -> anyhow::Result<String> {
    let now = Utc::now().timestamp();
    let claims = AssertionClaims {
        sub: identity.username.clone(),
        email: identity.username.clone(),
        iss: cluster.to_string(),
        iat: now,
        exp: now + ASSERTION_TTL_SECS,
        // Distinguishes assertions minted within the same second.
        jti: uuid::Uuid::new_v4().to_string(),
    };
    let (header, key) = match keys.algorithm {
        JwtAlgorithm::Rs256 => (
            Header::new(Algorithm::RS256),
            EncodingKey::from_rsa_pem(&keys.signing_key)?,
        ),
        JwtAlgorithm::Hs256 => (
            Header::new(Algorithm::HS256),
            EncodingKey::from_secret(&keys.signing_key),
        ),
    };
    Ok(encode(&header, &claims, &key)?)
}
