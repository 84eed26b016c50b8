use crate::SESSION_COOKIE;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use gatehouse_app_gateway_core::GatewayError;
use http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

/// The decoded contents of the gateway's session cookie. Only a key into
/// the session store; the session record itself never leaves the store.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionCookie {
    pub user: String,
    pub parent_hash: String,
    pub session_id: String,
}

/// Locates and decodes the session cookie on a request.
///
/// A missing or empty cookie and an undecodable one are distinct failures,
/// but both send the caller to the login flow.
pub(crate) fn extract_session_cookie(headers: &HeaderMap) -> Result<SessionCookie, GatewayError> {
    let value = request_cookies(headers)
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .ok_or(GatewayError::MissingCredential)?;
    if value.is_empty() {
        return Err(GatewayError::MissingCredential);
    }
    decode_session_cookie(value).map_err(GatewayError::MalformedCredential)
}

/// Decodes a session cookie value: base64 over a JSON payload.
pub fn decode_session_cookie(value: &str) -> anyhow::Result<SessionCookie> {
    let bytes = URL_SAFE_NO_PAD.decode(value)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encodes a session cookie value. The counterpart used by the subsystem
/// that mints sessions, and by tests.
pub fn encode_session_cookie(cookie: &SessionCookie) -> String {
    let json = serde_json::to_vec(cookie).expect("session cookie must serialize");
    URL_SAFE_NO_PAD.encode(json)
}

/// Iterates `name=value` pairs across every `Cookie` header on a request.
pub(crate) fn request_cookies(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> + '_ {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
}
