#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! The application-access serving surface: resolves the caller's session,
//! authorizes the request against the located application, dials the
//! application's host over the reverse-tunnel fabric, mints a signed
//! identity assertion, and forwards the request over the dialed connection.

mod cookie;
mod forward;
mod handler;
mod jwt;
mod locate;

pub use self::{
    cookie::{decode_session_cookie, encode_session_cookie, SessionCookie},
    handler::{Handler, NotFound, LOGIN_PATH},
    jwt::ASSERTION_TTL_SECS,
};

/// Name of the cookie carrying the gateway's application session.
pub const SESSION_COOKIE: &str = "app_session";

/// Header carrying the signed identity assertion to the backend.
pub const JWT_ASSERTION_HEADER: &str = "x-teleport-jwt-assertion";

/// Compatibility alias for backends that already consume an access-proxy
/// token header.
pub const JWT_ASSERTION_COMPAT_HEADER: &str = "Cf-access-token";

#[cfg(test)]
mod tests;
