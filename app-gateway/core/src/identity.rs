use crate::session::SessionCertificate;
use chrono::{DateTime, Utc};

/// A verified caller identity, derived from the client certificate bound to
/// a session. Request-scoped: it exists only for the lifetime of the request
/// that resolved it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub username: String,

    /// Validity window of the certificate the identity was derived from.
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl Identity {
    pub fn from_certificate(cert: &SessionCertificate) -> Self {
        Self {
            username: cert.subject.clone(),
            not_before: cert.not_before,
            not_after: cert.not_after,
        }
    }
}
