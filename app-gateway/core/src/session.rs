use chrono::{DateTime, Utc};

/// Which subsystem a record on the shared session store belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// A session minted for proxied application access.
    App,

    /// A browser session on the gateway's own web UI.
    Web,
}

/// Key for a session-store lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionRequest {
    pub kind: SessionKind,
    pub user: String,
    pub parent_hash: String,
    pub session_id: String,
}

/// Client certificate material the auth subsystem bound to a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCertificate {
    /// Subject common name; the authenticated username.
    pub subject: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// A session record read from the external session store.
///
/// Sessions are created and destroyed by the auth subsystem; the gateway
/// only reads them. An expired session is equivalent to no session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub session_id: String,
    pub parent_hash: String,
    pub expires: DateTime<Utc>,
    pub certificate: SessionCertificate,

    /// Names of the roles bound to the session; the policy subsystem
    /// resolves them into a checker.
    pub roles: Vec<String>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}
