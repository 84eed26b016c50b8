use crate::access::AccessDenied;
use thiserror::Error;

/// Stage-typed failures of the request pipeline.
///
/// Stages return these instead of writing responses; the top-level handler
/// is the single place failures are mapped onto HTTP responses. None of
/// them is fatal to the process.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No session cookie on the request, or an empty one.
    #[error("missing session credential")]
    MissingCredential,

    /// The session cookie could not be decoded.
    #[error("malformed session credential")]
    MalformedCredential(#[source] anyhow::Error),

    /// No live session matched the presented credential.
    #[error("no session found for user {user}")]
    SessionNotFound { user: String },

    /// The Host header does not carry an application label.
    #[error("invalid host header {host:?}")]
    InvalidHost { host: String },

    /// The host label is not a registered application.
    #[error("application {name} not registered")]
    ApplicationNotFound { name: String },

    /// The policy denied access.
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    /// The tunnel fabric could not produce a connection to the backend.
    /// Distinct from [`GatewayError::AccessDenied`]: the caller was allowed,
    /// the backend is down.
    #[error("backend for application {app} unavailable")]
    BackendUnavailable {
        app: String,
        #[source]
        source: anyhow::Error,
    },

    /// The cluster's host certificate authority could not be fetched.
    #[error("host certificate authority unavailable")]
    CaUnavailable(#[source] anyhow::Error),

    /// Signing the identity assertion failed.
    #[error("failed to sign identity assertion")]
    SigningFailure(#[source] anyhow::Error),

    /// The forwarded round trip failed.
    #[error("failed to forward request to backend")]
    ForwardingFailure(#[source] anyhow::Error),
}

impl GatewayError {
    /// Failures that send the caller to the login flow.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            GatewayError::MissingCredential
                | GatewayError::MalformedCredential(_)
                | GatewayError::SessionNotFound { .. }
        )
    }

    /// Failures that hand the request to the next handler: the host may
    /// legitimately not be an application.
    pub fn is_fallthrough(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidHost { .. } | GatewayError::ApplicationNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_are_unauthenticated() {
        assert!(GatewayError::MissingCredential.is_unauthenticated());
        assert!(GatewayError::SessionNotFound {
            user: "alice".to_string()
        }
        .is_unauthenticated());
        assert!(!GatewayError::MissingCredential.is_fallthrough());
    }

    #[test]
    fn host_failures_fall_through() {
        assert!(GatewayError::InvalidHost {
            host: String::new()
        }
        .is_fallthrough());
        assert!(GatewayError::ApplicationNotFound {
            name: "billing".to_string()
        }
        .is_fallthrough());
        assert!(!GatewayError::AccessDenied(AccessDenied {
            app: "billing".to_string()
        })
        .is_fallthrough());
    }
}
