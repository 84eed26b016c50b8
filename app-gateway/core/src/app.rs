use std::fmt;

/// Namespace applications are registered under when none is specified.
pub const DEFAULT_NAMESPACE: &str = "default";

/// A backend web application published for proxied access.
///
/// Applications are registered by the cluster's service-discovery subsystem
/// and immutable from the gateway's perspective; the gateway only looks them
/// up by name, per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    /// The subdomain label the application is addressed by.
    pub name: String,

    /// Identifies the cluster host whose agent published the application.
    pub host_id: String,

    /// The loopback address the application listens on at its host. The
    /// tunnel routes to the host; this is the final local hop.
    pub internal_addr: String,
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}
