use crate::{
    access::AccessChecker,
    ca::{CertAuthority, CertAuthorityId},
    session::{Session, SessionRequest},
    Application,
};
use anyhow::Result;
use std::sync::Arc;

/// Read paths into the cluster's auth subsystem that the gateway consumes.
///
/// Every lookup is fresh per request; caching, rotation, and consistency
/// are the implementation's concern. Nothing here mutates cluster state.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// The name of the cluster terminating the request.
    fn cluster_name(&self) -> &str;

    /// Looks up a registered application by name.
    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>>;

    /// Looks up a session record on the session store.
    async fn get_session(&self, req: &SessionRequest) -> Result<Option<Session>>;

    /// Resolves the role set bound to a session into an access checker.
    async fn role_set(&self, session: &Session) -> Result<Arc<dyn AccessChecker>>;

    /// Fetches a certificate authority from the cluster's key store.
    async fn get_cert_authority(&self, id: &CertAuthorityId) -> Result<CertAuthority>;
}
