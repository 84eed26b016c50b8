use crate::Application;
use std::{fmt, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};

/// Tags the kind of traffic a tunnel connection carries, so the fabric can
/// multiplex application, SSH, and Kubernetes traffic over one transport.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnType {
    App,
    Ssh,
    Kube,
}

impl ConnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnType::App => "app",
            ConnType::Ssh => "node",
            ConnType::Kube => "kube",
        }
    }
}

impl fmt::Display for ConnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// Parameters selecting a specific backend host over the tunnel fabric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialParams {
    /// Composite routing key: `{host_id}.{cluster}`.
    pub server_id: String,
    pub conn_type: ConnType,
}

impl DialParams {
    /// Routing parameters for an application's host within `cluster`.
    pub fn to_app(app: &Application, cluster: &str) -> Self {
        Self {
            server_id: format!("{}.{}", app.host_id, cluster),
            conn_type: ConnType::App,
        }
    }
}

/// Byte stream obtained from the reverse-tunnel fabric.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// A live connection to a backend host. Owned exclusively by the request
/// that dialed it; never pooled or shared.
pub type TunnelStream = Box<dyn Io>;

/// A cluster reachable over the reverse-tunnel fabric.
#[async_trait::async_trait]
pub trait RemoteSite: Send + Sync {
    fn name(&self) -> &str;

    /// Obtains a live connection to the host selected by `params`. Blocking
    /// from the caller's perspective, bounded by the fabric's own timeout.
    async fn dial(&self, params: DialParams) -> anyhow::Result<TunnelStream>;
}

/// The gateway's handle onto the tunnel fabric.
#[async_trait::async_trait]
pub trait ReverseTunnel: Send + Sync {
    async fn site(&self, name: &str) -> anyhow::Result<Arc<dyn RemoteSite>>;
}
