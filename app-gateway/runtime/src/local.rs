//! Single-process wiring of the gateway's cluster collaborators.
//!
//! Applications, roles, sessions, and signing material come from a JSON
//! config file; tunnel dials resolve to direct TCP connections to the
//! application's local listener. Clustered deployments replace this with
//! clients onto the real auth and tunnel subsystems.

use anyhow::{bail, ensure, Context, Result};
use chrono::{Duration, Utc};
use gatehouse_app_gateway_core::{
    access::AccessChecker,
    session::{Session, SessionCertificate, SessionKind, SessionRequest},
    tunnel::{ConnType, DialParams, RemoteSite, ReverseTunnel, TunnelStream},
    Application, CaKind, CertAuthority, CertAuthorityId, ClusterClient, JwtAlgorithm, JwtKeyPair,
    Role, RoleSet, DEFAULT_NAMESPACE,
};
use gatehouse_app_gateway_proxy::{encode_session_cookie, SessionCookie};
use parking_lot::RwLock;
use serde::Deserialize;
use std::{collections::HashMap, path::Path, sync::Arc};
use tokio::net::TcpStream;
use tracing::{debug, warn};

#[derive(Clone, Debug, Deserialize)]
pub struct LocalConfig {
    pub cluster_name: String,

    /// HS256 signing secret for the host CA's JWT key pair.
    pub jwt_secret: String,

    #[serde(default)]
    pub applications: Vec<AppConfig>,

    #[serde(default)]
    pub roles: Vec<RoleConfig>,

    /// Pre-provisioned sessions; ordinarily minted by the login flow.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub host_id: String,
    pub internal_addr: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    pub apps: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    pub user: String,
    pub session_id: String,
    pub parent_hash: String,
    pub roles: Vec<String>,

    /// Lifetime from process start.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    12 * 60 * 60
}

// === impl LocalConfig ===

impl LocalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// An in-process cluster directory implementing both the auth and tunnel
/// sides of the gateway's boundary.
pub struct LocalCluster {
    name: String,
    keys: JwtKeyPair,
    apps: HashMap<String, Application>,
    roles: HashMap<String, Role>,
    sessions: RwLock<HashMap<(String, String), Session>>,
    site: Arc<LocalSite>,
}

struct LocalSite {
    cluster: String,
    // host_id -> local listener address
    hosts: HashMap<String, String>,
}

// === impl LocalCluster ===

impl LocalCluster {
    pub fn new(config: LocalConfig) -> Self {
        let now = Utc::now();

        let apps: HashMap<String, Application> = config
            .applications
            .into_iter()
            .map(|app| {
                (
                    app.name.clone(),
                    Application {
                        name: app.name,
                        host_id: app.host_id,
                        internal_addr: app.internal_addr,
                    },
                )
            })
            .collect();

        let roles = config
            .roles
            .into_iter()
            .map(|role| {
                (
                    role.name.clone(),
                    Role {
                        name: role.name,
                        apps: role.apps,
                    },
                )
            })
            .collect();

        let mut sessions = HashMap::new();
        for s in config.sessions {
            let expires = now + Duration::seconds(s.ttl_secs as i64);
            let cookie = encode_session_cookie(&SessionCookie {
                user: s.user.clone(),
                parent_hash: s.parent_hash.clone(),
                session_id: s.session_id.clone(),
            });
            debug!(user = %s.user, %cookie, "provisioned session");
            sessions.insert(
                (s.user.clone(), s.session_id.clone()),
                Session {
                    user: s.user.clone(),
                    session_id: s.session_id,
                    parent_hash: s.parent_hash,
                    expires,
                    certificate: SessionCertificate {
                        subject: s.user,
                        not_before: now,
                        not_after: expires,
                    },
                    roles: s.roles,
                },
            );
        }

        let site = Arc::new(LocalSite {
            cluster: config.cluster_name.clone(),
            hosts: apps
                .values()
                .map(|app| (app.host_id.clone(), app.internal_addr.clone()))
                .collect(),
        });

        Self {
            name: config.cluster_name,
            keys: JwtKeyPair {
                algorithm: JwtAlgorithm::Hs256,
                signing_key: config.jwt_secret.clone().into_bytes(),
                verifying_key: config.jwt_secret.into_bytes(),
            },
            apps,
            roles,
            sessions: RwLock::new(sessions),
            site,
        }
    }
}

#[async_trait::async_trait]
impl ClusterClient for LocalCluster {
    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>> {
        if namespace != DEFAULT_NAMESPACE {
            return Ok(None);
        }
        Ok(self.apps.get(name).cloned())
    }

    async fn get_session(&self, req: &SessionRequest) -> Result<Option<Session>> {
        if req.kind != SessionKind::App {
            return Ok(None);
        }
        let sessions = self.sessions.read();
        Ok(sessions
            .get(&(req.user.clone(), req.session_id.clone()))
            .filter(|session| session.parent_hash == req.parent_hash)
            .cloned())
    }

    async fn role_set(&self, session: &Session) -> Result<Arc<dyn AccessChecker>> {
        let mut roles = Vec::with_capacity(session.roles.len());
        for name in &session.roles {
            match self.roles.get(name) {
                Some(role) => roles.push(role.clone()),
                // An unknown role grants nothing; the rest of the set still
                // applies.
                None => warn!(user = %session.user, role = %name, "session names unknown role"),
            }
        }
        Ok(Arc::new(RoleSet::new(roles)) as Arc<dyn AccessChecker>)
    }

    async fn get_cert_authority(&self, id: &CertAuthorityId) -> Result<CertAuthority> {
        if id.kind != CaKind::Host || id.domain != self.name {
            bail!("unknown certificate authority {id}");
        }
        Ok(CertAuthority::new(id.clone(), Some(self.keys.clone())))
    }
}

#[async_trait::async_trait]
impl ReverseTunnel for LocalCluster {
    async fn site(&self, name: &str) -> Result<Arc<dyn RemoteSite>> {
        ensure!(name == self.name, "unknown cluster {name}");
        Ok(self.site.clone() as Arc<dyn RemoteSite>)
    }
}

// === impl LocalSite ===

#[async_trait::async_trait]
impl RemoteSite for LocalSite {
    fn name(&self) -> &str {
        &self.cluster
    }

    async fn dial(&self, params: DialParams) -> Result<TunnelStream> {
        ensure!(
            params.conn_type == ConnType::App,
            "unsupported connection type {}",
            params.conn_type
        );
        let host_id = params
            .server_id
            .strip_suffix(&format!(".{}", self.cluster))
            .unwrap_or(&params.server_id);
        let addr = self
            .hosts
            .get(host_id)
            .with_context(|| format!("no application host {host_id} in cluster {}", self.cluster))?;
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to dial {addr}"))?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LocalConfig {
        serde_json::from_str(
            r#"{
                "cluster_name": "example.com",
                "jwt_secret": "0123456789abcdef",
                "applications": [
                    {
                        "name": "billing",
                        "host_id": "8a6c",
                        "internal_addr": "127.0.0.1:8081"
                    }
                ],
                "roles": [{ "name": "dev", "apps": ["billing"] }],
                "sessions": [
                    {
                        "user": "alice",
                        "session_id": "sess-1",
                        "parent_hash": "f00f",
                        "roles": ["dev"]
                    }
                ]
            }"#,
        )
        .expect("config must parse")
    }

    fn session_request() -> SessionRequest {
        SessionRequest {
            kind: SessionKind::App,
            user: "alice".to_string(),
            parent_hash: "f00f".to_string(),
            session_id: "sess-1".to_string(),
        }
    }

    #[tokio::test]
    async fn looks_up_registered_applications() {
        let cluster = LocalCluster::new(config());
        let app = cluster
            .get_application(DEFAULT_NAMESPACE, "billing")
            .await
            .unwrap()
            .expect("billing is registered");
        assert_eq!(app.host_id, "8a6c");
        assert!(cluster
            .get_application(DEFAULT_NAMESPACE, "wiki")
            .await
            .unwrap()
            .is_none());
        assert!(cluster
            .get_application("other", "billing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn resolves_provisioned_sessions() {
        let cluster = LocalCluster::new(config());
        let session = cluster
            .get_session(&session_request())
            .await
            .unwrap()
            .expect("session is provisioned");
        assert_eq!(session.certificate.subject, "alice");
        assert!(!session.is_expired(Utc::now()));

        let mut wrong_hash = session_request();
        wrong_hash.parent_hash = "beef".to_string();
        assert!(cluster.get_session(&wrong_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn role_set_skips_unknown_roles() {
        let cluster = LocalCluster::new(config());
        let mut session = cluster
            .get_session(&session_request())
            .await
            .unwrap()
            .unwrap();
        session.roles.push("ghost".to_string());
        let checker = cluster.role_set(&session).await.unwrap();

        let app = cluster
            .get_application(DEFAULT_NAMESPACE, "billing")
            .await
            .unwrap()
            .unwrap();
        let req = gatehouse_app_gateway_core::AccessRequest {
            method: http::Method::GET,
            path: "/".to_string(),
        };
        assert!(checker.check_app_access(&app, &req).is_ok());
    }

    #[tokio::test]
    async fn only_the_host_ca_is_served() {
        let cluster = LocalCluster::new(config());
        let ca = cluster
            .get_cert_authority(&CertAuthorityId::host("example.com"))
            .await
            .unwrap();
        assert_eq!(ca.jwt_key_pair().unwrap().algorithm, JwtAlgorithm::Hs256);
        assert!(cluster
            .get_cert_authority(&CertAuthorityId::host("other.com"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn dialing_an_unknown_host_fails() {
        let cluster = LocalCluster::new(config());
        let site = cluster.site("example.com").await.unwrap();
        let err = site
            .dial(DialParams {
                server_id: "beef.example.com".to_string(),
                conn_type: ConnType::App,
            })
            .await
            .err()
            .expect("dial of unknown host must fail");
        assert!(err.to_string().contains("beef"));
    }
}
