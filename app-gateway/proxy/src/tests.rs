use crate::{
    encode_session_cookie, Handler, NotFound, SessionCookie, JWT_ASSERTION_COMPAT_HEADER,
    JWT_ASSERTION_HEADER, SESSION_COOKIE,
};
use chrono::{DateTime, Duration, Utc};
use gatehouse_app_gateway_core::{
    access::{AccessChecker, Role, RoleSet},
    session::{Session, SessionCertificate, SessionKind, SessionRequest},
    tunnel::{ConnType, DialParams, RemoteSite, ReverseTunnel, TunnelStream},
    Application, CertAuthority, CertAuthorityId, ClusterClient, JwtAlgorithm, JwtKeyPair,
};
use http::{header, HeaderMap, Request, Response, StatusCode};
use hyper::{service::Service, Body};
use parking_lot::Mutex;
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

const CLUSTER: &str = "example.com";
const SECRET: &[u8] = b"0123456789abcdef";

fn billing_app() -> Application {
    Application {
        name: "billing".to_string(),
        host_id: "8a6c".to_string(),
        internal_addr: "127.0.0.1:8081".to_string(),
    }
}

fn session_for(user: &str, expires: DateTime<Utc>) -> Session {
    Session {
        user: user.to_string(),
        session_id: "sess-1".to_string(),
        parent_hash: "f00f".to_string(),
        expires,
        certificate: SessionCertificate {
            subject: user.to_string(),
            not_before: Utc::now(),
            not_after: expires,
        },
        roles: vec!["dev".to_string()],
    }
}

fn cookie_for(session: &Session) -> String {
    let encoded = encode_session_cookie(&SessionCookie {
        user: session.user.clone(),
        parent_hash: session.parent_hash.clone(),
        session_id: session.session_id.clone(),
    });
    format!("{SESSION_COOKIE}={encoded}")
}

struct FakeCluster {
    apps: Vec<Application>,
    sessions: Vec<Session>,
    role_set: RoleSet,
    keys: Option<JwtKeyPair>,
    ca_fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl ClusterClient for FakeCluster {
    fn cluster_name(&self) -> &str {
        CLUSTER
    }

    async fn get_application(
        &self,
        _namespace: &str,
        name: &str,
    ) -> anyhow::Result<Option<Application>> {
        Ok(self.apps.iter().find(|app| app.name == name).cloned())
    }

    async fn get_session(&self, req: &SessionRequest) -> anyhow::Result<Option<Session>> {
        assert_eq!(req.kind, SessionKind::App);
        Ok(self
            .sessions
            .iter()
            .find(|s| {
                s.user == req.user
                    && s.session_id == req.session_id
                    && s.parent_hash == req.parent_hash
            })
            .cloned())
    }

    async fn role_set(&self, _session: &Session) -> anyhow::Result<Arc<dyn AccessChecker>> {
        Ok(Arc::new(self.role_set.clone()))
    }

    async fn get_cert_authority(&self, id: &CertAuthorityId) -> anyhow::Result<CertAuthority> {
        self.ca_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(CertAuthority::new(id.clone(), self.keys.clone()))
    }
}

/// A tunnel site whose dials land on an in-process HTTP backend speaking
/// over a duplex stream, capturing each request's headers.
struct FakeSite {
    dials: AtomicUsize,
    captured: Arc<Mutex<Vec<HeaderMap>>>,
    reachable: bool,
}

#[async_trait::async_trait]
impl RemoteSite for FakeSite {
    fn name(&self) -> &str {
        CLUSTER
    }

    async fn dial(&self, params: DialParams) -> anyhow::Result<TunnelStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        assert_eq!(params.conn_type, ConnType::App);
        assert_eq!(params.server_id, format!("8a6c.{CLUSTER}"));
        anyhow::ensure!(self.reachable, "connection refused");

        let (client, server) = tokio::io::duplex(64 * 1024);
        let captured = self.captured.clone();
        tokio::spawn(async move {
            let svc = hyper::service::service_fn(move |req: Request<Body>| {
                let captured = captured.clone();
                async move {
                    captured.lock().push(req.headers().clone());
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(StatusCode::OK)
                            .header("x-upstream", "billing-backend")
                            .body(Body::from("backend says hello"))
                            .expect("response must be valid"),
                    )
                }
            });
            let _ = hyper::server::conn::Http::new()
                .serve_connection(server, svc)
                .await;
        });
        Ok(Box::new(client))
    }
}

struct FakeFabric {
    site: Arc<FakeSite>,
}

#[async_trait::async_trait]
impl ReverseTunnel for FakeFabric {
    async fn site(&self, name: &str) -> anyhow::Result<Arc<dyn RemoteSite>> {
        anyhow::ensure!(name == CLUSTER, "unknown cluster {name}");
        Ok(self.site.clone() as Arc<dyn RemoteSite>)
    }
}

struct Harness {
    handler: Handler<NotFound>,
    cluster: Arc<FakeCluster>,
    site: Arc<FakeSite>,
}

fn harness(role_set: RoleSet, sessions: Vec<Session>, reachable: bool) -> Harness {
    let cluster = Arc::new(FakeCluster {
        apps: vec![billing_app()],
        sessions,
        role_set,
        keys: Some(JwtKeyPair {
            algorithm: JwtAlgorithm::Hs256,
            signing_key: SECRET.to_vec(),
            verifying_key: SECRET.to_vec(),
        }),
        ca_fetches: AtomicUsize::new(0),
    });
    let site = Arc::new(FakeSite {
        dials: AtomicUsize::new(0),
        captured: Arc::new(Mutex::new(Vec::new())),
        reachable,
    });
    let handler = Handler::new(
        cluster.clone(),
        Arc::new(FakeFabric { site: site.clone() }),
        NotFound,
    );
    Harness {
        handler,
        cluster,
        site,
    }
}

fn allow_billing() -> RoleSet {
    RoleSet::new(vec![Role {
        name: "dev".to_string(),
        apps: vec!["billing".to_string()],
    }])
}

fn request(host: &str, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri("/reports?month=1")
        .header(header::HOST, host);
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_string(rsp: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(rsp.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn missing_cookie_redirects_to_login() {
    let mut h = harness(allow_billing(), Vec::new(), true);
    let rsp = h
        .handler
        .call(request("billing.apps.example.com", None))
        .await
        .unwrap();

    assert_eq!(rsp.status(), StatusCode::FOUND);
    let location = rsp.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("/login?redirect_uri="), "{location}");
    assert!(location.contains("billing.apps.example.com"), "{location}");
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 0);
    assert_eq!(h.cluster.ca_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_cookie_value_redirects_to_login() {
    let mut h = harness(allow_billing(), Vec::new(), true);
    let rsp = h
        .handler
        .call(request(
            "billing.apps.example.com",
            Some(&format!("{SESSION_COOKIE}=")),
        ))
        .await
        .unwrap();

    assert_eq!(rsp.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn stale_session_redirects_to_login() {
    let session = session_for("alice", Utc::now() - Duration::minutes(1));
    let cookies = cookie_for(&session);
    let mut h = harness(allow_billing(), vec![session], true);
    let rsp = h
        .handler
        .call(request("billing.apps.example.com", Some(&cookies)))
        .await
        .unwrap();

    assert_eq!(rsp.status(), StatusCode::FOUND);
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_application_falls_through() {
    let session = session_for("alice", Utc::now() + Duration::hours(1));
    let cookies = cookie_for(&session);
    let mut h = harness(allow_billing(), vec![session], true);
    let rsp = h
        .handler
        .call(request("wiki.apps.example.com", Some(&cookies)))
        .await
        .unwrap();

    // The NotFound fallback answers; nothing was dialed or signed.
    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 0);
    assert_eq!(h.cluster.ca_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_host_falls_through() {
    let mut h = harness(allow_billing(), Vec::new(), true);
    let req = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let rsp = h.handler.call(req).await.unwrap();

    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn denial_names_the_application_and_precedes_dialing() {
    let session = session_for("alice", Utc::now() + Duration::hours(1));
    let cookies = cookie_for(&session);
    let deny_all = RoleSet::new(vec![Role {
        name: "dev".to_string(),
        apps: vec!["wiki".to_string()],
    }]);
    let mut h = harness(deny_all, vec![session], true);
    let rsp = h
        .handler
        .call(request("billing.apps.example.com", Some(&cookies)))
        .await
        .unwrap();

    assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(rsp).await.contains("billing"));
    // Authorization strictly precedes dialing and signing.
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 0);
    assert_eq!(h.cluster.ca_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_backend_is_a_generic_500() {
    let session = session_for("alice", Utc::now() + Duration::hours(1));
    let cookies = cookie_for(&session);
    let mut h = harness(allow_billing(), vec![session], false);
    let rsp = h
        .handler
        .call(request("billing.apps.example.com", Some(&cookies)))
        .await
        .unwrap();

    assert_eq!(rsp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // The dial failure stays in the logs; the caller learns nothing.
    let body = body_string(rsp).await;
    assert_eq!(body, "internal service error\n");
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forwards_with_assertion_and_filtered_cookies() {
    let session = session_for("alice", Utc::now() + Duration::hours(1));
    let cookies = format!("theme=dark; {}", cookie_for(&session));
    let mut h = harness(allow_billing(), vec![session], true);
    let rsp = h
        .handler
        .call(request("billing.apps.example.com", Some(&cookies)))
        .await
        .unwrap();

    // The backend response streams through verbatim.
    assert_eq!(rsp.status(), StatusCode::OK);
    assert_eq!(rsp.headers()["x-upstream"], "billing-backend");
    assert_eq!(body_string(rsp).await, "backend says hello");

    // Exactly one dial for the one round trip.
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 1);

    let captured = h.site.captured.lock();
    let headers = &captured[0];
    let assertion = headers[JWT_ASSERTION_HEADER].to_str().unwrap();
    assert!(!assertion.is_empty());
    assert_eq!(headers[JWT_ASSERTION_COMPAT_HEADER].to_str().unwrap(), assertion);
    // The gateway's own cookie never reaches the backend; the rest do.
    assert_eq!(headers[header::COOKIE], "theme=dark");
    assert_eq!(headers[header::HOST], "127.0.0.1:8081");
}

#[tokio::test]
async fn assertions_are_minted_fresh_per_request() {
    let session = session_for("alice", Utc::now() + Duration::hours(1));
    let cookies = cookie_for(&session);
    let mut h = harness(allow_billing(), vec![session], true);

    for _ in 0..2 {
        let rsp = h
            .handler
            .call(request("billing.apps.example.com", Some(&cookies)))
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
    }

    // One dial and one CA fetch per request; two distinct tokens.
    assert_eq!(h.site.dials.load(Ordering::SeqCst), 2);
    assert_eq!(h.cluster.ca_fetches.load(Ordering::SeqCst), 2);
    let captured = h.site.captured.lock();
    assert_eq!(captured.len(), 2);
    assert_ne!(
        captured[0][JWT_ASSERTION_HEADER],
        captured[1][JWT_ASSERTION_HEADER]
    );
}

#[tokio::test]
async fn authorization_is_idempotent_across_requests() {
    let session = session_for("alice", Utc::now() + Duration::hours(1));
    let cookies = cookie_for(&session);
    let mut h = harness(allow_billing(), vec![session], true);

    for _ in 0..2 {
        let rsp = h
            .handler
            .call(request("billing.apps.example.com", Some(&cookies)))
            .await
            .unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn missing_jwt_keys_are_a_generic_500() {
    let session = session_for("alice", Utc::now() + Duration::hours(1));
    let cookies = cookie_for(&session);
    let mut h = harness(allow_billing(), vec![session], true);
    let cluster = Arc::new(FakeCluster {
        apps: vec![billing_app()],
        sessions: h.cluster.sessions.clone(),
        role_set: allow_billing(),
        keys: None,
        ca_fetches: AtomicUsize::new(0),
    });
    h.handler = Handler::new(
        cluster,
        Arc::new(FakeFabric {
            site: h.site.clone(),
        }),
        NotFound,
    );

    let rsp = h
        .handler
        .call(request("billing.apps.example.com", Some(&cookies)))
        .await
        .unwrap();
    assert_eq!(rsp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(rsp).await, "internal service error\n");
}
