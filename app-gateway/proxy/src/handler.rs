use crate::{cookie, forward, jwt, locate};
use futures::future;
use gatehouse_app_gateway_core::{
    access::AccessRequest,
    session::{Session, SessionKind, SessionRequest},
    tunnel::{DialParams, ReverseTunnel, TunnelStream},
    Application, CertAuthorityId, ClusterClient, GatewayError, Identity, DEFAULT_NAMESPACE,
};
use http::{header, HeaderMap, Request, Response, StatusCode};
use hyper::Body;
use std::{convert::Infallible, sync::Arc, task};
use tracing::{debug, info, warn};

/// Path of the external login flow unauthenticated callers are redirected
/// to, carrying a `redirect_uri` back to the original request.
pub const LOGIN_PATH: &str = "/login";

/// Serves proxied application requests.
///
/// Each request runs the full pipeline: locate the application, resolve the
/// session, authorize, dial the application's host over the tunnel fabric,
/// sign an identity assertion, and forward over the dialed connection.
/// Requests whose host does not resolve to a registered application are
/// handed to the `fallback` service (ordinarily the gateway's web UI).
///
/// The handler holds no per-request state; everything a request resolves
/// dies with it.
#[derive(Clone)]
pub struct Handler<F> {
    auth: Arc<dyn ClusterClient>,
    tunnel: Arc<dyn ReverseTunnel>,
    fallback: F,
}

// === impl Handler ===

impl<F> Handler<F>
where
    F: hyper::service::Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    F::Future: Send,
{
    pub fn new(auth: Arc<dyn ClusterClient>, tunnel: Arc<dyn ReverseTunnel>, fallback: F) -> Self {
        Self {
            auth,
            tunnel,
            fallback,
        }
    }

    async fn handle(mut self, req: Request<Body>) -> Response<Body> {
        // Locate the application. Hosts that are not applications belong to
        // the next handler, silently.
        let app = match self.locate(&req).await {
            Ok(app) => app,
            Err(error) => {
                debug!(%error, "not an application request");
                return match self.fallback.call(req).await {
                    Ok(rsp) => rsp,
                    Err(never) => match never {},
                };
            }
        };

        // Resolve the session behind the cookie. Any failure here means the
        // caller re-authenticates; nothing downstream runs.
        let session = match self.authenticate(req.headers()).await {
            Ok(session) => session,
            Err(error) => {
                info!(%error, app = %app.name, "authentication required");
                return login_redirect(&req);
            }
        };
        let identity = Identity::from_certificate(&session.certificate);

        // The authorization gate: the session's role set must pass for this
        // application before anything is dialed or signed. An unresolvable
        // role set is a denial, not an outage.
        let checker = match self.auth.role_set(&session).await {
            Ok(checker) => checker,
            Err(error) => {
                info!(%error, user = %session.user, app = %app.name, "failed to resolve role set");
                return access_denied(&app.name);
            }
        };
        if let Err(denied) = checker.check_app_access(&app, &access_request(&req)) {
            info!(user = %identity.username, app = %app.name, "access denied");
            return access_denied(&denied.app);
        }

        // Dial the application's host and mint the assertion. Failures from
        // here on are availability problems, logged as such; the caller
        // was already authorized.
        let io = match self.dial(&app).await {
            Ok(io) => io,
            Err(error) => {
                warn!(error = ?error, app = %app.name, "application backend unreachable");
                return internal_error();
            }
        };
        let token = match self.sign(&identity).await {
            Ok(token) => token,
            Err(error) => {
                warn!(error = ?error, app = %app.name, "failed to mint identity assertion");
                return internal_error();
            }
        };

        self.forward(req, io, &token, &app).await
    }

    /// Maps the request's host to a registered application.
    async fn locate(&self, req: &Request<Body>) -> Result<Application, GatewayError> {
        let host = req
            .uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| {
                req.headers()
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
            })
            .unwrap_or_default();
        let name = locate::app_name_from_host(host)?;

        match self.auth.get_application(DEFAULT_NAMESPACE, name).await {
            Ok(Some(app)) => Ok(app),
            Ok(None) => Err(GatewayError::ApplicationNotFound {
                name: name.to_string(),
            }),
            Err(error) => {
                // The registry being unsure is indistinguishable from "not
                // an application"; the next handler owns the request either
                // way.
                warn!(%error, app = %name, "application lookup failed");
                Err(GatewayError::ApplicationNotFound {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Resolves the caller's session: cookie, store lookup, expiry check.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Session, GatewayError> {
        let cookie = cookie::extract_session_cookie(headers)?;
        let request = SessionRequest {
            kind: SessionKind::App,
            user: cookie.user.clone(),
            parent_hash: cookie.parent_hash,
            session_id: cookie.session_id,
        };
        let session = match self.auth.get_session(&request).await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(GatewayError::SessionNotFound { user: cookie.user }),
            Err(error) => {
                // A store failure cannot be told apart from a missing
                // record without trusting stale state; treat it as no
                // session.
                warn!(%error, user = %cookie.user, "session lookup failed");
                return Err(GatewayError::SessionNotFound { user: cookie.user });
            }
        };
        if session.is_expired(chrono::Utc::now()) {
            return Err(GatewayError::SessionNotFound { user: cookie.user });
        }
        Ok(session)
    }

    /// Obtains a connection to the application's host over the tunnel
    /// fabric. The stream belongs to this request alone.
    async fn dial(&self, app: &Application) -> Result<TunnelStream, GatewayError> {
        let cluster = self.auth.cluster_name();
        let site =
            self.tunnel
                .site(cluster)
                .await
                .map_err(|source| GatewayError::BackendUnavailable {
                    app: app.name.clone(),
                    source,
                })?;
        site.dial(DialParams::to_app(app, site.name()))
            .await
            .map_err(|source| GatewayError::BackendUnavailable {
                app: app.name.clone(),
                source,
            })
    }

    /// Mints the identity assertion with the cluster host CA's JWT keys.
    async fn sign(&self, identity: &Identity) -> Result<String, GatewayError> {
        let cluster = self.auth.cluster_name();
        let ca = self
            .auth
            .get_cert_authority(&CertAuthorityId::host(cluster))
            .await
            .map_err(GatewayError::CaUnavailable)?;
        let keys = ca
            .jwt_key_pair()
            .map_err(|error| GatewayError::SigningFailure(error.into()))?;
        jwt::sign_assertion(keys, cluster, identity).map_err(GatewayError::SigningFailure)
    }

    /// Rewrites the request and runs the single forwarded round trip.
    async fn forward(
        &self,
        mut req: Request<Body>,
        io: TunnelStream,
        token: &str,
        app: &Application,
    ) -> Response<Body> {
        if let Err(error) = forward::rewrite_request(&mut req, token, &app.internal_addr) {
            warn!(%error, app = %app.name, "failed to rewrite request for backend");
            return internal_error();
        }
        match forward::round_trip(io, req).await {
            Ok(rsp) => rsp,
            Err(error) => {
                let error = GatewayError::ForwardingFailure(error);
                warn!(error = ?error, app = %app.name, "forwarded round trip failed");
                internal_error()
            }
        }
    }
}

impl<F> hyper::service::Service<Request<Body>> for Handler<F>
where
    F: hyper::service::Service<Request<Body>, Response = Response<Body>, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    F::Future: Send,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Infallible>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.handle(req).await) })
    }
}

/// Terminal fallback standing in for the web UI: a plain 404.
#[derive(Copy, Clone, Debug, Default)]
pub struct NotFound;

// === impl NotFound ===

impl hyper::service::Service<Request<Body>> for NotFound {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::Ready<Result<Response<Body>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Infallible>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<Body>) -> Self::Future {
        future::ok(
            Response::builder()
                .status(StatusCode::NOT_FOUND)
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("not found\n"))
                .expect("not found response must be valid"),
        )
    }
}

fn access_request(req: &Request<Body>) -> AccessRequest {
    AccessRequest {
        method: req.method().clone(),
        path: req.uri().path().to_string(),
    }
}

/// 302 to the login flow, carrying the original URL so the caller lands
/// back here after authenticating.
fn login_redirect(req: &Request<Body>) -> Response<Body> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let return_to = format!("https://{host}{path_and_query}");
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect_uri", &return_to)
        .finish();
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, format!("{LOGIN_PATH}?{query}"))
        .body(Body::empty())
        .expect("redirect response must be valid")
}

/// 401 naming the denied application. Policy internals stay out of it.
fn access_denied(app: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(format!("access to application {app} denied\n")))
        .expect("denied response must be valid")
}

/// Generic 500. The cause goes to the logs, never to the caller.
fn internal_error() -> Response<Body> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("internal service error\n"))
        .expect("error response must be valid")
}
