use crate::{
    cookie::request_cookies, JWT_ASSERTION_COMPAT_HEADER, JWT_ASSERTION_HEADER, SESSION_COOKIE,
};
use gatehouse_app_gateway_core::tunnel::TunnelStream;
use http::{header, HeaderValue, Request, Response, Uri};
use hyper::Body;
use tracing::debug;

/// Rewrites an inbound request for the backend: assertion headers on, the
/// gateway's own session cookie off, URI retargeted at the application's
/// local listener.
pub(crate) fn rewrite_request(
    req: &mut Request<Body>,
    token: &str,
    internal_addr: &str,
) -> anyhow::Result<()> {
    let assertion = HeaderValue::from_str(token)?;
    let host = HeaderValue::from_str(internal_addr)?;

    // Re-add every inbound cookie except the gateway's session artifact,
    // which must not leak to the backend.
    let retained = request_cookies(req.headers())
        .filter(|(name, _)| *name != SESSION_COOKIE)
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");

    // The tunnel already routes to the application's host; the URI only has
    // to name the final local hop. Origin-form path, Host at the listener.
    let origin_form = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .parse::<Uri>()?;

    let headers = req.headers_mut();
    headers.insert(JWT_ASSERTION_HEADER, assertion.clone());
    headers.insert(JWT_ASSERTION_COMPAT_HEADER, assertion);
    headers.remove(header::COOKIE);
    if !retained.is_empty() {
        headers.insert(header::COOKIE, HeaderValue::from_str(&retained)?);
    }
    headers.insert(header::HOST, host);
    *req.uri_mut() = origin_form;

    Ok(())
}

/// Executes exactly one round trip over an already-dialed tunnel stream and
/// returns the backend's response for verbatim streaming.
///
/// The stream is the transport's only connection: nothing is pooled and
/// nothing is redialed. Do not replace this with a pooled client: tunnel
/// routing is bound to the host that was dialed, and a second connection
/// would bypass it. The connection is torn down once the exchange (and the
/// response body) completes, or when the caller hangs up.
pub(crate) async fn round_trip(
    io: TunnelStream,
    req: Request<Body>,
) -> anyhow::Result<Response<Body>> {
    let (mut tx, conn) = hyper::client::conn::Builder::new().handshake(io).await?;
    tokio::spawn(async move {
        if let Err(error) = conn.await {
            debug!(%error, "tunnel connection terminated");
        }
    });
    let rsp = tx.send_request(req).await?;
    Ok(rsp)
}
