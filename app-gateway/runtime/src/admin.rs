use futures::future;
use hyper::{Body, Request, Response};
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{info, instrument};

/// Serves the liveness and readiness endpoints on their own listener.
#[instrument(skip(ready))]
pub(crate) async fn serve(addr: SocketAddr, ready: watch::Receiver<bool>) -> Result<(), hyper::Error> {
    let server =
        hyper::server::Server::bind(&addr).serve(hyper::service::make_service_fn(move |_conn| {
            let ready = ready.clone();
            future::ok::<_, hyper::Error>(hyper::service::service_fn(
                move |req: Request<Body>| {
                    let rsp = match req.uri().path() {
                        "/live" => text(hyper::StatusCode::OK, "alive\n"),
                        "/ready" => handle_ready(&ready, &req),
                        _ => text(hyper::StatusCode::NOT_FOUND, "not found\n"),
                    };
                    future::ok::<_, hyper::Error>(rsp)
                },
            ))
        }));
    info!(addr = %server.local_addr(), "HTTP admin server listening");
    server.await
}

fn handle_ready(ready: &watch::Receiver<bool>, req: &Request<Body>) -> Response<Body> {
    match *req.method() {
        hyper::Method::GET | hyper::Method::HEAD => {
            if *ready.borrow() {
                text(hyper::StatusCode::OK, "ready\n")
            } else {
                text(hyper::StatusCode::INTERNAL_SERVER_ERROR, "not ready\n")
            }
        }
        _ => text(hyper::StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n"),
    }
}

fn text(status: hyper::StatusCode, body: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(body.into())
        .expect("admin response must be valid")
}
