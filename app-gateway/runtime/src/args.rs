use crate::{admin, local::LocalConfig, LocalCluster};
use anyhow::{Context, Result};
use clap::Parser;
use futures::FutureExt;
use gatehouse_app_gateway_proxy::{Handler, NotFound};
use hyper::service::make_service_fn;
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "app-gateway",
    about = "Proxies HTTP requests to applications published over the cluster's reverse tunnels"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "info",
        env = "GATEHOUSE_APP_GATEWAY_LOG"
    )]
    log_level: String,

    /// Address the gateway accepts application traffic on.
    #[clap(long, default_value = "0.0.0.0:3080")]
    listen_addr: SocketAddr,

    /// Address of the liveness/readiness server.
    #[clap(long, default_value = "0.0.0.0:9990")]
    admin_addr: SocketAddr,

    /// Path to the cluster directory config (applications, roles, sessions,
    /// signing material).
    #[clap(long, env = "GATEHOUSE_APP_GATEWAY_CONFIG")]
    config: PathBuf,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            listen_addr,
            admin_addr,
            config,
        } = self;

        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_new(&log_level)
                    .context("invalid log level")?,
            )
            .init();

        let config = LocalConfig::load(&config)?;
        let cluster = Arc::new(LocalCluster::new(config));
        let handler = Handler::new(cluster.clone(), cluster, NotFound);

        let (ready_tx, ready_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(admin::serve(admin_addr, ready_rx));

        let make_svc = make_service_fn(move |_conn| {
            let handler = handler.clone();
            async move { Ok::<_, Infallible>(handler) }
        });
        let server = hyper::server::Server::try_bind(&listen_addr)
            .context("failed to bind gateway listener")?
            .serve(make_svc);
        info!(addr = %listen_addr, "application gateway listening");
        let _ = ready_tx.send(true);

        // Drain on SIGTERM/ctrl-c so in-flight forwards finish before the
        // process exits.
        let (signal, watch) = drain::channel();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received; draining");
            signal.drain().await;
        });

        let (close_tx, close_rx) = tokio::sync::oneshot::channel();
        tokio::pin! {
            let srv = server.with_graceful_shutdown(close_rx.map(|_| {}));
        }

        tokio::select! {
            res = (&mut srv) => res.context("gateway server failed")?,
            handle = watch.signaled() => {
                let _ = close_tx.send(());
                handle.release_after(&mut srv).await.context("gateway server failed")?;
            }
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
