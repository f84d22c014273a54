//! fileshare server binary.
//!
//! Accepts a single file per `POST /upload`, stores it under its name in a
//! flat directory, records the upload in SQLite and answers with a share link
//! carrying a random token. Stored files are served back from
//! `GET /uploads/{filename}`; the token in the link is not checked there.

mod atomic;
mod config;
mod error;
mod etag;
mod files;
mod frontend;
mod http;
mod listener;
mod logging;
mod records;
mod routes;
mod state;
mod storage;
mod token;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::state::ShareContext;

shadow!(build);

/// Starts the server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let args = Args::parse();
    logging::init_logging(args.log_format);

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let listener = listener::bind_with_retry(host, args.port, args.port_attempts)
        .map_err(std::io::Error::other)?;
    let addr = listener.local_addr()?;

    let context = ShareContext::init(&args, addr.port()).await?;
    let app = routes::build_router(&context, args.cors_origins.as_deref());
    let handle = Handle::new();

    info!("Server is running at http://localhost:{}", addr.port());

    tokio::spawn(shutdown_signal(handle.clone()));
    axum_server::from_tcp(listener)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    context.shutdown().await;
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
