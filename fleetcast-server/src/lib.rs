//! # fleetcast server
//! Stores encrypted update artifacts and per-device wrapped keys, and serves
//! them to mutually-authenticated devices. The TLS accept loop hands each
//! request the verified peer identity; the registry decides what that
//! identity may see.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, info};

pub mod cli;
pub mod registry;
pub mod routes;
pub mod storage;
pub mod tls;

use crate::cli::Args;
use crate::registry::Registry;
use crate::routes::PeerIdentity;

pub async fn main_impl(args: Args) -> Result<()> {
    let registry = Arc::new(Registry::open(&args.storage)?);
    let app = routes::router(registry);

    let tls_config = tls::load_server_config(&args.tls_cert, &args.tls_key, &args.ca_cert)?;
    let acceptor = TlsAcceptor::from(tls_config);

    let listener = TcpListener::bind(args.bind).await?;
    info!("listening on {}", args.bind);
    loop {
        let (stream, addr) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, acceptor, app).await {
                debug!("connection from {addr} ended with error: {err:?}");
            }
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    app: axum::Router,
) -> Result<()> {
    let tls_stream = acceptor.accept(stream).await?;
    let identity = PeerIdentity(tls::peer_identity(tls_stream.get_ref().1));
    debug!("serving connection for identity {:?}", identity.0);

    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(identity.clone());
        app.clone().oneshot(request)
    });
    hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(tls_stream), service)
        .await
        .map_err(|err| anyhow!("failed to serve connection: {err}"))
}
