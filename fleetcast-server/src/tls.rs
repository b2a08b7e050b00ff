//! Mutual-TLS plumbing: rustls server configuration with mandatory client
//! certificates and extraction of the verified peer identity.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection};

use fleetcast_common::certs;

/// Builds the rustls server configuration. Every client must present a
/// certificate chaining to `ca_cert`; handshakes without one fail outright.
pub fn load_server_config(
    tls_cert: &Path,
    tls_key: &Path,
    ca_cert: &Path,
) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(tls_cert).with_context(|| format!("failed to open {tls_cert:?}"))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .context("failed to parse server certificate")?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(tls_key).with_context(|| format!("failed to open {tls_key:?}"))?,
    ))
    .context("failed to parse server key")?
    .ok_or_else(|| anyhow!("no private key found in {tls_key:?}"))?;

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(
        File::open(ca_cert).with_context(|| format!("failed to open {ca_cert:?}"))?,
    )) {
        roots
            .add(cert.context("failed to parse CA certificate")?)
            .context("failed to add CA certificate to the trust store")?;
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .context("failed to build the client certificate verifier")?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .context("invalid server certificate/key pair")?;
    Ok(Arc::new(config))
}

/// DNS SAN of the verified peer certificate, if it carries one. The
/// connection was already authenticated by rustls at this point; this only
/// recovers the identity string.
pub fn peer_identity(connection: &ServerConnection) -> Option<String> {
    let der = connection.peer_certificates()?.first()?;
    let cert = certs::from_der(der.as_ref()).ok()?;
    certs::san_dns_name(&cert)
}
