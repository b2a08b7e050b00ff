//! Per-device key wrapping and the publisher-side HTTP client.

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use reqwest::StatusCode;
use tracing::{debug, info};

use fleetcast_common::certs;
use fleetcast_common::crypto::{self, NONCE_BYTES, SYMMETRIC_KEY_BYTES};
use fleetcast_common::error::Error;
use fleetcast_common::fsutil::write_atomic;
use fleetcast_common::wire::{DecryptionKeyCiphertext, PrepareUpdateRequest};

/// Wraps the symmetric key under every device certificate found in
/// `cert_dir`. Files that do not parse as certificates or carry no DNS SAN
/// are skipped; a read error on the directory itself is fatal, and so is
/// any wrapping failure. The IV belongs to the symmetric artifact
/// decryption and is recorded per device only so each device receives its
/// own copy.
pub fn wrap_for_directory(
    cert_dir: &Path,
    key_path: &Path,
    iv_path: &Path,
) -> Result<Vec<DecryptionKeyCiphertext>, Error> {
    let key = read_fixed::<SYMMETRIC_KEY_BYTES>(key_path)?;
    let iv = read_fixed::<NONCE_BYTES>(iv_path)?;

    let mut wrapped = Vec::new();
    for entry in fs::read_dir(cert_dir)? {
        let entry = entry?;
        let path = entry.path();
        let pem = match fs::read(&path) {
            Ok(pem) => pem,
            Err(err) => {
                debug!("skipping {path:?}: {err}");
                continue;
            }
        };
        let cert = match certs::from_pem(&pem) {
            Ok(cert) => cert,
            Err(_) => {
                debug!("skipping {path:?}: not an X.509 certificate");
                continue;
            }
        };
        let Some(san) = certs::san_dns_name(&cert) else {
            debug!("skipping {path:?}: certificate has no DNS SAN");
            continue;
        };
        let public_key = certs::rsa_public_key(&cert)?;
        let ct = crypto::wrap_key(&public_key, &key)?;
        debug!("wrapped key for {san}");
        wrapped.push(DecryptionKeyCiphertext { san, ct, iv });
    }
    Ok(wrapped)
}

/// Keeps a local copy of the wrapped keys, one file per device identity.
pub fn save_ciphertexts(dir: &Path, keys: &[DecryptionKeyCiphertext]) -> Result<(), Error> {
    fs::create_dir_all(dir)?;
    for key in keys {
        write_atomic(&dir.join(&key.san), &key.ct)?;
    }
    Ok(())
}

fn read_fixed<const N: usize>(path: &Path) -> Result<[u8; N], Error> {
    let bytes = fs::read(path)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| Error::KeySize {
        expected: N,
        actual,
    })
}

/// HTTP client for the distribution server, authenticated with the
/// publisher's client certificate.
pub struct PublisherClient {
    http: reqwest::Client,
    base_url: String,
}

impl PublisherClient {
    pub fn new(
        base_url: impl Into<String>,
        ca_cert: &Path,
        client_cert: &Path,
        client_key: &Path,
    ) -> Result<Self> {
        let ca = reqwest::Certificate::from_pem(
            &fs::read(ca_cert).with_context(|| format!("failed to read {ca_cert:?}"))?,
        )
        .context("failed to parse the root CA certificate")?;

        let mut identity_pem =
            fs::read(client_cert).with_context(|| format!("failed to read {client_cert:?}"))?;
        identity_pem.extend(
            fs::read(client_key).with_context(|| format!("failed to read {client_key:?}"))?,
        );
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .context("failed to parse the client certificate/key pair")?;

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .add_root_certificate(ca)
            .identity(identity)
            .build()
            .context("failed to build the HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Asks the registry to reserve an update ID for the given recipients
    /// and availability time.
    pub async fn prepare_update(
        &self,
        keys: Vec<DecryptionKeyCiphertext>,
        available: i64,
    ) -> Result<u32> {
        let response = self
            .http
            .post(format!("{}/prepareUpdate", self.base_url))
            .json(&PrepareUpdateRequest { keys, available })
            .send()
            .await
            .context("prepareUpdate request failed")?;
        ensure!(
            response.status() == StatusCode::OK,
            "prepareUpdate returned {}",
            response.status()
        );
        let body = response.text().await?;
        let id = body
            .trim()
            .parse::<u32>()
            .context("server returned a malformed update ID")?;
        info!("server reserved update ID {id}");
        Ok(id)
    }

    /// Uploads the artifact ciphertext for a previously reserved ID. Must
    /// only be called after a successful prepare; if it fails, the
    /// reservation stays orphaned on the server and is reclaimed by
    /// deleting its directory.
    pub async fn upload_artifact(&self, update_id: u32, artifact: Vec<u8>) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/uploadArtifact", self.base_url))
            .query(&[("updateId", update_id.to_string())])
            .body(artifact)
            .send()
            .await
            .context("uploadArtifact request failed")?;
        ensure!(
            response.status() == StatusCode::NO_CONTENT,
            "uploadArtifact returned {}",
            response.status()
        );
        info!("uploaded artifact for update {update_id}");
        Ok(())
    }
}
