//! Symmetric encryption and serialization of signed artifacts.

use std::fs;
use std::path::Path;

use tracing::info;

use fleetcast_common::artifact::UpdateArtifact;
use fleetcast_common::crypto::{self, NONCE_BYTES, SYMMETRIC_KEY_BYTES};
use fleetcast_common::error::Error;
use fleetcast_common::fsutil::write_atomic;

pub const ARTIFACT_FILE: &str = "artifact.upd";
pub const IV_FILE: &str = "iv";
pub const KEY_FILE: &str = "key";

/// The sealed artifact together with the material needed to distribute it.
/// The raw key is only ever used locally for wrapping; it is never sent to
/// the server or a device in the clear.
pub struct EncryptedArtifact {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_BYTES],
    pub key: [u8; SYMMETRIC_KEY_BYTES],
}

/// Seals the artifact under a fresh key/nonce pair and writes ciphertext,
/// nonce, and key into `out_dir` (created if absent). Key and nonce come
/// from the system CSPRNG on every call, so a (key, nonce) pair is never
/// reused across artifacts. If any of the three writes fails the whole
/// operation fails.
pub fn encrypt_and_serialize(
    artifact: &UpdateArtifact,
    out_dir: &Path,
) -> Result<EncryptedArtifact, Error> {
    let key = crypto::generate_key();
    let nonce = crypto::generate_nonce();

    let payload = fs::read(&artifact.payload_path)?;
    let plaintext = artifact.header.to_plaintext(&payload);
    let ciphertext = crypto::seal(&plaintext, &key, &nonce)?;

    fs::create_dir_all(out_dir)?;
    write_atomic(&out_dir.join(ARTIFACT_FILE), &ciphertext)?;
    write_atomic(&out_dir.join(IV_FILE), &nonce)?;
    write_atomic(&out_dir.join(KEY_FILE), &key)?;
    info!("wrote encrypted artifact to {}", out_dir.display());

    Ok(EncryptedArtifact {
        ciphertext,
        nonce,
        key,
    })
}
