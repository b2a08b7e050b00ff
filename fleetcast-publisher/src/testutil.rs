//! Shared fixtures for the publisher tests. Key generation is slow, so the
//! 2048-bit test key is created once per process.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

pub fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}

/// Writes the test key to `dir` as PKCS#8 PEM and returns its path.
pub fn signing_key_pem(dir: &Path) -> PathBuf {
    let pem = test_key().to_pkcs8_pem(LineEnding::LF).unwrap();
    let path = dir.join("sign_key.pem");
    std::fs::write(&path, pem.as_bytes()).unwrap();
    path
}
