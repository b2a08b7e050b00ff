//! Crypto primitives for the update pipeline: RSA PKCS#1 v1.5 signatures
//! over SHA-256 digests, AES-128-GCM sealing of the serialized artifact,
//! and RSA wrapping of the per-update symmetric key.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rsa::signature::SignatureEncoding;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::Error;

/// Modulus size of the configured RSA keys. Signature and wrapped-key
/// buffers are exactly this long; keys of any other size are rejected at
/// load time instead of being silently truncated.
pub const RSA_KEY_BYTES: usize = 256;
/// AES-128 key length.
pub const SYMMETRIC_KEY_BYTES: usize = 16;
/// AES-GCM nonce length.
pub const NONCE_BYTES: usize = 12;

fn check_modulus(actual: usize) -> Result<(), Error> {
    if actual != RSA_KEY_BYTES {
        return Err(Error::KeySize {
            expected: RSA_KEY_BYTES,
            actual,
        });
    }
    Ok(())
}

/// Signer over the publisher's RSA private key.
pub struct RsaSigner {
    signing_key: rsa::pkcs1v15::SigningKey<Sha256>,
}

impl RsaSigner {
    /// Loads a PKCS#1 or PKCS#8 PEM encoded RSA private key from disk.
    pub fn from_pem_file(path: &Path) -> Result<Self, Error> {
        let pem = std::fs::read_to_string(path)?;
        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
            .map_err(|_| Error::PemKeyDecoding)?;
        Self::from_key(key)
    }

    pub fn from_key(key: RsaPrivateKey) -> Result<Self, Error> {
        check_modulus(key.size())?;
        Ok(Self {
            signing_key: rsa::pkcs1v15::SigningKey::new(key),
        })
    }

    /// Produces a PKCS#1 v1.5 signature over a precomputed SHA-256 digest.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; RSA_KEY_BYTES], Error> {
        let signature: rsa::pkcs1v15::Signature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|_| Error::SigningFailed)?;
        let bytes = signature.to_bytes();
        let mut out = [0u8; RSA_KEY_BYTES];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}

/// Verifies a PKCS#1 v1.5 signature over a precomputed SHA-256 digest.
pub fn verify_digest(
    public_key: &RsaPublicKey,
    digest: &[u8; 32],
    signature: &[u8],
) -> Result<(), Error> {
    check_modulus(public_key.size())?;
    let signature =
        rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| Error::InvalidSignature)?;
    rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key.clone())
        .verify_prehash(digest, &signature)
        .map_err(|_| Error::InvalidSignature)
}

/// AEAD-seals `plaintext` with AES-128-GCM. No associated data is used.
pub fn seal(
    plaintext: &[u8],
    key: &[u8; SYMMETRIC_KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
) -> Result<Vec<u8>, Error> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| Error::SealingFailed)
}

/// Inverse of [`seal`]. Fails on any tag mismatch; callers never see
/// unauthenticated plaintext.
pub fn open(
    ciphertext: &[u8],
    key: &[u8; SYMMETRIC_KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
) -> Result<Vec<u8>, Error> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::AuthenticationFailed)
}

/// Draws a fresh symmetric key from the system CSPRNG. One key per artifact;
/// (key, nonce) pairs are never reused.
pub fn generate_key() -> [u8; SYMMETRIC_KEY_BYTES] {
    let mut key = [0u8; SYMMETRIC_KEY_BYTES];
    OsRng.fill_bytes(&mut key);
    key
}

/// Draws a fresh 96-bit nonce from the system CSPRNG.
pub fn generate_nonce() -> [u8; NONCE_BYTES] {
    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypts the symmetric key under a device's RSA public key
/// (PKCS#1 v1.5 encryption).
pub fn wrap_key(
    public_key: &RsaPublicKey,
    key: &[u8; SYMMETRIC_KEY_BYTES],
) -> Result<[u8; RSA_KEY_BYTES], Error> {
    check_modulus(public_key.size())?;
    let ciphertext = public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, key)
        .map_err(|_| Error::KeyWrapFailed)?;
    <[u8; RSA_KEY_BYTES]>::try_from(ciphertext).map_err(|_| Error::KeyWrapFailed)
}

/// Device-side inverse of [`wrap_key`].
pub fn unwrap_key(
    private_key: &RsaPrivateKey,
    wrapped: &[u8],
) -> Result<[u8; SYMMETRIC_KEY_BYTES], Error> {
    let key = private_key
        .decrypt(Pkcs1v15Encrypt, wrapped)
        .map_err(|_| Error::KeyUnwrapFailed)?;
    <[u8; SYMMETRIC_KEY_BYTES]>::try_from(key).map_err(|_| Error::KeyUnwrapFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest;
    use std::sync::OnceLock;

    pub(crate) fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
    }

    #[test]
    fn sign_verify_roundtrip() {
        let key = test_key();
        let signer = RsaSigner::from_key(key.clone()).unwrap();
        let digest: [u8; 32] = Sha256::digest(b"firmware image").into();
        let signature = signer.sign_digest(&digest).unwrap();
        verify_digest(&key.to_public_key(), &digest, &signature).unwrap();
    }

    #[test]
    fn tampered_signature_fails() {
        let key = test_key();
        let signer = RsaSigner::from_key(key.clone()).unwrap();
        let digest: [u8; 32] = Sha256::digest(b"firmware image").into();
        let mut signature = signer.sign_digest(&digest).unwrap();
        signature[17] ^= 0x01;
        assert!(matches!(
            verify_digest(&key.to_public_key(), &digest, &signature),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn tampered_digest_fails() {
        let key = test_key();
        let signer = RsaSigner::from_key(key.clone()).unwrap();
        let mut digest: [u8; 32] = Sha256::digest(b"firmware image").into();
        let signature = signer.sign_digest(&digest).unwrap();
        digest[0] ^= 0x80;
        assert!(verify_digest(&key.to_public_key(), &digest, &signature).is_err());
    }

    #[test]
    fn undersized_key_is_rejected() {
        let small = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        assert!(matches!(
            RsaSigner::from_key(small),
            Err(Error::KeySize {
                expected: RSA_KEY_BYTES,
                actual: 128
            })
        ));
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = generate_key();
        let nonce = generate_nonce();
        let plaintext = b"artifact plaintext".to_vec();
        let ciphertext = seal(&plaintext, &key, &nonce).unwrap();
        assert_eq!(open(&ciphertext, &key, &nonce).unwrap(), plaintext);
    }

    #[test]
    fn open_rejects_single_bit_changes() {
        let key = generate_key();
        let nonce = generate_nonce();
        let ciphertext = seal(b"artifact plaintext", &key, &nonce).unwrap();

        let mut tampered = ciphertext.clone();
        tampered[3] ^= 0x01;
        assert!(open(&tampered, &key, &nonce).is_err());

        let mut bad_key = key;
        bad_key[0] ^= 0x01;
        assert!(open(&ciphertext, &bad_key, &nonce).is_err());

        let mut bad_nonce = nonce;
        bad_nonce[11] ^= 0x01;
        assert!(open(&ciphertext, &key, &bad_nonce).is_err());
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let rsa_key = test_key();
        let symmetric_key = generate_key();
        let wrapped = wrap_key(&rsa_key.to_public_key(), &symmetric_key).unwrap();
        assert_eq!(wrapped.len(), RSA_KEY_BYTES);
        assert_eq!(unwrap_key(rsa_key, &wrapped).unwrap(), symmetric_key);
    }
}
