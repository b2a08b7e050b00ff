//! The update artifact binary format.
//!
//! Serialized plaintext layout (all integers little-endian):
//!
//! ```text
//! signature[256] | sequenceNumber[8] | hardwareId[16] | uriLength[2] | uriData[uriLength] | payload
//! ```
//!
//! The payload carries no length field; it is the suffix of the blob. This
//! is unambiguous because the AEAD seal fixes the total length and there is
//! exactly one producer of the format.

use std::io::Read;
use std::path::PathBuf;

use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};

use crate::crypto::{self, RSA_KEY_BYTES};
use crate::error::Error;

/// Length of the embedded RSA signature.
pub const SIGNATURE_BYTES: usize = RSA_KEY_BYTES;
/// Length of the hardware UUID field.
pub const HARDWARE_ID_BYTES: usize = 16;

pub const SIGNATURE_OFFSET: usize = 0;
pub const SEQUENCE_OFFSET: usize = SIGNATURE_OFFSET + SIGNATURE_BYTES;
pub const HARDWARE_ID_OFFSET: usize = SEQUENCE_OFFSET + 8;
pub const URI_LENGTH_OFFSET: usize = HARDWARE_ID_OFFSET + HARDWARE_ID_BYTES;
pub const URI_OFFSET: usize = URI_LENGTH_OFFSET + 2;

/// Chunk size used when streaming the payload through the digest, so
/// arbitrarily large images never need to be fully resident for hashing.
pub const DIGEST_CHUNK_BYTES: usize = 2048;

/// Header of an update artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateHeader {
    /// Publisher-managed monotonic counter. Not validated here.
    pub sequence_number: u64,
    /// Opaque 128-bit hardware identifier.
    pub hardware_id: [u8; HARDWARE_ID_BYTES],
    /// Optional firmware URI. Empty means the image is embedded in the
    /// artifact payload instead of referenced.
    pub uri: Vec<u8>,
    pub signature: [u8; SIGNATURE_BYTES],
}

impl UpdateHeader {
    /// Builds an unsigned header. The URI must fit the 16-bit length field.
    pub fn new(
        sequence_number: u64,
        hardware_id: [u8; HARDWARE_ID_BYTES],
        uri: Vec<u8>,
    ) -> Result<Self, Error> {
        if uri.len() > u16::MAX as usize {
            return Err(Error::UriTooLong(uri.len()));
        }
        Ok(Self {
            sequence_number,
            hardware_id,
            uri,
            signature: [0u8; SIGNATURE_BYTES],
        })
    }

    pub fn uri_length(&self) -> u16 {
        self.uri.len() as u16
    }

    /// SHA-256 over the header fields followed by the payload, streamed in
    /// [`DIGEST_CHUNK_BYTES`] chunks.
    pub fn compute_digest<R: Read>(&self, mut payload: R) -> Result<[u8; 32], Error> {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence_number.to_le_bytes());
        hasher.update(self.hardware_id);
        hasher.update(self.uri_length().to_le_bytes());
        hasher.update(&self.uri);

        let mut buffer = [0u8; DIGEST_CHUNK_BYTES];
        loop {
            let read = payload.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hasher.finalize().into())
    }

    /// Serializes the signed header and payload in the fixed field order.
    pub fn to_plaintext(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(URI_OFFSET + self.uri.len() + payload.len());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.sequence_number.to_le_bytes());
        out.extend_from_slice(&self.hardware_id);
        out.extend_from_slice(&self.uri_length().to_le_bytes());
        out.extend_from_slice(&self.uri);
        out.extend_from_slice(payload);
        out
    }
}

/// A signed artifact. The firmware payload stays on disk and is only
/// streamed when the artifact is hashed or encrypted.
#[derive(Clone, Debug)]
pub struct UpdateArtifact {
    pub header: UpdateHeader,
    pub payload_path: PathBuf,
}

/// An artifact reassembled from opened plaintext, as a device sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedArtifact {
    pub header: UpdateHeader,
    pub payload: Vec<u8>,
}

impl ParsedArtifact {
    /// Splits opened plaintext back into header and payload using the fixed
    /// offsets. Rejects truncated input.
    pub fn from_plaintext(plaintext: &[u8]) -> Result<Self, Error> {
        if plaintext.len() < URI_OFFSET {
            return Err(Error::TruncatedArtifact);
        }
        let mut signature = [0u8; SIGNATURE_BYTES];
        signature.copy_from_slice(&plaintext[SIGNATURE_OFFSET..SEQUENCE_OFFSET]);

        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&plaintext[SEQUENCE_OFFSET..HARDWARE_ID_OFFSET]);
        let sequence_number = u64::from_le_bytes(sequence);

        let mut hardware_id = [0u8; HARDWARE_ID_BYTES];
        hardware_id.copy_from_slice(&plaintext[HARDWARE_ID_OFFSET..URI_LENGTH_OFFSET]);

        let mut length = [0u8; 2];
        length.copy_from_slice(&plaintext[URI_LENGTH_OFFSET..URI_OFFSET]);
        let uri_length = u16::from_le_bytes(length) as usize;
        if plaintext.len() < URI_OFFSET + uri_length {
            return Err(Error::TruncatedArtifact);
        }
        let uri = plaintext[URI_OFFSET..URI_OFFSET + uri_length].to_vec();
        let payload = plaintext[URI_OFFSET + uri_length..].to_vec();

        Ok(Self {
            header: UpdateHeader {
                sequence_number,
                hardware_id,
                uri,
                signature,
            },
            payload,
        })
    }

    /// Recomputes the digest and checks the embedded signature.
    pub fn verify(&self, public_key: &RsaPublicKey) -> Result<(), Error> {
        let digest = self.header.compute_digest(self.payload.as_slice())?;
        crypto::verify_digest(public_key, &digest, &self.header.signature)
    }
}
