use thiserror::Error;

/// Errors produced while building, encrypting, or parsing update artifacts.
///
/// Crypto variants are deliberately free of key material and plaintext so
/// they can be logged as-is.
#[derive(Error, Debug)]
pub enum Error {
    #[error("missing required input: {0}")]
    MissingInput(&'static str),
    #[error("error during I/O {0:?}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode PEM key material")]
    PemKeyDecoding,
    #[error("key size mismatch, expected {expected} bytes but got {actual}")]
    KeySize { expected: usize, actual: usize },
    #[error("URI of {0} bytes does not fit the 16-bit length field")]
    UriTooLong(usize),
    #[error("signing the artifact digest failed")]
    SigningFailed,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("sealing the artifact failed")]
    SealingFailed,
    #[error("authenticated decryption failed")]
    AuthenticationFailed,
    #[error("wrapping the symmetric key failed")]
    KeyWrapFailed,
    #[error("unwrapping the symmetric key failed")]
    KeyUnwrapFailed,
    #[error("artifact plaintext is truncated")]
    TruncatedArtifact,
    #[error("failed to parse certificate")]
    CertificateParse,
    #[error("certificate does not carry a DNS subject alternative name")]
    MissingSan,
}
