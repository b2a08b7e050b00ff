//! Helpers for extracting device identities and wrapping keys from X.509
//! certificates. The device identity is the first DNS subject alternative
//! name of the certificate presented over mutual TLS.

use rsa::RsaPublicKey;
use x509_cert::der::referenced::OwnedToRef;
use x509_cert::der::{Decode, DecodePem};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::Certificate;

use crate::error::Error;

pub fn from_der(der: &[u8]) -> Result<Certificate, Error> {
    Certificate::from_der(der).map_err(|_| Error::CertificateParse)
}

pub fn from_pem(pem: &[u8]) -> Result<Certificate, Error> {
    Certificate::from_pem(pem).map_err(|_| Error::CertificateParse)
}

/// Returns the first DNS subject alternative name, if any.
pub fn san_dns_name(cert: &Certificate) -> Option<String> {
    let (_, san) = cert.tbs_certificate.get::<SubjectAltName>().ok()??;
    san.0.iter().find_map(|name| match name {
        GeneralName::DnsName(dns) => Some(dns.as_str().to_owned()),
        _ => None,
    })
}

/// Extracts the RSA public key a device's symmetric key copy is wrapped
/// under.
pub fn rsa_public_key(cert: &Certificate) -> Result<RsaPublicKey, Error> {
    RsaPublicKey::try_from(cert.tbs_certificate.subject_public_key_info.owned_to_ref())
        .map_err(|_| Error::PemKeyDecoding)
}
