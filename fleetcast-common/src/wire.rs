//! JSON bodies exchanged between the publisher, the server, and devices.

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

use crate::crypto::{NONCE_BYTES, RSA_KEY_BYTES};

/// The symmetric artifact key wrapped for one device, keyed by the DNS SAN
/// of its certificate. The IV accompanies the symmetric decryption of the
/// artifact, not the wrapping step; it is recorded per device so every
/// device receives its own copy.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionKeyCiphertext {
    pub san: String,
    #[serde_as(as = "Base64")]
    pub ct: [u8; RSA_KEY_BYTES],
    #[serde_as(as = "Base64")]
    pub iv: [u8; NONCE_BYTES],
}

/// Response body of `getDecryptionKey`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionKeyIvPair {
    #[serde_as(as = "Base64")]
    pub ct: [u8; RSA_KEY_BYTES],
    #[serde_as(as = "Base64")]
    pub iv: [u8; NONCE_BYTES],
}

/// Request body of `prepareUpdate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareUpdateRequest {
    pub keys: Vec<DecryptionKeyCiphertext>,
    /// Epoch seconds from which the update becomes visible to devices.
    pub available: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn prepare_request_json_roundtrip() {
        let request = PrepareUpdateRequest {
            keys: vec![DecryptionKeyCiphertext {
                san: "device-0.fleet.example".to_owned(),
                ct: [0x42; RSA_KEY_BYTES],
                iv: hex!("000102030405060708090a0b"),
            }],
            available: 1_700_000_000,
        };
        let json = serde_json::to_string(&request).unwrap();
        let decoded: PrepareUpdateRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn wrapped_key_is_base64_in_json() {
        let pair = DecryptionKeyIvPair {
            ct: [0u8; RSA_KEY_BYTES],
            iv: [0u8; NONCE_BYTES],
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["iv"], "AAAAAAAAAAAAAAAA");
        assert!(json["ct"].as_str().unwrap().starts_with("AAAA"));
    }

    #[test]
    fn wrong_length_ciphertext_is_rejected() {
        let json = r#"{"ct":"AAAA","iv":"AAAAAAAAAAAAAAAA"}"#;
        assert!(serde_json::from_str::<DecryptionKeyIvPair>(json).is_err());
    }
}
