//! Builds and signs update artifacts.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use fleetcast_common::artifact::{UpdateArtifact, UpdateHeader, HARDWARE_ID_BYTES};
use fleetcast_common::crypto::RsaSigner;
use fleetcast_common::error::Error;

/// Builds the canonical header, streams the digest over header fields and
/// the image, signs it, and embeds the signature. If `uri` is empty the
/// firmware image is embedded into the artifact at encryption time instead
/// of being referenced.
pub fn create_artifact(
    sequence_number: u64,
    hardware_id: [u8; HARDWARE_ID_BYTES],
    image_path: &Path,
    uri: &str,
    signing_key_path: &Path,
) -> Result<UpdateArtifact, Error> {
    if image_path.as_os_str().is_empty() {
        return Err(Error::MissingInput("firmware image path"));
    }
    if signing_key_path.as_os_str().is_empty() {
        return Err(Error::MissingInput("signing key path"));
    }

    let mut header = UpdateHeader::new(sequence_number, hardware_id, uri.as_bytes().to_vec())?;
    let image = File::open(image_path)?;
    let digest = header.compute_digest(BufReader::new(image))?;
    debug!("artifact digest {}", hex::encode(digest));

    let signer = RsaSigner::from_pem_file(signing_key_path)?;
    header.signature = signer.sign_digest(&digest)?;

    Ok(UpdateArtifact {
        header,
        payload_path: image_path.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{signing_key_pem, test_key};
    use fleetcast_common::crypto::verify_digest;

    #[test]
    fn builds_a_verifiable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("firmware.bin");
        std::fs::write(&image_path, vec![0x7e; 5000]).unwrap();
        let key_path = signing_key_pem(dir.path());

        let artifact = create_artifact(
            9,
            [1u8; HARDWARE_ID_BYTES],
            &image_path,
            "https://fw.example/image",
            &key_path,
        )
        .unwrap();

        let image = File::open(&image_path).unwrap();
        let digest = artifact.header.compute_digest(BufReader::new(image)).unwrap();
        verify_digest(
            &test_key().to_public_key(),
            &digest,
            &artifact.header.signature,
        )
        .unwrap();
    }

    #[test]
    fn empty_paths_are_rejected() {
        assert!(matches!(
            create_artifact(1, [0u8; 16], Path::new(""), "", Path::new("key.pem")),
            Err(Error::MissingInput("firmware image path"))
        ));
        assert!(matches!(
            create_artifact(1, [0u8; 16], Path::new("image.bin"), "", Path::new("")),
            Err(Error::MissingInput("signing key path"))
        ));
    }

    #[test]
    fn unreadable_image_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = signing_key_pem(dir.path());
        let missing = dir.path().join("nope.bin");
        assert!(matches!(
            create_artifact(1, [0u8; 16], &missing, "", &key_path),
            Err(Error::Io(_))
        ));
    }
}
