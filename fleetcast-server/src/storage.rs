//! Persisted layout of update records.
//!
//! The directory tree is the source of truth. One directory per update ID:
//!
//! ```text
//! <root>/<id>/<deviceIdentity>      wrapped symmetric key
//! <root>/<id>/<deviceIdentity>_iv   the device's copy of the artifact IV
//! <root>/<id>/timestamp_<id>        availability, 8 bytes LE epoch seconds
//! <root>/<id>/<id>                  artifact ciphertext (present once Uploaded)
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fleetcast_common::crypto::{NONCE_BYTES, RSA_KEY_BYTES};
use fleetcast_common::fsutil::write_atomic;
use fleetcast_common::wire::DecryptionKeyCiphertext;

/// One entry of the pending-update index, reconstructed from the persisted
/// tree. Not itself a source of truth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingUpdate {
    pub update_id: u32,
    pub available_at: i64,
}

/// Device identity to pending updates, ordered by descending availability
/// time.
pub type PendingIndex = HashMap<String, Vec<PendingUpdate>>;

#[derive(Debug)]
pub struct UpdateStore {
    root: PathBuf,
}

impl UpdateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn update_dir(&self, id: u32) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn artifact_path(&self, id: u32) -> PathBuf {
        self.update_dir(id).join(id.to_string())
    }

    pub fn key_path(&self, id: u32, identity: &str) -> PathBuf {
        self.update_dir(id).join(identity)
    }

    pub fn iv_path(&self, id: u32, identity: &str) -> PathBuf {
        self.update_dir(id).join(format!("{identity}_iv"))
    }

    pub fn timestamp_path(&self, id: u32) -> PathBuf {
        self.update_dir(id).join(format!("timestamp_{id}"))
    }

    /// All update IDs that currently own a directory, ascending.
    pub fn scan_ids(&self) -> io::Result<Vec<u32>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Smallest non-negative integer without a directory. IDs freed by
    /// deleted updates are reclaimed. Callers must hold the registry
    /// mutation lock across the scan and the following create.
    pub fn reserve_id(&self) -> io::Result<u32> {
        let mut next = 0u32;
        for id in self.scan_ids()? {
            if id != next {
                break;
            }
            next += 1;
        }
        Ok(next)
    }

    /// Creates the update directory and persists key material and the
    /// availability timestamp. The artifact file is written separately by
    /// [`UpdateStore::write_artifact`]; until then the record stays in the
    /// Reserved state.
    pub fn create_update(
        &self,
        id: u32,
        keys: &[DecryptionKeyCiphertext],
        available_at: i64,
    ) -> io::Result<()> {
        fs::create_dir(self.update_dir(id))?;
        for key in keys {
            write_atomic(&self.key_path(id, &key.san), &key.ct)?;
            write_atomic(&self.iv_path(id, &key.san), &key.iv)?;
        }
        write_atomic(
            &self.timestamp_path(id),
            &(available_at as u64).to_le_bytes(),
        )
    }

    pub fn write_artifact(&self, id: u32, bytes: &[u8]) -> io::Result<()> {
        write_atomic(&self.artifact_path(id), bytes)
    }

    pub fn read_key(&self, id: u32, identity: &str) -> io::Result<[u8; RSA_KEY_BYTES]> {
        read_exact_len(&self.key_path(id, identity))
    }

    pub fn read_iv(&self, id: u32, identity: &str) -> io::Result<[u8; NONCE_BYTES]> {
        read_exact_len(&self.iv_path(id, identity))
    }

    pub fn read_timestamp(&self, id: u32) -> io::Result<i64> {
        let bytes: [u8; 8] = read_exact_len(&self.timestamp_path(id))?;
        Ok(u64::from_le_bytes(bytes) as i64)
    }

    /// Walks the full tree and rebuilds the pending-update index. Only
    /// updates whose directory holds both the device's wrapped key and the
    /// artifact file are counted.
    pub fn scan_pending(&self) -> io::Result<PendingIndex> {
        let mut index = PendingIndex::new();
        for id in self.scan_ids()? {
            if !self.artifact_path(id).is_file() {
                // Reserved but never uploaded.
                continue;
            }
            let available_at = self.read_timestamp(id)?;
            let artifact_name = id.to_string();
            let timestamp_name = format!("timestamp_{id}");
            for entry in fs::read_dir(self.update_dir(id))? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name == artifact_name
                    || name == timestamp_name
                    || name.ends_with("_iv")
                    || name.ends_with(".tmp")
                {
                    continue;
                }
                index
                    .entry(name.to_owned())
                    .or_default()
                    .push(PendingUpdate {
                        update_id: id,
                        available_at,
                    });
            }
        }
        for updates in index.values_mut() {
            updates.sort_by(|a, b| b.available_at.cmp(&a.available_at));
        }
        Ok(index)
    }
}

fn read_exact_len<const N: usize>(path: &Path) -> io::Result<[u8; N]> {
    let bytes = fs::read(path)?;
    bytes.try_into().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{path:?} does not hold exactly {N} bytes"),
        )
    })
}
