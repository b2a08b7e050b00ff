//! The server-side update lifecycle state machine.
//!
//! Every update ID is either *Reserved* (directory and key material present,
//! no artifact) or *Uploaded* (artifact present, immutable from then on).
//! All mutations serialize behind a single lock; reads run concurrently
//! against an [`Arc`] snapshot of the pending-update index that is swapped
//! in whole after each rebuild.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use fleetcast_common::wire::{DecryptionKeyCiphertext, DecryptionKeyIvPair};

use crate::storage::{PendingIndex, UpdateStore};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no update has been prepared for ID {0}")]
    UnknownId(u32),
    #[error("an artifact was already uploaded for ID {0}")]
    Conflict(u32),
    /// Deliberately uninformative: callers cannot tell a nonexistent update
    /// from one that was not offered to them.
    #[error("not found")]
    NotFound,
    #[error("update {0} was not offered to this device")]
    NotAuthorized(u32),
    #[error("client did not present a usable identity")]
    MissingIdentity,
    #[error("storage error {0:?}")]
    Storage(#[from] io::Error),
}

pub struct Registry {
    store: UpdateStore,
    /// Serializes the scan-then-create and exists-then-write sequences of
    /// `prepare` and `upload`.
    mutation: Mutex<()>,
    index: RwLock<Arc<PendingIndex>>,
}

impl Registry {
    /// Opens (and creates, if absent) the storage root and builds the
    /// initial pending-update index from the persisted tree.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let store = UpdateStore::new(root);
        store.ensure_root()?;
        let index = Arc::new(store.scan_pending()?);
        info!(
            "loaded pending updates for {} device identities",
            index.len()
        );
        Ok(Self {
            store,
            mutation: Mutex::new(()),
            index: RwLock::new(index),
        })
    }

    /// Reserves a fresh update ID and persists the wrapped keys and the
    /// availability timestamp. On partial failure the directory stays
    /// Reserved and is never promoted.
    pub async fn prepare(
        &self,
        keys: &[DecryptionKeyCiphertext],
        available_at: i64,
    ) -> Result<u32, RegistryError> {
        let _guard = self.mutation.lock().await;
        let id = self.store.reserve_id()?;
        self.store.create_update(id, keys, available_at)?;
        debug!("reserved update ID {id} for {} devices", keys.len());
        Ok(id)
    }

    /// Stores the artifact ciphertext for a previously reserved ID and
    /// rebuilds the pending-update index. Re-uploads are rejected without
    /// touching the stored bytes.
    pub async fn upload(&self, id: u32, bytes: &[u8]) -> Result<(), RegistryError> {
        let _guard = self.mutation.lock().await;
        if !self.store.update_dir(id).is_dir() {
            return Err(RegistryError::UnknownId(id));
        }
        if self.store.artifact_path(id).is_file() {
            return Err(RegistryError::Conflict(id));
        }
        self.store.write_artifact(id, bytes)?;
        info!("stored artifact for update {id}");
        self.rebuild_index().await?;
        Ok(())
    }

    /// Rebuilds the index from the persisted tree and swaps it in as one
    /// unit, so readers never observe a half-populated view.
    pub async fn rebuild_index(&self) -> Result<(), RegistryError> {
        let fresh = Arc::new(self.store.scan_pending()?);
        *self.index.write().await = fresh;
        Ok(())
    }

    async fn snapshot(&self) -> Arc<PendingIndex> {
        self.index.read().await.clone()
    }

    /// Update IDs visible to `identity` right now.
    pub async fn whats_new(&self, identity: &str) -> Vec<u32> {
        self.whats_new_at(identity, unix_now()).await
    }

    /// Visibility requires both the per-device key (index membership) and
    /// an availability time that has passed.
    pub async fn whats_new_at(&self, identity: &str, now: i64) -> Vec<u32> {
        let index = self.snapshot().await;
        index
            .get(identity)
            .map(|updates| {
                updates
                    .iter()
                    .filter(|update| update.available_at <= now)
                    .map(|update| update.update_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reads the wrapped key and IV persisted for `(id, identity)`. This is
    /// a direct file lookup, not gated by the pending index.
    pub fn decryption_key(
        &self,
        id: u32,
        identity: &str,
    ) -> Result<DecryptionKeyIvPair, RegistryError> {
        let ct = self
            .store
            .read_key(id, identity)
            .map_err(not_found_or_storage)?;
        let iv = self
            .store
            .read_iv(id, identity)
            .map_err(not_found_or_storage)?;
        Ok(DecryptionKeyIvPair { ct, iv })
    }

    /// Returns the artifact ciphertext if `identity` was offered update
    /// `id`. Authorization comes from the index, not from file existence.
    pub async fn artifact(&self, id: u32, identity: &str) -> Result<Vec<u8>, RegistryError> {
        let index = self.snapshot().await;
        let offered = index
            .get(identity)
            .map(|updates| updates.iter().any(|update| update.update_id == id))
            .unwrap_or(false);
        if !offered {
            return Err(RegistryError::NotAuthorized(id));
        }
        std::fs::read(self.store.artifact_path(id)).map_err(not_found_or_storage)
    }
}

fn not_found_or_storage(err: io::Error) -> RegistryError {
    if err.kind() == io::ErrorKind::NotFound {
        RegistryError::NotFound
    } else {
        RegistryError::Storage(err)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcast_common::crypto::{NONCE_BYTES, RSA_KEY_BYTES};

    fn key_for(san: &str) -> DecryptionKeyCiphertext {
        DecryptionKeyCiphertext {
            san: san.to_owned(),
            ct: [0x33; RSA_KEY_BYTES],
            iv: [0x44; NONCE_BYTES],
        }
    }

    async fn registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn duplicate_upload_is_rejected_and_bytes_unchanged() {
        let (_dir, registry) = registry().await;
        let id = registry.prepare(&[key_for("device-a")], 0).await.unwrap();
        registry.upload(id, b"original").await.unwrap();

        let err = registry.upload(id, b"overwrite").await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(i) if i == id));
        assert_eq!(registry.artifact(id, "device-a").await.unwrap(), b"original");
    }

    #[tokio::test]
    async fn upload_for_unreserved_id_fails() {
        let (_dir, registry) = registry().await;
        assert!(matches!(
            registry.upload(9, b"ciphertext").await,
            Err(RegistryError::UnknownId(9))
        ));
    }

    #[tokio::test]
    async fn unoffered_identity_gets_not_found_and_not_authorized() {
        let (_dir, registry) = registry().await;
        let id = registry.prepare(&[key_for("device-a")], 0).await.unwrap();
        registry.upload(id, b"ciphertext").await.unwrap();

        // The update exists for device-a...
        assert!(registry.decryption_key(id, "device-a").is_ok());
        assert!(registry.artifact(id, "device-a").await.is_ok());

        // ...but device-b cannot tell it exists at all.
        assert!(matches!(
            registry.decryption_key(id, "device-b"),
            Err(RegistryError::NotFound)
        ));
        assert!(matches!(
            registry.artifact(id, "device-b").await,
            Err(RegistryError::NotAuthorized(_))
        ));
    }

    #[tokio::test]
    async fn availability_gating_follows_the_clock() {
        let (_dir, registry) = registry().await;
        let id = registry.prepare(&[key_for("device-a")], 500).await.unwrap();
        registry.upload(id, b"ciphertext").await.unwrap();

        assert!(registry.whats_new_at("device-a", 499).await.is_empty());
        assert_eq!(registry.whats_new_at("device-a", 500).await, vec![id]);
        assert_eq!(registry.whats_new_at("device-a", 501).await, vec![id]);
    }

    #[tokio::test]
    async fn index_only_lists_uploaded_updates() {
        let (_dir, registry) = registry().await;
        let reserved = registry.prepare(&[key_for("device-a")], 0).await.unwrap();
        let uploaded = registry.prepare(&[key_for("device-a")], 0).await.unwrap();
        registry.upload(uploaded, b"ciphertext").await.unwrap();

        let visible = registry.whats_new_at("device-a", i64::MAX).await;
        assert_eq!(visible, vec![uploaded]);
        assert!(!visible.contains(&reserved));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_prepares_never_share_an_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.prepare(&[key_for("device-a")], 0).await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8, "allocated IDs collided");
    }
}
