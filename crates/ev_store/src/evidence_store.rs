//! Evidence store façade over a `StorageBackend`.
//!
//! Key paths use content addressing:
//! - original:   `originals/<sha256[0:4]>/<sha256>/<filename>`
//! - derivative: `derivatives/<sha256[0:4]>/<sha256>/<type>/<filename>`
//! - manifest:   `manifests/<evidence_id>.json` (canonical JSON, UTF-8)
//! - pointer:    `index/<sha256>` → evidence_id (write-once, minted at
//!   first ingest so duplicate ingests find their manifest)
//!
//! Manifest read-modify-write is serialized per evidence id through a
//! process-wide lock table; concurrent appends never lose entries and
//! timestamps never decrease.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::warn;

use ev_core::entities::{DerivativeDescriptor, EvidenceManifest, IngestDescriptor};
use ev_core::ids::{EvidenceId, Sha256Hex};
use ev_core::time;

use crate::backend::{sanitize_filename, GetOutcome, StorageBackend};
use crate::StoreError;

/// Result of an ingest. `is_new == false` means the bytes were already
/// stored and this call was a linking operation, not a copy.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub evidence_id: EvidenceId,
    pub sha256: Sha256Hex,
    pub size_bytes: u64,
    pub is_new: bool,
}

pub struct EvidenceStore {
    backend: Arc<dyn StorageBackend>,
    manifest_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EvidenceStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            manifest_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    fn original_key(sha256: &Sha256Hex, filename: &str) -> String {
        format!(
            "originals/{}/{}/{}",
            sha256.prefix4(),
            sha256,
            sanitize_filename(filename)
        )
    }

    fn derivative_key(sha256: &Sha256Hex, derivative_type: &str, filename: &str) -> String {
        format!(
            "derivatives/{}/{}/{}/{}",
            sha256.prefix4(),
            sha256,
            sanitize_filename(derivative_type),
            sanitize_filename(filename)
        )
    }

    fn manifest_key(evidence_id: &EvidenceId) -> String {
        format!("manifests/{evidence_id}.json")
    }

    fn index_key(sha256: &Sha256Hex) -> String {
        format!("index/{sha256}")
    }

    fn lock_for(&self, evidence_id: &EvidenceId) -> Arc<Mutex<()>> {
        let mut table = self.manifest_locks.lock();
        table
            .entry(evidence_id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ingest an original. Streams input through a SHA-256 hasher; if the
    /// bytes already exist, links only (no rewrite); creates the manifest on
    /// first ingest and appends an `ingested` audit entry either way.
    ///
    /// `expected_sha256` mismatches fail with `IntegrityMismatch` before
    /// anything is persisted. `KeyExists` from a concurrent identical ingest
    /// is remapped to idempotent success.
    pub fn ingest(
        &self,
        reader: &mut dyn Read,
        original_filename: &str,
        mime_type: &str,
        ingested_by: &str,
        device_label: Option<&str>,
        expected_sha256: Option<&str>,
    ) -> Result<IngestOutcome, StoreError> {
        // Spool to a private temp while hashing: the content address is not
        // known until the stream is fully consumed.
        let spool = SpooledInput::capture(reader)?;
        let sha256 = Sha256Hex::from_hasher(spool.sha256.clone());

        if let Some(expected) = expected_sha256 {
            if expected != sha256.as_str() {
                return Err(StoreError::IntegrityMismatch {
                    expected: expected.to_string(),
                    computed: sha256.as_str().to_string(),
                });
            }
        }

        // Identity is the content address: any stored original with this
        // hash makes the ingest a linking operation, regardless of filename.
        let mut is_new = true;
        if self.find_original_key(&sha256)?.is_some() {
            is_new = false;
        } else {
            let key = Self::original_key(&sha256, original_filename);
            match self
                .backend
                .put_stream(&key, &mut spool.reader()?, Some(sha256.as_str()))
            {
                Ok(_) => {}
                Err(StoreError::KeyExists(_)) => is_new = false,
                Err(e) => return Err(e),
            }
        }

        let evidence_id = self.resolve_or_create_manifest(
            &sha256,
            original_filename,
            mime_type,
            ingested_by,
            device_label,
            spool.size_bytes,
        )?;

        self.append_audit(
            &evidence_id,
            "ingested",
            ingested_by,
            json!({
                "sha256": sha256.as_str(),
                "original_filename": original_filename,
                "size_bytes": spool.size_bytes,
                "is_new": is_new,
            }),
        )?;

        Ok(IngestOutcome {
            evidence_id,
            sha256,
            size_bytes: spool.size_bytes,
            is_new,
        })
    }

    /// Find the manifest for a content address via the pointer object,
    /// creating both on first ingest.
    fn resolve_or_create_manifest(
        &self,
        sha256: &Sha256Hex,
        original_filename: &str,
        mime_type: &str,
        ingested_by: &str,
        device_label: Option<&str>,
        size_bytes: u64,
    ) -> Result<EvidenceId, StoreError> {
        let index_key = Self::index_key(sha256);
        if let Some(existing) = self.lookup_evidence_id(sha256)? {
            return Ok(existing);
        }

        let evidence_id = EvidenceId::mint();
        let manifest = EvidenceManifest::new(
            evidence_id.clone(),
            IngestDescriptor {
                original_filename: original_filename.to_string(),
                mime_type: mime_type.to_string(),
                size_bytes,
                sha256: sha256.clone(),
                ingested_at: time::now_utc_string(),
                ingested_by: ingested_by.to_string(),
                device_label: device_label.map(str::to_string),
            },
        );
        self.save_manifest(&manifest)?;

        match self
            .backend
            .put(&index_key, evidence_id.as_str().as_bytes(), None)
        {
            Ok(_) => Ok(evidence_id),
            Err(StoreError::KeyExists(_)) => {
                // Lost the race to a concurrent first ingest: adopt theirs.
                let found = self.backend.get(&index_key)?;
                let id = String::from_utf8(found.data)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                id.trim()
                    .parse()
                    .map_err(|_| StoreError::Unavailable(format!("corrupt index entry {index_key}")))
            }
            Err(e) => Err(e),
        }
    }

    /// Store a derivative produced from an original. Writes the bytes at the
    /// derivative path, appends the descriptor to the manifest, and records
    /// a `derivative_created` audit entry.
    pub fn store_derivative(
        &self,
        original_sha256: &Sha256Hex,
        derivative_type: &str,
        filename: &str,
        data: &[u8],
        parameters: std::collections::BTreeMap<String, Value>,
    ) -> Result<DerivativeDescriptor, StoreError> {
        let key = Self::derivative_key(original_sha256, derivative_type, filename);
        let put = self.backend.put(&key, data, None)?;

        let descriptor = DerivativeDescriptor {
            derivative_type: derivative_type.to_string(),
            filename: sanitize_filename(filename),
            sha256: Sha256Hex::from_hasher(put.sha256.clone()),
            size_bytes: put.size_bytes,
            created_at: time::now_utc_string(),
            parameters,
        };

        let evidence_id = self.lookup_evidence_id(original_sha256)?.ok_or_else(|| {
            StoreError::NotFound(format!("no manifest for original {original_sha256}"))
        })?;

        let lock = self.lock_for(&evidence_id);
        let _guard = lock.lock();
        let mut manifest = self
            .load_manifest(&evidence_id)?
            .ok_or_else(|| StoreError::NotFound(Self::manifest_key(&evidence_id)))?;
        manifest.append_derivative(descriptor.clone());
        manifest.append_audit(
            "derivative_created",
            "evidence_store",
            json!({
                "derivative_type": derivative_type,
                "filename": descriptor.filename,
                "sha256": descriptor.sha256.as_str(),
                "size_bytes": descriptor.size_bytes,
            }),
        );
        self.save_manifest(&manifest)?;

        Ok(descriptor)
    }

    /// Map a content address back to its manifest id (first-ingest pointer).
    pub fn lookup_evidence_id(
        &self,
        sha256: &Sha256Hex,
    ) -> Result<Option<EvidenceId>, StoreError> {
        match self.backend.get(&Self::index_key(sha256)) {
            Ok(found) => {
                let id = String::from_utf8(found.data)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                Ok(Some(id.trim().parse().map_err(|_| {
                    StoreError::Unavailable(format!("corrupt index entry for {sha256}"))
                })?))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn load_manifest(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Option<EvidenceManifest>, StoreError> {
        match self.backend.get(&Self::manifest_key(evidence_id)) {
            Ok(found) => {
                let manifest: EvidenceManifest = serde_json::from_slice(&found.data)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                Ok(Some(manifest))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save_manifest(&self, manifest: &EvidenceManifest) -> Result<(), StoreError> {
        let bytes = ev_io::canonical_json::to_canonical_bytes(manifest)?;
        self.backend
            .put_mutable(&Self::manifest_key(&manifest.evidence_id), &bytes)?;
        Ok(())
    }

    /// Append an audit entry under the per-manifest lock. Timestamps are
    /// clamped to `max(now, last_entry)`.
    pub fn append_audit(
        &self,
        evidence_id: &EvidenceId,
        action: &str,
        actor: &str,
        details: Value,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(evidence_id);
        let _guard = lock.lock();
        let mut manifest = self
            .load_manifest(evidence_id)?
            .ok_or_else(|| StoreError::NotFound(Self::manifest_key(evidence_id)))?;
        manifest.append_audit(action, actor, details);
        self.save_manifest(&manifest)
    }

    /// Read the original bytes for a content address, if stored.
    pub fn read_original(&self, sha256: &Sha256Hex) -> Result<Option<GetOutcome>, StoreError> {
        match self.find_original_key(sha256)? {
            Some(key) => Ok(Some(self.backend.get(&key)?)),
            None => Ok(None),
        }
    }

    /// Read the bytes of a typed derivative, resolved through the manifest.
    pub fn read_derivative(
        &self,
        sha256: &Sha256Hex,
        derivative_type: &str,
        filename: &str,
    ) -> Result<Option<GetOutcome>, StoreError> {
        let key = Self::derivative_key(sha256, derivative_type, filename);
        match self.backend.get(&key) {
            Ok(found) => Ok(Some(found)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve the original to a local fetchable location, when the backend
    /// has one. Network backends return None; use `read_original`.
    pub fn get_original_path(&self, sha256: &Sha256Hex) -> Result<Option<PathBuf>, StoreError> {
        Ok(self
            .find_original_key(sha256)?
            .and_then(|key| self.backend.local_path(&key)))
    }

    /// First-class derivative path resolution (no internal layout leaks).
    pub fn get_derivative_path(
        &self,
        sha256: &Sha256Hex,
        derivative_type: &str,
        filename: &str,
    ) -> Result<Option<PathBuf>, StoreError> {
        let key = Self::derivative_key(sha256, derivative_type, filename);
        Ok(self.backend.local_path(&key))
    }

    fn find_original_key(&self, sha256: &Sha256Hex) -> Result<Option<String>, StoreError> {
        let prefix = format!("originals/{}/{}", sha256.prefix4(), sha256);
        let keys = self.backend.list_keys(&prefix)?;
        if keys.len() > 1 {
            warn!(%sha256, count = keys.len(), "multiple filenames for one content address");
        }
        Ok(keys.into_iter().next())
    }
}

/// Fully-captured input stream: hashed once, replayable for the backend put.
///
/// Spools to memory below a threshold, to a private temp file above it, so
/// multi-GB originals are never held in memory.
struct SpooledInput {
    sha256: String,
    size_bytes: u64,
    storage: SpoolStorage,
}

enum SpoolStorage {
    Memory(Vec<u8>),
    File(tempfile_path::TempPath),
}

impl SpooledInput {
    const MEMORY_CAP: u64 = 8 * 1024 * 1024;

    fn capture(reader: &mut dyn Read) -> Result<Self, StoreError> {
        use digest::Digest;
        let mut hasher = sha2::Sha256::new();
        let mut buf = [0u8; ev_io::hasher::HASH_BLOCK_SIZE];
        let mut memory: Vec<u8> = Vec::new();
        let mut file: Option<(std::fs::File, tempfile_path::TempPath)> = None;
        let mut size: u64 = 0;

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
            if file.is_none() && size > Self::MEMORY_CAP {
                let (mut f, path) = tempfile_path::create()?;
                std::io::Write::write_all(&mut f, &memory)?;
                memory = Vec::new();
                file = Some((f, path));
            }
            match &mut file {
                Some((f, _)) => std::io::Write::write_all(f, &buf[..n])?,
                None => memory.extend_from_slice(&buf[..n]),
            }
        }

        let storage = match file {
            Some((f, path)) => {
                f.sync_all()?;
                drop(f);
                SpoolStorage::File(path)
            }
            None => SpoolStorage::Memory(memory),
        };
        Ok(Self {
            sha256: hex::encode(hasher.finalize()),
            size_bytes: size,
            storage,
        })
    }

    fn reader(&self) -> Result<Box<dyn Read + '_>, StoreError> {
        Ok(match &self.storage {
            SpoolStorage::Memory(data) => Box::new(std::io::Cursor::new(data.as_slice())),
            SpoolStorage::File(path) => Box::new(std::fs::File::open(path.as_path())?),
        })
    }
}

/// Minimal self-deleting temp file path (std-only; the `tempfile` crate is
/// kept to dev-dependencies across the workspace).
mod tempfile_path {
    use std::fs::File;
    use std::path::{Path, PathBuf};

    pub struct TempPath(PathBuf);

    impl TempPath {
        pub fn as_path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    pub fn create() -> std::io::Result<(File, TempPath)> {
        let path = std::env::temp_dir().join(format!(
            "ev_ingest_{}",
            uuid::Uuid::new_v4().simple()
        ));
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok((file, TempPath(path)))
    }
}
