//! Chunked upload staging for large originals.
//!
//! Flow: `init` → numbered `receive_chunk` calls (any order, idempotent
//! overwrite) → `finalize` (assemble ascending, verify hash/size) → caller
//! hands the assembled artifact to `EvidenceStore::ingest`.
//!
//! Staging never writes into the evidence store. Layout:
//! `<staging_root>/<staging_id>/chunk_<index:06>` plus `session.json`.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use digest::Digest;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use crate::backend::sanitize_filename;
use crate::StoreError;

pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB
pub const DEFAULT_EXPIRY_SECONDS: i64 = 4 * 3600;

#[derive(Debug, Clone)]
pub struct StagingConfig {
    pub root: PathBuf,
    pub max_chunk_bytes: u64,
    pub expiry_seconds: i64,
}

impl StagingConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            expiry_seconds: DEFAULT_EXPIRY_SECONDS,
        }
    }
}

/// Metadata for an in-progress chunked upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingSession {
    pub staging_id: String,
    pub original_filename: String,
    pub total_chunks: u32,
    /// Expected total bytes (0 = unknown).
    pub total_size: u64,
    /// Expected final hash (None = verify on finalize only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_sha256: Option<String>,
    /// Unix epoch seconds.
    pub created_at: i64,
    pub chunks_received: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_label: Option<String>,
}

/// Result of finalizing a chunked upload.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub staging_id: String,
    pub assembled_path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

pub struct ChunkedUploadStaging {
    config: StagingConfig,
}

impl ChunkedUploadStaging {
    pub fn open(config: StagingConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.root)?;
        Ok(Self { config })
    }

    fn session_dir(&self, staging_id: &str) -> PathBuf {
        self.config.root.join(staging_id)
    }

    fn session_meta_path(&self, staging_id: &str) -> PathBuf {
        self.session_dir(staging_id).join("session.json")
    }

    fn chunk_path(&self, staging_id: &str, chunk_index: u32) -> PathBuf {
        self.session_dir(staging_id)
            .join(format!("chunk_{chunk_index:06}"))
    }

    /// Create a new staging session and persist its metadata.
    pub fn init(
        &self,
        original_filename: &str,
        total_chunks: u32,
        total_size: u64,
        expected_sha256: Option<&str>,
        uploader: Option<&str>,
        device_label: Option<&str>,
    ) -> Result<StagingSession, StoreError> {
        if total_chunks == 0 {
            return Err(StoreError::Validation("total_chunks must be positive".into()));
        }
        let session = StagingSession {
            staging_id: uuid::Uuid::new_v4().simple().to_string(),
            original_filename: sanitize_filename(original_filename),
            total_chunks,
            total_size,
            expected_sha256: expected_sha256.map(str::to_string),
            created_at: Utc::now().timestamp(),
            chunks_received: Vec::new(),
            uploader: uploader.map(str::to_string),
            device_label: device_label.map(str::to_string),
        };
        fs::create_dir_all(self.session_dir(&session.staging_id))?;
        self.save_session(&session)?;
        info!(
            staging_id = %session.staging_id,
            filename = %session.original_filename,
            total_chunks,
            "chunked upload session created"
        );
        Ok(session)
    }

    fn save_session(&self, session: &StagingSession) -> Result<(), StoreError> {
        let bytes = ev_io::canonical_json::to_canonical_bytes(session)?;
        ev_io::atomic::write_bytes_atomic(&self.session_meta_path(&session.staging_id), &bytes)?;
        Ok(())
    }

    /// Load session metadata, or None if missing.
    pub fn load_session(&self, staging_id: &str) -> Result<Option<StagingSession>, StoreError> {
        let path = self.session_meta_path(staging_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let session =
            serde_json::from_slice(&data).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Some(session))
    }

    /// Store a chunk. Chunks may arrive in any order and may be re-sent
    /// (idempotent overwrite).
    pub fn receive_chunk(
        &self,
        staging_id: &str,
        chunk_index: u32,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let mut session = self
            .load_session(staging_id)?
            .ok_or_else(|| StoreError::NotFound(format!("staging session {staging_id}")))?;

        if chunk_index >= session.total_chunks {
            return Err(StoreError::Validation(format!(
                "chunk index {chunk_index} out of range [0, {})",
                session.total_chunks
            )));
        }
        if data.len() as u64 > self.config.max_chunk_bytes {
            return Err(StoreError::Validation(format!(
                "chunk {chunk_index} exceeds max size ({} > {})",
                data.len(),
                self.config.max_chunk_bytes
            )));
        }

        fs::write(self.chunk_path(staging_id, chunk_index), data)?;

        if !session.chunks_received.contains(&chunk_index) {
            session.chunks_received.push(chunk_index);
            session.chunks_received.sort_unstable();
            self.save_session(&session)?;
        }
        debug!(
            staging_id,
            chunk = chunk_index + 1,
            of = session.total_chunks,
            bytes = data.len(),
            "chunk received"
        );
        Ok(())
    }

    /// Assemble all chunks in ascending order while hashing. On hash or size
    /// mismatch the assembled bytes are deleted and the call fails.
    pub fn finalize(&self, staging_id: &str) -> Result<FinalizeOutcome, StoreError> {
        let session = self
            .load_session(staging_id)?
            .ok_or_else(|| StoreError::NotFound(format!("staging session {staging_id}")))?;

        let missing: Vec<u32> = (0..session.total_chunks)
            .filter(|i| !session.chunks_received.contains(i))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::Validation(format!(
                "missing chunks: {missing:?}"
            )));
        }

        let assembled_path = self
            .session_dir(staging_id)
            .join(format!("assembled_{}", session.original_filename));
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        let assemble: Result<(), StoreError> = (|| {
            let mut out = fs::File::create(&assembled_path)?;
            for i in 0..session.total_chunks {
                let chunk = fs::read(self.chunk_path(staging_id, i))?;
                hasher.update(&chunk);
                std::io::Write::write_all(&mut out, &chunk)?;
                size += chunk.len() as u64;
            }
            out.sync_all()?;
            Ok(())
        })();
        if let Err(e) = assemble {
            let _ = fs::remove_file(&assembled_path);
            return Err(e);
        }

        let computed = hex::encode(hasher.finalize());

        if let Some(expected) = &session.expected_sha256 {
            if &computed != expected {
                let _ = fs::remove_file(&assembled_path);
                return Err(StoreError::IntegrityMismatch {
                    expected: expected.clone(),
                    computed,
                });
            }
        }
        if session.total_size != 0 && size != session.total_size {
            let _ = fs::remove_file(&assembled_path);
            return Err(StoreError::Validation(format!(
                "size mismatch: expected {}, got {size}",
                session.total_size
            )));
        }

        info!(
            staging_id,
            filename = %session.original_filename,
            size,
            "chunked upload finalized"
        );
        Ok(FinalizeOutcome {
            staging_id: staging_id.to_string(),
            assembled_path,
            sha256: computed,
            size_bytes: size,
        })
    }

    /// Remove all staging data for a session. Returns true if it existed.
    pub fn cleanup(&self, staging_id: &str) -> Result<bool, StoreError> {
        let dir = self.session_dir(staging_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            info!(staging_id, "staging session cleaned up");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Remove sessions older than `max_age_seconds`. Returns the count removed.
    pub fn cleanup_expired(&self, max_age_seconds: i64) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp();
        let mut removed = 0;
        if !self.config.root.exists() {
            return Ok(0);
        }
        for entry in fs::read_dir(&self.config.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let meta = entry.path().join("session.json");
            let Ok(data) = fs::read(&meta) else { continue };
            let Ok(session) = serde_json::from_slice::<StagingSession>(&data) else {
                continue;
            };
            if now - session.created_at > max_age_seconds {
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "expired staging sessions cleaned up");
        }
        Ok(removed)
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }
}
