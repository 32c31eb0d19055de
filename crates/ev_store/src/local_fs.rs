//! Filesystem-backed storage.
//!
//! Root directory is created on init; all keys resolve relative to it.
//! Writes hash while spooling to a unique temp sibling, verify, then rename
//! — concurrent readers never observe a partial object, and a failed
//! verification leaves nothing behind.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use digest::Digest;
use sha2::Sha256;
use tracing::info;

use crate::backend::{validate_key, validate_prefix, GetOutcome, PutOutcome, StorageBackend};
use crate::StoreError;

pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root)?;
        let root = root.canonicalize()?;
        // Crash recovery: interrupted writes leave only temp siblings.
        let orphans = ev_io::atomic::sweep_orphan_tmp(&root)?;
        if orphans > 0 {
            info!(orphans, "removed orphaned temp files from interrupted writes");
        }
        info!(root = %root.display(), "local evidence store opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn unique_tmp(&self, target: &Path) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let fname = target
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("object");
        target.with_file_name(format!("{fname}.{}.{n}.tmp", std::process::id()))
    }
}

impl StorageBackend for LocalFsStore {
    fn put_stream(
        &self,
        key: &str,
        reader: &mut dyn Read,
        expected_sha256: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        let path = self.resolve(key)?;
        if path.exists() {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.unique_tmp(&path);
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let write_result: Result<(), StoreError> = (|| {
            let mut f = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
            let mut buf = [0u8; ev_io::hasher::HASH_BLOCK_SIZE];
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                f.write_all(&buf[..n])?;
                size += n as u64;
            }
            f.sync_all()?;
            Ok(())
        })();
        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        let computed = hex::encode(hasher.finalize());
        if let Some(expected) = expected_sha256 {
            if computed != expected {
                let _ = fs::remove_file(&tmp);
                return Err(StoreError::IntegrityMismatch {
                    expected: expected.to_string(),
                    computed,
                });
            }
        }
        // Re-check under the rename: a concurrent writer may have won.
        if path.exists() {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::KeyExists(key.to_string()));
        }
        fs::rename(&tmp, &path)?;

        Ok(PutOutcome {
            key: key.to_string(),
            sha256: computed,
            size_bytes: size,
        })
    }

    fn put_mutable(&self, key: &str, data: &[u8]) -> Result<PutOutcome, StoreError> {
        let path = self.resolve(key)?;
        ev_io::atomic::write_bytes_atomic(&path, data)?;
        Ok(PutOutcome {
            key: key.to_string(),
            sha256: ev_io::hasher::sha256_hex(data),
            size_bytes: data.len() as u64,
        })
    }

    fn get(&self, key: &str) -> Result<GetOutcome, StoreError> {
        let path = self.resolve(key)?;
        if !path.exists() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let data = fs::read(&path)?;
        let sha256 = ev_io::hasher::sha256_hex(&data);
        let size_bytes = data.len() as u64;
        Ok(GetOutcome {
            data,
            sha256,
            size_bytes,
        })
    }

    fn get_stream(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let path = self.resolve(key)?;
        if !path.exists() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(Box::new(File::open(path)?))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.resolve(key)?.exists())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(key)?;
        if path.exists() {
            fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        validate_prefix(prefix)?;
        let base = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.root.join(prefix.trim_end_matches('/'))
        };
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir)? {
                let p = entry?.path();
                if p.is_dir() {
                    stack.push(p);
                } else if let Ok(rel) = p.strip_prefix(&self.root) {
                    results.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        results.sort();
        Ok(results)
    }

    fn size(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let path = self.resolve(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        let path = self.resolve(key).ok()?;
        path.exists().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalFsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::open(dir.path().join("store")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_roundtrip_returns_hash() {
        let (_d, s) = store();
        let put = s.put("originals/ab/abcd/f.bin", b"AAA", None).unwrap();
        assert_eq!(
            put.sha256,
            "cb1ad2119d8fafb69566510ee712661f9f14b83385006ef92aec47f523a38358"
        );
        let got = s.get("originals/ab/abcd/f.bin").unwrap();
        assert_eq!(got.data, b"AAA");
        assert_eq!(got.sha256, put.sha256);
    }

    #[test]
    fn second_put_fails_and_preserves_first() {
        let (_d, s) = store();
        s.put("k/a", b"one", None).unwrap();
        let err = s.put("k/a", b"two", None).unwrap_err();
        assert!(matches!(err, StoreError::KeyExists(_)));
        assert_eq!(s.get("k/a").unwrap().data, b"one");
    }

    #[test]
    fn integrity_mismatch_persists_nothing() {
        let (_d, s) = store();
        let err = s.put("k/b", b"AAA", Some("00".repeat(32).as_str())).unwrap_err();
        assert!(matches!(err, StoreError::IntegrityMismatch { .. }));
        assert!(!s.exists("k/b").unwrap());
        // No temp orphans either.
        assert!(s.list_keys("").unwrap().is_empty());
    }

    #[test]
    fn list_keys_sorted_under_prefix() {
        let (_d, s) = store();
        s.put("p/b", b"1", None).unwrap();
        s.put("p/a", b"2", None).unwrap();
        s.put("q/c", b"3", None).unwrap();
        assert_eq!(s.list_keys("p").unwrap(), vec!["p/a".to_string(), "p/b".into()]);
        assert_eq!(s.list_keys("").unwrap().len(), 3);
    }

    #[test]
    fn traversal_key_rejected() {
        let (_d, s) = store();
        assert!(matches!(
            s.put("../escape", b"x", None).unwrap_err(),
            StoreError::InvalidKey(_)
        ));
    }

    #[test]
    fn size_and_delete() {
        let (_d, s) = store();
        s.put("k/c", b"1234", None).unwrap();
        assert_eq!(s.size("k/c").unwrap(), Some(4));
        assert_eq!(s.size("k/missing").unwrap(), None);
        assert!(s.delete("k/c").unwrap());
        assert!(!s.delete("k/c").unwrap());
    }

    #[test]
    fn put_mutable_allows_replacement() {
        let (_d, s) = store();
        s.put_mutable("manifests/m1.json", b"{\"v\":1}").unwrap();
        s.put_mutable("manifests/m1.json", b"{\"v\":2}").unwrap();
        assert_eq!(s.get("manifests/m1.json").unwrap().data, b"{\"v\":2}");
    }
}
