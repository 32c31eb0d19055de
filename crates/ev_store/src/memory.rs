//! In-process storage backend.
//!
//! Same contract as `LocalFsStore`, no filesystem. Used by unit and
//! integration tests and by embedders that stage evidence transiently.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::backend::{validate_key, validate_prefix, GetOutcome, PutOutcome, StorageBackend};
use crate::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStore {
    fn put_stream(
        &self,
        key: &str,
        reader: &mut dyn Read,
        expected_sha256: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        validate_key(key)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let computed = ev_io::hasher::sha256_hex(&data);
        if let Some(expected) = expected_sha256 {
            if computed != expected {
                return Err(StoreError::IntegrityMismatch {
                    expected: expected.to_string(),
                    computed,
                });
            }
        }
        let mut objects = self.objects.write();
        if objects.contains_key(key) {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        let size_bytes = data.len() as u64;
        objects.insert(key.to_string(), data);
        Ok(PutOutcome {
            key: key.to_string(),
            sha256: computed,
            size_bytes,
        })
    }

    fn put_mutable(&self, key: &str, data: &[u8]) -> Result<PutOutcome, StoreError> {
        validate_key(key)?;
        let sha256 = ev_io::hasher::sha256_hex(data);
        self.objects.write().insert(key.to_string(), data.to_vec());
        Ok(PutOutcome {
            key: key.to_string(),
            sha256,
            size_bytes: data.len() as u64,
        })
    }

    fn get(&self, key: &str) -> Result<GetOutcome, StoreError> {
        validate_key(key)?;
        let objects = self.objects.read();
        let data = objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let sha256 = ev_io::hasher::sha256_hex(&data);
        let size_bytes = data.len() as u64;
        Ok(GetOutcome {
            data,
            sha256,
            size_bytes,
        })
    }

    fn get_stream(&self, key: &str) -> Result<Box<dyn Read + Send>, StoreError> {
        let got = self.get(key)?;
        Ok(Box::new(std::io::Cursor::new(got.data)))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.objects.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.objects.write().remove(key).is_some())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        validate_prefix(prefix)?;
        let objects = self.objects.read();
        let keys = objects
            .keys()
            .filter(|k| {
                prefix.is_empty()
                    || k.starts_with(&format!("{}/", prefix.trim_end_matches('/')))
                    || k.as_str() == prefix
            })
            .cloned()
            .collect();
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<Option<u64>, StoreError> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).map(|d| d.len() as u64))
    }

    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immutability_matches_fs_contract() {
        let s = MemoryStore::new();
        s.put("k/a", b"one", None).unwrap();
        assert!(matches!(
            s.put("k/a", b"two", None).unwrap_err(),
            StoreError::KeyExists(_)
        ));
        assert_eq!(s.get("k/a").unwrap().data, b"one");
    }

    #[test]
    fn mismatch_persists_nothing() {
        let s = MemoryStore::new();
        let bad = "0".repeat(64);
        assert!(s.put("k/b", b"AAA", Some(&bad)).is_err());
        assert!(!s.exists("k/b").unwrap());
    }

    #[test]
    fn prefix_listing_is_segment_aware() {
        let s = MemoryStore::new();
        s.put("p/a", b"1", None).unwrap();
        s.put("pp/b", b"2", None).unwrap();
        assert_eq!(s.list_keys("p").unwrap(), vec!["p/a".to_string()]);
    }
}
