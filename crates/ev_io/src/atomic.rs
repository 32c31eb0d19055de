//! Atomic file writes: temp file in same dir + fsync(temp) + rename;
//! fsync(dir) on Unix. Fallback: if rename fails (e.g. cross-device), write
//! directly to target, fsync(target), then remove temp.
//!
//! Readers therefore never observe a partial file. The worst-case crash
//! orphan is a `.tmp` sibling, which `sweep_orphan_tmp` collects on
//! recovery.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::IoResult;

/// Write `bytes` to `path` atomically, creating parent directories.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> IoResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| crate::IoError::Path("path has no parent".into()))?;
    fs::create_dir_all(parent)?;

    let tmp = make_unique_tmp_path(path);
    let mut tf = OpenOptions::new()
        .write(true)
        .create_new(true) // avoid clobbering another writer's temp
        .open(&tmp)?;
    tf.write_all(bytes)?;
    tf.sync_all()?;
    drop(tf);

    match fs::rename(&tmp, path) {
        Ok(()) => {
            let _ = fsync_dir(parent);
            Ok(())
        }
        Err(_) => {
            // Cross-device fallback: direct write, then best-effort cleanup.
            let res: std::io::Result<()> = (|| {
                let mut f = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                f.write_all(bytes)?;
                f.sync_all()?;
                Ok(())
            })();
            if let Err(err) = res {
                let _ = fs::remove_file(&tmp);
                return Err(err.into());
            }
            let _ = fs::remove_file(&tmp);
            let _ = fsync_dir(parent);
            Ok(())
        }
    }
}

/// Remove orphaned `*.tmp` files under `dir` (recursive). Returns the count
/// removed. Invoked on crash recovery; in-flight writers are protected by
/// unique temp names.
pub fn sweep_orphan_tmp(dir: &Path) -> IoResult<usize> {
    let mut removed = 0;
    if !dir.exists() {
        return Ok(0);
    }
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in fs::read_dir(&d)? {
            let entry = entry?;
            let p = entry.path();
            if p.is_dir() {
                stack.push(p);
            } else if p.extension().is_some_and(|e| e == "tmp") {
                fs::remove_file(&p)?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Create a unique temp path next to `target`: "<filename>.<pid>.<counter>.tmp"
fn make_unique_tmp_path(target: &Path) -> PathBuf {
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);

    let fname = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let tmp_name = OsString::from(format!("{fname}.{pid}.{n}.tmp"));

    match target.parent() {
        Some(dir) => dir.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    let df = OpenOptions::new().read(true).open(dir)?;
    df.sync_all()
}

#[cfg(not(unix))]
#[inline]
fn fsync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
