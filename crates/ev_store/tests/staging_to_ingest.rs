//! Chunked upload staging → evidence store ingest handoff.

use std::fs::File;
use std::sync::Arc;

use ev_store::staging::{ChunkedUploadStaging, StagingConfig};
use ev_store::{EvidenceStore, LocalFsStore};

#[test]
fn staged_upload_lands_in_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let staging =
        ChunkedUploadStaging::open(StagingConfig::new(dir.path().join("staging"))).unwrap();
    let store =
        EvidenceStore::new(Arc::new(LocalFsStore::open(dir.path().join("store")).unwrap()));

    // Three chunks of a body-worn-camera clip, sent out of order.
    let chunks: [&[u8]; 3] = [b"first-part|", b"second-part|", b"third-part"];
    let full: Vec<u8> = chunks.concat();
    let expected = ev_io::hasher::sha256_hex(&full);

    let session = staging
        .init("bwc_clip.mp4", 3, full.len() as u64, Some(&expected), Some("uploader"), None)
        .unwrap();
    staging.receive_chunk(&session.staging_id, 2, chunks[2]).unwrap();
    staging.receive_chunk(&session.staging_id, 0, chunks[0]).unwrap();
    staging.receive_chunk(&session.staging_id, 1, chunks[1]).unwrap();

    let finalized = staging.finalize(&session.staging_id).unwrap();
    assert_eq!(finalized.sha256, expected);

    // Hand the assembled artifact to the store; staging itself never
    // touches evidence keys.
    let mut reader = File::open(&finalized.assembled_path).unwrap();
    let outcome = store
        .ingest(
            &mut reader,
            "bwc_clip.mp4",
            "video/mp4",
            "uploader",
            Some("bwc_unit_4"),
            Some(&finalized.sha256),
        )
        .unwrap();
    assert!(outcome.is_new);
    assert_eq!(outcome.sha256.as_str(), expected);
    assert_eq!(outcome.size_bytes, full.len() as u64);

    let manifest = store.load_manifest(&outcome.evidence_id).unwrap().unwrap();
    assert_eq!(manifest.ingest.device_label.as_deref(), Some("bwc_unit_4"));
    assert_eq!(manifest.audit[0].action, "ingested");

    // Cleanup removes the whole staging session.
    assert!(staging.cleanup(&session.staging_id).unwrap());
    assert!(staging.load_session(&session.staging_id).unwrap().is_none());

    // The stored original is intact and immutable.
    let read_back = store.read_original(&outcome.sha256).unwrap().unwrap();
    assert_eq!(read_back.data, full);
}
