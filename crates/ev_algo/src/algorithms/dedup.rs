//! Bulk dedup & near-dedup.
//!
//! Two modes:
//! 1. Exact dedup — content-hash (SHA-256) equality.
//! 2. Near-dedup — deterministic average-hash fingerprints for image-typed
//!    items: grayscale, Lanczos resize to an N×N grid, threshold each pixel
//!    against the block mean, pack bits to hex. Same pixel grid ⇒ same hash.
//!
//! Never deletes originals; only flags relationships. Perceptual matches are
//! labeled `assistive` with the Hamming distance and similarity score —
//! they are never presented as exact identity.

use std::collections::BTreeMap;

use image::imageops::FilterType;
use serde::Serialize;
use tracing::debug;

use ev_core::envelope::AlgorithmParams;
use ev_core::ids::CaseId;

use crate::casework::{linked_items, require_case};
use crate::{AlgoContext, AlgoError, Algorithm, AlgorithmOutput};

const IMAGE_TYPES: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp", "gif"];

#[derive(Debug, Clone, Serialize)]
struct ItemBrief {
    evidence_id: u64,
    original_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_type: Option<String>,
    hash_sha256: String,
}

#[derive(Debug, Serialize)]
struct DuplicateGroup {
    hash: String,
    count: u64,
    items: Vec<ItemBrief>,
}

#[derive(Debug, Serialize)]
struct NearDuplicatePair {
    item_a: ItemBrief,
    item_b: ItemBrief,
    hamming_distance: u32,
    similarity_score: f64,
    method: &'static str,
    method_label: &'static str,
    hash_size_bits: u32,
    perceptual_hash_a: String,
    perceptual_hash_b: String,
}

#[derive(Debug, Serialize)]
struct DedupParameters {
    near_dedup_enabled: bool,
    similarity_threshold: f64,
    hash_size: u32,
}

#[derive(Debug, Serialize)]
struct DedupReport {
    case_id: CaseId,
    total_items: u64,
    unique_hashes: u64,
    exact_duplicate_groups: u64,
    near_duplicate_pairs: u64,
    exact_duplicates: Vec<DuplicateGroup>,
    near_duplicates: Vec<NearDuplicatePair>,
    parameters: DedupParameters,
}

/// Compute a deterministic average hash (aHash) for an image.
///
/// Returns None if the bytes cannot be decoded as an image.
pub fn average_hash(image_bytes: &[u8], hash_size: u32) -> Option<String> {
    let img = image::load_from_memory(image_bytes).ok()?;
    let gray = image::imageops::resize(
        &img.to_luma8(),
        hash_size,
        hash_size,
        FilterType::Lanczos3,
    );
    let pixels: Vec<u8> = gray.into_raw();
    if pixels.is_empty() {
        return None;
    }
    let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;

    // Pack bits MSB-first, 4 bits per hex digit.
    let mut hex = String::with_capacity(pixels.len() / 4);
    let mut nibble = 0u8;
    for (i, &p) in pixels.iter().enumerate() {
        nibble <<= 1;
        if p as f64 > mean {
            nibble |= 1;
        }
        if i % 4 == 3 {
            hex.push(char::from_digit(nibble as u32, 16).expect("nibble < 16"));
            nibble = 0;
        }
    }
    Some(hex)
}

/// Hamming distance between two equal-length hex fingerprints.
/// Returns None on length mismatch or non-hex input.
pub fn hamming_distance(hash_a: &str, hash_b: &str) -> Option<u32> {
    if hash_a.len() != hash_b.len() {
        return None;
    }
    let mut distance = 0u32;
    for (a, b) in hash_a.chars().zip(hash_b.chars()) {
        let a = a.to_digit(16)?;
        let b = b.to_digit(16)?;
        distance += (a ^ b).count_ones();
    }
    Some(distance)
}

fn similarity_score(hamming: u32, total_bits: u32) -> f64 {
    if total_bits == 0 {
        return 0.0;
    }
    let score = 1.0 - (hamming as f64 / total_bits as f64);
    (score * 10_000.0).round() / 10_000.0
}

fn is_image_type(file_type: Option<&str>) -> bool {
    file_type
        .map(|t| IMAGE_TYPES.contains(&t.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct BulkDedup;

impl Algorithm for BulkDedup {
    fn id(&self) -> &'static str {
        "bulk_dedup"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn description(&self) -> &'static str {
        "Identify exact and near-duplicate evidence within a case."
    }

    fn execute(
        &self,
        params: &AlgorithmParams,
        ctx: &AlgoContext<'_>,
    ) -> Result<AlgorithmOutput, AlgoError> {
        require_case(params, ctx)?;
        let items = linked_items(params, ctx)?;

        let near_dedup = params.extra_bool("near_dedup", true);
        let similarity_threshold = params.extra_f64("similarity_threshold", 0.85);
        let hash_size = params.extra_u64("hash_size", 8) as u32;

        // --- Exact dedup ---
        let mut hash_groups: BTreeMap<String, Vec<ItemBrief>> = BTreeMap::new();
        let mut input_hashes = Vec::new();
        for item in &items {
            let Some(h) = &item.sha256 else { continue };
            input_hashes.push(h.as_str().to_string());
            hash_groups.entry(h.as_str().to_string()).or_default().push(ItemBrief {
                evidence_id: item.db_id,
                original_filename: item.original_filename.clone(),
                file_type: item.file_type.clone(),
                hash_sha256: h.as_str().to_string(),
            });
        }

        let exact_duplicates: Vec<DuplicateGroup> = hash_groups
            .iter()
            .filter(|(_, group)| group.len() > 1)
            .map(|(hash, group)| DuplicateGroup {
                hash: hash.clone(),
                count: group.len() as u64,
                items: group.clone(),
            })
            .collect();

        // --- Near-dedup (perceptual, images only) ---
        let mut near_duplicates = Vec::new();
        let mut warnings = Vec::new();
        if near_dedup {
            let mut fingerprints: Vec<(ItemBrief, String)> = Vec::new();
            for item in &items {
                if !is_image_type(item.file_type.as_deref()) {
                    continue;
                }
                let Some(h) = &item.sha256 else { continue };
                let bytes = match ctx.store.read_original(h) {
                    Ok(Some(found)) => found.data,
                    Ok(None) => continue,
                    Err(e) => {
                        warnings.push(format!(
                            "perceptual hash skipped for item {}: {e}",
                            item.db_id
                        ));
                        continue;
                    }
                };
                match average_hash(&bytes, hash_size) {
                    Some(fingerprint) => fingerprints.push((
                        ItemBrief {
                            evidence_id: item.db_id,
                            original_filename: item.original_filename.clone(),
                            file_type: item.file_type.clone(),
                            hash_sha256: h.as_str().to_string(),
                        },
                        fingerprint,
                    )),
                    None => {
                        debug!(item = item.db_id, "image decode failed; skipping perceptual hash");
                    }
                }
            }

            let total_bits = hash_size * hash_size;
            for i in 0..fingerprints.len() {
                for j in (i + 1)..fingerprints.len() {
                    let Some(dist) = hamming_distance(&fingerprints[i].1, &fingerprints[j].1)
                    else {
                        continue;
                    };
                    let score = similarity_score(dist, total_bits);
                    if score >= similarity_threshold {
                        near_duplicates.push(NearDuplicatePair {
                            item_a: fingerprints[i].0.clone(),
                            item_b: fingerprints[j].0.clone(),
                            hamming_distance: dist,
                            similarity_score: score,
                            method: "average_hash",
                            method_label: "assistive",
                            hash_size_bits: total_bits,
                            perceptual_hash_a: fingerprints[i].1.clone(),
                            perceptual_hash_b: fingerprints[j].1.clone(),
                        });
                    }
                }
            }
        }

        let report = DedupReport {
            case_id: params.case_id,
            total_items: items.len() as u64,
            unique_hashes: hash_groups.len() as u64,
            exact_duplicate_groups: exact_duplicates.len() as u64,
            near_duplicate_pairs: near_duplicates.len() as u64,
            exact_duplicates,
            near_duplicates,
            parameters: DedupParameters {
                near_dedup_enabled: near_dedup,
                similarity_threshold,
                hash_size,
            },
        };

        super::report_output(&report, "dedup_report_hash", input_hashes, Vec::new(), warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_counts_bits() {
        assert_eq!(hamming_distance("00", "00"), Some(0));
        assert_eq!(hamming_distance("0f", "00"), Some(4));
        assert_eq!(hamming_distance("ff", "00"), Some(8));
        assert_eq!(hamming_distance("f", "ff"), None);
        assert_eq!(hamming_distance("zz", "zz"), None);
    }

    #[test]
    fn similarity_rounds_to_four_places() {
        assert!((similarity_score(3, 64) - 0.9531).abs() < 1e-9);
        assert!((similarity_score(0, 64) - 1.0).abs() < 1e-9);
        assert_eq!(similarity_score(5, 0), 0.0);
    }

    #[test]
    fn average_hash_is_deterministic_and_length_stable() {
        // 16×16 gradient PNG produced in-memory.
        let mut img = image::GrayImage::new(16, 16);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = image::Luma([(x * 16 + y) as u8]);
        }
        let mut png = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let a = average_hash(&png, 8).unwrap();
        let b = average_hash(&png, 8).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16); // 64 bits → 16 hex chars

        assert!(average_hash(b"not an image", 8).is_none());
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let mut img = image::GrayImage::new(32, 32);
        for (x, _y, p) in img.enumerate_pixels_mut() {
            *p = image::Luma([if x < 16 { 0 } else { 255 }]);
        }
        let mut png = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let h1 = average_hash(&png, 8).unwrap();
        let h2 = average_hash(&png, 8).unwrap();
        assert_eq!(hamming_distance(&h1, &h2), Some(0));
    }

    #[test]
    fn image_type_detection_is_case_insensitive() {
        assert!(is_image_type(Some("JPG")));
        assert!(is_image_type(Some("png")));
        assert!(!is_image_type(Some("pdf")));
        assert!(!is_image_type(None));
    }
}
