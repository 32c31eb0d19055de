//! Codec-runner seam for PDF manipulation.
//!
//! The core invokes PDF stamping and inspection through this documented
//! interface; the concrete library choice belongs to the embedder. When no
//! codec is supplied (or a codec declines an input), algorithms fall back
//! to their documented byte-level behavior and record the limitation in
//! the report.

use serde::{Deserialize, Serialize};

/// Where the Bates stamp lands on each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StampPosition {
    BottomRight,
    BottomLeft,
}

impl StampPosition {
    pub fn parse(s: &str) -> Self {
        match s {
            "bottom_left" => StampPosition::BottomLeft,
            _ => StampPosition::BottomRight,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StampPosition::BottomRight => "bottom_right",
            StampPosition::BottomLeft => "bottom_left",
        }
    }
}

/// Result of a text-layer extraction over a (redacted) PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfTextCheck {
    pub has_text_layer: bool,
    pub extracted_length: u64,
    /// First 200 characters of extracted text, if any.
    pub sample: String,
}

/// Result of a redaction-annotation inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfAnnotationCheck {
    pub total_annotations: u32,
    /// `/Redact` annotations present but not applied are removable.
    pub redaction_annotations: u32,
}

/// External PDF codec runner. Every method returns `None` when the input
/// is not a PDF the codec can process — callers treat that as
/// "check unavailable", not as a failure.
pub trait PdfCodec: Send + Sync {
    /// Burn `text` onto each page at `position`. Deterministic: same input
    /// bytes + text ⇒ same output bytes.
    fn stamp_pages(&self, pdf: &[u8], text: &str, position: StampPosition) -> Option<Vec<u8>>;

    fn extract_text(&self, pdf: &[u8]) -> Option<PdfTextCheck>;

    fn inspect_annotations(&self, pdf: &[u8]) -> Option<PdfAnnotationCheck>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_position_parse_defaults_bottom_right() {
        assert_eq!(StampPosition::parse("bottom_left"), StampPosition::BottomLeft);
        assert_eq!(StampPosition::parse("anything"), StampPosition::BottomRight);
        assert_eq!(StampPosition::BottomRight.as_str(), "bottom_right");
    }
}
