//! Newtypes and parsers for content addresses and scoping identifiers.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_lower_hex_len(s: &str, n: usize) -> bool {
    s.len() == n && is_lower_hex(s)
}

/// SHA-256 content address: 64-hex lowercase over the original bytes.
///
/// Two ingests of identical bytes yield the same `Sha256Hex`; identity is
/// immutable for the lifetime of the system.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Sha256Hex(String);

impl Sha256Hex {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First four hex characters — the fan-out prefix used in store keys.
    pub fn prefix4(&self) -> &str {
        &self.0[..4]
    }

    /// Wrap a digest already known to be lowercase 64-hex (e.g. straight
    /// out of the hasher). Panics in debug builds on malformed input.
    pub fn from_hasher(hex: String) -> Self {
        debug_assert!(is_lower_hex_len(&hex, 64), "hasher must emit lowercase 64-hex");
        Self(hex)
    }
}

impl fmt::Display for Sha256Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sha256Hex {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_lower_hex_len(s, 64) {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidHex(s.to_string()))
        }
    }
}

/// Opaque evidence-store identifier, distinct from the content address.
///
/// Minted at first ingest; keys the manifest object. Charset is restricted
/// so the id can appear verbatim in store keys.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EvidenceId(String);

impl EvidenceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mint a fresh opaque identifier (UUIDv4, hyphen-free hex).
    pub fn mint() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EvidenceId {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ok = (1..=64).contains(&s.len())
            && s.bytes()
                .all(|b| matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-'));
        if ok {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidId(s.to_string()))
        }
    }
}

/// Case scope. Opaque to the core; owned by the relational service.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant scope (organization). Every relational query is scoped by it.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_rejects_uppercase_and_short() {
        assert!("9834876dcfb05cb167a5c24953eba58c4ac89b1adf57f28f2f9d09af107ee8f0"
            .parse::<Sha256Hex>()
            .is_ok());
        assert!("ABCD".parse::<Sha256Hex>().is_err());
        assert!("9834876DCFB05CB167A5C24953EBA58C4AC89B1ADF57F28F2F9D09AF107EE8F0"
            .parse::<Sha256Hex>()
            .is_err());
    }

    #[test]
    fn prefix4_is_first_four_chars() {
        let h: Sha256Hex = "9834876dcfb05cb167a5c24953eba58c4ac89b1adf57f28f2f9d09af107ee8f0"
            .parse()
            .unwrap();
        assert_eq!(h.prefix4(), "9834");
    }

    #[test]
    fn evidence_id_charset() {
        assert!("a1b2c3".parse::<EvidenceId>().is_ok());
        assert!("has/slash".parse::<EvidenceId>().is_err());
        assert!("".parse::<EvidenceId>().is_err());
    }

    #[test]
    fn minted_ids_are_valid_and_distinct() {
        let a = EvidenceId::mint();
        let b = EvidenceId::mint();
        assert_ne!(a, b);
        assert!(a.as_str().parse::<EvidenceId>().is_ok());
    }
}
