// keyring/fingerprint.rs - Key Fingerprints and Key IDs

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a fingerprint in bytes (40 hex digits)
pub const FINGERPRINT_LENGTH: usize = 20;

/// Length of a key id in bytes (16 hex digits)
pub const KEY_ID_LENGTH: usize = 8;

/// A unique fingerprint derived from public key material and creation time
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; FINGERPRINT_LENGTH]);

impl Fingerprint {
    /// Compute the fingerprint of a public key created at `created`
    pub fn compute(public_key: &[u8], created: i64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"domainkey-v1");
        hasher.update(public_key);
        hasher.update(created.to_be_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; FINGERPRINT_LENGTH];
        bytes.copy_from_slice(&digest[..FINGERPRINT_LENGTH]);
        Self(bytes)
    }

    /// Parse a 40 digit hex fingerprint (optional `0x`, any case)
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = normalize_hex(text)?;
        if digits.len() != FINGERPRINT_LENGTH * 2 {
            return None;
        }
        let decoded = hex::decode(&digits).ok()?;
        let mut bytes = [0u8; FINGERPRINT_LENGTH];
        bytes.copy_from_slice(&decoded);
        Some(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LENGTH] {
        &self.0
    }

    /// The key id is the low 8 bytes of the fingerprint
    pub fn key_id(&self) -> KeyId {
        let mut bytes = [0u8; KEY_ID_LENGTH];
        bytes.copy_from_slice(&self.0[FINGERPRINT_LENGTH - KEY_ID_LENGTH..]);
        KeyId(bytes)
    }

    /// Upper-case hex form
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.key_id())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Long (64-bit) key id
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId([u8; KEY_ID_LENGTH]);

impl KeyId {
    /// Parse a 16 digit key id, or reduce a 40 digit fingerprint to its key id
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = normalize_hex(text)?;
        match digits.len() {
            16 => {
                let decoded = hex::decode(&digits).ok()?;
                let mut bytes = [0u8; KEY_ID_LENGTH];
                bytes.copy_from_slice(&decoded);
                Some(Self(bytes))
            }
            40 => Fingerprint::from_hex(&digits).map(|fp| fp.key_id()),
            _ => None,
        }
    }

    /// Upper-case hex form
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Strip an optional `0x` prefix and upper-case; `None` if not hex
pub fn normalize_hex(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(digits.to_ascii_uppercase())
}

/// Compare two key identifiers the way signer ids are compared.
///
/// Identical ids match; otherwise a short id (8 or 16 digits) matches a longer
/// id or fingerprint that ends with it.
pub fn key_ids_match(a: &str, b: &str) -> bool {
    let a = a.trim().trim_start_matches("0x").trim_start_matches("0X");
    let b = b.trim().trim_start_matches("0x").trim_start_matches("0X");
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a.eq_ignore_ascii_case(b) {
        return true;
    }

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.len() < 8 {
        return false;
    }
    long.to_ascii_uppercase()
        .ends_with(&short.to_ascii_uppercase())
}
