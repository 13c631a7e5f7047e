// keyring/engine.rs - Key Engine Contract

//! The contract between the trust core and the cryptographic engine.
//!
//! [`KeySource`] is the read side the catalog and the trust evaluator need.
//! [`KeyEngine`] adds the operations exposed to the host (encryption,
//! decryption, key edits, generation, import/export, preferences).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{KeyRecord, Validity};

/// Errors reported by a key engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Key store inconsistent: {0}")]
    Inconsistent(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No key matches '{0}'")]
    KeyNotFound(String),

    #[error("'{0}' matches more than one key")]
    AmbiguousKey(String),

    #[error("No secret key for {0}")]
    NoSecretKey(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Unusable key: {0}")]
    UnusableKey(String),

    #[error("Bad passphrase")]
    BadPassphrase,

    #[error("Operation cancelled")]
    Canceled,

    #[error("Pinentry failure: {0}")]
    Pinentry(String),

    #[error("Agent failure: {0}")]
    Agent(String),

    #[error("Bad data: {0}")]
    BadData(String),

    #[error("The selected UID has already been signed with this key.")]
    AlreadySigned,

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl EngineError {
    /// Stable numeric code carried into host error records
    pub fn code(&self) -> u32 {
        match self {
            EngineError::Unavailable(_) => 1,
            EngineError::Inconsistent(_) => 63,
            EngineError::Storage(_) => 32,
            EngineError::Serialization(_) => 89,
            EngineError::KeyNotFound(_) => 27,
            EngineError::AmbiguousKey(_) => 107,
            EngineError::NoSecretKey(_) => 17,
            EngineError::InvalidRecipient(_) => 53,
            EngineError::UnusableKey(_) => 125,
            EngineError::BadPassphrase => 11,
            EngineError::Canceled => 99,
            EngineError::Pinentry(_) => 85,
            EngineError::Agent(_) => 120,
            EngineError::BadData(_) => 58,
            EngineError::AlreadySigned => 70,
            EngineError::InvalidValue(_) => 55,
            EngineError::UnsupportedAlgorithm(_) => 84,
        }
    }

    /// Whether the failure came from passphrase entry rather than the data
    pub fn is_passphrase_failure(&self) -> bool {
        matches!(
            self,
            EngineError::BadPassphrase
                | EngineError::Canceled
                | EngineError::Pinentry(_)
                | EngineError::Agent(_)
        )
    }
}

/// What a key listing should include
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListMode {
    /// Attach per-user-ID signature lists
    pub include_signatures: bool,

    /// Check signatures and compute validity
    pub validate: bool,
}

impl ListMode {
    /// Signatures included and validated; the trust core always asks for this
    pub const VALIDATED_SIGNATURES: ListMode = ListMode {
        include_signatures: true,
        validate: true,
    };
}

/// Result of a key listing
#[derive(Clone, Debug, Default)]
pub struct KeyListing {
    pub keys: Vec<KeyRecord>,

    /// The engine stopped early because of an internal limit
    pub truncated: bool,
}

/// Read access to the key store
pub trait KeySource {
    /// List keys matching `pattern` (empty pattern lists everything)
    fn list_keys(
        &self,
        pattern: &str,
        secret_only: bool,
        mode: ListMode,
    ) -> Result<KeyListing, EngineError>;

    /// Fetch exactly one key by key id or fingerprint.
    ///
    /// Returns `Ok(None)` when nothing matches.
    fn get_key(&self, id: &str, secret_only: bool) -> Result<Option<KeyRecord>, EngineError>;
}

impl<T: KeySource + ?Sized> KeySource for &T {
    fn list_keys(
        &self,
        pattern: &str,
        secret_only: bool,
        mode: ListMode,
    ) -> Result<KeyListing, EngineError> {
        (**self).list_keys(pattern, secret_only, mode)
    }

    fn get_key(&self, id: &str, secret_only: bool) -> Result<Option<KeyRecord>, EngineError> {
        (**self).get_key(id, secret_only)
    }
}

/// Trust signature level for `sign_uid`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustSigLevel {
    Marginal,
    Full,
}

impl TrustSigLevel {
    /// Map the host's numeric trust level (1 = marginal, 2 = full)
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(TrustSigLevel::Marginal),
            2 => Some(TrustSigLevel::Full),
            _ => None,
        }
    }

    /// Trust amount stored with the certification
    pub fn amount(&self) -> u8 {
        match self {
            TrustSigLevel::Marginal => 60,
            TrustSigLevel::Full => 120,
        }
    }
}

/// A key edit. Indices travel with the operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditOp {
    /// Certify a user-ID with the configured default key
    SignUid {
        uid_index: usize,
        local: bool,
        trust: Option<TrustSigLevel>,
    },
    Enable,
    Disable,
    DeleteSignature {
        uid_index: usize,
        sig_index: usize,
    },
    SetOwnerTrust(Validity),
    RevokeUid {
        uid_index: usize,
    },
    RevokeSignature {
        uid_index: usize,
        sig_index: usize,
    },
    RevokeKey,
}

impl EditOp {
    pub fn name(&self) -> &'static str {
        match self {
            EditOp::SignUid { .. } => "sign",
            EditOp::Enable => "enable",
            EditOp::Disable => "disable",
            EditOp::DeleteSignature { .. } => "delsig",
            EditOp::SetOwnerTrust(_) => "trust",
            EditOp::RevokeUid { .. } => "revuid",
            EditOp::RevokeSignature { .. } => "revsig",
            EditOp::RevokeKey => "revkey",
        }
    }
}

/// Parameters for key pair generation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyGenParams {
    pub key_type: String,
    pub key_length: String,
    pub subkey_type: String,
    pub subkey_length: String,
    pub name_real: String,
    pub name_comment: String,
    pub name_email: String,
    /// `0` or empty for no expiry, `YYYY-MM-DD`, or `<n>[d|w|m|y]`
    pub expire_date: String,
    pub passphrase: String,
}

/// Progress report emitted while generating a key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyGenProgress {
    /// Stage name (`primegen`, `need_entropy`, ...)
    pub what: String,
    /// Opaque progress character
    pub tag: char,
    pub current: u32,
    pub total: u32,
}

/// Per-key import status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatus {
    pub fingerprint: String,
    pub result: String,
    pub new_key: bool,
    pub new_uid: bool,
    pub new_sig: bool,
    pub new_subkey: bool,
    pub new_secret: bool,
}

/// Summary of an import operation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub considered: u32,
    pub no_user_id: u32,
    pub imported: u32,
    pub unchanged: u32,
    pub new_user_ids: u32,
    pub new_sub_keys: u32,
    pub new_signatures: u32,
    pub new_revocations: u32,
    pub secret_read: u32,
    pub secret_imported: u32,
    pub secret_unchanged: u32,
    pub not_imported: u32,
    pub imports: Vec<ImportStatus>,
}

/// Status of a message signature found while decrypting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyStatus {
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "BAD_SIG")]
    BadSig,
    #[serde(rename = "NO_PUBKEY")]
    NoPubkey,
    #[serde(rename = "NO_SIGNATURE")]
    NoSignature,
    #[serde(rename = "GOOD_EXPSIG")]
    GoodExpiredSig,
    #[serde(rename = "GOOD_EXPKEY")]
    GoodExpiredKey,
    #[serde(rename = "INVALID")]
    Invalid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureVerification {
    pub fingerprint: String,
    pub timestamp: i64,
    pub expiration: i64,
    pub validity: Validity,
    pub status: VerifyStatus,
}

/// Plaintext and signature checks from a decrypt-and-verify
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptOutput {
    pub plaintext: Vec<u8>,
    pub signatures: Vec<SignatureVerification>,
}

/// Static facts about an engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub version: String,
    pub protocol: super::model::Protocol,
    /// A passphrase agent is attached
    pub agent: Option<String>,
    /// Preferences can be read and written
    pub config_tool: bool,
}

/// The full engine used by the host facade
pub trait KeyEngine: KeySource + Send + Sync {
    /// Check the engine and report what it is
    fn info(&self) -> Result<EngineInfo, EngineError>;

    /// Encrypt to `recipient` (and `sender`, if given, so it can read the message too).
    ///
    /// With `sign`, the message is signed by `sender` or the default key.
    fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &str,
        sender: Option<&str>,
        sign: bool,
    ) -> Result<String, EngineError>;

    fn decrypt_verify(&self, ciphertext: &str) -> Result<DecryptOutput, EngineError>;

    fn edit_key(&self, key_id: &str, op: &EditOp) -> Result<(), EngineError>;

    /// Generate a key pair, returning its fingerprint
    fn generate_key(
        &self,
        params: &KeyGenParams,
        progress: &mut dyn FnMut(KeyGenProgress),
    ) -> Result<String, EngineError>;

    fn import_keys(&self, armored: &str) -> Result<ImportSummary, EngineError>;

    fn export_key(&self, id: &str, include_secret: bool) -> Result<String, EngineError>;

    fn config_value(&self, name: &str) -> Result<Option<String>, EngineError>;

    /// Set a preference; `None` clears it
    fn set_config_value(&self, name: &str, value: Option<&str>) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_distinguish_decrypt_failures() {
        let failures = [
            EngineError::BadPassphrase,
            EngineError::Canceled,
            EngineError::Pinentry("tty".into()),
            EngineError::Agent("none".into()),
            EngineError::BadData("armor".into()),
        ];
        let mut codes: Vec<u32> = failures.iter().map(EngineError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), failures.len());
        assert!(failures[..4].iter().all(EngineError::is_passphrase_failure));
        assert!(!failures[4].is_passphrase_failure());
    }

    #[test]
    fn test_already_signed_message() {
        assert_eq!(
            EngineError::AlreadySigned.to_string(),
            "The selected UID has already been signed with this key."
        );
    }

    #[test]
    fn test_trust_sig_levels() {
        assert_eq!(TrustSigLevel::from_level(1), Some(TrustSigLevel::Marginal));
        assert_eq!(TrustSigLevel::from_level(2), Some(TrustSigLevel::Full));
        assert_eq!(TrustSigLevel::from_level(0), None);
        assert!(TrustSigLevel::Full.amount() > TrustSigLevel::Marginal.amount());
    }

    #[test]
    fn test_verify_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&VerifyStatus::GoodExpiredKey).unwrap(),
            "\"GOOD_EXPKEY\""
        );
    }
}
