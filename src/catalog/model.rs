// catalog/model.rs - Normalized Keys, Subkeys, User-IDs and Signatures

use serde::Serialize;

use crate::keyring::{Capabilities, KeyFlags, Protocol, SigStatus, Validity};

/// Text surfaced for any field the engine left empty
pub const NONE_PLACEHOLDER: &str = "[none]";

/// A key snapshot, owned by the caller and scoped to one query.
///
/// Always has at least one subkey; the first one is the primary key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Key {
    /// Fingerprint of the primary key
    pub fingerprint: String,
    pub subkeys: Vec<SubKey>,
    pub uids: Vec<UserId>,
    pub flags: KeyFlags,
    pub capabilities: Capabilities,
    pub owner_trust: Validity,
    pub protocol: Protocol,
}

impl Key {
    pub fn primary(&self) -> &SubKey {
        // Non-empty by construction (see `reader::normalize`)
        &self.subkeys[0]
    }

    /// Key id of the primary key
    pub fn key_id(&self) -> &str {
        &self.primary().key_id
    }

    /// Whether the key is disabled, revoked or invalid
    pub fn is_unusable(&self) -> bool {
        self.flags.disabled || self.flags.revoked || self.flags.invalid
    }

    /// User-ID at `index`
    pub fn uid(&self, index: usize) -> Option<&UserId> {
        self.uids.get(index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubKey {
    pub fingerprint: String,
    pub key_id: String,
    pub length: u32,
    pub created: i64,
    pub expires: i64,
    pub flags: KeyFlags,
    pub capabilities: Capabilities,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserId {
    pub name: String,
    pub email: String,
    pub comment: String,
    pub invalid: bool,
    pub revoked: bool,
    pub validity: Validity,
    pub signatures: Vec<Signature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub signer_key_id: String,
    pub created: i64,
    pub expires: i64,
    pub invalid: bool,
    pub revoked: bool,
    pub expired: bool,
    pub status: SigStatus,
}

impl Signature {
    /// The engine could check this signature
    pub fn is_checked(&self) -> bool {
        self.status == SigStatus::Ok
    }

    pub fn has_signer(&self) -> bool {
        self.signer_key_id != NONE_PLACEHOLDER
    }
}
