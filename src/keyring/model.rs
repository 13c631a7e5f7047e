// keyring/model.rs - Key Records as Reported by the Engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner-trust and user-ID validity scale
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    /// Nothing is known
    #[default]
    Unknown,

    /// Not enough information to decide
    Undefined,

    /// Explicitly never trusted / never valid
    Never,

    /// Limited trust
    Marginal,

    /// Fully trusted / fully valid
    Full,

    /// Own keys
    Ultimate,
}

impl Validity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Validity::Unknown => "unknown",
            Validity::Undefined => "undefined",
            Validity::Never => "never",
            Validity::Marginal => "marginal",
            Validity::Full => "full",
            Validity::Ultimate => "ultimate",
        }
    }

    /// Parse the lower-case names used on the wire and on the command line
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "unknown" => Some(Validity::Unknown),
            "undefined" => Some(Validity::Undefined),
            "never" => Some(Validity::Never),
            "marginal" => Some(Validity::Marginal),
            "full" => Some(Validity::Full),
            "ultimate" => Some(Validity::Ultimate),
            _ => None,
        }
    }

    /// Whether a signer with this owner-trust can introduce other keys
    pub fn can_introduce(&self) -> bool {
        matches!(self, Validity::Full | Validity::Ultimate)
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol a key belongs to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "OpenPGP")]
    #[default]
    OpenPgp,
    #[serde(rename = "CMS")]
    Cms,
    #[serde(rename = "Unknown")]
    Unknown,
}

/// Outcome of checking a key signature
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigStatus {
    #[default]
    Ok,

    /// The signer's public key is not in the keyring
    NoPublicKey,

    /// The engine could not process the signature
    GeneralError,

    /// Any other engine status code
    Other(u32),
}

/// State flags shared by keys and subkeys
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFlags {
    pub expired: bool,
    pub revoked: bool,
    pub disabled: bool,
    pub invalid: bool,
    pub secret: bool,
    pub is_qualified: bool,
}

impl KeyFlags {
    /// Whether the key may be used at all
    pub fn usable(&self) -> bool {
        !(self.expired || self.revoked || self.disabled || self.invalid)
    }
}

/// Capability flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_encrypt: bool,
    pub can_sign: bool,
    pub can_certify: bool,
    pub can_authenticate: bool,
}

/// A key record exactly as the engine reports it.
///
/// Textual fields are optional here; the catalog turns them into placeholders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRecord {
    pub subkeys: Vec<SubKeyRecord>,
    pub uids: Vec<UserIdRecord>,
    pub flags: KeyFlags,
    pub capabilities: Capabilities,
    pub owner_trust: Validity,
    pub protocol: Protocol,
}

impl KeyRecord {
    /// The primary key is the first subkey
    pub fn primary(&self) -> Option<&SubKeyRecord> {
        self.subkeys.first()
    }

    /// Fingerprint of the primary key
    pub fn fingerprint(&self) -> Option<&str> {
        self.primary().and_then(|sk| sk.fingerprint.as_deref())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubKeyRecord {
    pub fingerprint: Option<String>,
    pub key_id: Option<String>,
    pub length: u32,
    pub created: i64,
    /// 0 means the key never expires
    pub expires: i64,
    pub flags: KeyFlags,
    pub capabilities: Capabilities,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserIdRecord {
    pub name: Option<String>,
    pub email: Option<String>,
    pub comment: Option<String>,
    pub invalid: bool,
    pub revoked: bool,
    pub validity: Validity,
    pub signatures: Vec<SignatureRecord>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureRecord {
    pub signer_key_id: Option<String>,
    pub created: i64,
    /// 0 means the signature never expires
    pub expires: i64,
    pub invalid: bool,
    pub revoked: bool,
    pub expired: bool,
    pub status: SigStatus,
}
