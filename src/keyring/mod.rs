// keyring/mod.rs - Key Engine Contract and Reference Keyring

//! The key engine seam and a sled-backed implementation of it.
//!
//! The trust core only ever talks to [`KeySource`]; the host facade talks to
//! [`KeyEngine`]. [`SledKeyring`] implements both with Ed25519 primary keys,
//! X25519 encryption subkeys and a PGP-style validity model.

pub mod agent;
pub mod armor;
pub mod engine;
pub mod fingerprint;
mod keygen;
mod material;
pub mod model;
mod store;
mod stored;
mod transfer;
pub mod validity;

pub use agent::{EnvPinentry, PassphraseRequest, Pinentry, StaticPinentry};
pub use engine::{
    DecryptOutput, EditOp, EngineError, EngineInfo, ImportStatus, ImportSummary, KeyEngine,
    KeyGenParams, KeyGenProgress, KeyListing, KeySource, ListMode, SignatureVerification,
    TrustSigLevel, VerifyStatus,
};
pub use fingerprint::{key_ids_match, Fingerprint, KeyId};
pub use keygen::parse_expiry;
pub use model::{
    Capabilities, KeyFlags, KeyRecord, Protocol, SigStatus, SignatureRecord, SubKeyRecord,
    UserIdRecord, Validity,
};
pub use store::{KeyringOptions, SledKeyring, DEFAULT_KEY};
pub use validity::TrustModel;
