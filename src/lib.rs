// lib.rs - Domain Key Trust Evaluation
//
// Decides whether a domain's public key can be trusted because a required
// signer (or a trusted third party) certified it, over a persistent keyring.

#![doc = include_str!("../README.md")]

pub mod api;
pub mod catalog;
pub mod keyring;
pub mod observability;
pub mod settings;
pub mod trust;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use api::{DomainKeyApi, ErrorRecord, KeyGenEvent, KeyGenTask, PluginStatus};

pub use catalog::{CatalogError, Key, KeyCatalog, Signature, SubKey, UserId};

pub use keyring::{EngineError, KeyEngine, KeySource, SledKeyring, Validity};

pub use observability::{init_tracing, TracingConfig, TracingFormat};

pub use settings::{Settings, SettingsError};

pub use trust::{TrustCode, TrustEvaluator, TrustVerdict, UidSelector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{ApiResult, DomainKeyApi, ErrorRecord};
    pub use crate::catalog::{Key, KeyCatalog};
    pub use crate::keyring::{KeyEngine, KeySource, SledKeyring};
    pub use crate::trust::{TrustCode, TrustEvaluator, TrustVerdict, UidSelector};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
