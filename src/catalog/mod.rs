// catalog/mod.rs - Key Catalog

//! Normalized, query-scoped snapshots of the key store.

pub mod model;
pub mod reader;

pub use model::{Key, Signature, SubKey, UserId, NONE_PLACEHOLDER};
pub use reader::{normalize, CatalogError, KeyCatalog};
