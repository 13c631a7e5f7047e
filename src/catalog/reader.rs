// catalog/reader.rs - Key Catalog Reader

use thiserror::Error;
use tracing::{debug, warn};

use super::model::{Key, Signature, SubKey, UserId, NONE_PLACEHOLDER};
use crate::keyring::{
    EngineError, KeyRecord, KeySource, ListMode, SignatureRecord, SubKeyRecord, UserIdRecord,
};

/// Errors from catalog queries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Key store error: {0}")]
    Store(EngineError),

    #[error("Key listing truncated after {returned} keys")]
    Truncated { returned: usize },

    #[error("Key store inconsistency: {0}")]
    StoreInconsistency(String),
}

impl CatalogError {
    /// Stable numeric code carried into host error records
    pub fn code(&self) -> u32 {
        match self {
            CatalogError::Store(e) => e.code(),
            CatalogError::Truncated { .. } => 36,
            CatalogError::StoreInconsistency(_) => 63,
        }
    }
}

impl From<EngineError> for CatalogError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Inconsistent(reason) => CatalogError::StoreInconsistency(reason),
            other => CatalogError::Store(other),
        }
    }
}

/// Read-only view of the key store in normalized form
pub struct KeyCatalog<S> {
    source: S,
}

impl<S: KeySource> KeyCatalog<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// All keys matching `pattern`; an empty pattern lists everything.
    ///
    /// With `secret_only`, only keys with a secret counterpart are listed.
    pub fn lookup(&self, pattern: &str, secret_only: bool) -> Result<Vec<Key>, CatalogError> {
        let listing = self
            .source
            .list_keys(pattern, secret_only, ListMode::VALIDATED_SIGNATURES)?;

        if listing.truncated {
            warn!(pattern, returned = listing.keys.len(), "Key listing truncated by the store");
            return Err(CatalogError::Truncated {
                returned: listing.keys.len(),
            });
        }

        let keys = listing
            .keys
            .into_iter()
            .map(normalize)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(pattern, secret_only, count = keys.len(), "Catalog lookup");
        Ok(keys)
    }

    /// One key by fingerprint or key id; `None` when the store has no match
    pub fn lookup_one(&self, id: &str, secret_only: bool) -> Result<Option<Key>, CatalogError> {
        let key = self
            .source
            .get_key(id, secret_only)?
            .map(normalize)
            .transpose()?;
        debug!(id, secret_only, found = key.is_some(), "Catalog single lookup");
        Ok(key)
    }
}

fn text(field: Option<String>) -> String {
    field
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NONE_PLACEHOLDER.to_string())
}

/// Turn an engine record into a [`Key`]
pub fn normalize(record: KeyRecord) -> Result<Key, CatalogError> {
    if record.subkeys.is_empty() {
        return Err(CatalogError::StoreInconsistency(
            "key record without a primary key".into(),
        ));
    }

    let subkeys: Vec<SubKey> = record.subkeys.into_iter().map(normalize_subkey).collect();
    Ok(Key {
        fingerprint: subkeys[0].fingerprint.clone(),
        subkeys,
        uids: record.uids.into_iter().map(normalize_uid).collect(),
        flags: record.flags,
        capabilities: record.capabilities,
        owner_trust: record.owner_trust,
        protocol: record.protocol,
    })
}

fn normalize_subkey(record: SubKeyRecord) -> SubKey {
    // Derive the key id from the fingerprint when the engine omitted it
    let key_id = record.key_id.clone().filter(|s| !s.is_empty()).or_else(|| {
        record
            .fingerprint
            .as_deref()
            .and_then(|fpr| fpr.get(fpr.len().checked_sub(16)?..))
            .map(str::to_string)
    });

    SubKey {
        fingerprint: text(record.fingerprint),
        key_id: text(key_id),
        length: record.length,
        created: record.created,
        expires: record.expires,
        flags: record.flags,
        capabilities: record.capabilities,
    }
}

fn normalize_uid(record: UserIdRecord) -> UserId {
    UserId {
        name: text(record.name),
        email: text(record.email),
        comment: text(record.comment),
        invalid: record.invalid,
        revoked: record.revoked,
        validity: record.validity,
        signatures: record.signatures.into_iter().map(normalize_signature).collect(),
    }
}

fn normalize_signature(record: SignatureRecord) -> Signature {
    Signature {
        signer_key_id: text(record.signer_key_id),
        created: record.created,
        expires: record.expires,
        invalid: record.invalid,
        revoked: record.revoked,
        expired: record.expired,
        status: record.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::{KeyListing, SigStatus, SledKeyring, KeyEngine, KeyGenParams, Validity};
    use crate::testing::{FixtureSource, KeyBuilder};

    #[test]
    fn test_placeholders_for_missing_text() {
        let record = KeyRecord {
            subkeys: vec![SubKeyRecord {
                fingerprint: None,
                key_id: None,
                ..Default::default()
            }],
            uids: vec![UserIdRecord {
                name: Some("example.com".into()),
                email: None,
                comment: Some(String::new()),
                signatures: vec![SignatureRecord::default()],
                ..Default::default()
            }],
            ..Default::default()
        };

        let key = normalize(record).unwrap();
        assert_eq!(key.fingerprint, NONE_PLACEHOLDER);
        assert_eq!(key.key_id(), NONE_PLACEHOLDER);
        assert_eq!(key.uids[0].name, "example.com");
        assert_eq!(key.uids[0].email, NONE_PLACEHOLDER);
        assert_eq!(key.uids[0].comment, NONE_PLACEHOLDER);
        assert_eq!(key.uids[0].signatures[0].signer_key_id, NONE_PLACEHOLDER);
        assert!(!key.uids[0].signatures[0].has_signer());
    }

    #[test]
    fn test_key_id_derived_from_fingerprint() {
        let record = KeyRecord {
            subkeys: vec![SubKeyRecord {
                fingerprint: Some("0123456789ABCDEF0123456789ABCDEFCAFEBABE".into()),
                key_id: None,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(normalize(record).unwrap().key_id(), "89ABCDEFCAFEBABE");
    }

    #[test]
    fn test_non_ascii_fingerprint_has_no_derived_key_id() {
        // 17 bytes; the last 16 start inside the first character
        let fingerprint = format!("{}a", "Ä".repeat(8));
        let record = KeyRecord {
            subkeys: vec![SubKeyRecord {
                fingerprint: Some(fingerprint.clone()),
                key_id: None,
                ..Default::default()
            }],
            ..Default::default()
        };
        let key = normalize(record).unwrap();
        assert_eq!(key.fingerprint, fingerprint);
        assert_eq!(key.key_id(), NONE_PLACEHOLDER);
    }

    #[test]
    fn test_record_without_subkeys_is_inconsistent() {
        assert!(matches!(
            normalize(KeyRecord::default()),
            Err(CatalogError::StoreInconsistency(_))
        ));
    }

    #[test]
    fn test_lookup_one_miss_is_none() {
        let source = FixtureSource::new(vec![KeyBuilder::new("AAAA").build()]);
        let catalog = KeyCatalog::new(&source);
        assert!(catalog.lookup_one("BBBB", false).unwrap().is_none());
        assert_eq!(catalog.lookup_one("AAAA", false).unwrap().unwrap().key_id(), "AAAA");
    }

    #[test]
    fn test_truncated_listing_is_an_error() {
        struct Truncating;
        impl KeySource for Truncating {
            fn list_keys(&self, _: &str, _: bool, _: ListMode) -> Result<KeyListing, EngineError> {
                Ok(KeyListing {
                    keys: vec![KeyBuilder::new("AAAA").build()],
                    truncated: true,
                })
            }
            fn get_key(&self, _: &str, _: bool) -> Result<Option<KeyRecord>, EngineError> {
                Ok(None)
            }
        }

        let catalog = KeyCatalog::new(Truncating);
        assert_eq!(
            catalog.lookup("", false),
            Err(CatalogError::Truncated { returned: 1 })
        );
    }

    #[test]
    fn test_iteration_failure_is_inconsistency() {
        struct Broken;
        impl KeySource for Broken {
            fn list_keys(&self, _: &str, _: bool, _: ListMode) -> Result<KeyListing, EngineError> {
                Err(EngineError::Inconsistent("listing interrupted".into()))
            }
            fn get_key(&self, _: &str, _: bool) -> Result<Option<KeyRecord>, EngineError> {
                Err(EngineError::Unavailable("closed".into()))
            }
        }

        let catalog = KeyCatalog::new(Broken);
        assert!(matches!(
            catalog.lookup("example.com", false),
            Err(CatalogError::StoreInconsistency(_))
        ));
        assert!(matches!(
            catalog.lookup_one("AAAA", false),
            Err(CatalogError::Store(EngineError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_secret_listing_is_subset() {
        let keyring = SledKeyring::in_memory().unwrap();
        let own = keyring
            .generate_key(
                &KeyGenParams {
                    name_real: "own.example".into(),
                    ..Default::default()
                },
                &mut |_| {},
            )
            .unwrap();
        let other = SledKeyring::in_memory().unwrap();
        let foreign = other
            .generate_key(
                &KeyGenParams {
                    name_real: "foreign.example".into(),
                    ..Default::default()
                },
                &mut |_| {},
            )
            .unwrap();
        keyring
            .import_keys(&other.export_key(&foreign, false).unwrap())
            .unwrap();

        let catalog = KeyCatalog::new(&keyring);
        let public: Vec<String> = catalog
            .lookup("", false)
            .unwrap()
            .into_iter()
            .map(|k| k.fingerprint)
            .collect();
        let secret: Vec<String> = catalog
            .lookup("", true)
            .unwrap()
            .into_iter()
            .map(|k| k.fingerprint)
            .collect();

        assert_eq!(public.len(), 2);
        assert_eq!(secret, vec![own.clone()]);
        assert!(secret.iter().all(|fpr| public.contains(fpr)));

        let domain = catalog.lookup("foreign.example", false).unwrap();
        assert_eq!(domain.len(), 1);
        assert_eq!(domain[0].fingerprint, foreign);
        assert_eq!(domain[0].owner_trust, Validity::Unknown);
        assert_eq!(domain[0].uids[0].signatures[0].status, SigStatus::Ok);
    }
}
