// testing.rs - In-Memory Key Source for Tests

use std::collections::HashSet;

use crate::keyring::{
    key_ids_match, EngineError, KeyListing, KeyRecord, KeySource, ListMode, SigStatus,
    SignatureRecord, SubKeyRecord, UserIdRecord, Validity,
};

/// A fixed set of key records
#[derive(Clone, Debug, Default)]
pub(crate) struct FixtureSource {
    keys: Vec<KeyRecord>,
    secret: HashSet<String>,
}

impl FixtureSource {
    pub fn new(keys: Vec<KeyRecord>) -> Self {
        Self {
            keys,
            secret: HashSet::new(),
        }
    }

    /// Mark the key with this key id as having a secret counterpart
    pub fn with_secret(mut self, key_id: &str) -> Self {
        self.secret.insert(key_id.to_ascii_uppercase());
        self
    }

    fn names(record: &KeyRecord, id: &str) -> bool {
        record.subkeys.iter().any(|sk| {
            let key_id = sk.key_id.as_deref().unwrap_or_default();
            let fingerprint = sk.fingerprint.as_deref().unwrap_or_default();
            key_id.eq_ignore_ascii_case(id)
                || fingerprint.eq_ignore_ascii_case(id)
                || key_ids_match(id, fingerprint)
        })
    }

    fn has_secret(&self, record: &KeyRecord) -> bool {
        record
            .primary()
            .and_then(|sk| sk.key_id.as_deref())
            .is_some_and(|id| self.secret.contains(&id.to_ascii_uppercase()))
    }

    fn view(&self, record: &KeyRecord, secret_only: bool) -> KeyRecord {
        let mut record = record.clone();
        record.flags.secret = secret_only;
        record
    }
}

impl KeySource for FixtureSource {
    fn list_keys(
        &self,
        pattern: &str,
        secret_only: bool,
        _mode: ListMode,
    ) -> Result<KeyListing, EngineError> {
        let keys = self
            .keys
            .iter()
            .filter(|record| {
                pattern.is_empty()
                    || Self::names(record, pattern)
                    || record
                        .uids
                        .iter()
                        .any(|uid| uid.name.as_deref().is_some_and(|n| n.contains(pattern)))
            })
            .filter(|record| !secret_only || self.has_secret(record))
            .map(|record| self.view(record, secret_only))
            .collect();
        Ok(KeyListing {
            keys,
            truncated: false,
        })
    }

    fn get_key(&self, id: &str, secret_only: bool) -> Result<Option<KeyRecord>, EngineError> {
        Ok(self
            .keys
            .iter()
            .find(|record| Self::names(record, id))
            .filter(|record| !secret_only || self.has_secret(record))
            .map(|record| self.view(record, secret_only)))
    }
}

/// Builds a [`KeyRecord`] whose primary key id is a short test label
pub(crate) struct KeyBuilder {
    record: KeyRecord,
}

impl KeyBuilder {
    pub fn new(key_id: &str) -> Self {
        let record = KeyRecord {
            subkeys: vec![SubKeyRecord {
                fingerprint: Some(format!("{:0>40}", key_id)),
                key_id: Some(key_id.to_string()),
                length: 255,
                created: 1_600_000_000,
                ..Default::default()
            }],
            ..Default::default()
        };
        Self { record }
    }

    pub fn owner_trust(mut self, trust: Validity) -> Self {
        self.record.owner_trust = trust;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.record.flags.disabled = true;
        self
    }

    pub fn revoked(mut self) -> Self {
        self.record.flags.revoked = true;
        self
    }

    pub fn expired(mut self) -> Self {
        self.record.flags.expired = true;
        self
    }

    /// Append a user-ID
    pub fn uid(mut self, name: &str) -> Self {
        self.record.uids.push(UserIdRecord {
            name: Some(name.to_string()),
            ..Default::default()
        });
        self
    }

    /// Append a revoked user-ID
    pub fn revoked_uid(mut self, name: &str) -> Self {
        self.record.uids.push(UserIdRecord {
            name: Some(name.to_string()),
            revoked: true,
            ..Default::default()
        });
        self
    }

    /// Append a good signature by `signer` to the last user-ID
    pub fn signed_by(self, signer: &str) -> Self {
        self.signature(sig(signer))
    }

    /// Append a signature to the last user-ID
    pub fn signature(mut self, signature: SignatureRecord) -> Self {
        if let Some(uid) = self.record.uids.last_mut() {
            uid.signatures.push(signature);
        }
        self
    }

    pub fn build(self) -> KeyRecord {
        self.record
    }
}

/// A good, checked signature by `signer`
pub(crate) fn sig(signer: &str) -> SignatureRecord {
    SignatureRecord {
        signer_key_id: Some(signer.to_string()),
        created: 1_600_000_100,
        status: SigStatus::Ok,
        ..Default::default()
    }
}
