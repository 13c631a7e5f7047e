// keyring/store.rs - Persistent Keyring using Sled

//! [`SledKeyring`] implements the full engine contract over a sled database.
//!
//! Trees:
//! - `keys`: fingerprint → public key material, owner-trust, disabled flag
//! - `secret_keys`: fingerprint → secret material, sealed under a passphrase
//! - `config`: preference name → value (`default-key`, ...)

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::agent::{PassphraseRequest, Pinentry};
use super::armor;
use super::engine::{
    DecryptOutput, EditOp, EngineError, EngineInfo, ImportStatus, ImportSummary, KeyEngine,
    KeyGenParams, KeyGenProgress, KeyListing, KeySource, ListMode, SignatureVerification,
    VerifyStatus,
};
use super::fingerprint::{normalize_hex, Fingerprint, KeyId};
use super::keygen::GenerationPlan;
use super::material::{open_message, seal_message, Envelope, MaterialError, SealedSecret, SecretBundle};
use super::model::{
    Capabilities, KeyFlags, KeyRecord, Protocol, SigStatus, SignatureRecord, SubKeyRecord,
    UserIdRecord, Validity,
};
use super::stored::{Certification, MessageSignature, SignedMessage, StoredKey, StoredUid};
use super::transfer::{self, TransferableKey};
use super::validity::{CertGraph, TrustModel, ValidityCalculator};

const TREE_KEYS: &str = "keys";
const TREE_SECRET_KEYS: &str = "secret_keys";
const TREE_CONFIG: &str = "config";

/// Preference naming the key used for certifications and message signatures
pub const DEFAULT_KEY: &str = "default-key";

/// Status reported for a certification whose signature does not verify
const BAD_SIGNATURE_STATUS: u32 = 8;

/// Passphrase attempts before an unlock fails
const PASSPHRASE_ATTEMPTS: usize = 3;

/// Result text of a successful per-key import
const IMPORT_OK: &str = "Success";

impl From<sled::Error> for EngineError {
    fn from(e: sled::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<MaterialError> for EngineError {
    fn from(e: MaterialError) -> Self {
        match e {
            MaterialError::BadPassphrase | MaterialError::PassphraseRequired => {
                EngineError::BadPassphrase
            }
            MaterialError::Malformed(reason) => EngineError::Inconsistent(reason),
            MaterialError::SealFailed | MaterialError::OpenFailed => {
                EngineError::BadData(e.to_string())
            }
        }
    }
}

/// Tunables for a keyring
#[derive(Clone, Debug, Default)]
pub struct KeyringOptions {
    /// Maximum keys per listing; 0 means unlimited
    pub listing_limit: usize,
    pub trust_model: TrustModel,
}

/// Persistent keyring backed by sled
pub struct SledKeyring {
    db: Db,
    keys: Tree,
    secret_keys: Tree,
    config: Tree,
    options: KeyringOptions,
    pinentry: Option<Arc<dyn Pinentry>>,
    write_lock: Mutex<()>,
}

impl SledKeyring {
    /// Open or create a keyring at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let db = sled::open(path).map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Self::from_db(db)
    }

    /// Create a temporary keyring (for testing)
    pub fn in_memory() -> Result<Self, EngineError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, EngineError> {
        let keys = db.open_tree(TREE_KEYS)?;
        let secret_keys = db.open_tree(TREE_SECRET_KEYS)?;
        let config = db.open_tree(TREE_CONFIG)?;

        Ok(Self {
            db,
            keys,
            secret_keys,
            config,
            options: KeyringOptions::default(),
            pinentry: None,
            write_lock: Mutex::new(()),
        })
    }

    pub fn with_options(mut self, options: KeyringOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_pinentry(mut self, pinentry: Arc<dyn Pinentry>) -> Self {
        self.pinentry = Some(pinentry);
        self
    }

    pub fn options(&self) -> &KeyringOptions {
        &self.options
    }

    /// Number of public keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<StoredKey>, EngineError> {
        match self.keys.get(fingerprint.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load every key in store order
    fn load_all(&self) -> Result<Vec<StoredKey>, EngineError> {
        let mut keys = Vec::new();
        for entry in self.keys.iter() {
            let (_, bytes) = entry
                .map_err(|e| EngineError::Inconsistent(format!("key listing interrupted: {}", e)))?;
            let key = decode(&bytes)
                .map_err(|e| EngineError::Inconsistent(format!("undecodable key record: {}", e)))?;
            keys.push(key);
        }
        Ok(keys)
    }

    fn save(&self, key: &StoredKey) -> Result<(), EngineError> {
        let fingerprint = key.material.fingerprint();
        self.keys.insert(fingerprint.as_bytes(), encode(key)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn has_secret(&self, fingerprint: &Fingerprint) -> Result<bool, EngineError> {
        Ok(self.secret_keys.contains_key(fingerprint.as_bytes())?)
    }

    fn load_secret(&self, fingerprint: &Fingerprint) -> Result<Option<SealedSecret>, EngineError> {
        match self.secret_keys.get(fingerprint.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All keys matching `pattern`
    fn find_matching(&self, pattern: &str, secret_only: bool) -> Result<Vec<StoredKey>, EngineError> {
        let mut found = Vec::new();
        for key in self.load_all()? {
            if !matches_pattern(&key, pattern) {
                continue;
            }
            if secret_only && !self.has_secret(&key.material.fingerprint())? {
                continue;
            }
            found.push(key);
        }
        Ok(found)
    }

    /// Exactly one key matching `id`
    fn resolve(&self, id: &str, secret_only: bool) -> Result<StoredKey, EngineError> {
        let mut found = self.find_matching(id, secret_only)?;
        match found.len() {
            0 if secret_only => Err(EngineError::NoSecretKey(id.to_string())),
            0 => Err(EngineError::KeyNotFound(id.to_string())),
            1 => Ok(found.remove(0)),
            _ => Err(EngineError::AmbiguousKey(id.to_string())),
        }
    }

    /// The `default-key` preference, or the first key with a secret part
    fn default_signer(&self) -> Result<StoredKey, EngineError> {
        if let Some(id) = self.config_value(DEFAULT_KEY)? {
            return self.resolve(&id, true);
        }
        for entry in self.secret_keys.iter() {
            let (fingerprint, _) = entry?;
            if let Some(key) = self.keys.get(&fingerprint)? {
                return decode(&key);
            }
        }
        Err(EngineError::NoSecretKey("no default key".into()))
    }

    /// Recover the secret of `key`, asking the pinentry when it is protected
    fn unlock(&self, key: &StoredKey) -> Result<SecretBundle, EngineError> {
        let fingerprint = key.material.fingerprint();
        let key_id = fingerprint.key_id().to_hex();
        let sealed = self
            .load_secret(&fingerprint)?
            .ok_or_else(|| EngineError::NoSecretKey(key_id.clone()))?;
        if !sealed.is_protected() {
            return Ok(sealed.open(None)?);
        }

        let pinentry = self
            .pinentry
            .as_ref()
            .ok_or_else(|| EngineError::Agent("no passphrase agent configured".into()))?;
        let uid_hint = key
            .material
            .uids
            .first()
            .map(StoredUid::text)
            .unwrap_or_default();

        for attempt in 0..PASSPHRASE_ATTEMPTS {
            let request = PassphraseRequest {
                key_id: &key_id,
                uid_hint: &uid_hint,
                retry: attempt > 0,
            };
            let passphrase = match pinentry.passphrase(&request) {
                Ok(Some(passphrase)) => passphrase,
                Ok(None) => return Err(EngineError::Canceled),
                Err(e) => return Err(EngineError::Pinentry(e)),
            };
            match sealed.open(Some(&passphrase)) {
                Ok(bundle) => return Ok(bundle),
                Err(MaterialError::BadPassphrase) => {
                    debug!(key_id = %key_id, attempt, "Bad passphrase");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::BadPassphrase)
    }

    /// Convert a stored key into the record the engine reports
    fn to_record(
        &self,
        key: &StoredKey,
        calculator: &mut ValidityCalculator<'_, KeyGraph>,
        graph: &KeyGraph,
        secret: bool,
        mode: ListMode,
    ) -> KeyRecord {
        let now = graph.now;
        let material = &key.material;
        let fingerprint = material.fingerprint();
        let key_id = fingerprint.key_id();

        let flags = KeyFlags {
            expired: material.is_expired(now),
            revoked: material.is_revoked(),
            disabled: key.disabled,
            invalid: mode.validate && !material.has_valid_self_certification(),
            secret,
            is_qualified: false,
        };

        let mut subkeys = vec![SubKeyRecord {
            fingerprint: Some(fingerprint.to_hex()),
            key_id: Some(key_id.to_hex()),
            length: material.primary.algorithm.bits(),
            created: material.primary.created,
            expires: material.primary.expires,
            flags,
            capabilities: Capabilities {
                can_sign: true,
                can_certify: true,
                ..Default::default()
            },
        }];
        for subkey in &material.subkeys {
            let bound = !mode.validate || subkey.binding_is_valid(&fingerprint, &material.primary.public);
            subkeys.push(SubKeyRecord {
                fingerprint: Some(subkey.fingerprint().to_hex()),
                key_id: Some(subkey.key_id().to_hex()),
                length: subkey.algorithm.bits(),
                created: subkey.created,
                expires: subkey.expires,
                flags: KeyFlags {
                    expired: flags.expired || subkey.is_expired(now),
                    invalid: flags.invalid || !bound,
                    ..flags
                },
                capabilities: Capabilities {
                    can_encrypt: true,
                    ..Default::default()
                },
            });
        }

        let capabilities = subkeys
            .iter()
            .filter(|sk| sk.flags.usable())
            .fold(Capabilities::default(), |acc, sk| Capabilities {
                can_encrypt: acc.can_encrypt || sk.capabilities.can_encrypt,
                can_sign: acc.can_sign || sk.capabilities.can_sign,
                can_certify: acc.can_certify || sk.capabilities.can_certify,
                can_authenticate: acc.can_authenticate || sk.capabilities.can_authenticate,
            });

        let uids = material
            .uids
            .iter()
            .enumerate()
            .map(|(index, uid)| {
                let text = uid.text();
                let revoked = uid.is_revoked(&fingerprint, &material.primary.public);
                let self_certified = uid.certifications.iter().any(|cert| {
                    cert.signer == fingerprint
                        && cert.verify(&fingerprint, &text, &material.primary.public)
                });
                let invalid = mode.validate && !self_certified;

                let validity = if !mode.validate {
                    Validity::Unknown
                } else if revoked || invalid {
                    Validity::Never
                } else {
                    calculator.uid_validity(&key_id, index)
                };

                let signatures = if mode.include_signatures {
                    uid.certifications
                        .iter()
                        .map(|cert| signature_record(cert, &fingerprint, &text, graph, mode))
                        .collect()
                } else {
                    Vec::new()
                };

                UserIdRecord {
                    name: (!uid.name.is_empty()).then(|| uid.name.clone()),
                    email: uid.email.clone(),
                    comment: uid.comment.clone(),
                    invalid,
                    revoked,
                    validity,
                    signatures,
                }
            })
            .collect();

        KeyRecord {
            subkeys,
            uids,
            flags,
            capabilities,
            owner_trust: key.owner_trust,
            protocol: Protocol::OpenPgp,
        }
    }
}

fn signature_record(
    cert: &Certification,
    target: &Fingerprint,
    uid_text: &str,
    graph: &KeyGraph,
    mode: ListMode,
) -> SignatureRecord {
    let mut record = SignatureRecord {
        signer_key_id: Some(cert.signer.key_id().to_hex()),
        created: cert.created,
        expires: cert.expires,
        expired: cert.is_expired(graph.now),
        revoked: cert.revocation.is_some(),
        invalid: false,
        status: SigStatus::Ok,
    };
    if !mode.validate {
        return record;
    }

    match graph.find(&cert.signer) {
        None => {
            record.revoked = false;
            record.status = SigStatus::NoPublicKey;
        }
        Some(signer) => {
            let public = &signer.material.primary.public;
            if cert.verify(target, uid_text, public) {
                record.revoked = cert.is_revoked(target, uid_text, public);
            } else {
                record.invalid = true;
                record.revoked = false;
                record.status = SigStatus::Other(BAD_SIGNATURE_STATUS);
            }
        }
    }
    record
}

fn matches_pattern(key: &StoredKey, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return true;
    }
    match normalize_hex(pattern) {
        Some(digits) if matches!(digits.len(), 8 | 16 | 40) => key.material.matches_id(&digits),
        _ => key.material.matches_text(pattern),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| EngineError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EngineError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| EngineError::Serialization(e.to_string()))
}

/// Snapshot of the keyring for one listing
///
/// Keys stay in store order. Certification lookups go through the key id, and
/// the first key holding an id answers for it.
struct KeyGraph {
    all: Vec<StoredKey>,
    by_key_id: HashMap<KeyId, usize>,
    by_fingerprint: HashMap<Fingerprint, usize>,
    now: i64,
}

impl KeyGraph {
    fn new(all: Vec<StoredKey>, now: i64) -> Self {
        let mut by_key_id = HashMap::with_capacity(all.len());
        let mut by_fingerprint = HashMap::with_capacity(all.len());
        for (index, key) in all.iter().enumerate() {
            by_key_id.entry(key.material.key_id()).or_insert(index);
            by_fingerprint.entry(key.material.fingerprint()).or_insert(index);
        }
        Self {
            all,
            by_key_id,
            by_fingerprint,
            now,
        }
    }

    fn get(&self, key: &KeyId) -> Option<&StoredKey> {
        self.by_key_id.get(key).map(|&index| &self.all[index])
    }

    fn find(&self, fingerprint: &Fingerprint) -> Option<&StoredKey> {
        self.by_fingerprint.get(fingerprint).map(|&index| &self.all[index])
    }

    fn iter(&self) -> impl Iterator<Item = &StoredKey> {
        self.all.iter()
    }
}

impl CertGraph for KeyGraph {
    fn owner_trust(&self, key: &KeyId) -> Validity {
        self.get(key)
            .map(|k| k.owner_trust)
            .unwrap_or_default()
    }

    fn is_usable(&self, key: &KeyId) -> bool {
        self.get(key).is_some_and(|k| k.is_usable(self.now))
    }

    fn uid_count(&self, key: &KeyId) -> usize {
        self.get(key).map_or(0, |k| k.material.uids.len())
    }

    fn certifiers(&self, key: &KeyId, uid_index: usize) -> Vec<KeyId> {
        let Some(target) = self.get(key) else {
            return Vec::new();
        };
        let Some(uid) = target.material.uids.get(uid_index) else {
            return Vec::new();
        };
        let fingerprint = target.material.fingerprint();
        let text = uid.text();

        uid.certifications
            .iter()
            .filter(|cert| !cert.is_expired(self.now))
            .filter_map(|cert| {
                let signer = self.find(&cert.signer)?;
                let public = &signer.material.primary.public;
                (cert.verify(&fingerprint, &text, public)
                    && !cert.is_revoked(&fingerprint, &text, public))
                .then(|| signer.material.key_id())
            })
            .collect()
    }
}

impl KeySource for SledKeyring {
    fn list_keys(
        &self,
        pattern: &str,
        secret_only: bool,
        mode: ListMode,
    ) -> Result<KeyListing, EngineError> {
        let graph = KeyGraph::new(self.load_all()?, Self::now());
        let mut calculator = ValidityCalculator::new(&graph, &self.options.trust_model);
        let limit = self.options.listing_limit;

        let mut listing = KeyListing::default();
        for key in graph.iter() {
            if !matches_pattern(key, pattern) {
                continue;
            }
            let secret = self.has_secret(&key.material.fingerprint())?;
            if secret_only && !secret {
                continue;
            }
            if limit > 0 && listing.keys.len() == limit {
                listing.truncated = true;
                warn!(pattern, limit, "Key listing truncated");
                break;
            }
            let record = self.to_record(key, &mut calculator, &graph, secret_only && secret, mode);
            listing.keys.push(record);
        }

        debug!(pattern, secret_only, count = listing.keys.len(), "Listed keys");
        Ok(listing)
    }

    fn get_key(&self, id: &str, secret_only: bool) -> Result<Option<KeyRecord>, EngineError> {
        let Some(digits) = normalize_hex(id) else {
            return Ok(None);
        };
        if !matches!(digits.len(), 8 | 16 | 40) {
            return Ok(None);
        }

        let mut listing = self.list_keys(&digits, secret_only, ListMode::VALIDATED_SIGNATURES)?;
        match listing.keys.len() {
            0 => Ok(None),
            1 => Ok(listing.keys.pop()),
            _ => Err(EngineError::AmbiguousKey(id.to_string())),
        }
    }
}

impl KeyEngine for SledKeyring {
    fn info(&self) -> Result<EngineInfo, EngineError> {
        // Touch the store so a broken database shows up here
        self.config.get(DEFAULT_KEY)?;
        Ok(EngineInfo {
            version: format!("sled-keyring {}", env!("CARGO_PKG_VERSION")),
            protocol: Protocol::OpenPgp,
            agent: self.pinentry.as_ref().map(|p| p.describe()),
            config_tool: true,
        })
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &str,
        sender: Option<&str>,
        sign: bool,
    ) -> Result<String, EngineError> {
        let now = Self::now();
        let as_recipient = |id: &str| {
            self.resolve(id, false).map_err(|e| match e {
                EngineError::KeyNotFound(_) | EngineError::AmbiguousKey(_) => {
                    EngineError::InvalidRecipient(e.to_string())
                }
                other => other,
            })
        };

        let mut targets = vec![as_recipient(recipient)?];
        if let Some(sender) = sender {
            let sender_key = as_recipient(sender)?;
            if sender_key.material.fingerprint() != targets[0].material.fingerprint() {
                targets.push(sender_key);
            }
        }

        let mut recipients = Vec::with_capacity(targets.len());
        for key in &targets {
            let key_id = key.material.key_id();
            if !key.is_usable(now) {
                return Err(EngineError::InvalidRecipient(format!("{} is not usable", key_id)));
            }
            let subkey = key.material.encryption_subkey(now).ok_or_else(|| {
                EngineError::InvalidRecipient(format!("{} has no encryption subkey", key_id))
            })?;
            recipients.push((subkey.key_id(), subkey.public));
        }

        let mut signatures = Vec::new();
        if sign {
            let signer = match sender {
                Some(sender) => self.resolve(sender, true)?,
                None => self.default_signer()?,
            };
            if !signer.is_usable(now) {
                return Err(EngineError::UnusableKey(signer.material.key_id().to_hex()));
            }
            let secret = self.unlock(&signer)?;
            signatures.push(MessageSignature::issue(
                &signer.material.fingerprint(),
                &secret,
                plaintext,
                now,
            ));
        }

        let message = SignedMessage {
            body: plaintext.to_vec(),
            signatures,
        };
        let envelope = seal_message(&encode(&message)?, &recipients)?;

        info!(recipients = recipients.len(), signed = sign, "Encrypted message");
        Ok(armor::encode(armor::MESSAGE, &encode(&envelope)?))
    }

    fn decrypt_verify(&self, ciphertext: &str) -> Result<DecryptOutput, EngineError> {
        let payload = armor::decode(ciphertext, armor::MESSAGE)
            .map_err(|e| EngineError::BadData(e.to_string()))?;
        let envelope: Envelope =
            decode(&payload).map_err(|e| EngineError::BadData(e.to_string()))?;

        let now = Self::now();
        let graph = KeyGraph::new(self.load_all()?, now);

        // First recipient entry we hold a secret for
        let mut holder = None;
        'entries: for entry in &envelope.recipients {
            for key in graph.iter() {
                let ours = key.material.subkeys.iter().any(|sk| sk.key_id() == entry.recipient);
                if ours && self.has_secret(&key.material.fingerprint())? {
                    holder = Some((key, entry));
                    break 'entries;
                }
            }
        }
        let (key, entry) = holder
            .ok_or_else(|| EngineError::NoSecretKey("no secret key for any recipient".into()))?;

        let secret = self.unlock(key)?;
        let encryption = secret
            .encryption
            .ok_or_else(|| EngineError::NoSecretKey(key.material.key_id().to_hex()))?;
        let opened = open_message(&envelope, entry, &encryption)?;
        let message: SignedMessage =
            decode(&opened).map_err(|e| EngineError::BadData(e.to_string()))?;

        let mut calculator = ValidityCalculator::new(&graph, &self.options.trust_model);
        let signatures = message
            .signatures
            .iter()
            .map(|sig| {
                let mut verification = SignatureVerification {
                    fingerprint: sig.signer.to_hex(),
                    timestamp: sig.created,
                    expiration: 0,
                    validity: Validity::Unknown,
                    status: VerifyStatus::NoPubkey,
                };
                if let Some(signer) = graph.find(&sig.signer) {
                    verification.validity = calculator.key_validity(&signer.material.key_id());
                    verification.expiration = signer.material.primary.expires;
                    verification.status = if !sig.verify(&message.body, &signer.material.primary.public) {
                        VerifyStatus::BadSig
                    } else if signer.material.is_expired(now) {
                        VerifyStatus::GoodExpiredKey
                    } else {
                        VerifyStatus::Good
                    };
                }
                verification
            })
            .collect();

        info!(key_id = %key.material.key_id(), "Decrypted message");
        Ok(DecryptOutput {
            plaintext: message.body,
            signatures,
        })
    }

    fn edit_key(&self, key_id: &str, op: &EditOp) -> Result<(), EngineError> {
        let _guard = self.write_lock.lock();
        let mut key = self.resolve(key_id, false)?;
        let fingerprint = key.material.fingerprint();
        let now = Self::now();
        let uid_missing = |index: usize| EngineError::InvalidValue(format!("no user-ID at index {}", index));

        match op {
            EditOp::SignUid {
                uid_index,
                local,
                trust,
            } => {
                let signer = self.default_signer()?;
                let signer_fingerprint = signer.material.fingerprint();
                if !signer.is_usable(now) {
                    return Err(EngineError::UnusableKey(signer_fingerprint.key_id().to_hex()));
                }
                let uid = key
                    .material
                    .uids
                    .get(*uid_index)
                    .ok_or_else(|| uid_missing(*uid_index))?;
                if uid
                    .certifications
                    .iter()
                    .any(|cert| cert.signer == signer_fingerprint && cert.revocation.is_none())
                {
                    return Err(EngineError::AlreadySigned);
                }
                let text = uid.text();

                let secret = self.unlock(&signer)?;
                let cert = Certification::issue(
                    &fingerprint,
                    &text,
                    &signer_fingerprint,
                    &secret,
                    now,
                    !local,
                    trust.map(|level| level.amount()),
                );
                key.material.uids[*uid_index].certifications.push(cert);
            }
            EditOp::Enable => key.disabled = false,
            EditOp::Disable => key.disabled = true,
            EditOp::DeleteSignature {
                uid_index,
                sig_index,
            } => {
                let uid = key
                    .material
                    .uids
                    .get_mut(*uid_index)
                    .ok_or_else(|| uid_missing(*uid_index))?;
                if *sig_index >= uid.certifications.len() {
                    return Err(EngineError::InvalidValue(format!(
                        "no signature at index {}",
                        sig_index
                    )));
                }
                uid.certifications.remove(*sig_index);
            }
            EditOp::SetOwnerTrust(trust) => key.owner_trust = *trust,
            EditOp::RevokeUid { uid_index } => {
                if *uid_index >= key.material.uids.len() {
                    return Err(uid_missing(*uid_index));
                }
                let secret = self.unlock(&key)?;
                key.material.uids[*uid_index].revoke(&fingerprint, &secret, now);
            }
            EditOp::RevokeSignature {
                uid_index,
                sig_index,
            } => {
                let uid = key
                    .material
                    .uids
                    .get(*uid_index)
                    .ok_or_else(|| uid_missing(*uid_index))?;
                let cert = uid.certifications.get(*sig_index).ok_or_else(|| {
                    EngineError::InvalidValue(format!("no signature at index {}", sig_index))
                })?;
                let text = uid.text();
                let signer = self
                    .load(&cert.signer)?
                    .ok_or_else(|| EngineError::NoSecretKey(cert.signer.key_id().to_hex()))?;

                let secret = self.unlock(&signer)?;
                key.material.uids[*uid_index].certifications[*sig_index]
                    .revoke(&fingerprint, &text, &secret, now);
            }
            EditOp::RevokeKey => {
                let secret = self.unlock(&key)?;
                key.material.revoke(&secret, now);
            }
        }

        self.save(&key)?;
        info!(key_id = %fingerprint.key_id(), op = op.name(), "Edited key");
        Ok(())
    }

    fn generate_key(
        &self,
        params: &KeyGenParams,
        progress: &mut dyn FnMut(KeyGenProgress),
    ) -> Result<String, EngineError> {
        let now = Self::now();
        let plan = GenerationPlan::from_params(params, now)?;
        let (material, secret, passphrase) = plan.generate(now, progress);
        let sealed = SealedSecret::seal(&secret, passphrase.as_deref())?;

        let mut key = StoredKey::new(material);
        key.owner_trust = Validity::Ultimate;
        let fingerprint = key.material.fingerprint();

        let _guard = self.write_lock.lock();
        self.secret_keys.insert(fingerprint.as_bytes(), encode(&sealed)?)?;
        self.save(&key)?;

        info!(
            fingerprint = %fingerprint,
            protected = sealed.is_protected(),
            "Generated key pair"
        );
        Ok(fingerprint.to_hex())
    }

    fn import_keys(&self, armored: &str) -> Result<ImportSummary, EngineError> {
        let blocks = transfer::decode_blocks(armored)?;
        let _guard = self.write_lock.lock();
        let mut summary = ImportSummary::default();

        for block in blocks {
            summary.considered += 1;
            let incoming = match block {
                Ok(incoming) => incoming,
                Err(reason) => {
                    warn!(reason = %reason, "Skipping key block");
                    summary.not_imported += 1;
                    summary.imports.push(ImportStatus {
                        result: reason,
                        ..Default::default()
                    });
                    continue;
                }
            };

            let fingerprint = incoming.material.fingerprint();
            let mut status = ImportStatus {
                fingerprint: fingerprint.to_hex(),
                result: IMPORT_OK.into(),
                ..Default::default()
            };
            if let Err(rejection) = transfer::check(&incoming) {
                if rejection == transfer::Rejection::NoUserId {
                    summary.no_user_id += 1;
                }
                summary.not_imported += 1;
                status.result = rejection.reason();
                summary.imports.push(status);
                continue;
            }

            let TransferableKey { material, secret } = incoming;
            match self.load(&fingerprint)? {
                None => {
                    self.save(&StoredKey::new(material))?;
                    summary.imported += 1;
                    status.new_key = true;
                }
                Some(mut existing) => {
                    let stats = transfer::merge(&mut existing.material, material);
                    summary.new_user_ids += stats.new_uids;
                    summary.new_sub_keys += stats.new_subkeys;
                    summary.new_signatures += stats.new_signatures;
                    summary.new_revocations += stats.new_revocations;
                    status.new_uid = stats.new_uids > 0;
                    status.new_subkey = stats.new_subkeys > 0;
                    status.new_sig = stats.new_signatures > 0 || stats.new_revocations > 0;
                    if stats.changed() {
                        self.save(&existing)?;
                    } else {
                        summary.unchanged += 1;
                    }
                }
            }

            if let Some(sealed) = secret {
                summary.secret_read += 1;
                if self.has_secret(&fingerprint)? {
                    summary.secret_unchanged += 1;
                } else {
                    self.secret_keys.insert(fingerprint.as_bytes(), encode(&sealed)?)?;
                    summary.secret_imported += 1;
                    status.new_secret = true;
                }
            }
            summary.imports.push(status);
        }
        self.db.flush()?;

        info!(
            considered = summary.considered,
            imported = summary.imported,
            unchanged = summary.unchanged,
            not_imported = summary.not_imported,
            "Imported keys"
        );
        Ok(summary)
    }

    fn export_key(&self, id: &str, include_secret: bool) -> Result<String, EngineError> {
        let keys = self.find_matching(id, include_secret)?;
        if keys.is_empty() {
            return Err(if include_secret {
                EngineError::NoSecretKey(id.to_string())
            } else {
                EngineError::KeyNotFound(id.to_string())
            });
        }

        let mut transferable = Vec::with_capacity(keys.len());
        for key in keys {
            let fingerprint = key.material.fingerprint();
            let secret = if include_secret {
                Some(
                    self.load_secret(&fingerprint)?
                        .ok_or_else(|| EngineError::NoSecretKey(fingerprint.key_id().to_hex()))?,
                )
            } else {
                None
            };
            transferable.push(TransferableKey {
                material: key.material.exportable(),
                secret,
            });
        }

        debug!(id, count = transferable.len(), include_secret, "Exported keys");
        transfer::encode_blocks(&transferable)
    }

    fn config_value(&self, name: &str) -> Result<Option<String>, EngineError> {
        match self.config.get(name.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| EngineError::Inconsistent(format!("config '{}': {}", name, e))),
            None => Ok(None),
        }
    }

    fn set_config_value(&self, name: &str, value: Option<&str>) -> Result<(), EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidValue("empty preference name".into()));
        }
        match value {
            Some(value) => {
                self.config.insert(name.as_bytes(), value.as_bytes())?;
            }
            None => {
                self.config.remove(name.as_bytes())?;
            }
        }
        self.db.flush()?;
        debug!(name, set = value.is_some(), "Updated preference");
        Ok(())
    }
}
