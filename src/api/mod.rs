// api/mod.rs - Host Facade

//! The surface handed to a host (browser extension, CLI, service).
//!
//! Every call returns its payload or an [`ErrorRecord`] naming the method, the
//! engine error code and message, and where in this crate the failure was
//! recorded.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use domainkey_trust::api::DomainKeyApi;
//! use domainkey_trust::keyring::SledKeyring;
//!
//! let api = DomainKeyApi::new(Arc::new(SledKeyring::open("keyring")?));
//! let code = api.verify_domain_key("example.com", fingerprint, -1, "89ABCDEF01234567")?;
//! ```

mod error;
mod keygen;
mod prefs;
mod status;

pub use error::{ApiResult, ErrorRecord};
pub use keygen::{KeyGenEvent, KeyGenReport, KeyGenTask, COMPLETE_EVENT, PROGRESS_EVENT, QUEUED};
pub use status::PluginStatus;

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{Key, KeyCatalog};
use crate::keyring::{
    parse_expiry, EditOp, ImportSummary, KeyEngine, KeyGenParams, SignatureVerification,
    TrustSigLevel, Validity,
};
use crate::trust::{TrustCode, TrustEvaluator, TrustVerdict};
use error::OrRecord;
use prefs::DefaultKeyGuard;

/// Keys keyed by primary key id
pub type KeyMap = BTreeMap<String, Key>;

/// Outcome of a key edit
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EditResult {
    pub error: bool,
    pub result: String,
}

impl EditResult {
    fn ok(result: &str) -> Self {
        Self {
            error: false,
            result: result.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Encrypted {
    pub error: bool,
    /// Armored message
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Decrypted {
    pub error: bool,
    pub data: String,
    pub signatures: Vec<SignatureVerification>,
}

/// Host facade over a key engine
pub struct DomainKeyApi<E: ?Sized> {
    engine: Arc<E>,
    /// Held across the default-key swap of a signing call
    sign_lock: Mutex<()>,
}

fn host_index(method: &str, what: &str, value: i64) -> ApiResult<usize> {
    usize::try_from(value)
        .map_err(|_| ErrorRecord::invalid(method, format!("{} index {} out of range", what, value)))
}

impl<E: KeyEngine + ?Sized + 'static> DomainKeyApi<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            sign_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &E {
        self.engine.as_ref()
    }

    /// Crate version
    pub fn version(&self) -> &'static str {
        crate::VERSION
    }

    pub fn status(&self) -> PluginStatus {
        PluginStatus::probe(self.engine.as_ref())
    }

    /// Keys matching `pattern`, keyed by key id
    pub fn key_list(&self, pattern: &str, secret_only: bool) -> ApiResult<KeyMap> {
        let keys = KeyCatalog::new(self.engine.as_ref())
            .lookup(pattern, secret_only)
            .or_record("get_key_list")?;
        Ok(keys
            .into_iter()
            .map(|key| (key.key_id().to_string(), key))
            .collect())
    }

    pub fn public_key_list(&self) -> ApiResult<KeyMap> {
        self.key_list("", false)
    }

    pub fn private_key_list(&self) -> ApiResult<KeyMap> {
        self.key_list("", true)
    }

    pub fn domain_key(&self, domain: &str) -> ApiResult<KeyMap> {
        self.key_list(domain, false)
    }

    /// Integer trust verdict for a domain key; `uid_index` below zero means
    /// any user-ID named after the domain
    pub fn verify_domain_key(
        &self,
        domain: &str,
        fingerprint: &str,
        uid_index: i64,
        required_signer: &str,
    ) -> ApiResult<TrustCode> {
        self.verify_domain_key_verdict(domain, fingerprint, uid_index, required_signer)
            .map(|verdict| verdict.code())
    }

    pub fn verify_domain_key_verdict(
        &self,
        domain: &str,
        fingerprint: &str,
        uid_index: i64,
        required_signer: &str,
    ) -> ApiResult<TrustVerdict> {
        TrustEvaluator::new(self.engine.as_ref())
            .verify_domain_key(domain, fingerprint, uid_index.into(), required_signer)
            .or_record("verify_domain_key")
    }

    /// Encrypt to `recipient`, and to `sender` when given.
    ///
    /// Leaving `sender` out keeps the user anonymous until the host is validated.
    pub fn encrypt(
        &self,
        data: &[u8],
        recipient: &str,
        sender: Option<&str>,
        sign: bool,
    ) -> ApiResult<Encrypted> {
        let sender = sender.filter(|s| !s.is_empty());
        let armored = self
            .engine
            .encrypt(data, recipient, sender, sign)
            .or_record("gpg_encrypt")?;
        Ok(Encrypted {
            error: false,
            data: armored,
        })
    }

    pub fn decrypt(&self, data: &str) -> ApiResult<Decrypted> {
        let output = self.engine.decrypt_verify(data).or_record("gpg_decrypt")?;
        Ok(Decrypted {
            error: false,
            data: String::from_utf8_lossy(&output.plaintext).into_owned(),
            signatures: output.signatures,
        })
    }

    /// Certify user-ID `uid_index` of `key_id` with `with_key_id`.
    ///
    /// `trust_level` 1 (marginal) or 2 (full) makes it a trust signature.
    pub fn sign_uid(
        &self,
        key_id: &str,
        uid_index: i64,
        with_key_id: &str,
        local: bool,
        trust_level: Option<u8>,
    ) -> ApiResult<EditResult> {
        const METHOD: &str = "gpg_sign_uid";

        let uid_index = host_index(METHOD, "user-ID", uid_index)?;
        let trust = match trust_level {
            None => None,
            Some(level) => Some(TrustSigLevel::from_level(level).ok_or_else(|| {
                ErrorRecord::invalid(METHOD, format!("trust level {} is not 1 or 2", level))
            })?),
        };

        let _serial = self.sign_lock.lock();
        let _default_key = if with_key_id.is_empty() {
            None
        } else {
            Some(DefaultKeyGuard::set(self.engine.as_ref(), with_key_id).or_record(METHOD)?)
        };

        let op = EditOp::SignUid {
            uid_index,
            local,
            trust,
        };
        self.engine.edit_key(key_id, &op).or_record(METHOD)?;
        info!(key_id, uid_index, signer = with_key_id, local, "Signed user-ID");
        Ok(EditResult::ok("success"))
    }

    pub fn enable_key(&self, key_id: &str) -> ApiResult<EditResult> {
        self.engine
            .edit_key(key_id, &EditOp::Enable)
            .or_record("gpg_enable_key")?;
        Ok(EditResult::ok("key enabled"))
    }

    pub fn disable_key(&self, key_id: &str) -> ApiResult<EditResult> {
        self.engine
            .edit_key(key_id, &EditOp::Disable)
            .or_record("gpg_disable_key")?;
        Ok(EditResult::ok("key disabled"))
    }

    pub fn delete_uid_signature(
        &self,
        key_id: &str,
        uid_index: i64,
        sig_index: i64,
    ) -> ApiResult<EditResult> {
        const METHOD: &str = "gpg_delete_uid_sign";

        let op = EditOp::DeleteSignature {
            uid_index: host_index(METHOD, "user-ID", uid_index)?,
            sig_index: host_index(METHOD, "signature", sig_index)?,
        };
        self.engine.edit_key(key_id, &op).or_record(METHOD)?;
        Ok(EditResult::ok("signature deleted"))
    }

    pub fn set_owner_trust(&self, key_id: &str, trust: Validity) -> ApiResult<EditResult> {
        self.engine
            .edit_key(key_id, &EditOp::SetOwnerTrust(trust))
            .or_record("gpg_set_owner_trust")?;
        Ok(EditResult::ok("owner trust set"))
    }

    pub fn import_key(&self, armored: &str) -> ApiResult<ImportSummary> {
        let summary = self.engine.import_keys(armored).or_record("gpg_import_key")?;
        debug!(
            considered = summary.considered,
            imported = summary.imported,
            "Import finished"
        );
        Ok(summary)
    }

    pub fn export_key(&self, key_id: &str, include_secret: bool) -> ApiResult<String> {
        self.engine
            .export_key(key_id, include_secret)
            .or_record("gpg_export_key")
    }

    /// Validate `params` and start generating on the blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn gen_key(&self, params: KeyGenParams) -> ApiResult<KeyGenTask> {
        const METHOD: &str = "gpg_gen_key";

        if params.name_real.trim().is_empty() {
            return Err(ErrorRecord::invalid(METHOD, "name_real must not be empty"));
        }
        parse_expiry(&params.expire_date, chrono::Utc::now().timestamp()).or_record(METHOD)?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ErrorRecord::new(
                METHOD,
                crate::keyring::EngineError::Unavailable(String::new()).code(),
                "key generation needs a tokio runtime",
            ));
        }

        info!(name = %params.name_real, "Key generation queued");
        Ok(keygen::spawn(self.engine.clone(), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::{EngineError, SledKeyring, DEFAULT_KEY};

    struct Fixture {
        api: DomainKeyApi<SledKeyring>,
        domain_fpr: String,
        signer_fpr: String,
        signer_id: String,
    }

    fn generate(keyring: &SledKeyring, name: &str) -> String {
        let params = KeyGenParams {
            name_real: name.into(),
            ..Default::default()
        };
        keyring.generate_key(&params, &mut |_| {}).unwrap()
    }

    fn fixture() -> Fixture {
        let keyring = SledKeyring::in_memory().unwrap();
        let domain_fpr = generate(&keyring, "example.com");
        let signer_fpr = generate(&keyring, "Trust Root");
        let signer_id = signer_fpr[24..].to_string();
        Fixture {
            api: DomainKeyApi::new(Arc::new(keyring)),
            domain_fpr,
            signer_fpr,
            signer_id,
        }
    }

    #[test]
    fn test_listings_keyed_by_key_id() {
        let f = fixture();
        let public = f.api.public_key_list().unwrap();
        assert_eq!(public.len(), 2);
        assert!(public.contains_key(&f.signer_id));
        assert_eq!(public[&f.signer_id].fingerprint, f.signer_fpr);

        let private = f.api.private_key_list().unwrap();
        assert!(private.keys().all(|id| public.contains_key(id)));

        let domain = f.api.domain_key("example.com").unwrap();
        assert_eq!(domain.len(), 1);
        assert_eq!(domain.values().next().unwrap().fingerprint, f.domain_fpr);
    }

    #[test]
    fn test_sign_then_verify() {
        let f = fixture();
        // Keep the domain key's own self-certification from vouching for it
        f.api.set_owner_trust(&f.domain_fpr, Validity::Never).unwrap();
        assert_eq!(
            f.api
                .verify_domain_key("example.com", &f.domain_fpr, 0, &f.signer_id)
                .unwrap(),
            TrustCode::Untrusted
        );

        f.api
            .sign_uid(&f.domain_fpr, 0, &f.signer_id, false, None)
            .unwrap();
        assert_eq!(
            f.api
                .verify_domain_key("example.com", &f.domain_fpr, 0, &f.signer_id)
                .unwrap(),
            TrustCode::UidSignedUltimate
        );
        // The preference was unset before and is unset again
        assert_eq!(f.api.engine().config_value(DEFAULT_KEY).unwrap(), None);
    }

    #[test]
    fn test_sign_twice_is_already_signed() {
        let f = fixture();
        f.api.sign_uid(&f.domain_fpr, 0, &f.signer_id, true, Some(2)).unwrap();

        let record = f
            .api
            .sign_uid(&f.domain_fpr, 0, &f.signer_id, true, Some(2))
            .unwrap_err();
        assert_eq!(record.method, "gpg_sign_uid");
        assert_eq!(record.code, EngineError::AlreadySigned.code());
        assert_eq!(
            record.message,
            "The selected UID has already been signed with this key."
        );
        assert!(record.file.ends_with("mod.rs"));
    }

    #[test]
    fn test_sign_restores_existing_default_key() {
        let f = fixture();
        let engine = f.api.engine();
        engine
            .set_config_value(DEFAULT_KEY, Some(&f.domain_fpr))
            .unwrap();

        f.api.sign_uid(&f.domain_fpr, 0, &f.signer_id, false, None).unwrap();
        assert_eq!(
            engine.config_value(DEFAULT_KEY).unwrap().as_deref(),
            Some(f.domain_fpr.as_str())
        );
    }

    #[test]
    fn test_invalid_host_arguments() {
        let f = fixture();
        let record = f
            .api
            .sign_uid(&f.domain_fpr, -1, &f.signer_id, false, None)
            .unwrap_err();
        assert_eq!(record.code, EngineError::InvalidValue(String::new()).code());

        let record = f
            .api
            .sign_uid(&f.domain_fpr, 0, &f.signer_id, false, Some(7))
            .unwrap_err();
        assert!(record.message.contains("trust level"));
        assert_eq!(f.api.engine().config_value(DEFAULT_KEY).unwrap(), None);
    }

    #[test]
    fn test_disable_enable_and_delete_signature() {
        let f = fixture();
        f.api.sign_uid(&f.domain_fpr, 0, &f.signer_id, false, None).unwrap();
        f.api.set_owner_trust(&f.domain_fpr, Validity::Never).unwrap();

        f.api.disable_key(&f.domain_fpr).unwrap();
        let code = f
            .api
            .verify_domain_key("example.com", &f.domain_fpr, 0, &f.signer_id)
            .unwrap();
        assert_eq!(code, TrustCode::KeyUnusable);

        assert_eq!(f.api.enable_key(&f.domain_fpr).unwrap().result, "key enabled");
        let code = f
            .api
            .verify_domain_key("example.com", &f.domain_fpr, -1, &f.signer_id)
            .unwrap();
        assert_eq!(code, TrustCode::UidSignedUltimate);

        // Index 0 is the self-certification
        f.api.delete_uid_signature(&f.domain_fpr, 0, 1).unwrap();
        let code = f
            .api
            .verify_domain_key("example.com", &f.domain_fpr, 0, &f.signer_id)
            .unwrap();
        assert_eq!(code, TrustCode::Untrusted);

        let record = f.api.delete_uid_signature(&f.domain_fpr, 0, 5).unwrap_err();
        assert_eq!(record.method, "gpg_delete_uid_sign");
    }

    #[test]
    fn test_encrypt_decrypt_with_signature() {
        let f = fixture();
        f.api
            .engine()
            .set_config_value(DEFAULT_KEY, Some(&f.signer_id))
            .unwrap();

        let encrypted = f
            .api
            .encrypt(b"challenge 42", &f.domain_fpr, Some(""), true)
            .unwrap();
        assert!(!encrypted.error);

        let decrypted = f.api.decrypt(&encrypted.data).unwrap();
        assert_eq!(decrypted.data, "challenge 42");
        assert_eq!(decrypted.signatures.len(), 1);
        assert_eq!(decrypted.signatures[0].fingerprint, f.signer_fpr);

        let record = f.api.decrypt("not a message").unwrap_err();
        assert_eq!(record.method, "gpg_decrypt");
        assert_eq!(record.code, EngineError::BadData(String::new()).code());
    }

    #[test]
    fn test_encrypt_to_unknown_recipient() {
        let f = fixture();
        let record = f
            .api
            .encrypt(b"data", "0000000000000000", None, false)
            .unwrap_err();
        assert_eq!(record.code, EngineError::InvalidRecipient(String::new()).code());
    }

    #[test]
    fn test_export_import_between_keyrings() {
        let f = fixture();
        let armored = f.api.export_key(&f.signer_fpr, false).unwrap();

        let other = DomainKeyApi::new(Arc::new(SledKeyring::in_memory().unwrap()));
        let summary = other.import_key(&armored).unwrap();
        assert_eq!(summary.considered, 1);
        assert_eq!(summary.imported, 1);
        assert!(other.public_key_list().unwrap().contains_key(&f.signer_id));
        assert!(other.private_key_list().unwrap().is_empty());
    }

    #[test]
    fn test_status_and_version() {
        let f = fixture();
        let status = f.api.status();
        assert!(status.engine_valid);
        assert_eq!(f.api.version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_gen_key_needs_runtime() {
        let f = fixture();
        let params = KeyGenParams {
            name_real: "example.org".into(),
            ..Default::default()
        };
        let record = f.api.gen_key(params).unwrap_err();
        assert!(record.message.contains("runtime"));
    }

    #[tokio::test]
    async fn test_gen_key_queues_and_completes() {
        let f = fixture();
        let params = KeyGenParams {
            name_real: "example.org".into(),
            expire_date: "1y".into(),
            ..Default::default()
        };
        let task = f.api.gen_key(params).unwrap();
        assert_eq!(task.status(), QUEUED);

        let report = task.wait().await;
        assert!(!report.progress.is_empty());
        let fingerprint = report.outcome.unwrap();
        assert_eq!(f.api.domain_key("example.org").unwrap().len(), 1);
        assert!(f.api.private_key_list().unwrap().values().any(|k| k.fingerprint == fingerprint));
    }

    #[tokio::test]
    async fn test_gen_key_rejects_bad_params_up_front() {
        let f = fixture();
        let record = f.api.gen_key(KeyGenParams::default()).unwrap_err();
        assert_eq!(record.method, "gpg_gen_key");

        let params = KeyGenParams {
            name_real: "example.org".into(),
            expire_date: "2001-01-01".into(),
            ..Default::default()
        };
        assert!(f.api.gen_key(params).is_err());
    }
}
