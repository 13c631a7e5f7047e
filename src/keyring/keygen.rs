// keyring/keygen.rs - Key Pair Generation

use chrono::{NaiveDate, NaiveTime};

use super::engine::{EngineError, KeyGenParams, KeyGenProgress};
use super::material::SecretBundle;
use super::stored::{Certification, KeyAlgorithm, KeyMaterial, StoredSubkey, StoredUid};

const DAY: i64 = 86_400;

/// Progress stage reported for key material generation
const PRIMEGEN: &str = "primegen";

/// Resolved, validated generation request
#[derive(Debug)]
pub(crate) struct GenerationPlan {
    pub uid: StoredUid,
    pub with_subkey: bool,
    pub expires: i64,
    pub passphrase: Option<String>,
}

impl GenerationPlan {
    pub fn from_params(params: &KeyGenParams, now: i64) -> Result<Self, EngineError> {
        check_algorithm(&params.key_type, &["ed25519", "eddsa"])?;
        check_length(&params.key_length)?;

        let with_subkey = match params.subkey_type.trim().to_ascii_lowercase().as_str() {
            "none" => false,
            _ => {
                check_algorithm(&params.subkey_type, &["x25519", "cv25519", "ecdh"])?;
                true
            }
        };
        check_length(&params.subkey_length)?;

        if params.name_real.trim().is_empty() {
            return Err(EngineError::InvalidValue("name_real must not be empty".into()));
        }

        Ok(Self {
            uid: StoredUid::new(&params.name_real, &params.name_comment, &params.name_email),
            with_subkey,
            expires: parse_expiry(&params.expire_date, now)?,
            passphrase: (!params.passphrase.is_empty()).then(|| params.passphrase.clone()),
        })
    }

    /// Generate the secret and the self-certified public material
    pub fn generate(
        self,
        now: i64,
        progress: &mut dyn FnMut(KeyGenProgress),
    ) -> (KeyMaterial, SecretBundle, Option<String>) {
        let total = if self.with_subkey { 2 } else { 1 };
        let mut report = |tag: char, current: u32| {
            progress(KeyGenProgress {
                what: PRIMEGEN.into(),
                tag,
                current,
                total,
            })
        };

        report('.', 0);
        let secret = SecretBundle::generate(self.with_subkey);
        report('+', 1);

        let primary = StoredSubkey {
            algorithm: KeyAlgorithm::Ed25519,
            public: secret.signing_public(),
            created: now,
            expires: self.expires,
            binding: None,
        };
        let fingerprint = primary.fingerprint();

        let mut uid = self.uid;
        let text = uid.text();
        uid.certifications.push(Certification::issue(
            &fingerprint,
            &text,
            &fingerprint,
            &secret,
            now,
            true,
            None,
        ));
        report('^', 1);

        let mut subkeys = Vec::new();
        if let Some(public) = secret.encryption_public() {
            report('.', 1);
            let mut subkey = StoredSubkey {
                algorithm: KeyAlgorithm::X25519,
                public,
                created: now,
                expires: self.expires,
                binding: None,
            };
            subkey.bind(&fingerprint, &secret, now);
            subkeys.push(subkey);
            report('+', 2);
            report('!', 2);
        }
        report('<', total);
        report('>', total);

        let material = KeyMaterial {
            primary,
            subkeys,
            uids: vec![uid],
            revocation: None,
        };
        (material, secret, self.passphrase)
    }
}

fn check_algorithm(name: &str, accepted: &[&str]) -> Result<(), EngineError> {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() || name == "default" || accepted.contains(&name.as_str()) {
        Ok(())
    } else {
        Err(EngineError::UnsupportedAlgorithm(name))
    }
}

fn check_length(length: &str) -> Result<(), EngineError> {
    let length = length.trim();
    if length.is_empty() || length.parse::<u32>().is_ok() {
        Ok(())
    } else {
        Err(EngineError::InvalidValue(format!("key length '{}'", length)))
    }
}

/// Parse an expiry specification into an absolute timestamp (0 = never).
///
/// Accepts `0` or empty, an ISO date `YYYY-MM-DD`, or `<n>` followed by an
/// optional unit `d`, `w`, `m` or `y` (days when omitted).
pub fn parse_expiry(spec: &str, now: i64) -> Result<i64, EngineError> {
    let spec = spec.trim();
    if spec.is_empty() || spec == "0" {
        return Ok(0);
    }

    if let Ok(date) = NaiveDate::parse_from_str(spec, "%Y-%m-%d") {
        let expires = date.and_time(NaiveTime::MIN).and_utc().timestamp();
        if expires <= now {
            return Err(EngineError::InvalidValue(format!("expiry '{}' is in the past", spec)));
        }
        return Ok(expires);
    }

    let lower = spec.to_ascii_lowercase();
    let (digits, unit) = match lower.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&lower[..i], c),
        _ => (lower.as_str(), 'd'),
    };
    let count: i64 = digits
        .parse()
        .map_err(|_| EngineError::InvalidValue(format!("expiry '{}'", spec)))?;
    let days = match unit {
        'd' => 1,
        'w' => 7,
        'm' => 30,
        'y' => 365,
        _ => return Err(EngineError::InvalidValue(format!("expiry unit '{}'", unit))),
    };
    if count == 0 {
        return Ok(0);
    }
    count
        .checked_mul(days * DAY)
        .and_then(|span| now.checked_add(span))
        .filter(|_| count > 0)
        .ok_or_else(|| EngineError::InvalidValue(format!("expiry '{}'", spec)))
}
