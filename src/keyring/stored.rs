// keyring/stored.rs - Persistent Key Layout and Signed Statements

//! What a [`SledKeyring`](super::SledKeyring) keeps per key.
//!
//! Every statement a key makes (user-ID certification, subkey binding,
//! revocation) is an Ed25519 signature by the issuing primary key over a
//! SHA-256 digest of the statement's fields.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::fingerprint::{Fingerprint, KeyId};
use super::material::{verify_signature, SecretBundle};
use super::model::Validity;

/// Reported length of a Curve25519 key
const CURVE25519_BITS: u32 = 255;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum KeyAlgorithm {
    /// Certify and sign
    Ed25519,
    /// Encrypt
    X25519,
}

impl KeyAlgorithm {
    pub fn bits(&self) -> u32 {
        CURVE25519_BITS
    }
}

/// Creation time plus signature, used for bindings and revocations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SignedStamp {
    pub created: i64,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredSubkey {
    pub algorithm: KeyAlgorithm,
    pub public: [u8; 32],
    pub created: i64,
    /// 0 means never
    pub expires: i64,
    /// Signature of the primary key over the subkey; `None` on the primary
    pub binding: Option<SignedStamp>,
}

impl StoredSubkey {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.public, self.created)
    }

    pub fn key_id(&self) -> KeyId {
        self.fingerprint().key_id()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        is_past(self.expires, now)
    }

    fn binding_digest(&self, primary: &Fingerprint) -> [u8; 32] {
        statement_digest(
            b"bind",
            &[
                primary.as_bytes(),
                &self.public,
                &self.created.to_be_bytes(),
                &self.expires.to_be_bytes(),
            ],
        )
    }

    /// Bind this subkey to `primary` with the primary's secret
    pub fn bind(&mut self, primary: &Fingerprint, secret: &SecretBundle, now: i64) {
        let signature = secret.sign(&self.binding_digest(primary));
        self.binding = Some(SignedStamp {
            created: now,
            signature,
        });
    }

    pub fn binding_is_valid(&self, primary: &Fingerprint, primary_public: &[u8; 32]) -> bool {
        match &self.binding {
            Some(stamp) => verify_signature(
                primary_public,
                &self.binding_digest(primary),
                &stamp.signature,
            ),
            None => false,
        }
    }
}

/// A signature by some key over one user-ID of a target key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Certification {
    pub signer: Fingerprint,
    pub created: i64,
    /// 0 means never
    pub expires: i64,
    /// Local certifications are never exported
    pub exportable: bool,
    pub trust_amount: Option<u8>,
    pub signature: Vec<u8>,
    pub revocation: Option<SignedStamp>,
}

impl Certification {
    /// Certify `uid` of `target` with the signer's secret
    pub fn issue(
        target: &Fingerprint,
        uid: &str,
        signer: &Fingerprint,
        secret: &SecretBundle,
        created: i64,
        exportable: bool,
        trust_amount: Option<u8>,
    ) -> Self {
        let mut cert = Certification {
            signer: *signer,
            created,
            expires: 0,
            exportable,
            trust_amount,
            signature: Vec::new(),
            revocation: None,
        };
        cert.signature = secret.sign(&cert.digest(target, uid));
        cert
    }

    fn digest(&self, target: &Fingerprint, uid: &str) -> [u8; 32] {
        statement_digest(
            b"certify",
            &[
                target.as_bytes(),
                uid.as_bytes(),
                self.signer.as_bytes(),
                &self.created.to_be_bytes(),
                &self.expires.to_be_bytes(),
                &[u8::from(self.exportable), self.trust_amount.unwrap_or(0)],
            ],
        )
    }

    pub fn verify(&self, target: &Fingerprint, uid: &str, signer_public: &[u8; 32]) -> bool {
        verify_signature(signer_public, &self.digest(target, uid), &self.signature)
    }

    pub fn revoke(&mut self, target: &Fingerprint, uid: &str, secret: &SecretBundle, now: i64) {
        let subject = self.digest(target, uid);
        self.revocation = Some(SignedStamp {
            created: now,
            signature: secret.sign(&revocation_digest(&subject, now)),
        });
    }

    /// A revocation only counts when the original signer issued it
    pub fn is_revoked(&self, target: &Fingerprint, uid: &str, signer_public: &[u8; 32]) -> bool {
        match &self.revocation {
            Some(stamp) => verify_signature(
                signer_public,
                &revocation_digest(&self.digest(target, uid), stamp.created),
                &stamp.signature,
            ),
            None => false,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        is_past(self.expires, now)
    }
}

/// Signature over a message body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MessageSignature {
    pub signer: Fingerprint,
    pub created: i64,
    pub signature: Vec<u8>,
}

impl MessageSignature {
    pub fn issue(signer: &Fingerprint, secret: &SecretBundle, body: &[u8], created: i64) -> Self {
        let digest = Self::digest(signer, body, created);
        Self {
            signer: *signer,
            created,
            signature: secret.sign(&digest),
        }
    }

    fn digest(signer: &Fingerprint, body: &[u8], created: i64) -> [u8; 32] {
        statement_digest(
            b"message",
            &[signer.as_bytes(), &created.to_be_bytes(), body],
        )
    }

    pub fn verify(&self, body: &[u8], signer_public: &[u8; 32]) -> bool {
        verify_signature(
            signer_public,
            &Self::digest(&self.signer, body, self.created),
            &self.signature,
        )
    }
}

/// Plaintext as sealed inside an envelope
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SignedMessage {
    pub body: Vec<u8>,
    pub signatures: Vec<MessageSignature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredUid {
    pub name: String,
    pub email: Option<String>,
    pub comment: Option<String>,
    pub certifications: Vec<Certification>,
    pub revocation: Option<SignedStamp>,
}

impl StoredUid {
    pub fn new(name: &str, comment: &str, email: &str) -> Self {
        let optional = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        Self {
            name: name.trim().to_string(),
            email: optional(email),
            comment: optional(comment),
            certifications: Vec::new(),
            revocation: None,
        }
    }

    /// `Name (Comment) <email>`
    pub fn text(&self) -> String {
        let mut text = self.name.clone();
        if let Some(comment) = &self.comment {
            text.push_str(&format!(" ({})", comment));
        }
        if let Some(email) = &self.email {
            text.push_str(&format!(" <{}>", email));
        }
        text
    }

    fn revocation_subject(&self, target: &Fingerprint) -> [u8; 32] {
        statement_digest(b"uid", &[target.as_bytes(), self.text().as_bytes()])
    }

    pub fn revoke(&mut self, target: &Fingerprint, secret: &SecretBundle, now: i64) {
        let subject = self.revocation_subject(target);
        self.revocation = Some(SignedStamp {
            created: now,
            signature: secret.sign(&revocation_digest(&subject, now)),
        });
    }

    pub fn is_revoked(&self, target: &Fingerprint, owner_public: &[u8; 32]) -> bool {
        match &self.revocation {
            Some(stamp) => verify_signature(
                owner_public,
                &revocation_digest(&self.revocation_subject(target), stamp.created),
                &stamp.signature,
            ),
            None => false,
        }
    }
}

/// Public, transferable part of a key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KeyMaterial {
    pub primary: StoredSubkey,
    pub subkeys: Vec<StoredSubkey>,
    pub uids: Vec<StoredUid>,
    pub revocation: Option<SignedStamp>,
}

impl KeyMaterial {
    pub fn fingerprint(&self) -> Fingerprint {
        self.primary.fingerprint()
    }

    pub fn key_id(&self) -> KeyId {
        self.primary.key_id()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.primary.is_expired(now)
    }

    pub fn revoke(&mut self, secret: &SecretBundle, now: i64) {
        let subject = statement_digest(b"key", &[self.fingerprint().as_bytes()]);
        self.revocation = Some(SignedStamp {
            created: now,
            signature: secret.sign(&revocation_digest(&subject, now)),
        });
    }

    pub fn is_revoked(&self) -> bool {
        match &self.revocation {
            Some(stamp) => {
                let subject = statement_digest(b"key", &[self.fingerprint().as_bytes()]);
                verify_signature(
                    &self.primary.public,
                    &revocation_digest(&subject, stamp.created),
                    &stamp.signature,
                )
            }
            None => false,
        }
    }

    /// Whether some user-ID carries a good self-certification
    pub fn has_valid_self_certification(&self) -> bool {
        let fingerprint = self.fingerprint();
        self.uids.iter().any(|uid| {
            let text = uid.text();
            uid.certifications.iter().any(|cert| {
                cert.signer == fingerprint && cert.verify(&fingerprint, &text, &self.primary.public)
            })
        })
    }

    /// First bound, unexpired encryption subkey
    pub fn encryption_subkey(&self, now: i64) -> Option<&StoredSubkey> {
        let fingerprint = self.fingerprint();
        self.subkeys.iter().find(|sk| {
            sk.algorithm == KeyAlgorithm::X25519
                && !sk.is_expired(now)
                && sk.binding_is_valid(&fingerprint, &self.primary.public)
        })
    }

    /// Whether `id` (key id or fingerprint, any length accepted by
    /// [`key_ids_match`](super::fingerprint::key_ids_match)) names this key
    pub fn matches_id(&self, id: &str) -> bool {
        std::iter::once(&self.primary)
            .chain(self.subkeys.iter())
            .any(|sk| super::fingerprint::key_ids_match(id, &sk.fingerprint().to_hex()))
    }

    /// Case-insensitive match on any user-ID text
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.uids
            .iter()
            .any(|uid| uid.text().to_lowercase().contains(&needle))
    }

    /// Copy without local certifications, for export
    pub fn exportable(&self) -> KeyMaterial {
        let mut material = self.clone();
        for uid in &mut material.uids {
            uid.certifications.retain(|cert| cert.exportable);
        }
        material
    }
}

/// A key as persisted in the keyring
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredKey {
    pub material: KeyMaterial,
    pub owner_trust: Validity,
    pub disabled: bool,
}

impl StoredKey {
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            material,
            owner_trust: Validity::Unknown,
            disabled: false,
        }
    }

    /// Not disabled, revoked or expired
    pub fn is_usable(&self, now: i64) -> bool {
        !self.disabled && !self.material.is_expired(now) && !self.material.is_revoked()
    }
}

fn is_past(expires: i64, now: i64) -> bool {
    expires != 0 && expires <= now
}

fn revocation_digest(subject: &[u8; 32], created: i64) -> [u8; 32] {
    statement_digest(b"revoke", &[subject, &created.to_be_bytes()])
}

/// Domain-separated, length-prefixed SHA-256 over statement fields
fn statement_digest(kind: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"domainkey-statement");
    hasher.update(kind);
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(secret: &SecretBundle, name: &str) -> KeyMaterial {
        let primary = StoredSubkey {
            algorithm: KeyAlgorithm::Ed25519,
            public: secret.signing_public(),
            created: 1_000,
            expires: 0,
            binding: None,
        };
        let fingerprint = primary.fingerprint();
        let mut uid = StoredUid::new(name, "", "");
        uid.certifications.push(Certification::issue(
            &fingerprint,
            &uid.text(),
            &fingerprint,
            secret,
            1_000,
            true,
            None,
        ));
        KeyMaterial {
            primary,
            subkeys: Vec::new(),
            uids: vec![uid],
            revocation: None,
        }
    }

    #[test]
    fn test_uid_text() {
        assert_eq!(StoredUid::new("example.com", "", "").text(), "example.com");
        assert_eq!(
            StoredUid::new("Alice", "work", "alice@example.com").text(),
            "Alice (work) <alice@example.com>"
        );
    }

    #[test]
    fn test_self_certification_verifies() {
        let secret = SecretBundle::generate(false);
        let material = material(&secret, "example.com");
        assert!(material.has_valid_self_certification());

        // Tampering with the user-ID breaks the certification
        let mut tampered = material.clone();
        tampered.uids[0].name = "evil.com".into();
        assert!(!tampered.has_valid_self_certification());
    }

    #[test]
    fn test_revocation_requires_issuer() {
        let owner = SecretBundle::generate(false);
        let stranger = SecretBundle::generate(false);
        let mut material = material(&owner, "example.com");
        let fingerprint = material.fingerprint();

        material.revoke(&stranger, 2_000);
        assert!(!material.is_revoked());
        material.revoke(&owner, 2_000);
        assert!(material.is_revoked());

        let uid = &mut material.uids[0];
        uid.revoke(&fingerprint, &owner, 2_000);
        assert!(uid.is_revoked(&fingerprint, &owner.signing_public()));
    }

    #[test]
    fn test_subkey_binding_and_lookup() {
        let secret = SecretBundle::generate(true);
        let mut material = material(&secret, "example.com");
        let fingerprint = material.fingerprint();

        let mut subkey = StoredSubkey {
            algorithm: KeyAlgorithm::X25519,
            public: secret.encryption_public().unwrap(),
            created: 1_000,
            expires: 0,
            binding: None,
        };
        subkey.bind(&fingerprint, &secret, 1_000);
        let sub_fpr = subkey.fingerprint().to_hex();
        material.subkeys.push(subkey);

        assert!(material.encryption_subkey(5_000).is_some());
        assert!(material.matches_id(&sub_fpr));
        assert!(material.matches_id(&fingerprint.key_id().to_hex()));
        assert!(material.matches_text("EXAMPLE"));
        assert!(!material.matches_text("example.org"));
    }

    #[test]
    fn test_export_drops_local_certifications() {
        let secret = SecretBundle::generate(false);
        let mut material = material(&secret, "example.com");
        let fingerprint = material.fingerprint();
        let text = material.uids[0].text();
        material.uids[0].certifications.push(Certification::issue(
            &fingerprint,
            &text,
            &fingerprint,
            &secret,
            1_500,
            false,
            None,
        ));

        assert_eq!(material.uids[0].certifications.len(), 2);
        assert_eq!(material.exportable().uids[0].certifications.len(), 1);
    }
}
