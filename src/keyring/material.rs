// keyring/material.rs - Key Material, Passphrase Sealing and Message Envelopes

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

use super::fingerprint::KeyId;

/// Iteration count for passphrase key derivation
const S2K_ITERATIONS: u32 = 65_536;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaterialError {
    #[error("Bad passphrase")]
    BadPassphrase,

    #[error("Passphrase required")]
    PassphraseRequired,

    #[error("Malformed key material: {0}")]
    Malformed(String),

    #[error("Encryption failed")]
    SealFailed,

    #[error("Decryption failed")]
    OpenFailed,
}

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Secret halves of a key: Ed25519 signing key plus optional X25519 encryption key
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct SecretBundle {
    pub signing: [u8; 32],
    pub encryption: Option<[u8; 32]>,
}

impl SecretBundle {
    pub fn generate(with_encryption: bool) -> Self {
        Self {
            signing: random_bytes(),
            encryption: with_encryption.then(random_bytes::<32>),
        }
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.signing)
    }

    pub fn signing_public(&self) -> [u8; 32] {
        self.signing_key().verifying_key().to_bytes()
    }

    pub fn encryption_public(&self) -> Option<[u8; 32]> {
        self.encryption
            .map(|secret| PublicKey::from(&StaticSecret::from(secret)).to_bytes())
    }

    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        self.signing_key().sign(data).to_bytes().to_vec()
    }
}

impl fmt::Debug for SecretBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBundle")
            .field("encryption", &self.encryption.is_some())
            .finish_non_exhaustive()
    }
}

/// Secret material at rest, optionally protected by a passphrase
#[derive(Clone, Serialize, Deserialize)]
pub(crate) enum SealedSecret {
    Clear(SecretBundle),
    Protected {
        salt: [u8; 16],
        iterations: u32,
        nonce: [u8; 24],
        ciphertext: Vec<u8>,
    },
}

impl SealedSecret {
    /// Seal a bundle; an empty or missing passphrase stores it in the clear
    pub fn seal(bundle: &SecretBundle, passphrase: Option<&str>) -> Result<Self, MaterialError> {
        let passphrase = match passphrase {
            Some(p) if !p.is_empty() => p,
            _ => return Ok(SealedSecret::Clear(bundle.clone())),
        };

        let salt = random_bytes::<16>();
        let nonce = random_bytes::<24>();
        let key = derive_key(passphrase, &salt, S2K_ITERATIONS);
        let plaintext = bincode::serde::encode_to_vec(bundle, bincode::config::standard())
            .map_err(|e| MaterialError::Malformed(e.to_string()))?;

        let ciphertext = XChaCha20Poly1305::new(Key::from_slice(&key))
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| MaterialError::SealFailed)?;

        Ok(SealedSecret::Protected {
            salt,
            iterations: S2K_ITERATIONS,
            nonce,
            ciphertext,
        })
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, SealedSecret::Protected { .. })
    }

    /// Recover the bundle
    pub fn open(&self, passphrase: Option<&str>) -> Result<SecretBundle, MaterialError> {
        match self {
            SealedSecret::Clear(bundle) => Ok(bundle.clone()),
            SealedSecret::Protected {
                salt,
                iterations,
                nonce,
                ciphertext,
            } => {
                let passphrase = passphrase.ok_or(MaterialError::PassphraseRequired)?;
                let key = derive_key(passphrase, salt, *iterations);
                let plaintext = XChaCha20Poly1305::new(Key::from_slice(&key))
                    .decrypt(XNonce::from_slice(nonce), ciphertext.as_ref())
                    .map_err(|_| MaterialError::BadPassphrase)?;
                let (bundle, _) =
                    bincode::serde::decode_from_slice(&plaintext, bincode::config::standard())
                        .map_err(|e| MaterialError::Malformed(e.to_string()))?;
                Ok(bundle)
            }
        }
    }
}

/// Salted, iterated SHA-256
fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(passphrase.as_bytes())
        .finalize()
        .into();
    for _ in 1..iterations.max(1) {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .chain_update(passphrase.as_bytes())
            .finalize()
            .into();
    }
    digest
}

/// Check an Ed25519 signature
pub(crate) fn verify_signature(public: &[u8; 32], data: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public) else {
        return false;
    };
    let Ok(bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    verifying_key
        .verify(data, &Signature::from_bytes(&bytes))
        .is_ok()
}

/// Content key wrapped for one recipient subkey
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct WrappedKey {
    pub recipient: KeyId,
    ephemeral: [u8; 32],
    nonce: [u8; 24],
    wrapped: Vec<u8>,
}

/// Encrypted message: one content key, wrapped per recipient
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub recipients: Vec<WrappedKey>,
    nonce: [u8; 24],
    body: Vec<u8>,
}

/// Encrypt `plaintext` to each `(subkey id, X25519 public key)`
pub(crate) fn seal_message(
    plaintext: &[u8],
    recipients: &[(KeyId, [u8; 32])],
) -> Result<Envelope, MaterialError> {
    let content_key = random_bytes::<32>();
    let nonce = random_bytes::<24>();
    let body = XChaCha20Poly1305::new(Key::from_slice(&content_key))
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| MaterialError::SealFailed)?;

    let mut wrapped_keys = Vec::with_capacity(recipients.len());
    for (recipient, public) in recipients {
        let ephemeral_secret = StaticSecret::from(random_bytes::<32>());
        let ephemeral_public = PublicKey::from(&ephemeral_secret).to_bytes();
        let shared = ephemeral_secret.diffie_hellman(&PublicKey::from(*public));
        let wrap_key = derive_wrap_key(shared.as_bytes(), &ephemeral_public, public);

        let wrap_nonce = random_bytes::<24>();
        let wrapped = XChaCha20Poly1305::new(Key::from_slice(&wrap_key))
            .encrypt(XNonce::from_slice(&wrap_nonce), content_key.as_ref())
            .map_err(|_| MaterialError::SealFailed)?;

        wrapped_keys.push(WrappedKey {
            recipient: *recipient,
            ephemeral: ephemeral_public,
            nonce: wrap_nonce,
            wrapped,
        });
    }

    Ok(Envelope {
        recipients: wrapped_keys,
        nonce,
        body,
    })
}

/// Decrypt an envelope with the secret X25519 key of `entry.recipient`
pub(crate) fn open_message(
    envelope: &Envelope,
    entry: &WrappedKey,
    secret: &[u8; 32],
) -> Result<Vec<u8>, MaterialError> {
    let static_secret = StaticSecret::from(*secret);
    let own_public = PublicKey::from(&static_secret).to_bytes();
    let shared = static_secret.diffie_hellman(&PublicKey::from(entry.ephemeral));
    let wrap_key = derive_wrap_key(shared.as_bytes(), &entry.ephemeral, &own_public);

    let content_key = XChaCha20Poly1305::new(Key::from_slice(&wrap_key))
        .decrypt(XNonce::from_slice(&entry.nonce), entry.wrapped.as_ref())
        .map_err(|_| MaterialError::OpenFailed)?;
    if content_key.len() != 32 {
        return Err(MaterialError::OpenFailed);
    }

    XChaCha20Poly1305::new(Key::from_slice(&content_key))
        .decrypt(XNonce::from_slice(&envelope.nonce), envelope.body.as_ref())
        .map_err(|_| MaterialError::OpenFailed)
}

fn derive_wrap_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    Sha256::new()
        .chain_update(b"domainkey-wrap")
        .chain_update(shared)
        .chain_update(ephemeral)
        .chain_update(recipient)
        .finalize()
        .into()
}
