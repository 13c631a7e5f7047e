// trust/evaluator.rs - Domain Key Trust Evaluation

//! Scores a domain key against a required signer.
//!
//! The direct pass looks for the required signer's signature on the domain
//! user-ID. When it finds nothing usable, the fallback pass tries two weaker
//! paths: a trusted third party vouching for the user-ID, and the required
//! signer having signed the key's primary user-ID. A signed primary user-ID
//! takes precedence over third-party vouching.

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use super::verdict::{BaseTrust, Downgrade, PathKind, TrustCode, TrustVerdict};
use crate::catalog::{CatalogError, Key, KeyCatalog, Signature, UserId};
use crate::keyring::{key_ids_match, KeySource, SigStatus, Validity};

/// Which user-IDs of the target key are examined
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UidSelector {
    /// Every user-ID named after the domain
    Any,
    /// Only the user-ID at this index
    Index(usize),
}

impl UidSelector {
    pub fn matches(&self, index: usize) -> bool {
        match self {
            UidSelector::Any => true,
            UidSelector::Index(i) => *i == index,
        }
    }
}

impl From<i64> for UidSelector {
    /// Negative indices (the host passes -1) select any user-ID
    fn from(index: i64) -> Self {
        usize::try_from(index)
            .map(UidSelector::Index)
            .unwrap_or(UidSelector::Any)
    }
}

fn base_trust(owner_trust: Validity) -> Option<BaseTrust> {
    match owner_trust {
        Validity::Ultimate => Some(BaseTrust::Ultimate),
        Validity::Full => Some(BaseTrust::Full),
        _ => None,
    }
}

/// Evaluates domain keys over a key catalog
pub struct TrustEvaluator<S> {
    catalog: KeyCatalog<S>,
}

impl<S: KeySource> TrustEvaluator<S> {
    pub fn new(source: S) -> Self {
        Self {
            catalog: KeyCatalog::new(source),
        }
    }

    pub fn catalog(&self) -> &KeyCatalog<S> {
        &self.catalog
    }

    /// Score `target_fingerprint` for `domain` against `required_signer`
    pub fn verify_domain_key(
        &self,
        domain: &str,
        target_fingerprint: &str,
        uid: UidSelector,
        required_signer: &str,
    ) -> Result<TrustVerdict, CatalogError> {
        let span = info_span!(
            "verify_domain_key",
            domain,
            target = target_fingerprint,
            uid = ?uid,
            signer = required_signer
        );
        let _enter = span.enter();

        let Some(signer) = self.catalog.lookup_one(required_signer, false)? else {
            debug!("Required signer not in the key store");
            return Ok(TrustVerdict::downgraded(Downgrade::SignerUnavailable));
        };
        let Some(target) = self.catalog.lookup_one(target_fingerprint, false)? else {
            debug!("Target key not in the key store");
            return Ok(TrustVerdict::untrusted());
        };

        let mut verdict = direct_pass(domain, &target, uid, &signer);
        debug!(code = verdict.code().value(), "Direct pass");

        if verdict.code() == TrustCode::Untrusted {
            verdict = self.fallback_pass(domain, &target, uid, &signer)?;
            debug!(code = verdict.code().value(), "Fallback pass");
        }
        Ok(verdict)
    }

    /// Integer form of [`verify_domain_key`](Self::verify_domain_key)
    pub fn verify_domain_key_code(
        &self,
        domain: &str,
        target_fingerprint: &str,
        uid_index: i64,
        required_signer: &str,
    ) -> Result<i32, CatalogError> {
        self.verify_domain_key(domain, target_fingerprint, uid_index.into(), required_signer)
            .map(|verdict| verdict.code().value())
    }

    fn fallback_pass(
        &self,
        domain: &str,
        target: &Key,
        uid: UidSelector,
        signer: &Key,
    ) -> Result<TrustVerdict, CatalogError> {
        let vouched = self.vouched_path(domain, target, uid)?;
        let key_signed = signed_key_path(target, signer);
        Ok(key_signed.or(vouched).unwrap_or_default())
    }

    /// First trusted third-party signature on the selected user-ID(s)
    fn vouched_path(
        &self,
        domain: &str,
        target: &Key,
        selector: UidSelector,
    ) -> Result<Option<TrustVerdict>, CatalogError> {
        let selected = target.uids.iter().enumerate().filter(|(index, uid)| match selector {
            UidSelector::Index(i) => *index == i,
            UidSelector::Any => uid.name == domain,
        });

        for (_, uid) in selected {
            for sig in uid.signatures.iter().filter(|sig| sig.is_checked() && sig.has_signer()) {
                let Some(voucher) = self.catalog.lookup_one(&sig.signer_key_id, false)? else {
                    continue;
                };
                let base = base_trust(voucher.owner_trust);
                let downgrade = secondary_downgrade(uid, sig, &voucher);
                // An untrusted voucher only ends the search through a downgrade
                if base.is_none() && downgrade.is_none() {
                    continue;
                }
                let secret_held = self.catalog.lookup_one(&voucher.fingerprint, true)?.is_some();

                debug!(voucher = %voucher.key_id(), secret_held, ?downgrade, "Signer vouches");
                return Ok(Some(TrustVerdict {
                    path: Some(PathKind::Vouched {
                        signer_secret_held: secret_held,
                    }),
                    base,
                    expired: base.is_some() && voucher.flags.expired,
                    downgrade,
                }));
            }
        }
        Ok(None)
    }
}

/// Required signer's signatures on the domain user-ID(s); the last finding wins
fn direct_pass(domain: &str, target: &Key, selector: UidSelector, signer: &Key) -> TrustVerdict {
    if target.is_unusable() {
        return TrustVerdict::downgraded(Downgrade::KeyUnusable);
    }

    let mut verdict = TrustVerdict::untrusted();
    for (index, uid) in target.uids.iter().enumerate() {
        if uid.name != domain || !selector.matches(index) {
            continue;
        }
        // Provisional; a required-signer signature on the same user-ID still decides
        if uid.revoked {
            verdict = TrustVerdict::downgraded(Downgrade::UidRevoked);
        }

        for sig in &uid.signatures {
            if !key_ids_match(&sig.signer_key_id, signer.key_id()) {
                continue;
            }
            if let Some(finding) = direct_finding(sig, signer) {
                verdict = finding;
                if verdict.code() == TrustCode::UidSignedUltimate {
                    return verdict;
                }
            }
        }
    }
    verdict
}

fn direct_finding(sig: &Signature, signer: &Key) -> Option<TrustVerdict> {
    let base = base_trust(signer.owner_trust);
    let downgrade = if matches!(sig.status, SigStatus::NoPublicKey | SigStatus::GeneralError) {
        Some(Downgrade::SignerUnavailable)
    } else if signer.flags.disabled {
        Some(Downgrade::SignerDisabled)
    } else if sig.invalid || sig.revoked || sig.expired {
        Some(Downgrade::SignatureUnusable)
    } else {
        None
    };

    if base.is_none() && downgrade.is_none() {
        return None;
    }
    Some(TrustVerdict {
        path: Some(PathKind::SignedUid),
        base,
        expired: base.is_some() && signer.flags.expired,
        downgrade,
    })
}

/// Required signer's signatures on the primary user-ID; the last one wins
fn signed_key_path(target: &Key, signer: &Key) -> Option<TrustVerdict> {
    let base = base_trust(signer.owner_trust)?;
    let primary = target.uids.first()?;

    primary
        .signatures
        .iter()
        .filter(|sig| sig.is_checked() && key_ids_match(&sig.signer_key_id, signer.key_id()))
        .map(|sig| TrustVerdict {
            path: Some(PathKind::SignedKey),
            base: Some(base),
            expired: signer.flags.expired,
            downgrade: secondary_downgrade(primary, sig, signer),
        })
        .last()
}

fn secondary_downgrade(uid: &UserId, sig: &Signature, signer: &Key) -> Option<Downgrade> {
    if uid.revoked || sig.revoked {
        Some(Downgrade::SecondaryRevoked)
    } else if signer.flags.disabled {
        Some(Downgrade::SignerDisabled)
    } else if sig.invalid {
        Some(Downgrade::SignatureInvalid)
    } else if sig.expired {
        Some(Downgrade::SecondaryRevoked)
    } else {
        None
    }
}
