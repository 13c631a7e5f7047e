// keyring/validity.rs - User-ID Validity from the Certification Graph

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::fingerprint::KeyId;
use super::model::Validity;

/// Configuration for validity calculation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustModel {
    /// Number of marginally trusted introducers that make a user-ID fully valid
    pub marginals_needed: usize,

    /// Number of fully trusted introducers that make a user-ID fully valid
    pub completes_needed: usize,

    /// Maximum length of an introducer chain
    pub max_cert_depth: usize,
}

impl Default for TrustModel {
    fn default() -> Self {
        Self {
            marginals_needed: 3,
            completes_needed: 1,
            max_cert_depth: 5,
        }
    }
}

/// Certification graph as seen by the validity calculation
pub(crate) trait CertGraph {
    fn owner_trust(&self, key: &KeyId) -> Validity;

    /// Not revoked, expired, disabled or invalid
    fn is_usable(&self, key: &KeyId) -> bool;

    fn uid_count(&self, key: &KeyId) -> usize;

    /// Signers of the good, unrevoked, unexpired certifications on a user-ID
    fn certifiers(&self, key: &KeyId, uid_index: usize) -> Vec<KeyId>;
}

/// Computes key and user-ID validity for one listing
pub(crate) struct ValidityCalculator<'a, G: CertGraph> {
    graph: &'a G,
    model: &'a TrustModel,
    cache: HashMap<KeyId, Validity>,
}

impl<'a, G: CertGraph> ValidityCalculator<'a, G> {
    pub fn new(graph: &'a G, model: &'a TrustModel) -> Self {
        Self {
            graph,
            model,
            cache: HashMap::new(),
        }
    }

    /// Validity of the whole key (best user-ID)
    pub fn key_validity(&mut self, key: &KeyId) -> Validity {
        if let Some(validity) = self.cache.get(key) {
            return *validity;
        }
        let validity = self.key_validity_at(key, 0, &mut HashSet::new());
        self.cache.insert(*key, validity);
        validity
    }

    /// Validity of one user-ID
    pub fn uid_validity(&mut self, key: &KeyId, uid_index: usize) -> Validity {
        self.uid_validity_at(key, uid_index, 0, &mut HashSet::new())
    }

    fn key_validity_at(&mut self, key: &KeyId, depth: usize, visiting: &mut HashSet<KeyId>) -> Validity {
        if let Some(validity) = self.fixed_validity(key) {
            return validity;
        }
        if let Some(validity) = self.cache.get(key) {
            return *validity;
        }
        if depth > self.model.max_cert_depth || !visiting.insert(*key) {
            return Validity::Undefined;
        }

        let validity = (0..self.graph.uid_count(key))
            .map(|uid| self.uid_validity_at(key, uid, depth, visiting))
            .max()
            .unwrap_or(Validity::Undefined);

        visiting.remove(key);
        validity
    }

    fn uid_validity_at(
        &mut self,
        key: &KeyId,
        uid_index: usize,
        depth: usize,
        visiting: &mut HashSet<KeyId>,
    ) -> Validity {
        if let Some(validity) = self.fixed_validity(key) {
            return validity;
        }

        let mut complete = 0;
        let mut marginal = 0;
        for signer in self.graph.certifiers(key, uid_index) {
            if &signer == key {
                continue;
            }
            let trust = self.graph.owner_trust(&signer);
            if trust < Validity::Marginal {
                continue;
            }
            // Only valid keys can introduce
            if self.key_validity_at(&signer, depth + 1, visiting) < Validity::Full {
                continue;
            }
            match trust {
                Validity::Ultimate | Validity::Full => complete += 1,
                Validity::Marginal => marginal += 1,
                _ => {}
            }
        }

        if complete >= self.model.completes_needed.max(1)
            || marginal >= self.model.marginals_needed.max(1)
        {
            Validity::Full
        } else if complete + marginal > 0 {
            Validity::Marginal
        } else {
            Validity::Undefined
        }
    }

    fn fixed_validity(&self, key: &KeyId) -> Option<Validity> {
        if !self.graph.is_usable(key) {
            return Some(Validity::Never);
        }
        if self.graph.owner_trust(key) == Validity::Ultimate {
            return Some(Validity::Ultimate);
        }
        None
    }
}
