// trust/mod.rs - Domain Key Trust Evaluation

//! Decides whether a domain key chains to a trusted signer.
//!
//! - **Verdict**: the structured result and its fixed integer codes (-7..=8)
//! - **Evaluator**: the two-pass walk over user-IDs and signatures
//!
//! # Example
//!
//! ```ignore
//! use domainkey_trust::keyring::SledKeyring;
//! use domainkey_trust::trust::{TrustEvaluator, UidSelector};
//!
//! let keyring = SledKeyring::open("keyring")?;
//! let evaluator = TrustEvaluator::new(&keyring);
//! let verdict = evaluator.verify_domain_key(
//!     "example.com",
//!     "0123456789ABCDEF0123456789ABCDEF01234567",
//!     UidSelector::Any,
//!     "89ABCDEF01234567",
//! )?;
//! println!("{}", verdict.code());
//! ```

mod evaluator;
mod verdict;

pub use evaluator::{TrustEvaluator, UidSelector};
pub use verdict::{BaseTrust, Downgrade, PathKind, TrustCode, TrustVerdict};
