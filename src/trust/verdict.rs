// trust/verdict.rs - Trust Verdicts and Their Integer Codes

use serde::{Serialize, Serializer};
use std::fmt;

/// The fixed integer verdicts handed to callers.
///
/// Non-negative codes mean a trusted path was found; the magnitude says which
/// one. Negative codes name the reason the key failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum TrustCode {
    /// Vouched for by an expired signer the local user does not control
    ExpiredSignerTransitive = -7,
    /// User-ID or signature revoked, or signature expired, on a secondary path
    SecondaryRevoked = -6,
    /// User-ID signed by a disabled required signer
    SignerDisabled = -5,
    /// The matching signature is invalid, revoked or expired
    SignatureUnusable = -4,
    /// The target user-ID is revoked
    UidRevoked = -3,
    /// Target key revoked, disabled or invalid, or a structurally invalid signature
    KeyUnusable = -2,
    /// No trusted path, or the signer key is unavailable
    Untrusted = -1,
    UidSignedUltimate = 0,
    UidSignedUltimateExpired = 1,
    UidSignedFull = 2,
    UidSignedFullExpired = 3,
    KeySignedUltimate = 4,
    KeySignedUltimateExpired = 5,
    KeySignedFull = 6,
    KeySignedFullExpired = 7,
    /// Transitively vouched for by a trusted signer
    Vouched = 8,
}

impl TrustCode {
    pub const ALL: [TrustCode; 16] = [
        TrustCode::ExpiredSignerTransitive,
        TrustCode::SecondaryRevoked,
        TrustCode::SignerDisabled,
        TrustCode::SignatureUnusable,
        TrustCode::UidRevoked,
        TrustCode::KeyUnusable,
        TrustCode::Untrusted,
        TrustCode::UidSignedUltimate,
        TrustCode::UidSignedUltimateExpired,
        TrustCode::UidSignedFull,
        TrustCode::UidSignedFullExpired,
        TrustCode::KeySignedUltimate,
        TrustCode::KeySignedUltimateExpired,
        TrustCode::KeySignedFull,
        TrustCode::KeySignedFullExpired,
        TrustCode::Vouched,
    ];

    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn from_value(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.value() == value)
    }

    /// Whether the verdict describes a trusted path
    pub fn is_trusted(self) -> bool {
        self.value() >= 0
    }

    pub fn description(self) -> &'static str {
        match self {
            TrustCode::ExpiredSignerTransitive => "vouched for by an expired signer",
            TrustCode::SecondaryRevoked => "user-ID or signature revoked on a secondary path",
            TrustCode::SignerDisabled => "user-ID signed by a disabled required signer",
            TrustCode::SignatureUnusable => "matching signature invalid, revoked or expired",
            TrustCode::UidRevoked => "user-ID revoked",
            TrustCode::KeyUnusable => "key revoked, disabled or invalid",
            TrustCode::Untrusted => "no trusted signer and no web-of-trust path",
            TrustCode::UidSignedUltimate => "user-ID signed by an ultimately trusted key",
            TrustCode::UidSignedUltimateExpired => {
                "user-ID signed by an expired ultimately trusted key"
            }
            TrustCode::UidSignedFull => "user-ID signed by a fully trusted key",
            TrustCode::UidSignedFullExpired => "user-ID signed by an expired fully trusted key",
            TrustCode::KeySignedUltimate => "key signed by an ultimately trusted key",
            TrustCode::KeySignedUltimateExpired => "key signed by an expired ultimately trusted key",
            TrustCode::KeySignedFull => "key signed by a fully trusted key",
            TrustCode::KeySignedFullExpired => "key signed by an expired fully trusted key",
            TrustCode::Vouched => "meets web-of-trust requirements",
        }
    }
}

impl fmt::Display for TrustCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl Serialize for TrustCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.value())
    }
}

/// How the target was connected to a trusted signer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// The domain user-ID carries the required signer's signature
    SignedUid,
    /// The primary user-ID carries the required signer's signature
    SignedKey,
    /// Some other trusted signer signed the user-ID
    Vouched { signer_secret_held: bool },
}

/// Owner-trust of the signer on the path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseTrust {
    Ultimate,
    Full,
}

/// Reason a found path does not count
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Downgrade {
    /// Target key revoked, disabled or invalid
    KeyUnusable,
    UidRevoked,
    /// Matching signature invalid, revoked or expired
    SignatureUnusable,
    SignerDisabled,
    /// Signer key missing, or the engine could not check the signature
    SignerUnavailable,
    /// Revoked user-ID or signature, or expired signature, on a secondary path
    SecondaryRevoked,
    /// Invalid signature on a secondary path
    SignatureInvalid,
}

impl Downgrade {
    fn code(self) -> TrustCode {
        match self {
            Downgrade::KeyUnusable | Downgrade::SignatureInvalid => TrustCode::KeyUnusable,
            Downgrade::UidRevoked => TrustCode::UidRevoked,
            Downgrade::SignatureUnusable => TrustCode::SignatureUnusable,
            Downgrade::SignerDisabled => TrustCode::SignerDisabled,
            Downgrade::SignerUnavailable => TrustCode::Untrusted,
            Downgrade::SecondaryRevoked => TrustCode::SecondaryRevoked,
        }
    }
}

/// Structured result of an evaluation, projected to a [`TrustCode`] with
/// [`TrustVerdict::code`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TrustVerdict {
    pub path: Option<PathKind>,
    pub base: Option<BaseTrust>,
    /// The signer on the path has expired
    pub expired: bool,
    pub downgrade: Option<Downgrade>,
}

impl TrustVerdict {
    /// Nothing found
    pub fn untrusted() -> Self {
        Self::default()
    }

    pub fn downgraded(downgrade: Downgrade) -> Self {
        Self {
            downgrade: Some(downgrade),
            ..Self::default()
        }
    }

    pub fn found(path: PathKind, base: BaseTrust, expired: bool) -> Self {
        Self {
            path: Some(path),
            base: Some(base),
            expired,
            downgrade: None,
        }
    }

    pub fn code(&self) -> TrustCode {
        if let Some(downgrade) = self.downgrade {
            return downgrade.code();
        }
        let (Some(path), Some(base)) = (self.path, self.base) else {
            return TrustCode::Untrusted;
        };

        match (path, base, self.expired) {
            (PathKind::SignedUid, BaseTrust::Ultimate, false) => TrustCode::UidSignedUltimate,
            (PathKind::SignedUid, BaseTrust::Ultimate, true) => TrustCode::UidSignedUltimateExpired,
            (PathKind::SignedUid, BaseTrust::Full, false) => TrustCode::UidSignedFull,
            (PathKind::SignedUid, BaseTrust::Full, true) => TrustCode::UidSignedFullExpired,
            (PathKind::Vouched { signer_secret_held: false }, _, false) => TrustCode::Vouched,
            (PathKind::Vouched { signer_secret_held: false }, _, true) => {
                TrustCode::ExpiredSignerTransitive
            }
            (_, BaseTrust::Ultimate, false) => TrustCode::KeySignedUltimate,
            (_, BaseTrust::Ultimate, true) => TrustCode::KeySignedUltimateExpired,
            (_, BaseTrust::Full, false) => TrustCode::KeySignedFull,
            (_, BaseTrust::Full, true) => TrustCode::KeySignedFullExpired,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.code().is_trusted()
    }
}

impl fmt::Display for TrustVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        write!(f, "{} ({})", code, code.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_codes_cover_range() {
        let values: Vec<i32> = TrustCode::ALL.iter().map(|c| c.value()).collect();
        assert_eq!(values, (-7..=8).collect::<Vec<_>>());
        assert_eq!(TrustCode::from_value(8), Some(TrustCode::Vouched));
        assert_eq!(TrustCode::from_value(9), None);
        assert_eq!(serde_json::to_string(&TrustCode::SignerDisabled).unwrap(), "-5");
    }

    #[test]
    fn test_uid_path_projection() {
        let verdict = TrustVerdict::found(PathKind::SignedUid, BaseTrust::Ultimate, false);
        assert_eq!(verdict.code().value(), 0);
        let verdict = TrustVerdict::found(PathKind::SignedUid, BaseTrust::Full, true);
        assert_eq!(verdict.code().value(), 3);
    }

    #[test]
    fn test_vouched_projection() {
        let held = PathKind::Vouched {
            signer_secret_held: true,
        };
        let foreign = PathKind::Vouched {
            signer_secret_held: false,
        };
        assert_eq!(TrustVerdict::found(held, BaseTrust::Ultimate, false).code().value(), 4);
        assert_eq!(TrustVerdict::found(held, BaseTrust::Full, true).code().value(), 7);
        assert_eq!(TrustVerdict::found(foreign, BaseTrust::Full, false).code().value(), 8);
        assert_eq!(TrustVerdict::found(foreign, BaseTrust::Ultimate, true).code().value(), -7);
    }

    #[test]
    fn test_untrusted_and_downgrades() {
        assert_eq!(TrustVerdict::untrusted().code(), TrustCode::Untrusted);
        assert_eq!(
            TrustVerdict::downgraded(Downgrade::SignerUnavailable).code(),
            TrustCode::Untrusted
        );
        assert_eq!(
            TrustVerdict::downgraded(Downgrade::SignatureInvalid).code().value(),
            -2
        );
        assert!(!TrustVerdict::downgraded(Downgrade::UidRevoked).is_trusted());
    }

    fn any_path() -> impl Strategy<Value = PathKind> {
        prop_oneof![
            Just(PathKind::SignedUid),
            Just(PathKind::SignedKey),
            any::<bool>().prop_map(|held| PathKind::Vouched {
                signer_secret_held: held
            }),
        ]
    }

    fn any_base() -> impl Strategy<Value = BaseTrust> {
        prop_oneof![Just(BaseTrust::Ultimate), Just(BaseTrust::Full)]
    }

    fn any_downgrade() -> impl Strategy<Value = Downgrade> {
        prop_oneof![
            Just(Downgrade::KeyUnusable),
            Just(Downgrade::UidRevoked),
            Just(Downgrade::SignatureUnusable),
            Just(Downgrade::SignerDisabled),
            Just(Downgrade::SignerUnavailable),
            Just(Downgrade::SecondaryRevoked),
            Just(Downgrade::SignatureInvalid),
        ]
    }

    proptest! {
        #[test]
        fn prop_downgrade_always_wins(
            path in proptest::option::of(any_path()),
            base in proptest::option::of(any_base()),
            expired in any::<bool>(),
            downgrade in any_downgrade(),
        ) {
            let verdict = TrustVerdict { path, base, expired, downgrade: Some(downgrade) };
            prop_assert!(!verdict.is_trusted());
            prop_assert_eq!(verdict.code(), TrustVerdict::downgraded(downgrade).code());
        }

        #[test]
        fn prop_expiry_never_improves(path in any_path(), base in any_base()) {
            let fresh = TrustVerdict::found(path, base, false).code();
            let expired = TrustVerdict::found(path, base, true).code();
            prop_assert_ne!(fresh, expired);
            prop_assert!(fresh.is_trusted());
            // Expiry moves a trusted code one step away from the best (0),
            // except for foreign vouching which turns negative
            if expired.is_trusted() {
                prop_assert_eq!(expired.value(), fresh.value() + 1);
            } else {
                prop_assert_eq!(expired, TrustCode::ExpiredSignerTransitive);
            }
        }
    }
}
