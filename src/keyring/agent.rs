// keyring/agent.rs - Passphrase Entry

use std::fmt;

/// What the keyring needs a passphrase for
#[derive(Clone, Debug)]
pub struct PassphraseRequest<'a> {
    /// Key id of the protected key
    pub key_id: &'a str,

    /// Primary user-ID of the protected key
    pub uid_hint: &'a str,

    /// A previous attempt was wrong
    pub retry: bool,
}

/// Supplies passphrases for protected secret keys.
///
/// `Ok(None)` means the user cancelled; `Err` means the entry mechanism failed.
pub trait Pinentry: Send + Sync {
    fn passphrase(&self, request: &PassphraseRequest<'_>) -> Result<Option<String>, String>;

    /// Short description reported in engine status
    fn describe(&self) -> String;
}

/// Always answers with the same passphrase
pub struct StaticPinentry {
    passphrase: String,
}

impl StaticPinentry {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }
}

impl fmt::Debug for StaticPinentry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticPinentry").finish_non_exhaustive()
    }
}

impl Pinentry for StaticPinentry {
    fn passphrase(&self, _request: &PassphraseRequest<'_>) -> Result<Option<String>, String> {
        Ok(Some(self.passphrase.clone()))
    }

    fn describe(&self) -> String {
        "static".into()
    }
}

/// Reads the passphrase from an environment variable; unset means cancelled
#[derive(Debug, Clone)]
pub struct EnvPinentry {
    variable: String,
}

impl EnvPinentry {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl Pinentry for EnvPinentry {
    fn passphrase(&self, request: &PassphraseRequest<'_>) -> Result<Option<String>, String> {
        // The value cannot change between attempts
        if request.retry {
            return Ok(None);
        }
        match std::env::var(&self.variable) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(format!("{}: {}", self.variable, e)),
        }
    }

    fn describe(&self) -> String {
        format!("env:{}", self.variable)
    }
}
