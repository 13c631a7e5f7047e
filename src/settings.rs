// settings.rs - Layered Configuration

//! Settings are read from, in order of increasing precedence:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config <file>`, or `domainkey.toml` in the working
//!    directory when present)
//! 3. `DOMAINKEY__<SECTION>__<FIELD>` environment variables, e.g.
//!    `DOMAINKEY__KEYRING__LISTING_LIMIT=500`

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::keyring::{EngineError, EnvPinentry, KeyringOptions, Pinentry, SledKeyring, TrustModel};
use crate::observability::{TracingConfig, TracingFormat};

const ENV_PREFIX: &str = "DOMAINKEY";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_FILE_STEM: &str = "domainkey";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Configuration file not found: {0}")]
    MissingFile(PathBuf),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub keyring: KeyringSettings,
    pub trust_model: TrustModel,
    pub log: LogSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringSettings {
    /// Directory of the sled database
    pub path: PathBuf,

    /// Maximum keys per listing; 0 means unlimited
    pub listing_limit: usize,

    /// Environment variable holding the passphrase for protected keys
    pub passphrase_env: Option<String>,
}

impl Default for KeyringSettings {
    fn default() -> Self {
        Self {
            path: default_keyring_path(),
            listing_limit: 0,
            passphrase_env: Some("DOMAINKEY_PASSPHRASE".into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
    pub format: TracingFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        let tracing = TracingConfig::default();
        Self {
            filter: tracing.filter,
            format: tracing.format,
        }
    }
}

/// `$XDG_DATA_HOME/domainkey/keyring`, or `$HOME/.local/share/...`
fn default_keyring_path() -> PathBuf {
    let base = if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(data_home)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share")
    } else {
        return PathBuf::from("domainkey-keyring");
    };
    base.join("domainkey/keyring")
}

/// The `DOMAINKEY__` environment source
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

impl Settings {
    /// Load settings from the process environment and the given (or default) file
    pub fn load(file: Option<&Path>) -> Result<Self, SettingsError> {
        Self::build(file, environment())
    }

    /// Load settings with an explicit environment source
    pub fn build(file: Option<&Path>, env: Environment) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();

        builder = match file {
            Some(path) => {
                if !path.exists() {
                    return Err(SettingsError::MissingFile(path.to_path_buf()));
                }
                builder.add_source(File::from(path).format(FileFormat::Toml).required(true))
            }
            None => builder.add_source(File::with_name(DEFAULT_FILE_STEM).required(false)),
        };

        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        tracing::debug!(
            keyring = %settings.keyring.path.display(),
            listing_limit = settings.keyring.listing_limit,
            "Loaded settings"
        );
        Ok(settings)
    }

    pub fn keyring_options(&self) -> KeyringOptions {
        KeyringOptions {
            listing_limit: self.keyring.listing_limit,
            trust_model: self.trust_model.clone(),
        }
    }

    pub fn pinentry(&self) -> Option<Arc<dyn Pinentry>> {
        self.keyring
            .passphrase_env
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(|name| Arc::new(EnvPinentry::new(name.clone())) as Arc<dyn Pinentry>)
    }

    /// Open the configured keyring with its options and passphrase source
    pub fn open_keyring(&self) -> Result<SledKeyring, EngineError> {
        let keyring = SledKeyring::open(&self.keyring.path)?.with_options(self.keyring_options());
        Ok(match self.pinentry() {
            Some(pinentry) => keyring.with_pinentry(pinentry),
            None => keyring,
        })
    }

    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            filter: self.log.filter.clone(),
            format: self.log.format,
            with_ansi: self.log.format != TracingFormat::Json,
            ..TracingConfig::default()
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            writeln!(f, "    {}: {}", label, value)
        };

        writeln!(f, "  Keyring")?;
        write(f, "Path", &self.keyring.path.display())?;
        write(f, "Listing limit", &self.keyring.listing_limit)?;
        write(
            f,
            "Passphrase variable",
            &self.keyring.passphrase_env.as_deref().unwrap_or("-"),
        )?;
        writeln!(f, "  Trust model")?;
        write(f, "Marginals needed", &self.trust_model.marginals_needed)?;
        write(f, "Completes needed", &self.trust_model.completes_needed)?;
        write(f, "Max cert depth", &self.trust_model.max_cert_depth)?;
        writeln!(f, "  Log")?;
        write(f, "Filter", &self.log.filter)?;
        write(f, "Format", &format!("{:?}", self.log.format).to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty.toml");
        std::fs::write(&file, "").unwrap();

        let settings = Settings::build(Some(&file), env(&[])).unwrap();
        assert_eq!(settings.keyring.listing_limit, 0);
        assert_eq!(settings.trust_model, TrustModel::default());
        assert_eq!(settings.log.format, TracingFormat::Pretty);
        assert!(settings.pinentry().is_some());
    }

    #[test]
    fn test_file_then_environment() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("domainkey.toml");
        std::fs::write(
            &file,
            r#"
[keyring]
path = "/var/lib/domainkey"
listing_limit = 100

[trust_model]
marginals_needed = 2

[log]
format = "json"
"#,
        )
        .unwrap();

        let settings = Settings::build(
            Some(&file),
            env(&[
                ("DOMAINKEY__KEYRING__LISTING_LIMIT", "5"),
                ("DOMAINKEY__LOG__FILTER", "debug"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.keyring.path, PathBuf::from("/var/lib/domainkey"));
        assert_eq!(settings.keyring.listing_limit, 5);
        assert_eq!(settings.trust_model.marginals_needed, 2);
        assert_eq!(settings.trust_model.completes_needed, 1);
        assert_eq!(settings.log.format, TracingFormat::Json);
        assert_eq!(settings.log.filter, "debug");

        let options = settings.keyring_options();
        assert_eq!(options.listing_limit, 5);
        assert!(!settings.tracing_config().with_ansi);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = Settings::build(Some(&missing), env(&[])).unwrap_err();
        assert!(matches!(err, SettingsError::MissingFile(_)));
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "[keyring]\nlisting_limit = \"many\"\n").unwrap();
        assert!(matches!(
            Settings::build(Some(&file), env(&[])),
            Err(SettingsError::Config(_))
        ));
    }

    #[test]
    fn test_open_keyring_applies_options() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.keyring.path = dir.path().join("keyring");
        settings.keyring.listing_limit = 7;
        settings.keyring.passphrase_env = None;

        let keyring = settings.open_keyring().unwrap();
        assert_eq!(keyring.options().listing_limit, 7);
        assert!(keyring.is_empty());
        assert!(settings.to_string().contains("Listing limit: 7"));
    }
}
