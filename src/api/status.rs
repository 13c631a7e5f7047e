// api/status.rs - Engine Status Record

use serde::Serialize;

use crate::keyring::{KeyEngine, Protocol};

/// Read-only facts about the engine and its environment
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginStatus {
    pub error: bool,
    pub engine_valid: bool,
    pub engine_version: Option<String>,
    pub protocol: Option<Protocol>,
    /// Passphrase agent attached to the engine
    pub agent_info: Option<String>,
    pub locale: Option<String>,
    pub config_tool_detected: bool,
    /// Message of the engine check failure
    pub detail: Option<String>,
}

impl PluginStatus {
    pub fn probe<E: KeyEngine + ?Sized>(engine: &E) -> Self {
        let locale = detect_locale();
        match engine.info() {
            Ok(info) => Self {
                error: false,
                engine_valid: true,
                engine_version: Some(info.version),
                protocol: Some(info.protocol),
                agent_info: info.agent,
                locale,
                config_tool_detected: info.config_tool,
                detail: None,
            },
            Err(e) => Self {
                error: true,
                engine_valid: false,
                engine_version: None,
                protocol: None,
                agent_info: None,
                locale,
                config_tool_detected: false,
                detail: Some(e.to_string()),
            },
        }
    }
}

/// Locale as the C library would pick it: `LC_ALL`, then `LC_CTYPE`, then `LANG`
fn detect_locale() -> Option<String> {
    locale_from(|name| std::env::var(name).ok())
}

fn locale_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["LC_ALL", "LC_CTYPE", "LANG"]
        .into_iter()
        .filter_map(lookup)
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::{SledKeyring, StaticPinentry};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_probe_reports_engine() {
        let keyring = SledKeyring::in_memory()
            .unwrap()
            .with_pinentry(Arc::new(StaticPinentry::new("pw")));
        let status = PluginStatus::probe(&keyring);

        assert!(status.engine_valid);
        assert!(!status.error);
        assert!(status.engine_version.unwrap().starts_with("sled-keyring"));
        assert_eq!(status.agent_info.as_deref(), Some("static"));
        assert!(status.config_tool_detected);
    }

    #[test]
    fn test_locale_precedence() {
        let env: HashMap<&str, &str> = [("LC_ALL", ""), ("LC_CTYPE", "de_DE.UTF-8"), ("LANG", "C")]
            .into_iter()
            .collect();
        let locale = locale_from(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(locale.as_deref(), Some("de_DE.UTF-8"));
        assert_eq!(locale_from(|_| None), None);
    }
}
