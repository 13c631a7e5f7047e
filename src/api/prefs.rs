// api/prefs.rs - Scoped Engine Preferences

use tracing::{debug, warn};

use crate::keyring::{EngineError, KeyEngine, DEFAULT_KEY};

/// Points `default-key` at a signer for as long as the guard lives.
///
/// Dropping the guard puts back whatever was set before, clearing the
/// preference if nothing was.
pub(crate) struct DefaultKeyGuard<'a, E: KeyEngine + ?Sized> {
    engine: &'a E,
    previous: Option<String>,
}

impl<'a, E: KeyEngine + ?Sized> DefaultKeyGuard<'a, E> {
    pub fn set(engine: &'a E, key_id: &str) -> Result<Self, EngineError> {
        let previous = engine.config_value(DEFAULT_KEY)?;
        engine.set_config_value(DEFAULT_KEY, Some(key_id))?;
        debug!(signer = key_id, "Default key set for signing");
        Ok(Self { engine, previous })
    }
}

impl<E: KeyEngine + ?Sized> Drop for DefaultKeyGuard<'_, E> {
    fn drop(&mut self) {
        if let Err(e) = self
            .engine
            .set_config_value(DEFAULT_KEY, self.previous.as_deref())
        {
            warn!(error = %e, "Failed to restore default key");
        }
    }
}
