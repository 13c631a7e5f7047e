// api/keygen.rs - Background Key Pair Generation

//! Generation runs on the blocking pool. The caller gets an acknowledgement
//! right away and a stream of events: zero or more progress ticks followed by
//! exactly one completion.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use super::error::{ApiResult, ErrorRecord, OrRecord};
use crate::keyring::{EngineError, KeyEngine, KeyGenParams, KeyGenProgress};

/// Acknowledgement returned when generation was accepted
pub const QUEUED: &str = "queued";

pub const PROGRESS_EVENT: &str = "onkeygenprogress";
pub const COMPLETE_EVENT: &str = "onkeygencomplete";

const METHOD: &str = "gpg_gen_key";
const PRIMEGEN: &str = "primegen";
const PROGRESS_TAGS: [char; 6] = ['.', '+', '!', '^', '<', '>'];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyGenEvent {
    /// A progress tick with its opaque tag character
    Progress(char),

    /// Generation finished with the new fingerprint or a failure
    Complete(ApiResult<String>),
}

impl KeyGenEvent {
    /// Host-facing event name
    pub fn name(&self) -> &'static str {
        match self {
            KeyGenEvent::Progress(_) => PROGRESS_EVENT,
            KeyGenEvent::Complete(_) => COMPLETE_EVENT,
        }
    }
}

/// Everything a finished generation reported
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyGenReport {
    pub progress: Vec<char>,
    pub outcome: ApiResult<String>,
}

/// Handle on a running generation
#[derive(Debug)]
pub struct KeyGenTask {
    events: UnboundedReceiverStream<KeyGenEvent>,
    handle: JoinHandle<()>,
}

impl KeyGenTask {
    pub fn status(&self) -> &'static str {
        QUEUED
    }

    /// The event stream; the generation keeps running if it is dropped
    pub fn into_events(self) -> UnboundedReceiverStream<KeyGenEvent> {
        self.events
    }

    /// Drain the events until completion
    pub async fn wait(self) -> KeyGenReport {
        let KeyGenTask { mut events, handle } = self;
        let mut progress = Vec::new();

        while let Some(event) = events.next().await {
            match event {
                KeyGenEvent::Progress(tag) => progress.push(tag),
                KeyGenEvent::Complete(outcome) => return KeyGenReport { progress, outcome },
            }
        }

        // The worker went away without reporting
        let message = match handle.await {
            Err(e) => e.to_string(),
            Ok(()) => "generation ended without a result".to_string(),
        };
        let code = EngineError::Unavailable(String::new()).code();
        KeyGenReport {
            progress,
            outcome: Err(ErrorRecord::new(METHOD, code, message)),
        }
    }
}

/// Start generating on the blocking pool of the current runtime
pub(crate) fn spawn<E>(engine: Arc<E>, params: KeyGenParams) -> KeyGenTask
where
    E: KeyEngine + ?Sized + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = tokio::task::spawn_blocking(move || {
        let progress_tx = tx.clone();
        let mut on_progress = |progress: KeyGenProgress| {
            if progress.what == PRIMEGEN && PROGRESS_TAGS.contains(&progress.tag) {
                // Nobody listening is fine
                let _ = progress_tx.send(KeyGenEvent::Progress(progress.tag));
            }
        };

        let outcome = engine.generate_key(&params, &mut on_progress).or_record(METHOD);
        match &outcome {
            Ok(fingerprint) => info!(fingerprint = %fingerprint, "Key generation complete"),
            Err(record) => warn!(error = %record, "Key generation failed"),
        }
        let _ = tx.send(KeyGenEvent::Complete(outcome));
    });

    KeyGenTask {
        events: UnboundedReceiverStream::new(rx),
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::{KeySource, SledKeyring};

    fn params(name: &str) -> KeyGenParams {
        KeyGenParams {
            name_real: name.into(),
            name_email: format!("admin@{}", name),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_events_end_with_completion() {
        let keyring = Arc::new(SledKeyring::in_memory().unwrap());
        let task = spawn(keyring.clone(), params("example.com"));
        assert_eq!(task.status(), QUEUED);

        let events: Vec<KeyGenEvent> = task.into_events().collect().await;
        let (last, progress) = events.split_last().unwrap();
        assert!(!progress.is_empty());
        assert!(progress.iter().all(|e| e.name() == PROGRESS_EVENT));
        assert_eq!(last.name(), COMPLETE_EVENT);

        let KeyGenEvent::Complete(Ok(fingerprint)) = last else {
            panic!("expected a successful completion, got {:?}", last);
        };
        assert!(keyring.get_key(fingerprint, true).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failure_is_reported_as_completion() {
        let keyring = Arc::new(SledKeyring::in_memory().unwrap());
        let report = spawn(keyring, params("")).wait().await;
        assert!(report.progress.is_empty());
        let record = report.outcome.unwrap_err();
        assert_eq!(record.method, METHOD);
        assert_eq!(record.code, EngineError::InvalidValue(String::new()).code());
    }
}
