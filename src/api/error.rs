// api/error.rs - Host Error Records

use serde::Serialize;
use std::panic::Location;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::keyring::EngineError;

/// Structured failure handed back to the host instead of a payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Error)]
#[error("{method}: {message} (code {code})")]
pub struct ErrorRecord {
    /// Always `true`; lets the host tell records from payloads
    pub error: bool,
    pub method: String,
    pub code: u32,
    pub message: String,
    pub line: u32,
    pub file: String,
}

pub type ApiResult<T> = Result<T, ErrorRecord>;

impl ErrorRecord {
    /// Record a failure at the caller's source location
    #[track_caller]
    pub fn new(method: &str, code: u32, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            error: true,
            method: method.to_string(),
            code,
            message: message.into(),
            line: location.line(),
            file: location.file().to_string(),
        }
    }

    #[track_caller]
    pub fn engine(method: &str, e: &EngineError) -> Self {
        Self::new(method, e.code(), e.to_string())
    }

    #[track_caller]
    pub fn catalog(method: &str, e: &CatalogError) -> Self {
        Self::new(method, e.code(), e.to_string())
    }

    /// Invalid host input, reported with the engine's invalid-value code
    #[track_caller]
    pub fn invalid(method: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(method, EngineError::InvalidValue(String::new()).code(), message)
    }
}

/// Converts layer errors into [`ErrorRecord`]s, keeping the call site
pub(crate) trait OrRecord<T> {
    fn or_record(self, method: &str) -> ApiResult<T>;
}

impl<T> OrRecord<T> for Result<T, EngineError> {
    #[track_caller]
    fn or_record(self, method: &str) -> ApiResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(ErrorRecord::engine(method, &e)),
        }
    }
}

impl<T> OrRecord<T> for Result<T, CatalogError> {
    #[track_caller]
    fn or_record(self, method: &str) -> ApiResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(ErrorRecord::catalog(method, &e)),
        }
    }
}
