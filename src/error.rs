//! Unified error types for the engine
//!
//! Every failure can be reported as an [`EngineError`]: a stable code, a
//! message and optional details, serialisable for callers that only see JSON.

use crate::eip712::{Eip712Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all engine operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Typed data errors
    TypeError,
    EncodingError,
    ValueError,

    // Signature errors
    SignatureFormatError,
    MalleableSignature,
    RecoveryError,
    InvalidPrivateKey,

    // Input errors
    InvalidInput,
    JsonError,
    HexError,

    // Internal
    Internal,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Type => ErrorCode::TypeError,
            ErrorKind::Encoding => ErrorCode::EncodingError,
            ErrorKind::Value => ErrorCode::ValueError,
            ErrorKind::SignatureFormat => ErrorCode::SignatureFormatError,
            ErrorKind::MalleableSignature => ErrorCode::MalleableSignature,
            ErrorKind::Recovery => ErrorCode::RecoveryError,
            ErrorKind::Key => ErrorCode::InvalidPrivateKey,
        }
    }
}

impl Eip712Error {
    /// Crate-wide code for this error
    pub fn code(&self) -> ErrorCode {
        self.kind().into()
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

// Conversions from common error types

impl From<Eip712Error> for EngineError {
    fn from(e: Eip712Error) -> Self {
        EngineError::new(e.code(), e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::new(ErrorCode::JsonError, e.to_string())
    }
}

impl From<hex::FromHexError> for EngineError {
    fn from(e: hex::FromHexError) -> Self {
        EngineError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::new(ErrorCode::Internal, e.to_string())
    }
}

impl EngineError {
    /// Classify a report by the first engine-level cause in its chain. The
    /// message keeps every context layer.
    pub fn from_report(report: &anyhow::Error) -> Self {
        let code = report
            .chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<Eip712Error>() {
                    Some(e.code())
                } else if cause.is::<serde_json::Error>() {
                    Some(ErrorCode::JsonError)
                } else if cause.is::<hex::FromHexError>() {
                    Some(ErrorCode::HexError)
                } else if cause.is::<std::io::Error>() {
                    Some(ErrorCode::InvalidInput)
                } else {
                    None
                }
            })
            .unwrap_or(ErrorCode::InvalidInput);

        let mut err = EngineError::new(code, report.to_string());
        let causes: Vec<String> = report.chain().skip(1).map(ToString::to_string).collect();
        if !causes.is_empty() {
            err = err.with_details(causes.join(": "));
        }
        err
    }
}
