//! Unified error types.
//!
//! `AttendanceError` is the taxonomy of the attendance core: every failed
//! transition, resolution or verification step returns one of its variants.
//! `AppError` wraps it together with I/O, database and configuration failures
//! so the CLI layer has a single error to report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Machine-readable kind of an [`AttendanceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Verification,
    Conflict,
    State,
    Preparation,
    PositionUnavailable,
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Verification => "verification",
            ErrorKind::Conflict => "conflict",
            ErrorKind::State => "state",
            ErrorKind::Preparation => "preparation",
            ErrorKind::PositionUnavailable => "position_unavailable",
            ErrorKind::Transport => "transport",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttendanceError {
    /// A required selection or input is missing or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Evidence is stale, future-dated or does not match the selected method.
    #[error("Verification error: {0}")]
    Verification(String),

    /// Duplicate or concurrent transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transition not allowed in the current state.
    #[error("Invalid state: {0}")]
    State(String),

    /// A verification strategy could not set up its resources.
    #[error("Preparation error: {0}")]
    Preparation(String),

    /// Device position denied or timed out. Manual override is the recovery path.
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// Backend unreachable or answered with an unexpected status.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl AttendanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttendanceError::Validation(_) => ErrorKind::Validation,
            AttendanceError::Verification(_) => ErrorKind::Verification,
            AttendanceError::Conflict(_) => ErrorKind::Conflict,
            AttendanceError::State(_) => ErrorKind::State,
            AttendanceError::Preparation(_) => ErrorKind::Preparation,
            AttendanceError::PositionUnavailable(_) => ErrorKind::PositionUnavailable,
            AttendanceError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Only transport failures may be retried with unchanged input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttendanceError::Transport(_))
    }

    pub fn message(&self) -> &str {
        match self {
            AttendanceError::Validation(m)
            | AttendanceError::Verification(m)
            | AttendanceError::Conflict(m)
            | AttendanceError::State(m)
            | AttendanceError::Preparation(m)
            | AttendanceError::PositionUnavailable(m)
            | AttendanceError::Transport(m) => m,
        }
    }
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    // ---------------------------
    // Parsing errors
    // ---------------------------
    #[error("Invalid date/time format: {0}")]
    InvalidDate(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Invalid tracking method: {0}")]
    InvalidMethod(String),

    // ---------------------------
    // Attendance core
    // ---------------------------
    #[error(transparent)]
    Attendance(#[from] AttendanceError),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

pub type AppResult<T> = Result<T, AppError>;
