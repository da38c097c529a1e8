//! Unified application error model and mapping helpers.
//! `AppError` is what callers of the session store, router and catalog see; backend
//! implementations report `BackendError`, which is mapped here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendError;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    #[error("{code}: {message}")]
    Auth { code: String, message: String },
    #[error("{code}: {message}")]
    ProfileLoad { code: String, message: String },
    #[error("{code}: {message}")]
    Subscription { code: String, message: String },
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    #[error("{code}: {message}")]
    Network { code: String, message: String },
    #[error("{code}: {message}")]
    Storage { code: String, message: String },
    #[error("{code}: {message}")]
    UserInput { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Auth { code, .. }
            | AppError::ProfileLoad { code, .. }
            | AppError::Subscription { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Network { code, .. }
            | AppError::Storage { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Auth { message, .. }
            | AppError::ProfileLoad { message, .. }
            | AppError::Subscription { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Network { message, .. }
            | AppError::Storage { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn profile_load<S: Into<String>>(code: S, msg: S) -> Self { AppError::ProfileLoad { code: code.into(), message: msg.into() } }
    pub fn subscription<S: Into<String>>(code: S, msg: S) -> Self { AppError::Subscription { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn network<S: Into<String>>(code: S, msg: S) -> Self { AppError::Network { code: code.into(), message: msg.into() } }
    pub fn storage<S: Into<String>>(code: S, msg: S) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Wrap a backend failure that happened while fetching or decoding a profile row.
    pub fn from_profile_fetch(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(m) => AppError::profile_load("profile_not_found".to_string(), m),
            other => AppError::profile_load("profile_fetch_failed".to_string(), other.to_string()),
        }
    }

    pub fn is_auth(&self) -> bool { matches!(self, AppError::Auth { .. }) }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Auth(m) => AppError::Auth { code: "invalid_credentials".into(), message: m },
            BackendError::NotFound(m) => AppError::NotFound { code: "not_found".into(), message: m },
            BackendError::Network(m) => AppError::Network { code: "network_error".into(), message: m },
            BackendError::Storage(m) => AppError::Storage { code: "storage_error".into(), message: m },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal { code: "malformed_row".into(), message: err.to_string() }
    }
}
