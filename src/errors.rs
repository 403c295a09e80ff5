// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Permission Denied")]
    PermissionDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    ConstraintViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Import failed: {0}")]
    ImportFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Quote error: {0}")]
    Quote(String),

    #[error("Filing error: {0}")]
    Filing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Status reported to a request handler for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::PermissionDenied | Error::NotFound(_) => 401,
            Error::InvalidInput(_) => 422,
            Error::ConstraintViolation(_) => 409,
            Error::ImportFailure(_) => 204,
            Error::Storage(_) | Error::Config(_) | Error::Quote(_) | Error::Filing(_) | Error::Io(_) => 500,
        }
    }

    /// BUSY and LOCKED failures are worth one more attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Error::ConstraintViolation(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Quote(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
