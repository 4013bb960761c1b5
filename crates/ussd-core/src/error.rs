// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the USSD relay.

use thiserror::Error;

use crate::types::{ErrorPayload, SessionToken};

/// Top-level error type for all USSD relay operations.
#[derive(Debug, Error)]
pub enum UssdError {
    // -- Caller errors --
    #[error("{0} cannot be null")]
    InvalidArgument(String),

    // -- Platform capability --
    #[error("USSD API is only supported on Android O (API {required}) and above (running API {sdk}).")]
    UnsupportedPlatformVersion { sdk: u32, required: u32 },

    #[error("{0}")]
    UnsupportedOperation(String),

    #[error("{0}")]
    NotSupported(String),

    // -- Session outcome --
    #[error("USSD request failed with code: {failure_code}")]
    UssdFailed { failure_code: i32 },

    #[error("USSD session {token} was superseded by a newer request")]
    SessionSuperseded { token: SessionToken },

    #[error("USSD session closed before a result was delivered")]
    SessionClosed,

    #[error("USSD plugin is detached")]
    Detached,

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("USSD is not available on this platform")]
    PlatformUnavailable,

    // -- Configuration --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UssdError {
    /// Stable wire code reported to the host in `(code, message)` pairs.
    pub fn code(&self) -> &'static str {
        match self {
            UssdError::InvalidArgument(_) => "INVALID_ARGUMENT",
            UssdError::UnsupportedPlatformVersion { .. } => "UNSUPPORTED_API_VERSION",
            UssdError::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            UssdError::NotSupported(_) => "NOT_SUPPORTED",
            UssdError::UssdFailed { .. } => "USSD_FAILED",
            UssdError::SessionSuperseded { .. } => "SESSION_SUPERSEDED",
            UssdError::SessionClosed => "SESSION_CLOSED",
            UssdError::Detached => "DETACHED",
            UssdError::Bridge(_) => "BRIDGE_ERROR",
            UssdError::PlatformUnavailable => "PLATFORM_UNAVAILABLE",
            UssdError::Io(_) => "IO_ERROR",
            UssdError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Build the `{code, message}` payload sent across the host boundary.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, UssdError>;
