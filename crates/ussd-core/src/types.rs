// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the USSD relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UssdError;

/// Generation number identifying one accepted USSD send.
///
/// Tokens are allocated monotonically by the session guard and are attached
/// to every OS callback so that late callbacks for a superseded session can
/// be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub u64);

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which kind of USSD support the running platform offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformVariant {
    /// Programmatic USSD sessions with an OS callback (Android API 26+).
    Telephony,
    /// Only a dialer hand-off is possible; no result ever comes back (iOS).
    DialerOnly,
}

/// Whether the carrier menu expects a follow-up reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Done,
    WaitingForResponse,
}

/// Terminal result of one USSD send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UssdOutcome {
    Success { message: String, interactive: bool },
    Failure { code: String, message: String },
}

impl UssdOutcome {
    /// Failure outcome carrying the error's wire code and message.
    pub fn from_error(err: &UssdError) -> Self {
        Self::Failure {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Convert into the response handed to the one-shot result sink.
    pub fn to_response(&self) -> MethodResponse {
        match self {
            Self::Success {
                message,
                interactive,
            } => MethodResponse::success(SuccessPayload {
                message: message.clone(),
                state: if *interactive {
                    SessionState::WaitingForResponse
                } else {
                    SessionState::Done
                },
            }),
            Self::Failure { code, message } => MethodResponse::Error(ErrorPayload {
                code: code.clone(),
                message: message.clone(),
            }),
        }
    }
}

/// Success payload: `{message, state}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub message: String,
    pub state: SessionState,
}

/// Error payload: `{code, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// A request arriving on the method-call endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// String argument by name. Missing keys, `null`, and non-string values
    /// all read as `None`.
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// Reply to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success { result: Value },
    Error(ErrorPayload),
    NotImplemented,
}

impl MethodResponse {
    pub fn success(payload: impl Serialize) -> Self {
        match serde_json::to_value(payload) {
            Ok(result) => Self::Success { result },
            Err(e) => Self::from_error(&UssdError::Serialization(e)),
        }
    }

    /// Success with a `null` result (dialer hand-off acknowledgment).
    pub fn acknowledged() -> Self {
        Self::Success {
            result: Value::Null,
        }
    }

    pub fn from_error(err: &UssdError) -> Self {
        Self::Error(err.to_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interactive_success_maps_to_waiting_state() {
        let outcome = UssdOutcome::Success {
            message: "1. Balance\n2. Bundles".into(),
            interactive: true,
        };
        let json = serde_json::to_value(outcome.to_response()).unwrap();
        assert_eq!(
            json,
            json!({
                "status": "success",
                "result": { "message": "1. Balance\n2. Bundles", "state": "waiting_for_response" }
            })
        );
    }

    #[test]
    fn failure_maps_to_error_payload() {
        let outcome = UssdOutcome::from_error(&UssdError::UssdFailed { failure_code: -1 });
        assert!(!outcome.is_success());
        let json = serde_json::to_value(outcome.to_response()).unwrap();
        assert_eq!(
            json,
            json!({
                "status": "error",
                "code": "USSD_FAILED",
                "message": "USSD request failed with code: -1"
            })
        );
    }

    #[test]
    fn argument_lookup_treats_null_as_missing() {
        let call = MethodCall::new("sendUssd", json!({ "ussdCode": null }));
        assert_eq!(call.argument_str("ussdCode"), None);

        let call = MethodCall::new("sendUssd", json!({ "ussdCode": "*123#" }));
        assert_eq!(call.argument_str("ussdCode"), Some("*123#"));

        let call: MethodCall = serde_json::from_str(r#"{"method":"isUssdSupported"}"#).unwrap();
        assert_eq!(call.arguments, Value::Null);
        assert_eq!(call.argument_str("anything"), None);
    }

    #[test]
    fn token_display() {
        assert_eq!(SessionToken(42).to_string(), "#42");
    }
}
