// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for USSD failures.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Nothing here triggers an automatic retry; `retriable` only tells the user
// whether dialing again by hand is worth a try.

use crate::error::UssdError;
use crate::types::ErrorPayload;

/// `TelephonyManager.USSD_RETURN_FAILURE`: the network rejected the request.
pub const USSD_RETURN_FAILURE: i32 = -1;

/// `TelephonyManager.USSD_ERROR_SERVICE_UNAVAIL`: the radio could not run it.
pub const USSD_ERROR_SERVICE_UNAVAIL: i32 = -2;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or busy carrier. Dialing again may work.
    Transient,
    /// User must do something (insert SIM, enable permission, type a code).
    ActionRequired,
    /// Cannot be fixed on this device.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether dialing the code again by hand may succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `UssdError` into a `HumanError` suitable for display.
pub fn humanize_error(err: &UssdError) -> HumanError {
    match err {
        UssdError::UssdFailed { failure_code } => humanize_failure_code(*failure_code),
        other => humanize_code(other.code()),
    }
}

/// Same mapping as [`humanize_error`], for a `{code, message}` pair that has
/// already crossed the method-call boundary.
pub fn humanize_payload(payload: &ErrorPayload) -> HumanError {
    if payload.code == "USSD_FAILED" {
        let failure_code = payload
            .message
            .rsplit_once(": ")
            .and_then(|(_, n)| n.trim().parse().ok());
        if let Some(failure_code) = failure_code {
            return humanize_failure_code(failure_code);
        }
    }
    humanize_code(&payload.code)
}

fn humanize_code(code: &str) -> HumanError {
    match code {
        "INVALID_ARGUMENT" => HumanError {
            message: "A required value was missing.".into(),
            suggestion: "Enter a USSD code such as *123#, or a menu reply, and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        "UNSUPPORTED_API_VERSION" => HumanError {
            message: "This phone's Android version is too old for USSD codes in apps.".into(),
            suggestion: "Dial the code from the phone app instead, or update Android.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        "UNSUPPORTED_OPERATION" => HumanError {
            message: "The phone app couldn't be opened.".into(),
            suggestion: "Check that this device can make calls, then dial the code by hand.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        "NOT_SUPPORTED" => HumanError {
            message: "Replying to USSD menus isn't possible on this device.".into(),
            suggestion: "Continue the menu in the phone app.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        "SESSION_SUPERSEDED" => HumanError {
            message: "A newer code was sent before this one finished.".into(),
            suggestion: "Wait for one code to finish before sending another.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        "SESSION_CLOSED" | "DETACHED" => HumanError {
            message: "The request was cancelled before the network answered.".into(),
            suggestion: "Try sending the code again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        "PLATFORM_UNAVAILABLE" => HumanError {
            message: "USSD codes aren't available on this device.".into(),
            suggestion: "USSD needs a phone with a SIM card.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        "IO_ERROR" | "SERIALIZATION_ERROR" => HumanError {
            message: "The app's settings couldn't be read.".into(),
            suggestion: "Default settings are being used. Check the configuration file if this persists.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // BRIDGE_ERROR and anything unrecognised.
        _ => HumanError {
            message: "A device-specific feature didn't work.".into(),
            suggestion: "Try restarting the app. Some features may not be available on all devices.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

/// Map Android's `onReceiveUssdResponseFailed` codes to messages.
fn humanize_failure_code(failure_code: i32) -> HumanError {
    match failure_code {
        USSD_RETURN_FAILURE => HumanError {
            message: "The network rejected this code.".into(),
            suggestion: "Check the code is correct for your carrier and try again.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        USSD_ERROR_SERVICE_UNAVAIL => HumanError {
            message: "The mobile network isn't available right now.".into(),
            suggestion: "Make sure you have signal and that airplane mode is off, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        other => HumanError {
            message: "The USSD request didn't go through.".into(),
            suggestion: format!("Try again in a moment. (Network code: {other})"),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
