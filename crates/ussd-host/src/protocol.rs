// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON-lines protocol spoken on stdin/stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ussd_core::human_errors::humanize_payload;
use ussd_core::types::{MethodCall, MethodResponse};

/// Which simulated OS callback to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedCallback {
    Response,
    Failure,
}

/// One stdin line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HostInput {
    /// `{"id": 1, "method": "sendUssd", "arguments": {"ussdCode": "*123#"}}`
    Call {
        #[serde(default)]
        id: Option<Value>,
        method: String,
        #[serde(default)]
        arguments: Value,
    },
    /// `{"simulate": "response", "text": "..."}` or `{"simulate": "failure", "code": 7}`
    Simulate {
        simulate: SimulatedCallback,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        code: Option<i32>,
    },
    /// `{"listen": true}` attaches the event stream, `false` cancels it.
    Listen { listen: bool },
}

impl HostInput {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Build the plugin call for a `Call` line.
pub fn method_call(method: String, arguments: Value) -> MethodCall {
    MethodCall { method, arguments }
}

/// Plain-language explanation attached to error responses and events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hint {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
}

impl Hint {
    /// `None` unless `response` is an error.
    pub fn for_response(response: &MethodResponse) -> Option<Self> {
        let MethodResponse::Error(payload) = response else {
            return None;
        };
        let human = humanize_payload(payload);
        Some(Self {
            message: human.message,
            suggestion: human.suggestion,
            retriable: human.retriable,
        })
    }
}

/// One stdout line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostOutput {
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        method: String,
        response: MethodResponse,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<Hint>,
    },
    Event {
        event: MethodResponse,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<Hint>,
    },
    Error {
        message: String,
    },
}

impl HostOutput {
    pub fn response(id: Option<Value>, method: String, response: MethodResponse) -> Self {
        let hint = Hint::for_response(&response);
        Self::Response {
            id,
            method,
            response,
            hint,
        }
    }

    pub fn event(event: MethodResponse) -> Self {
        let hint = Hint::for_response(&event);
        Self::Event { event, hint }
    }
}
