// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for native USSD capabilities.
//
// Android can run a USSD session and report its result; iOS can only open
// the dialer. The traits cover both, and `PlatformBridge::variant` tells the
// plugin which behaviour to expect.

use ussd_core::error::Result;
use ussd_core::types::{PlatformVariant, SessionState, SessionToken, SuccessPayload};

use crate::relay::CallbackHandle;

/// Unified bridge that groups all native USSD capabilities.
///
/// Implementations are driven from the plugin's main context only.
pub trait PlatformBridge: NativeUssd + NativeUssdProbe + NativeUssdReply + Send + Sync {
    /// Human-readable platform name (e.g. "Android", "iOS").
    fn platform_name(&self) -> &str;

    /// OS release string reported by `getPlatformVersion`, e.g. "Android 14".
    fn platform_version(&self) -> Result<String>;

    fn variant(&self) -> PlatformVariant;
}

/// How the platform accepted a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The OS owns the request and will call back through the handle.
    AwaitingCallback,
    /// The code was handed off (e.g. to the dialer). No callback will follow.
    Acknowledged,
}

/// Issue USSD requests to the OS.
pub trait NativeUssd {
    /// Send `code`. Callbacks must go through `callback`, from any thread.
    ///
    /// Returns an error without touching the OS when the platform cannot
    /// run USSD at all (too old, no dialer).
    fn send_ussd(&self, code: &str, callback: CallbackHandle) -> Result<Dispatch>;

    /// Forget a request whose session was superseded or closed before the OS
    /// called back. Any later callback for `token` is dropped by the relay.
    fn release(&self, token: SessionToken) {
        let _ = token;
    }
}

/// Report whether USSD is usable right now.
pub trait NativeUssdProbe {
    fn is_ussd_supported(&self) -> Result<bool>;
}

/// Continue an interactive USSD session.
pub trait NativeUssdReply {
    /// Whether `submit_response` is allowed at all on this platform.
    fn supports_replies(&self) -> bool;

    fn submit_response(&self, response: &str) -> Result<SuccessPayload>;
}

/// Acknowledgment for a reply the OS gives us no way to actually deliver.
pub fn unconfirmed_reply() -> SuccessPayload {
    SuccessPayload {
        message: "Response sent (not guaranteed)".into(),
        state: SessionState::WaitingForResponse,
    }
}
