// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for desktop/CI builds where native mobile APIs are unavailable.
//
// `StubBridge::new()` has no modem: every USSD call returns
// `PlatformUnavailable`. `StubBridge::simulated` behaves like an Android or
// iOS device and hands each issued request to a `StubModem`, which tests and
// the desktop host use to fire the OS callbacks.

use tokio::sync::mpsc;

use ussd_core::dial::tel_url;
use ussd_core::error::{Result, UssdError};
use ussd_core::types::{PlatformVariant, SessionToken, SuccessPayload};

use crate::relay::CallbackHandle;
use crate::traits::*;

/// Device characteristics for a simulated bridge.
#[derive(Debug, Clone)]
pub struct StubProfile {
    pub platform: String,
    pub os_version: String,
    pub variant: PlatformVariant,
    /// Android API level (ignored for the dialer variant).
    pub sdk_version: u32,
    pub min_sdk_version: u32,
    pub sim_ready: bool,
    pub network_registered: bool,
    /// Whether the dialer can be opened (dialer variant only).
    pub can_place_calls: bool,
}

impl StubProfile {
    pub fn android(release: &str, sdk_version: u32) -> Self {
        Self {
            platform: "Android".into(),
            os_version: release.into(),
            variant: PlatformVariant::Telephony,
            sdk_version,
            min_sdk_version: 26,
            sim_ready: true,
            network_registered: true,
            can_place_calls: true,
        }
    }

    pub fn ios(version: &str) -> Self {
        Self {
            platform: "iOS".into(),
            os_version: version.into(),
            variant: PlatformVariant::DialerOnly,
            sdk_version: 0,
            min_sdk_version: 0,
            sim_ready: true,
            network_registered: true,
            can_place_calls: true,
        }
    }
}

impl Default for StubProfile {
    fn default() -> Self {
        Self::android("14", 34)
    }
}

/// A request the simulated OS accepted.
#[derive(Debug)]
pub struct IssuedRequest {
    pub token: SessionToken,
    pub code: String,
    /// Set when the code was handed to the dialer instead of a USSD session.
    pub dial_url: Option<String>,
    callback: Option<CallbackHandle>,
}

impl IssuedRequest {
    /// Fire `onReceiveUssdResponse`. Returns `false` for dialer hand-offs.
    pub fn respond(&self, text: &str) -> bool {
        match &self.callback {
            Some(cb) => {
                cb.on_response(text);
                true
            }
            None => false,
        }
    }

    /// Fire `onReceiveUssdResponseFailed`. Returns `false` for dialer hand-offs.
    pub fn fail(&self, failure_code: i32) -> bool {
        match &self.callback {
            Some(cb) => {
                cb.on_failure(failure_code);
                true
            }
            None => false,
        }
    }
}

/// Receiving end of a simulated bridge: one entry per accepted request.
pub struct StubModem {
    requests: mpsc::UnboundedReceiver<IssuedRequest>,
    releases: mpsc::UnboundedReceiver<SessionToken>,
}

impl StubModem {
    pub async fn next_request(&mut self) -> Option<IssuedRequest> {
        self.requests.recv().await
    }

    pub fn try_next_request(&mut self) -> Option<IssuedRequest> {
        self.requests.try_recv().ok()
    }

    /// Token of the next request the plugin gave up on.
    pub async fn next_release(&mut self) -> Option<SessionToken> {
        self.releases.recv().await
    }

    pub fn try_next_release(&mut self) -> Option<SessionToken> {
        self.releases.try_recv().ok()
    }
}

/// No-op bridge returned on non-mobile platforms, or a simulated device.
pub struct StubBridge {
    device: Option<(StubProfile, mpsc::UnboundedSender<IssuedRequest>)>,
    releases: Option<mpsc::UnboundedSender<SessionToken>>,
}

impl StubBridge {
    /// Bridge with no modem.
    pub fn new() -> Self {
        Self {
            device: None,
            releases: None,
        }
    }

    /// Bridge that behaves like the device described by `profile`.
    pub fn simulated(profile: StubProfile) -> (Self, StubModem) {
        let (tx, requests) = mpsc::unbounded_channel();
        let (release_tx, releases) = mpsc::unbounded_channel();
        (
            Self {
                device: Some((profile, tx)),
                releases: Some(release_tx),
            },
            StubModem { requests, releases },
        )
    }

    fn record(&self, sender: &mpsc::UnboundedSender<IssuedRequest>, request: IssuedRequest) {
        if sender.send(request).is_err() {
            tracing::debug!("stub modem dropped, request not recorded");
        }
    }
}

impl Default for StubBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        match &self.device {
            Some((profile, _)) => &profile.platform,
            None => "Desktop (stub)",
        }
    }

    fn platform_version(&self) -> Result<String> {
        Ok(match &self.device {
            Some((profile, _)) => format!("{} {}", profile.platform, profile.os_version),
            None => "Desktop (stub)".into(),
        })
    }

    fn variant(&self) -> PlatformVariant {
        match &self.device {
            Some((profile, _)) => profile.variant,
            None => PlatformVariant::Telephony,
        }
    }
}

impl NativeUssd for StubBridge {
    fn send_ussd(&self, code: &str, callback: CallbackHandle) -> Result<Dispatch> {
        let Some((profile, sender)) = &self.device else {
            tracing::warn!("NativeUssd::send_ussd called on stub bridge");
            return Err(UssdError::PlatformUnavailable);
        };

        match profile.variant {
            PlatformVariant::Telephony => {
                if profile.sdk_version < profile.min_sdk_version {
                    return Err(UssdError::UnsupportedPlatformVersion {
                        sdk: profile.sdk_version,
                        required: profile.min_sdk_version,
                    });
                }
                self.record(
                    sender,
                    IssuedRequest {
                        token: callback.token(),
                        code: code.into(),
                        dial_url: None,
                        callback: Some(callback),
                    },
                );
                Ok(Dispatch::AwaitingCallback)
            }
            PlatformVariant::DialerOnly => {
                if !profile.can_place_calls {
                    return Err(UssdError::UnsupportedOperation(
                        "Could not open dialer with USSD code.".into(),
                    ));
                }
                self.record(
                    sender,
                    IssuedRequest {
                        token: callback.token(),
                        code: code.into(),
                        dial_url: Some(tel_url(code)),
                        callback: None,
                    },
                );
                Ok(Dispatch::Acknowledged)
            }
        }
    }

    fn release(&self, token: SessionToken) {
        if let Some(releases) = &self.releases {
            let _ = releases.send(token);
        }
    }
}

impl NativeUssdProbe for StubBridge {
    fn is_ussd_supported(&self) -> Result<bool> {
        Ok(match &self.device {
            Some((profile, _)) => match profile.variant {
                PlatformVariant::Telephony => profile.sim_ready && profile.network_registered,
                PlatformVariant::DialerOnly => profile.can_place_calls,
            },
            None => false,
        })
    }
}

impl NativeUssdReply for StubBridge {
    fn supports_replies(&self) -> bool {
        matches!(&self.device, Some((profile, _)) if profile.variant == PlatformVariant::Telephony)
    }

    fn submit_response(&self, _response: &str) -> Result<SuccessPayload> {
        match &self.device {
            Some((profile, _)) if profile.variant == PlatformVariant::Telephony => {
                Ok(unconfirmed_reply())
            }
            Some((profile, _)) => Err(UssdError::NotSupported(format!(
                "Sending USSD response is not supported on {}.",
                profile.platform
            ))),
            None => Err(UssdError::PlatformUnavailable),
        }
    }
}
