// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// iOS platform bridge via objc2.
//
// Requires compilation with the iOS SDK (Xcode). Third-party iOS apps cannot
// run USSD sessions: the only option is to open the Phone app with the code
// pre-filled via a `tel://` URL. No result ever comes back, so `send_ussd`
// acknowledges immediately and replies are refused outright.
//
// This module is cfg-gated to `target_os = "ios"` and will not compile on other
// platforms. `UIApplication` and `UIDevice` require the main thread; every
// method returns `UssdError::Bridge` if called off-main, so iOS hosts drive
// `UssdPlugin::pump` from the main run loop.

#![cfg(target_os = "ios")]

use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::{MainThreadMarker, msg_send};
use objc2_foundation::{NSDictionary, NSString, NSURL};
use objc2_ui_kit::UIApplication;

use ussd_core::dial::tel_url;
use ussd_core::error::{Result, UssdError};
use ussd_core::types::{PlatformVariant, SuccessPayload};

use crate::relay::CallbackHandle;
use crate::traits::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Assert that we are on the main thread and return the marker.
fn require_main_thread() -> Result<MainThreadMarker> {
    MainThreadMarker::new()
        .ok_or_else(|| UssdError::Bridge("must be called from the main thread".into()))
}

/// Parse `url` into an `NSURL`. `None` if Foundation rejects it.
fn ns_url(url: &str) -> Option<Retained<NSURL>> {
    NSURL::URLWithString(&NSString::from_str(url))
}

/// `-[UIApplication canOpenURL:]`.
fn can_open(app: &UIApplication, url: &NSURL) -> bool {
    // SAFETY: canOpenURL: is a documented UIApplication selector taking an
    // NSURL and returning BOOL. Caller holds a MainThreadMarker.
    unsafe { msg_send![app, canOpenURL: url] }
}

// ---------------------------------------------------------------------------
// Bridge struct
// ---------------------------------------------------------------------------

/// Concrete iOS platform bridge. Zero-sized; all state lives in UIKit.
pub struct IosBridge;

impl IosBridge {
    /// Create a new iOS bridge instance.
    pub fn new() -> Self {
        Self
    }
}

impl Default for IosBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBridge for IosBridge {
    fn platform_name(&self) -> &str {
        "iOS"
    }

    /// `"iOS " + UIDevice.currentDevice.systemVersion`.
    fn platform_version(&self) -> Result<String> {
        let _mtm = require_main_thread()?;

        // SAFETY: currentDevice and systemVersion are documented UIDevice
        // selectors; main thread confirmed above.
        let version: Retained<NSString> = unsafe {
            let device: Retained<AnyObject> = msg_send![objc2::class!(UIDevice), currentDevice];
            msg_send![&device, systemVersion]
        };
        Ok(format!("iOS {version}"))
    }

    fn variant(&self) -> PlatformVariant {
        PlatformVariant::DialerOnly
    }
}

// ---------------------------------------------------------------------------
// NativeUssd -- tel:// hand-off to the Phone app
// ---------------------------------------------------------------------------

impl NativeUssd for IosBridge {
    /// Open the Phone app with `code` pre-filled.
    ///
    /// The callback handle is dropped: the app never learns the result.
    ///
    /// # Errors
    ///
    /// Returns `UssdError::UnsupportedOperation` if the URL cannot be built or
    /// the device cannot open `tel://` URLs.
    fn send_ussd(&self, code: &str, callback: CallbackHandle) -> Result<Dispatch> {
        let mtm = require_main_thread()?;
        let token = callback.token();
        drop(callback);

        let app = UIApplication::sharedApplication(mtm);
        let url = ns_url(&tel_url(code))
            .filter(|url| can_open(&app, url))
            .ok_or_else(|| {
                UssdError::UnsupportedOperation("Could not open dialer with USSD code.".into())
            })?;

        tracing::info!(%token, "iOS: opening dialer with USSD code");

        let options = NSDictionary::<NSString, AnyObject>::new();
        // SAFETY: openURL:options:completionHandler: is the documented
        // UIApplication method; a nil completion handler is allowed.
        unsafe {
            let _: () = msg_send![
                &app,
                openURL: &*url,
                options: &*options,
                completionHandler: std::ptr::null::<AnyObject>()
            ];
        }

        Ok(Dispatch::Acknowledged)
    }
}

// ---------------------------------------------------------------------------
// NativeUssdProbe -- can the device place calls at all
// ---------------------------------------------------------------------------

impl NativeUssdProbe for IosBridge {
    /// Whether `tel://` URLs open. A weak proxy: real USSD support cannot be
    /// introspected on iOS.
    fn is_ussd_supported(&self) -> Result<bool> {
        let mtm = require_main_thread()?;
        let app = UIApplication::sharedApplication(mtm);
        Ok(ns_url("tel://").is_some_and(|url| can_open(&app, &url)))
    }
}

impl NativeUssdReply for IosBridge {
    fn supports_replies(&self) -> bool {
        false
    }

    fn submit_response(&self, _response: &str) -> Result<SuccessPayload> {
        Err(UssdError::NotSupported(
            "Sending USSD response is not supported on iOS.".into(),
        ))
    }
}
