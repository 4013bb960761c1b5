// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! USSD relay: native platform bridge and result relay.
//!
//! The platform bridges forward a USSD code to the OS telephony stack
//! (Android, via JNI) or hand it to the dialer (iOS, via objc2). OS callbacks
//! are posted onto the plugin's queue and delivered at most once per session
//! by the relay running on the plugin's main context.

pub mod plugin;
pub mod relay;
pub mod session;
pub mod stub;
pub mod traits;

#[cfg(target_os = "ios")]
pub mod ios;

#[cfg(target_os = "android")]
pub mod android;

pub use plugin::{EventStream, PluginHandle, UssdPlugin};
pub use relay::{CallbackHandle, OsCallback};

use ussd_core::BridgeConfig;

/// Builds the bridge implementation for the target operating system.
pub fn platform_bridge(config: &BridgeConfig) -> Box<dyn traits::PlatformBridge> {
    #[cfg(target_os = "ios")]
    {
        let _ = config;
        Box::new(ios::IosBridge::new())
    }
    #[cfg(target_os = "android")]
    {
        Box::new(android::AndroidBridge::new(config.min_sdk_version))
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        // Desktop/CI: no modem, every USSD call reports PlatformUnavailable.
        let _ = config;
        Box::new(stub::StubBridge::new())
    }
}
