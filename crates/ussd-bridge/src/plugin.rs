// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USSD plugin: method-call endpoint and event stream on a single main context.
//
// Every interaction (host method calls, listener attach/detach, OS
// callbacks) arrives as a `PluginMessage` on one unbounded queue. The
// plugin drains that queue from exactly one place, either `run().await` on
// a task or `pump()` from the host's own event loop, so no lock is needed
// around the session guard.

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use ussd_core::config::BridgeConfig;
use ussd_core::error::{Result, UssdError};
use ussd_core::types::{MethodCall, MethodResponse, SessionToken, SuccessPayload, UssdOutcome};

use crate::relay::{CallbackHandle, EventSink, OsCallback, ResultRelay};
use crate::traits::{Dispatch, PlatformBridge};

pub const METHOD_GET_PLATFORM_VERSION: &str = "getPlatformVersion";
pub const METHOD_SEND_USSD: &str = "sendUssd";
pub const METHOD_SEND_RESPONSE: &str = "sendResponse";
pub const METHOD_IS_USSD_SUPPORTED: &str = "isUssdSupported";

/// Queue entry processed on the plugin's main context.
pub(crate) enum PluginMessage {
    Invoke {
        call: MethodCall,
        reply: oneshot::Sender<MethodResponse>,
    },
    Callback {
        token: SessionToken,
        callback: OsCallback,
    },
    Listen {
        sink: EventSink,
    },
    Cancel,
    Detach,
}

/// Owner of all plugin state. Drive it with [`UssdPlugin::run`] or
/// [`UssdPlugin::pump`].
pub struct UssdPlugin {
    bridge: Box<dyn PlatformBridge>,
    config: BridgeConfig,
    relay: ResultRelay,
    sender: mpsc::UnboundedSender<PluginMessage>,
    receiver: mpsc::UnboundedReceiver<PluginMessage>,
    detached: bool,
}

impl UssdPlugin {
    pub fn new(bridge: Box<dyn PlatformBridge>, config: BridgeConfig) -> (Self, PluginHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        info!(
            platform = bridge.platform_name(),
            variant = ?bridge.variant(),
            method_channel = %config.method_channel,
            event_channel = %config.event_channel,
            "USSD plugin attached"
        );
        let handle = PluginHandle {
            sender: sender.clone(),
        };
        let plugin = Self {
            relay: ResultRelay::new(&config),
            bridge,
            config,
            sender,
            receiver,
            detached: false,
        };
        (plugin, handle)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Process messages until [`PluginHandle::detach`] is called.
    pub async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            if !self.handle(message) {
                break;
            }
        }
        // Answer anything queued behind the detach.
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            self.handle(message);
        }
        info!("USSD plugin loop stopped");
    }

    /// Process every message queued so far without waiting.
    ///
    /// Returns `false` once the plugin has been detached.
    pub fn pump(&mut self) -> bool {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if !self.handle(message) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle(&mut self, message: PluginMessage) -> bool {
        if self.detached {
            if let PluginMessage::Invoke { reply, .. } = message {
                let _ = reply.send(MethodResponse::from_error(&UssdError::Detached));
            }
            return false;
        }

        match message {
            PluginMessage::Invoke { call, reply } => self.on_method_call(call, reply),
            PluginMessage::Callback { token, callback } => {
                self.relay.deliver(token, callback);
            }
            PluginMessage::Listen { sink } => {
                debug!("USSD event listener attached");
                self.relay.attach(sink);
            }
            PluginMessage::Cancel => {
                debug!("USSD event listener cancelled");
                self.relay.detach_listener();
            }
            PluginMessage::Detach => {
                info!("USSD plugin detaching");
                if let Some(token) = self.relay.close(&UssdError::Detached) {
                    self.bridge.release(token);
                }
                self.detached = true;
                return false;
            }
        }
        true
    }

    #[instrument(skip_all, fields(method = %call.method))]
    fn on_method_call(&mut self, call: MethodCall, reply: oneshot::Sender<MethodResponse>) {
        let response = match call.method.as_str() {
            METHOD_GET_PLATFORM_VERSION => respond(self.bridge.platform_version()),
            METHOD_SEND_USSD => {
                // The reply may be held until the OS calls back.
                self.send_ussd(&call, reply);
                return;
            }
            METHOD_SEND_RESPONSE => respond(self.send_response(&call)),
            METHOD_IS_USSD_SUPPORTED => MethodResponse::success(self.is_ussd_supported()),
            other => {
                debug!(method = other, "method not implemented");
                MethodResponse::NotImplemented
            }
        };
        let _ = reply.send(response);
    }

    fn send_ussd(&mut self, call: &MethodCall, reply: oneshot::Sender<MethodResponse>) {
        let Some(code) = call.argument_str("ussdCode") else {
            let _ = reply.send(MethodResponse::from_error(&UssdError::InvalidArgument(
                "ussdCode".into(),
            )));
            return;
        };

        let token = self.relay.reserve();
        let callback = CallbackHandle::new(token, self.sender.clone());
        info!(%token, code, "sending USSD request");

        match self.bridge.send_ussd(code, callback) {
            Ok(Dispatch::AwaitingCallback) => {
                if let Some(previous) = self.relay.begin(token, code, reply) {
                    self.bridge.release(previous);
                }
            }
            Ok(Dispatch::Acknowledged) => {
                debug!(%token, "USSD code handed off, no result will follow");
                let _ = reply.send(MethodResponse::acknowledged());
            }
            Err(e) => {
                warn!(%token, error = %e, "USSD request rejected");
                let _ = reply.send(MethodResponse::from_error(&e));
            }
        }
    }

    /// Probe failures read as "not supported"; the host always gets a bool.
    fn is_ussd_supported(&self) -> bool {
        match self.bridge.is_ussd_supported() {
            Ok(supported) => supported,
            Err(e) => {
                warn!(error = %e, "USSD capability probe failed, reporting unsupported");
                false
            }
        }
    }

    fn send_response(&self, call: &MethodCall) -> Result<SuccessPayload> {
        if !self.bridge.supports_replies() {
            return Err(UssdError::NotSupported(format!(
                "Sending USSD response is not supported on {}.",
                self.bridge.platform_name()
            )));
        }
        let response = call
            .argument_str("response")
            .ok_or_else(|| UssdError::InvalidArgument("response".into()))?;
        debug!(len = response.len(), "submitting USSD response");
        self.bridge.submit_response(response)
    }
}

fn respond<T: serde::Serialize>(result: Result<T>) -> MethodResponse {
    match result {
        Ok(value) => MethodResponse::success(value),
        Err(e) => MethodResponse::from_error(&e),
    }
}

/// Cloneable handle for talking to a running [`UssdPlugin`].
#[derive(Clone)]
pub struct PluginHandle {
    sender: mpsc::UnboundedSender<PluginMessage>,
}

impl PluginHandle {
    /// Invoke a method and wait for its response.
    ///
    /// For `sendUssd` on a telephony platform this waits for the OS callback;
    /// there is no timeout.
    pub async fn invoke(&self, call: MethodCall) -> MethodResponse {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(PluginMessage::Invoke { call, reply })
            .is_err()
        {
            return MethodResponse::from_error(&UssdError::Detached);
        }
        response
            .await
            .unwrap_or_else(|_| MethodResponse::from_error(&UssdError::SessionClosed))
    }

    /// Queue a method call and return the receiver for its response.
    ///
    /// For hosts driving the plugin with [`UssdPlugin::pump`].
    pub fn invoke_deferred(&self, call: MethodCall) -> oneshot::Receiver<MethodResponse> {
        let (reply, response) = oneshot::channel();
        if let Err(mpsc::error::SendError(message)) =
            self.sender.send(PluginMessage::Invoke { call, reply })
        {
            if let PluginMessage::Invoke { reply, .. } = message {
                let _ = reply.send(MethodResponse::from_error(&UssdError::Detached));
            }
        }
        response
    }

    /// Attach to the event stream. A later `listen` ends this stream.
    pub fn listen(&self) -> EventStream {
        let (sink, receiver) = mpsc::unbounded_channel();
        let _ = self.sender.send(PluginMessage::Listen { sink });
        EventStream { receiver }
    }

    /// Detach the current event listener.
    pub fn cancel(&self) {
        let _ = self.sender.send(PluginMessage::Cancel);
    }

    /// Stop the plugin. Any outstanding send is answered with `DETACHED`.
    pub fn detach(&self) {
        let _ = self.sender.send(PluginMessage::Detach);
    }
}

/// Outcomes delivered while this listener is attached.
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<UssdOutcome>,
}

impl EventStream {
    /// Next outcome, or `None` once the listener is replaced or cancelled.
    pub async fn next(&mut self) -> Option<UssdOutcome> {
        self.receiver.recv().await
    }

    pub fn try_next(&mut self) -> Option<UssdOutcome> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubBridge, StubModem, StubProfile};
    use serde_json::json;
    use ussd_core::config::SupersedePolicy;
    use ussd_core::types::{ErrorPayload, SessionState};

    fn spawn_plugin(profile: StubProfile, config: BridgeConfig) -> (PluginHandle, StubModem) {
        let (bridge, modem) = StubBridge::simulated(profile);
        let (plugin, handle) = UssdPlugin::new(Box::new(bridge), config);
        tokio::spawn(plugin.run());
        (handle, modem)
    }

    fn send_ussd(code: &str) -> MethodCall {
        MethodCall::new(METHOD_SEND_USSD, json!({ "ussdCode": code }))
    }

    fn error_code(response: &MethodResponse) -> &str {
        match response {
            MethodResponse::Error(ErrorPayload { code, .. }) => code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn balance_reply_completes_send() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let mut events = handle.listen();

        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*123#")).await });

        let request = modem.next_request().await.unwrap();
        assert_eq!(request.code, "*123#");
        assert!(request.respond("Your balance is 5.00"));

        let expected = MethodResponse::success(SuccessPayload {
            message: "Your balance is 5.00".into(),
            state: SessionState::Done,
        });
        assert_eq!(pending.await.unwrap(), expected);
        assert_eq!(events.next().await.unwrap().to_response(), expected);
    }

    #[tokio::test]
    async fn menu_reply_waits_for_response() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*123#")).await });

        let menu = "Enter PIN:\n1. Option A\n2. Option B";
        modem.next_request().await.unwrap().respond(menu);

        let expected = MethodResponse::success(SuccessPayload {
            message: menu.into(),
            state: SessionState::WaitingForResponse,
        });
        assert_eq!(pending.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn os_failure_code_is_reported() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let mut events = handle.listen();
        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*123#")).await });

        modem.next_request().await.unwrap().fail(7);

        let response = pending.await.unwrap();
        assert_eq!(
            response,
            MethodResponse::Error(ErrorPayload {
                code: "USSD_FAILED".into(),
                message: "USSD request failed with code: 7".into(),
            })
        );
        assert!(!events.next().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn missing_code_never_reaches_os() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());

        let response = handle
            .invoke(MethodCall::new(METHOD_SEND_USSD, json!({ "ussdCode": null })))
            .await;
        assert_eq!(error_code(&response), "INVALID_ARGUMENT");
        assert!(modem.try_next_request().is_none());
    }

    #[tokio::test]
    async fn duplicate_callback_is_dropped() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let mut events = handle.listen();
        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*123#")).await });

        let request = modem.next_request().await.unwrap();
        request.respond("first");
        request.respond("second");
        request.fail(-1);

        assert!(matches!(pending.await.unwrap(), MethodResponse::Success { .. }));
        assert_eq!(
            events.next().await.unwrap(),
            UssdOutcome::Success {
                message: "first".into(),
                interactive: false,
            }
        );

        // A later session proves the duplicates were consumed and dropped.
        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*124#")).await });
        modem.next_request().await.unwrap().respond("next");
        pending.await.unwrap();
        assert_eq!(
            events.next().await.unwrap(),
            UssdOutcome::Success {
                message: "next".into(),
                interactive: false,
            }
        );
    }

    #[tokio::test]
    async fn dialer_platform_rejects_replies() {
        let (handle, _modem) = spawn_plugin(StubProfile::ios("17.4"), BridgeConfig::default());
        let response = handle
            .invoke(MethodCall::new(METHOD_SEND_RESPONSE, json!({ "response": "1" })))
            .await;
        assert_eq!(error_code(&response), "NOT_SUPPORTED");

        // Even without an argument.
        let response = handle
            .invoke(MethodCall::new(METHOD_SEND_RESPONSE, serde_json::Value::Null))
            .await;
        assert_eq!(error_code(&response), "NOT_SUPPORTED");
    }

    #[tokio::test]
    async fn dialer_platform_acknowledges_immediately() {
        let (handle, mut modem) = spawn_plugin(StubProfile::ios("17.4"), BridgeConfig::default());
        let response = handle.invoke(send_ussd("*123#")).await;
        assert_eq!(response, MethodResponse::acknowledged());

        let request = modem.next_request().await.unwrap();
        assert_eq!(request.dial_url.as_deref(), Some("tel://*123%23"));
        assert!(!request.respond("ignored"));
    }

    #[tokio::test]
    async fn dialer_unavailable_is_unsupported_operation() {
        let profile = StubProfile {
            can_place_calls: false,
            ..StubProfile::ios("17.4")
        };
        let (handle, _modem) = spawn_plugin(profile, BridgeConfig::default());
        let response = handle.invoke(send_ussd("*123#")).await;
        assert_eq!(error_code(&response), "UNSUPPORTED_OPERATION");
    }

    #[tokio::test]
    async fn telephony_reply_is_unconfirmed_stub() {
        let (handle, _modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let response = handle
            .invoke(MethodCall::new(METHOD_SEND_RESPONSE, json!({ "response": "1" })))
            .await;
        assert_eq!(
            response,
            MethodResponse::success(crate::traits::unconfirmed_reply())
        );

        let response = handle
            .invoke(MethodCall::new(METHOD_SEND_RESPONSE, json!({})))
            .await;
        assert_eq!(error_code(&response), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn old_android_is_rejected_before_os_call() {
        let (handle, mut modem) =
            spawn_plugin(StubProfile::android("7.0", 24), BridgeConfig::default());
        let response = handle.invoke(send_ussd("*123#")).await;
        assert_eq!(error_code(&response), "UNSUPPORTED_API_VERSION");
        assert!(modem.try_next_request().is_none());
    }

    #[tokio::test]
    async fn capability_probe_and_version() {
        let (handle, _modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let supported = handle
            .invoke(MethodCall::new(METHOD_IS_USSD_SUPPORTED, serde_json::Value::Null))
            .await;
        assert_eq!(supported, MethodResponse::success(true));

        let version = handle
            .invoke(MethodCall::new(METHOD_GET_PLATFORM_VERSION, serde_json::Value::Null))
            .await;
        assert_eq!(version, MethodResponse::success("Android 14"));

        let profile = StubProfile {
            sim_ready: false,
            ..StubProfile::default()
        };
        let (handle, _modem) = spawn_plugin(profile, BridgeConfig::default());
        let supported = handle
            .invoke(MethodCall::new(METHOD_IS_USSD_SUPPORTED, serde_json::Value::Null))
            .await;
        assert_eq!(supported, MethodResponse::success(false));
    }

    /// Telephony bridge whose probe cannot reach the OS, like UIKit off the
    /// main thread or a JNI call without READ_PHONE_STATE.
    struct UnreachableProbe;

    impl PlatformBridge for UnreachableProbe {
        fn platform_name(&self) -> &str {
            "Android"
        }

        fn platform_version(&self) -> Result<String> {
            Ok("Android 14".into())
        }

        fn variant(&self) -> ussd_core::types::PlatformVariant {
            ussd_core::types::PlatformVariant::Telephony
        }
    }

    impl crate::traits::NativeUssd for UnreachableProbe {
        fn send_ussd(&self, _code: &str, _callback: CallbackHandle) -> Result<Dispatch> {
            Err(UssdError::PlatformUnavailable)
        }
    }

    impl crate::traits::NativeUssdProbe for UnreachableProbe {
        fn is_ussd_supported(&self) -> Result<bool> {
            Err(UssdError::Bridge("getNetworkType: SecurityException".into()))
        }
    }

    impl crate::traits::NativeUssdReply for UnreachableProbe {
        fn supports_replies(&self) -> bool {
            true
        }

        fn submit_response(&self, _response: &str) -> Result<SuccessPayload> {
            Ok(crate::traits::unconfirmed_reply())
        }
    }

    #[tokio::test]
    async fn failed_probe_reports_unsupported() {
        let (plugin, handle) = UssdPlugin::new(Box::new(UnreachableProbe), BridgeConfig::default());
        tokio::spawn(plugin.run());

        let supported = handle
            .invoke(MethodCall::new(METHOD_IS_USSD_SUPPORTED, serde_json::Value::Null))
            .await;
        assert_eq!(supported, MethodResponse::success(false));
    }

    #[tokio::test]
    async fn unknown_method_is_not_implemented() {
        let (handle, _modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let response = handle
            .invoke(MethodCall::new("dialFriend", serde_json::Value::Null))
            .await;
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[tokio::test]
    async fn superseded_send_fails_and_late_callback_is_ignored() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let mut events = handle.listen();

        let caller = handle.clone();
        let first = tokio::spawn(async move { caller.invoke(send_ussd("*100#")).await });
        let first_request = modem.next_request().await.unwrap();

        let caller = handle.clone();
        let second = tokio::spawn(async move { caller.invoke(send_ussd("*200#")).await });
        let second_request = modem.next_request().await.unwrap();

        assert_eq!(error_code(&first.await.unwrap()), "SESSION_SUPERSEDED");
        assert_eq!(modem.next_release().await, Some(first_request.token));

        first_request.respond("late answer for *100#");
        second_request.respond("answer for *200#");

        let response = second.await.unwrap();
        assert_eq!(
            response,
            MethodResponse::success(SuccessPayload {
                message: "answer for *200#".into(),
                state: SessionState::Done,
            })
        );
        assert_eq!(
            events.next().await.unwrap(),
            UssdOutcome::Success {
                message: "answer for *200#".into(),
                interactive: false,
            }
        );
    }

    #[tokio::test]
    async fn orphaned_send_sees_closed_session() {
        let config = BridgeConfig {
            supersede_policy: SupersedePolicy::Orphan,
            ..BridgeConfig::default()
        };
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), config);

        let caller = handle.clone();
        let first = tokio::spawn(async move { caller.invoke(send_ussd("*100#")).await });
        modem.next_request().await.unwrap();
        let caller = handle.clone();
        let _second = tokio::spawn(async move { caller.invoke(send_ussd("*200#")).await });
        modem.next_request().await.unwrap();

        assert_eq!(error_code(&first.await.unwrap()), "SESSION_CLOSED");
    }

    #[tokio::test]
    async fn later_listener_replaces_earlier() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let mut first = handle.listen();
        let mut second = handle.listen();

        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*123#")).await });
        modem.next_request().await.unwrap().respond("ok");
        pending.await.unwrap();

        assert!(first.next().await.is_none());
        assert!(second.next().await.is_some());
    }

    #[tokio::test]
    async fn cancelled_listener_receives_nothing() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let mut events = handle.listen();
        handle.cancel();

        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*123#")).await });
        modem.next_request().await.unwrap().respond("ok");
        assert!(matches!(pending.await.unwrap(), MethodResponse::Success { .. }));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn detach_fails_outstanding_send() {
        let (handle, mut modem) = spawn_plugin(StubProfile::default(), BridgeConfig::default());
        let caller = handle.clone();
        let pending = tokio::spawn(async move { caller.invoke(send_ussd("*123#")).await });
        let request = modem.next_request().await.unwrap();

        handle.detach();
        assert_eq!(error_code(&pending.await.unwrap()), "DETACHED");
        assert_eq!(modem.next_release().await, Some(request.token));

        let after = handle
            .invoke(MethodCall::new(METHOD_IS_USSD_SUPPORTED, serde_json::Value::Null))
            .await;
        assert_eq!(error_code(&after), "DETACHED");
    }

    #[test]
    fn pump_drives_plugin_without_runtime() {
        let (bridge, mut modem) = StubBridge::simulated(StubProfile::default());
        let (mut plugin, handle) = UssdPlugin::new(Box::new(bridge), BridgeConfig::default());
        let mut events = handle.listen();

        let mut response = handle.invoke_deferred(send_ussd("*123#"));
        assert!(plugin.pump());
        assert!(response.try_recv().is_err());

        let request = modem.try_next_request().unwrap();
        request.respond("Your balance is 5.00");
        request.respond("duplicate");
        assert!(plugin.pump());

        assert!(matches!(response.try_recv().unwrap(), MethodResponse::Success { .. }));
        assert!(events.try_next().is_some());
        assert!(events.try_next().is_none());

        handle.detach();
        assert!(!plugin.pump());
    }
}
