// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result relay: fans one session outcome out to the caller and the listener.
//
// OS callbacks never touch relay state directly. A `CallbackHandle` posts
// the raw callback onto the plugin queue, and the plugin's main context
// calls `ResultRelay::deliver`, so every guard read and write happens on
// one serial context.

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use ussd_core::config::{BridgeConfig, SupersedePolicy};
use ussd_core::error::UssdError;
use ussd_core::menu::looks_interactive;
use ussd_core::types::{MethodResponse, SessionToken, UssdOutcome};

use crate::plugin::PluginMessage;
use crate::session::{Rejection, SessionGuard};

/// One-shot sink answering the `sendUssd` call that started a session.
pub type ResultSink = oneshot::Sender<MethodResponse>;

/// Persistent sink feeding the attached event stream.
pub type EventSink = mpsc::UnboundedSender<UssdOutcome>;

/// Raw result reported by the OS telephony stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsCallback {
    /// `onReceiveUssdResponse` with the carrier's text.
    Response(String),
    /// `onReceiveUssdResponseFailed` with the OS failure code.
    Failed { failure_code: i32 },
}

/// Handed to a platform bridge for each request it issues.
///
/// Safe to call from any thread; callbacks are queued for the main context.
#[derive(Clone)]
pub struct CallbackHandle {
    token: SessionToken,
    sender: mpsc::UnboundedSender<PluginMessage>,
}

impl CallbackHandle {
    pub(crate) fn new(token: SessionToken, sender: mpsc::UnboundedSender<PluginMessage>) -> Self {
        Self { token, sender }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn on_response(&self, response: impl Into<String>) {
        self.post(OsCallback::Response(response.into()));
    }

    pub fn on_failure(&self, failure_code: i32) {
        self.post(OsCallback::Failed { failure_code });
    }

    fn post(&self, callback: OsCallback) {
        let message = PluginMessage::Callback {
            token: self.token,
            callback,
        };
        if self.sender.send(message).is_err() {
            debug!(token = %self.token, "plugin detached, dropping USSD callback");
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Main-context state: the session guard plus the attached listener.
pub struct ResultRelay {
    guard: SessionGuard<ResultSink>,
    event_sink: Option<EventSink>,
    supersede_policy: SupersedePolicy,
    detect_menu_options: bool,
}

impl ResultRelay {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            guard: SessionGuard::new(),
            event_sink: None,
            supersede_policy: config.supersede_policy,
            detect_menu_options: config.detect_menu_options,
        }
    }

    pub fn reserve(&mut self) -> SessionToken {
        self.guard.reserve()
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.guard.active_token()
    }

    /// Make `token` the outstanding session, settling whichever it replaces.
    ///
    /// Returns the superseded token, if any.
    pub fn begin(&mut self, token: SessionToken, code: &str, sink: ResultSink) -> Option<SessionToken> {
        let mut previous = self.guard.activate(token, code, sink)?;
        info!(
            previous = %previous.token,
            current = %token,
            policy = ?self.supersede_policy,
            "USSD session superseded"
        );
        if self.supersede_policy == SupersedePolicy::Fail {
            if let Some(sink) = previous.take_sink() {
                let err = UssdError::SessionSuperseded {
                    token: previous.token,
                };
                let _ = sink.send(MethodResponse::from_error(&err));
            }
        }
        Some(previous.token)
    }

    /// Deliver an OS callback for `token`. Returns `false` if it was dropped.
    pub fn deliver(&mut self, token: SessionToken, callback: OsCallback) -> bool {
        let mut session = match self.guard.complete(token) {
            Ok(session) => session,
            Err(Rejection::Duplicate) => {
                warn!(%token, "result already sent, ignoring duplicate USSD callback");
                return false;
            }
            Err(Rejection::Stale) => {
                warn!(
                    %token,
                    active = ?self.guard.active_token(),
                    "ignoring USSD callback for a stale session"
                );
                return false;
            }
        };

        let outcome = self.outcome_for(callback);
        let elapsed = Utc::now() - session.started_at;
        info!(
            %token,
            code = %session.code,
            success = outcome.is_success(),
            elapsed_ms = elapsed.num_milliseconds(),
            "delivering USSD outcome"
        );

        if let Some(events) = &self.event_sink {
            if events.send(outcome.clone()).is_err() {
                debug!("event listener went away, releasing sink");
                self.event_sink = None;
            }
        }
        if let Some(sink) = session.take_sink() {
            if sink.send(outcome.to_response()).is_err() {
                debug!(%token, "caller stopped waiting for USSD result");
            }
        }
        true
    }

    /// Attach the event-stream listener, replacing any earlier one.
    pub fn attach(&mut self, sink: EventSink) {
        if self.event_sink.replace(sink).is_some() {
            debug!("replacing attached USSD event listener");
        }
    }

    pub fn detach_listener(&mut self) {
        self.event_sink = None;
    }

    /// Fail the outstanding session with `err` and drop the listener.
    ///
    /// Returns the token of the session that was closed, if any.
    pub fn close(&mut self, err: &UssdError) -> Option<SessionToken> {
        self.event_sink = None;
        let mut session = self.guard.clear()?;
        debug!(token = %session.token, "closing outstanding USSD session");
        if let Some(sink) = session.take_sink() {
            let _ = sink.send(MethodResponse::from_error(err));
        }
        Some(session.token)
    }

    fn outcome_for(&self, callback: OsCallback) -> UssdOutcome {
        match callback {
            OsCallback::Response(message) => UssdOutcome::Success {
                interactive: looks_interactive(&message, self.detect_menu_options),
                message,
            },
            OsCallback::Failed { failure_code } => {
                UssdOutcome::from_error(&UssdError::UssdFailed { failure_code })
            }
        }
    }
}
