// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single in-flight USSD session tracking.
//
// Each accepted send gets a fresh generation token. Only a callback carrying
// the active session's token can complete it, and completing removes the
// session, so a second callback for the same token is always rejected.

use chrono::{DateTime, Utc};

use ussd_core::types::SessionToken;

/// One accepted USSD send, holding the caller's result sink `S`.
#[derive(Debug)]
pub struct UssdSession<S> {
    pub token: SessionToken,
    /// The dialed USSD string.
    pub code: String,
    pub started_at: DateTime<Utc>,
    delivered: bool,
    sink: Option<S>,
}

impl<S> UssdSession<S> {
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Take the result sink. Returns `None` on the second call.
    pub fn take_sink(&mut self) -> Option<S> {
        self.sink.take()
    }
}

/// Why a completion was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The token's session already delivered its outcome.
    Duplicate,
    /// The token belongs to a superseded or unknown session.
    Stale,
}

/// Tracks at most one outstanding session.
#[derive(Debug)]
pub struct SessionGuard<S> {
    last_issued: u64,
    active: Option<UssdSession<S>>,
    last_delivered: Option<SessionToken>,
}

impl<S> Default for SessionGuard<S> {
    fn default() -> Self {
        Self {
            last_issued: 0,
            active: None,
            last_delivered: None,
        }
    }
}

impl<S> SessionGuard<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next token. The session is not active until
    /// [`SessionGuard::activate`] is called with it.
    pub fn reserve(&mut self) -> SessionToken {
        self.last_issued += 1;
        SessionToken(self.last_issued)
    }

    /// Install a session for `token`, returning the one it replaces.
    pub fn activate(
        &mut self,
        token: SessionToken,
        code: impl Into<String>,
        sink: S,
    ) -> Option<UssdSession<S>> {
        self.active.replace(UssdSession {
            token,
            code: code.into(),
            started_at: Utc::now(),
            delivered: false,
            sink: Some(sink),
        })
    }

    /// Complete the active session if `token` names it.
    ///
    /// The returned session is marked delivered and is no longer tracked.
    pub fn complete(&mut self, token: SessionToken) -> Result<UssdSession<S>, Rejection> {
        match self.active.take() {
            Some(mut session) if session.token == token => {
                session.delivered = true;
                self.last_delivered = Some(token);
                Ok(session)
            }
            other => {
                self.active = other;
                if self.last_delivered == Some(token) {
                    Err(Rejection::Duplicate)
                } else {
                    Err(Rejection::Stale)
                }
            }
        }
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.active.as_ref().map(|s| s.token)
    }

    /// Drop tracking of the active session without delivering it.
    pub fn clear(&mut self) -> Option<UssdSession<S>> {
        self.active.take()
    }
}
