// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USSD relay: core types and error definitions shared across all crates.

pub mod config;
pub mod dial;
pub mod error;
pub mod human_errors;
pub mod menu;
pub mod types;

pub use config::BridgeConfig;
pub use error::UssdError;
pub use types::*;
