// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Best-effort detection of USSD menus that expect a reply.
//
// Carriers do not flag interactive screens, so we look at the text: a line
// break, or a numbered option such as "1. Balance" or "2) Bundles". Plain
// amounts like "5.00" are not options.

use std::sync::LazyLock;

use regex::Regex;

/// A run of 1-3 digits at a word boundary, then `.` or `)`, whitespace, and a label.
static MENU_OPTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)\d{1,3}[.)]\s+\S").ok());

/// Whether `message` looks like a menu waiting for the user's choice.
pub fn looks_interactive(message: &str, detect_menu_options: bool) -> bool {
    if message.contains('\n') || message.contains('\r') {
        return true;
    }
    detect_menu_options
        && MENU_OPTION
            .as_ref()
            .is_some_and(|re| re.is_match(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_message_is_final() {
        assert!(!looks_interactive("Your balance is 5.00", true));
        assert!(!looks_interactive("Recharge of 10.00 successful. Call 100 for help", true));
    }

    #[test]
    fn multiline_menu_waits_for_reply() {
        assert!(looks_interactive("Enter PIN:\n1. Option A\n2. Option B", true));
        assert!(looks_interactive("Select\r\n1 Balance", false));
    }

    #[test]
    fn single_line_options_are_detected() {
        assert!(looks_interactive("1. Balance 2. Data 3. Exit", true));
        assert!(looks_interactive("Choose: 1) Yes 2) No", true));
    }

    #[test]
    fn option_detection_can_be_disabled() {
        assert!(!looks_interactive("1. Balance 2. Data 3. Exit", false));
    }
}
