// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dialer hand-off URLs for platforms without programmatic USSD.

use std::fmt::Write;

/// Punctuation left unescaped, matching Foundation's URL-query-allowed set.
const QUERY_ALLOWED: &[u8] = b"!$&'()*+,-./:;=?@_~";

/// Percent-encode `input` the way `addingPercentEncoding(.urlQueryAllowed)` does.
pub fn encode_query_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &byte in input.as_bytes() {
        if byte.is_ascii_alphanumeric() || QUERY_ALLOWED.contains(&byte) {
            out.push(byte as char);
        } else {
            // Writing into a String cannot fail.
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// `tel://` URL that opens the phone app pre-filled with `code`.
///
/// `#` must be escaped or the dialer treats the rest as a URL fragment.
pub fn tel_url(code: &str) -> String {
    format!("tel://{}", encode_query_component(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_escaped() {
        assert_eq!(tel_url("*123#"), "tel://*123%23");
        assert_eq!(tel_url("*100*2*1#"), "tel://*100*2*1%23");
    }

    #[test]
    fn spaces_and_unicode_are_escaped() {
        assert_eq!(encode_query_component("a b"), "a%20b");
        assert_eq!(encode_query_component("é"), "%C3%A9");
    }
}
