// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Time-based one-time passwords, `hmac`+`sha2` throughout per this
//! crate's glossary ("HMAC — keyed hash; SHA-256 throughout"): a
//! counter derived from the current Unix time in 30-second steps, a
//! standard RFC 4226 dynamic truncation to 6 digits, and a `±range`
//! step window to absorb clock skew (spec.md §4.11 step 4).

use hmac::{Hmac, Mac};
use sha2::Sha256;

const STEP_SECS: i64 = 30;
const DIGITS: u32 = 1_000_000;

type HmacSha256 = Hmac<Sha256>;

fn counter_code(secret: &[u8], counter: u64) -> u32 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let bytes: [u8; 4] = digest[offset..offset + 4]
        .try_into()
        .expect("4-byte slice");
    let truncated = u32::from_be_bytes(bytes) & 0x7fff_ffff;
    truncated % DIGITS
}

/// The code for `now` (Unix seconds), for generating test fixtures or a
/// bootstrap-time display of the current code.
pub fn generate(secret: &[u8], now: i64) -> u32 {
    counter_code(secret, (now / STEP_SECS) as u64)
}

/// Accept `code` if it matches any step within `±range` of `now`.
pub fn verify(secret: &[u8], code: u32, now: i64, range: u32) -> bool {
    let counter = now / STEP_SECS;
    let range = range as i64;
    (-range..=range).any(|delta| {
        let step = counter + delta;
        step >= 0 && counter_code(secret, step as u64) == code
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_verifies_at_same_instant() {
        let secret = b"a shared totp secret";
        let now = 1_700_000_000;
        let code = generate(secret, now);
        assert!(verify(secret, code, now, 1));
    }

    #[test]
    fn code_outside_window_is_rejected() {
        let secret = b"a shared totp secret";
        let now = 1_700_000_000;
        let code = generate(secret, now);
        let far_future = now + STEP_SECS * 10;
        assert!(!verify(secret, code, far_future, 1));
    }

    #[test]
    fn code_within_range_window_is_accepted() {
        let secret = b"a shared totp secret";
        let now = 1_700_000_000;
        let code = generate(secret, now);
        assert!(verify(secret, code, now + STEP_SECS, 1));
        assert!(verify(secret, code, now - STEP_SECS, 1));
        assert!(!verify(secret, code, now + STEP_SECS * 2, 1));
    }
}
