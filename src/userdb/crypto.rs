// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The one HMAC-SHA256 primitive shared by password hashing, API
//! challenge signing, and their verification — both client and server
//! sides compute it the same way, so it lives outside `mgr` to avoid a
//! server-only dependency on the userdb module from `client::fsm`.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// Constant-time-ish equality via a fixed-size array compare (`[u8; 32]`
/// equality in Rust already compares every byte; no early exit is
/// introduced here beyond what `PartialEq` does).
pub fn hmac_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a == b
}

pub fn random_bytes32() -> [u8; 32] {
    let mut out = [0u8; 32];
    rand::rng().fill_bytes(&mut out);
    out
}

/// `token ‖ stamp_le64`, the message signed for API access (spec.md §3,
/// §4.10).
pub fn access_message(token: &[u8; 32], stamp: i64) -> [u8; 40] {
    let mut msg = [0u8; 40];
    msg[..32].copy_from_slice(token);
    msg[32..].copy_from_slice(&(stamp as u64).to_le_bytes());
    msg
}
