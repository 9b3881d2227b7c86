// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire payload types. spec.md §6 calls for FlatBuffer-style schema
//! validation; this workspace carries no flatbuffer codegen toolchain
//! (out of scope per spec.md §1), so every payload is a plain
//! `serde`-derived struct whose schema check is `serde_json`'s own
//! deserialize-time structural validation — a failed decode is exactly
//! the "schema check of the serialized payload" spec.md §4.1 requires,
//! and it fails the link the same way a FlatBuffer verifier failure
//! would.

use serde::{Deserialize, Serialize};

use crate::userdb::model::User;

/// Closed set of framed message types (spec.md §4.8/§6): a
/// `#[repr(u16)]` enum with `TryFrom<u16>`, the same idiom as the
/// teacher's `models/opcode.rs` `Opcode`, but unlike an iSCSI opcode
/// byte that still carries meaning when unrecognized, an unknown
/// `FrameType` here always tears the link down (spec.md: "Unknown types
/// return -1").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameType {
    Login = 0,
    UserDb = 1,
    Cmd = 2,
    TelReq = 3,
    Telemetry = 4,
}

impl TryFrom<u16> for FrameType {
    type Error = crate::error::Error;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(FrameType::Login),
            1 => Ok(FrameType::UserDb),
            2 => Ok(FrameType::Cmd),
            3 => Ok(FrameType::TelReq),
            4 => Ok(FrameType::Telemetry),
            other => Err(crate::error::Error::framing(format!("unknown frame type {other}"))),
        }
    }
}

impl From<FrameType> for u16 {
    fn from(ty: FrameType) -> u16 {
        ty as u16
    }
}

/// Tagged union of the two ways a link can authenticate (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Credentials {
    Interactive {
        user: String,
        passwd: String,
        totp: u32,
    },
    Api {
        key_id: String,
        /// 32 random bytes generated by the client.
        token: [u8; 32],
        /// Seconds since epoch.
        stamp: i64,
        /// `HMAC-SHA256(secret, token ‖ stamp_le64)`.
        hmac: [u8; 32],
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginReq {
    pub creds: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAck {
    pub ok: bool,
    pub id: u64,
    pub name: String,
    pub roles: Vec<String>,
    /// Raw words of the materialized `perms` bitmap, enough for the
    /// client cache mentioned in spec.md §4.10 ("cache user fields").
    pub perms: [u64; 4],
    pub flags: u8,
}

impl LoginAck {
    pub fn from_user(user: &User) -> Self {
        Self {
            ok: true,
            id: user.id,
            name: user.name.clone(),
            roles: user.roles.clone(),
            perms: bitmap_words(&user.perms),
            flags: user.flags.bits(),
        }
    }

    pub fn denied() -> Self {
        Self {
            ok: false,
            id: 0,
            name: String::new(),
            roles: Vec::new(),
            perms: [0; 4],
            flags: 0,
        }
    }
}

fn bitmap_words(bitmap: &crate::userdb::model::Bitmap256) -> [u64; 4] {
    let mut words = [0u64; 4];
    for (i, word) in words.iter_mut().enumerate() {
        for bit in 0..64u8 {
            if bitmap.get(i as u8 * 64 + bit) {
                *word |= 1 << bit;
            }
        }
    }
    words
}

/// One `UserDbReq` variant per entry, in wire order; `Mgr::new` uses
/// this list verbatim to assign dense permission IDs (spec.md §3:
/// "the remainder map one-per request type plus the registered
/// commands"). `PermAdd`/`PermMod`/`PermDel` are deliberately absent —
/// spec.md §5 states the permission table is "built at init, read-only
/// at steady state", so runtime permission mutation has no wire
/// surface here (see DESIGN.md).
pub const REQ_KINDS: &[&str] = &[
    "ChPass",
    "UserGet",
    "UserAdd",
    "ResetPass",
    "UserMod",
    "UserDel",
    "RoleGet",
    "RoleAdd",
    "RoleMod",
    "RoleDel",
    "PermGet",
    "OwnKeyGet",
    "OwnKeyAdd",
    "OwnKeyClr",
    "OwnKeyDel",
    "KeyGet",
    "KeyAdd",
    "KeyClr",
    "KeyDel",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum UserDbReq {
    ChPass { old_passwd: String, new_passwd: String },
    UserGet { id: Option<u64> },
    UserAdd { name: String, role: String },
    ResetPass { id: u64 },
    UserMod { id: u64, roles: Option<Vec<String>>, flags: Option<u8> },
    UserDel { id: u64 },
    RoleGet { name: Option<String> },
    RoleAdd { name: String },
    RoleMod { name: String, grant_perms: Vec<u8>, grant_apiperms: Vec<u8> },
    RoleDel { name: String },
    PermGet,
    OwnKeyGet,
    OwnKeyAdd,
    OwnKeyClr,
    OwnKeyDel { key_id: String },
    KeyGet { user_id: u64 },
    KeyAdd { user_id: u64 },
    KeyClr { user_id: u64 },
    KeyDel { key_id: String },
}

impl UserDbReq {
    /// The `REQ_KINDS` entry this request maps to, for the permission
    /// lookup in `Mgr::ok`.
    pub fn kind(&self) -> &'static str {
        match self {
            UserDbReq::ChPass { .. } => "ChPass",
            UserDbReq::UserGet { .. } => "UserGet",
            UserDbReq::UserAdd { .. } => "UserAdd",
            UserDbReq::ResetPass { .. } => "ResetPass",
            UserDbReq::UserMod { .. } => "UserMod",
            UserDbReq::UserDel { .. } => "UserDel",
            UserDbReq::RoleGet { .. } => "RoleGet",
            UserDbReq::RoleAdd { .. } => "RoleAdd",
            UserDbReq::RoleMod { .. } => "RoleMod",
            UserDbReq::RoleDel { .. } => "RoleDel",
            UserDbReq::PermGet => "PermGet",
            UserDbReq::OwnKeyGet => "OwnKeyGet",
            UserDbReq::OwnKeyAdd => "OwnKeyAdd",
            UserDbReq::OwnKeyClr => "OwnKeyClr",
            UserDbReq::OwnKeyDel { .. } => "OwnKeyDel",
            UserDbReq::KeyGet { .. } => "KeyGet",
            UserDbReq::KeyAdd { .. } => "KeyAdd",
            UserDbReq::KeyClr { .. } => "KeyClr",
            UserDbReq::KeyDel { .. } => "KeyDel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub id: u64,
    pub name: String,
    pub roles: Vec<String>,
    pub flags: u8,
    pub failures: u32,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            roles: u.roles.clone(),
            flags: u.flags.bits(),
            failures: u.failures,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleView {
    pub name: String,
    pub flags: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result")]
pub enum UserDbReqAck {
    Ok,
    Users(Vec<UserView>),
    UserAdded { id: u64, passwd: String },
    ResetPass { passwd: String },
    Roles(Vec<RoleView>),
    Perms(Vec<String>),
    Keys(Vec<String>),
    KeyAdded { key_id: String, secret: String },
    Denied { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdReq {
    pub argv: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdReqAck {
    pub code: i32,
    pub out: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(FrameType::try_from(9).is_err());
    }

    #[test]
    fn every_req_kind_round_trips_through_its_own_variant() {
        let req = UserDbReq::OwnKeyAdd;
        assert_eq!(req.kind(), "OwnKeyAdd");
        assert!(REQ_KINDS.contains(&req.kind()));
    }
}
