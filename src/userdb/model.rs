// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! User/role/permission/key data model, ported field-for-field from
//! `ZumUserDB.hh`'s `User_`/`Role_`/`Key_` structs: a 256-bit permission
//! bitmap, a users-by-id/users-by-name pair, and an owning `Vec<ApiKey>`
//! on the user in place of the original's intrusive `Key_ *keyList`
//! linked list (Design Notes §9).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Dense 256-bit permission set, OR-accumulated from a user's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap256([u64; 4]);

impl Bitmap256 {
    pub const EMPTY: Bitmap256 = Bitmap256([0; 4]);

    pub fn set(&mut self, bit: u8) {
        let bit = bit as usize;
        self.0[bit / 64] |= 1 << (bit % 64);
    }

    pub fn get(&self, bit: u8) -> bool {
        let bit = bit as usize;
        (self.0[bit / 64] >> (bit % 64)) & 1 == 1
    }

    pub fn or_assign(&mut self, other: &Bitmap256) {
        for i in 0..4 {
            self.0[i] |= other.0[i];
        }
    }
}

impl Default for Bitmap256 {
    fn default() -> Self {
        Self::EMPTY
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RoleFlags: u8 {
        const IMMUTABLE = 0x01;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct UserFlags: u8 {
        const IMMUTABLE = 0x01;
        const ENABLED   = 0x02;
        /// User must change password before anything but `ChPass` is
        /// permitted (§4.11, `Mgr::ok`'s `ChPass` carve-out).
        const CH_PASS   = 0x04;
    }
}

/// Reserved, stable permission IDs; every other permission is appended
/// densely after these at `Mgr` construction (one per `UserDbReq`
/// variant, then one per registered command — §3/§4.11/§4.12).
pub const PERM_LOGIN: u8 = 0;
pub const PERM_ACCESS: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub perms: Bitmap256,
    pub apiperms: Bitmap256,
    pub flags: RoleFlags,
}

impl Role {
    pub fn new(name: impl Into<String>, flags: RoleFlags) -> Self {
        Self {
            name: name.into(),
            perms: Bitmap256::EMPTY,
            apiperms: Bitmap256::EMPTY,
            flags,
        }
    }
}

/// One long-lived API key, hanging directly off the owning [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub secret: [u8; 32],
    pub user_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    /// `HMAC-SHA256(secret, password)`.
    pub hmac: [u8; 32],
    /// Random per-user secret, generated at creation and on password
    /// reset; opaque to the user.
    pub secret: [u8; 32],
    pub roles: Vec<String>,
    pub perms: Bitmap256,
    pub apiperms: Bitmap256,
    pub failures: u32,
    pub flags: UserFlags,
    pub keys: Vec<ApiKey>,
}

impl User {
    /// Recompute `perms`/`apiperms` by OR-ing every role this user
    /// currently holds. Called on any role change (§3: "recomputed on
    /// any role change").
    pub fn recompute_perms(&mut self, roles: &std::collections::BTreeMap<String, Role>) {
        self.perms = Bitmap256::EMPTY;
        self.apiperms = Bitmap256::EMPTY;
        for name in &self.roles {
            if let Some(role) = roles.get(name) {
                self.perms.or_assign(&role.perms);
                self.apiperms.or_assign(&role.apiperms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_or_assign_unions_bits() {
        let mut a = Bitmap256::EMPTY;
        a.set(3);
        let mut b = Bitmap256::EMPTY;
        b.set(200);
        a.or_assign(&b);
        assert!(a.get(3));
        assert!(a.get(200));
        assert!(!a.get(4));
    }

    #[test]
    fn recompute_perms_unions_all_held_roles() {
        let mut roles = std::collections::BTreeMap::new();
        let mut admin = Role::new("admin", RoleFlags::empty());
        admin.perms.set(5);
        let mut viewer = Role::new("viewer", RoleFlags::empty());
        viewer.perms.set(6);
        roles.insert(admin.name.clone(), admin);
        roles.insert(viewer.name.clone(), viewer);

        let mut u = User {
            id: 0,
            name: "u".into(),
            hmac: [0; 32],
            secret: [0; 32],
            roles: vec!["admin".into(), "viewer".into()],
            perms: Bitmap256::EMPTY,
            apiperms: Bitmap256::EMPTY,
            failures: 0,
            flags: UserFlags::ENABLED,
            keys: Vec::new(),
        };
        u.recompute_perms(&roles);
        assert!(u.perms.get(5));
        assert!(u.perms.get(6));
    }
}
