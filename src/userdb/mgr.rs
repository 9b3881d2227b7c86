// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The user database manager, grounded directly on `ZumUserDB.hh`'s
//! `Mgr`: `RoleTree`/`UserIDHash`/`UserNameHash`/`KeyHash` become plain
//! `HashMap`/`BTreeMap` fields behind one `tokio::sync::RwLock`
//! (spec.md §5: "single-writer-multiple-reader, process-wide"); TOTP
//! and HMAC become [`super::totp`]/[`super::crypto`].

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use super::{
    checkpoint::{self, DbSchema},
    crypto,
    model::{ApiKey, Bitmap256, Role, RoleFlags, User, UserFlags, PERM_ACCESS, PERM_LOGIN},
    totp,
};
use crate::error::{Error, Result};

/// Policy knobs a `Mgr` is constructed with; mirrors
/// `cfg::config::UserDbConfig`.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub pass_len: usize,
    pub totp_range: u32,
    pub key_interval_secs: i64,
    pub max_failures: u32,
}

/// Outcome of a failed login/access attempt: the caller (the server FSM)
/// decides disconnect-vs-`LoginFailed` from `failures` (spec.md §4.9,
/// §9 Open Questions — preserved as specified, not narrated further
/// here).
#[derive(Debug, Clone)]
pub struct AuthFailure {
    pub failures: u32,
}

struct Inner {
    modified: bool,
    perm_names: Vec<String>,
    perm_ids: HashMap<String, u8>,
    roles: BTreeMap<String, Role>,
    users: HashMap<u64, User>,
    user_names: HashMap<String, u64>,
    /// `keyID -> userID`, alongside the owning `Vec<ApiKey>` on each
    /// user (Design Notes §9: owning `Vec` in place of the intrusive
    /// list, plus this index for O(1) lookup by key on API access).
    key_owners: HashMap<String, u64>,
    next_user_id: u64,
}

pub struct Mgr {
    policy: Policy,
    inner: RwLock<Inner>,
}

impl Mgr {
    /// `req_kinds` names every `UserDbReq` variant in the order the
    /// wire protocol expects (`proto::types::REQ_KINDS`); each gets a
    /// dense permission ID following the two reserved ones. Commands
    /// registered later via [`Mgr::perm_add`] continue the same dense
    /// sequence (spec.md §3: "the remainder map one-per request type
    /// plus the registered commands").
    pub fn new(policy: Policy, req_kinds: &[&str]) -> Self {
        let mut perm_names = vec!["Login".to_string(), "Access".to_string()];
        let mut perm_ids = HashMap::new();
        perm_ids.insert("Login".to_string(), PERM_LOGIN);
        perm_ids.insert("Access".to_string(), PERM_ACCESS);
        for (i, kind) in req_kinds.iter().enumerate() {
            let id = 2 + i as u8;
            perm_names.push((*kind).to_string());
            perm_ids.insert((*kind).to_string(), id);
        }
        Self {
            policy,
            inner: RwLock::new(Inner {
                modified: false,
                perm_names,
                perm_ids,
                roles: BTreeMap::new(),
                users: HashMap::new(),
                user_names: HashMap::new(),
                key_owners: HashMap::new(),
                next_user_id: 0,
            }),
        }
    }

    pub async fn modified(&self) -> bool {
        self.inner.read().await.modified
    }

    pub async fn perm_id(&self, name: &str) -> Option<u8> {
        self.inner.read().await.perm_ids.get(name).copied()
    }

    pub async fn perm_name(&self, id: u8) -> Option<String> {
        self.inner.read().await.perm_names.get(id as usize).cloned()
    }

    /// Register one more permission (for a command), returning its
    /// dense ID. `Mgr` never removes permissions at steady state
    /// (spec.md §5: "read-only at steady state" once boot completes).
    pub async fn perm_add(&self, name: impl Into<String>) -> u8 {
        let mut inner = self.inner.write().await;
        let name = name.into();
        if let Some(&id) = inner.perm_ids.get(&name) {
            return id;
        }
        let id = inner.perm_names.len() as u8;
        inner.perm_names.push(name.clone());
        inner.perm_ids.insert(name, id);
        inner.modified = true;
        id
    }

    pub async fn role_add(&self, name: impl Into<String>, flags: RoleFlags) {
        let mut inner = self.inner.write().await;
        let role = Role::new(name, flags);
        inner.roles.insert(role.name.clone(), role);
        inner.modified = true;
    }

    pub async fn role_grant(&self, role_name: &str, perm_id: u8, api: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let role = inner
            .roles
            .get_mut(role_name)
            .ok_or_else(|| Error::storage(format!("no such role '{role_name}'")))?;
        if api {
            role.apiperms.set(perm_id);
        } else {
            role.perms.set(perm_id);
        }
        for user in inner.users.values_mut() {
            if user.roles.iter().any(|r| r == role_name) {
                user.recompute_perms(&inner.roles);
            }
        }
        inner.modified = true;
        Ok(())
    }

    /// Create a user with a freshly generated password + secret,
    /// returning the one-time password disclosure (spec.md §4.11
    /// bootstrap/userAdd contract).
    pub async fn user_add(&self, name: impl Into<String>, role: &str, flags: UserFlags) -> Result<(User, String)> {
        let mut inner = self.inner.write().await;
        let name = name.into();
        if inner.user_names.contains_key(&name) {
            return Err(Error::storage(format!("user '{name}' already exists")));
        }
        if !inner.roles.contains_key(role) {
            return Err(Error::storage(format!("no such role '{role}'")));
        }
        let id = inner.next_user_id;
        inner.next_user_id += 1;

        let passwd = generate_password(self.policy.pass_len);
        let secret = crypto::random_bytes32();
        let hmac = crypto::hmac_sha256(&secret, passwd.as_bytes());

        let mut user = User {
            id,
            name: name.clone(),
            hmac,
            secret,
            roles: vec![role.to_string()],
            perms: Bitmap256::EMPTY,
            apiperms: Bitmap256::EMPTY,
            failures: 0,
            flags,
            keys: Vec::new(),
        };
        user.recompute_perms(&inner.roles);
        inner.users.insert(id, user.clone());
        inner.user_names.insert(name, id);
        inner.modified = true;
        Ok((user, passwd))
    }

    /// One-time bootstrap of an empty DB: one all-permissions role and
    /// one user in it, returning the generated password and the user's
    /// TOTP enrollment secret (base64) for one-time disclosure (spec.md
    /// §4.11 "Bootstrap"). The same `secret` doubles as the HMAC key
    /// for password hashing and as the TOTP seed, matching `User.secret`
    /// in the data model (spec.md §3).
    pub async fn bootstrap(&self, user: &str, role: &str) -> Result<(String, String)> {
        {
            let inner = self.inner.read().await;
            if !inner.users.is_empty() {
                return Err(Error::storage("bootstrap called on a non-empty user DB"));
            }
        }
        let mut all_perms = Bitmap256::EMPTY;
        {
            let inner = self.inner.read().await;
            for id in 0..inner.perm_names.len() as u8 {
                all_perms.set(id);
            }
        }
        self.role_add(role, RoleFlags::IMMUTABLE).await;
        {
            let mut inner = self.inner.write().await;
            let r = inner.roles.get_mut(role).expect("just inserted");
            r.perms = all_perms;
            r.apiperms = all_perms;
        }
        let (user, passwd) = self
            .user_add(user, role, UserFlags::ENABLED | UserFlags::CH_PASS)
            .await?;
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        Ok((passwd, STANDARD.encode(user.secret)))
    }

    /// Interactive login: name/password/TOTP (spec.md §4.11).
    pub async fn login(&self, name: &str, passwd: &str, totp_code: u32, now: i64) -> std::result::Result<User, AuthFailure> {
        let mut inner = self.inner.write().await;
        let Some(&id) = inner.user_names.get(name) else {
            return Err(AuthFailure { failures: 0 });
        };
        let user = inner.users.get_mut(&id).expect("user_names is consistent with users");
        if !user.flags.contains(UserFlags::ENABLED) {
            return Err(AuthFailure { failures: user.failures });
        }
        let expected = crypto::hmac_sha256(&user.secret, passwd.as_bytes());
        if !crypto::hmac_eq(&expected, &user.hmac) {
            user.failures += 1;
            inner.modified = true;
            return Err(AuthFailure { failures: user.failures });
        }
        if !totp::verify(&user.secret, totp_code, now, self.policy.totp_range) {
            user.failures += 1;
            inner.modified = true;
            return Err(AuthFailure { failures: user.failures });
        }
        user.failures = 0;
        inner.modified = true;
        Ok(user.clone())
    }

    /// API key access: `{keyID, token, stamp, hmac}` (spec.md §4.11).
    pub async fn access(
        &self,
        key_id: &str,
        token: &[u8; 32],
        stamp: i64,
        hmac: &[u8; 32],
        now: i64,
    ) -> std::result::Result<User, AuthFailure> {
        let mut inner = self.inner.write().await;
        let Some(&user_id) = inner.key_owners.get(key_id) else {
            return Err(AuthFailure { failures: 0 });
        };
        if (now - stamp).abs() > self.policy.key_interval_secs {
            let failures = inner.users.get(&user_id).map(|u| u.failures).unwrap_or(0);
            return Err(AuthFailure { failures });
        }
        let user = inner.users.get_mut(&user_id).expect("key_owners is consistent with users");
        let Some(key) = user.keys.iter().find(|k| k.id == key_id) else {
            return Err(AuthFailure { failures: user.failures });
        };
        let msg = crypto::access_message(token, stamp);
        let expected = crypto::hmac_sha256(&key.secret, &msg);
        if !crypto::hmac_eq(&expected, hmac) {
            user.failures += 1;
            inner.modified = true;
            return Err(AuthFailure { failures: user.failures });
        }
        user.failures = 0;
        inner.modified = true;
        Ok(user.clone())
    }

    /// `ok(user, interactive, perm)` (spec.md §4.11): the `ChPass`
    /// carve-out only applies to the interactive session, matching the
    /// original's `Mgr::ok`.
    pub fn ok(user: &User, interactive: bool, perm: u8, ch_pass_perm: u8) -> bool {
        if user.flags.contains(UserFlags::CH_PASS) && interactive && perm != ch_pass_perm {
            return false;
        }
        if interactive {
            user.perms.get(perm)
        } else {
            user.apiperms.get(perm)
        }
    }

    pub async fn ch_pass(&self, user_id: u64, old_passwd: &str, new_passwd: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| Error::storage("no such user"))?;
        let expected = crypto::hmac_sha256(&user.secret, old_passwd.as_bytes());
        if !crypto::hmac_eq(&expected, &user.hmac) {
            return Err(Error::auth("wrong current password"));
        }
        user.hmac = crypto::hmac_sha256(&user.secret, new_passwd.as_bytes());
        user.flags.remove(UserFlags::CH_PASS);
        inner.modified = true;
        Ok(())
    }

    /// Administrative password reset (spec.md §3: "`secret` is
    /// generated at user creation and on password reset"; `ZumUserDB.hh`:
    /// "reset password (also clears all API keys)"). Unlike `ch_pass`,
    /// this does not require the old password; it mints a fresh
    /// `secret` (invalidating every previously issued TOTP code derived
    /// from the old one), a fresh generated password, revokes every API
    /// key the user held (their HMACs were derived from state tied to
    /// the compromised/forgotten credential), and sets `ChPass` so the
    /// user is forced to pick their own password on next login.
    pub async fn reset_pass(&self, user_id: u64) -> Result<String> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| Error::storage("no such user"))?;
        let passwd = generate_password(self.policy.pass_len);
        user.secret = crypto::random_bytes32();
        user.hmac = crypto::hmac_sha256(&user.secret, passwd.as_bytes());
        user.flags.insert(UserFlags::CH_PASS);
        let revoked_keys: Vec<String> = user.keys.drain(..).map(|k| k.id).collect();
        for key_id in revoked_keys {
            inner.key_owners.remove(&key_id);
        }
        inner.modified = true;
        Ok(passwd)
    }

    /// Modify a user's name, roles, or flags (`ZumUserDB.hh::userMod`).
    /// Renaming re-keys `user_names`; replacing `roles` validates every
    /// name exists, then recomputes `perms`/`apiperms` (§3: "recomputed
    /// on any role change"). Refuses to touch an `Immutable` user.
    pub async fn user_mod(
        &self,
        user_id: u64,
        name: Option<String>,
        roles: Option<Vec<String>>,
        flags: Option<UserFlags>,
    ) -> Result<User> {
        let mut inner = self.inner.write().await;
        {
            let user = inner.users.get(&user_id).ok_or_else(|| Error::storage("no such user"))?;
            if user.flags.contains(UserFlags::IMMUTABLE) {
                return Err(Error::storage(format!("user '{}' is immutable", user.name)));
            }
        }
        if let Some(roles) = &roles {
            for role in roles {
                if !inner.roles.contains_key(role) {
                    return Err(Error::storage(format!("no such role '{role}'")));
                }
            }
        }
        if let Some(new_name) = &name {
            if inner.user_names.get(new_name).is_some_and(|&id| id != user_id) {
                return Err(Error::storage(format!("user '{new_name}' already exists")));
            }
        }

        let old_name = inner.users.get(&user_id).expect("checked above").name.clone();
        let user = inner.users.get_mut(&user_id).expect("checked above");
        if let Some(new_name) = name {
            user.name = new_name;
        }
        if let Some(roles) = roles {
            user.roles = roles;
        }
        if let Some(flags) = flags {
            user.flags = flags;
        }
        user.recompute_perms(&inner.roles);
        let user = user.clone();
        if user.name != old_name {
            inner.user_names.remove(&old_name);
            inner.user_names.insert(user.name.clone(), user_id);
        }
        inner.modified = true;
        Ok(user)
    }

    /// Delete a user (`ZumUserDB.hh::userDel`). Refuses to delete an
    /// `Immutable` user; drops its name index entry and every API key
    /// it owned.
    pub async fn user_del(&self, user_id: u64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get(&user_id).ok_or_else(|| Error::storage("no such user"))?;
        if user.flags.contains(UserFlags::IMMUTABLE) {
            return Err(Error::storage(format!("user '{}' is immutable", user.name)));
        }
        let user = inner.users.remove(&user_id).expect("checked above");
        inner.user_names.remove(&user.name);
        for key in &user.keys {
            inner.key_owners.remove(&key.id);
        }
        inner.modified = true;
        Ok(())
    }

    /// Delete a role (`ZumUserDB.hh::roleDel`). Refuses to delete an
    /// `Immutable` role or one any user still holds — the original's
    /// FlatBuffer ack carries the same fail-closed contract implicitly
    /// by requiring the caller to vacate the role first.
    pub async fn role_del(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let role = inner.roles.get(name).ok_or_else(|| Error::storage(format!("no such role '{name}'")))?;
        if role.flags.contains(RoleFlags::IMMUTABLE) {
            return Err(Error::storage(format!("role '{name}' is immutable")));
        }
        if inner.users.values().any(|u| u.roles.iter().any(|r| r == name)) {
            return Err(Error::storage(format!("role '{name}' is still held by at least one user")));
        }
        inner.roles.remove(name);
        inner.modified = true;
        Ok(())
    }

    pub async fn own_key_add(&self, user_id: u64) -> Result<ApiKey> {
        let mut inner = self.inner.write().await;
        let key_id = format!("key-{:016x}", rand_u64());
        let secret = crypto::random_bytes32();
        let key = ApiKey {
            id: key_id.clone(),
            secret,
            user_id,
        };
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| Error::storage("no such user"))?;
        user.keys.push(key.clone());
        inner.key_owners.insert(key_id, user_id);
        inner.modified = true;
        Ok(key)
    }

    pub async fn own_key_clr(&self, user_id: u64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| Error::storage("no such user"))?;
        let ids: Vec<String> = user.keys.drain(..).map(|k| k.id).collect();
        for id in ids {
            inner.key_owners.remove(&id);
        }
        inner.modified = true;
        Ok(())
    }

    pub async fn own_key_del(&self, user_id: u64, key_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| Error::storage("no such user"))?;
        let before = user.keys.len();
        user.keys.retain(|k| k.id != key_id);
        if user.keys.len() == before {
            return Err(Error::storage(format!("no such key '{key_id}'")));
        }
        inner.key_owners.remove(key_id);
        inner.modified = true;
        Ok(())
    }

    pub async fn user_get(&self, id: u64) -> Option<User> {
        self.inner.read().await.users.get(&id).cloned()
    }

    pub async fn users_list(&self) -> Vec<User> {
        self.inner.read().await.users.values().cloned().collect()
    }

    pub async fn roles_list(&self) -> Vec<Role> {
        self.inner.read().await.roles.values().cloned().collect()
    }

    pub async fn perms_list(&self) -> Vec<String> {
        self.inner.read().await.perm_names.clone()
    }

    /// Snapshot under read-lock, then write without the lock held
    /// (spec.md §5).
    pub async fn save(&self, path: &std::path::Path, max_age: u32) -> Result<()> {
        let schema = {
            let inner = self.inner.read().await;
            DbSchema::new(
                inner.next_user_id,
                inner.perm_names.clone(),
                inner.roles.values().cloned().collect(),
                inner.users.values().cloned().collect(),
            )
        };
        checkpoint::save(path, &schema, max_age)?;
        self.inner.write().await.modified = false;
        Ok(())
    }

    pub async fn load(policy: Policy, req_kinds: &[&str], path: &std::path::Path) -> Result<Self> {
        let schema = checkpoint::load(path)?;
        let mgr = Self::new(policy, req_kinds);
        {
            let mut inner = mgr.inner.write().await;
            inner.next_user_id = schema.next_user_id;
            for name in schema.perm_names.into_iter().skip(inner.perm_names.len()) {
                let id = inner.perm_names.len() as u8;
                inner.perm_ids.insert(name.clone(), id);
                inner.perm_names.push(name);
            }
            for role in schema.roles {
                inner.roles.insert(role.name.clone(), role);
            }
            for user in schema.users {
                inner.user_names.insert(user.name.clone(), user.id);
                for key in &user.keys {
                    inner.key_owners.insert(key.id.clone(), user.id);
                }
                inner.users.insert(user.id, user);
            }
            inner.modified = false;
        }
        Ok(mgr)
    }
}

fn generate_password(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = (rand::Rng::random::<u32>(&mut rng) as usize) % ALPHABET.len();
            ALPHABET[idx] as char
        })
        .collect()
}

fn rand_u64() -> u64 {
    rand::Rng::random(&mut rand::rng())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy {
            pass_len: 16,
            totp_range: 1,
            key_interval_secs: 30,
            max_failures: 3,
        }
    }

    #[tokio::test]
    async fn bootstrap_creates_one_role_and_one_user_with_all_perms() {
        let mgr = Mgr::new(policy(), &["ChPass", "UserGet"]);
        let (passwd, totp_b64) = mgr.bootstrap("admin", "admin").await.unwrap();
        assert!(!passwd.is_empty());
        assert!(!totp_b64.is_empty());
        let users = mgr.users_list().await;
        assert_eq!(users.len(), 1);
        assert!(users[0].perms.get(PERM_LOGIN));
    }

    #[tokio::test]
    async fn wrong_password_always_fails_and_increments_failures() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, _passwd) = mgr.user_add("bob", "r", UserFlags::ENABLED).await.unwrap();
        let now = 1_700_000_000;
        let code = totp::generate(&user.secret, now);
        let err = mgr.login("bob", "wrong", code, now).await.unwrap_err();
        assert_eq!(err.failures, 1);
    }

    #[tokio::test]
    async fn correct_password_wrong_totp_fails() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, passwd) = mgr.user_add("bob", "r", UserFlags::ENABLED).await.unwrap();
        let now = 1_700_000_000;
        let bad_code = totp::generate(&user.secret, now) ^ 1;
        assert!(mgr.login("bob", &passwd, bad_code, now).await.is_err());
    }

    #[tokio::test]
    async fn correct_triple_succeeds_and_resets_failures() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, passwd) = mgr.user_add("bob", "r", UserFlags::ENABLED).await.unwrap();
        let now = 1_700_000_000;
        let _ = mgr.login("bob", "wrong", 0, now).await;
        let code = totp::generate(&user.secret, now);
        let logged_in = mgr.login("bob", &passwd, code, now).await.unwrap();
        assert_eq!(logged_in.failures, 0);
    }

    #[tokio::test]
    async fn role_grant_propagates_to_every_holder() {
        let mgr = Mgr::new(policy(), &["UserGet"]);
        mgr.role_add("viewer", RoleFlags::empty()).await;
        let (user, _) = mgr.user_add("alice", "viewer", UserFlags::ENABLED).await.unwrap();
        let perm = mgr.perm_id("UserGet").await.unwrap();
        assert!(!mgr.user_get(user.id).await.unwrap().perms.get(perm));
        mgr.role_grant("viewer", perm, false).await.unwrap();
        assert!(mgr.user_get(user.id).await.unwrap().perms.get(perm));
    }

    #[tokio::test]
    async fn api_access_round_trips_through_hmac_challenge() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, _) = mgr.user_add("bob", "r", UserFlags::ENABLED).await.unwrap();
        let key = mgr.own_key_add(user.id).await.unwrap();

        let token = crypto::random_bytes32();
        let now = 1_700_000_000;
        let msg = crypto::access_message(&token, now);
        let hmac = crypto::hmac_sha256(&key.secret, &msg);

        let ok = mgr.access(&key.id, &token, now, &hmac, now).await;
        assert!(ok.is_ok());

        let stale = now + policy().key_interval_secs + 1;
        let err = mgr.access(&key.id, &token, now, &hmac, stale).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn ch_pass_flag_blocks_everything_but_chpass_permission() {
        let mgr = Mgr::new(policy(), &["ChPass", "UserGet"]);
        mgr.role_add("r", RoleFlags::IMMUTABLE).await;
        let chpass_perm = mgr.perm_id("ChPass").await.unwrap();
        let userget_perm = mgr.perm_id("UserGet").await.unwrap();
        mgr.role_grant("r", chpass_perm, false).await.unwrap();
        mgr.role_grant("r", userget_perm, false).await.unwrap();
        mgr.role_grant("r", userget_perm, true).await.unwrap();
        let (mut user, _) = mgr.user_add("carl", "r", UserFlags::ENABLED | UserFlags::CH_PASS).await.unwrap();
        user = mgr.user_get(user.id).await.unwrap();

        assert!(!Mgr::ok(&user, true, userget_perm, chpass_perm));
        assert!(Mgr::ok(&user, true, chpass_perm, chpass_perm));
        // the API-key path ignores the interactive ChPass gate entirely.
        assert!(Mgr::ok(&user, false, userget_perm, chpass_perm));
    }

    #[tokio::test]
    async fn reset_pass_mints_a_fresh_secret_and_sets_ch_pass() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, old_passwd) = mgr.user_add("dana", "r", UserFlags::ENABLED).await.unwrap();
        let old_secret = user.secret;

        let new_passwd = mgr.reset_pass(user.id).await.unwrap();
        assert_ne!(new_passwd, old_passwd);

        let updated = mgr.user_get(user.id).await.unwrap();
        assert_ne!(updated.secret, old_secret, "reset must mint a fresh secret, not just a new hmac");
        assert!(updated.flags.contains(UserFlags::CH_PASS));

        let now = 1_700_000_000;
        let code = totp::generate(&updated.secret, now);
        assert!(mgr.login("dana", &new_passwd, code, now).await.is_ok());
        assert!(mgr.login("dana", &old_passwd, code, now).await.is_err());
    }

    #[tokio::test]
    async fn reset_pass_revokes_every_api_key() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, _) = mgr.user_add("erin", "r", UserFlags::ENABLED).await.unwrap();
        let key = mgr.own_key_add(user.id).await.unwrap();

        mgr.reset_pass(user.id).await.unwrap();

        let updated = mgr.user_get(user.id).await.unwrap();
        assert!(updated.keys.is_empty());

        let token = crypto::random_bytes32();
        let now = 1_700_000_000;
        let msg = crypto::access_message(&token, now);
        let hmac = crypto::hmac_sha256(&key.secret, &msg);
        assert!(mgr.access(&key.id, &token, now, &hmac, now).await.is_err());
    }

    #[tokio::test]
    async fn user_mod_changes_roles_and_recomputes_perms() {
        let mgr = Mgr::new(policy(), &["UserGet"]);
        mgr.role_add("viewer", RoleFlags::empty()).await;
        mgr.role_add("editor", RoleFlags::empty()).await;
        let perm = mgr.perm_id("UserGet").await.unwrap();
        mgr.role_grant("editor", perm, false).await.unwrap();
        let (user, _) = mgr.user_add("finn", "viewer", UserFlags::ENABLED).await.unwrap();
        assert!(!mgr.user_get(user.id).await.unwrap().perms.get(perm));

        let updated = mgr.user_mod(user.id, None, Some(vec!["editor".into()]), None).await.unwrap();
        assert_eq!(updated.roles, vec!["editor".to_string()]);
        assert!(updated.perms.get(perm));
    }

    #[tokio::test]
    async fn user_mod_refuses_an_unknown_role() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("viewer", RoleFlags::empty()).await;
        let (user, _) = mgr.user_add("gail", "viewer", UserFlags::ENABLED).await.unwrap();
        assert!(mgr.user_mod(user.id, None, Some(vec!["nonexistent".into()]), None).await.is_err());
        assert_eq!(mgr.user_get(user.id).await.unwrap().roles, vec!["viewer".to_string()]);
    }

    #[tokio::test]
    async fn user_mod_refuses_an_immutable_user() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, _) = mgr.user_add("root", "r", UserFlags::ENABLED | UserFlags::IMMUTABLE).await.unwrap();
        assert!(mgr.user_mod(user.id, None, None, Some(UserFlags::ENABLED)).await.is_err());
    }

    #[tokio::test]
    async fn user_del_removes_the_user_and_its_keys() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, _) = mgr.user_add("hank", "r", UserFlags::ENABLED).await.unwrap();
        mgr.own_key_add(user.id).await.unwrap();

        mgr.user_del(user.id).await.unwrap();

        assert!(mgr.user_get(user.id).await.is_none());
        assert!(mgr.users_list().await.iter().all(|u| u.name != "hank"));
    }

    #[tokio::test]
    async fn user_del_refuses_an_immutable_user() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("r", RoleFlags::empty()).await;
        let (user, _) = mgr.user_add("root", "r", UserFlags::ENABLED | UserFlags::IMMUTABLE).await.unwrap();
        assert!(mgr.user_del(user.id).await.is_err());
    }

    #[tokio::test]
    async fn role_del_removes_an_unheld_role_but_refuses_a_held_one() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.role_add("empty_role", RoleFlags::empty()).await;
        mgr.role_add("held_role", RoleFlags::empty()).await;
        mgr.user_add("ivy", "held_role", UserFlags::ENABLED).await.unwrap();

        assert!(mgr.role_del("empty_role").await.is_ok());
        assert!(mgr.roles_list().await.iter().all(|r| r.name != "empty_role"));

        assert!(mgr.role_del("held_role").await.is_err());
        assert!(mgr.roles_list().await.iter().any(|r| r.name == "held_role"));
    }

    #[tokio::test]
    async fn role_del_refuses_an_immutable_role() {
        let mgr = Mgr::new(policy(), &[]);
        mgr.bootstrap("admin", "admin").await.unwrap();
        assert!(mgr.role_del("admin").await.is_err());
    }
}
