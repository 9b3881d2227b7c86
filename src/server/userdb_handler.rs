// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Executes an already-permission-checked [`UserDbReq`] against the
//! [`Mgr`] and builds the matching [`UserDbReqAck`]. The permission gate
//! itself lives in `server::fsm` (one check per request, keyed by
//! `UserDbReq::kind()`) so this module only needs to worry about "own"
//! vs. "other" scoping for key operations (spec.md §4.12a).

use crate::{
    proto::types::{RoleView, UserDbReq, UserDbReqAck, UserView},
    userdb::{mgr::Mgr, model::User},
};

pub async fn handle(mgr: &Mgr, acting_user: &User, req: UserDbReq) -> UserDbReqAck {
    match req {
        UserDbReq::ChPass { old_passwd, new_passwd } => match mgr.ch_pass(acting_user.id, &old_passwd, &new_passwd).await {
            Ok(()) => UserDbReqAck::Ok,
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::UserGet { id } => {
            let users = match id {
                Some(id) => mgr.user_get(id).await.into_iter().collect(),
                None => mgr.users_list().await,
            };
            UserDbReqAck::Users(users.iter().map(UserView::from).collect())
        }
        UserDbReq::UserAdd { name, role } => {
            match mgr.user_add(name, &role, crate::userdb::model::UserFlags::ENABLED).await {
                Ok((user, passwd)) => UserDbReqAck::UserAdded { id: user.id, passwd },
                Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
            }
        }
        UserDbReq::ResetPass { id } => match mgr.reset_pass(id).await {
            Ok(passwd) => UserDbReqAck::ResetPass { passwd },
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::UserMod { id, roles, flags } => {
            let flags = flags.map(crate::userdb::model::UserFlags::from_bits_truncate);
            match mgr.user_mod(id, None, roles, flags).await {
                Ok(user) => UserDbReqAck::Users(vec![UserView::from(&user)]),
                Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
            }
        }
        UserDbReq::UserDel { id } => match mgr.user_del(id).await {
            Ok(()) => UserDbReqAck::Ok,
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::RoleGet { name } => {
            let roles = mgr.roles_list().await;
            let filtered: Vec<RoleView> = roles
                .into_iter()
                .filter(|r| name.as_deref().is_none_or(|n| n == r.name))
                .map(|r| RoleView {
                    name: r.name,
                    flags: r.flags.bits(),
                })
                .collect();
            UserDbReqAck::Roles(filtered)
        }
        UserDbReq::RoleAdd { name } => {
            mgr.role_add(name, crate::userdb::model::RoleFlags::empty()).await;
            UserDbReqAck::Ok
        }
        UserDbReq::RoleMod {
            name,
            grant_perms,
            grant_apiperms,
        } => {
            for perm in grant_perms {
                if let Err(e) = mgr.role_grant(&name, perm, false).await {
                    return UserDbReqAck::Denied { reason: e.to_string() };
                }
            }
            for perm in grant_apiperms {
                if let Err(e) = mgr.role_grant(&name, perm, true).await {
                    return UserDbReqAck::Denied { reason: e.to_string() };
                }
            }
            UserDbReqAck::Ok
        }
        UserDbReq::RoleDel { name } => match mgr.role_del(&name).await {
            Ok(()) => UserDbReqAck::Ok,
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::PermGet => UserDbReqAck::Perms(mgr.perms_list().await),
        UserDbReq::OwnKeyGet => UserDbReqAck::Keys(acting_user.keys.iter().map(|k| k.id.clone()).collect()),
        UserDbReq::OwnKeyAdd => match mgr.own_key_add(acting_user.id).await {
            Ok(key) => {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                UserDbReqAck::KeyAdded {
                    key_id: key.id,
                    secret: STANDARD.encode(key.secret),
                }
            }
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::OwnKeyClr => match mgr.own_key_clr(acting_user.id).await {
            Ok(()) => UserDbReqAck::Ok,
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::OwnKeyDel { key_id } => match mgr.own_key_del(acting_user.id, &key_id).await {
            Ok(()) => UserDbReqAck::Ok,
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::KeyGet { user_id } => {
            let keys = mgr
                .user_get(user_id)
                .await
                .map(|u| u.keys.iter().map(|k| k.id.clone()).collect())
                .unwrap_or_default();
            UserDbReqAck::Keys(keys)
        }
        UserDbReq::KeyAdd { user_id } => match mgr.own_key_add(user_id).await {
            Ok(key) => {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                UserDbReqAck::KeyAdded {
                    key_id: key.id,
                    secret: STANDARD.encode(key.secret),
                }
            }
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::KeyClr { user_id } => match mgr.own_key_clr(user_id).await {
            Ok(()) => UserDbReqAck::Ok,
            Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
        },
        UserDbReq::KeyDel { key_id } => {
            let Some(owner) = mgr.users_list().await.into_iter().find(|u| u.keys.iter().any(|k| k.id == key_id))
            else {
                return UserDbReqAck::Denied {
                    reason: format!("no such key '{key_id}'"),
                };
            };
            match mgr.own_key_del(owner.id, &key_id).await {
                Ok(()) => UserDbReqAck::Ok,
                Err(e) => UserDbReqAck::Denied { reason: e.to_string() },
            }
        }
    }
}
