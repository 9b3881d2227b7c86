// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Registry of `{name, permID, fn(ctx, argv) -> {code, out}}`, reached
//! only via the `cmd` frame type (spec.md §4.12). Grounded on the
//! teacher's `DashMap`-of-handlers shape (`client/client.rs`'s
//! `sending`/`reciver` tables), generalized from per-ITT channels to
//! per-name command handlers.

use std::{future::Future, pin::Pin, sync::Arc};

use dashmap::DashMap;

use crate::userdb::{mgr::Mgr, model::User};

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub code: i32,
    pub out: String,
}

impl CommandOutcome {
    pub fn ok(out: impl Into<String>) -> Self {
        Self { code: 0, out: out.into() }
    }

    pub fn error(code: i32, out: impl Into<String>) -> Self {
        Self { code, out: out.into() }
    }
}

/// What a command handler is invoked with.
pub struct CmdCtx {
    pub user: User,
    pub interactive: bool,
}

pub type CommandFn =
    Arc<dyn Fn(CmdCtx, Vec<String>) -> Pin<Box<dyn Future<Output = CommandOutcome> + Send>> + Send + Sync>;

struct Registered {
    perm_id: u8,
    handler: CommandFn,
}

/// Registry of named command handlers, each behind its own
/// just-in-time-registered permission, on top of the shared `ZCmd`
/// (top-level command access) and `ChPass` permissions.
pub struct CommandHost {
    userdb: Arc<Mgr>,
    cmd_perm: u8,
    chpass_perm: u8,
    commands: DashMap<String, Registered>,
}

impl CommandHost {
    pub fn new(userdb: Arc<Mgr>, cmd_perm: u8, chpass_perm: u8) -> Self {
        Self {
            userdb,
            cmd_perm,
            chpass_perm,
            commands: DashMap::new(),
        }
    }

    /// Register a command, minting it a fresh dense permission ID via
    /// the user DB (spec.md §3: "the remainder map one-per request type
    /// plus the registered commands").
    pub async fn register(&self, name: impl Into<String>, handler: CommandFn) -> u8 {
        let name = name.into();
        let perm_id = self.userdb.perm_add(format!("cmd.{name}")).await;
        self.commands.insert(name, Registered { perm_id, handler });
        perm_id
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.iter().map(|e| e.key().clone()).collect()
    }

    /// §4.12: deny on missing `ZCmd`/top-level access, deny on unknown
    /// `argv[0]`, deny on missing per-command permission, else invoke
    /// and echo `{code, text}`.
    pub async fn dispatch(&self, user: &User, interactive: bool, argv: Vec<String>) -> CommandOutcome {
        if !Mgr::ok(user, interactive, self.cmd_perm, self.chpass_perm) {
            return CommandOutcome::error(1, "permission denied (user must change password)\n");
        }
        let Some(name) = argv.first().cloned() else {
            return CommandOutcome::error(2, "usage: <command> [args...]\n");
        };
        let Some(entry) = self.commands.get(&name) else {
            return CommandOutcome::error(2, format!("unknown command '{name}'\n"));
        };
        if !Mgr::ok(user, interactive, entry.perm_id, self.chpass_perm) {
            return CommandOutcome::error(1, format!("permission denied for '{name}'\n"));
        }
        let handler = entry.handler.clone();
        drop(entry);
        handler(
            CmdCtx {
                user: user.clone(),
                interactive,
            },
            argv,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::userdb::{
        mgr::Policy,
        model::{RoleFlags, UserFlags},
    };

    fn policy() -> Policy {
        Policy {
            pass_len: 16,
            totp_range: 1,
            key_interval_secs: 30,
            max_failures: 3,
        }
    }

    #[tokio::test]
    async fn unknown_command_returns_usage_error_without_invoking_anything() {
        let userdb = Arc::new(Mgr::new(policy(), &["ChPass"]));
        let cmd_perm = userdb.perm_add("ZCmd").await;
        let chpass_perm = userdb.perm_id("ChPass").await.unwrap();
        userdb.role_add("admin", RoleFlags::empty()).await;
        userdb.role_grant("admin", cmd_perm, false).await.unwrap();
        let (user, _) = userdb.user_add("root", "admin", UserFlags::ENABLED).await.unwrap();

        let host = CommandHost::new(userdb, cmd_perm, chpass_perm);
        let outcome = host.dispatch(&user, true, vec!["nope".into()]).await;
        assert_eq!(outcome.code, 2);
    }

    #[tokio::test]
    async fn chpass_flag_blocks_every_command_but_still_gates_on_zcmd_first() {
        let userdb = Arc::new(Mgr::new(policy(), &["ChPass"]));
        let cmd_perm = userdb.perm_add("ZCmd").await;
        let chpass_perm = userdb.perm_id("ChPass").await.unwrap();
        userdb.role_add("admin", RoleFlags::empty()).await;
        userdb.role_grant("admin", cmd_perm, false).await.unwrap();
        let (user, _) = userdb
            .user_add("root", "admin", UserFlags::ENABLED | UserFlags::CH_PASS)
            .await
            .unwrap();

        let host = CommandHost::new(userdb, cmd_perm, chpass_perm);
        let invoked = Arc::new(AtomicBool::new(false));
        let invoked2 = invoked.clone();
        host.register(
            "help",
            Arc::new(move |_ctx, _argv| {
                invoked2.store(true, Ordering::SeqCst);
                Box::pin(async { CommandOutcome::ok("ok\n") })
            }),
        )
        .await;

        let outcome = host.dispatch(&user, true, vec!["help".into()]).await;
        assert_eq!(outcome.code, 1);
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn registered_command_runs_and_echoes_its_outcome() {
        let userdb = Arc::new(Mgr::new(policy(), &["ChPass"]));
        let cmd_perm = userdb.perm_add("ZCmd").await;
        let chpass_perm = userdb.perm_id("ChPass").await.unwrap();
        userdb.role_add("admin", RoleFlags::empty()).await;
        userdb.role_grant("admin", cmd_perm, false).await.unwrap();
        let (mut user, _) = userdb.user_add("root", "admin", UserFlags::ENABLED).await.unwrap();

        let host = CommandHost::new(userdb.clone(), cmd_perm, chpass_perm);
        let help_perm = host
            .register(
                "help",
                Arc::new(|_ctx, _argv| Box::pin(async { CommandOutcome::ok("usage: ...\n") })),
            )
            .await;
        userdb.role_grant("admin", help_perm, false).await.unwrap();
        user = userdb.user_get(user.id).await.unwrap();

        let outcome = host.dispatch(&user, true, vec!["help".into()]).await;
        assert_eq!(outcome.code, 0);
        assert_eq!(outcome.out, "usage: ...\n");
    }
}
