// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server-side link handling: the per-connection state machine and the
//! user-DB request dispatcher it delegates to.

/// The `Down -> Login -> Up` / `LoginFailed` connection state machine.
pub mod fsm;
/// Executes a permission-checked [`proto::types::UserDbReq`] against the
/// user database.
pub mod userdb_handler;

pub use fsm::{LinkState, Outbound, ServerLink};
