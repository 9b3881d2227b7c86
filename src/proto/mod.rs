//! Framed message types and the schema-validated payloads carried over
//! the wire (spec.md §4.8/§6).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod dispatch;
pub mod types;

pub use types::{
    CmdReq, CmdReqAck, Credentials, FrameType, LoginAck, LoginReq, RoleView, UserDbReq, UserDbReqAck, UserView,
    REQ_KINDS,
};
