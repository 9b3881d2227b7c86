// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A telemetry request selects which record classes a link wants
//! pushed: first a snapshot of everything live, then incremental
//! updates as the server observes changes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ReqType: u32 {
        const HEAP     = 1 << 0;
        const HASH_TBL = 1 << 1;
        const THREAD   = 1 << 2;
        const MX       = 1 << 3;
        const SOCKET   = 1 << 4;
        const QUEUE    = 1 << 5;
        const ENGINE   = 1 << 6;
        const LINK     = 1 << 7;
        const DB_TABLE = 1 << 8;
        const DB_HOST  = 1 << 9;
        const DB       = 1 << 10;
        const APP      = 1 << 11;
        const ALERT    = 1 << 12;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelReq {
    pub seq_no: u64,
    pub types: ReqType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqAck {
    pub seq_no: u64,
    pub ok: bool,
}
