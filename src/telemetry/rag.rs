// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Red/Amber/Green status, derived per record type from its own fields.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rag {
    Green,
    Amber,
    Red,
}

/// Three-band threshold RAG used by several record types (`x/size` vs.
/// 80%/50% bands).
pub fn banded(used: u64, capacity: u64) -> Rag {
    if capacity == 0 {
        return Rag::Green;
    }
    let pct = used as f64 / capacity as f64;
    if pct >= 0.8 {
        Rag::Red
    } else if pct >= 0.5 {
        Rag::Amber
    } else {
        Rag::Green
    }
}
