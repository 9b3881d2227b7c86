// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Telemetry record types. Wire payloads use `serde_json` rather than a
//! FlatBuffer schema (no flatbuffer codegen toolchain is carried here;
//! see the ambient wire-payload note this crate's design doc records),
//! but the field shapes and RAG formulas below are unchanged.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::rag::{banded, Rag};

/// Generic object lifecycle status shared by `Mx`, `Engine`, `Link` and
/// `DBHost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjState {
    Uninitialized,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Disabled,
}

impl ObjState {
    fn rag(self) -> Rag {
        match self {
            ObjState::Running | ObjState::Initialized => Rag::Green,
            ObjState::Starting | ObjState::Stopping | ObjState::Disabled => Rag::Amber,
            ObjState::Uninitialized | ObjState::Stopped => Rag::Red,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heap {
    pub id: String,
    pub partition: u32,
    pub size: u32,
    pub cache_size: u64,
    pub cache_allocs: u64,
    pub heap_allocs: u64,
    pub frees: u64,
}

impl Heap {
    /// `allocated = cacheAllocs + heapAllocs − frees` (spec.md §9),
    /// saturating rather than wrapping: a frees count that races ahead
    /// of allocs (a benign ordering artifact of concurrent sampling)
    /// clamps to zero instead of underflowing, and `skew` flags that it
    /// happened so callers can tell a real zero from a sampling
    /// artifact.
    pub fn allocated(&self) -> (u64, bool) {
        let total_allocs = self.cache_allocs.saturating_add(self.heap_allocs);
        match total_allocs.checked_sub(self.frees) {
            Some(v) => (v, false),
            None => (0, true),
        }
    }

    pub fn rag(&self) -> Rag {
        let (allocated, _skew) = self.allocated();
        if allocated > self.cache_size {
            Rag::Red
        } else if self.heap_allocs > 0 {
            Rag::Amber
        } else {
            Rag::Green
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashTbl {
    pub id: String,
    pub addr: u64,
    pub load: f64,
    pub eff_load: f64,
    pub resized: u32,
}

impl HashTbl {
    pub fn rag(&self) -> Rag {
        if self.resized > 0 {
            Rag::Red
        } else if self.eff_load >= 0.8 * self.load {
            Rag::Amber
        } else {
            Rag::Green
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub tid: u64,
    pub name: String,
    pub cpu: f64,
}

impl Thread {
    pub fn rag(&self) -> Rag {
        if self.cpu >= 0.8 {
            Rag::Red
        } else if self.cpu >= 0.5 {
            Rag::Amber
        } else {
            Rag::Green
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mx {
    pub id: String,
    pub state: ObjState,
}

impl Mx {
    pub fn rag(&self) -> Rag {
        self.state.rag()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socket {
    pub socket: SocketAddr,
    pub tx_buf_len: u64,
    pub rx_buf_len: u64,
    pub size: u64,
}

impl Socket {
    pub fn rag(&self) -> Rag {
        let worst = self.tx_buf_len.max(self.rx_buf_len);
        banded(worst, self.size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: String,
    pub queue_type: String,
    pub count: u64,
    pub size: u64,
}

impl Queue {
    pub fn rag(&self) -> Rag {
        banded(self.count, self.size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub id: String,
    pub state: ObjState,
}

impl Engine {
    pub fn rag(&self) -> Rag {
        self.state.rag()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub state: ObjState,
}

impl Link {
    pub fn rag(&self) -> Rag {
        self.state.rag()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbTable {
    pub name: String,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl DbTable {
    pub fn rag(&self) -> Rag {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return Rag::Green;
        }
        let miss_ratio = self.cache_misses as f64 / total as f64;
        if miss_ratio > 0.8 {
            Rag::Red
        } else if miss_ratio > 0.5 {
            Rag::Amber
        } else {
            Rag::Green
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbHost {
    pub id: String,
    pub state: ObjState,
}

impl DbHost {
    pub fn rag(&self) -> Rag {
        self.state.rag()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Db {
    pub state: ObjState,
}

impl Db {
    pub fn rag(&self) -> Rag {
        self.state.rag()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub time: i64,
    pub seq_no: u64,
    pub severity: Rag,
    pub message: String,
}

/// The tagged union of every producible telemetry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Record {
    Heap(Heap),
    HashTbl(HashTbl),
    Thread(Thread),
    Mx(Mx),
    Socket(Socket),
    Queue(Queue),
    Engine(Engine),
    Link(Link),
    DbTable(DbTable),
    DbHost(DbHost),
    Db(Db),
    App(App),
    Alert(Alert),
}

impl Record {
    /// `None` for `App` ("stored", no RAG) and `Alert` ("n/a").
    pub fn rag(&self) -> Option<Rag> {
        match self {
            Record::Heap(r) => Some(r.rag()),
            Record::HashTbl(r) => Some(r.rag()),
            Record::Thread(r) => Some(r.rag()),
            Record::Mx(r) => Some(r.rag()),
            Record::Socket(r) => Some(r.rag()),
            Record::Queue(r) => Some(r.rag()),
            Record::Engine(r) => Some(r.rag()),
            Record::Link(r) => Some(r.rag()),
            Record::DbTable(r) => Some(r.rag()),
            Record::DbHost(r) => Some(r.rag()),
            Record::Db(r) => Some(r.rag()),
            Record::App(_) | Record::Alert(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_allocated_saturates_instead_of_wrapping() {
        let h = Heap {
            id: "main".into(),
            partition: 0,
            size: 64,
            cache_size: 1 << 20,
            cache_allocs: 0,
            heap_allocs: 3,
            frees: 10,
        };
        assert_eq!(h.allocated(), (0, true));
    }

    #[test]
    fn heap_allocated_includes_cache_allocs() {
        let h = Heap {
            id: "main".into(),
            partition: 0,
            size: 64,
            cache_size: 1 << 20,
            cache_allocs: 40,
            heap_allocs: 10,
            frees: 5,
        };
        assert_eq!(h.allocated(), (45, false));
    }

    #[test]
    fn heap_rag_escalates_on_cache_overflow() {
        let mut h = Heap {
            id: "main".into(),
            partition: 0,
            size: 64,
            cache_size: 100,
            cache_allocs: 0,
            heap_allocs: 200,
            frees: 50,
        };
        assert_eq!(h.rag(), Rag::Red);
        h.heap_allocs = 0;
        h.frees = 0;
        assert_eq!(h.rag(), Rag::Green);
    }

    #[test]
    fn queue_rag_bands_match_thresholds() {
        let mut q = Queue {
            id: "q".into(),
            queue_type: "mpsc".into(),
            count: 40,
            size: 100,
        };
        assert_eq!(q.rag(), Rag::Green);
        q.count = 60;
        assert_eq!(q.rag(), Rag::Amber);
        q.count = 90;
        assert_eq!(q.rag(), Rag::Red);
    }
}
