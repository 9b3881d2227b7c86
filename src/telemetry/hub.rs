// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-process fan-out from live-object observers to subscribed links:
//! `publish` is called by whatever samples a `Heap`/`Socket`/etc. on
//! each tick, `service_request` is called once per link that asks for
//! a `TelReq` — it snapshots the live set, then hands back a broadcast
//! receiver for the deltas that follow (spec.md §4.5 "A telemetry
//! request ... is serviced ... by iterating live collections, pushing
//! current snapshots, then subscribing the link to incremental
//! deltas").
//!
//! Grounded on the teacher's `tokio::sync::mpsc`-per-link shape
//! (`client/client.rs`'s `sending`/`reciver` `DashMap`s), swapped for a
//! broadcast channel since telemetry is multicast rather than
//! point-to-point.

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{record::Record, request::ReqType};

fn req_type_of(record: &Record) -> ReqType {
    match record {
        Record::Heap(_) => ReqType::HEAP,
        Record::HashTbl(_) => ReqType::HASH_TBL,
        Record::Thread(_) => ReqType::THREAD,
        Record::Mx(_) => ReqType::MX,
        Record::Socket(_) => ReqType::SOCKET,
        Record::Queue(_) => ReqType::QUEUE,
        Record::Engine(_) => ReqType::ENGINE,
        Record::Link(_) => ReqType::LINK,
        Record::DbTable(_) => ReqType::DB_TABLE,
        Record::DbHost(_) => ReqType::DB_HOST,
        Record::Db(_) => ReqType::DB,
        Record::App(_) => ReqType::APP,
        Record::Alert(_) => ReqType::ALERT,
    }
}

/// A record's primary key, tuple-hashed per spec.md §4.5 into a single
/// opaque string — sufficient to dedupe live snapshots without adding a
/// bespoke key type per record.
fn record_key(record: &Record) -> String {
    match record {
        Record::Heap(r) => format!("heap:{}:{}:{}", r.id, r.partition, r.size),
        Record::HashTbl(r) => format!("hashtbl:{}:{}", r.id, r.addr),
        Record::Thread(r) => format!("thread:{}", r.tid),
        Record::Mx(r) => format!("mx:{}", r.id),
        Record::Socket(r) => format!("socket:{}", r.socket),
        Record::Queue(r) => format!("queue:{}:{}", r.id, r.queue_type),
        Record::Engine(r) => format!("engine:{}", r.id),
        Record::Link(r) => format!("link:{}", r.id),
        Record::DbTable(r) => format!("dbtable:{}", r.name),
        Record::DbHost(r) => format!("dbhost:{}", r.id),
        Record::Db(_) => "db".to_string(),
        Record::App(r) => format!("app:{}", r.id),
        Record::Alert(r) => format!("alert:{}:{}", r.time, r.seq_no),
    }
}

/// Backpressure bookkeeping for one subscriber: drop pushes once the
/// link's outbound queue depth crosses `high_water`, resume (with a
/// fresh snapshot) once it falls back below `low_water` (spec.md §5).
pub struct Watermarks {
    pub high_water: usize,
    pub low_water: usize,
}

pub struct Hub {
    live: DashMap<String, Record>,
    tx: broadcast::Sender<Record>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            live: DashMap::new(),
            tx,
        }
    }

    /// Record a live update and multicast it to every current
    /// subscriber. A full broadcast channel drops the oldest queued
    /// record for slow subscribers rather than blocking the publisher.
    pub fn publish(&self, record: Record) {
        self.live.insert(record_key(&record), record.clone());
        let _ = self.tx.send(record);
    }

    /// Snapshot every live record matching `types`, then return a
    /// receiver for subsequent deltas. The snapshot is taken before
    /// subscribing so a record updated between the two can appear
    /// twice (benign: the client's view is idempotent per primary key)
    /// but never zero times.
    pub fn service_request(&self, types: ReqType) -> (Vec<Record>, broadcast::Receiver<Record>) {
        let rx = self.tx.subscribe();
        let snapshot = self
            .live
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| types.contains(req_type_of(r)))
            .collect();
        (snapshot, rx)
    }
}
