// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Named worker slots: a cooperative task dispatcher over a fixed-size
//! pool of Tokio tasks. Each slot drains its own channel and awaits one
//! submitted future to completion before picking up the next — the
//! reactor's "non-preemptive within a slot" guarantee — the same shape
//! as the teacher's per-session `tokio::spawn` read/write loops in
//! `client/client.rs`, generalized from one fixed loop per connection to
//! N named loops shared by every link.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use tokio::sync::mpsc;

pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

tokio::task_local! {
    static CURRENT_SLOT: SlotId;
}

/// A fixed pool of named worker slots, each processing its queue
/// strictly in submission order.
pub struct Reactor {
    senders: Vec<mpsc::UnboundedSender<Task>>,
    round_robin: AtomicU32,
}

impl Reactor {
    /// Spawn `n_slots` worker loops on the current Tokio runtime.
    pub fn start(n_slots: u32) -> Arc<Self> {
        let mut senders = Vec::with_capacity(n_slots as usize);
        for i in 0..n_slots {
            let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
            let sid = SlotId(i);
            tokio::spawn(async move {
                while let Some(task) = rx.recv().await {
                    CURRENT_SLOT.scope(sid, task).await;
                }
            });
            senders.push(tx);
        }
        Arc::new(Self {
            senders,
            round_robin: AtomicU32::new(0),
        })
    }

    pub fn slot_count(&self) -> u32 {
        self.senders.len() as u32
    }

    fn send(&self, sid: SlotId, task: Task) {
        // a slot's worker loop has already exited only on shutdown; a
        // send racing that teardown is dropped rather than panicking.
        let _ = self.senders[sid.0 as usize].send(task);
    }

    /// Enqueue on any worker, chosen round-robin.
    pub fn add(&self, task: Task) {
        let n = self.senders.len() as u32;
        let next = self.round_robin.fetch_add(1, Ordering::Relaxed) % n;
        self.send(SlotId(next), task);
    }

    /// Enqueue on slot `sid`.
    pub fn run(&self, sid: SlotId, task: Task) {
        self.send(sid, task);
    }

    /// Enqueue on slot `sid` without waking it early. Tokio's mpsc
    /// channel always wakes its receiver on send, so this is identical
    /// to [`Self::run`] in this cooperative-over-async-tasks model; the
    /// distinction only has teeth in an epoll-driven reactor where a
    /// slot can be asleep in a syscall.
    pub fn push(&self, sid: SlotId, task: Task) {
        self.send(sid, task);
    }

    /// Execute `task` inline if the caller is already running on `sid`;
    /// otherwise enqueue it there.
    pub async fn invoke(&self, sid: SlotId, task: Task) {
        let on_slot = CURRENT_SLOT
            .try_with(|&current| current == sid)
            .unwrap_or(false);
        if on_slot {
            task.await;
        } else {
            self.run(sid, task);
        }
    }
}
