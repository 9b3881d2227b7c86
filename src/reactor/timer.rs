// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Timed task scheduling on top of [`super::task::Reactor`], guarded by
//! `tokio_util::sync::CancellationToken` the same way the teacher's
//! `client/client.rs` gates its read/write loops with `stop_writes`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::task::{Reactor, SlotId, Task};

/// How a new deadline interacts with an already-scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Unconditionally replace the existing timer.
    Update,
    /// Only reschedule if the new deadline is sooner.
    Advance,
    /// Only reschedule if the new deadline is later.
    Defer,
}

/// A handle to a pending timer. Dropping it leaks the underlying sleep
/// task (harmless — it fires into a channel nobody reads from once the
/// reactor slot is gone); call [`Reactor::del`] to cancel explicitly.
pub struct TimerHandle {
    deadline: Instant,
    pending: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Reactor {
    /// Schedule `task` to run on `sid` at `deadline`, applying `mode`
    /// against whatever timer `slot` currently holds.
    pub fn timed_run(
        self: &Arc<Self>,
        sid: SlotId,
        deadline: Instant,
        mode: TimerMode,
        slot: &mut Option<TimerHandle>,
        task: Task,
    ) {
        if let Some(existing) = slot.as_ref() {
            let keep_existing = match mode {
                TimerMode::Update => false,
                TimerMode::Advance => deadline >= existing.deadline,
                TimerMode::Defer => deadline <= existing.deadline,
            };
            if keep_existing {
                return;
            }
            self.del(slot.take().expect("checked Some above"));
        }

        let pending = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let reactor = self.clone();
        let pending_bg = pending.clone();
        let cancel_bg = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if pending_bg.swap(false, Ordering::SeqCst) {
                        reactor.run(sid, task);
                    }
                }
                _ = cancel_bg.cancelled() => {}
            }
        });

        *slot = Some(TimerHandle {
            deadline,
            pending,
            cancel,
        });
    }

    /// Cancel a timer. Idempotent; returns whether it was still pending
    /// — a fire that raced the cancel may still have enqueued its task,
    /// which callers must tolerate (see module docs on cancellation).
    pub fn del(&self, timer: TimerHandle) -> bool {
        let was_pending = timer.pending.swap(false, Ordering::SeqCst);
        timer.cancel.cancel();
        was_pending
    }
}
