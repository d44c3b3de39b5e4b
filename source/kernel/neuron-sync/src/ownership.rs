// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-thread list of owned mutexes and inherited priority computation
//! OWNERS: @kernel-sync-team
//! PUBLIC API: (crate) link, unlink, owned, inherited_priority
//! DEPENDS_ON: arena::ObjectPool, mutex::MutexCb, thread::Thread
//! INVARIANTS: A locked mutex with a live owner is linked exactly once into that owner's list;
//!             the list head is `Thread::mutex_list`, links are `MutexCb::{owner_prev, owner_next}`
//!
//! Inheritance is evaluated one level deep: only the waiters queued directly
//! on the owner's mutexes count, not the waiters of whatever those waiters own.

extern crate alloc;

use alloc::vec::Vec;

use crate::arena::ObjectPool;
use crate::error::SyncError;
use crate::mutex::{MutexCb, MutexFlags};
use crate::thread::Thread;
use crate::types::{MutexId, Priority, ThreadId, MAX_OBJECTS};

/// Pushes `mutex` at the front of `owner`'s list and records the owner.
pub(crate) fn link(
    mutexes: &mut ObjectPool<MutexCb>,
    threads: &mut ObjectPool<Thread>,
    mutex: MutexId,
    owner: ThreadId,
) -> Result<(), SyncError> {
    let head = threads.get(owner.handle())?.mutex_list;
    {
        let cb = mutexes.get_mut(mutex.handle())?;
        cb.owner = Some(owner);
        cb.owner_prev = None;
        cb.owner_next = head;
    }
    if let Some(head) = head {
        if let Ok(next) = mutexes.get_mut(head.handle()) {
            next.owner_prev = Some(mutex);
        }
    }
    threads.get_mut(owner.handle())?.mutex_list = Some(mutex);
    Ok(())
}

/// Detaches `mutex` from its owner's list. The `owner` field is left untouched.
pub(crate) fn unlink(
    mutexes: &mut ObjectPool<MutexCb>,
    threads: &mut ObjectPool<Thread>,
    mutex: MutexId,
) -> Result<(), SyncError> {
    let (owner, prev, next) = {
        let cb = mutexes.get_mut(mutex.handle())?;
        let links = (cb.owner, cb.owner_prev, cb.owner_next);
        cb.owner_prev = None;
        cb.owner_next = None;
        links
    };
    if let Some(next) = next {
        if let Ok(cb) = mutexes.get_mut(next.handle()) {
            cb.owner_prev = prev;
        }
    }
    match prev {
        Some(prev) => {
            if let Ok(cb) = mutexes.get_mut(prev.handle()) {
                cb.owner_next = next;
            }
        }
        None => {
            if let Some(owner) = owner {
                // The owner may already be gone (terminated holding a non-robust mutex).
                if let Ok(tcb) = threads.get_mut(owner.handle()) {
                    if tcb.mutex_list == Some(mutex) {
                        tcb.mutex_list = next;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Mutexes currently owned by `thread`, most recently acquired first.
pub(crate) fn owned(
    mutexes: &ObjectPool<MutexCb>,
    threads: &ObjectPool<Thread>,
    thread: ThreadId,
) -> Vec<MutexId> {
    let mut out = Vec::new();
    let mut cursor = threads.get(thread.handle()).ok().and_then(|t| t.mutex_list);
    while let Some(id) = cursor {
        if out.len() >= MAX_OBJECTS {
            break;
        }
        out.push(id);
        cursor = mutexes.get(id.handle()).ok().and_then(|cb| cb.owner_next);
    }
    out
}

/// `max(base, head waiter priority of every owned priority-inherit mutex)`.
pub(crate) fn inherited_priority(
    mutexes: &ObjectPool<MutexCb>,
    threads: &ObjectPool<Thread>,
    thread: ThreadId,
) -> Result<Priority, SyncError> {
    let mut priority = threads.get(thread.handle())?.base_priority;
    for id in owned(mutexes, threads, thread) {
        let Ok(cb) = mutexes.get(id.handle()) else {
            continue;
        };
        if !cb.flags.contains(MutexFlags::PRIO_INHERIT) {
            continue;
        }
        if let Some(waiter) = cb.waiters.head_priority(threads) {
            if waiter > priority {
                priority = waiter;
            }
        }
    }
    Ok(priority)
}
