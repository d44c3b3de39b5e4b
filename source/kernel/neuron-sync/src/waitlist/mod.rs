// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Priority-ordered intrusive wait list over the thread pool
//! OWNERS: @kernel-sync-team
//! PUBLIC API: (crate) WaitList::{insert, pop_highest, remove, resort, first, head_priority}
//! DEPENDS_ON: arena::ObjectPool, thread::{Thread, WaitLink}
//! INVARIANTS: Descending effective priority from head to tail; FIFO among equal priorities;
//!             a thread is linked into at most one list (its `wait` field)
//!
//! Links live in the thread control blocks and are expressed as handles, so
//! destroying an object never leaves a dangling pointer behind.

#[cfg(test)]
use alloc::vec::Vec;

use crate::arena::ObjectPool;
use crate::error::SyncError;
use crate::thread::{Thread, WaitLink, WaitObject};
use crate::types::{Priority, ThreadId};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitList {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
}

fn link_of(threads: &ObjectPool<Thread>, id: ThreadId) -> Option<WaitLink> {
    threads.get(id.handle()).ok()?.wait
}

fn link_mut(threads: &mut ObjectPool<Thread>, id: ThreadId) -> Option<&mut WaitLink> {
    threads.get_mut(id.handle()).ok()?.wait.as_mut()
}

impl WaitList {
    pub(crate) const fn new() -> Self {
        Self { head: None, tail: None }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub(crate) fn first(&self) -> Option<ThreadId> {
        self.head
    }

    /// Effective priority of the thread that would be resumed next.
    pub(crate) fn head_priority(&self, threads: &ObjectPool<Thread>) -> Option<Priority> {
        let head = self.first()?;
        threads.get(head.handle()).ok().map(|t| t.priority)
    }

    /// Queues `thread` behind every waiter of equal or higher priority.
    pub(crate) fn insert(
        &mut self,
        threads: &mut ObjectPool<Thread>,
        thread: ThreadId,
        object: WaitObject,
    ) -> Result<(), SyncError> {
        let priority = threads.get(thread.handle())?.priority;

        // Tail-first scan keeps FIFO order among ties without walking the whole list.
        let mut after = self.tail;
        while let Some(cursor) = after {
            let node = threads.get(cursor.handle())?;
            if node.priority >= priority {
                break;
            }
            after = node.wait.and_then(|link| link.prev);
        }

        let next = match after {
            Some(prev) => link_of(threads, prev).and_then(|link| link.next),
            None => self.head,
        };
        threads.get_mut(thread.handle())?.wait = Some(WaitLink { object, prev: after, next });

        match after {
            Some(prev) => {
                if let Some(link) = link_mut(threads, prev) {
                    link.next = Some(thread);
                }
            }
            None => self.head = Some(thread),
        }
        match next {
            Some(next) => {
                if let Some(link) = link_mut(threads, next) {
                    link.prev = Some(thread);
                }
            }
            None => self.tail = Some(thread),
        }
        Ok(())
    }

    /// Unlinks `thread`; returns `false` if it was not queued here.
    pub(crate) fn remove(&mut self, threads: &mut ObjectPool<Thread>, thread: ThreadId) -> bool {
        let Some(link) = link_of(threads, thread) else {
            return false;
        };
        if link.prev.is_none() && self.head != Some(thread) {
            return false;
        }

        match link.prev {
            Some(prev) => {
                if let Some(prev_link) = link_mut(threads, prev) {
                    prev_link.next = link.next;
                }
            }
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(next_link) = link_mut(threads, next) {
                    next_link.prev = link.prev;
                }
            }
            None => self.tail = link.prev,
        }
        if let Ok(tcb) = threads.get_mut(thread.handle()) {
            tcb.wait = None;
        }
        true
    }

    /// Removes and returns the highest-priority (oldest on ties) waiter.
    pub(crate) fn pop_highest(&mut self, threads: &mut ObjectPool<Thread>) -> Option<ThreadId> {
        let head = self.head?;
        if self.remove(threads, head) {
            Some(head)
        } else {
            // Head vanished from the pool; drop the broken chain rather than spin on it.
            *self = Self::new();
            None
        }
    }

    /// Repositions `thread` after its effective priority changed.
    pub(crate) fn resort(
        &mut self,
        threads: &mut ObjectPool<Thread>,
        thread: ThreadId,
    ) -> Result<(), SyncError> {
        let Some(link) = link_of(threads, thread) else {
            return Ok(());
        };
        if self.remove(threads, thread) {
            self.insert(threads, thread, link.object)?;
        }
        Ok(())
    }

    /// Waiters from head to tail.
    #[cfg(test)]
    pub(crate) fn to_vec(&self, threads: &ObjectPool<Thread>) -> Vec<ThreadId> {
        let mut out = Vec::new();
        let mut cursor = self.head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = link_of(threads, id).and_then(|link| link.next);
        }
        out
    }
}


#[cfg(test)]
mod tests_prop;
