// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Recursive, priority-inheriting, robust kernel mutex
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! PUBLIC API: MutexFlags, MutexAttr, SyncKernel::{mutex_new, mutex_name, mutex_acquire,
//!             mutex_release, mutex_owner, mutex_lock_count, mutex_delete, mutex_delete_class,
//!             mutex_mem_usage, reserve_mutex_block}
//! DEPENDS_ON: ownership, waitlist, lifecycle, sched::Dispatcher
//! INVARIANTS: lock > 0 iff owner is Some; only the owner releases; a release that reaches
//!             zero hands the mutex straight to the highest waiter before dispatching
//! TEST_COVERAGE: mutex/tests.rs, mutex/tests_prop.rs, tests/mutex_scenarios.rs
//!
//! ## Blocking protocol
//!
//! A contended acquire returns `Err(SyncError::Timeout)` once the caller is
//! queued. The real outcome reaches the thread when the scheduler resumes
//! it: `Ok(())` on hand-off, `Resource(Deleted)` if the mutex is deleted,
//! `Timeout` if the wait expires.

use bitflags::bitflags;

use crate::arena::{ControlBlock, MemUsage};
use crate::config::MUTEX_LOCK_LIMIT;
use crate::error::{ResourceFault, Status, SyncError};
use crate::kernel::SyncKernel;
use crate::lifecycle::{self, SafetyMode};
use crate::ownership;
use crate::sched::Dispatcher;
use crate::thread::{ThreadState, WaitObject, WaitReason};
use crate::types::{ExecContext, MutexId, SafetyClass, ThreadId, Timeout};
use crate::waitlist::WaitList;

bitflags! {
    /// Mutex attribute bits (CMSIS `osMutex*` layout).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MutexFlags: u32 {
        const RECURSIVE = 0x01;
        const PRIO_INHERIT = 0x02;
        const ROBUST = 0x08;
    }
}

impl Default for MutexFlags {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutexAttr {
    pub name: Option<&'static str>,
    pub flags: MutexFlags,
    /// `None` inherits the creating thread's class.
    pub safety_class: Option<SafetyClass>,
    /// Caller-reserved storage from [`SyncKernel::reserve_mutex_block`].
    pub cb_mem: Option<ControlBlock>,
}

impl MutexAttr {
    pub const fn with_flags(flags: MutexFlags) -> Self {
        Self { name: None, flags, safety_class: None, cb_mem: None }
    }
}

#[derive(Debug)]
pub(crate) struct MutexCb {
    pub(crate) name: Option<&'static str>,
    pub(crate) flags: MutexFlags,
    pub(crate) safety_class: SafetyClass,
    pub(crate) lock: u8,
    pub(crate) owner: Option<ThreadId>,
    pub(crate) owner_prev: Option<MutexId>,
    pub(crate) owner_next: Option<MutexId>,
    pub(crate) waiters: WaitList,
}

impl MutexCb {
    fn new(attr: &MutexAttr, safety_class: SafetyClass) -> Self {
        Self {
            name: attr.name,
            flags: attr.flags,
            safety_class,
            lock: 0,
            owner: None,
            owner_prev: None,
            owner_next: None,
            waiters: WaitList::new(),
        }
    }
}

const TARGET: &str = "neuron_sync::mutex";

fn refuse(id: Option<MutexId>, err: SyncError) -> SyncError {
    log::debug!(target: TARGET, "mutex {:?} error: {}", id.map(|m| m.handle()), err);
    err
}

impl<D: Dispatcher> SyncKernel<D> {
    fn mutex_thread_context(&self, id: Option<MutexId>) -> Result<(), SyncError> {
        match self.dispatcher.context() {
            ExecContext::Thread => Ok(()),
            ExecContext::Interrupt => Err(refuse(id, SyncError::Isr)),
        }
    }

    /// Reserves caller-owned storage for a later [`mutex_new`](Self::mutex_new).
    pub fn reserve_mutex_block(&mut self) -> Result<ControlBlock, SyncError> {
        self.mutexes.reserve()
    }

    /// Allocation counters of system-provided mutex control blocks.
    pub fn mutex_mem_usage(&self) -> MemUsage {
        self.mutexes.usage()
    }

    pub fn mutex_new(&mut self, attr: &MutexAttr) -> Result<MutexId, SyncError> {
        self.mutex_thread_context(None)?;
        let class = lifecycle::creation_class(&self.config, self.caller_class(), attr.safety_class)
            .map_err(|err| refuse(None, err))?;
        let cb = MutexCb::new(attr, class);
        let handle = match attr.cb_mem {
            Some(block) => self.mutexes.insert_at(block, cb),
            None => self.mutexes.insert(cb),
        }
        .map_err(|err| refuse(None, err))?;
        let id = MutexId::from_handle(handle);
        log::debug!(
            target: TARGET,
            "mutex {} created: name={:?} flags={:?} class={}",
            id,
            attr.name,
            attr.flags,
            class.as_raw()
        );
        Ok(id)
    }

    /// Served in any context.
    pub fn mutex_name(&self, id: MutexId) -> Option<&'static str> {
        self.mutexes.get(id.handle()).ok()?.name
    }

    pub fn mutex_acquire(&mut self, id: MutexId, timeout: Timeout) -> Status {
        self.mutex_thread_context(Some(id))?;
        let thread = self.running_thread().map_err(|err| refuse(Some(id), err))?;
        let cb = self.mutexes.get(id.handle()).map_err(|err| refuse(Some(id), err))?;
        lifecycle::check_access(&self.config, self.caller_class(), cb.safety_class)
            .map_err(|err| refuse(Some(id), err))?;

        if cb.lock == 0 {
            ownership::link(&mut self.mutexes, &mut self.threads, id, thread)?;
            self.mutexes.get_mut(id.handle())?.lock = 1;
            log::trace!(target: TARGET, "mutex {} acquired by {} (lock=1)", id, thread);
            return Ok(());
        }

        if cb.owner == Some(thread) {
            if !cb.flags.contains(MutexFlags::RECURSIVE) {
                return Err(refuse(Some(id), SyncError::Resource(ResourceFault::Unavailable)));
            }
            if cb.lock == MUTEX_LOCK_LIMIT {
                return Err(refuse(Some(id), SyncError::Resource(ResourceFault::LockLimit)));
            }
            let cb = self.mutexes.get_mut(id.handle())?;
            cb.lock += 1;
            log::trace!(target: TARGET, "mutex {} acquired by {} (lock={})", id, thread, cb.lock);
            return Ok(());
        }

        if timeout.is_no_wait() {
            log::trace!(target: TARGET, "mutex {} not acquired by {}", id, thread);
            return Err(SyncError::Resource(ResourceFault::Unavailable));
        }

        let owner = cb.owner;
        let inherits = cb.flags.contains(MutexFlags::PRIO_INHERIT);
        if let (Some(owner), true) = (owner, inherits) {
            let caller_priority = self.threads.get(thread.handle())?.priority;
            let owner_priority = self.threads.get(owner.handle()).map(|t| t.priority);
            if matches!(owner_priority, Ok(p) if p < caller_priority) {
                self.set_effective_priority(owner, caller_priority);
            }
        }

        if self.dispatcher.wait_enter(thread, WaitReason::Mutex, timeout) {
            let cb = self.mutexes.get_mut(id.handle())?;
            cb.waiters.insert(&mut self.threads, thread, WaitObject::Mutex(id))?;
            self.threads.get_mut(thread.handle())?.state = ThreadState::Blocked(WaitReason::Mutex);
            log::trace!(target: TARGET, "mutex {} acquire pending for {}", id, thread);
        } else {
            // The caller never joined the wait list; drop any boost it lent.
            if let (Some(owner), true) = (owner, inherits) {
                self.restore_owner_priority(owner);
            }
            log::debug!(target: TARGET, "mutex {}: scheduler refused to suspend {}", id, thread);
        }
        Err(SyncError::Timeout)
    }

    pub fn mutex_release(&mut self, id: MutexId) -> Status {
        self.mutex_thread_context(Some(id))?;
        let thread = self.running_thread().map_err(|err| refuse(Some(id), err))?;
        let cb = self.mutexes.get_mut(id.handle()).map_err(|err| refuse(Some(id), err))?;
        if cb.lock == 0 {
            return Err(refuse(Some(id), SyncError::Resource(ResourceFault::NotLocked)));
        }
        if cb.owner != Some(thread) {
            return Err(refuse(Some(id), SyncError::Resource(ResourceFault::NotOwned)));
        }
        cb.lock -= 1;
        if cb.lock > 0 {
            log::trace!(target: TARGET, "mutex {} released by {} (lock={})", id, thread, cb.lock);
            return Ok(());
        }

        ownership::unlink(&mut self.mutexes, &mut self.threads, id)?;
        self.restore_owner_priority(thread);
        log::trace!(target: TARGET, "mutex {} released by {}", id, thread);
        self.hand_off(id)?;
        self.dispatcher.dispatch();
        Ok(())
    }

    /// `None` when unlocked, invalid, or called from interrupt context.
    pub fn mutex_owner(&self, id: MutexId) -> Option<ThreadId> {
        if self.dispatcher.context() == ExecContext::Interrupt {
            return None;
        }
        let cb = self.mutexes.get(id.handle()).ok()?;
        if cb.lock == 0 {
            return None;
        }
        cb.owner
    }

    /// Current recursion depth; 0 when unlocked.
    pub fn mutex_lock_count(&self, id: MutexId) -> Result<u8, SyncError> {
        Ok(self.mutexes.get(id.handle())?.lock)
    }

    /// Unlocks if needed, resumes every waiter with `Resource(Deleted)` and destroys the mutex.
    pub fn mutex_delete(&mut self, id: MutexId) -> Status {
        self.mutex_thread_context(Some(id))?;
        let cb = self.mutexes.get(id.handle()).map_err(|err| refuse(Some(id), err))?;
        lifecycle::check_access(&self.config, self.caller_class(), cb.safety_class)
            .map_err(|err| refuse(Some(id), err))?;
        if self.force_unlock(id)? {
            self.dispatcher.dispatch();
        }
        self.mutexes.remove(id.handle())?;
        log::debug!(target: TARGET, "mutex {} destroyed", id);
        Ok(())
    }

    /// Destroys every mutex selected by `class` and `mode`; returns how many went.
    pub fn mutex_delete_class(
        &mut self,
        class: SafetyClass,
        mode: SafetyMode,
    ) -> Result<usize, SyncError> {
        self.mutex_thread_context(None)?;
        if !self.config.safety_enabled() {
            return Err(refuse(None, SyncError::SafetyClass));
        }
        let mut destroyed = 0;
        let mut unblocked = false;
        for handle in self.mutexes.handles() {
            let id = MutexId::from_handle(handle);
            let Ok(cb) = self.mutexes.get(handle) else {
                continue;
            };
            if !lifecycle::selected(class, mode, cb.safety_class) {
                continue;
            }
            unblocked |= self.force_unlock(id)?;
            self.mutexes.remove(handle)?;
            log::debug!(
                target: TARGET,
                "mutex {} destroyed by class {} teardown",
                id,
                class.as_raw()
            );
            destroyed += 1;
        }
        if unblocked {
            self.dispatcher.dispatch();
        }
        Ok(destroyed)
    }

    /// Gives a freshly unlocked mutex to its highest-priority waiter, if any.
    fn hand_off(&mut self, id: MutexId) -> Result<Option<ThreadId>, SyncError> {
        let cb = self.mutexes.get_mut(id.handle())?;
        let Some(next) = cb.waiters.pop_highest(&mut self.threads) else {
            cb.owner = None;
            return Ok(None);
        };
        self.resume(next, Ok(()), false);
        ownership::link(&mut self.mutexes, &mut self.threads, id, next)?;
        self.mutexes.get_mut(id.handle())?.lock = 1;
        log::trace!(target: TARGET, "mutex {} handed to {} (lock=1)", id, next);
        Ok(Some(next))
    }

    /// Full unlock without ownership check; waiters leave with `Resource(Deleted)`.
    /// Returns `false` if the mutex was not locked.
    fn force_unlock(&mut self, id: MutexId) -> Result<bool, SyncError> {
        let cb = self.mutexes.get(id.handle())?;
        if cb.lock == 0 {
            return Ok(false);
        }
        let owner = cb.owner;
        ownership::unlink(&mut self.mutexes, &mut self.threads, id)?;
        if let Some(owner) = owner {
            self.restore_owner_priority(owner);
        }
        let cb = self.mutexes.get_mut(id.handle())?;
        cb.lock = 0;
        cb.owner = None;
        while let Some(waiter) = {
            let cb = self.mutexes.get_mut(id.handle())?;
            cb.waiters.pop_highest(&mut self.threads)
        } {
            self.resume(waiter, Err(SyncError::Resource(ResourceFault::Deleted)), false);
        }
        Ok(true)
    }

    /// Termination path: releases robust mutexes owned by `thread` and detaches the rest.
    pub(crate) fn owner_release(&mut self, thread: ThreadId) {
        for id in ownership::owned(&self.mutexes, &self.threads, thread) {
            let Ok(cb) = self.mutexes.get_mut(id.handle()) else {
                continue;
            };
            if cb.flags.contains(MutexFlags::ROBUST) {
                cb.lock = 0;
                cb.owner_prev = None;
                cb.owner_next = None;
                log::debug!(
                    target: TARGET,
                    "robust mutex {} released on owner {} exit",
                    id,
                    thread
                );
                if let Err(err) = self.hand_off(id) {
                    log::warn!(
                        target: TARGET,
                        "mutex {} hand-off on owner exit failed: {}",
                        id,
                        err
                    );
                }
            } else {
                // Stays locked by the dead owner; only the list links go.
                cb.owner_prev = None;
                cb.owner_next = None;
                log::warn!(
                    target: TARGET,
                    "mutex {} left locked by terminated owner {}",
                    id,
                    thread
                );
            }
        }
        if let Ok(tcb) = self.threads.get_mut(thread.handle()) {
            tcb.mutex_list = None;
        }
    }
}


#[cfg(test)]
mod tests_prop;
