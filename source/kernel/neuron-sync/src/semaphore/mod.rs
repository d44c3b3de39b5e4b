// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Counting semaphore with an interrupt-safe fast path and deferred hand-off
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! PUBLIC API: SemaphoreAttr, SyncKernel::{semaphore_new, semaphore_name, semaphore_acquire,
//!             semaphore_release, semaphore_acquire_isr, semaphore_release_isr, semaphore_count,
//!             semaphore_delete, semaphore_delete_class, semaphore_mem_usage,
//!             reserve_semaphore_block, post_process}
//! DEPENDS_ON: atomic::TokenCounter, post::PostQueue, waitlist, lifecycle, sched::Dispatcher
//! INVARIANTS: 0 <= tokens <= max; a thread-context release with waiters never touches the
//!             counter; interrupt handlers only touch the counter and the post queue
//! TEST_COVERAGE: semaphore/tests.rs, semaphore/tests_prop.rs, tests/semaphore_scenarios.rs
//!
//! ## Interrupt release
//!
//! `semaphore_release_isr` bumps the counter and arms one post-processing
//! request per semaphore. [`SyncKernel::post_process`] runs at interrupt exit
//! and moves tokens from the counter to queued waiters in priority order.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::arena::{ControlBlock, MemUsage};
use crate::atomic::TokenCounter;
use crate::config::SEMAPHORE_TOKEN_LIMIT;
use crate::error::{ParameterFault, ResourceFault, Status, SyncError};
use crate::kernel::SyncKernel;
use crate::lifecycle::{self, SafetyMode};
use crate::post::PostRequest;
use crate::sched::Dispatcher;
use crate::thread::{ThreadState, WaitObject, WaitReason};
use crate::types::{ExecContext, SafetyClass, SemaphoreId, Timeout};
use crate::waitlist::WaitList;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemaphoreAttr {
    pub name: Option<&'static str>,
    /// `None` inherits the creating thread's class.
    pub safety_class: Option<SafetyClass>,
    /// Caller-reserved storage from [`SyncKernel::reserve_semaphore_block`].
    pub cb_mem: Option<ControlBlock>,
}

pub(crate) struct SemaphoreCb {
    pub(crate) name: Option<&'static str>,
    pub(crate) safety_class: SafetyClass,
    pub(crate) tokens: TokenCounter,
    pub(crate) waiters: WaitList,
    /// Set while a post-processing request for this semaphore is queued.
    pub(crate) post_pending: AtomicBool,
}

const TARGET: &str = "neuron_sync::semaphore";

fn refuse(id: Option<SemaphoreId>, err: SyncError) -> SyncError {
    log::debug!(target: TARGET, "semaphore {:?} error: {}", id.map(|s| s.handle()), err);
    err
}

impl<D: Dispatcher> SyncKernel<D> {
    /// Reserves caller-owned storage for a later [`semaphore_new`](Self::semaphore_new).
    pub fn reserve_semaphore_block(&mut self) -> Result<ControlBlock, SyncError> {
        self.semaphores.reserve()
    }

    /// Allocation counters of system-provided semaphore control blocks.
    pub fn semaphore_mem_usage(&self) -> MemUsage {
        self.semaphores.usage()
    }

    pub fn semaphore_new(
        &mut self,
        max_count: u32,
        initial_count: u32,
        attr: &SemaphoreAttr,
    ) -> Result<SemaphoreId, SyncError> {
        if self.dispatcher.context() == ExecContext::Interrupt {
            return Err(refuse(None, SyncError::Isr));
        }
        if max_count == 0
            || max_count > u32::from(SEMAPHORE_TOKEN_LIMIT)
            || initial_count > max_count
        {
            return Err(refuse(None, SyncError::Parameter(ParameterFault::InvalidArgument)));
        }
        let class = lifecycle::creation_class(&self.config, self.caller_class(), attr.safety_class)
            .map_err(|err| refuse(None, err))?;
        let cb = SemaphoreCb {
            name: attr.name,
            safety_class: class,
            // Both bounded by SEMAPHORE_TOKEN_LIMIT above.
            tokens: TokenCounter::new(initial_count as u16, max_count as u16),
            waiters: WaitList::new(),
            post_pending: AtomicBool::new(false),
        };
        let handle = match attr.cb_mem {
            Some(block) => self.semaphores.insert_at(block, cb),
            None => self.semaphores.insert(cb),
        }
        .map_err(|err| refuse(None, err))?;
        let id = SemaphoreId::from_handle(handle);
        log::debug!(
            target: TARGET,
            "semaphore {} created: name={:?} max={} initial={} class={}",
            id,
            attr.name,
            max_count,
            initial_count,
            class.as_raw()
        );
        Ok(id)
    }

    /// Served in any context.
    pub fn semaphore_name(&self, id: SemaphoreId) -> Option<&'static str> {
        self.semaphores.get(id.handle()).ok()?.name
    }

    /// Current token count; 0 for an invalid handle. Served in any context.
    pub fn semaphore_count(&self, id: SemaphoreId) -> u32 {
        self.semaphores.get(id.handle()).map(|cb| u32::from(cb.tokens.load())).unwrap_or(0)
    }

    /// Takes a token, suspending the caller for up to `timeout` if none is left.
    ///
    /// From interrupt context this is [`semaphore_acquire_isr`](Self::semaphore_acquire_isr)
    /// and `timeout` is ignored.
    pub fn semaphore_acquire(&mut self, id: SemaphoreId, timeout: Timeout) -> Status {
        if self.dispatcher.context() == ExecContext::Interrupt {
            return self.semaphore_acquire_isr(id);
        }
        let cb = self.semaphores.get(id.handle()).map_err(|err| refuse(Some(id), err))?;
        lifecycle::check_access(&self.config, self.caller_class(), cb.safety_class)
            .map_err(|err| refuse(Some(id), err))?;

        if let Some(left) = cb.tokens.decrement_nonzero() {
            log::trace!(target: TARGET, "semaphore {} acquired (tokens={})", id, left);
            return Ok(());
        }
        if timeout.is_no_wait() {
            log::trace!(target: TARGET, "semaphore {} not acquired", id);
            return Err(SyncError::Resource(ResourceFault::Unavailable));
        }

        let thread = self.running_thread().map_err(|err| refuse(Some(id), err))?;
        if self.dispatcher.wait_enter(thread, WaitReason::Semaphore, timeout) {
            let cb = self.semaphores.get_mut(id.handle())?;
            cb.waiters.insert(&mut self.threads, thread, WaitObject::Semaphore(id))?;
            self.threads.get_mut(thread.handle())?.state =
                ThreadState::Blocked(WaitReason::Semaphore);
            log::trace!(target: TARGET, "semaphore {} acquire pending for {}", id, thread);
        } else {
            log::debug!(
                target: TARGET,
                "semaphore {}: scheduler refused to suspend {}",
                id,
                thread
            );
        }
        Err(SyncError::Timeout)
    }

    /// Returns a token, handing it straight to the highest waiter when there is one.
    ///
    /// From interrupt context this is [`semaphore_release_isr`](Self::semaphore_release_isr).
    pub fn semaphore_release(&mut self, id: SemaphoreId) -> Status {
        if self.dispatcher.context() == ExecContext::Interrupt {
            return self.semaphore_release_isr(id);
        }
        let cb = self.semaphores.get_mut(id.handle()).map_err(|err| refuse(Some(id), err))?;
        let class = cb.safety_class;
        lifecycle::check_access(&self.config, self.caller_class(), class)
            .map_err(|err| refuse(Some(id), err))?;

        let cb = self.semaphores.get_mut(id.handle())?;
        if let Some(next) = cb.waiters.pop_highest(&mut self.threads) {
            log::trace!(target: TARGET, "semaphore {} token handed to {}", id, next);
            self.resume(next, Ok(()), true);
            return Ok(());
        }
        match cb.tokens.increment_below() {
            Some(count) => {
                log::trace!(target: TARGET, "semaphore {} released (tokens={})", id, count);
                Ok(())
            }
            None => Err(refuse(Some(id), SyncError::Resource(ResourceFault::CountLimit))),
        }
    }

    /// Non-blocking acquire usable from interrupt handlers.
    pub fn semaphore_acquire_isr(&self, id: SemaphoreId) -> Status {
        let cb = self.semaphores.get(id.handle()).map_err(|err| refuse(Some(id), err))?;
        match cb.tokens.decrement_nonzero() {
            Some(left) => {
                log::trace!(target: TARGET, "semaphore {} acquired from isr (tokens={})", id, left);
                Ok(())
            }
            None => Err(SyncError::Resource(ResourceFault::Unavailable)),
        }
    }

    /// Release usable from interrupt handlers; waiter hand-off is deferred to
    /// [`post_process`](Self::post_process).
    pub fn semaphore_release_isr(&self, id: SemaphoreId) -> Status {
        let cb = self.semaphores.get(id.handle()).map_err(|err| refuse(Some(id), err))?;
        let Some(count) = cb.tokens.increment_below() else {
            return Err(refuse(Some(id), SyncError::Resource(ResourceFault::CountLimit)));
        };
        if !cb.post_pending.swap(true, Ordering::AcqRel) {
            if let Err(err) = self.post_queue.push(PostRequest::Semaphore(id)) {
                cb.post_pending.store(false, Ordering::Release);
                cb.tokens.decrement_nonzero();
                log::warn!(target: TARGET, "semaphore {} isr release dropped: {}", id, err);
                return Err(err);
            }
        }
        log::trace!(target: TARGET, "semaphore {} released from isr (tokens={})", id, count);
        Ok(())
    }

    /// Interrupt-exit hook: resolves every queued request. Returns the number
    /// of threads resumed; dispatches once if any were.
    pub fn post_process(&mut self) -> usize {
        let mut resumed = 0;
        while let Some(request) = self.post_queue.pop() {
            match request {
                PostRequest::Semaphore(id) => resumed += self.semaphore_post_process(id),
            }
        }
        if resumed > 0 {
            self.dispatcher.dispatch();
        }
        resumed
    }

    fn semaphore_post_process(&mut self, id: SemaphoreId) -> usize {
        let mut resumed = 0;
        loop {
            // Deleted since the request was queued.
            let Ok(cb) = self.semaphores.get_mut(id.handle()) else {
                return resumed;
            };
            cb.post_pending.store(false, Ordering::Release);
            if cb.waiters.is_empty() || cb.tokens.decrement_nonzero().is_none() {
                return resumed;
            }
            let Some(next) = cb.waiters.pop_highest(&mut self.threads) else {
                cb.tokens.increment_below();
                return resumed;
            };
            log::trace!(target: TARGET, "semaphore {} token handed to {} after isr", id, next);
            self.resume(next, Ok(()), false);
            resumed += 1;
        }
    }

    /// Resumes every waiter with `Resource(Deleted)` and destroys the semaphore.
    pub fn semaphore_delete(&mut self, id: SemaphoreId) -> Status {
        if self.dispatcher.context() == ExecContext::Interrupt {
            return Err(refuse(Some(id), SyncError::Isr));
        }
        let cb = self.semaphores.get(id.handle()).map_err(|err| refuse(Some(id), err))?;
        lifecycle::check_access(&self.config, self.caller_class(), cb.safety_class)
            .map_err(|err| refuse(Some(id), err))?;
        if self.flush_waiters(id)? > 0 {
            self.dispatcher.dispatch();
        }
        self.semaphores.remove(id.handle())?;
        log::debug!(target: TARGET, "semaphore {} destroyed", id);
        Ok(())
    }

    /// Destroys every semaphore selected by `class` and `mode`; returns how many went.
    pub fn semaphore_delete_class(
        &mut self,
        class: SafetyClass,
        mode: SafetyMode,
    ) -> Result<usize, SyncError> {
        if self.dispatcher.context() == ExecContext::Interrupt {
            return Err(refuse(None, SyncError::Isr));
        }
        if !self.config.safety_enabled() {
            return Err(refuse(None, SyncError::SafetyClass));
        }
        let mut destroyed = 0;
        let mut unblocked = 0;
        for handle in self.semaphores.handles() {
            let id = SemaphoreId::from_handle(handle);
            let Ok(cb) = self.semaphores.get(handle) else {
                continue;
            };
            if !lifecycle::selected(class, mode, cb.safety_class) {
                continue;
            }
            unblocked += self.flush_waiters(id)?;
            self.semaphores.remove(handle)?;
            log::debug!(
                target: TARGET,
                "semaphore {} destroyed by class {} teardown",
                id,
                class.as_raw()
            );
            destroyed += 1;
        }
        if unblocked > 0 {
            self.dispatcher.dispatch();
        }
        Ok(destroyed)
    }

    fn flush_waiters(&mut self, id: SemaphoreId) -> Result<usize, SyncError> {
        let mut count = 0;
        while let Some(waiter) = {
            let cb = self.semaphores.get_mut(id.handle())?;
            cb.waiters.pop_highest(&mut self.threads)
        } {
            self.resume(waiter, Err(SyncError::Resource(ResourceFault::Deleted)), false);
            count += 1;
        }
        Ok(count)
    }
}


#[cfg(test)]
mod tests_prop;
