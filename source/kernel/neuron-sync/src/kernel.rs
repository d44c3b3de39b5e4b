// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel region owning every control block pool and the scheduler handle
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! PUBLIC API: SyncKernel (new, thread_*, wait_timeout, take_wait_result, post_queue_len)
//! DEPENDS_ON: arena, config, ownership, post, sched::Dispatcher, thread
//! INVARIANTS: Service calls on `&mut self` are serialized by the kernel region; only the
//!             `*_isr` entry points take `&self` and touch nothing but atomics and the post queue
//!
//! Mutex and semaphore services are implemented in their own modules as
//! further `impl` blocks on [`SyncKernel`].

use crate::arena::ObjectPool;
use crate::config::{ConfigError, SyncConfig};
use crate::error::{ParameterFault, Status, SyncError};
use crate::mutex::{MutexCb, MutexFlags};
use crate::ownership;
use crate::post::PostQueue;
use crate::sched::Dispatcher;
use crate::semaphore::SemaphoreCb;
use crate::thread::{Thread, ThreadAttr, ThreadState, WaitObject};
use crate::types::{ObjectKind, Priority, SafetyClass, ThreadId};

/// Synchronization layer state for one kernel instance.
pub struct SyncKernel<D: Dispatcher> {
    pub(crate) config: SyncConfig,
    pub(crate) threads: ObjectPool<Thread>,
    pub(crate) mutexes: ObjectPool<MutexCb>,
    pub(crate) semaphores: ObjectPool<SemaphoreCb>,
    pub(crate) post_queue: PostQueue,
    pub(crate) dispatcher: D,
}

impl<D: Dispatcher> SyncKernel<D> {
    pub fn new(config: SyncConfig, dispatcher: D) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!(
            target: "neuron_sync::kernel",
            "sync layer up: threads={:?} mutexes={:?} semaphores={:?} post_queue={} safety={:?}",
            config.thread_pool,
            config.mutex_pool,
            config.semaphore_pool,
            config.post_queue_depth,
            config.safety_class
        );
        Ok(Self {
            threads: ObjectPool::new(ObjectKind::Thread, config.thread_pool),
            mutexes: ObjectPool::new(ObjectKind::Mutex, config.mutex_pool),
            semaphores: ObjectPool::new(ObjectKind::Semaphore, config.semaphore_pool),
            post_queue: PostQueue::new(config.post_queue_depth),
            config,
            dispatcher,
        })
    }

    #[inline]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline]
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    #[inline]
    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    /// Registers a thread control block.
    pub fn thread_new(&mut self, attr: ThreadAttr) -> Result<ThreadId, SyncError> {
        let id = ThreadId::from_handle(self.threads.insert(Thread::new(&attr))?);
        log::debug!(
            target: "neuron_sync::kernel",
            "thread {} created: name={:?} priority={} class={}",
            id,
            attr.name,
            attr.priority,
            attr.safety_class.as_raw()
        );
        Ok(id)
    }

    pub fn thread_name(&self, thread: ThreadId) -> Option<&'static str> {
        self.threads.get(thread.handle()).ok()?.name
    }

    /// Effective priority, including any inherited boost.
    pub fn thread_priority(&self, thread: ThreadId) -> Result<Priority, SyncError> {
        Ok(self.threads.get(thread.handle())?.priority)
    }

    pub fn thread_base_priority(&self, thread: ThreadId) -> Result<Priority, SyncError> {
        Ok(self.threads.get(thread.handle())?.base_priority)
    }

    pub fn thread_state(&self, thread: ThreadId) -> Result<ThreadState, SyncError> {
        Ok(self.threads.get(thread.handle())?.state)
    }

    pub fn thread_safety_class(&self, thread: ThreadId) -> Result<SafetyClass, SyncError> {
        Ok(self.threads.get(thread.handle())?.safety_class)
    }

    /// Outcome of the thread's last completed wait; cleared on read.
    pub fn take_wait_result(&mut self, thread: ThreadId) -> Option<Status> {
        self.threads.get_mut(thread.handle()).ok()?.wait_result.take()
    }

    /// Tick handler hook: the wait of `thread` expired before it was satisfied.
    ///
    /// The thread leaves the object's wait list and is resumed with `Timeout`.
    /// For a mutex wait the owner drops any boost that thread was lending it.
    pub fn wait_timeout(&mut self, thread: ThreadId) -> Status {
        let object = self.detach_waiter(thread)?;
        log::trace!(
            target: "neuron_sync::kernel",
            "thread {} wait on {:?} timed out",
            thread,
            object
        );
        self.resume(thread, Err(SyncError::Timeout), false);
        Ok(())
    }

    /// Termination hook: drops the thread's waits and robust mutexes, then frees its block.
    ///
    /// Non-robust mutexes stay locked by the dead owner. The caller is
    /// expected to dispatch afterwards.
    pub fn thread_terminate(&mut self, thread: ThreadId) -> Status {
        let state = self.threads.get(thread.handle())?.state;
        if let ThreadState::Blocked(_) = state {
            self.detach_waiter(thread)?;
        }
        self.owner_release(thread);
        self.threads.remove(thread.handle())?;
        log::debug!(target: "neuron_sync::kernel", "thread {} terminated", thread);
        Ok(())
    }

    /// Requests queued by interrupt handlers and not yet processed.
    pub fn post_queue_len(&self) -> usize {
        self.post_queue.len()
    }

    pub(crate) fn running_thread(&self) -> Result<ThreadId, SyncError> {
        self.dispatcher.running().ok_or(SyncError::KernelNotRunning)
    }

    pub(crate) fn caller_class(&self) -> Option<SafetyClass> {
        let running = self.dispatcher.running()?;
        self.threads.get(running.handle()).ok().map(|t| t.safety_class)
    }

    /// Marks `thread` ready and hands `outcome` to the scheduler.
    pub(crate) fn resume(&mut self, thread: ThreadId, outcome: Status, dispatch_now: bool) {
        if let Ok(tcb) = self.threads.get_mut(thread.handle()) {
            tcb.state = ThreadState::Ready;
            tcb.wait = None;
            tcb.wait_result = Some(outcome);
        }
        self.dispatcher.wait_exit(thread, outcome, dispatch_now);
    }

    /// Applies a new effective priority and re-sorts the thread wherever it is queued.
    pub(crate) fn set_effective_priority(&mut self, thread: ThreadId, priority: Priority) {
        let Ok(tcb) = self.threads.get_mut(thread.handle()) else {
            return;
        };
        if tcb.priority == priority {
            return;
        }
        tcb.priority = priority;
        log::trace!(
            target: "neuron_sync::kernel",
            "thread {} effective priority -> {}",
            thread,
            priority
        );
        self.list_sort(thread, priority);
    }

    /// Re-sorts a thread after its priority changed: inside the wait list it
    /// blocks on, or in the ready set via the scheduler.
    fn list_sort(&mut self, thread: ThreadId, priority: Priority) {
        let object = self.threads.get(thread.handle()).ok().and_then(|t| t.wait).map(|l| l.object);
        let resorted = match object {
            Some(WaitObject::Mutex(id)) => match self.mutexes.get_mut(id.handle()) {
                Ok(cb) => cb.waiters.resort(&mut self.threads, thread).is_ok(),
                Err(_) => false,
            },
            Some(WaitObject::Semaphore(id)) => match self.semaphores.get_mut(id.handle()) {
                Ok(cb) => cb.waiters.resort(&mut self.threads, thread).is_ok(),
                Err(_) => false,
            },
            None => false,
        };
        if !resorted {
            self.dispatcher.priority_changed(thread, priority);
        }
    }

    /// Recomputes `owner`'s effective priority from the mutexes it still owns.
    pub(crate) fn restore_owner_priority(&mut self, owner: ThreadId) {
        if let Ok(priority) = ownership::inherited_priority(&self.mutexes, &self.threads, owner) {
            self.set_effective_priority(owner, priority);
        }
    }

    /// Removes a blocked thread from the wait list it sits on and returns that object.
    fn detach_waiter(&mut self, thread: ThreadId) -> Result<WaitObject, SyncError> {
        let link = self
            .threads
            .get(thread.handle())?
            .wait
            .ok_or(SyncError::Parameter(ParameterFault::InvalidArgument))?;
        match link.object {
            WaitObject::Mutex(id) => {
                let cb = self.mutexes.get_mut(id.handle())?;
                cb.waiters.remove(&mut self.threads, thread);
                let owner = cb.owner;
                let inherits = cb.flags.contains(MutexFlags::PRIO_INHERIT);
                if let (Some(owner), true) = (owner, inherits) {
                    self.restore_owner_priority(owner);
                }
            }
            WaitObject::Semaphore(id) => {
                let cb = self.semaphores.get_mut(id.handle())?;
                cb.waiters.remove(&mut self.threads, thread);
            }
        }
        if let Ok(tcb) = self.threads.get_mut(thread.handle()) {
            tcb.wait = None;
            tcb.state = ThreadState::Ready;
        }
        Ok(link.object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::HostDispatcher;

    #[test]
    fn rejects_invalid_config() {
        let config = SyncConfig { post_queue_depth: 0, ..SyncConfig::default() };
        assert!(SyncKernel::new(config, HostDispatcher::new()).is_err());
    }

    #[test]
    fn thread_pool_capacity_is_enforced() {
        let config = SyncConfig { thread_pool: Some(1), ..SyncConfig::default() };
        let mut kernel = SyncKernel::new(config, HostDispatcher::new()).unwrap();
        let first = kernel.thread_new(ThreadAttr::default()).unwrap();
        assert_eq!(kernel.thread_new(ThreadAttr::default()), Err(SyncError::NoMemory));
        assert_eq!(kernel.thread_terminate(first), Ok(()));
        assert!(kernel.thread_new(ThreadAttr::default()).is_ok());
        assert!(kernel.thread_priority(first).is_err());
    }

    #[test]
    fn timeout_of_ready_thread_is_rejected() {
        let mut kernel = SyncKernel::new(SyncConfig::default(), HostDispatcher::new()).unwrap();
        let a = kernel.thread_new(ThreadAttr::default()).unwrap();
        assert_eq!(
            kernel.wait_timeout(a),
            Err(SyncError::Parameter(ParameterFault::InvalidArgument))
        );
        assert_eq!(kernel.take_wait_result(a), None);
    }
}
