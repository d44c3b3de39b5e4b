// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Contract between the synchronization layer and the scheduler proper
//! OWNERS: @kernel-sync-team
//! PUBLIC API: Dispatcher, HostDispatcher, SchedEvent
//! DEPENDS_ON: types, thread::WaitReason
//! INVARIANTS: `wait_enter` suspends only the running thread; `dispatch` is the single
//!             context-switch checkpoint at the end of a service call
//!
//! Run-queue selection, tick accounting and the context switch itself live
//! behind this trait. The sync layer only tells the scheduler which threads
//! leave or rejoin the ready set and when their priority moved.

mod host;

pub use host::{HostDispatcher, SchedEvent};

use crate::error::Status;
use crate::thread::WaitReason;
use crate::types::{ExecContext, Priority, ThreadId, Timeout};

pub trait Dispatcher {
    /// Thread executing the current service call, `None` before the kernel starts.
    fn running(&self) -> Option<ThreadId>;

    /// Context the current call is issued from.
    fn context(&self) -> ExecContext;

    /// Suspends the running thread for up to `timeout`.
    ///
    /// Returns `false` if the scheduler refuses to suspend it; the caller
    /// then stays ready and must not be queued anywhere.
    fn wait_enter(&mut self, thread: ThreadId, reason: WaitReason, timeout: Timeout) -> bool;

    /// Returns a suspended thread to the ready set, delivering `outcome` as
    /// the result of its pending wait.
    fn wait_exit(&mut self, thread: ThreadId, outcome: Status, dispatch_now: bool);

    /// Effective priority of a ready or running thread changed; re-sort it.
    fn priority_changed(&mut self, thread: ThreadId, priority: Priority);

    /// Re-evaluates which thread runs next.
    fn dispatch(&mut self);
}
