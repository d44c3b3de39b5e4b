// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Deterministic scheduler stand-in for host tests and bring-up selftests
//! OWNERS: @kernel-sync-team
//! PUBLIC API: HostDispatcher, SchedEvent
//! DEPENDS_ON: sched::Dispatcher
//! INVARIANTS: Records every scheduler call in issue order; never switches threads on its own

extern crate alloc;

use alloc::vec::Vec;

use super::Dispatcher;
use crate::error::Status;
use crate::thread::WaitReason;
use crate::types::{ExecContext, Priority, ThreadId, Timeout};

/// One recorded scheduler interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedEvent {
    WaitEnter { thread: ThreadId, reason: WaitReason, timeout: Timeout },
    WaitExit { thread: ThreadId, outcome: Status, dispatch_now: bool },
    PriorityChanged { thread: ThreadId, priority: Priority },
    Dispatch,
}

/// Scheduler whose running thread and context are set explicitly by the test.
#[derive(Debug)]
pub struct HostDispatcher {
    running: Option<ThreadId>,
    context: ExecContext,
    refuse_wait: bool,
    events: Vec<SchedEvent>,
}

impl Default for HostDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HostDispatcher {
    pub const fn new() -> Self {
        Self { running: None, context: ExecContext::Thread, refuse_wait: false, events: Vec::new() }
    }

    pub fn set_running(&mut self, thread: Option<ThreadId>) {
        self.running = thread;
    }

    pub fn enter_interrupt(&mut self) {
        self.context = ExecContext::Interrupt;
    }

    pub fn exit_interrupt(&mut self) {
        self.context = ExecContext::Thread;
    }

    /// Makes subsequent `wait_enter` calls fail.
    pub fn set_refuse_wait(&mut self, refuse: bool) {
        self.refuse_wait = refuse;
    }

    pub fn events(&self) -> &[SchedEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<SchedEvent> {
        core::mem::take(&mut self.events)
    }

    /// Threads resumed so far, with the outcome handed to each, in resume order.
    pub fn resumed(&self) -> Vec<(ThreadId, Status)> {
        self.events
            .iter()
            .filter_map(|event| match *event {
                SchedEvent::WaitExit { thread, outcome, .. } => Some((thread, outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn dispatch_count(&self) -> usize {
        self.events.iter().filter(|event| matches!(event, SchedEvent::Dispatch)).count()
    }
}

impl Dispatcher for HostDispatcher {
    fn running(&self) -> Option<ThreadId> {
        self.running
    }

    fn context(&self) -> ExecContext {
        self.context
    }

    fn wait_enter(&mut self, thread: ThreadId, reason: WaitReason, timeout: Timeout) -> bool {
        if self.refuse_wait {
            return false;
        }
        self.events.push(SchedEvent::WaitEnter { thread, reason, timeout });
        true
    }

    fn wait_exit(&mut self, thread: ThreadId, outcome: Status, dispatch_now: bool) {
        self.events.push(SchedEvent::WaitExit { thread, outcome, dispatch_now });
    }

    fn priority_changed(&mut self, thread: ThreadId, priority: Priority) {
        self.events.push(SchedEvent::PriorityChanged { thread, priority });
    }

    fn dispatch(&mut self) {
        self.events.push(SchedEvent::Dispatch);
    }
}
