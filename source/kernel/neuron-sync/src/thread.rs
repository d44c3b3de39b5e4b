// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Thread control block fields the synchronization layer relies on
//! OWNERS: @kernel-sync-team
//! PUBLIC API: ThreadAttr, ThreadState, WaitReason, WaitObject
//! DEPENDS_ON: types, error
//! INVARIANTS: `wait` is Some exactly while the thread is Blocked on a mutex or semaphore;
//!             `priority >= base_priority`

use crate::error::Status;
use crate::types::{MutexId, Priority, SafetyClass, SemaphoreId, ThreadId};

/// Creation attributes of a thread control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAttr {
    pub name: Option<&'static str>,
    pub priority: Priority,
    pub safety_class: SafetyClass,
}

impl Default for ThreadAttr {
    fn default() -> Self {
        Self { name: None, priority: Priority::NORMAL, safety_class: SafetyClass::default() }
    }
}

impl ThreadAttr {
    pub fn with_priority(priority: Priority) -> Self {
        Self { priority, ..Self::default() }
    }

    pub fn with_class(priority: Priority, safety_class: SafetyClass) -> Self {
        Self { priority, safety_class, ..Self::default() }
    }
}

/// Scheduler-visible blocking reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    Mutex,
    Semaphore,
}

/// Object a blocked thread is queued on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitObject {
    Mutex(MutexId),
    Semaphore(SemaphoreId),
}

impl WaitObject {
    pub const fn reason(self) -> WaitReason {
        match self {
            Self::Mutex(_) => WaitReason::Mutex,
            Self::Semaphore(_) => WaitReason::Semaphore,
        }
    }
}

/// Lifecycle state as far as this layer is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Blocked(WaitReason),
}

/// Intrusive wait-list link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitLink {
    pub(crate) object: WaitObject,
    pub(crate) prev: Option<ThreadId>,
    pub(crate) next: Option<ThreadId>,
}

#[derive(Debug)]
pub(crate) struct Thread {
    pub(crate) name: Option<&'static str>,
    pub(crate) base_priority: Priority,
    pub(crate) priority: Priority,
    pub(crate) safety_class: SafetyClass,
    pub(crate) state: ThreadState,
    /// Head of the owned-mutex list.
    pub(crate) mutex_list: Option<MutexId>,
    pub(crate) wait: Option<WaitLink>,
    /// Outcome of the last completed wait, delivered after resumption.
    pub(crate) wait_result: Option<Status>,
}

impl Thread {
    pub(crate) fn new(attr: &ThreadAttr) -> Self {
        Self {
            name: attr.name,
            base_priority: attr.priority,
            priority: attr.priority,
            safety_class: attr.safety_class,
            state: ThreadState::Ready,
            mutex_list: None,
            wait: None,
            wait_result: None,
        }
    }
}
