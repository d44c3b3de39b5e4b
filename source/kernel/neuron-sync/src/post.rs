// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Bounded queue of work deferred from interrupt context
//! OWNERS: @kernel-sync-team
//! PUBLIC API: PostRequest
//! DEPENDS_ON: critical_section (interrupt-masked region), alloc::collections::VecDeque
//! INVARIANTS: Never holds more than `depth` requests; pushing never allocates after construction

extern crate alloc;

use alloc::collections::VecDeque;
use core::cell::RefCell;

use critical_section::Mutex;

use crate::error::{ResourceFault, SyncError};
use crate::types::SemaphoreId;

/// Work item resolved by the interrupt-exit hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostRequest {
    /// Hand tokens released from an ISR to queued waiters.
    Semaphore(SemaphoreId),
}

pub(crate) struct PostQueue {
    entries: Mutex<RefCell<VecDeque<PostRequest>>>,
    depth: usize,
}

impl PostQueue {
    pub(crate) fn new(depth: usize) -> Self {
        Self { entries: Mutex::new(RefCell::new(VecDeque::with_capacity(depth))), depth }
    }

    pub(crate) fn push(&self, request: PostRequest) -> Result<(), SyncError> {
        critical_section::with(|cs| {
            let mut entries = self.entries.borrow_ref_mut(cs);
            if entries.len() >= self.depth {
                return Err(SyncError::Resource(ResourceFault::PostQueueFull));
            }
            entries.push_back(request);
            Ok(())
        })
    }

    pub(crate) fn pop(&self) -> Option<PostRequest> {
        critical_section::with(|cs| self.entries.borrow_ref_mut(cs).pop_front())
    }

    pub(crate) fn len(&self) -> usize {
        critical_section::with(|cs| self.entries.borrow_ref(cs).len())
    }
}
