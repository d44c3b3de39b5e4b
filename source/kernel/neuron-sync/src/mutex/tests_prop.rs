// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for mutex hand-off order and priority inheritance
//! OWNERS: @kernel-sync-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - Hand-off order across successive releases equals a stable sort by descending priority
//!   - Owner effective priority equals max(base, highest waiter) while inheriting
//!
//! TEST_SCENARIOS:
//!   - handoff_order_is_stable_priority_sort(): N waiters, release repeatedly, compare owners
//!   - owner_priority_tracks_highest_waiter(): arbitrary waiters and timeouts, check the bound

use super::{MutexAttr, MutexFlags};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::sched::HostDispatcher;
use crate::thread::ThreadAttr;
use crate::types::{MutexId, Priority, ThreadId, Timeout};
use crate::SyncKernel;
use proptest::prelude::*;

type Kernel = SyncKernel<HostDispatcher>;

type Setup = (Kernel, ThreadId, Vec<(ThreadId, i8)>, MutexId);

fn setup(flags: MutexFlags, owner_base: i8, waiters: &[i8]) -> Setup {
    let mut k = SyncKernel::new(SyncConfig::default(), HostDispatcher::new()).unwrap();
    let owner = k.thread_new(ThreadAttr::with_priority(Priority::from_raw(owner_base))).unwrap();
    k.dispatcher_mut().set_running(Some(owner));
    let m = k.mutex_new(&MutexAttr::with_flags(flags)).unwrap();
    assert_eq!(k.mutex_acquire(m, Timeout::NO_WAIT), Ok(()));

    let mut queued = Vec::new();
    for &raw in waiters {
        let id = k.thread_new(ThreadAttr::with_priority(Priority::from_raw(raw))).unwrap();
        k.dispatcher_mut().set_running(Some(id));
        assert_eq!(k.mutex_acquire(m, Timeout::FOREVER), Err(SyncError::Timeout));
        queued.push((id, raw));
    }
    (k, owner, queued, m)
}

proptest! {
    #[test]
    fn handoff_order_is_stable_priority_sort(waiters in proptest::collection::vec(1i8..56, 1..16)) {
        let (mut k, owner, mut expected, m) = setup(MutexFlags::empty(), 24, &waiters);
        expected.sort_by_key(|(_, prio)| core::cmp::Reverse(*prio));

        let mut current = owner;
        let mut order = Vec::new();
        for _ in 0..expected.len() {
            k.dispatcher_mut().set_running(Some(current));
            prop_assert_eq!(k.mutex_release(m), Ok(()));
            let next = k.mutex_owner(m);
            prop_assert!(next.is_some());
            current = next.unwrap_or(current);
            prop_assert_eq!(k.take_wait_result(current), Some(Ok(())));
            order.push(current);
        }
        let expected: Vec<ThreadId> = expected.into_iter().map(|(id, _)| id).collect();
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn owner_priority_tracks_highest_waiter(
        owner_base in 1i8..56,
        waiters in proptest::collection::vec(1i8..56, 0..12),
        expire in proptest::collection::vec(any::<bool>(), 12),
    ) {
        let (mut k, owner, queued, m) = setup(MutexFlags::PRIO_INHERIT, owner_base, &waiters);
        let bound =
            |live: &[(ThreadId, i8)]| live.iter().map(|(_, p)| *p).chain([owner_base]).max();
        prop_assert_eq!(k.thread_priority(owner).map(Priority::as_raw).ok(), bound(&queued));

        let mut live = queued.clone();
        for (i, (id, _)) in queued.iter().enumerate() {
            if expire[i] {
                prop_assert_eq!(k.wait_timeout(*id), Ok(()));
                live.retain(|(t, _)| t != id);
                prop_assert_eq!(k.thread_priority(owner).map(Priority::as_raw).ok(), bound(&live));
            }
        }

        k.dispatcher_mut().set_running(Some(owner));
        prop_assert_eq!(k.mutex_release(m), Ok(()));
        prop_assert_eq!(k.thread_priority(owner), Ok(Priority::from_raw(owner_base)));
    }
}
