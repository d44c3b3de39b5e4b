// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for wait-list ordering
//! OWNERS: @kernel-sync-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - Resumption order equals a stable sort by descending priority
//!   - Arbitrary removals preserve the order of the remaining waiters
//!
//! TEST_SCENARIOS:
//!   - pop_order_is_stable_priority_sort(): insert N waiters, drain, compare with stable sort
//!   - removal_preserves_relative_order(): remove a subset, remaining order unchanged

use super::WaitList;
use crate::arena::ObjectPool;
use crate::thread::{Thread, ThreadAttr, WaitObject};
use crate::types::{ObjectHandle, ObjectKind, Priority, SemaphoreId, ThreadId};
use proptest::prelude::*;

fn populate(priorities: &[i8]) -> (ObjectPool<Thread>, WaitList, Vec<(ThreadId, i8)>) {
    let mut pool = ObjectPool::new(ObjectKind::Thread, None);
    let handle = ObjectHandle::pack(ObjectKind::Semaphore, 0, 1);
    let object = WaitObject::Semaphore(SemaphoreId::from_handle(handle));
    let mut list = WaitList::new();
    let mut spawned = Vec::new();
    for &raw in priorities {
        let attr = ThreadAttr::with_priority(Priority::from_raw(raw));
        let id = ThreadId::from_handle(pool.insert(Thread::new(&attr)).unwrap());
        list.insert(&mut pool, id, object).unwrap();
        spawned.push((id, raw));
    }
    (pool, list, spawned)
}

proptest! {
    #[test]
    fn pop_order_is_stable_priority_sort(priorities in proptest::collection::vec(1i8..56, 0..24)) {
        let (mut pool, mut list, mut expected) = populate(&priorities);
        expected.sort_by_key(|(_, prio)| core::cmp::Reverse(*prio));

        let mut drained = Vec::new();
        while let Some(id) = list.pop_highest(&mut pool) {
            drained.push(id);
        }
        let expected: Vec<ThreadId> = expected.into_iter().map(|(id, _)| id).collect();
        prop_assert_eq!(drained, expected);
        prop_assert!(list.is_empty());
    }

    #[test]
    fn removal_preserves_relative_order(
        priorities in proptest::collection::vec(1i8..56, 1..24),
        mask in proptest::collection::vec(any::<bool>(), 24),
    ) {
        let (mut pool, mut list, spawned) = populate(&priorities);
        let before = list.to_vec(&pool);
        for (i, (id, _)) in spawned.iter().enumerate() {
            if mask[i] {
                prop_assert!(list.remove(&mut pool, *id));
            }
        }
        let removed: Vec<ThreadId> =
            spawned.iter().enumerate().filter(|(i, _)| mask[*i]).map(|(_, (id, _))| *id).collect();
        let expected: Vec<ThreadId> =
            before.into_iter().filter(|id| !removed.contains(id)).collect();
        prop_assert_eq!(list.to_vec(&pool), expected);
    }
}
