// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for semaphore token accounting
//! OWNERS: @kernel-sync-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - Token count stays within [0, max] under any mix of thread and interrupt calls
//!   - Tokens are conserved: every successful release is either counted or handed to a waiter
//!
//! TEST_SCENARIOS:
//!   - tokens_stay_in_bounds(): random op sequences checked against a reference model

use super::SemaphoreAttr;
use crate::config::SyncConfig;
use crate::error::{ResourceFault, SyncError};
use crate::sched::HostDispatcher;
use crate::thread::{ThreadAttr, ThreadState};
use crate::types::{Priority, ThreadId, Timeout};
use crate::SyncKernel;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Acquire(usize),
    AcquireBlocking(usize),
    Release,
    IsrAcquire,
    IsrRelease,
    PostProcess,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..4).prop_map(Op::Acquire),
        (0usize..4).prop_map(Op::AcquireBlocking),
        Just(Op::Release),
        Just(Op::IsrAcquire),
        Just(Op::IsrRelease),
        Just(Op::PostProcess),
    ]
}

proptest! {
    #[test]
    fn tokens_stay_in_bounds(
        max in 1u32..6,
        initial in 0u32..6,
        ops in proptest::collection::vec(op(), 1..64),
    ) {
        let initial = initial.min(max);
        let mut k = SyncKernel::new(SyncConfig::default(), HostDispatcher::new()).unwrap();
        let threads: Vec<ThreadId> = (0..4)
            .map(|i| {
                let priority = Priority::from_raw(8 + i * 8);
                k.thread_new(ThreadAttr::with_priority(priority)).unwrap()
            })
            .collect();
        let s = k.semaphore_new(max, initial, &SemaphoreAttr::default()).unwrap();

        // Tokens granted to threads plus tokens still counted.
        let mut granted = 0u32;
        let mut released = 0u32;

        for op in ops {
            match op {
                Op::Acquire(t) | Op::AcquireBlocking(t) => {
                    if k.thread_state(threads[t]) != Ok(ThreadState::Ready) {
                        continue;
                    }
                    k.dispatcher_mut().set_running(Some(threads[t]));
                    let timeout = match op {
                        Op::Acquire(_) => Timeout::NO_WAIT,
                        _ => Timeout::FOREVER,
                    };
                    match k.semaphore_acquire(s, timeout) {
                        Ok(()) => granted += 1,
                        Err(SyncError::Timeout) => {}
                        Err(err) => {
                            prop_assert_eq!(err, SyncError::Resource(ResourceFault::Unavailable));
                        }
                    }
                }
                Op::Release => {
                    if k.semaphore_release(s).is_ok() {
                        released += 1;
                    }
                }
                Op::IsrAcquire => {
                    if k.semaphore_acquire_isr(s).is_ok() {
                        granted += 1;
                    }
                }
                Op::IsrRelease => {
                    if k.semaphore_release_isr(s).is_ok() {
                        released += 1;
                    }
                }
                Op::PostProcess => {
                    k.post_process();
                }
            }
            let handed: u32 = threads
                .iter()
                .map(|t| u32::from(k.take_wait_result(*t) == Some(Ok(()))))
                .sum();
            granted += handed;

            let count = k.semaphore_count(s);
            prop_assert!(count <= max);
            prop_assert_eq!(initial + released, granted + count);
        }
    }
}
