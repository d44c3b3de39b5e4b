// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: End-to-end mutex scenarios against the host dispatcher
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! TEST_COVERAGE: 5 integration tests
//!
//! TEST_SCOPE:
//!   - Ownership transfer and asynchronous wait outcome
//!   - Priority inheritance across nested ownership
//!   - Delete with waiters and handle invalidation
//!
//! TEST_SCENARIOS:
//!   - handoff_resolves_pending_acquire(): A holds, B blocks, A releases, B owns
//!   - release_without_acquire_is_resource(): release of an unlocked or foreign mutex
//!   - inheritance_persists_while_other_mutex_still_lends(): two PI mutexes, release one
//!   - delete_with_waiters_resumes_all_with_resource(): K waiters, delete, K resumes
//!   - config_from_toml_drives_pools(): TOML sizing reaches the mutex pool
//!
//! DEPENDENCIES:
//!   - neuron_sync::SyncKernel, neuron_sync::HostDispatcher

use neuron_sync::{
    status_code, HostDispatcher, MutexAttr, MutexFlags, ParameterFault, Priority, ResourceFault,
    SchedEvent, SyncConfig, SyncError, SyncKernel, ThreadAttr, ThreadId, ThreadState, Timeout,
    WaitReason,
};

fn boot() -> Kernel {
    SyncKernel::new(SyncConfig::default(), HostDispatcher::new()).unwrap()
}

type Kernel = SyncKernel<HostDispatcher>;

fn thread(kernel: &mut Kernel, name: &'static str, priority: Priority) -> ThreadId {
    let attr = ThreadAttr { name: Some(name), ..ThreadAttr::with_priority(priority) };
    kernel.thread_new(attr).unwrap()
}

#[test]
fn handoff_resolves_pending_acquire() {
    let mut k = boot();
    let a = thread(&mut k, "a", Priority::NORMAL);
    let b = thread(&mut k, "b", Priority::NORMAL);
    assert_eq!(k.thread_name(a), Some("a"));

    k.dispatcher_mut().set_running(Some(a));
    let m = k.mutex_new(&MutexAttr::default()).unwrap();
    assert_eq!(k.mutex_acquire(m, Timeout::NO_WAIT), Ok(()));
    let again = k.mutex_acquire(m, Timeout::NO_WAIT);
    assert_eq!(again, Err(SyncError::Resource(ResourceFault::Unavailable)));
    assert_eq!(status_code(&again), -3);

    k.dispatcher_mut().set_running(Some(b));
    let pending = k.mutex_acquire(m, Timeout::FOREVER);
    assert_eq!(pending, Err(SyncError::Timeout));
    assert_eq!(k.thread_state(b), Ok(ThreadState::Blocked(WaitReason::Mutex)));
    assert_eq!(
        k.dispatcher().events().last(),
        Some(&SchedEvent::WaitEnter {
            thread: b,
            reason: WaitReason::Mutex,
            timeout: Timeout::FOREVER
        })
    );

    k.dispatcher_mut().set_running(Some(a));
    assert_eq!(k.mutex_release(m), Ok(()));
    assert_eq!(k.mutex_owner(m), Some(b));
    assert_eq!(k.mutex_lock_count(m), Ok(1));
    assert_eq!(k.take_wait_result(b), Some(Ok(())));
    assert_eq!(k.take_wait_result(b), None);
    assert_eq!(k.dispatcher().events().last(), Some(&SchedEvent::Dispatch));
}

#[test]
fn release_without_acquire_is_resource() {
    let mut k = boot();
    let a = thread(&mut k, "a", Priority::NORMAL);
    let b = thread(&mut k, "b", Priority::NORMAL);
    k.dispatcher_mut().set_running(Some(a));
    let m = k.mutex_new(&MutexAttr::with_flags(MutexFlags::RECURSIVE)).unwrap();
    assert_eq!(k.mutex_release(m), Err(SyncError::Resource(ResourceFault::NotLocked)));

    assert_eq!(k.mutex_acquire(m, Timeout::NO_WAIT), Ok(()));
    k.dispatcher_mut().set_running(Some(b));
    assert_eq!(k.mutex_release(m), Err(SyncError::Resource(ResourceFault::NotOwned)));
    assert_eq!(k.mutex_owner(m), Some(a));
}

#[test]
fn inheritance_persists_while_other_mutex_still_lends() {
    let mut k = boot();
    let owner = thread(&mut k, "owner", Priority::LOW);
    let mid = thread(&mut k, "mid", Priority::NORMAL);
    let high = thread(&mut k, "high", Priority::HIGH);

    k.dispatcher_mut().set_running(Some(owner));
    let pi = MutexAttr::with_flags(MutexFlags::PRIO_INHERIT);
    let m1 = k.mutex_new(&pi).unwrap();
    let m2 = k.mutex_new(&pi).unwrap();
    assert_eq!(k.mutex_acquire(m1, Timeout::NO_WAIT), Ok(()));
    assert_eq!(k.mutex_acquire(m2, Timeout::NO_WAIT), Ok(()));

    k.dispatcher_mut().set_running(Some(mid));
    assert_eq!(k.mutex_acquire(m1, Timeout::FOREVER), Err(SyncError::Timeout));
    k.dispatcher_mut().set_running(Some(high));
    assert_eq!(k.mutex_acquire(m2, Timeout::FOREVER), Err(SyncError::Timeout));
    assert_eq!(k.thread_priority(owner), Ok(Priority::HIGH));

    k.dispatcher_mut().set_running(Some(owner));
    assert_eq!(k.mutex_release(m2), Ok(()));
    assert_eq!(k.thread_priority(owner), Ok(Priority::NORMAL));
    assert_eq!(k.mutex_release(m1), Ok(()));
    assert_eq!(k.thread_priority(owner), Ok(Priority::LOW));
    assert_eq!(k.thread_base_priority(owner), Ok(Priority::LOW));
    assert_eq!(k.mutex_owner(m1), Some(mid));
    assert_eq!(k.mutex_owner(m2), Some(high));
}

#[test]
fn delete_with_waiters_resumes_all_with_resource() {
    let mut k = boot();
    let owner = thread(&mut k, "owner", Priority::NORMAL);
    k.dispatcher_mut().set_running(Some(owner));
    let m = k.mutex_new(&MutexAttr { name: Some("log"), ..MutexAttr::default() }).unwrap();
    assert_eq!(k.mutex_acquire(m, Timeout::NO_WAIT), Ok(()));

    let waiters: Vec<ThreadId> = (0..5i8)
        .map(|i| {
            let t = k.thread_new(ThreadAttr::with_priority(Priority::from_raw(10 + i))).unwrap();
            k.dispatcher_mut().set_running(Some(t));
            assert_eq!(k.mutex_acquire(m, Timeout::FOREVER), Err(SyncError::Timeout));
            t
        })
        .collect();
    k.dispatcher_mut().take_events();

    k.dispatcher_mut().set_running(Some(owner));
    assert_eq!(k.mutex_delete(m), Ok(()));
    let resumed = k.dispatcher().resumed();
    assert_eq!(resumed.len(), waiters.len());
    for (thread, outcome) in resumed {
        assert!(waiters.contains(&thread));
        assert_eq!(outcome, Err(SyncError::Resource(ResourceFault::Deleted)));
        assert_eq!(k.thread_state(thread), Ok(ThreadState::Ready));
    }
    assert_eq!(k.mutex_name(m), None);
    assert_eq!(
        k.mutex_acquire(m, Timeout::NO_WAIT),
        Err(SyncError::Parameter(ParameterFault::InvalidHandle))
    );
}

#[test]
fn config_from_toml_drives_pools() {
    let config = SyncConfig::from_toml_str("mutex_pool = 2\n").unwrap();
    let mut k = SyncKernel::new(config, HostDispatcher::new()).unwrap();
    let first = k.mutex_new(&MutexAttr::default()).unwrap();
    let _second = k.mutex_new(&MutexAttr::default()).unwrap();
    assert_eq!(k.mutex_new(&MutexAttr::default()), Err(SyncError::NoMemory));
    assert_eq!(k.mutex_delete(first), Ok(()));
    assert!(k.mutex_new(&MutexAttr::default()).is_ok());
    assert_eq!(k.mutex_mem_usage().max_used, 2);
}
