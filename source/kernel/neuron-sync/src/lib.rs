// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: NEURON kernel synchronization layer (mutex, semaphore, wait lists)
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! PUBLIC API: SyncKernel, Dispatcher, HostDispatcher, MutexAttr, MutexFlags, SemaphoreAttr,
//!             SyncConfig, SyncError, Status, typed ids
//! DEPENDS_ON: bitflags, critical-section, static_assertions, thiserror, log, serde,
//!             toml (feature "std")
//! INVARIANTS: Exactly one `&mut SyncKernel` service call runs at a time; interrupt handlers
//!             use the `&self` entry points only
//!
//! The scheduler proper is external and plugs in through [`Dispatcher`].
//! Every object lives in a generation-checked pool inside [`SyncKernel`], so
//! ids crossing the syscall boundary are validated on every use.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

extern crate alloc;

mod arena;
mod atomic;
pub mod config;
pub mod error;
mod kernel;
mod lifecycle;
pub mod mutex;
mod ownership;
mod post;
pub mod sched;
pub mod semaphore;
pub mod thread;
pub mod types;
mod waitlist;

pub use arena::{ControlBlock, MemUsage};
pub use config::{ConfigError, SafetySupport, SyncConfig, MUTEX_LOCK_LIMIT, SEMAPHORE_TOKEN_LIMIT};
pub use error::{status_code, ParameterFault, ResourceFault, Status, SyncError};
pub use kernel::SyncKernel;
pub use lifecycle::SafetyMode;
pub use mutex::{MutexAttr, MutexFlags};
pub use post::PostRequest;
pub use sched::{Dispatcher, HostDispatcher, SchedEvent};
pub use semaphore::SemaphoreAttr;
pub use thread::{ThreadAttr, ThreadState, WaitReason};
pub use types::{
    ExecContext, MutexId, ObjectHandle, ObjectKind, Priority, SafetyClass, SemaphoreId, ThreadId,
    Timeout,
};
