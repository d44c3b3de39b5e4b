// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Status taxonomy shared by every synchronization service call
//! OWNERS: @kernel-sync-team
//! PUBLIC API: SyncError, ParameterFault, ResourceFault, Status, status_code()
//! INVARIANTS: Codes match CMSIS osStatus_t; Timeout doubles as the "blocking has begun" marker

use thiserror::Error;

/// Why a handle or argument was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterFault {
    /// Handle does not refer to a live object.
    InvalidHandle,
    /// Handle refers to an object of another kind.
    WrongKind,
    /// Creation argument out of range.
    InvalidArgument,
    /// Caller-supplied control block is not a reserved, unused slot.
    InvalidControlBlock,
}

/// Why a resource operation could not proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFault {
    /// Non-blocking acquire found the object taken.
    Unavailable,
    /// Release of a mutex that is not locked.
    NotLocked,
    /// Release of a mutex owned by another thread.
    NotOwned,
    /// Recursive lock counter saturated.
    LockLimit,
    /// Semaphore already holds its maximum token count.
    CountLimit,
    /// Waiter resumed because the object was deleted.
    Deleted,
    /// Interrupt post-processing queue has no room left.
    PostQueueFull,
}

impl ResourceFault {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unavailable => "not available",
            Self::NotLocked => "not locked",
            Self::NotOwned => "not owned",
            Self::LockLimit => "lock limit",
            Self::CountLimit => "count limit",
            Self::Deleted => "object deleted",
            Self::PostQueueFull => "post-processing queue full",
        }
    }
}

/// Errors returned by mutex and semaphore service calls.
#[must_use = "kernel status must be handled"]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("invalid parameter: {0:?}")]
    Parameter(ParameterFault),
    #[error("resource error: {}", .0.label())]
    Resource(ResourceFault),
    #[error("timeout")]
    Timeout,
    #[error("not allowed from interrupt context")]
    Isr,
    #[error("safety class violation")]
    SafetyClass,
    #[error("out of memory")]
    NoMemory,
    #[error("kernel not running")]
    KernelNotRunning,
}

impl SyncError {
    /// CMSIS `osStatus_t` value for this error.
    pub const fn status_code(self) -> i32 {
        match self {
            Self::KernelNotRunning => -1,
            Self::Timeout => -2,
            Self::Resource(_) => -3,
            Self::Parameter(_) => -4,
            Self::NoMemory => -5,
            Self::Isr => -6,
            Self::SafetyClass => -7,
        }
    }

    #[inline]
    pub const fn is_timeout(self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Result of a status-only service call.
pub type Status = Result<(), SyncError>;

/// Maps a status to its CMSIS code (`Ok` is 0).
pub fn status_code(status: &Status) -> i32 {
    match status {
        Ok(()) => 0,
        Err(err) => err.status_code(),
    }
}
