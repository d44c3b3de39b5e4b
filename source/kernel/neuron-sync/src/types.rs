// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes for kernel object handles, priorities and timeouts
//! OWNERS: @kernel-sync-team
//! PUBLIC API: ObjectHandle, ObjectKind, ThreadId, MutexId, SemaphoreId, Priority, SafetyClass,
//!             Timeout, ExecContext
//! DEPENDS_ON: static_assertions
//! INVARIANTS: Raw handle 0 is never issued; handle kind is checked on every lookup
//!
//! ## Handle layout
//!
//! ```text
//! 31            16 15  12 11           0
//! +---------------+------+--------------+
//! |  generation   | kind |    index     |
//! +---------------+------+--------------+
//! ```
//!
//! Generations start at 1 and are bumped on every destroy, so a stale or
//! forged id is rejected instead of dereferenced.

use core::fmt;

const INDEX_BITS: u32 = 12;
const KIND_BITS: u32 = 4;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const KIND_MASK: u32 = (1 << KIND_BITS) - 1;
const GENERATION_SHIFT: u32 = INDEX_BITS + KIND_BITS;

/// Upper bound of slots per object pool imposed by the handle layout.
pub const MAX_OBJECTS: usize = 1 << INDEX_BITS;

static_assertions::const_assert!(GENERATION_SHIFT + 16 == 32);
static_assertions::assert_eq_size!(ObjectHandle, u32);

/// Kernel object kinds handled by this crate.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Thread = 1,
    Mutex = 2,
    Semaphore = 3,
}

impl ObjectKind {
    const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::Thread),
            2 => Some(Self::Mutex),
            3 => Some(Self::Semaphore),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Mutex => "mutex",
            Self::Semaphore => "semaphore",
        }
    }
}

/// Packed, generation-checked reference to a pooled control block.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectHandle(u32);

impl ObjectHandle {
    /// Packs a handle. `index` must be below [`MAX_OBJECTS`] and `generation` non-zero.
    #[inline]
    pub(crate) const fn pack(kind: ObjectKind, index: u16, generation: u16) -> Self {
        Self(
            ((generation as u32) << GENERATION_SHIFT)
                | (((kind as u32) & KIND_MASK) << INDEX_BITS)
                | ((index as u32) & INDEX_MASK),
        )
    }

    /// Reinterprets a raw value received across the syscall boundary.
    ///
    /// No validation happens here; pools reject bad values on lookup.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    #[inline]
    pub const fn generation(self) -> u16 {
        (self.0 >> GENERATION_SHIFT) as u16
    }

    /// Returns the encoded kind, or `None` if the kind bits are not a known kind.
    #[inline]
    pub const fn kind(self) -> Option<ObjectKind> {
        ObjectKind::from_bits((self.0 >> INDEX_BITS) & KIND_MASK)
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}#{}:{}", kind.label(), self.index(), self.generation()),
            None => write!(f, "invalid#{:#010x}", self.0),
        }
    }
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(ObjectHandle);

        impl $name {
            #[inline]
            pub(crate) const fn from_handle(handle: ObjectHandle) -> Self {
                Self(handle)
            }

            /// Reinterprets a raw id; the pool lookup validates kind and generation.
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                Self(ObjectHandle::from_raw(raw))
            }

            #[inline]
            pub const fn as_raw(self) -> u32 {
                self.0.as_raw()
            }

            #[inline]
            pub const fn handle(self) -> ObjectHandle {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }
    };
}

typed_id!(
    /// Thread control block handle.
    ThreadId
);
typed_id!(
    /// Mutex control block handle.
    MutexId
);
typed_id!(
    /// Semaphore control block handle.
    SemaphoreId
);

/// Thread priority; larger values run first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Priority(i8);

impl Priority {
    pub const IDLE: Self = Self(1);
    pub const LOW: Self = Self(8);
    pub const BELOW_NORMAL: Self = Self(16);
    pub const NORMAL: Self = Self(24);
    pub const ABOVE_NORMAL: Self = Self(32);
    pub const HIGH: Self = Self(40);
    pub const REALTIME: Self = Self(48);
    pub const ISR: Self = Self(56);

    #[inline]
    pub const fn from_raw(raw: i8) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> i8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordinal access-restriction tag for mixed-criticality configurations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SafetyClass(u8);

impl SafetyClass {
    pub const MAX: Self = Self(15);

    /// Returns `None` for values above [`SafetyClass::MAX`].
    #[inline]
    pub const fn new(raw: u8) -> Option<Self> {
        if raw <= Self::MAX.0 {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_raw(self) -> u8 {
        self.0
    }
}

/// Wait duration in kernel ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Timeout(u32);

impl Timeout {
    /// Poll without suspending.
    pub const NO_WAIT: Self = Self(0);
    /// Wait until resumed by a release or a delete.
    pub const FOREVER: Self = Self(u32::MAX);

    #[inline]
    pub const fn ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn as_ticks(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_no_wait(self) -> bool {
        self.0 == 0
    }
}

/// Execution context a kernel call is issued from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecContext {
    /// Serialized service-call path of a running thread.
    Thread,
    /// Exception handler or masked-interrupt region.
    Interrupt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_packs_fields() {
        let handle = ObjectHandle::pack(ObjectKind::Mutex, 42, 7);
        assert_eq!(handle.index(), 42);
        assert_eq!(handle.generation(), 7);
        assert_eq!(handle.kind(), Some(ObjectKind::Mutex));
        assert_ne!(handle.as_raw(), 0);
    }

    #[test]
    fn unknown_kind_bits_decode_as_none() {
        let raw = (1u32 << GENERATION_SHIFT) | (0xF << INDEX_BITS);
        assert_eq!(ObjectHandle::from_raw(raw).kind(), None);
    }

    #[test]
    fn safety_class_bounds() {
        assert_eq!(SafetyClass::new(15), Some(SafetyClass::MAX));
        assert_eq!(SafetyClass::new(16), None);
    }

    #[test]
    fn priority_orders_numerically() {
        assert!(Priority::HIGH > Priority::NORMAL);
        assert!(Priority::IDLE < Priority::LOW);
    }
}
