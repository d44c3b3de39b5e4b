// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Generation-checked control block pools with caller-reserved slots
//! OWNERS: @kernel-sync-team
//! PUBLIC API: ControlBlock, MemUsage
//! DEPENDS_ON: types::{ObjectHandle, ObjectKind, MAX_OBJECTS}
//! INVARIANTS: A handle resolves only while its slot is occupied with the same generation;
//!             fixed pools never exceed their capacity; caller-reserved slots never reach
//!             the free list

extern crate alloc;

use alloc::vec::Vec;
use crate::error::{ParameterFault, SyncError};
use crate::types::{ObjectHandle, ObjectKind, MAX_OBJECTS};

/// Where the storage of a live control block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Storage {
    /// Fixed-capacity object pool.
    Pool,
    /// Kernel heap (no pool configured for this kind).
    Heap,
    /// Slot reserved by the caller ahead of creation.
    Caller,
}

/// Allocation counters for system-provided control blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemUsage {
    pub cnt_alloc: u32,
    pub cnt_free: u32,
    pub max_used: u32,
}

impl MemUsage {
    #[inline]
    pub const fn in_use(&self) -> u32 {
        self.cnt_alloc.wrapping_sub(self.cnt_free)
    }
}

/// Caller-owned control block storage, handed to `*_new` through `cb_mem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlBlock {
    kind: ObjectKind,
    index: u16,
}

impl ControlBlock {
    #[inline]
    pub const fn kind(self) -> ObjectKind {
        self.kind
    }
}

enum Slot<T> {
    Vacant { next_free: Option<u16>, generation: u16 },
    Reserved { generation: u16 },
    Occupied { value: T, generation: u16, storage: Storage },
}

#[inline]
const fn next_generation(generation: u16) -> u16 {
    if generation == u16::MAX {
        1
    } else {
        generation + 1
    }
}

/// Arena of control blocks of a single kind.
pub(crate) struct ObjectPool<T> {
    kind: ObjectKind,
    slots: Vec<Slot<T>>,
    free_head: Option<u16>,
    capacity: Option<usize>,
    system_live: usize,
    usage: MemUsage,
}

impl<T> ObjectPool<T> {
    /// `capacity = None` selects heap-backed storage.
    pub(crate) fn new(kind: ObjectKind, capacity: Option<usize>) -> Self {
        let reserve = capacity.unwrap_or(0).min(MAX_OBJECTS);
        Self {
            kind,
            slots: Vec::with_capacity(reserve),
            free_head: None,
            capacity,
            system_live: 0,
            usage: MemUsage::default(),
        }
    }

    #[inline]
    pub(crate) fn usage(&self) -> MemUsage {
        self.usage
    }

    fn take_slot(&mut self) -> Result<u16, SyncError> {
        if let Some(index) = self.free_head {
            if let Some(Slot::Vacant { next_free, .. }) = self.slots.get(index as usize) {
                self.free_head = *next_free;
                return Ok(index);
            }
            // Free list head must always point at a vacant slot.
            self.free_head = None;
        }
        if self.slots.len() >= MAX_OBJECTS {
            return Err(SyncError::NoMemory);
        }
        let index = self.slots.len() as u16;
        self.slots.push(Slot::Vacant { next_free: None, generation: 1 });
        Ok(index)
    }

    fn slot_generation(&self, index: u16) -> u16 {
        match self.slots.get(index as usize) {
            Some(Slot::Vacant { generation, .. })
            | Some(Slot::Reserved { generation })
            | Some(Slot::Occupied { generation, .. }) => *generation,
            None => 1,
        }
    }

    /// Reserves a slot for caller-supplied storage.
    pub(crate) fn reserve(&mut self) -> Result<ControlBlock, SyncError> {
        let index = self.take_slot()?;
        let generation = self.slot_generation(index);
        self.slots[index as usize] = Slot::Reserved { generation };
        Ok(ControlBlock { kind: self.kind, index })
    }

    /// Places `value` in system storage (pool or heap).
    pub(crate) fn insert(&mut self, value: T) -> Result<ObjectHandle, SyncError> {
        let storage = match self.capacity {
            Some(capacity) if self.system_live >= capacity => return Err(SyncError::NoMemory),
            Some(_) => Storage::Pool,
            None => Storage::Heap,
        };
        let index = self.take_slot()?;
        let generation = self.slot_generation(index);
        self.slots[index as usize] = Slot::Occupied { value, generation, storage };
        self.system_live += 1;
        self.usage.cnt_alloc = self.usage.cnt_alloc.wrapping_add(1);
        if self.usage.max_used < self.usage.in_use() {
            self.usage.max_used = self.usage.in_use();
        }
        Ok(ObjectHandle::pack(self.kind, index, generation))
    }

    /// Places `value` in a caller-reserved slot.
    pub(crate) fn insert_at(
        &mut self,
        block: ControlBlock,
        value: T,
    ) -> Result<ObjectHandle, SyncError> {
        if block.kind != self.kind {
            return Err(SyncError::Parameter(ParameterFault::InvalidControlBlock));
        }
        let index = block.index;
        match self.slots.get(index as usize) {
            Some(Slot::Reserved { generation }) => {
                let generation = *generation;
                self.slots[index as usize] =
                    Slot::Occupied { value, generation, storage: Storage::Caller };
                Ok(ObjectHandle::pack(self.kind, index, generation))
            }
            _ => Err(SyncError::Parameter(ParameterFault::InvalidControlBlock)),
        }
    }

    fn check(&self, handle: ObjectHandle) -> Result<usize, SyncError> {
        match handle.kind() {
            Some(kind) if kind == self.kind => {}
            Some(_) => return Err(SyncError::Parameter(ParameterFault::WrongKind)),
            None => return Err(SyncError::Parameter(ParameterFault::InvalidHandle)),
        }
        let index = handle.index();
        match self.slots.get(index) {
            Some(Slot::Occupied { generation, .. }) if *generation == handle.generation() => {
                Ok(index)
            }
            _ => Err(SyncError::Parameter(ParameterFault::InvalidHandle)),
        }
    }

    pub(crate) fn get(&self, handle: ObjectHandle) -> Result<&T, SyncError> {
        let index = self.check(handle)?;
        match &self.slots[index] {
            Slot::Occupied { value, .. } => Ok(value),
            _ => Err(SyncError::Parameter(ParameterFault::InvalidHandle)),
        }
    }

    pub(crate) fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut T, SyncError> {
        let index = self.check(handle)?;
        match &mut self.slots[index] {
            Slot::Occupied { value, .. } => Ok(value),
            _ => Err(SyncError::Parameter(ParameterFault::InvalidHandle)),
        }
    }

    /// Destroys the object and invalidates every outstanding handle to it.
    pub(crate) fn remove(&mut self, handle: ObjectHandle) -> Result<T, SyncError> {
        let index = self.check(handle)?;
        let generation = next_generation(handle.generation());
        let storage = match &self.slots[index] {
            Slot::Occupied { storage, .. } => *storage,
            _ => return Err(SyncError::Parameter(ParameterFault::InvalidHandle)),
        };
        let replacement = match storage {
            Storage::Caller => Slot::Reserved { generation },
            Storage::Pool | Storage::Heap => {
                let next_free = self.free_head;
                self.free_head = Some(index as u16);
                self.system_live -= 1;
                self.usage.cnt_free = self.usage.cnt_free.wrapping_add(1);
                Slot::Vacant { next_free, generation }
            }
        };
        match core::mem::replace(&mut self.slots[index], replacement) {
            Slot::Occupied { value, .. } => Ok(value),
            _ => Err(SyncError::Parameter(ParameterFault::InvalidHandle)),
        }
    }

    /// Handles of all live objects, in slot order.
    pub(crate) fn handles(&self) -> Vec<ObjectHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, .. } => {
                    Some(ObjectHandle::pack(self.kind, index as u16, *generation))
                }
                _ => None,
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn storage_of(&self, handle: ObjectHandle) -> Option<Storage> {
        let index = self.check(handle).ok()?;
        match &self.slots[index] {
            Slot::Occupied { storage, .. } => Some(*storage),
            _ => None,
        }
    }
}
