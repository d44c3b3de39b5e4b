// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Safety-class rules shared by object creation, access and class teardown
//! OWNERS: @kernel-sync-team
//! PUBLIC API: SafetyMode
//! DEPENDS_ON: config::SyncConfig, bitflags
//! INVARIANTS: With classing enabled, a caller never creates or touches an object above its
//!             own class

use bitflags::bitflags;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::types::SafetyClass;

bitflags! {
    /// Selects which objects a class teardown destroys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SafetyMode: u32 {
        /// Objects of exactly the given class.
        const SAME_CLASS = 1 << 0;
        /// Objects of any lower class.
        const LOWER_CLASS = 1 << 1;
    }
}

/// Class assigned to a new object.
///
/// An explicit request must not exceed the caller's class; without one the
/// object inherits the caller's class (class 0 outside any thread).
pub(crate) fn creation_class(
    config: &SyncConfig,
    caller: Option<SafetyClass>,
    requested: Option<SafetyClass>,
) -> Result<SafetyClass, SyncError> {
    if !config.safety_enabled() {
        return match requested {
            Some(_) => Err(SyncError::SafetyClass),
            None => Ok(SafetyClass::default()),
        };
    }
    match (requested, caller) {
        (Some(requested), Some(caller)) if requested > caller => Err(SyncError::SafetyClass),
        (Some(requested), _) => Ok(requested),
        (None, caller) => Ok(caller.unwrap_or_default()),
    }
}

/// Access check for thread-context operations on an existing object.
pub(crate) fn check_access(
    config: &SyncConfig,
    caller: Option<SafetyClass>,
    object: SafetyClass,
) -> Result<(), SyncError> {
    match caller {
        Some(caller) if config.safety_enabled() && caller < object => Err(SyncError::SafetyClass),
        _ => Ok(()),
    }
}

/// Whether an object of class `object` falls under a teardown of `class` with `mode`.
pub(crate) fn selected(class: SafetyClass, mode: SafetyMode, object: SafetyClass) -> bool {
    (mode.contains(SafetyMode::SAME_CLASS) && object == class)
        || (mode.contains(SafetyMode::LOWER_CLASS) && object < class)
}
