// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Build- and boot-time knobs for the synchronization layer
//! OWNERS: @kernel-sync-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! PUBLIC API: SyncConfig, SafetySupport, ConfigError, MUTEX_LOCK_LIMIT, SEMAPHORE_TOKEN_LIMIT
//! DEPENDS_ON: serde (derive), toml (feature "std")
//! INVARIANTS: Pool capacities never exceed the handle index space; post queue depth is non-zero
//!
//! Pools are optional: without a fixed capacity the control blocks come from
//! the kernel heap and are bounded only by [`MAX_OBJECTS`].

use serde::Deserialize;
use thiserror::Error;

use crate::types::MAX_OBJECTS;

/// Maximum recursive lock depth of a mutex.
pub const MUTEX_LOCK_LIMIT: u8 = u8::MAX;

/// Maximum token count of a semaphore.
pub const SEMAPHORE_TOKEN_LIMIT: u16 = u16::MAX;

const DEFAULT_POST_QUEUE_DEPTH: usize = 16;

/// Whether safety-class checks are compiled into this kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafetySupport {
    #[default]
    Enabled,
    /// Requests for an explicit class are refused; no access checks run.
    Unsupported,
}

/// Sizing and feature selection for a [`SyncKernel`](crate::SyncKernel).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub thread_pool: Option<usize>,
    pub mutex_pool: Option<usize>,
    pub semaphore_pool: Option<usize>,
    pub post_queue_depth: usize,
    pub safety_class: SafetySupport,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            thread_pool: None,
            mutex_pool: None,
            semaphore_pool: None,
            post_queue_depth: DEFAULT_POST_QUEUE_DEPTH,
            safety_class: SafetySupport::Enabled,
        }
    }
}

/// Configuration rejected at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[cfg(feature = "std")]
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl SyncConfig {
    /// Fixed pools of `capacity` entries for every object kind.
    pub fn with_pools(capacity: usize) -> Self {
        Self {
            thread_pool: Some(capacity),
            mutex_pool: Some(capacity),
            semaphore_pool: Some(capacity),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.post_queue_depth == 0 {
            return Err(ConfigError::Invalid("post_queue_depth must be non-zero"));
        }
        for pool in [self.thread_pool, self.mutex_pool, self.semaphore_pool].into_iter().flatten() {
            if pool == 0 {
                return Err(ConfigError::Invalid("pool capacity must be non-zero"));
            }
            if pool > MAX_OBJECTS {
                return Err(ConfigError::Invalid("pool capacity exceeds handle index space"));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn safety_enabled(&self) -> bool {
        self.safety_class == SafetySupport::Enabled
    }

    /// Parses and validates a TOML document.
    #[cfg(feature = "std")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}
