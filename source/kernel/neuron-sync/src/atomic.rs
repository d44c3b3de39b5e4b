// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Interrupt-safe semaphore token counter
//! OWNERS: @kernel-sync-team
//! PUBLIC API: TokenCounter (decrement_nonzero/increment_below/load)
//! DEPENDS_ON: core::sync::atomic (CAS targets), critical_section (targets without 16-bit atomics)
//! INVARIANTS: 0 <= tokens <= max at every observable point; ISR and thread updates never race
//!
//! The update strategy is chosen once here: targets with native 16-bit
//! atomics use compare-and-swap loops, everything else falls back to a short
//! critical section.

#[cfg(target_has_atomic = "16")]
mod imp {
    use core::sync::atomic::{AtomicU16, Ordering};

    pub(crate) struct Cell(AtomicU16);

    impl Cell {
        pub(crate) const fn new(value: u16) -> Self {
            Self(AtomicU16::new(value))
        }

        pub(crate) fn load(&self) -> u16 {
            self.0.load(Ordering::Acquire)
        }

        pub(crate) fn update(&self, f: impl Fn(u16) -> Option<u16>) -> Result<u16, u16> {
            self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, f)
        }
    }
}

#[cfg(not(target_has_atomic = "16"))]
mod imp {
    use core::cell::Cell as Slot;

    use critical_section::Mutex;

    pub(crate) struct Cell(Mutex<Slot<u16>>);

    impl Cell {
        pub(crate) const fn new(value: u16) -> Self {
            Self(Mutex::new(Slot::new(value)))
        }

        pub(crate) fn load(&self) -> u16 {
            critical_section::with(|cs| self.0.borrow(cs).get())
        }

        pub(crate) fn update(&self, f: impl Fn(u16) -> Option<u16>) -> Result<u16, u16> {
            critical_section::with(|cs| {
                let slot = self.0.borrow(cs);
                let current = slot.get();
                match f(current) {
                    Some(next) => {
                        slot.set(next);
                        Ok(current)
                    }
                    None => Err(current),
                }
            })
        }
    }
}

/// Bounded token counter shared by thread and interrupt context.
pub(crate) struct TokenCounter {
    tokens: imp::Cell,
    max: u16,
}

impl TokenCounter {
    pub(crate) const fn new(initial: u16, max: u16) -> Self {
        Self { tokens: imp::Cell::new(initial), max }
    }

    #[inline]
    pub(crate) fn load(&self) -> u16 {
        self.tokens.load()
    }

    #[cfg(test)]
    pub(crate) const fn max(&self) -> u16 {
        self.max
    }

    /// Takes one token; returns the remaining count, or `None` if none was available.
    pub(crate) fn decrement_nonzero(&self) -> Option<u16> {
        self.tokens.update(|tokens| tokens.checked_sub(1)).ok().map(|prev| prev - 1)
    }

    /// Returns one token; `None` if the counter is already at its maximum.
    pub(crate) fn increment_below(&self) -> Option<u16> {
        let max = self.max;
        self.tokens
            .update(|tokens| if tokens < max { Some(tokens + 1) } else { None })
            .ok()
            .map(|prev| prev + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::TokenCounter;

    #[test]
    fn decrement_stops_at_zero() {
        let counter = TokenCounter::new(1, 4);
        assert_eq!(counter.decrement_nonzero(), Some(0));
        assert_eq!(counter.decrement_nonzero(), None);
        assert_eq!(counter.load(), 0);
    }

    #[test]
    fn increment_stops_at_max() {
        let counter = TokenCounter::new(1, 2);
        assert_eq!(counter.increment_below(), Some(2));
        assert_eq!(counter.increment_below(), None);
        assert_eq!(counter.load(), counter.max());
    }
}
