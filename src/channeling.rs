//! Channeling Flag — the shared per-actor movement lock
//!
//! Movement logic polls `is_channeling()`; whichever action slot is
//! telegraphing owns the flag through its `SlotId` token, and only the
//! owner can release it. Every exit path (window opening, cancel, actor
//! disable) clears the flag — a flag left set permanently freezes the
//! actor, which is the one invariant worth asserting on.

use bevy::prelude::*;
use tracing::debug;

use crate::action::SlotId;

/// Per-actor movement lock with slot ownership.
#[derive(Component, Debug, Default)]
pub struct Channeling {
    owner: Option<SlotId>,
}

impl Channeling {
    /// True while any action telegraphs on this actor.
    pub fn is_channeling(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<SlotId> {
        self.owner
    }

    /// Claim the flag for a slot. Two live telegraphs on one actor would
    /// be a driver bug; the last claim wins but is logged.
    pub fn set(&mut self, slot: SlotId) {
        if let Some(previous) = self.owner {
            if previous != slot {
                debug!(?previous, ?slot, "channeling flag re-claimed by another slot");
            }
        }
        self.owner = Some(slot);
    }

    /// Release the flag, but only for the slot that owns it. Non-owners
    /// releasing is a no-op, never an error.
    pub fn release(&mut self, slot: SlotId) {
        if self.owner == Some(slot) {
            self.owner = None;
        }
    }

    /// Unconditional clear, for death/teardown cleanup.
    pub fn force_clear(&mut self) {
        self.owner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_clear() {
        let flag = Channeling::default();
        assert!(!flag.is_channeling());
        assert_eq!(flag.owner(), None);
    }

    #[test]
    fn test_set_and_release_by_owner() {
        let mut flag = Channeling::default();
        flag.set(SlotId(0));
        assert!(flag.is_channeling());
        flag.release(SlotId(0));
        assert!(!flag.is_channeling());
    }

    #[test]
    fn test_non_owner_release_is_noop() {
        let mut flag = Channeling::default();
        flag.set(SlotId(2));
        flag.release(SlotId(1));
        assert!(flag.is_channeling());
        assert_eq!(flag.owner(), Some(SlotId(2)));
    }

    #[test]
    fn test_force_clear_ignores_ownership() {
        let mut flag = Channeling::default();
        flag.set(SlotId(3));
        flag.force_clear();
        assert!(!flag.is_channeling());
    }

    #[test]
    fn test_reclaim_transfers_ownership() {
        let mut flag = Channeling::default();
        flag.set(SlotId(0));
        flag.set(SlotId(1));
        // Old owner can no longer release
        flag.release(SlotId(0));
        assert!(flag.is_channeling());
        flag.release(SlotId(1));
        assert!(!flag.is_channeling());
    }
}
