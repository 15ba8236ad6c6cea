//! Fixed-capacity participant registry
//!
//! Slots are reused first-free-wins, so a departed participant's slot id is
//! handed to the next connection that arrives. Handles are moved into the
//! registry, which means two active slots can never share one.

use std::fmt;

/// Default registry capacity
pub const MAX_PARTICIPANTS: usize = 10;

/// Internal address of a registry slot. Carries no arrival-order meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub enum Slot<H> {
    Empty,
    Active(H),
}

impl<H> Slot<H> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

/// Returned by [`Registry::insert`] when every slot is taken.
///
/// Carries the rejected handle back so the caller decides how to close it.
#[derive(Debug)]
pub struct Full<H>(pub H);

impl<H> Full<H> {
    pub fn into_inner(self) -> H {
        self.0
    }
}

/// Bounded collection of active participant handles
#[derive(Debug)]
pub struct Registry<H> {
    slots: Vec<Slot<H>>,
    active: usize,
}

impl<H> Registry<H> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Empty);
        Self { slots, active: 0 }
    }

    /// Place a handle in the first empty slot
    pub fn insert(&mut self, handle: H) -> Result<SlotId, Full<H>> {
        match self.slots.iter().position(Slot::is_empty) {
            Some(idx) => {
                self.slots[idx] = Slot::Active(handle);
                self.active += 1;
                Ok(SlotId(idx))
            }
            None => Err(Full(handle)),
        }
    }

    /// Empty a slot, returning its handle. Removing an empty or unknown slot is a no-op.
    pub fn remove(&mut self, id: SlotId) -> Option<H> {
        let slot = self.slots.get_mut(id.0)?;
        match std::mem::replace(slot, Slot::Empty) {
            Slot::Active(handle) => {
                self.active -= 1;
                Some(handle)
            }
            Slot::Empty => None,
        }
    }

    pub fn get(&self, id: SlotId) -> Option<&H> {
        match self.slots.get(id.0)? {
            Slot::Active(handle) => Some(handle),
            Slot::Empty => None,
        }
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut H> {
        match self.slots.get_mut(id.0)? {
            Slot::Active(handle) => Some(handle),
            Slot::Empty => None,
        }
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    /// Active slots in increasing slot id order
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &H)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| match slot {
            Slot::Active(handle) => Some((SlotId(idx), handle)),
            Slot::Empty => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut H)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Slot::Active(handle) => Some((SlotId(idx), handle)),
                Slot::Empty => None,
            })
    }

    /// Snapshot of active slot ids, for loops that mutate the registry
    pub fn ids(&self) -> Vec<SlotId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.active == self.slots.len()
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::with_capacity(MAX_PARTICIPANTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_takes_first_free_slot() {
        let mut registry = Registry::with_capacity(3);
        assert_eq!(registry.insert("a").unwrap(), SlotId(0));
        assert_eq!(registry.insert("b").unwrap(), SlotId(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_insert_when_full_returns_handle() {
        let mut registry = Registry::with_capacity(2);
        registry.insert(1).unwrap();
        registry.insert(2).unwrap();
        assert!(registry.is_full());

        let rejected = registry.insert(3).unwrap_err();
        assert_eq!(rejected.into_inner(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut registry = Registry::with_capacity(3);
        let a = registry.insert("a").unwrap();
        let _b = registry.insert("b").unwrap();
        let _c = registry.insert("c").unwrap();

        assert_eq!(registry.remove(a), Some("a"));
        let d = registry.insert("d").unwrap();
        assert_eq!(d, a);
        assert_eq!(registry.get(d), Some(&"d"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::with_capacity(2);
        let a = registry.insert("a").unwrap();

        assert_eq!(registry.remove(a), Some("a"));
        assert_eq!(registry.remove(a), None);
        assert_eq!(registry.remove(SlotId(99)), None);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_iter_skips_empty_slots_in_order() {
        let mut registry = Registry::with_capacity(4);
        for name in ["a", "b", "c", "d"] {
            registry.insert(name).unwrap();
        }
        registry.remove(SlotId(1));
        registry.remove(SlotId(2));

        let seen: Vec<_> = registry.iter().map(|(id, h)| (id.index(), *h)).collect();
        assert_eq!(seen, vec![(0, "a"), (3, "d")]);
        assert_eq!(registry.ids(), vec![SlotId(0), SlotId(3)]);
    }

    #[test]
    fn test_default_capacity() {
        let registry: Registry<u8> = Registry::default();
        assert_eq!(registry.capacity(), MAX_PARTICIPANTS);
        assert!(registry.is_empty());
    }
}
