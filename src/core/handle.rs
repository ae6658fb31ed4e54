// Generational handle table
//
// Handles pack a slot index and a generation counter. Removing a value bumps the
// slot's generation, so a stale handle never resolves to whatever reuses the slot.

use std::fmt;
use std::marker::PhantomData;

/// Typed, copyable handle into a [`HandleTable`]
///
/// The `M` parameter keeps body handles and vehicle handles from being mixed up.
pub struct Handle<M> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Handle<M> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Pack into a single integer for flat interfaces
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Rebuild a handle from [`Handle::to_bits`]
    ///
    /// Only values previously returned by `to_bits` are meaningful; anything else
    /// is rejected by the table as an invalid handle.
    pub fn from_bits(bits: u64) -> Self {
        Self::new(bits as u32, (bits >> 32) as u32)
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

// Manual impls: derives would put bounds on the marker type
impl<M> Clone for Handle<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Handle<M> {}

impl<M> PartialEq for Handle<M> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<M> Eq for Handle<M> {}

impl<M> std::hash::Hash for Handle<M> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bits().hash(state);
    }
}

impl<M> fmt::Debug for Handle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

impl<M> fmt::Display for Handle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Owned-resource table addressed by generational handles
pub struct HandleTable<M, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M, T> HandleTable<M, T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Store a value and return the handle that now owns it
    pub fn insert(&mut self, value: T) -> Handle<M> {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).expect("handle table exhausted u32 index space");
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Handle::new(index, 1)
    }

    /// Remove the value behind `handle`; `None` if the handle is stale or foreign
    pub fn remove(&mut self, handle: Handle<M>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;

        // Generation 0 is never issued
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, handle: Handle<M>) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<M>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, handle: Handle<M>) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<M>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(i as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<M>, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (Handle::new(i as u32, generation), value))
        })
    }
}

impl<M, T> Default for HandleTable<M, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Marker {}

    #[test]
    fn test_insert_and_get() {
        let mut table: HandleTable<Marker, &str> = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");

        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut table: HandleTable<Marker, u32> = HandleTable::new();
        let old = table.insert(1);
        assert_eq!(table.remove(old), Some(1));

        let new = table.insert(2);
        assert_eq!(new.index(), old.index(), "Freed slot should be reused");
        assert_ne!(new, old, "Reused slot must not alias the old handle");
        assert_eq!(table.get(old), None);
        assert_eq!(table.get(new), Some(&2));
    }

    #[test]
    fn test_double_remove_is_rejected() {
        let mut table: HandleTable<Marker, u32> = HandleTable::new();
        let h = table.insert(7);
        assert!(table.remove(h).is_some());
        assert!(table.remove(h).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_bits_roundtrip() {
        let mut table: HandleTable<Marker, u32> = HandleTable::new();
        let h = table.insert(3);
        let back = Handle::<Marker>::from_bits(h.to_bits());
        assert_eq!(back, h);
        assert_eq!(table.get(back), Some(&3));
    }

    #[test]
    fn test_foreign_bits_rejected() {
        let table: HandleTable<Marker, u32> = HandleTable::new();
        assert!(!table.contains(Handle::from_bits(0)));
        assert!(!table.contains(Handle::from_bits(u64::MAX)));
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut table: HandleTable<Marker, u32> = HandleTable::new();
        let a = table.insert(1);
        let _b = table.insert(2);
        table.remove(a);

        let values: Vec<u32> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2]);
    }
}
