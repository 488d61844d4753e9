//! Entity type and generational allocation.
//!
//! An [`Entity`] is an (index, generation) pair with no inherent data. The
//! index addresses a slot in the [`EntityAllocator`]; the generation is bumped
//! every time the slot is freed so a stale identifier never aliases a live one.

use serde::{Deserialize, Serialize};

/// A generational entity identifier.
///
/// Entities are pure identifiers. Components are attached to them through the
/// per-type containers; an entity "has" a component only via an index lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// The null entity sentinel. Generation 0 is never handed out.
    pub const INVALID: Entity = Entity {
        index: 0,
        generation: 0,
    };

    /// Build an entity from its parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index of this entity.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this identifier was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into a `u64` (generation in the high half).
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`Entity::to_bits`].
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }

    /// Returns `true` unless this is the [`Entity::INVALID`] sentinel family.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.generation != 0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// Allocates entity identifiers, recycling freed slots with a bumped
/// generation.
///
/// This allocator is owned by exactly one `EntityManager` and is the single
/// source of truth for entity liveness in that world.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    /// Current generation per slot.
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
    live_count: usize,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh entity, reusing the most recently freed slot when one
    /// is available.
    ///
    /// # Panics
    ///
    /// If every one of the `u32::MAX` index slots is already in use.
    pub fn allocate(&mut self) -> Entity {
        self.live_count += 1;
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return Entity::new(index, self.generations[slot]);
        }

        let index = u32::try_from(self.generations.len()).expect("entity index space exhausted");
        self.generations.push(1);
        self.alive.push(true);
        Entity::new(index, 1)
    }

    /// Frees a live entity, bumping its slot's generation.
    ///
    /// Returns `false` if the entity was not live.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = entity.index() as usize;
        self.alive[slot] = false;
        // Wrap past 0 so the sentinel generation is never reissued.
        let next = self.generations[slot].wrapping_add(1);
        self.generations[slot] = if next == 0 { 1 } else { next };
        self.free.push(entity.index());
        self.live_count -= 1;
        true
    }

    /// Returns `true` if `entity` refers to a currently live slot with a
    /// matching generation.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index() as usize;
        entity.is_valid()
            && self.alive.get(slot).copied().unwrap_or(false)
            && self.generations[slot] == entity.generation()
    }

    /// Number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Number of slots ever allocated (live + free).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }

    /// Iterates over all live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(slot, _)| Entity::new(slot as u32, self.generations[slot]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_produces_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        assert_ne!(e1, e2);
        assert_eq!(e1.index(), 0);
        assert_eq!(e2.index(), 1);
        assert_eq!(alloc.live_count(), 2);
    }

    #[test]
    fn test_freed_slot_is_reused_with_new_generation() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        assert!(alloc.free(e1));
        let e2 = alloc.allocate();
        assert_eq!(e2.index(), e1.index());
        assert_ne!(e2.generation(), e1.generation());
        assert!(!alloc.is_alive(e1));
        assert!(alloc.is_alive(e2));
    }

    #[test]
    fn test_double_free_fails() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.free(e));
        assert!(!alloc.free(e));
        assert_eq!(alloc.live_count(), 0);
    }

    #[test]
    fn test_invalid_is_never_alive() {
        let mut alloc = EntityAllocator::new();
        let _ = alloc.allocate();
        assert!(!alloc.is_alive(Entity::INVALID));
        assert!(!Entity::INVALID.is_valid());
    }

    #[test]
    fn test_iter_skips_freed() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        let c = alloc.allocate();
        alloc.free(b);
        let live: Vec<_> = alloc.iter().collect();
        assert_eq!(live, vec![a, c]);
    }

    #[test]
    fn test_bits_roundtrip() {
        let e = Entity::new(7, 3);
        assert_eq!(Entity::from_bits(e.to_bits()), e);
        assert_eq!(e.to_string(), "Entity(7v3)");
    }
}
