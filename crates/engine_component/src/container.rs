//! Per-type component storage.
//!
//! [`ComponentContainer<T>`] is a sparse set: a dense `Vec<T>` packed with the
//! live components, a parallel `Vec<Entity>` naming their owners, and a sparse
//! table mapping an entity's slot index to its position in the dense arrays.
//!
//! ```text
//! sparse:   [ 2 | - | 0 | - | 1 ]      indexed by Entity::index()
//!             |       |       |
//! dense:    [ c0 | c1 | c2 ]           packed component values
//! entities: [ e2 | e4 | e0 ]           owner of each dense slot
//! ```
//!
//! Removal swaps the victim with the last dense element and patches the moved
//! element's sparse entry, so every operation is O(1) and the arrays never
//! contain holes.

use std::any::Any;

use crate::component::{Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::EcsError;

const EMPTY: u32 = u32::MAX;

/// Dense storage for exactly one component type.
#[derive(Debug, Clone)]
pub struct ComponentContainer<T> {
    dense: Vec<T>,
    entities: Vec<Entity>,
    sparse: Vec<u32>,
}

impl<T: Component> ComponentContainer<T> {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            entities: Vec::new(),
            sparse: Vec::new(),
        }
    }

    /// Number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if no component is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    fn slot_of(&self, entity: Entity) -> Option<usize> {
        let slot = *self.sparse.get(entity.index() as usize)?;
        if slot == EMPTY {
            return None;
        }
        let slot = slot as usize;
        (self.entities[slot] == entity).then_some(slot)
    }

    /// Returns `true` if `entity` has a component in this container.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slot_of(entity).is_some()
    }

    /// Insert a component for `entity`, returning its dense index.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateComponent`] if the entity already has a
    /// component here; the stored value is left untouched.
    pub fn insert(&mut self, entity: Entity, value: T) -> Result<usize, EcsError> {
        let sparse_index = entity.index() as usize;
        if let Some(&slot) = self.sparse.get(sparse_index)
            && slot != EMPTY
        {
            let occupant = self.entities[slot as usize];
            if occupant == entity {
                return Err(EcsError::DuplicateComponent {
                    entity,
                    component: T::type_name(),
                });
            }
            // Same slot, older generation: the occupant is stale.
            self.take(occupant);
        }

        if sparse_index >= self.sparse.len() {
            self.sparse.resize(sparse_index + 1, EMPTY);
        }
        let slot = self.dense.len();
        self.sparse[sparse_index] = slot as u32;
        self.dense.push(value);
        self.entities.push(entity);
        Ok(slot)
    }

    /// Remove and return the component of `entity`.
    pub fn take(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot_of(entity)?;
        let last = self.dense.len() - 1;
        if slot != last {
            let moved = self.entities[last];
            self.sparse[moved.index() as usize] = slot as u32;
        }
        self.sparse[entity.index() as usize] = EMPTY;
        self.entities.swap_remove(slot);
        Some(self.dense.swap_remove(slot))
    }

    /// Remove the component of `entity`. Returns `false` if absent.
    pub fn remove(&mut self, entity: Entity) -> bool {
        self.take(entity).is_some()
    }

    /// O(1) lookup.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot_of(entity).map(|slot| &self.dense[slot])
    }

    /// O(1) mutable lookup.
    #[must_use]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot_of(entity).map(|slot| &mut self.dense[slot])
    }

    /// Owners of the stored components, in dense order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Iterate `(entity, &component)` pairs in dense order.
    ///
    /// The order depends on insertion and removal history and is not stable
    /// across mutation.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.entities.iter().copied().zip(self.dense.iter())
    }

    /// Iterate `(entity, &mut component)` pairs in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.entities.iter().copied().zip(self.dense.iter_mut())
    }
}

impl<T: Component> Default for ComponentContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe view of a [`ComponentContainer<T>`] used where the component
/// type is only known by [`ComponentTypeId`]: entity teardown, the command
/// queue and registry-driven (de)serialisation.
pub trait ErasedContainer: Send + Sync {
    /// Type id of the stored component.
    fn component_type(&self) -> ComponentTypeId;
    /// Name of the stored component.
    fn component_name(&self) -> &'static str;
    /// Number of stored components.
    fn len(&self) -> usize;
    /// Returns `true` if nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Returns `true` if `entity` has a component here.
    fn contains(&self, entity: Entity) -> bool;
    /// Swap-remove the component of `entity`.
    fn remove(&mut self, entity: Entity) -> bool;
    /// Borrow the component of `entity` as `Any`.
    fn get_any(&self, entity: Entity) -> Option<&dyn Any>;
    /// Insert a boxed value which must be of the stored type.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentTypeMismatch`] if the box holds another type, or
    /// [`EcsError::DuplicateComponent`] as for [`ComponentContainer::insert`].
    fn insert_any(&mut self, entity: Entity, value: Box<dyn Any + Send + Sync>)
    -> Result<usize, EcsError>;
    /// Owners in dense order.
    fn entities(&self) -> &[Entity];
    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
    /// Downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedContainer for ComponentContainer<T> {
    fn component_type(&self) -> ComponentTypeId {
        T::component_type_id()
    }

    fn component_name(&self) -> &'static str {
        T::type_name()
    }

    fn len(&self) -> usize {
        ComponentContainer::len(self)
    }

    fn contains(&self, entity: Entity) -> bool {
        ComponentContainer::contains(self, entity)
    }

    fn remove(&mut self, entity: Entity) -> bool {
        ComponentContainer::remove(self, entity)
    }

    fn get_any(&self, entity: Entity) -> Option<&dyn Any> {
        ComponentContainer::get(self, entity).map(|value| value as &dyn Any)
    }

    fn insert_any(
        &mut self,
        entity: Entity,
        value: Box<dyn Any + Send + Sync>,
    ) -> Result<usize, EcsError> {
        let value = value
            .downcast::<T>()
            .map_err(|_| EcsError::ComponentTypeMismatch {
                type_id: T::component_type_id(),
                requested: T::type_name(),
            })?;
        ComponentContainer::insert(self, entity, *value)
    }

    fn entities(&self) -> &[Entity] {
        ComponentContainer::entities(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Speed(f32);

    impl Component for Speed {
        fn type_name() -> &'static str {
            "Speed"
        }
    }

    fn entity(index: u32) -> Entity {
        Entity::new(index, 1)
    }

    #[test]
    fn test_insert_and_get() {
        let mut c = ComponentContainer::new();
        assert_eq!(c.insert(entity(3), Speed(1.5)).unwrap(), 0);
        assert_eq!(c.get(entity(3)), Some(&Speed(1.5)));
        assert!(c.get(entity(2)).is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_double_insert_rejected_and_value_kept() {
        let mut c = ComponentContainer::new();
        c.insert(entity(0), Speed(1.0)).unwrap();
        let err = c.insert(entity(0), Speed(2.0)).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent { .. }));
        assert_eq!(c.get(entity(0)), Some(&Speed(1.0)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_swap_remove_fixes_moved_entry() {
        let mut c = ComponentContainer::new();
        for i in 0..4 {
            c.insert(entity(i), Speed(i as f32)).unwrap();
        }
        assert!(c.remove(entity(1)));
        // entity 3 was moved into slot 1.
        assert_eq!(c.entities(), &[entity(0), entity(3), entity(2)]);
        assert_eq!(c.get(entity(3)), Some(&Speed(3.0)));
        assert!(!c.remove(entity(1)));
    }

    #[test]
    fn test_remove_last_element() {
        let mut c = ComponentContainer::new();
        c.insert(entity(0), Speed(0.0)).unwrap();
        c.insert(entity(1), Speed(1.0)).unwrap();
        assert_eq!(c.take(entity(1)), Some(Speed(1.0)));
        assert_eq!(c.get(entity(0)), Some(&Speed(0.0)));
        assert!(c.insert(entity(1), Speed(9.0)).is_ok());
    }

    #[test]
    fn test_dense_invariant_after_mixed_ops() {
        let mut c = ComponentContainer::new();
        let n = 50;
        for i in 0..n {
            c.insert(entity(i), Speed(i as f32)).unwrap();
        }
        let removed: Vec<u32> = (0..n).filter(|i| i % 3 == 0).collect();
        for &i in &removed {
            assert!(c.remove(entity(i)));
        }

        assert_eq!(c.iter().count(), (n as usize) - removed.len());
        for (e, speed) in c.iter() {
            assert_eq!(speed.0, e.index() as f32);
            assert_eq!(c.get(e), Some(speed));
        }
        for &i in &removed {
            assert!(!c.contains(entity(i)));
        }
    }

    #[test]
    fn test_stale_generation_is_not_found() {
        let mut c = ComponentContainer::new();
        c.insert(Entity::new(0, 1), Speed(1.0)).unwrap();
        assert!(c.get(Entity::new(0, 2)).is_none());
        assert!(!c.remove(Entity::new(0, 2)));
    }

    #[test]
    fn test_stale_occupant_evicted_on_insert() {
        let mut c = ComponentContainer::new();
        c.insert(Entity::new(0, 1), Speed(1.0)).unwrap();
        c.insert(Entity::new(0, 2), Speed(2.0)).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(Entity::new(0, 2)), Some(&Speed(2.0)));
    }

    #[test]
    fn test_iter_mut_updates_in_place() {
        let mut c = ComponentContainer::new();
        c.insert(entity(0), Speed(1.0)).unwrap();
        c.insert(entity(1), Speed(2.0)).unwrap();
        for (_, s) in c.iter_mut() {
            s.0 *= 10.0;
        }
        assert_eq!(c.get(entity(1)), Some(&Speed(20.0)));
    }

    #[test]
    fn test_erased_insert_type_mismatch() {
        let mut c: Box<dyn ErasedContainer> = Box::new(ComponentContainer::<Speed>::new());
        let err = c.insert_any(entity(0), Box::new(5u32)).unwrap_err();
        assert!(matches!(err, EcsError::ComponentTypeMismatch { .. }));
        c.insert_any(entity(0), Box::new(Speed(4.0))).unwrap();
        assert!(c.contains(entity(0)));
        let value = c.get_any(entity(0)).unwrap().downcast_ref::<Speed>();
        assert_eq!(value, Some(&Speed(4.0)));
        assert_eq!(c.component_name(), "Speed");
    }
}
