//! Per-world component storage: one lock-wrapped container per type.
//!
//! Each container sits behind its own `RwLock` so Systems dispatched onto
//! worker threads can borrow disjoint component types concurrently. The
//! scheduler never runs two Systems with conflicting descriptors at the same
//! time, so these locks are uncontended in practice; they exist to make the
//! shared `&ComponentStorage` handed to workers sound.

use std::collections::HashMap;

use engine_component::{
    Component, ComponentContainer, ComponentTypeId, EcsError, ErasedContainer,
};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

type Slot = RwLock<Box<dyn ErasedContainer>>;

/// Shared borrow of one component. Returned by `EntityManager::get_component`.
pub type ComponentRef<'a, T> = MappedRwLockReadGuard<'a, T>;

/// All component containers of one world, keyed by type id.
#[derive(Default)]
pub struct ComponentStorage {
    containers: HashMap<ComponentTypeId, Slot>,
}

fn mismatch<T: Component>() -> EcsError {
    EcsError::ComponentTypeMismatch {
        type_id: T::component_type_id(),
        requested: T::type_name(),
    }
}

impl ComponentStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of component types that have storage.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.containers.len()
    }

    /// Lock the container of `T` for reading. `Ok(None)` if no `T` was ever
    /// stored.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentTypeMismatch`] if another Rust type owns the id.
    pub fn read<T: Component>(
        &self,
    ) -> Result<Option<MappedRwLockReadGuard<'_, ComponentContainer<T>>>, EcsError> {
        let Some(slot) = self.containers.get(&T::component_type_id()) else {
            return Ok(None);
        };
        RwLockReadGuard::try_map(slot.read(), |c| {
            c.as_any().downcast_ref::<ComponentContainer<T>>()
        })
        .map(Some)
        .map_err(|_| mismatch::<T>())
    }

    /// Lock the container of `T` for writing. `Ok(None)` if no `T` was ever
    /// stored.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentTypeMismatch`] if another Rust type owns the id.
    pub fn write<T: Component>(
        &self,
    ) -> Result<Option<MappedRwLockWriteGuard<'_, ComponentContainer<T>>>, EcsError> {
        let Some(slot) = self.containers.get(&T::component_type_id()) else {
            return Ok(None);
        };
        RwLockWriteGuard::try_map(slot.write(), |c| {
            c.as_any_mut().downcast_mut::<ComponentContainer<T>>()
        })
        .map(Some)
        .map_err(|_| mismatch::<T>())
    }

    /// Exclusive, lock-free access to the container of `T`, if any.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentTypeMismatch`] if another Rust type owns the id.
    pub fn typed_mut<T: Component>(&mut self) -> Result<Option<&mut ComponentContainer<T>>, EcsError> {
        match self.containers.get_mut(&T::component_type_id()) {
            None => Ok(None),
            Some(slot) => slot
                .get_mut()
                .as_any_mut()
                .downcast_mut::<ComponentContainer<T>>()
                .map(Some)
                .ok_or_else(mismatch::<T>),
        }
    }

    /// Exclusive access to the container of `T`, creating it on first use.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentTypeMismatch`] if another Rust type owns the id.
    pub fn typed_or_insert<T: Component>(&mut self) -> Result<&mut ComponentContainer<T>, EcsError> {
        self.erased_or_insert_with(T::component_type_id(), || {
            Box::new(ComponentContainer::<T>::new())
        })
        .as_any_mut()
        .downcast_mut::<ComponentContainer<T>>()
        .ok_or_else(mismatch::<T>)
    }

    /// Exclusive access to a container by id, if present.
    pub fn erased_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut dyn ErasedContainer> {
        let slot = self.containers.get_mut(&type_id)?;
        Some(&mut **slot.get_mut())
    }

    /// Exclusive access to a container by id, creating it with `create`.
    pub fn erased_or_insert_with(
        &mut self,
        type_id: ComponentTypeId,
        create: impl FnOnce() -> Box<dyn ErasedContainer>,
    ) -> &mut dyn ErasedContainer {
        let slot = self
            .containers
            .entry(type_id)
            .or_insert_with(|| RwLock::new(create()));
        &mut **slot.get_mut()
    }

    /// Shared, locked access to a container by id.
    #[must_use]
    pub fn erased(
        &self,
        type_id: ComponentTypeId,
    ) -> Option<MappedRwLockReadGuard<'_, dyn ErasedContainer>> {
        self.containers
            .get(&type_id)
            .map(|slot| RwLockReadGuard::map(slot.read(), |c| &**c))
    }
}

impl std::fmt::Debug for ComponentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.containers
                    .iter()
                    .map(|(id, slot)| (id, slot.read().component_name())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use engine_component::Entity;

    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Mass(f32);

    impl Component for Mass {
        fn type_name() -> &'static str {
            "Mass"
        }
    }

    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct FakeMass(u8);

    impl Component for FakeMass {
        fn type_name() -> &'static str {
            "Mass"
        }
    }

    #[test]
    fn test_read_absent_type_is_none() {
        let storage = ComponentStorage::new();
        assert!(storage.read::<Mass>().unwrap().is_none());
        assert!(storage.write::<Mass>().unwrap().is_none());
    }

    #[test]
    fn test_insert_then_read_and_write() {
        let mut storage = ComponentStorage::new();
        let e = Entity::new(0, 1);
        storage.typed_or_insert::<Mass>().unwrap().insert(e, Mass(2.0)).unwrap();

        {
            let mut masses = storage.write::<Mass>().unwrap().unwrap();
            masses.get_mut(e).unwrap().0 = 3.0;
        }
        let masses = storage.read::<Mass>().unwrap().unwrap();
        assert_eq!(masses.get(e), Some(&Mass(3.0)));
    }

    #[test]
    fn test_concurrent_readers_share() {
        let mut storage = ComponentStorage::new();
        storage.typed_or_insert::<Mass>().unwrap();
        let a = storage.read::<Mass>().unwrap();
        let b = storage.read::<Mass>().unwrap();
        assert!(a.is_some() && b.is_some());
    }

    #[test]
    fn test_name_collision_is_type_mismatch() {
        let mut storage = ComponentStorage::new();
        storage.typed_or_insert::<Mass>().unwrap();
        assert!(matches!(
            storage.read::<FakeMass>(),
            Err(EcsError::ComponentTypeMismatch { .. })
        ));
        assert!(storage.typed_or_insert::<FakeMass>().is_err());
    }

    #[test]
    fn test_erased_access() {
        let mut storage = ComponentStorage::new();
        let e = Entity::new(4, 1);
        storage.typed_or_insert::<Mass>().unwrap().insert(e, Mass(1.0)).unwrap();
        assert!(storage.erased(Mass::component_type_id()).unwrap().contains(e));
        assert!(storage.erased_mut(Mass::component_type_id()).unwrap().remove(e));
        assert!(storage.erased(ComponentTypeId(9)).is_none());
    }
}
