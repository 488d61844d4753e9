//! Per-tick execution context provided to `System::process`.

use engine_component::{
    AccessMode, Component, ComponentContainer, DescriptorSet, EcsError, Entity,
};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use crate::commands::CommandSender;
use crate::storage::ComponentStorage;

/// Context handed to a System on each tick.
///
/// Component access goes through [`SystemContext::read`] and
/// [`SystemContext::write`], which check the request against the System's
/// declared descriptors. Structural changes (spawning, despawning, attaching
/// components) go through [`SystemContext::commands`] and take effect at the
/// start of the next tick.
///
/// Requesting a write view of a type while another view of the same type is
/// still alive in the same System blocks forever. Drop views before asking
/// for a conflicting one.
pub struct SystemContext<'a> {
    system: &'a str,
    descriptors: &'a DescriptorSet,
    storage: &'a ComponentStorage,
    commands: &'a CommandSender,
    tick_id: u64,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        system: &'a str,
        descriptors: &'a DescriptorSet,
        storage: &'a ComponentStorage,
        commands: &'a CommandSender,
        tick_id: u64,
    ) -> Self {
        Self {
            system,
            descriptors,
            storage,
            commands,
            tick_id,
        }
    }

    /// Name of the running System.
    #[must_use]
    pub fn system_name(&self) -> &str {
        self.system
    }

    /// The current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Queue for structural changes applied at the start of the next tick.
    #[must_use]
    pub fn commands(&self) -> &CommandSender {
        self.commands
    }

    fn check<T: Component>(&self, write: bool) -> Result<(), EcsError> {
        match self.descriptors.access(T::component_type_id()) {
            Some(AccessMode::ReadWrite) => Ok(()),
            Some(AccessMode::Read) if !write => Ok(()),
            _ => Err(EcsError::UndeclaredAccess {
                system: self.system.to_string(),
                component: T::type_name(),
                mode: if write { "write" } else { "read" },
            }),
        }
    }

    /// Shared view of every `T`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UndeclaredAccess`] if the System did not declare `T`, or
    /// [`EcsError::ComponentTypeMismatch`] on a component name collision.
    pub fn read<T: Component>(&self) -> Result<ComponentRead<'a, T>, EcsError> {
        self.check::<T>(false)?;
        Ok(ComponentRead {
            guard: self.storage.read::<T>()?,
        })
    }

    /// Exclusive view of every `T`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UndeclaredAccess`] if the System did not declare `T` as
    /// [`AccessMode::ReadWrite`], or [`EcsError::ComponentTypeMismatch`] on a
    /// component name collision.
    pub fn write<T: Component>(&self) -> Result<ComponentWrite<'a, T>, EcsError> {
        self.check::<T>(true)?;
        Ok(ComponentWrite {
            guard: self.storage.write::<T>()?,
        })
    }
}

impl std::fmt::Debug for SystemContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("system", &self.system)
            .field("tick_id", &self.tick_id)
            .finish_non_exhaustive()
    }
}

/// Shared view of one component type. Empty if the type was never stored.
pub struct ComponentRead<'a, T: Component> {
    guard: Option<MappedRwLockReadGuard<'a, ComponentContainer<T>>>,
}

impl<T: Component> ComponentRead<'_, T> {
    /// The component of `entity`, if present.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.guard.as_deref().and_then(|c| c.get(entity))
    }

    /// Returns `true` if `entity` carries `T`.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.guard.as_deref().is_some_and(|c| c.contains(entity))
    }

    /// Number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.as_deref().map_or(0, ComponentContainer::len)
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entities carrying `T`, in dense order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        self.guard.as_deref().map_or(&[][..], ComponentContainer::entities)
    }

    /// `(entity, component)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.guard.iter().flat_map(|c| c.iter())
    }
}

/// Exclusive view of one component type. Empty if the type was never stored.
pub struct ComponentWrite<'a, T: Component> {
    guard: Option<MappedRwLockWriteGuard<'a, ComponentContainer<T>>>,
}

impl<T: Component> ComponentWrite<'_, T> {
    /// The component of `entity`, if present.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.guard.as_deref().and_then(|c| c.get(entity))
    }

    /// Mutable access to the component of `entity`, if present.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.guard.as_deref_mut().and_then(|c| c.get_mut(entity))
    }

    /// Returns `true` if `entity` carries `T`.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.guard.as_deref().is_some_and(|c| c.contains(entity))
    }

    /// Number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.as_deref().map_or(0, ComponentContainer::len)
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entities carrying `T`, in dense order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        self.guard.as_deref().map_or(&[][..], ComponentContainer::entities)
    }

    /// `(entity, component)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.guard.iter().flat_map(|c| c.iter())
    }

    /// `(entity, &mut component)` pairs in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.guard.iter_mut().flat_map(|c| c.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::CommandQueue;

    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Heat(u32);

    impl Component for Heat {
        fn type_name() -> &'static str {
            "Heat"
        }
    }

    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct Light;

    impl Component for Light {
        fn type_name() -> &'static str {
            "Light"
        }
    }

    fn storage_with_heat(entity: Entity) -> ComponentStorage {
        let mut storage = ComponentStorage::new();
        storage
            .typed_or_insert::<Heat>()
            .unwrap()
            .insert(entity, Heat(10))
            .unwrap();
        storage
    }

    #[test]
    fn test_read_declared_type() {
        let e = Entity::new(0, 1);
        let storage = storage_with_heat(e);
        let descriptors = DescriptorSet::new().read::<Heat>();
        let queue = CommandQueue::default();
        let sender = queue.sender();
        let ctx = SystemContext::new("thermo", &descriptors, &storage, &sender, 7);

        let heat = ctx.read::<Heat>().unwrap();
        assert_eq!(heat.get(e), Some(&Heat(10)));
        assert_eq!(heat.len(), 1);
        assert_eq!(heat.entities(), &[e]);
        assert_eq!(ctx.tick_id(), 7);
        assert_eq!(ctx.system_name(), "thermo");
    }

    #[test]
    fn test_write_requires_read_write_declaration() {
        let e = Entity::new(0, 1);
        let storage = storage_with_heat(e);
        let descriptors = DescriptorSet::new().read::<Heat>();
        let queue = CommandQueue::default();
        let sender = queue.sender();
        let ctx = SystemContext::new("thermo", &descriptors, &storage, &sender, 0);

        let err = ctx.write::<Heat>().err().unwrap();
        assert_eq!(
            err,
            EcsError::UndeclaredAccess {
                system: "thermo".into(),
                component: "Heat",
                mode: "write",
            }
        );
    }

    #[test]
    fn test_undeclared_read_rejected() {
        let storage = ComponentStorage::new();
        let descriptors = DescriptorSet::new().read::<Heat>();
        let queue = CommandQueue::default();
        let sender = queue.sender();
        let ctx = SystemContext::new("thermo", &descriptors, &storage, &sender, 0);
        assert!(matches!(
            ctx.read::<Light>(),
            Err(EcsError::UndeclaredAccess { .. })
        ));
    }

    #[test]
    fn test_write_view_mutates_in_place() {
        let e = Entity::new(2, 1);
        let storage = storage_with_heat(e);
        let descriptors = DescriptorSet::new().write::<Heat>();
        let queue = CommandQueue::default();
        let sender = queue.sender();
        let ctx = SystemContext::new("thermo", &descriptors, &storage, &sender, 0);

        {
            let mut heat = ctx.write::<Heat>().unwrap();
            for (_, h) in heat.iter_mut() {
                h.0 += 5;
            }
            heat.get_mut(e).unwrap().0 *= 2;
        }
        assert_eq!(ctx.read::<Heat>().unwrap().get(e), Some(&Heat(30)));
    }

    #[test]
    fn test_never_stored_type_is_empty_view() {
        let storage = ComponentStorage::new();
        let descriptors = DescriptorSet::new().optional_read::<Light>();
        let queue = CommandQueue::default();
        let sender = queue.sender();
        let ctx = SystemContext::new("lamps", &descriptors, &storage, &sender, 0);

        let lights = ctx.read::<Light>().unwrap();
        assert!(lights.is_empty());
        assert!(!lights.contains(Entity::new(0, 1)));
        assert_eq!(lights.iter().count(), 0);
    }

    #[test]
    fn test_commands_reach_queue() {
        let storage = ComponentStorage::new();
        let descriptors = DescriptorSet::new();
        let queue = CommandQueue::default();
        let sender = queue.sender();
        let ctx = SystemContext::new("spawner", &descriptors, &storage, &sender, 0);
        ctx.commands().despawn(Entity::new(1, 1));
        assert_eq!(queue.len(), 1);
    }
}
