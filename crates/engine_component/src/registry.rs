//! Component registry: runtime catalog of component types.
//!
//! The registry maps a [`ComponentTypeId`] to a [`ComponentInterface`], a
//! vtable-like record carrying the type's layout, a default-construction
//! factory, a storage factory and optional (de)serialisation hooks. It lets
//! type-erased code (scene persistence, editor tooling, the command queue)
//! work with component types it cannot name.
//!
//! A registry is populated before any entity manager is built and is shared
//! read-only afterwards through an `Arc`.

use std::alloc::Layout;
use std::any::{Any, TypeId};
use std::sync::Arc;

use bitflags::bitflags;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::component::{Component, ComponentTypeId};
use crate::container::{ComponentContainer, ErasedContainer};
use crate::error::EcsError;

bitflags! {
    /// Per-type registration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ComponentFlags: u32 {
        /// The type participates in scene serialisation.
        const SERIALIZABLE = 1 << 0;
        /// The type is a zero-sized tag used only for filtering.
        const TAG = 1 << 1;
    }
}

type FactoryFn = fn() -> Box<dyn Any + Send + Sync>;
type ContainerFn = fn() -> Box<dyn ErasedContainer>;
type SerializeFn = fn(&dyn Any) -> Result<Vec<u8>, EcsError>;
type DeserializeFn = fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, EcsError>;

/// Type-erased description of one component type.
#[derive(Clone)]
pub struct ComponentInterface {
    /// Stable type identifier.
    pub type_id: ComponentTypeId,
    /// Component name.
    pub name: &'static str,
    /// Rust type behind the registration, used to detect name collisions.
    pub rust_type: TypeId,
    /// Size and alignment of one instance.
    pub layout: Layout,
    /// Registration flags.
    pub flags: ComponentFlags,
    factory: FactoryFn,
    new_container: ContainerFn,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

impl ComponentInterface {
    /// Build the interface for `T`.
    #[must_use]
    pub fn of<T: Component + Default>(flags: ComponentFlags) -> Self {
        Self {
            type_id: T::component_type_id(),
            name: T::type_name(),
            rust_type: TypeId::of::<T>(),
            layout: Layout::new::<T>(),
            flags,
            factory: || Box::new(T::default()),
            new_container: || Box::new(ComponentContainer::<T>::new()),
            serialize: |value: &dyn Any| {
                let value = value
                    .downcast_ref::<T>()
                    .ok_or(EcsError::ComponentTypeMismatch {
                        type_id: T::component_type_id(),
                        requested: T::type_name(),
                    })?;
                rmp_serde::to_vec_named(value).map_err(|e| EcsError::Serialize {
                    component: T::type_name(),
                    message: e.to_string(),
                })
            },
            deserialize: |bytes: &[u8]| {
                let value: T = rmp_serde::from_slice(bytes).map_err(|e| EcsError::Deserialize {
                    component: T::type_name(),
                    message: e.to_string(),
                })?;
                Ok(Box::new(value))
            },
        }
    }

    /// Size of one instance in bytes. Zero for tags.
    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Returns `true` if the type participates in serialisation.
    #[must_use]
    pub fn is_serializable(&self) -> bool {
        self.flags.contains(ComponentFlags::SERIALIZABLE)
    }

    /// Default-construct an instance.
    #[must_use]
    pub fn create_default(&self) -> Box<dyn Any + Send + Sync> {
        (self.factory)()
    }

    /// Create empty storage for this type.
    #[must_use]
    pub fn create_container(&self) -> Box<dyn ErasedContainer> {
        (self.new_container)()
    }

    /// Serialise one instance to MessagePack.
    ///
    /// # Errors
    ///
    /// Fails if `value` is not of this type or encoding fails.
    pub fn serialize(&self, value: &dyn Any) -> Result<Vec<u8>, EcsError> {
        (self.serialize)(value)
    }

    /// Deserialise one instance from MessagePack.
    ///
    /// # Errors
    ///
    /// Fails if decoding fails.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, EcsError> {
        (self.deserialize)(bytes)
    }

    fn same_metadata(&self, other: &ComponentInterface) -> bool {
        self.rust_type == other.rust_type
            && self.name == other.name
            && self.layout == other.layout
            && self.flags == other.flags
    }
}

impl std::fmt::Debug for ComponentInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInterface")
            .field("type_id", &self.type_id)
            .field("name", &self.name)
            .field("size", &self.layout.size())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Catalog of registered component types.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    interfaces: DashMap<ComponentTypeId, Arc<ComponentInterface>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`. Registering the same type again with the same flags is a
    /// no-op returning the existing interface.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateRegistration`] if the type id is already taken by
    /// different metadata (another Rust type with the same name, or
    /// different flags).
    pub fn register<T: Component + Default>(
        &self,
        flags: ComponentFlags,
    ) -> Result<Arc<ComponentInterface>, EcsError> {
        self.register_interface(ComponentInterface::of::<T>(flags))
    }

    /// Register a pre-built interface. Same rules as [`Self::register`].
    ///
    /// # Errors
    ///
    /// See [`Self::register`].
    pub fn register_interface(
        &self,
        interface: ComponentInterface,
    ) -> Result<Arc<ComponentInterface>, EcsError> {
        match self.interfaces.entry(interface.type_id) {
            Entry::Occupied(existing) => {
                if existing.get().same_metadata(&interface) {
                    Ok(Arc::clone(existing.get()))
                } else {
                    Err(EcsError::DuplicateRegistration {
                        type_id: interface.type_id,
                        name: interface.name,
                    })
                }
            }
            Entry::Vacant(slot) => {
                let interface = Arc::new(interface);
                slot.insert(Arc::clone(&interface));
                Ok(interface)
            }
        }
    }

    /// Look up a registered type.
    #[must_use]
    pub fn lookup(&self, type_id: ComponentTypeId) -> Option<Arc<ComponentInterface>> {
        self.interfaces
            .get(&type_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if `type_id` is registered.
    #[must_use]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.interfaces.contains_key(&type_id)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health {
        current: f32,
        max: f32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    mod other {
        use crate::Component;

        /// Different Rust type claiming the same name.
        #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
        pub struct Health(pub u8);

        impl Component for Health {
            fn type_name() -> &'static str {
                "Health"
            }
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ComponentRegistry::new();
        registry
            .register::<Health>(ComponentFlags::SERIALIZABLE)
            .unwrap();
        let iface = registry.lookup(Health::component_type_id()).unwrap();
        assert_eq!(iface.name, "Health");
        assert_eq!(iface.size(), std::mem::size_of::<Health>());
        assert!(iface.is_serializable());
    }

    #[test]
    fn test_lookup_unregistered_is_none() {
        let registry = ComponentRegistry::new();
        assert!(registry.lookup(ComponentTypeId(42)).is_none());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ComponentRegistry::new();
        registry
            .register::<Health>(ComponentFlags::SERIALIZABLE)
            .unwrap();
        registry
            .register::<Health>(ComponentFlags::SERIALIZABLE)
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let registry = ComponentRegistry::new();
        registry
            .register::<Health>(ComponentFlags::SERIALIZABLE)
            .unwrap();
        let err = registry
            .register::<Health>(ComponentFlags::empty())
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_name_collision_rejected() {
        let registry = ComponentRegistry::new();
        registry.register::<Health>(ComponentFlags::empty()).unwrap();
        let err = registry
            .register::<other::Health>(ComponentFlags::empty())
            .unwrap_err();
        assert!(matches!(err, EcsError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_serialize_hooks_roundtrip() {
        let iface = ComponentInterface::of::<Health>(ComponentFlags::SERIALIZABLE);
        let value = Health {
            current: 40.0,
            max: 100.0,
        };
        let bytes = iface.serialize(&value).unwrap();
        let restored = iface.deserialize(&bytes).unwrap();
        assert_eq!(restored.downcast_ref::<Health>(), Some(&value));
    }

    #[test]
    fn test_serialize_wrong_type_fails() {
        let iface = ComponentInterface::of::<Health>(ComponentFlags::SERIALIZABLE);
        let err = iface.serialize(&7u32).unwrap_err();
        assert!(matches!(err, EcsError::ComponentTypeMismatch { .. }));
    }

    #[test]
    fn test_factories() {
        let iface = ComponentInterface::of::<Health>(ComponentFlags::empty());
        let value = iface.create_default();
        assert_eq!(value.downcast_ref::<Health>(), Some(&Health::default()));
        let container = iface.create_container();
        assert_eq!(container.component_type(), Health::component_type_id());
        assert!(container.is_empty());
    }
}
