//! Component descriptors for System data access declarations.
//!
//! A [`ComponentDescriptor`] states that a System touches one component type,
//! how (shared [`AccessMode::Read`] or exclusive [`AccessMode::ReadWrite`]),
//! and whether the type is required for an entity to match the System. A
//! System's full declaration is a [`DescriptorSet`]. The entity manager uses it
//! to decide which entities a System sees; the scheduler uses it to order
//! Systems and to detect which ones may run concurrently.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentTypeId};

/// How a System accesses a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Shared, immutable access.
    Read,
    /// Exclusive, mutable access.
    ReadWrite,
}

impl AccessMode {
    /// Returns `true` for [`AccessMode::ReadWrite`].
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

/// One entry of a System's data access declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentDescriptor {
    /// The accessed component type.
    pub type_id: ComponentTypeId,
    /// Human-readable component name, for diagnostics.
    pub name: &'static str,
    /// Shared or exclusive access.
    pub access: AccessMode,
    /// Whether entities must carry this type to match the System.
    pub required: bool,
}

impl ComponentDescriptor {
    /// Describe access to component type `T`.
    #[must_use]
    pub fn of<T: Component>(access: AccessMode, required: bool) -> Self {
        Self {
            type_id: T::component_type_id(),
            name: T::type_name(),
            access,
            required,
        }
    }
}

/// The complete, immutable access declaration of a System.
///
/// Built once with the builder methods and then handed to the entity manager
/// at registration.
///
/// ```rust
/// # use engine_component::{Component, DescriptorSet};
/// # #[derive(serde::Serialize, serde::Deserialize)] struct Transform;
/// # impl Component for Transform { fn type_name() -> &'static str { "Transform" } }
/// # #[derive(serde::Serialize, serde::Deserialize)] struct Audio;
/// # impl Component for Audio { fn type_name() -> &'static str { "Audio" } }
/// let set = DescriptorSet::new().write::<Audio>().read::<Transform>();
/// assert_eq!(set.required_types().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSet {
    descriptors: Vec<ComponentDescriptor>,
}

impl DescriptorSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. A later descriptor for the same type replaces the
    /// earlier one.
    #[must_use]
    pub fn with(mut self, descriptor: ComponentDescriptor) -> Self {
        self.descriptors.retain(|d| d.type_id != descriptor.type_id);
        self.descriptors.push(descriptor);
        self
    }

    /// Required, read-only access to `T`.
    #[must_use]
    pub fn read<T: Component>(self) -> Self {
        self.with(ComponentDescriptor::of::<T>(AccessMode::Read, true))
    }

    /// Required, read-write access to `T`.
    #[must_use]
    pub fn write<T: Component>(self) -> Self {
        self.with(ComponentDescriptor::of::<T>(AccessMode::ReadWrite, true))
    }

    /// Optional, read-only access to `T`.
    #[must_use]
    pub fn optional_read<T: Component>(self) -> Self {
        self.with(ComponentDescriptor::of::<T>(AccessMode::Read, false))
    }

    /// Optional, read-write access to `T`.
    #[must_use]
    pub fn optional_write<T: Component>(self) -> Self {
        self.with(ComponentDescriptor::of::<T>(AccessMode::ReadWrite, false))
    }

    /// All descriptors in declaration order.
    #[must_use]
    pub fn descriptors(&self) -> &[ComponentDescriptor] {
        &self.descriptors
    }

    /// The declared access mode for `type_id`, if any.
    #[must_use]
    pub fn access(&self, type_id: ComponentTypeId) -> Option<AccessMode> {
        self.descriptors
            .iter()
            .find(|d| d.type_id == type_id)
            .map(|d| d.access)
    }

    /// Types an entity must carry to match.
    #[must_use]
    pub fn required_types(&self) -> BTreeSet<ComponentTypeId> {
        self.descriptors
            .iter()
            .filter(|d| d.required)
            .map(|d| d.type_id)
            .collect()
    }

    /// Types accessed with [`AccessMode::Read`].
    pub fn reads(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.descriptors
            .iter()
            .filter(|d| !d.access.is_write())
            .map(|d| d.type_id)
    }

    /// Types accessed with [`AccessMode::ReadWrite`].
    pub fn writes(&self) -> impl Iterator<Item = ComponentTypeId> + '_ {
        self.descriptors
            .iter()
            .filter(|d| d.access.is_write())
            .map(|d| d.type_id)
    }

    /// Returns `true` if this set writes a type that `other` reads or writes.
    #[must_use]
    pub fn writes_into(&self, other: &DescriptorSet) -> bool {
        self.writes().any(|w| other.access(w).is_some())
    }

    /// Checks whether two declarations conflict.
    ///
    /// ```text
    /// A.writes ∩ (B.reads ∪ B.writes) ≠ ∅  OR
    /// B.writes ∩ (A.reads ∪ A.writes) ≠ ∅
    /// ```
    ///
    /// Conflicting Systems are never executed concurrently.
    #[must_use]
    pub fn conflicts_with(&self, other: &DescriptorSet) -> bool {
        self.writes_into(other) || other.writes_into(self)
    }
}
