//! ECS error taxonomy.
//!
//! Hot-path lookups (`get`, `has_component`) never produce these; they return
//! `Option`/`bool`. Structural failures on mutating calls and registry
//! conflicts are reported through [`EcsError`].

use crate::component::ComponentTypeId;
use crate::entity::Entity;

/// A System's `process` call failed or panicked.
///
/// Isolated to that System for the current tick: the scheduler logs it and
/// moves on to the remaining Systems.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("system '{system}' failed: {message}")]
pub struct SystemProcessError {
    /// Name of the failing System.
    pub system: String,
    /// Rendered error or panic payload.
    pub message: String,
}

/// Errors reported by the ECS core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The entity is unknown or has been freed (generation mismatch).
    #[error("invalid entity {0}")]
    InvalidEntity(Entity),

    /// The entity already carries a component of this type.
    #[error("entity {entity} already has component '{component}'")]
    DuplicateComponent {
        /// Target entity.
        entity: Entity,
        /// Component type name.
        component: &'static str,
    },

    /// The entity does not carry a component of this type.
    #[error("entity {entity} has no component '{component}'")]
    MissingComponent {
        /// Target entity.
        entity: Entity,
        /// Component type name (or hex id when the type is unregistered).
        component: String,
    },

    /// A component type was registered twice with conflicting metadata.
    #[error("component '{name}' ({type_id}) is already registered with different metadata")]
    DuplicateRegistration {
        /// The conflicting type id.
        type_id: ComponentTypeId,
        /// Name of the new registration.
        name: &'static str,
    },

    /// A type-erased operation referenced a type absent from the registry.
    #[error("component type {0} is not registered")]
    UnregisteredComponent(ComponentTypeId),

    /// Storage for a type id holds a different Rust type than requested.
    #[error("component type {type_id} is not stored as '{requested}'")]
    ComponentTypeMismatch {
        /// The type id looked up.
        type_id: ComponentTypeId,
        /// Name of the requested Rust type.
        requested: &'static str,
    },

    /// A System touched a component type outside its declared descriptors.
    #[error("system '{system}' did not declare {mode} access to '{component}'")]
    UndeclaredAccess {
        /// Name of the offending System.
        system: String,
        /// Component type name.
        component: &'static str,
        /// Requested access, rendered (`read` / `write`).
        mode: &'static str,
    },

    /// Encoding a component through its registry hook failed.
    #[error("failed to serialise component '{component}': {message}")]
    Serialize {
        /// Component type name.
        component: &'static str,
        /// Encoder message.
        message: String,
    },

    /// Decoding a component through its registry hook failed.
    #[error("failed to deserialise component '{component}': {message}")]
    Deserialize {
        /// Component type name.
        component: &'static str,
        /// Decoder message.
        message: String,
    },

    /// See [`SystemProcessError`].
    #[error(transparent)]
    SystemProcess(#[from] SystemProcessError),
}
