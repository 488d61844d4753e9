//! # engine_scene
//!
//! Built-in scene components and the Systems that sit on the boundary between
//! the ECS core and the engine services it feeds.
//!
//! - [`TransformComponent`], [`BoundingBoxComponent`], [`MeshComponent`],
//!   [`AudioComponent`], [`RigidBodyComponent`], [`PhysicsMaterial`],
//!   [`ScriptComponent`].
//! - [`BoundingBoxSystem`] keeps world-space bounds current.
//! - [`PhysicsSystem`] drives a [`PhysicsBackend`] and writes results back.
//! - [`AudioSystem`] advances playback and attenuation.
//! - [`RenderProxySystem`] publishes immutable [`RenderProxyFrame`]s.
//!
//! Call [`register_builtin_components`] on the registry before building any
//! entity manager.

pub mod audio;
pub mod bounds;
pub mod physics;
pub mod render;
pub mod script;
pub mod transform;

use engine_component::{ComponentFlags, ComponentRegistry, EcsError, EntityTag};

// Re-export glam types for convenience.
pub use glam::{Mat4, Quat, Vec3};

pub use audio::{AudioComponent, AudioSystem};
pub use bounds::{Aabb, BoundingBoxComponent, BoundingBoxSystem};
pub use physics::{
    BodyKind, BodyState, EulerBackend, PhysicsBackend, PhysicsMaterial, PhysicsSystem,
    RigidBodyComponent,
};
pub use render::{
    MeshComponent, RenderProxy, RenderProxyFrame, RenderProxyHandoff, RenderProxySystem,
};
pub use script::{ScriptComponent, ScriptFlags};
pub use transform::TransformComponent;

/// Register every built-in component type and every tag.
///
/// # Errors
///
/// [`EcsError::DuplicateRegistration`] if one of the names is already taken
/// by a different type.
pub fn register_builtin_components(registry: &ComponentRegistry) -> Result<(), EcsError> {
    let persistent = ComponentFlags::SERIALIZABLE;
    registry.register::<TransformComponent>(persistent)?;
    registry.register::<BoundingBoxComponent>(persistent)?;
    registry.register::<MeshComponent>(persistent)?;
    registry.register::<AudioComponent>(persistent)?;
    registry.register::<RigidBodyComponent>(persistent)?;
    registry.register::<PhysicsMaterial>(persistent)?;
    registry.register::<ScriptComponent>(persistent)?;
    EntityTag::register_all(registry)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use engine_component::Component;
    use engine_system::{EntityManager, ExecutionMode};

    use super::*;

    #[test]
    fn test_registration_is_idempotent() {
        let registry = ComponentRegistry::new();
        register_builtin_components(&registry).unwrap();
        let count = registry.len();
        register_builtin_components(&registry).unwrap();
        assert_eq!(registry.len(), count);
        assert!(registry.contains(TransformComponent::component_type_id()));
    }

    #[test]
    fn test_scene_roundtrip_through_registry() {
        let registry = ComponentRegistry::new();
        register_builtin_components(&registry).unwrap();
        let mut world = EntityManager::new(Arc::new(registry));

        let e = world.create_entity();
        world
            .add_component(e, TransformComponent::from_position(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        world.add_component(e, ScriptComponent::new("door.hyp")).unwrap();
        world.add_tag(e, EntityTag::LightmapElement).unwrap();

        let snapshot = world.serialize_entity(e).unwrap();
        let copy = world.deserialize_entity(&snapshot).unwrap();
        assert_eq!(
            *world.get_component::<TransformComponent>(copy).unwrap(),
            TransformComponent::from_position(Vec3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(
            world.get_component::<ScriptComponent>(copy).unwrap().asset_path,
            "door.hyp"
        );
        assert!(world.has_tag(copy, EntityTag::LightmapElement));
    }

    #[test]
    fn test_full_frame_pipeline_parallel() {
        let registry = ComponentRegistry::new();
        register_builtin_components(&registry).unwrap();
        let mut world = EntityManager::new(Arc::new(registry));
        world.set_execution_mode(ExecutionMode::Parallel { max_workers: 4 });

        let handoff = RenderProxyHandoff::new();
        world.add_system(RenderProxySystem::new(handoff.clone()));
        world.add_system(BoundingBoxSystem::new());
        world.add_system(AudioSystem::new());
        world.add_system(PhysicsSystem::new(EulerBackend {
            gravity: Vec3::ZERO,
        }));

        // Physics writes transforms, which everything else reads.
        let order = world.execution_order();
        assert_eq!(order[0], "physics");
        let stages = world.execution_stages();
        assert_eq!(stages[0], vec!["physics".to_string()]);

        let e = world.create_entity();
        world.add_component(e, TransformComponent::IDENTITY).unwrap();
        world
            .add_component(
                e,
                RigidBodyComponent {
                    kind: BodyKind::Kinematic,
                    velocity: Vec3::new(0.0, 0.0, 4.0),
                    ..RigidBodyComponent::default()
                },
            )
            .unwrap();
        world.add_component(e, PhysicsMaterial::default()).unwrap();
        world.add_component(e, MeshComponent::default()).unwrap();
        world
            .add_component(
                e,
                BoundingBoxComponent::new(Aabb::from_center_extents(Vec3::ZERO, Vec3::ONE)),
            )
            .unwrap();

        for _ in 0..4 {
            assert!(world.update(0.25).is_clean());
        }

        let frame = handoff.latest().unwrap();
        assert_eq!(frame.tick_id, 4);
        let proxy = frame.proxy(e).unwrap();
        assert_eq!(proxy.model.w_axis.z, 4.0);
        assert_eq!(proxy.world_aabb.center(), Vec3::new(0.0, 0.0, 4.0));
    }
}
