//! Physics adapter.
//!
//! The ECS core never talks to a physics library directly. [`PhysicsSystem`]
//! gathers every rigid body into a flat [`BodyState`] slice, hands it to a
//! [`PhysicsBackend`], and writes the stepped state back into
//! [`TransformComponent`] and [`RigidBodyComponent`].

use engine_component::{Component, DescriptorSet, Entity};
use engine_system::{System, SystemContext};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transform::TransformComponent;

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Integrated by the backend.
    #[default]
    Dynamic,
    /// Moved only by its own velocity, ignoring forces.
    Kinematic,
    /// Never moves.
    Static,
}

/// Velocity and mass of a simulated body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyComponent {
    /// Body kind.
    pub kind: BodyKind,
    /// Mass in kilograms.
    pub mass: f32,
    /// Linear velocity in m/s.
    pub velocity: Vec3,
    /// Angular velocity in rad/s (axis scaled by speed).
    pub angular_velocity: Vec3,
}

impl Default for RigidBodyComponent {
    fn default() -> Self {
        Self {
            kind: BodyKind::Dynamic,
            mass: 1.0,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }
}

impl Component for RigidBodyComponent {
    fn type_name() -> &'static str {
        "RigidBodyComponent"
    }
}

/// Surface and damping parameters of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Bounciness in `0.0..=1.0`.
    pub restitution: f32,
    /// Fraction of linear velocity lost per second.
    pub linear_damping: f32,
    /// Multiplier on world gravity.
    pub gravity_scale: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.0,
            linear_damping: 0.0,
            gravity_scale: 1.0,
        }
    }
}

impl Component for PhysicsMaterial {
    fn type_name() -> &'static str {
        "PhysicsMaterial"
    }
}

/// Flat per-body state exchanged with a [`PhysicsBackend`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    /// Owning entity.
    pub entity: Entity,
    /// Body kind.
    pub kind: BodyKind,
    /// Mass in kilograms.
    pub mass: f32,
    /// World position.
    pub position: Vec3,
    /// World rotation.
    pub rotation: Quat,
    /// Linear velocity.
    pub velocity: Vec3,
    /// Angular velocity.
    pub angular_velocity: Vec3,
    /// Surface parameters.
    pub material: PhysicsMaterial,
}

/// A physics engine the [`PhysicsSystem`] can drive.
pub trait PhysicsBackend: Send {
    /// Advance `bodies` by `delta` seconds in place.
    ///
    /// # Errors
    ///
    /// Any backend failure; the System reports it and leaves components
    /// untouched for this tick.
    fn step(&mut self, bodies: &mut [BodyState], delta: f32) -> anyhow::Result<()>;
}

/// Semi-implicit Euler integration under uniform gravity. No collisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerBackend {
    /// World gravity.
    pub gravity: Vec3,
}

impl Default for EulerBackend {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

impl PhysicsBackend for EulerBackend {
    fn step(&mut self, bodies: &mut [BodyState], delta: f32) -> anyhow::Result<()> {
        anyhow::ensure!(delta.is_finite() && delta >= 0.0, "invalid timestep {delta}");
        for body in bodies.iter_mut() {
            match body.kind {
                BodyKind::Static => continue,
                BodyKind::Dynamic => {
                    body.velocity += self.gravity * body.material.gravity_scale * delta;
                    body.velocity *= (1.0 - body.material.linear_damping * delta).max(0.0);
                }
                BodyKind::Kinematic => {}
            }
            body.position += body.velocity * delta;
            if body.angular_velocity != Vec3::ZERO {
                let spin = Quat::from_scaled_axis(body.angular_velocity * delta);
                body.rotation = (spin * body.rotation).normalize();
            }
        }
        Ok(())
    }
}

/// Steps a [`PhysicsBackend`] over every entity with a transform, rigid body
/// and physics material.
#[derive(Debug)]
pub struct PhysicsSystem<B: PhysicsBackend> {
    backend: B,
    bodies: Vec<Entity>,
    scratch: Vec<BodyState>,
}

impl<B: PhysicsBackend> PhysicsSystem<B> {
    /// Drive `backend`.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            bodies: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// The wrapped backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: PhysicsBackend> System for PhysicsSystem<B> {
    fn name(&self) -> &str {
        "physics"
    }

    fn descriptors(&self) -> DescriptorSet {
        DescriptorSet::new()
            .write::<TransformComponent>()
            .write::<RigidBodyComponent>()
            .read::<PhysicsMaterial>()
    }

    fn on_entity_added(&mut self, entity: Entity) {
        self.bodies.push(entity);
    }

    fn on_entity_removed(&mut self, entity: Entity) {
        if let Some(pos) = self.bodies.iter().position(|e| *e == entity) {
            self.bodies.swap_remove(pos);
        }
    }

    fn process(&mut self, ctx: &SystemContext<'_>, delta: f32) -> anyhow::Result<()> {
        let materials = ctx.read::<PhysicsMaterial>()?;
        let mut transforms = ctx.write::<TransformComponent>()?;
        let mut rigid_bodies = ctx.write::<RigidBodyComponent>()?;

        self.scratch.clear();
        for &entity in &self.bodies {
            let (Some(transform), Some(body), Some(material)) = (
                transforms.get(entity),
                rigid_bodies.get(entity),
                materials.get(entity),
            ) else {
                continue;
            };
            self.scratch.push(BodyState {
                entity,
                kind: body.kind,
                mass: body.mass,
                position: transform.position,
                rotation: transform.rotation,
                velocity: body.velocity,
                angular_velocity: body.angular_velocity,
                material: *material,
            });
        }

        self.backend.step(&mut self.scratch, delta)?;

        let mut moved = 0usize;
        for state in &self.scratch {
            if let Some(transform) = transforms.get_mut(state.entity)
                && (transform.position != state.position || transform.rotation != state.rotation)
            {
                transform.position = state.position;
                transform.rotation = state.rotation;
                moved += 1;
            }
            if let Some(body) = rigid_bodies.get_mut(state.entity) {
                body.velocity = state.velocity;
                body.angular_velocity = state.angular_velocity;
            }
        }

        debug!(
            tick_id = ctx.tick_id(),
            bodies = self.scratch.len(),
            moved,
            "stepped physics"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use engine_component::ComponentRegistry;
    use engine_system::EntityManager;

    use super::*;
    use crate::register_builtin_components;

    fn world() -> EntityManager {
        let registry = ComponentRegistry::new();
        register_builtin_components(&registry).unwrap();
        EntityManager::new(Arc::new(registry))
    }

    fn body(world: &mut EntityManager, kind: BodyKind, velocity: Vec3) -> Entity {
        let e = world.create_entity();
        world.add_component(e, TransformComponent::IDENTITY).unwrap();
        world
            .add_component(
                e,
                RigidBodyComponent {
                    kind,
                    velocity,
                    ..RigidBodyComponent::default()
                },
            )
            .unwrap();
        world.add_component(e, PhysicsMaterial::default()).unwrap();
        e
    }

    #[test]
    fn test_euler_gravity() {
        let mut backend = EulerBackend {
            gravity: Vec3::new(0.0, -10.0, 0.0),
        };
        let mut bodies = [BodyState {
            entity: Entity::new(0, 1),
            kind: BodyKind::Dynamic,
            mass: 1.0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            material: PhysicsMaterial::default(),
        }];
        backend.step(&mut bodies, 0.5).unwrap();
        assert_eq!(bodies[0].velocity, Vec3::new(0.0, -5.0, 0.0));
        assert_eq!(bodies[0].position, Vec3::new(0.0, -2.5, 0.0));
        assert!(backend.step(&mut bodies, f32::NAN).is_err());
    }

    #[test]
    fn test_system_writes_back_stepped_state() {
        let mut world = world();
        world.add_system(PhysicsSystem::new(EulerBackend {
            gravity: Vec3::ZERO,
        }));
        let moving = body(&mut world, BodyKind::Kinematic, Vec3::new(2.0, 0.0, 0.0));
        let fixed = body(&mut world, BodyKind::Static, Vec3::new(2.0, 0.0, 0.0));

        assert!(world.update(0.5).is_clean());
        assert_eq!(
            world.get_component::<TransformComponent>(moving).unwrap().position,
            Vec3::new(1.0, 0.0, 0.0)
        );
        assert_eq!(
            world.get_component::<TransformComponent>(fixed).unwrap().position,
            Vec3::ZERO
        );
        assert_eq!(
            world.get_component::<RigidBodyComponent>(moving).unwrap().velocity,
            Vec3::new(2.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_bodies_without_material_are_ignored() {
        let mut world = world();
        world.add_system(PhysicsSystem::new(EulerBackend::default()));
        let e = world.create_entity();
        world.add_component(e, TransformComponent::IDENTITY).unwrap();
        world.add_component(e, RigidBodyComponent::default()).unwrap();

        world.update(0.1);
        assert_eq!(
            world.get_component::<TransformComponent>(e).unwrap().position,
            Vec3::ZERO
        );
    }

    struct Broken;

    impl PhysicsBackend for Broken {
        fn step(&mut self, _bodies: &mut [BodyState], _delta: f32) -> anyhow::Result<()> {
            anyhow::bail!("solver diverged")
        }
    }

    #[test]
    fn test_backend_failure_is_reported() {
        let mut world = world();
        world.add_system(PhysicsSystem::new(Broken));
        body(&mut world, BodyKind::Dynamic, Vec3::X);
        let report = world.update(0.1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].system, "physics");
        assert!(report.failures[0].message.contains("solver diverged"));
    }
}
