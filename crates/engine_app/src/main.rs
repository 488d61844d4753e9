//! # engine_app
//!
//! Demo host for the ECS core. Builds a small scene with the built-in
//! Systems and drives it with a fixed-timestep loop.
//!
//! ```text
//! engine_app [config.toml]
//! ```
//!
//! Without a config file the loop runs 120 ticks at 60 Hz sequentially.
//! Set `RUST_LOG` to adjust logging, e.g. `RUST_LOG=engine_system=debug`.

mod tick;

use std::sync::Arc;

use anyhow::{Context, Result};
use engine_component::{ComponentRegistry, EntityTag};
use engine_scene::{
    Aabb, AudioComponent, AudioSystem, BodyKind, BoundingBoxComponent, BoundingBoxSystem,
    EulerBackend, MeshComponent, PhysicsMaterial, PhysicsSystem, RenderProxyHandoff,
    RenderProxySystem, RigidBodyComponent, TransformComponent, Vec3, register_builtin_components,
};
use engine_system::{EntityManager, WorldConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tick::TickLoop;

const DEMO_TICKS: u64 = 120;

fn load_config() -> Result<WorldConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            let config = WorldConfig::from_toml_str(&source)
                .with_context(|| format!("parsing config file {path}"))?;
            info!(%path, "loaded configuration");
            Ok(config)
        }
        None => Ok(WorldConfig {
            max_ticks: DEMO_TICKS,
            ..WorldConfig::default()
        }),
    }
}

fn build_scene(world: &mut EntityManager) -> Result<()> {
    let ground = world.create_entity();
    world.add_component(ground, TransformComponent::IDENTITY)?;
    let floor = Aabb::new(Vec3::new(-50.0, -0.5, -50.0), Vec3::new(50.0, 0.0, 50.0));
    world.add_component(ground, BoundingBoxComponent::new(floor))?;
    world.add_component(ground, MeshComponent::default())?;
    world.add_tag(ground, EntityTag::Static)?;

    for i in 0..4u8 {
        let crate_box = world.create_entity();
        let x = f32::from(i) * 2.0;
        world.add_component(
            crate_box,
            TransformComponent::from_position(Vec3::new(x, 10.0, 0.0)),
        )?;
        world.add_component(
            crate_box,
            RigidBodyComponent {
                kind: BodyKind::Dynamic,
                ..RigidBodyComponent::default()
            },
        )?;
        world.add_component(crate_box, PhysicsMaterial::default())?;
        world.add_component(
            crate_box,
            BoundingBoxComponent::new(Aabb::from_center_extents(Vec3::ZERO, Vec3::splat(0.5))),
        )?;
        world.add_component(
            crate_box,
            MeshComponent {
                mesh_id: 1,
                material_id: u64::from(i),
                visible: true,
            },
        )?;
        world.add_tag(crate_box, EntityTag::Dynamic)?;
    }

    let speaker = world.create_entity();
    world.add_component(speaker, TransformComponent::from_position(Vec3::new(0.0, 1.0, 5.0)))?;
    world.add_component(
        speaker,
        AudioComponent {
            clip_id: 7,
            looping: true,
            playing: true,
            duration: 3.0,
            ..AudioComponent::default()
        },
    )?;

    info!(entities = world.entity_count(), "scene built");
    Ok(())
}

fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    info!("engine demo starting");

    let config = load_config()?;

    let registry = Arc::new(ComponentRegistry::new());
    register_builtin_components(&registry)?;

    let mut world = EntityManager::with_config(Arc::clone(&registry), &config);
    let handoff = RenderProxyHandoff::new();
    world.add_system(PhysicsSystem::new(EulerBackend::default()));
    world.add_system(BoundingBoxSystem::new());
    world.add_system(AudioSystem::new());
    world.add_system(RenderProxySystem::new(handoff.clone()));
    build_scene(&mut world)?;

    for (index, stage) in world.execution_stages().iter().enumerate() {
        info!(stage = index, systems = ?stage, "execution stage");
    }

    let mut tick_loop = TickLoop::new(config, world)?;
    let summary = tick_loop.run();
    let last_tick = tick_loop.tick_id();
    let world = tick_loop.into_world();

    if let Some(frame) = handoff.latest() {
        info!(
            tick_id = frame.tick_id,
            proxies = frame.proxies.len(),
            "last published render frame"
        );
    }
    info!(
        last_tick,
        entities = world.entity_count(),
        ticks = summary.ticks,
        failed_ticks = summary.failed_ticks,
        overruns = summary.overruns,
        "engine demo shut down"
    );
    Ok(())
}
