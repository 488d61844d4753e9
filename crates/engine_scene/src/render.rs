//! Render proxy collection: the hand-off from simulation to the renderer.
//!
//! [`RenderProxySystem`] reads meshes, transforms and bounds once all writer
//! Systems of the tick have finished (the scheduler orders writers of those
//! types first) and publishes an immutable [`RenderProxyFrame`] into a
//! [`RenderProxyHandoff`]. The renderer only ever sees a frame through an
//! `Arc`; a frame is never mutated after publication.

use std::sync::Arc;

use engine_component::{
    Component, DescriptorSet, Entity, EntityTag, UpdateRenderProxyTag,
};
use engine_system::{System, SystemContext};
use glam::Mat4;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bounds::{Aabb, BoundingBoxComponent};
use crate::transform::TransformComponent;

/// What to draw for an entity. Mesh and material are opaque renderer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshComponent {
    /// Renderer mesh handle.
    pub mesh_id: u64,
    /// Renderer material handle.
    pub material_id: u64,
    /// Hidden meshes produce no proxy.
    pub visible: bool,
}

impl Default for MeshComponent {
    fn default() -> Self {
        Self {
            mesh_id: 0,
            material_id: 0,
            visible: true,
        }
    }
}

impl Component for MeshComponent {
    fn type_name() -> &'static str {
        "MeshComponent"
    }
}

/// Everything the renderer needs to draw one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderProxy {
    /// Source entity.
    pub entity: Entity,
    /// Renderer mesh handle.
    pub mesh_id: u64,
    /// Renderer material handle.
    pub material_id: u64,
    /// Model matrix.
    pub model: Mat4,
    /// World-space bounds, [`Aabb::EMPTY`] if the entity has none.
    pub world_aabb: Aabb,
}

/// Immutable snapshot of every visible proxy for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderProxyFrame {
    /// Tick that produced the frame.
    pub tick_id: u64,
    /// Proxies in entity order.
    pub proxies: Vec<RenderProxy>,
}

impl RenderProxyFrame {
    /// The proxy of `entity`, if it was visible.
    #[must_use]
    pub fn proxy(&self, entity: Entity) -> Option<&RenderProxy> {
        self.proxies
            .binary_search_by_key(&entity, |p| p.entity)
            .ok()
            .map(|i| &self.proxies[i])
    }
}

/// Shared slot holding the latest published frame.
#[derive(Debug, Clone, Default)]
pub struct RenderProxyHandoff {
    latest: Arc<RwLock<Option<Arc<RenderProxyFrame>>>>,
}

impl RenderProxyHandoff {
    /// Create an empty hand-off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame.
    pub fn publish(&self, frame: RenderProxyFrame) {
        *self.latest.write() = Some(Arc::new(frame));
    }

    /// The latest frame, if any was published.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<RenderProxyFrame>> {
        self.latest.read().clone()
    }
}

/// Collects [`RenderProxy`] snapshots for entities with a mesh and transform.
#[derive(Debug)]
pub struct RenderProxySystem {
    handoff: RenderProxyHandoff,
    tracked: Vec<Entity>,
}

impl RenderProxySystem {
    /// Publish into `handoff`.
    #[must_use]
    pub fn new(handoff: RenderProxyHandoff) -> Self {
        Self {
            handoff,
            tracked: Vec::new(),
        }
    }
}

impl System for RenderProxySystem {
    fn name(&self) -> &str {
        "render_proxy"
    }

    fn descriptors(&self) -> DescriptorSet {
        DescriptorSet::new()
            .read::<MeshComponent>()
            .read::<TransformComponent>()
            .optional_read::<BoundingBoxComponent>()
            .optional_read::<UpdateRenderProxyTag>()
    }

    fn on_entity_added(&mut self, entity: Entity) {
        if let Err(pos) = self.tracked.binary_search(&entity) {
            self.tracked.insert(pos, entity);
        }
    }

    fn on_entity_removed(&mut self, entity: Entity) {
        if let Ok(pos) = self.tracked.binary_search(&entity) {
            self.tracked.remove(pos);
        }
    }

    fn process(&mut self, ctx: &SystemContext<'_>, _delta: f32) -> anyhow::Result<()> {
        let meshes = ctx.read::<MeshComponent>()?;
        let transforms = ctx.read::<TransformComponent>()?;
        let bounds = ctx.read::<BoundingBoxComponent>()?;
        let refresh = ctx.read::<UpdateRenderProxyTag>()?;

        let proxies: Vec<RenderProxy> = self
            .tracked
            .iter()
            .filter_map(|&entity| {
                let mesh = meshes.get(entity)?;
                let transform = transforms.get(entity)?;
                mesh.visible.then(|| RenderProxy {
                    entity,
                    mesh_id: mesh.mesh_id,
                    material_id: mesh.material_id,
                    model: transform.to_matrix(),
                    world_aabb: bounds.get(entity).map_or(Aabb::EMPTY, |b| b.world_aabb),
                })
            })
            .collect();

        for &entity in refresh.entities() {
            ctx.commands().remove_tag(entity, EntityTag::UpdateRenderProxy);
        }

        debug!(
            tick_id = ctx.tick_id(),
            proxies = proxies.len(),
            refreshed = refresh.len(),
            "published render proxies"
        );
        self.handoff.publish(RenderProxyFrame {
            tick_id: ctx.tick_id(),
            proxies,
        });
        Ok(())
    }
}
