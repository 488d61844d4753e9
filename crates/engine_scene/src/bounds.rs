//! Axis-aligned bounding boxes and the System that keeps them in world space.

use std::collections::HashMap;

use engine_component::{Component, DescriptorSet, Entity, EntityTag, UpdateAabbTag};
use engine_system::{System, SystemContext};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transform::TransformComponent;

/// An axis-aligned box. [`Aabb::EMPTY`] contains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// The empty box; the identity for [`Aabb::union`].
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Box spanning `min..=max`.
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box centred on `center` with half-size `extents`.
    #[must_use]
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self::new(center - extents, center + extents)
    }

    /// Returns `false` for [`Aabb::EMPTY`] and other inverted boxes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-size on each axis.
    #[must_use]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Grow to include `point`.
    #[must_use]
    pub fn including(self, point: Vec3) -> Self {
        Self::new(self.min.min(point), self.max.max(point))
    }

    /// Smallest box containing both.
    #[must_use]
    pub fn union(self, other: Aabb) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Returns `true` if `point` lies inside or on the boundary.
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// The eight corners.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after applying `matrix`.
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if !self.is_valid() {
            return *self;
        }
        self.corners()
            .into_iter()
            .fold(Aabb::EMPTY, |acc, c| acc.including(matrix.transform_point3(c)))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Local-space bounds of an entity and their cached world-space image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxComponent {
    /// Bounds in the entity's local space.
    pub local_aabb: Aabb,
    /// `local_aabb` under the entity's transform, as of the last update.
    pub world_aabb: Aabb,
}

impl BoundingBoxComponent {
    /// Bounds with `local` in local space and no world image yet.
    #[must_use]
    pub fn new(local: Aabb) -> Self {
        Self {
            local_aabb: local,
            world_aabb: Aabb::EMPTY,
        }
    }
}

impl Component for BoundingBoxComponent {
    fn type_name() -> &'static str {
        "BoundingBoxComponent"
    }
}

/// Keeps `world_aabb` in step with the transform.
///
/// An entity is recomputed when it first matches, when its transform differs
/// from the one used last time, or when it is tagged
/// [`EntityTag::UpdateAabb`] (e.g. after its local bounds were edited). The
/// tag is cleared and every recomputed entity is tagged
/// [`EntityTag::UpdateRenderProxy`].
#[derive(Debug, Default)]
pub struct BoundingBoxSystem {
    tracked: Vec<Entity>,
    seen: HashMap<Entity, TransformComponent>,
}

impl BoundingBoxSystem {
    /// Create the System.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for BoundingBoxSystem {
    fn name(&self) -> &str {
        "bounding_box"
    }

    fn descriptors(&self) -> DescriptorSet {
        DescriptorSet::new()
            .read::<TransformComponent>()
            .write::<BoundingBoxComponent>()
            .optional_read::<UpdateAabbTag>()
    }

    fn on_entity_added(&mut self, entity: Entity) {
        self.tracked.push(entity);
    }

    fn on_entity_removed(&mut self, entity: Entity) {
        if let Some(pos) = self.tracked.iter().position(|e| *e == entity) {
            self.tracked.swap_remove(pos);
        }
        self.seen.remove(&entity);
    }

    fn process(&mut self, ctx: &SystemContext<'_>, _delta: f32) -> anyhow::Result<()> {
        let dirty = ctx.read::<UpdateAabbTag>()?;
        let transforms = ctx.read::<TransformComponent>()?;
        let mut boxes = ctx.write::<BoundingBoxComponent>()?;

        let mut updated = 0usize;
        for &entity in &self.tracked {
            let (Some(transform), Some(bounds)) = (transforms.get(entity), boxes.get_mut(entity))
            else {
                continue;
            };
            if !dirty.contains(entity) && self.seen.get(&entity) == Some(transform) {
                continue;
            }
            bounds.world_aabb = bounds.local_aabb.transformed(&transform.to_matrix());
            self.seen.insert(entity, *transform);
            ctx.commands().add_tag(entity, EntityTag::UpdateRenderProxy);
            updated += 1;
        }
        for &entity in dirty.entities() {
            ctx.commands().remove_tag(entity, EntityTag::UpdateAabb);
        }

        if updated > 0 {
            debug!(tick_id = ctx.tick_id(), updated, "recomputed world bounds");
        }
        Ok(())
    }
}
