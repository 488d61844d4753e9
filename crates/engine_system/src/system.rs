//! The `System` trait and per-registration bookkeeping.
//!
//! A System is a unit of per-tick logic. It declares the component types it
//! touches once, through [`System::descriptors`], and the entity manager
//! caches that declaration for the System's whole registration. Matching
//! entities are reported through [`System::on_entity_added`] and
//! [`System::on_entity_removed`]; [`System::process`] runs once per tick.

use std::collections::BTreeSet;

use engine_component::{ComponentTypeId, DescriptorSet, Entity};

use crate::context::SystemContext;

/// Per-tick logic over entities matching a declared access pattern.
///
/// ```rust
/// # use engine_component::{Component, DescriptorSet, Entity};
/// # use engine_system::{System, SystemContext};
/// # #[derive(serde::Serialize, serde::Deserialize)] struct Health(f32);
/// # impl Component for Health { fn type_name() -> &'static str { "Health" } }
/// struct Regen;
///
/// impl System for Regen {
///     fn name(&self) -> &str {
///         "regen"
///     }
///
///     fn descriptors(&self) -> DescriptorSet {
///         DescriptorSet::new().write::<Health>()
///     }
///
///     fn process(&mut self, ctx: &SystemContext<'_>, delta: f32) -> anyhow::Result<()> {
///         let mut health = ctx.write::<Health>()?;
///         for (_, h) in health.iter_mut() {
///             h.0 += delta;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait System: Send {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Data access declaration. Called once at registration.
    fn descriptors(&self) -> DescriptorSet;

    /// An entity started carrying every required type.
    fn on_entity_added(&mut self, _entity: Entity) {}

    /// An entity stopped carrying every required type.
    fn on_entity_removed(&mut self, _entity: Entity) {}

    /// Run one tick. `Err` and panics are isolated to this System.
    ///
    /// # Errors
    ///
    /// Any error the System wants reported for this tick.
    fn process(&mut self, ctx: &SystemContext<'_>, delta: f32) -> anyhow::Result<()>;
}

/// Handle returned by `EntityManager::register_system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

impl std::fmt::Display for SystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// Lifecycle of a registered System.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    /// Descriptors are known; no tick has run it yet.
    Registered,
    /// Has been processed at least once.
    Active,
}

/// A registered System together with its cached declaration.
pub(crate) struct SystemSlot {
    pub(crate) id: SystemId,
    pub(crate) name: String,
    pub(crate) descriptors: DescriptorSet,
    pub(crate) required: BTreeSet<ComponentTypeId>,
    pub(crate) state: SystemState,
    pub(crate) system: Box<dyn System>,
}

impl SystemSlot {
    pub(crate) fn new(id: SystemId, system: Box<dyn System>) -> Self {
        let descriptors = system.descriptors();
        let required = descriptors.required_types();
        Self {
            id,
            name: system.name().to_string(),
            descriptors,
            required,
            state: SystemState::Registered,
            system,
        }
    }

    /// Whether an entity carrying exactly `attached` matches this System.
    /// A System with no required types matches nothing.
    pub(crate) fn matches(&self, attached: &BTreeSet<ComponentTypeId>) -> bool {
        !self.required.is_empty() && self.required.is_subset(attached)
    }

    pub(crate) fn requires(&self, type_id: ComponentTypeId) -> bool {
        self.required.contains(&type_id)
    }
}

impl std::fmt::Debug for SystemSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSlot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("descriptors", &self.descriptors.descriptors().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use engine_component::Component;

    use super::*;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Position;

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Velocity;

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    struct Probe(DescriptorSet);

    impl System for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn descriptors(&self) -> DescriptorSet {
            self.0.clone()
        }

        fn process(&mut self, _ctx: &SystemContext<'_>, _delta: f32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn attached(types: &[ComponentTypeId]) -> BTreeSet<ComponentTypeId> {
        types.iter().copied().collect()
    }

    #[test]
    fn test_slot_caches_declaration() {
        let slot = SystemSlot::new(
            SystemId(3),
            Box::new(Probe(
                DescriptorSet::new()
                    .write::<Position>()
                    .optional_read::<Velocity>(),
            )),
        );
        assert_eq!(slot.name, "probe");
        assert_eq!(slot.state, SystemState::Registered);
        assert!(slot.requires(Position::component_type_id()));
        assert!(!slot.requires(Velocity::component_type_id()));
    }

    #[test]
    fn test_matches_requires_every_required_type() {
        let slot = SystemSlot::new(
            SystemId(0),
            Box::new(Probe(DescriptorSet::new().read::<Position>().read::<Velocity>())),
        );
        let p = Position::component_type_id();
        let v = Velocity::component_type_id();
        assert!(!slot.matches(&attached(&[p])));
        assert!(slot.matches(&attached(&[p, v])));
        assert!(slot.matches(&attached(&[p, v, ComponentTypeId(77)])));
    }

    #[test]
    fn test_empty_required_set_matches_nothing() {
        let slot = SystemSlot::new(
            SystemId(0),
            Box::new(Probe(DescriptorSet::new().optional_read::<Position>())),
        );
        assert!(!slot.matches(&attached(&[Position::component_type_id()])));
        assert!(!slot.matches(&BTreeSet::new()));
    }

    #[test]
    fn test_system_id_display() {
        assert_eq!(SystemId(12).to_string(), "system#12");
    }
}
