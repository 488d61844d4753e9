//! # engine_system
//!
//! The "S" in ECS, plus the world that runs it.
//!
//! This crate provides:
//!
//! - [`EntityManager`]: owns one world's entities, component storage and
//!   Systems; notifies Systems synchronously as entities start or stop
//!   matching their required component set.
//! - [`System`]: per-tick logic declaring its data access through a
//!   [`DescriptorSet`](engine_component::DescriptorSet).
//! - [`SystemContext`]: the per-tick view handed to `System::process`, with
//!   declared-access-checked component borrows.
//! - [`compute_schedule`]: dependency ordering and conflict-free stages.
//! - [`CommandQueue`] / [`CommandSender`]: deferred, cross-thread entity
//!   mutation applied at the start of each tick.
//! - [`WorldConfig`]: tick rate and execution mode, loadable from TOML.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use engine_component::{Component, ComponentFlags, ComponentRegistry, DescriptorSet};
//! use engine_system::{EntityManager, System, SystemContext};
//!
//! #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
//! struct Spin(f32);
//!
//! impl Component for Spin {
//!     fn type_name() -> &'static str {
//!         "Spin"
//!     }
//! }
//!
//! struct Spinner;
//!
//! impl System for Spinner {
//!     fn name(&self) -> &str {
//!         "spinner"
//!     }
//!
//!     fn descriptors(&self) -> DescriptorSet {
//!         DescriptorSet::new().write::<Spin>()
//!     }
//!
//!     fn process(&mut self, ctx: &SystemContext<'_>, delta: f32) -> anyhow::Result<()> {
//!         for (_, spin) in ctx.write::<Spin>()?.iter_mut() {
//!             spin.0 += delta;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let registry = ComponentRegistry::new();
//! registry.register::<Spin>(ComponentFlags::SERIALIZABLE).unwrap();
//!
//! let mut world = EntityManager::new(Arc::new(registry));
//! world.add_system(Spinner);
//! let e = world.create_entity();
//! world.add_component(e, Spin(0.0)).unwrap();
//!
//! let report = world.update(0.5);
//! assert!(report.is_clean());
//! assert_eq!(world.get_component::<Spin>(e).unwrap().0, 0.5);
//! ```

pub mod commands;
pub mod config;
pub mod context;
pub mod executor;
pub mod manager;
pub mod scheduler;
pub mod storage;
pub mod system;

pub use commands::{BoxedComponent, CommandQueue, CommandReport, CommandSender, EntityCommand};
pub use config::{ConfigError, ExecutionMode, WorldConfig};
pub use context::{ComponentRead, ComponentWrite, SystemContext};
pub use executor::TickReport;
pub use manager::{EntityManager, SerializedComponent, SerializedEntity};
pub use scheduler::{RegisteredSystem, Schedule, Stage, compute_schedule};
pub use storage::{ComponentRef, ComponentStorage};
pub use system::{System, SystemId, SystemState};
