//! # engine_component
//!
//! The "C" in ECS: what a component is, how one component type is stored,
//! and how Systems declare which component types they touch.
//!
//! This crate provides:
//!
//! - [`Component`] trait and the stable [`ComponentTypeId`].
//! - [`Entity`]: generational identifiers, and [`EntityAllocator`].
//! - [`ComponentContainer`]: sparse-set storage for one component type.
//! - [`ComponentRegistry`]: runtime catalog of component types.
//! - [`DescriptorSet`]: declarative read/write access requirements.
//! - [`EntityTag`] / [`TagComponent`]: zero-sized filter markers.
//! - [`EcsError`]: the error taxonomy shared by the ECS crates.

pub mod component;
pub mod container;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod registry;
pub mod tag;

pub use component::{Component, ComponentTypeId};
pub use container::{ComponentContainer, ErasedContainer};
pub use descriptor::{AccessMode, ComponentDescriptor, DescriptorSet};
pub use entity::{Entity, EntityAllocator};
pub use error::{EcsError, SystemProcessError};
pub use registry::{ComponentFlags, ComponentInterface, ComponentRegistry};
pub use tag::{
    DynamicTag, EditorFocusedTag, EntityTag, LightmapElementTag, StaticTag, TagComponent, TagMask,
    UpdateAabbTag, UpdateRenderProxyTag, UpdateVisibilityTag,
};
