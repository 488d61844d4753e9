//! The entity manager: one world's entities, components and Systems.
//!
//! All mutation happens on the owning thread. Adding or removing a component
//! notifies matching Systems synchronously, before the call returns. Other
//! threads mutate the world through a [`CommandSender`], whose commands are
//! applied at the start of the next [`EntityManager::update`].

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use engine_component::{
    Component, ComponentRegistry, ComponentTypeId, EcsError, Entity, EntityAllocator, EntityTag,
    ErasedContainer, TagMask,
};
use parking_lot::MappedRwLockReadGuard;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commands::{BoxedComponent, CommandQueue, CommandReport, CommandSender, EntityCommand};
use crate::config::{ExecutionMode, WorldConfig};
use crate::executor::{self, TickInputs, TickReport};
use crate::scheduler::{self, RegisteredSystem, Schedule};
use crate::storage::{ComponentRef, ComponentStorage};
use crate::system::{System, SystemId, SystemSlot, SystemState};

/// Per-entity bookkeeping, indexed by entity slot.
#[derive(Debug, Clone, Default)]
struct EntityRecord {
    components: BTreeSet<ComponentTypeId>,
    tags: TagMask,
}

/// One serialised component of a [`SerializedEntity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedComponent {
    /// Registered type id.
    pub type_id: ComponentTypeId,
    /// Payload produced by the type's registry serialise hook.
    pub data: Vec<u8>,
}

/// The serialisable components of one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEntity {
    /// Components in ascending type id order.
    pub components: Vec<SerializedComponent>,
}

/// Owner of one world's entities, component storage and Systems.
pub struct EntityManager {
    registry: Arc<ComponentRegistry>,
    allocator: EntityAllocator,
    records: Vec<EntityRecord>,
    storage: ComponentStorage,
    systems: Vec<SystemSlot>,
    next_system_id: u32,
    schedule: Option<Schedule>,
    commands: CommandQueue,
    sender: CommandSender,
    execution: ExecutionMode,
    tick_id: u64,
}

impl EntityManager {
    /// Create an empty world using the default [`WorldConfig`].
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self::with_config(registry, &WorldConfig::default())
    }

    /// Create an empty world.
    #[must_use]
    pub fn with_config(registry: Arc<ComponentRegistry>, config: &WorldConfig) -> Self {
        let commands = CommandQueue::with_capacity(config.command_capacity);
        let sender = commands.sender();
        Self {
            registry,
            allocator: EntityAllocator::new(),
            records: Vec::new(),
            storage: ComponentStorage::new(),
            systems: Vec::new(),
            next_system_id: 0,
            schedule: None,
            commands,
            sender,
            execution: config.execution,
            tick_id: 0,
        }
    }

    /// The component registry this world resolves type ids against.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Number of completed `update` calls.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Current System execution strategy.
    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution
    }

    /// Change the System execution strategy, effective next tick.
    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.execution = mode;
    }

    // ── Entities ──────────────────────────────────────────────────

    /// Allocate a new entity with no components.
    ///
    /// # Panics
    ///
    /// If more than `u32::MAX` entity slots have ever been allocated.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        let slot = entity.index() as usize;
        if slot >= self.records.len() {
            self.records.resize_with(slot + 1, EntityRecord::default);
        }
        self.records[slot] = EntityRecord::default();
        entity
    }

    /// Returns `true` if `entity` is live.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.allocator.live_count()
    }

    /// Live entities in slot order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.allocator.iter()
    }

    /// Remove `entity`: detach every component in ascending type id order,
    /// notifying Systems as each detach would, then free the identifier.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] if the entity is not live.
    pub fn remove_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        let slot = self.live_slot(entity)?;
        let attached: Vec<ComponentTypeId> =
            self.records[slot].components.iter().copied().collect();
        for type_id in attached {
            self.detach(entity, type_id);
        }
        self.records[slot] = EntityRecord::default();
        self.allocator.free(entity);
        Ok(())
    }

    /// Component types attached to `entity`, ascending. Empty if not live.
    #[must_use]
    pub fn component_types(&self, entity: Entity) -> Vec<ComponentTypeId> {
        self.live_slot(entity)
            .map(|slot| self.records[slot].components.iter().copied().collect())
            .unwrap_or_default()
    }

    fn live_slot(&self, entity: Entity) -> Result<usize, EcsError> {
        if self.allocator.is_alive(entity) {
            Ok(entity.index() as usize)
        } else {
            Err(EcsError::InvalidEntity(entity))
        }
    }

    fn component_name(&self, type_id: ComponentTypeId) -> String {
        self.registry
            .lookup(type_id)
            .map_or_else(|| type_id.to_string(), |iface| iface.name.to_string())
    }

    // ── Components ────────────────────────────────────────────────

    /// Attach `value` to `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] if the entity is not live,
    /// [`EcsError::DuplicateComponent`] if it already carries a `T` (the
    /// existing value is kept).
    pub fn add_component<T: Component>(&mut self, entity: Entity, value: T) -> Result<(), EcsError> {
        let slot = self.live_slot(entity)?;
        let type_id = T::component_type_id();
        if self.records[slot].components.contains(&type_id) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: T::type_name(),
            });
        }
        self.storage.typed_or_insert::<T>()?.insert(entity, value)?;
        self.attach(entity, type_id);
        Ok(())
    }

    /// Attach a type-erased component.
    ///
    /// # Errors
    ///
    /// As [`Self::add_component`].
    pub fn add_boxed_component(
        &mut self,
        entity: Entity,
        component: BoxedComponent,
    ) -> Result<(), EcsError> {
        let BoxedComponent {
            type_id,
            name,
            value,
            new_container,
        } = component;
        self.insert_erased(entity, type_id, name, value, new_container)
    }

    /// Attach a default-constructed component of a registered type.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredComponent`] if the registry does not know
    /// `type_id`, otherwise as [`Self::add_component`].
    pub fn add_default_component(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<(), EcsError> {
        let iface = self
            .registry
            .lookup(type_id)
            .ok_or(EcsError::UnregisteredComponent(type_id))?;
        self.insert_erased(entity, type_id, iface.name, iface.create_default(), || {
            iface.create_container()
        })
    }

    fn insert_erased(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        name: &'static str,
        value: Box<dyn Any + Send + Sync>,
        create: impl FnOnce() -> Box<dyn ErasedContainer>,
    ) -> Result<(), EcsError> {
        let slot = self.live_slot(entity)?;
        if self.records[slot].components.contains(&type_id) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: name,
            });
        }
        self.storage
            .erased_or_insert_with(type_id, create)
            .insert_any(entity, value)?;
        self.attach(entity, type_id);
        Ok(())
    }

    /// Detach and return the `T` of `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] if the entity is not live,
    /// [`EcsError::MissingComponent`] if it carries no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, EcsError> {
        let slot = self.live_slot(entity)?;
        let type_id = T::component_type_id();
        let missing = || EcsError::MissingComponent {
            entity,
            component: T::type_name().to_string(),
        };
        if !self.records[slot].components.contains(&type_id) {
            return Err(missing());
        }
        let value = self
            .storage
            .typed_mut::<T>()?
            .and_then(|container| container.take(entity))
            .ok_or_else(missing)?;
        self.detach(entity, type_id);
        Ok(value)
    }

    /// Detach a component by type id, dropping it.
    ///
    /// # Errors
    ///
    /// As [`Self::remove_component`].
    pub fn remove_component_by_id(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<(), EcsError> {
        let slot = self.live_slot(entity)?;
        if !self.records[slot].components.contains(&type_id) {
            return Err(EcsError::MissingComponent {
                entity,
                component: self.component_name(type_id),
            });
        }
        self.detach(entity, type_id);
        Ok(())
    }

    /// Shared borrow of the `T` of `entity`. `None` if the entity is not
    /// live or carries no `T`.
    #[must_use]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<ComponentRef<'_, T>> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        let container = self.storage.read::<T>().ok().flatten()?;
        MappedRwLockReadGuard::try_map(container, |c| c.get(entity)).ok()
    }

    /// Like [`Self::get_component`], reporting why the lookup failed.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] or [`EcsError::MissingComponent`].
    pub fn try_get_component<T: Component>(
        &self,
        entity: Entity,
    ) -> Result<ComponentRef<'_, T>, EcsError> {
        self.live_slot(entity)?;
        self.get_component::<T>(entity)
            .ok_or_else(|| EcsError::MissingComponent {
                entity,
                component: T::type_name().to_string(),
            })
    }

    /// Mutable borrow of the `T` of `entity`.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.allocator.is_alive(entity) {
            return None;
        }
        self.storage.typed_mut::<T>().ok().flatten()?.get_mut(entity)
    }

    /// Returns `true` if `entity` is live and carries a `T`.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.has_component_id(entity, T::component_type_id())
    }

    /// Returns `true` if `entity` is live and carries `type_id`.
    #[must_use]
    pub fn has_component_id(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.live_slot(entity)
            .is_ok_and(|slot| self.records[slot].components.contains(&type_id))
    }

    /// Record an attach and notify Systems that now match.
    fn attach(&mut self, entity: Entity, type_id: ComponentTypeId) {
        let record = &mut self.records[entity.index() as usize];
        record.components.insert(type_id);
        if let Some(tag) = EntityTag::from_component_type(type_id) {
            record.tags.insert(tag);
        }
        let record = &self.records[entity.index() as usize];
        for slot in &mut self.systems {
            if slot.requires(type_id) && slot.matches(&record.components) {
                slot.system.on_entity_added(entity);
            }
        }
    }

    /// Drop the stored value, record the detach and notify Systems that
    /// matched before it.
    fn detach(&mut self, entity: Entity, type_id: ComponentTypeId) {
        let index = entity.index() as usize;
        let losing: Vec<usize> = self
            .systems
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.requires(type_id) && slot.matches(&self.records[index].components)
            })
            .map(|(i, _)| i)
            .collect();

        if let Some(container) = self.storage.erased_mut(type_id) {
            container.remove(entity);
        }
        let record = &mut self.records[index];
        record.components.remove(&type_id);
        if let Some(tag) = EntityTag::from_component_type(type_id) {
            record.tags.remove(tag);
        }

        for i in losing {
            self.systems[i].system.on_entity_removed(entity);
        }
    }

    // ── Tags ──────────────────────────────────────────────────────

    /// Set `tag` on `entity`. Returns `false` if it was already set.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] if the entity is not live.
    pub fn add_tag(&mut self, entity: Entity, tag: EntityTag) -> Result<bool, EcsError> {
        let slot = self.live_slot(entity)?;
        if self.records[slot].tags.contains(tag) {
            return Ok(false);
        }
        let iface = tag.interface();
        self.insert_erased(
            entity,
            iface.type_id,
            iface.name,
            iface.create_default(),
            || iface.create_container(),
        )?;
        Ok(true)
    }

    /// Clear `tag` on `entity`. Returns `false` if it was not set.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] if the entity is not live.
    pub fn remove_tag(&mut self, entity: Entity, tag: EntityTag) -> Result<bool, EcsError> {
        let slot = self.live_slot(entity)?;
        if !self.records[slot].tags.contains(tag) {
            return Ok(false);
        }
        self.detach(entity, tag.component_type_id());
        Ok(true)
    }

    /// Returns `true` if `entity` is live and carries `tag`.
    #[must_use]
    pub fn has_tag(&self, entity: Entity, tag: EntityTag) -> bool {
        self.live_slot(entity)
            .is_ok_and(|slot| self.records[slot].tags.contains(tag))
    }

    /// Every tag of `entity`. Empty if not live.
    #[must_use]
    pub fn tags(&self, entity: Entity) -> TagMask {
        self.live_slot(entity)
            .map_or(TagMask::EMPTY, |slot| self.records[slot].tags)
    }

    /// Entities carrying `tag`, in storage order.
    #[must_use]
    pub fn entities_with_tag(&self, tag: EntityTag) -> Vec<Entity> {
        self.storage
            .erased(tag.component_type_id())
            .map(|container| container.entities().to_vec())
            .unwrap_or_default()
    }

    // ── Serialisation ─────────────────────────────────────────────

    /// Serialise every component of `entity` whose registration is flagged
    /// serialisable. Unregistered and non-serialisable types are skipped.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] if the entity is not live, or the first
    /// serialise hook failure.
    pub fn serialize_entity(&self, entity: Entity) -> Result<SerializedEntity, EcsError> {
        let slot = self.live_slot(entity)?;
        let mut components = Vec::new();
        for &type_id in &self.records[slot].components {
            let Some(iface) = self.registry.lookup(type_id) else {
                continue;
            };
            if !iface.is_serializable() {
                continue;
            }
            let Some(container) = self.storage.erased(type_id) else {
                continue;
            };
            let Some(value) = container.get_any(entity) else {
                continue;
            };
            components.push(SerializedComponent {
                type_id,
                data: iface.serialize(value)?,
            });
        }
        Ok(SerializedEntity { components })
    }

    /// Create a new entity from a [`SerializedEntity`]. On failure nothing
    /// is left behind.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredComponent`] for unknown type ids, or the first
    /// deserialise hook failure.
    pub fn deserialize_entity(&mut self, serialized: &SerializedEntity) -> Result<Entity, EcsError> {
        let entity = self.create_entity();
        if let Err(e) = self.restore_components(entity, serialized) {
            self.remove_entity(entity)?;
            return Err(e);
        }
        Ok(entity)
    }

    fn restore_components(
        &mut self,
        entity: Entity,
        serialized: &SerializedEntity,
    ) -> Result<(), EcsError> {
        for component in &serialized.components {
            let iface = self
                .registry
                .lookup(component.type_id)
                .ok_or(EcsError::UnregisteredComponent(component.type_id))?;
            let value = iface.deserialize(&component.data)?;
            self.insert_erased(entity, iface.type_id, iface.name, value, || {
                iface.create_container()
            })?;
        }
        Ok(())
    }

    // ── Systems ───────────────────────────────────────────────────

    /// Register a System. Entities that already match are reported through
    /// `on_entity_added` before this returns.
    pub fn register_system(&mut self, system: Box<dyn System>) -> SystemId {
        let id = SystemId(self.next_system_id);
        self.next_system_id += 1;
        let mut slot = SystemSlot::new(id, system);

        let mut matched = 0usize;
        for entity in self.allocator.iter() {
            if slot.matches(&self.records[entity.index() as usize].components) {
                slot.system.on_entity_added(entity);
                matched += 1;
            }
        }

        info!(
            system = %slot.name,
            %id,
            descriptors = slot.descriptors.descriptors().len(),
            matched,
            "registered system"
        );
        self.systems.push(slot);
        self.schedule = None;
        id
    }

    /// Register a System by value.
    pub fn add_system<S: System + 'static>(&mut self, system: S) -> SystemId {
        self.register_system(Box::new(system))
    }

    /// Remove a System between ticks, handing it back. No further callbacks
    /// reach it.
    pub fn unregister_system(&mut self, id: SystemId) -> Option<Box<dyn System>> {
        let pos = self.systems.iter().position(|slot| slot.id == id)?;
        let slot = self.systems.remove(pos);
        self.schedule = None;
        info!(system = %slot.name, %id, "unregistered system");
        Some(slot.system)
    }

    /// Number of registered Systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Lifecycle state of a System, or `None` once it is unregistered.
    #[must_use]
    pub fn system_state(&self, id: SystemId) -> Option<SystemState> {
        self.systems
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| slot.state)
    }

    fn ensure_schedule(&mut self) {
        if self.schedule.is_some() {
            return;
        }
        let registered: Vec<RegisteredSystem> = self
            .systems
            .iter()
            .map(|slot| RegisteredSystem {
                name: slot.name.clone(),
                descriptors: slot.descriptors.clone(),
            })
            .collect();
        let schedule = scheduler::compute_schedule(&registered);
        info!(
            tick_id = self.tick_id,
            stage_count = schedule.stages.len(),
            system_count = registered.len(),
            "recomputed execution schedule"
        );
        self.schedule = Some(schedule);
    }

    /// System names in sequential execution order.
    pub fn execution_order(&mut self) -> Vec<String> {
        self.ensure_schedule();
        self.schedule
            .as_ref()
            .map(|schedule| {
                schedule
                    .order
                    .iter()
                    .map(|&i| self.systems[i].name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// System names grouped by parallel stage.
    pub fn execution_stages(&mut self) -> Vec<Vec<String>> {
        self.ensure_schedule();
        self.schedule
            .as_ref()
            .map(|schedule| {
                schedule
                    .stages
                    .iter()
                    .map(|stage| {
                        stage
                            .system_indices
                            .iter()
                            .map(|&i| self.systems[i].name.clone())
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Commands & ticking ────────────────────────────────────────

    /// A handle for queuing structural changes from any thread.
    #[must_use]
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Number of commands waiting for the next tick.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Apply every queued command now. Failed commands are logged and
    /// counted.
    pub fn apply_commands(&mut self) -> CommandReport {
        let mut report = CommandReport::default();
        for command in self.commands.drain() {
            let kind = command.kind();
            match self.apply_command(command) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(command = kind, error = %e, "entity command failed");
                }
            }
        }
        report
    }

    fn apply_command(&mut self, command: EntityCommand) -> Result<(), EcsError> {
        match command {
            EntityCommand::Spawn(components) => {
                let entity = self.create_entity();
                for component in components {
                    self.add_boxed_component(entity, component)?;
                }
                Ok(())
            }
            EntityCommand::Despawn(entity) => self.remove_entity(entity),
            EntityCommand::AddComponent { entity, component } => {
                self.add_boxed_component(entity, component)
            }
            EntityCommand::RemoveComponent { entity, type_id } => {
                self.remove_component_by_id(entity, type_id)
            }
            EntityCommand::AddTag { entity, tag } => self.add_tag(entity, tag).map(|_| ()),
            EntityCommand::RemoveTag { entity, tag } => self.remove_tag(entity, tag).map(|_| ()),
        }
    }

    /// Run one tick: apply queued commands, then process every System in
    /// dependency order (or in parallel stages).
    pub fn update(&mut self, delta: f32) -> TickReport {
        self.tick_id += 1;
        let commands = self.apply_commands();
        self.ensure_schedule();

        let Some(schedule) = self.schedule.as_ref() else {
            return TickReport {
                tick_id: self.tick_id,
                commands,
                ..TickReport::default()
            };
        };

        debug!(
            tick_id = self.tick_id,
            delta,
            systems = schedule.len(),
            stages = schedule.stages.len(),
            "tick start"
        );

        let inputs = TickInputs {
            storage: &self.storage,
            commands: &self.sender,
            tick_id: self.tick_id,
            delta,
        };
        let failures = match self.execution {
            ExecutionMode::Sequential => {
                executor::run_sequential(&mut self.systems, schedule, &inputs)
            }
            ExecutionMode::Parallel { max_workers } => {
                executor::run_parallel(&mut self.systems, schedule, &inputs, max_workers)
            }
        };

        TickReport {
            tick_id: self.tick_id,
            executed: schedule.len(),
            failures,
            commands,
        }
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("entities", &self.allocator.live_count())
            .field("systems", &self.systems)
            .field("storage", &self.storage)
            .field("execution", &self.execution)
            .field("tick_id", &self.tick_id)
            .finish_non_exhaustive()
    }
}
