//! Deferred entity mutation for code that does not own the entity manager.
//!
//! Systems running on worker threads (and any other thread holding a
//! [`CommandSender`]) must not create or destroy entities directly. They
//! enqueue an [`EntityCommand`] instead; the owning thread drains the queue at
//! the start of the next `EntityManager::update`, before any System runs.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use engine_component::{
    Component, ComponentContainer, ComponentTypeId, Entity, EntityTag, ErasedContainer,
};
use parking_lot::Mutex;

/// A component value with its type erased, ready to be attached later.
pub struct BoxedComponent {
    pub(crate) type_id: ComponentTypeId,
    pub(crate) name: &'static str,
    pub(crate) value: Box<dyn Any + Send + Sync>,
    pub(crate) new_container: fn() -> Box<dyn ErasedContainer>,
}

impl BoxedComponent {
    /// Box `value`.
    #[must_use]
    pub fn new<T: Component>(value: T) -> Self {
        Self {
            type_id: T::component_type_id(),
            name: T::type_name(),
            value: Box::new(value),
            new_container: || Box::new(ComponentContainer::<T>::new()),
        }
    }

    /// Type id of the boxed value.
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// Component name of the boxed value.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for BoxedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedComponent")
            .field("type_id", &self.type_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One deferred mutation.
#[derive(Debug)]
pub enum EntityCommand {
    /// Create an entity and attach the given components in order.
    Spawn(Vec<BoxedComponent>),
    /// Remove an entity and all of its components.
    Despawn(Entity),
    /// Attach a component.
    AddComponent {
        /// Target entity.
        entity: Entity,
        /// Value to attach.
        component: BoxedComponent,
    },
    /// Detach a component by type id.
    RemoveComponent {
        /// Target entity.
        entity: Entity,
        /// Type to detach.
        type_id: ComponentTypeId,
    },
    /// Attach a tag.
    AddTag {
        /// Target entity.
        entity: Entity,
        /// Tag to set.
        tag: EntityTag,
    },
    /// Detach a tag.
    RemoveTag {
        /// Target entity.
        entity: Entity,
        /// Tag to clear.
        tag: EntityTag,
    },
}

impl EntityCommand {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            EntityCommand::Spawn(_) => "spawn",
            EntityCommand::Despawn(_) => "despawn",
            EntityCommand::AddComponent { .. } => "add_component",
            EntityCommand::RemoveComponent { .. } => "remove_component",
            EntityCommand::AddTag { .. } => "add_tag",
            EntityCommand::RemoveTag { .. } => "remove_tag",
        }
    }
}

type Shared = Arc<Mutex<VecDeque<EntityCommand>>>;

/// The receiving end, owned by the entity manager.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Shared,
}

impl CommandQueue {
    /// Create an empty queue with room for `capacity` commands.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// A new sending handle.
    #[must_use]
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            pending: Arc::clone(&self.pending),
        }
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Take every queued command in submission order.
    pub fn drain(&self) -> Vec<EntityCommand> {
        self.pending.lock().drain(..).collect()
    }
}

/// Cloneable, thread-safe handle for enqueuing commands.
#[derive(Debug, Clone)]
pub struct CommandSender {
    pending: Shared,
}

impl CommandSender {
    /// Enqueue a raw command.
    pub fn push(&self, command: EntityCommand) {
        self.pending.lock().push_back(command);
    }

    /// Create an entity carrying `components`.
    pub fn spawn(&self, components: Vec<BoxedComponent>) {
        self.push(EntityCommand::Spawn(components));
    }

    /// Remove `entity`.
    pub fn despawn(&self, entity: Entity) {
        self.push(EntityCommand::Despawn(entity));
    }

    /// Attach `value` to `entity`.
    pub fn add_component<T: Component>(&self, entity: Entity, value: T) {
        self.push(EntityCommand::AddComponent {
            entity,
            component: BoxedComponent::new(value),
        });
    }

    /// Detach `T` from `entity`.
    pub fn remove_component<T: Component>(&self, entity: Entity) {
        self.push(EntityCommand::RemoveComponent {
            entity,
            type_id: T::component_type_id(),
        });
    }

    /// Set `tag` on `entity`.
    pub fn add_tag(&self, entity: Entity, tag: EntityTag) {
        self.push(EntityCommand::AddTag { entity, tag });
    }

    /// Clear `tag` on `entity`.
    pub fn remove_tag(&self, entity: Entity, tag: EntityTag) {
        self.push(EntityCommand::RemoveTag { entity, tag });
    }
}

/// Outcome of draining the queue once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandReport {
    /// Commands applied successfully.
    pub applied: usize,
    /// Commands that failed and were logged.
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Name(String);

    impl Component for Name {
        fn type_name() -> &'static str {
            "Name"
        }
    }

    #[test]
    fn test_drain_preserves_submission_order() {
        let queue = CommandQueue::with_capacity(4);
        let sender = queue.sender();
        let e = Entity::new(1, 1);
        sender.add_tag(e, EntityTag::Dynamic);
        sender.despawn(e);
        sender.remove_component::<Name>(e);

        assert_eq!(queue.len(), 3);
        let kinds: Vec<_> = queue.drain().iter().map(EntityCommand::kind).collect();
        assert_eq!(kinds, vec!["add_tag", "despawn", "remove_component"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_senders_from_many_threads() {
        let queue = CommandQueue::default();
        std::thread::scope(|s| {
            for i in 0..4u32 {
                let sender = queue.sender();
                s.spawn(move || {
                    for j in 0..25u32 {
                        sender.despawn(Entity::new(i * 100 + j, 1));
                    }
                });
            }
        });
        assert_eq!(queue.drain().len(), 100);
    }

    #[test]
    fn test_boxed_component_keeps_type() {
        let boxed = BoxedComponent::new(Name("crate".into()));
        assert_eq!(boxed.type_id(), Name::component_type_id());
        assert_eq!(boxed.name(), "Name");
        assert_eq!(
            boxed.value.downcast_ref::<Name>(),
            Some(&Name("crate".into()))
        );
        assert_eq!((boxed.new_container)().component_type(), boxed.type_id());
    }
}
