//! The [`World`] context object: registry plus event bus, passed explicitly to
//! every system and message handler.

use std::ops::{Deref, DerefMut};

use crate::catalogue::{Component, ComponentData, ComponentKind};
use crate::entity::{Entity, EntityId, EntityKind, EntityManager, LiveEntities, Slot};
use crate::events::{Event, EventBus};

/// Mutable access to a component that flags it as updated on first write.
///
/// Reading through a `Mut` does not mark anything; only `DerefMut` does.
pub struct Mut<'a, T> {
    value: &'a mut T,
    updated: &'a mut bool,
}

impl<T> Deref for Mut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> DerefMut for Mut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        *self.updated = true;
        self.value
    }
}

/// One simulation world: every entity, component and queued event.
#[derive(Debug, Default)]
pub struct World {
    entities: EntityManager,
    events: EventBus,
}

impl World {
    /// Creates an empty world at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick number.
    pub fn tick(&self) -> u64 {
        self.events.tick()
    }

    /// The entity registry.
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    /// Mutable registry access. Bypasses event emission.
    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mutable event bus access.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Snapshot of the live set.
    pub fn live_entities(&self) -> LiveEntities {
        self.entities.live_entities()
    }

    /// Creates an entity and queues [`Event::EntityCreated`].
    pub fn create_entity(&mut self, kind: EntityKind) -> Entity {
        let entity = self.entities.create_entity(kind);
        self.events.add_event(Event::EntityCreated {
            entity: entity.id,
            kind,
        });
        entity
    }

    /// Mirrors an externally issued id. See [`EntityManager::register_entity`].
    pub fn register_entity(&mut self, id: EntityId, kind: EntityKind) -> Option<Entity> {
        let entity = self.entities.register_entity(id, kind)?;
        self.events
            .add_event(Event::EntityCreated { entity: id, kind });
        Some(entity)
    }

    /// Requests destruction of `id` through the two-phase pipeline by queuing
    /// a network [`Event::EntityDestroyed`].
    ///
    /// Returns `false` (and queues nothing) if `id` is not live.
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get(id) else {
            tracing::debug!(entity = %id, "destroy requested for unknown entity");
            return false;
        };
        self.events.add_network_event(Event::EntityDestroyed {
            entity: id,
            kind: entity.kind,
        });
        true
    }

    /// Attaches `value` to `id`.
    ///
    /// A component of the same kind already present is replaced and returned
    /// as `Ok(Some(previous))`; [`Event::ComponentAdded`] is queued only when
    /// the kind was absent. Unknown entities give the value back as `Err`.
    pub fn insert<T: ComponentData>(&mut self, id: EntityId, value: T) -> Result<Option<T>, T> {
        if !self.entities.contains(id) {
            tracing::debug!(entity = %id, component = T::KIND.name(), "insert on unknown entity");
            return Err(value);
        }
        let previous = self
            .insert_component(id, value.into_component())
            .ok()
            .flatten();
        Ok(previous.and_then(T::from_component))
    }

    /// Untyped form of [`World::insert`].
    pub fn insert_component(
        &mut self,
        id: EntityId,
        component: Component,
    ) -> Result<Option<Component>, Component> {
        let kind = component.kind();
        let Some(components) = self.entities.components_mut(id) else {
            tracing::debug!(entity = %id, component = kind.name(), "insert on unknown entity");
            return Err(component);
        };
        let previous = components.insert(
            kind,
            Slot {
                component,
                updated: true,
            },
        );
        match previous {
            Some(slot) => Ok(Some(slot.component)),
            None => {
                self.events.add_event(Event::ComponentAdded {
                    entity: id,
                    component: kind,
                });
                Ok(None)
            }
        }
    }

    /// Shared access to a typed component.
    pub fn get<T: ComponentData>(&self, id: EntityId) -> Option<&T> {
        T::from_ref(&self.entities.slot(id, T::KIND)?.component)
    }

    /// Change-tracked mutable access to a typed component.
    pub fn get_mut<T: ComponentData>(&mut self, id: EntityId) -> Option<Mut<'_, T>> {
        let slot = self.entities.slot_mut(id, T::KIND)?;
        let value = T::from_mut(&mut slot.component)?;
        Some(Mut {
            value,
            updated: &mut slot.updated,
        })
    }

    /// Shared access to a component by kind.
    pub fn component(&self, id: EntityId, kind: ComponentKind) -> Option<&Component> {
        self.entities.slot(id, kind).map(|slot| &slot.component)
    }

    /// Change-tracked mutable access to a component by kind.
    pub fn component_mut(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
    ) -> Option<Mut<'_, Component>> {
        let slot = self.entities.slot_mut(id, kind)?;
        Some(Mut {
            value: &mut slot.component,
            updated: &mut slot.updated,
        })
    }

    /// Returns `true` if `id` has a component of `kind`.
    pub fn has(&self, id: EntityId, kind: ComponentKind) -> bool {
        self.entities.slot(id, kind).is_some()
    }

    /// Detaches a typed component and queues [`Event::ComponentRemoved`].
    pub fn remove<T: ComponentData>(&mut self, id: EntityId) -> Option<T> {
        let slot = self.entities.components_mut(id)?.remove(&T::KIND)?;
        self.events.add_event(Event::ComponentRemoved {
            entity: id,
            component: T::KIND,
        });
        T::from_component(slot.component)
    }

    /// Flags a component for the next snapshot without touching its value.
    pub fn mark_updated(&mut self, id: EntityId, kind: ComponentKind) -> bool {
        match self.entities.slot_mut(id, kind) {
            Some(slot) => {
                slot.updated = true;
                true
            }
            None => false,
        }
    }

    /// Networked components flagged since the last call, in (entity, kind)
    /// order. Flags on every component are reset.
    pub fn take_updated(&mut self) -> Vec<(EntityId, ComponentKind)> {
        self.entities.take_updated()
    }

    /// First entity in `entities` that carries a component of `kind`.
    pub fn get_first_entity_with_component(
        &self,
        entities: &LiveEntities,
        kind: ComponentKind,
    ) -> Option<Entity> {
        entities.iter().copied().find(|e| self.has(e.id, kind))
    }
}

/// Free-function form of [`World::get_first_entity_with_component`].
pub fn get_first_entity_with_component(
    world: &World,
    entities: &LiveEntities,
    kind: ComponentKind,
) -> Option<Entity> {
    world.get_first_entity_with_component(entities, kind)
}
