//! Fixed-order tick scheduler and the two-phase destroy pipeline.
//!
//! One tick runs, in order:
//!
//! 1. every system's [`System::update`], in registration order
//! 2. destroy phase 1: entities named by visible [`Event::EntityDestroyed`]
//!    events lose all their components but stay registered
//! 3. every system's [`System::after_update`]
//! 4. destroy phase 2: the emptied entities are unregistered
//! 5. the output hook (snapshot assembly), given the entities removed in 4
//!
//! Structural removal therefore never happens while a system could still be
//! iterating the entities it captured for the tick. A destroy requested from
//! `after_update` is seen by phase 1 of the next tick and reported then.

use rustc_hash::FxHashSet;

use crate::entity::{Entity, EntityId, LiveEntities};
use crate::events::{Event, EventKind, Stage};
use crate::world::World;

/// A simulation system. Systems contain their own failures: nothing a system
/// does for one entity may abort the tick for the others.
pub trait System: Send {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Main per-tick work.
    fn update(&mut self, world: &mut World, entities: &LiveEntities);

    /// Runs after destroy phase 1, when destroyed entities are empty but
    /// still registered.
    fn after_update(&mut self, _world: &mut World, _entities: &LiveEntities) {}
}

/// Entities being torn down this tick. Owned and cleared by the scheduler.
#[derive(Debug, Default)]
pub struct DestroyQueue {
    seen: FxHashSet<EntityId>,
    pending: Vec<EntityId>,
}

impl DestroyQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: strips the components of every entity named by a visible
    /// destroy event, once per id per tick. Returns how many were stripped.
    pub fn strip(&mut self, world: &mut World) -> usize {
        let requested: Vec<EntityId> = world
            .events()
            .get_events(EventKind::EntityDestroyed)
            .map(Event::entity)
            .collect();

        let mut stripped = 0;
        for id in requested {
            if !self.seen.insert(id) {
                continue;
            }
            if !world.entities().contains(id) {
                tracing::trace!(entity = %id, "destroy for entity already gone");
                continue;
            }
            let removed = world.entities_mut().strip_components(id);
            tracing::debug!(entity = %id, components = removed, "entity stripped");
            self.pending.push(id);
            stripped += 1;
        }
        stripped
    }

    /// Phase 2: unregisters everything stripped this tick. Returns the
    /// entities actually removed, each once.
    pub fn remove(&mut self, world: &mut World) -> Vec<Entity> {
        self.pending
            .drain(..)
            .filter_map(|id| world.entities_mut().remove_entity(id))
            .collect()
    }

    /// Forgets this tick's bookkeeping.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.pending.clear();
    }

    /// Entities stripped and awaiting removal.
    pub fn pending(&self) -> &[EntityId] {
        &self.pending
    }
}

/// Summary of one executed tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that ran.
    pub tick: u64,
    /// Number of systems invoked.
    pub systems_run: usize,
    /// Entities removed from the registry this tick.
    pub destroyed: Vec<EntityId>,
}

/// Runs registered systems in a fixed order, one tick at a time.
pub struct TickScheduler {
    systems: Vec<Box<dyn System>>,
    destroy: DestroyQueue,
}

impl TickScheduler {
    /// Creates a scheduler with no systems.
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            destroy: DestroyQueue::new(),
        }
    }

    /// Appends a system. Registration order is execution order.
    pub fn add_system(&mut self, system: Box<dyn System>) {
        tracing::debug!(system = system.name(), index = self.systems.len(), "system registered");
        self.systems.push(system);
    }

    /// Names of registered systems in execution order.
    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    /// Runs one tick with no output hook.
    pub fn run_tick(&mut self, world: &mut World) -> TickReport {
        self.run_tick_with(world, |_, _| {})
    }

    /// Runs one tick and invokes `output` at [`Stage::Output`], before the
    /// tick's events are retired. `output` also receives the entities
    /// unregistered by this tick's destroy phase 2.
    pub fn run_tick_with(
        &mut self,
        world: &mut World,
        output: impl FnOnce(&mut World, &[Entity]),
    ) -> TickReport {
        let tick = world.tick();
        let entities = world.live_entities();
        let span = tracing::trace_span!("tick", tick, entities = entities.len());
        let _guard = span.enter();

        for (index, system) in self.systems.iter_mut().enumerate() {
            world.events_mut().set_stage(Stage::System(stage_index(index)));
            system.update(world, &entities);
        }

        world.events_mut().set_stage(Stage::Destroy);
        self.destroy.strip(world);

        for (index, system) in self.systems.iter_mut().enumerate() {
            world
                .events_mut()
                .set_stage(Stage::AfterUpdate(stage_index(index)));
            system.after_update(world, &entities);
        }

        world.events_mut().set_stage(Stage::Remove);
        let removed = self.destroy.remove(world);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "entities removed");
        }

        world.events_mut().set_stage(Stage::Output);
        output(world, &removed);

        self.destroy.clear();
        world.events_mut().end_tick();

        TickReport {
            tick,
            systems_run: self.systems.len(),
            destroyed: removed.iter().map(|e| e.id).collect(),
        }
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn stage_index(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
