//! Per-tick event bus.
//!
//! Producers append [`Event`]s; consumers read them by [`EventKind`] without
//! knowing who produced them. Each queued event remembers the tick and
//! [`Stage`] it was produced in, and a reader at stage `r` of tick `T` sees an
//! event from `(t, s)` iff `t == T && s <= r` or `t + 1 == T && s > r`.
//!
//! So an event produced earlier in the system order reaches later systems in
//! the same tick, an event produced later reaches earlier systems on the next
//! tick, and every reader observes every event exactly once. Readers never
//! remove events; [`EventBus::end_tick`] discards what every stage has seen.

use crate::catalogue::ComponentKind;
use crate::entity::{EntityId, EntityKind};

/// Position within a tick. Ordering follows the scheduler's phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Inbound message handlers, before any system runs.
    Input,
    /// The `update` of the system at this index.
    System(u16),
    /// Destroy phase 1: components are stripped.
    Destroy,
    /// The `after_update` of the system at this index.
    AfterUpdate(u16),
    /// Destroy phase 2: entities are unregistered.
    Remove,
    /// Snapshot assembly.
    Output,
}

/// A typed occurrence within the simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An entity was registered.
    EntityCreated {
        /// The new entity.
        entity: EntityId,
        /// Its kind.
        kind: EntityKind,
    },
    /// An entity must be torn down. Doubles as the destroy request.
    EntityDestroyed {
        /// The doomed entity.
        entity: EntityId,
        /// Its kind, for receivers that no longer have it.
        kind: EntityKind,
    },
    /// A component kind was newly attached.
    ComponentAdded {
        /// Owner.
        entity: EntityId,
        /// What was attached.
        component: ComponentKind,
    },
    /// A component was explicitly detached.
    ComponentRemoved {
        /// Former owner.
        entity: EntityId,
        /// What was detached.
        component: ComponentKind,
    },
    /// A connection completed its handshake and now controls `entity`.
    PlayerJoined {
        /// Controlled entity.
        entity: EntityId,
        /// Transport connection id.
        connection: u64,
    },
    /// A connection went away.
    PlayerLeft {
        /// Formerly controlled entity.
        entity: EntityId,
        /// Transport connection id.
        connection: u64,
    },
    /// A chat line was posted.
    ChatPosted {
        /// The posting player's entity.
        entity: EntityId,
        /// Author display name.
        author: String,
        /// Message body.
        text: String,
    },
    /// A player asked to be respawned.
    RespawnRequested {
        /// The player's entity.
        entity: EntityId,
    },
}

/// Discriminant of [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`Event::EntityCreated`]
    EntityCreated,
    /// [`Event::EntityDestroyed`]
    EntityDestroyed,
    /// [`Event::ComponentAdded`]
    ComponentAdded,
    /// [`Event::ComponentRemoved`]
    ComponentRemoved,
    /// [`Event::PlayerJoined`]
    PlayerJoined,
    /// [`Event::PlayerLeft`]
    PlayerLeft,
    /// [`Event::ChatPosted`]
    ChatPosted,
    /// [`Event::RespawnRequested`]
    RespawnRequested,
}

impl Event {
    /// The discriminant of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::EntityCreated { .. } => EventKind::EntityCreated,
            Event::EntityDestroyed { .. } => EventKind::EntityDestroyed,
            Event::ComponentAdded { .. } => EventKind::ComponentAdded,
            Event::ComponentRemoved { .. } => EventKind::ComponentRemoved,
            Event::PlayerJoined { .. } => EventKind::PlayerJoined,
            Event::PlayerLeft { .. } => EventKind::PlayerLeft,
            Event::ChatPosted { .. } => EventKind::ChatPosted,
            Event::RespawnRequested { .. } => EventKind::RespawnRequested,
        }
    }

    /// The entity the event is about.
    pub fn entity(&self) -> EntityId {
        match self {
            Event::EntityCreated { entity, .. }
            | Event::EntityDestroyed { entity, .. }
            | Event::ComponentAdded { entity, .. }
            | Event::ComponentRemoved { entity, .. }
            | Event::PlayerJoined { entity, .. }
            | Event::PlayerLeft { entity, .. }
            | Event::ChatPosted { entity, .. }
            | Event::RespawnRequested { entity } => *entity,
        }
    }

    /// For wrapper events, the component kind they carry.
    pub fn wrapped_component(&self) -> Option<ComponentKind> {
        match self {
            Event::ComponentAdded { component, .. } | Event::ComponentRemoved { component, .. } => {
                Some(*component)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    event: Event,
    tick: u64,
    stage: Stage,
    network: bool,
}

impl QueuedEvent {
    fn visible_at(&self, tick: u64, stage: Stage) -> bool {
        (self.tick == tick && self.stage <= stage)
            || (self.tick.wrapping_add(1) == tick && self.stage > stage)
    }
}

/// Queue of events for the current and previous tick.
#[derive(Debug)]
pub struct EventBus {
    queue: Vec<QueuedEvent>,
    tick: u64,
    stage: Stage,
}

impl EventBus {
    /// Creates an empty bus positioned at tick 0, [`Stage::Input`].
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            tick: 0,
            stage: Stage::Input,
        }
    }

    /// Current tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Moves the read/write cursor. Called by the scheduler between phases.
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// Appends to the current tick's queue.
    pub fn add_event(&mut self, event: Event) {
        self.push(event, false);
    }

    /// Appends to the current tick's queue and flags the event for the
    /// outgoing snapshot.
    pub fn add_network_event(&mut self, event: Event) {
        self.push(event, true);
    }

    fn push(&mut self, event: Event, network: bool) {
        tracing::trace!(kind = ?event.kind(), entity = %event.entity(), network, stage = ?self.stage, "event queued");
        self.queue.push(QueuedEvent {
            event,
            tick: self.tick,
            stage: self.stage,
            network,
        });
    }

    fn visible(&self) -> impl Iterator<Item = &QueuedEvent> {
        let (tick, stage) = (self.tick, self.stage);
        self.queue.iter().filter(move |q| q.visible_at(tick, stage))
    }

    /// Events of exactly `kind` visible at the current stage, in insertion
    /// order.
    pub fn get_events(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.visible()
            .map(|q| &q.event)
            .filter(move |e| e.kind() == kind)
    }

    /// Events of `wrapper` kind whose carried component kind is `payload`,
    /// e.g. "a Damage component was added".
    pub fn get_events_wrapped(
        &self,
        wrapper: EventKind,
        payload: ComponentKind,
    ) -> impl Iterator<Item = &Event> {
        self.get_events(wrapper)
            .filter(move |e| e.wrapped_component() == Some(payload))
    }

    /// Network-flagged events visible at the current stage.
    pub fn network_events(&self) -> impl Iterator<Item = &Event> {
        self.visible().filter(|q| q.network).map(|q| &q.event)
    }

    /// Number of events still queued, across both retained ticks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Closes the current tick: drops events from earlier ticks, advances the
    /// tick counter and rewinds the cursor to [`Stage::Input`].
    pub fn end_tick(&mut self) {
        let finished = self.tick;
        self.queue.retain(|q| q.tick == finished);
        self.tick = self.tick.wrapping_add(1);
        self.stage = Stage::Input;
    }

    /// Drops every queued event without advancing the tick. For worlds that
    /// are never scheduled, such as a client's mirror.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destroyed(id: u64) -> Event {
        Event::EntityDestroyed {
            entity: EntityId(id),
            kind: EntityKind::Npc,
        }
    }

    #[test]
    fn test_events_returned_in_insertion_order() {
        let mut bus = EventBus::new();
        bus.add_event(destroyed(3));
        bus.add_event(Event::RespawnRequested {
            entity: EntityId(9),
        });
        bus.add_event(destroyed(1));

        let ids: Vec<u64> = bus
            .get_events(EventKind::EntityDestroyed)
            .map(|e| e.entity().0)
            .collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_readers_do_not_consume() {
        let mut bus = EventBus::new();
        bus.add_event(destroyed(1));
        assert_eq!(bus.get_events(EventKind::EntityDestroyed).count(), 1);
        assert_eq!(bus.get_events(EventKind::EntityDestroyed).count(), 1);
    }

    #[test]
    fn test_wrapped_filter_by_payload() {
        let mut bus = EventBus::new();
        bus.add_event(Event::ComponentAdded {
            entity: EntityId(5),
            component: ComponentKind::Damage,
        });
        bus.add_event(Event::ComponentAdded {
            entity: EntityId(6),
            component: ComponentKind::Health,
        });
        bus.add_event(Event::ComponentRemoved {
            entity: EntityId(7),
            component: ComponentKind::Damage,
        });

        let added: Vec<u64> = bus
            .get_events_wrapped(EventKind::ComponentAdded, ComponentKind::Damage)
            .map(|e| e.entity().0)
            .collect();
        assert_eq!(added, vec![5]);
    }

    #[test]
    fn test_network_flag() {
        let mut bus = EventBus::new();
        bus.add_event(destroyed(1));
        bus.add_network_event(destroyed(2));

        let net: Vec<u64> = bus.network_events().map(|e| e.entity().0).collect();
        assert_eq!(net, vec![2]);
        assert_eq!(bus.get_events(EventKind::EntityDestroyed).count(), 2);
    }

    #[test]
    fn test_earlier_producer_visible_to_later_reader_same_tick() {
        let mut bus = EventBus::new();
        bus.set_stage(Stage::System(0));
        bus.add_event(destroyed(1));

        bus.set_stage(Stage::System(1));
        assert_eq!(bus.get_events(EventKind::EntityDestroyed).count(), 1);
    }

    #[test]
    fn test_later_producer_visible_to_earlier_reader_next_tick_only() {
        let mut bus = EventBus::new();
        bus.set_stage(Stage::System(0));
        assert_eq!(bus.get_events(EventKind::EntityDestroyed).count(), 0);
        bus.set_stage(Stage::System(1));
        bus.add_event(destroyed(1));
        bus.end_tick();

        bus.set_stage(Stage::System(0));
        assert_eq!(bus.get_events(EventKind::EntityDestroyed).count(), 1);
        // The producer itself already saw it last tick.
        bus.set_stage(Stage::System(1));
        assert_eq!(bus.get_events(EventKind::EntityDestroyed).count(), 0);
    }

    #[test]
    fn test_each_stage_sees_event_exactly_once() {
        let stages = [
            Stage::Input,
            Stage::System(0),
            Stage::System(1),
            Stage::System(2),
            Stage::Destroy,
            Stage::AfterUpdate(0),
            Stage::Remove,
            Stage::Output,
        ];
        for producer in stages {
            let mut bus = EventBus::new();
            let mut seen = vec![0usize; stages.len()];
            for tick in 0..3 {
                for (i, &stage) in stages.iter().enumerate() {
                    bus.set_stage(stage);
                    if tick == 0 && stage == producer {
                        bus.add_event(destroyed(1));
                    }
                    seen[i] += bus.get_events(EventKind::EntityDestroyed).count();
                }
                bus.end_tick();
            }
            assert!(
                seen.iter().all(|&n| n == 1),
                "producer {producer:?}: {seen:?}"
            );
        }
    }

    #[test]
    fn test_clear_keeps_tick_position() {
        let mut bus = EventBus::new();
        bus.end_tick();
        bus.add_event(destroyed(1));
        bus.add_network_event(destroyed(2));
        bus.clear();
        assert!(bus.is_empty());
        assert_eq!(bus.tick(), 1);
    }

    #[test]
    fn test_end_tick_discards_after_full_rotation() {
        let mut bus = EventBus::new();
        bus.add_event(destroyed(1));
        bus.end_tick();
        assert_eq!(bus.len(), 1);
        bus.end_tick();
        assert!(bus.is_empty());
        assert_eq!(bus.tick(), 2);
        assert_eq!(bus.stage(), Stage::Input);
    }
}
