//! Client-side reconciliation.
//!
//! Snapshots overwrite rather than diff, so applying one twice is the same
//! as applying it once and a lost snapshot is superseded by the next one
//! that touches the same components.

use kestrel_ecs::{Component, ComponentKind, EntityId, EntityKind, World};
use kestrel_net::{ChatBroadcast, Pong, ServerMessage, Snapshot};

/// Counts from one [`ClientReplica::apply_snapshot`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Server tick the snapshot was built at.
    pub tick: u64,
    /// Entities created locally because the server referenced them first.
    pub created: usize,
    /// Components attached for the first time.
    pub attached: usize,
    /// Components updated in place.
    pub updated: usize,
    /// Entities removed.
    pub removed: usize,
    /// Entries dropped: unknown tags, bad records, retired ids.
    pub skipped: usize,
}

/// What a server message did to the replica.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Handshake completed; the replica now knows its own entity.
    Welcome {
        /// The entity this client controls.
        entity: EntityId,
        /// Server ticks per second.
        tick_rate: u32,
    },
    /// A snapshot was folded in.
    Snapshot(ApplyStats),
    /// A dedicated destroy notice arrived.
    Destroyed {
        /// The entity named by the notice.
        entity: EntityId,
        /// `false` if it was already gone.
        removed: bool,
    },
    /// A chat line to display. Chat history itself replicates through the
    /// chat singleton's component.
    Chat(ChatBroadcast),
    /// Heartbeat reply.
    Pong(Pong),
}

/// A client's mirror of the server world.
#[derive(Debug, Default)]
pub struct ClientReplica {
    world: World,
    local_entity: Option<EntityId>,
    tick_rate: Option<u32>,
    last_tick: Option<u64>,
}

impl ClientReplica {
    /// Creates an empty replica awaiting its handshake.
    pub fn new() -> Self {
        Self::default()
    }

    /// The mirrored world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The entity this client controls, once the handshake has completed.
    pub fn local_entity(&self) -> Option<EntityId> {
        self.local_entity
    }

    /// Server tick rate from the handshake.
    pub fn tick_rate(&self) -> Option<u32> {
        self.tick_rate
    }

    /// Tick of the most recent snapshot applied.
    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Applies any server message.
    pub fn apply_message(&mut self, message: ServerMessage) -> Applied {
        match message {
            ServerMessage::FirstConnection(welcome) => {
                let entity = EntityId(welcome.entity_id);
                if self.local_entity.is_some() {
                    // A repeated handshake means a new session: the full
                    // snapshot that follows rebuilds the world from scratch.
                    tracing::info!(entity = %entity, "new session, clearing replica");
                    self.world = World::new();
                    self.last_tick = None;
                }
                self.local_entity = Some(entity);
                self.tick_rate = Some(welcome.tick_rate);
                tracing::info!(entity = %entity, tick_rate = welcome.tick_rate, "handshake complete");
                Applied::Welcome {
                    entity,
                    tick_rate: welcome.tick_rate,
                }
            }
            ServerMessage::Snapshot(snapshot) => Applied::Snapshot(self.apply_snapshot(&snapshot)),
            ServerMessage::EntityDestroyed(notice) => {
                let entity = EntityId(notice.entity_id);
                Applied::Destroyed {
                    entity,
                    removed: self.apply_destroyed(entity),
                }
            }
            ServerMessage::Chat(line) => Applied::Chat(line),
            ServerMessage::Pong(pong) => Applied::Pong(pong),
        }
    }

    /// Folds a snapshot into the local world: component updates first, then
    /// removals.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> ApplyStats {
        let mut stats = ApplyStats {
            tick: snapshot.tick,
            ..ApplyStats::default()
        };

        for update in &snapshot.components {
            let id = EntityId(update.e);
            let Some(kind) = ComponentKind::from_tag(update.t).filter(|k| k.is_networked()) else {
                tracing::warn!(entity = %id, tag = update.t, "snapshot names unknown component tag");
                stats.skipped += 1;
                continue;
            };

            if !self.world.entities().contains(id) {
                if self.world.register_entity(id, EntityKind::Replica).is_none() {
                    tracing::debug!(entity = %id, "update for retired entity ignored");
                    stats.skipped += 1;
                    continue;
                }
                stats.created += 1;
            }

            match self.world.component_mut(id, kind) {
                Some(mut existing) => match existing.apply_record(kind, &update.r) {
                    Ok(()) => stats.updated += 1,
                    Err(e) => {
                        tracing::warn!(entity = %id, component = kind.name(), error = %e, "bad component record");
                        stats.skipped += 1;
                    }
                },
                None => match Component::decode_record(kind, &update.r) {
                    Ok(component) => {
                        if self.world.insert_component(id, component).is_ok() {
                            stats.attached += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(entity = %id, component = kind.name(), error = %e, "bad component record");
                        stats.skipped += 1;
                    }
                },
            }
        }

        for &id in &snapshot.destroyed {
            if self.apply_destroyed(EntityId(id)) {
                stats.removed += 1;
            }
        }

        // Local change flags and lifecycle events mean nothing on a replica,
        // and nothing ticks its bus.
        self.world.take_updated();
        self.world.events_mut().clear();
        self.last_tick = Some(snapshot.tick);
        tracing::trace!(
            tick = stats.tick,
            created = stats.created,
            attached = stats.attached,
            updated = stats.updated,
            removed = stats.removed,
            skipped = stats.skipped,
            "snapshot applied"
        );
        stats
    }

    /// Removes `id` and all its components. Returns `false` if it was not
    /// present, which is normal when destroys arrive redundantly.
    pub fn apply_destroyed(&mut self, id: EntityId) -> bool {
        let removed = self.world.entities_mut().remove_entity(id).is_some();
        self.world.events_mut().clear();
        if removed && self.local_entity == Some(id) {
            tracing::info!(entity = %id, "controlled entity destroyed");
        }
        removed
    }
}

#[cfg(test)]
#[path = "replica_tests.rs"]
mod tests;
