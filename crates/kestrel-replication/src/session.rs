//! Which connection controls which entity.

use kestrel_ecs::EntityId;
use kestrel_net::ConnectionId;
use rustc_hash::FxHashMap;

/// Two-way map between transport connections and controlled entities.
///
/// A connection is *open* from accept until disconnect and *attached* once
/// its handshake has produced an entity. Every client message other than the
/// handshake is attributed through [`SessionMap::entity_of`].
#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: FxHashMap<ConnectionId, Option<EntityId>>,
    by_entity: FxHashMap<EntityId, ConnectionId>,
}

impl SessionMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly accepted connection with no entity yet.
    pub fn open(&mut self, connection: ConnectionId) {
        self.sessions.entry(connection).or_insert(None);
    }

    /// Binds `connection` to `entity`, opening the session if needed.
    /// Returns the entity it previously controlled, if any.
    pub fn attach(&mut self, connection: ConnectionId, entity: EntityId) -> Option<EntityId> {
        let previous = self.sessions.insert(connection, Some(entity)).flatten();
        if let Some(old) = previous {
            self.by_entity.remove(&old);
        }
        self.by_entity.insert(entity, connection);
        previous
    }

    /// Closes the session. Returns the entity the connection controlled.
    pub fn detach(&mut self, connection: ConnectionId) -> Option<EntityId> {
        let entity = self.sessions.remove(&connection).flatten()?;
        self.by_entity.remove(&entity);
        Some(entity)
    }

    /// Drops the binding for an entity that no longer exists, keeping the
    /// connection open.
    pub fn release_entity(&mut self, entity: EntityId) -> Option<ConnectionId> {
        let connection = self.by_entity.remove(&entity)?;
        if let Some(slot) = self.sessions.get_mut(&connection) {
            *slot = None;
        }
        Some(connection)
    }

    /// Entity controlled by `connection`.
    pub fn entity_of(&self, connection: ConnectionId) -> Option<EntityId> {
        self.sessions.get(&connection).copied().flatten()
    }

    /// Connection controlling `entity`.
    pub fn connection_of(&self, entity: EntityId) -> Option<ConnectionId> {
        self.by_entity.get(&entity).copied()
    }

    /// Returns `true` if `connection` is open, attached or not.
    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.sessions.contains_key(&connection)
    }

    /// Attached connections, in id order.
    pub fn connections(&self) -> Vec<ConnectionId> {
        let mut attached: Vec<ConnectionId> = self.by_entity.values().copied().collect();
        attached.sort_unstable();
        attached
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no connection is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
