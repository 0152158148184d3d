//! Entity identifiers, the entity registry, and per-tick live-entity views.
//!
//! An entity is an opaque [`EntityId`] plus whatever components are attached
//! to it. [`EntityManager`] owns both the live set and the component storage
//! so that removing an entity always detaches its components first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::catalogue::{Component, ComponentKind};

/// Opaque entity identifier. Issued once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse classification recorded when an entity is created.
///
/// Carried on destroy notifications so receivers can log or filter without
/// inspecting components that are already gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityKind {
    /// A connection's controlled entity.
    Player = 0,
    /// Server-driven actor.
    Npc = 1,
    /// Short-lived moving entity.
    Projectile = 2,
    /// Collectible item.
    Pickup = 3,
    /// One-per-world entity (chat log, match state).
    Singleton = 4,
    /// Client-side mirror of a server entity whose kind was not transmitted.
    Replica = 5,
}

impl EntityKind {
    /// Wire tag for this kind.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag. Unknown tags map to [`EntityKind::Replica`].
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Player,
            1 => Self::Npc,
            2 => Self::Projectile,
            3 => Self::Pickup,
            4 => Self::Singleton,
            _ => Self::Replica,
        }
    }
}

/// A live entity handle. Entities have no fields of their own beyond the id
/// and the kind they were created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    /// Registry-assigned identifier.
    pub id: EntityId,
    /// Kind recorded at creation.
    pub kind: EntityKind,
}

/// One attached component plus its "changed since last snapshot" flag.
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) component: Component,
    pub(crate) updated: bool,
}

#[derive(Debug)]
struct EntityRecord {
    kind: EntityKind,
    mirrored: bool,
    components: BTreeMap<ComponentKind, Slot>,
}

/// Mirrored ids that have been removed.
///
/// Every id up to `floor` was mirrored at some point, so one of those is
/// retired exactly when it is no longer live. Only retired ids beyond the
/// floor are stored; the floor advances over any run of ids that are retired
/// or mirrored and live. Issuers hand out ids in order, so the stored set
/// stays small unless an id is never mirrored at all.
#[derive(Debug, Default)]
struct RetiredIds {
    floor: u64,
    above: BTreeSet<u64>,
}

impl RetiredIds {
    fn contains(&self, id: EntityId, live: &FxHashMap<EntityId, EntityRecord>) -> bool {
        if id.0 <= self.floor {
            !live.contains_key(&id)
        } else {
            self.above.contains(&id.0)
        }
    }

    fn insert(&mut self, id: EntityId) {
        if id.0 > self.floor {
            self.above.insert(id.0);
        }
    }

    fn advance(&mut self, live: &FxHashMap<EntityId, EntityRecord>) {
        loop {
            let next = self.floor.saturating_add(1);
            let passable = self.above.remove(&next)
                || live.get(&EntityId(next)).is_some_and(|r| r.mirrored);
            if !passable || next == self.floor {
                break;
            }
            self.floor = next;
        }
    }
}

/// Registry of live entities and their components.
///
/// Ids are allocated from a monotonically increasing counter starting at 1.
/// Ids mirrored from elsewhere via [`EntityManager::register_entity`] bump the
/// counter past themselves and are remembered after removal so a late
/// reference can never resurrect them.
#[derive(Debug)]
pub struct EntityManager {
    next_id: u64,
    live: FxHashMap<EntityId, EntityRecord>,
    retired: RetiredIds,
}

impl EntityManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: FxHashMap::default(),
            retired: RetiredIds::default(),
        }
    }

    /// Allocates a fresh id and records the entity as live.
    pub fn create_entity(&mut self, kind: EntityKind) -> Entity {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.live.insert(
            id,
            EntityRecord {
                kind,
                mirrored: false,
                components: BTreeMap::new(),
            },
        );
        Entity { id, kind }
    }

    /// Registers an id issued by another registry (the server, from a
    /// client's point of view).
    ///
    /// Returns `None` if the id is already live or was mirrored and removed
    /// before.
    pub fn register_entity(&mut self, id: EntityId, kind: EntityKind) -> Option<Entity> {
        if self.live.contains_key(&id) || self.retired.contains(id, &self.live) {
            return None;
        }
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        self.live.insert(
            id,
            EntityRecord {
                kind,
                mirrored: true,
                components: BTreeMap::new(),
            },
        );
        self.retired.advance(&self.live);
        Some(Entity { id, kind })
    }

    /// Detaches every component and drops the id from the live set.
    ///
    /// Unknown ids are a no-op returning `None`; destruction is routinely
    /// requested more than once for the same entity.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let record = self.live.remove(&id)?;
        if record.mirrored {
            self.retired.insert(id);
            self.retired.advance(&self.live);
        }
        Some(Entity {
            id,
            kind: record.kind,
        })
    }

    /// Removes all components from `id` but leaves it registered.
    /// Returns how many were removed.
    pub fn strip_components(&mut self, id: EntityId) -> usize {
        match self.live.get_mut(&id) {
            Some(record) => {
                let count = record.components.len();
                record.components.clear();
                count
            }
            None => 0,
        }
    }

    /// Returns `true` if `id` is currently live.
    pub fn contains(&self, id: EntityId) -> bool {
        self.live.contains_key(&id)
    }

    /// Returns `true` if `id` was mirrored and has since been removed.
    pub fn is_retired(&self, id: EntityId) -> bool {
        self.retired.contains(id, &self.live)
    }

    /// Retired ids held individually rather than folded into the contiguous
    /// prefix.
    pub fn retired_backlog(&self) -> usize {
        self.retired.above.len()
    }

    /// Looks up a live entity.
    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.live.get(&id).map(|record| Entity {
            id,
            kind: record.kind,
        })
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no entities are live.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Every live entity, ordered by id. O(n); meant for fan-out, not
    /// per-entity lookups.
    pub fn get_all_entities(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self
            .live
            .iter()
            .map(|(&id, record)| Entity {
                id,
                kind: record.kind,
            })
            .collect();
        all.sort_unstable_by_key(|e| e.id);
        all
    }

    /// Captures the live set for one tick.
    pub fn live_entities(&self) -> LiveEntities {
        LiveEntities::from_entities(self.get_all_entities())
    }

    /// Number of components attached to `id` (0 for unknown ids).
    pub fn component_count(&self, id: EntityId) -> usize {
        self.live.get(&id).map_or(0, |r| r.components.len())
    }

    pub(crate) fn slot(&self, id: EntityId, kind: ComponentKind) -> Option<&Slot> {
        self.live.get(&id)?.components.get(&kind)
    }

    pub(crate) fn slot_mut(&mut self, id: EntityId, kind: ComponentKind) -> Option<&mut Slot> {
        self.live.get_mut(&id)?.components.get_mut(&kind)
    }

    pub(crate) fn components_mut(
        &mut self,
        id: EntityId,
    ) -> Option<&mut BTreeMap<ComponentKind, Slot>> {
        self.live.get_mut(&id).map(|r| &mut r.components)
    }

    /// Iterates `(kind, component)` pairs attached to `id`, ordered by kind.
    pub fn components_of(
        &self,
        id: EntityId,
    ) -> impl Iterator<Item = (ComponentKind, &Component)> + '_ {
        self.live
            .get(&id)
            .into_iter()
            .flat_map(|r| r.components.iter().map(|(k, s)| (*k, &s.component)))
    }

    /// Clears every `updated` flag on networked components and returns the
    /// keys that were set, ordered by entity id then kind.
    pub(crate) fn take_updated(&mut self) -> Vec<(EntityId, ComponentKind)> {
        let mut out = Vec::new();
        for (&id, record) in &mut self.live {
            for (&kind, slot) in &mut record.components {
                if slot.updated {
                    slot.updated = false;
                    if kind.is_networked() {
                        out.push((id, kind));
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The set of entities that were live when a tick began.
///
/// Systems resolve ids against this view rather than the registry so that
/// creations and removals during the tick do not tear iteration.
#[derive(Debug, Clone, Default)]
pub struct LiveEntities {
    entities: Vec<Entity>,
    index: FxHashMap<EntityId, usize>,
}

impl LiveEntities {
    /// Builds the view from an explicit list.
    pub fn from_entities(entities: Vec<Entity>) -> Self {
        let index = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        Self { entities, index }
    }

    /// O(1) expected lookup by id.
    pub fn get_entity_by_id(&self, id: EntityId) -> Option<Entity> {
        self.index.get(&id).map(|&i| self.entities[i])
    }

    /// Iterates entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Number of entities in the view.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Free-function form of [`LiveEntities::get_entity_by_id`].
pub fn get_entity_by_id(entities: &LiveEntities, id: EntityId) -> Option<Entity> {
    entities.get_entity_by_id(id)
}
