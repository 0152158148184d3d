//! Server-side snapshot assembly.

use kestrel_ecs::{Component, Entity, EntityId, World};
use kestrel_net::{ComponentUpdate, DestroyedNotice, Snapshot};

/// Builds per-tick snapshots from a world's change flags and the entities
/// the tick removed.
#[derive(Debug, Default)]
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Creates a builder.
    pub fn new() -> Self {
        Self
    }

    /// Collects every networked component flagged updated since the previous
    /// call (resetting the flags) and lists `removed` as destroyed.
    ///
    /// Meant to run from the scheduler's output hook with the entities its
    /// destroy phase actually unregistered, so an id is announced exactly
    /// when the server stops holding it. Component updates are ordered by
    /// entity id then type tag.
    pub fn build(&self, world: &mut World, removed: &[Entity]) -> Snapshot {
        let updated = world.take_updated();
        let mut components = Vec::with_capacity(updated.len());
        for (id, kind) in updated {
            let Some(component) = world.component(id, kind) else {
                continue;
            };
            if let Some(update) = encode_update(id, component) {
                components.push(update);
            }
        }

        Snapshot {
            tick: world.tick(),
            components,
            destroyed: removed.iter().map(|e| e.id.0).collect(),
        }
    }

    /// Every networked component of every live entity, for a connection
    /// that has just joined. Change flags are left untouched.
    pub fn full(&self, world: &World) -> Snapshot {
        let mut components = Vec::new();
        for entity in world.entities().get_all_entities() {
            for (_, component) in world.entities().components_of(entity.id) {
                if let Some(update) = encode_update(entity.id, component) {
                    components.push(update);
                }
            }
        }
        Snapshot {
            tick: world.tick(),
            components,
            destroyed: Vec::new(),
        }
    }

    /// Dedicated notices for the removed entities matching `filter`.
    pub fn destroyed_notices(
        &self,
        removed: &[Entity],
        mut filter: impl FnMut(&Entity) -> bool,
    ) -> Vec<DestroyedNotice> {
        removed
            .iter()
            .filter(|&entity| filter(entity))
            .map(|entity| DestroyedNotice {
                entity_id: entity.id.0,
                kind: entity.kind.tag(),
            })
            .collect()
    }
}

fn encode_update(id: EntityId, component: &Component) -> Option<ComponentUpdate> {
    let kind = component.kind();
    match component.encode_record() {
        Ok(Some(record)) => Some(ComponentUpdate {
            e: id.0,
            t: kind.tag(),
            r: record,
        }),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(entity = %id, component = kind.name(), error = %e, "component record failed to encode");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_ecs::{
        ComponentKind, Damage, EntityKind, Health, LiveEntities, Position, Stage, System,
        TickScheduler, Velocity,
    };

    fn tags(snapshot: &Snapshot) -> Vec<(u64, u8)> {
        snapshot.components.iter().map(|u| (u.e, u.t)).collect()
    }

    #[test]
    fn test_build_includes_only_changed_components() {
        let mut world = World::new();
        let a = world.create_entity(EntityKind::Player);
        let b = world.create_entity(EntityKind::Npc);
        world.insert(a.id, Position::new(1.0, 2.0, 3.0)).unwrap();
        world.insert(a.id, Health::full(100)).unwrap();
        world.insert(b.id, Velocity::default()).unwrap();

        let builder = SnapshotBuilder::new();
        let first = builder.build(&mut world, &[]);
        assert_eq!(
            tags(&first),
            vec![
                (a.id.0, ComponentKind::Position.tag()),
                (a.id.0, ComponentKind::Health.tag()),
                (b.id.0, ComponentKind::Velocity.tag()),
            ]
        );

        // Nothing changed: nothing re-sent.
        assert!(builder.build(&mut world, &[]).is_empty());

        world.get_mut::<Health>(a.id).unwrap().current = 90;
        let third = builder.build(&mut world, &[]);
        assert_eq!(tags(&third), vec![(a.id.0, ComponentKind::Health.tag())]);
    }

    #[test]
    fn test_local_components_never_replicate() {
        let mut world = World::new();
        let e = world.create_entity(EntityKind::Player);
        world
            .insert(
                e.id,
                Damage {
                    amount: 5,
                    source: None,
                },
            )
            .unwrap();

        let builder = SnapshotBuilder::new();
        assert!(builder.build(&mut world, &[]).components.is_empty());
        assert!(builder.full(&world).components.is_empty());
    }

    #[test]
    fn test_destroyed_listed_once_when_queued_twice() {
        let mut world = World::new();
        let doomed = world.create_entity(EntityKind::Npc);
        world.destroy_entity(doomed.id);
        world.destroy_entity(doomed.id);
        let builder = SnapshotBuilder::new();

        let mut snapshot = None;
        TickScheduler::new().run_tick_with(&mut world, |world, removed| {
            snapshot = Some(builder.build(world, removed));
        });

        assert_eq!(snapshot.unwrap().destroyed, vec![doomed.id.0]);
    }

    #[test]
    fn test_destroyed_entity_reported_without_component_updates() {
        let mut world = World::new();
        let e = world.create_entity(EntityKind::Npc);
        world.insert(e.id, Position::default()).unwrap();
        let builder = SnapshotBuilder::new();
        builder.build(&mut world, &[]);

        world.get_mut::<Position>(e.id).unwrap().x = 4.0;
        world.destroy_entity(e.id);

        let mut snapshot = Snapshot::default();
        TickScheduler::new().run_tick_with(&mut world, |world, removed| {
            assert_eq!(world.events().stage(), Stage::Output);
            snapshot = builder.build(world, removed);
        });

        assert!(snapshot.components.is_empty());
        assert_eq!(snapshot.destroyed, vec![e.id.0]);
        assert!(!world.entities().contains(e.id));
    }

    #[test]
    fn test_full_snapshot_ignores_flags() {
        let mut world = World::new();
        let e = world.create_entity(EntityKind::Player);
        world.insert(e.id, Position::default()).unwrap();
        let builder = SnapshotBuilder::new();
        builder.build(&mut world, &[]);

        let full = builder.full(&world);
        assert_eq!(tags(&full), vec![(e.id.0, ComponentKind::Position.tag())]);
        assert!(full.destroyed.is_empty());
        // Flags stay cleared; the full snapshot did not re-arm them.
        assert!(builder.build(&mut world, &[]).is_empty());
    }

    #[test]
    fn test_destroyed_notices_filter() {
        let mut world = World::new();
        let player = world.create_entity(EntityKind::Player);
        let npc = world.create_entity(EntityKind::Npc);
        world.destroy_entity(player.id);
        world.destroy_entity(npc.id);
        world.destroy_entity(player.id);

        let builder = SnapshotBuilder::new();
        let mut notices = Vec::new();
        TickScheduler::new().run_tick_with(&mut world, |_, removed| {
            notices = builder.destroyed_notices(removed, |e| e.kind == EntityKind::Player);
        });
        assert_eq!(
            notices,
            vec![DestroyedNotice {
                entity_id: player.id.0,
                kind: EntityKind::Player.tag(),
            }]
        );
    }

    #[test]
    fn test_destroy_from_after_update_reaches_late_joiner() {
        struct LateKiller;
        impl System for LateKiller {
            fn name(&self) -> &'static str {
                "late-killer"
            }
            fn update(&mut self, _world: &mut World, _entities: &LiveEntities) {}
            fn after_update(&mut self, world: &mut World, entities: &LiveEntities) {
                for entity in entities.iter() {
                    world.destroy_entity(entity.id);
                }
            }
        }

        let mut world = World::new();
        let npc = world.create_entity(EntityKind::Npc);
        world.insert(npc.id, Position::default()).unwrap();
        let mut scheduler = TickScheduler::new();
        scheduler.add_system(Box::new(LateKiller));
        let builder = SnapshotBuilder::new();

        let mut first = Snapshot::default();
        scheduler.run_tick_with(&mut world, |world, removed| {
            first = builder.build(world, removed);
        });
        // Still held by the server, so not announced yet.
        assert!(first.destroyed.is_empty());
        assert!(world.entities().contains(npc.id));

        let late_joiner = builder.full(&world);
        assert_eq!(tags(&late_joiner), vec![(npc.id.0, ComponentKind::Position.tag())]);

        let mut second = Snapshot::default();
        scheduler.run_tick_with(&mut world, |world, removed| {
            second = builder.build(world, removed);
        });
        assert_eq!(second.destroyed, vec![npc.id.0]);
        assert!(!world.entities().contains(npc.id));
    }
}
