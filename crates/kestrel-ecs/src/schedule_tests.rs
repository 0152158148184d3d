//! Unit tests for the tick scheduler and destroy pipeline.

use std::sync::{Arc, Mutex};

use super::*;
use crate::components::{Health, Position};
use crate::entity::EntityKind;

type Log = Arc<Mutex<Vec<String>>>;

/// Emits a respawn request for entity 1 on its first update.
struct Producer {
    fired: bool,
}

impl System for Producer {
    fn name(&self) -> &'static str {
        "producer"
    }

    fn update(&mut self, world: &mut World, _entities: &LiveEntities) {
        if !self.fired {
            world.events_mut().add_event(Event::RespawnRequested {
                entity: EntityId(1),
            });
            self.fired = true;
        }
    }
}

/// Records, per tick, how many respawn requests it observed.
struct Consumer {
    log: Log,
}

impl System for Consumer {
    fn name(&self) -> &'static str {
        "consumer"
    }

    fn update(&mut self, world: &mut World, _entities: &LiveEntities) {
        let seen = world
            .events()
            .get_events(EventKind::RespawnRequested)
            .count();
        self.log
            .lock()
            .unwrap()
            .push(format!("tick{}:{}", world.tick(), seen));
    }
}

/// Records what it can observe about entity 1 after destroy phase 1.
struct Observer {
    log: Log,
}

impl System for Observer {
    fn name(&self) -> &'static str {
        "observer"
    }

    fn update(&mut self, _world: &mut World, _entities: &LiveEntities) {}

    fn after_update(&mut self, world: &mut World, entities: &LiveEntities) {
        let id = EntityId(1);
        self.log.lock().unwrap().push(format!(
            "registered={} components={} in_view={}",
            world.entities().contains(id),
            world.entities().component_count(id),
            entities.get_entity_by_id(id).is_some()
        ));
    }
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_producer_before_consumer_same_tick() {
    let log = new_log();
    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(Producer { fired: false }));
    scheduler.add_system(Box::new(Consumer { log: log.clone() }));

    let mut world = World::new();
    scheduler.run_tick(&mut world);
    scheduler.run_tick(&mut world);

    assert_eq!(*log.lock().unwrap(), vec!["tick0:1", "tick1:0"]);
}

#[test]
fn test_consumer_before_producer_sees_it_next_tick() {
    let log = new_log();
    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(Consumer { log: log.clone() }));
    scheduler.add_system(Box::new(Producer { fired: false }));

    let mut world = World::new();
    scheduler.run_tick(&mut world);
    scheduler.run_tick(&mut world);
    scheduler.run_tick(&mut world);

    assert_eq!(*log.lock().unwrap(), vec!["tick0:0", "tick1:1", "tick2:0"]);
}

#[test]
fn test_destroy_is_two_phase() {
    let log = new_log();
    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(Observer { log: log.clone() }));

    let mut world = World::new();
    let e = world.create_entity(EntityKind::Npc);
    world.insert(e.id, Health::full(10)).unwrap();
    world.insert(e.id, Position::default()).unwrap();
    world.destroy_entity(e.id);

    let report = scheduler.run_tick(&mut world);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["registered=true components=0 in_view=true"]
    );
    assert_eq!(report.destroyed, vec![e.id]);
    assert!(world.entities().get(e.id).is_none());
}

#[test]
fn test_duplicate_destroy_in_one_tick_removes_once() {
    let mut scheduler = TickScheduler::new();
    let mut world = World::new();
    let e = world.create_entity(EntityKind::Projectile);

    world.destroy_entity(e.id);
    world.destroy_entity(e.id);
    world.events_mut().add_event(Event::EntityDestroyed {
        entity: e.id,
        kind: EntityKind::Projectile,
    });

    let report = scheduler.run_tick(&mut world);
    assert_eq!(report.destroyed, vec![e.id]);
    assert!(world.entities().get(e.id).is_none());
}

#[test]
fn test_destroy_across_ticks_converges() {
    let mut scheduler = TickScheduler::new();
    let mut world = World::new();
    let e = world.create_entity(EntityKind::Npc);

    world.destroy_entity(e.id);
    let first = scheduler.run_tick(&mut world);

    // Late duplicate for an id that is already gone.
    world.events_mut().add_network_event(Event::EntityDestroyed {
        entity: e.id,
        kind: EntityKind::Npc,
    });
    let second = scheduler.run_tick(&mut world);
    let third = scheduler.run_tick(&mut world);

    assert_eq!(first.destroyed, vec![e.id]);
    assert!(second.destroyed.is_empty());
    assert!(third.destroyed.is_empty());
    assert!(world.entities().get(e.id).is_none());
    assert!(!world.destroy_entity(e.id));
}

#[test]
fn test_destroy_requested_by_late_system_applies_same_tick() {
    struct Killer;
    impl System for Killer {
        fn name(&self) -> &'static str {
            "killer"
        }
        fn update(&mut self, world: &mut World, entities: &LiveEntities) {
            for entity in entities.iter() {
                world.destroy_entity(entity.id);
            }
        }
    }

    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(Killer));
    let mut world = World::new();
    world.create_entity(EntityKind::Npc);
    world.create_entity(EntityKind::Npc);

    let report = scheduler.run_tick(&mut world);
    assert_eq!(report.destroyed.len(), 2);
    assert!(world.entities().is_empty());
}

#[test]
fn test_output_hook_sees_tick_network_events() {
    let mut scheduler = TickScheduler::new();
    let mut world = World::new();
    let e = world.create_entity(EntityKind::Npc);
    world.destroy_entity(e.id);

    let mut seen = Vec::new();
    scheduler.run_tick_with(&mut world, |world, _| {
        seen = world
            .events()
            .network_events()
            .map(Event::entity)
            .collect();
    });
    assert_eq!(seen, vec![e.id]);

    let mut seen_next = usize::MAX;
    scheduler.run_tick_with(&mut world, |world, _| {
        seen_next = world.events().network_events().count();
    });
    assert_eq!(seen_next, 0);
}

#[test]
fn test_destroy_from_after_update_reported_when_removed() {
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

    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(LateKiller));
    let mut world = World::new();
    let e = world.create_entity(EntityKind::Npc);
    world.insert(e.id, Position::default()).unwrap();

    let mut removed_first = Vec::new();
    let first = scheduler.run_tick_with(&mut world, |_, removed| {
        removed_first = removed.to_vec();
    });
    assert!(removed_first.is_empty());
    assert!(first.destroyed.is_empty());
    assert_eq!(world.entities().component_count(e.id), 1);

    let mut removed_second = Vec::new();
    let second = scheduler.run_tick_with(&mut world, |_, removed| {
        removed_second = removed.to_vec();
    });
    assert_eq!(removed_second, vec![e]);
    assert_eq!(second.destroyed, vec![e.id]);
    assert!(!world.entities().contains(e.id));
}

#[test]
fn test_report_counts_and_tick_advance() {
    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(Producer { fired: true }));
    let mut world = World::new();

    let report = scheduler.run_tick(&mut world);
    assert_eq!(report.tick, 0);
    assert_eq!(report.systems_run, 1);
    assert_eq!(world.tick(), 1);
    assert_eq!(scheduler.system_names(), vec!["producer"]);
}
