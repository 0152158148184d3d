//! Tests for the gameplay systems, each run through a real scheduler.

use kestrel_ecs::{EntityId, Player, TickScheduler};

use super::*;

fn scheduler_with(system: impl System + 'static) -> TickScheduler {
    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(system));
    scheduler
}

fn spawn_player(world: &mut World, health: i32) -> EntityId {
    let id = world.create_entity(EntityKind::Player).id;
    world.insert(id, Health::full(health)).unwrap();
    world.insert(id, Position::default()).unwrap();
    world.insert(id, Rotation::default()).unwrap();
    world.insert(id, Velocity::default()).unwrap();
    id
}

fn hit(world: &mut World, id: EntityId, amount: i32) {
    world
        .insert(
            id,
            Damage {
                amount,
                source: None,
            },
        )
        .unwrap();
}

#[test]
fn test_forward_input_moves_along_heading() {
    let system = InputSystem::new(4.0);
    let v = system.velocity_for(&Input {
        forward: true,
        ..Input::default()
    });
    assert!((v.z - 4.0).abs() < 1e-5);
    assert!(v.x.abs() < 1e-5);

    let diagonal = system.velocity_for(&Input {
        forward: true,
        right: true,
        ..Input::default()
    });
    let planar = (diagonal.x * diagonal.x + diagonal.z * diagonal.z).sqrt();
    assert!((planar - 4.0).abs() < 1e-4);

    assert_eq!(system.velocity_for(&Input::default()), Velocity::default());
}

#[test]
fn test_input_and_movement_update_position() {
    let mut world = World::new();
    let id = spawn_player(&mut world, 100);
    world
        .insert(
            id,
            Input {
                forward: true,
                yaw: 0.0,
                ..Input::default()
            },
        )
        .unwrap();

    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(InputSystem::new(10.0)));
    scheduler.add_system(Box::new(MovementSystem::new(0.5)));
    scheduler.run_tick(&mut world);

    let position = world.get::<Position>(id).unwrap();
    assert!((position.z - 5.0).abs() < 1e-5);
}

#[test]
fn test_idle_input_leaves_state_unflagged() {
    let mut world = World::new();
    let id = spawn_player(&mut world, 100);
    world.insert(id, Input::default()).unwrap();
    world.take_updated();

    let mut scheduler = TickScheduler::new();
    scheduler.add_system(Box::new(InputSystem::new(10.0)));
    scheduler.add_system(Box::new(MovementSystem::new(0.05)));
    scheduler.run_tick(&mut world);

    assert!(world.take_updated().is_empty());
}

#[test]
fn test_damage_reduces_health_same_tick() {
    let mut world = World::new();
    let id = spawn_player(&mut world, 100);
    hit(&mut world, id, 10);

    scheduler_with(CombatSystem).run_tick(&mut world);

    assert_eq!(world.get::<Health>(id).unwrap().current, 90);
    assert!(world.get::<Damage>(id).is_none());
}

#[test]
fn test_damage_attached_again_next_tick_applies_again() {
    let mut world = World::new();
    let id = spawn_player(&mut world, 100);
    let mut scheduler = scheduler_with(CombatSystem);

    hit(&mut world, id, 10);
    scheduler.run_tick(&mut world);
    hit(&mut world, id, 15);
    scheduler.run_tick(&mut world);

    assert_eq!(world.get::<Health>(id).unwrap().current, 75);
}

#[test]
fn test_lethal_damage_destroys_npc_but_downs_player() {
    let mut world = World::new();
    let npc = world.create_entity(EntityKind::Npc).id;
    world.insert(npc, Health::full(5)).unwrap();
    let player = spawn_player(&mut world, 5);
    hit(&mut world, npc, 50);
    hit(&mut world, player, 50);

    let report = scheduler_with(CombatSystem).run_tick(&mut world);

    assert_eq!(report.destroyed, vec![npc]);
    assert!(!world.entities().contains(npc));
    assert_eq!(world.get::<Health>(player).unwrap().current, 0);
}

#[test]
fn test_damage_without_health_is_skipped() {
    let mut world = World::new();
    let id = world.create_entity(EntityKind::Projectile).id;
    hit(&mut world, id, 10);

    scheduler_with(CombatSystem).run_tick(&mut world);

    assert!(world.entities().contains(id));
    assert!(world.get::<Damage>(id).is_none());
}

#[test]
fn test_downed_player_cannot_move() {
    let mut world = World::new();
    let id = spawn_player(&mut world, 10);
    world.get_mut::<Health>(id).unwrap().current = 0;
    world
        .insert(
            id,
            Input {
                forward: true,
                ..Input::default()
            },
        )
        .unwrap();

    scheduler_with(InputSystem::new(5.0)).run_tick(&mut world);
    assert_eq!(world.get::<Velocity>(id), Some(&Velocity::default()));
}

#[test]
fn test_respawn_restores_health_and_position() {
    let mut world = World::new();
    let id = spawn_player(&mut world, 100);
    world.get_mut::<Health>(id).unwrap().current = 0;
    world.get_mut::<Position>(id).unwrap().x = 40.0;
    world
        .events_mut()
        .add_event(Event::RespawnRequested { entity: id });

    let spawn = Position::new(1.0, 2.0, 3.0);
    scheduler_with(RespawnSystem::new(100, spawn)).run_tick(&mut world);

    assert_eq!(world.get::<Health>(id), Some(&Health::full(100)));
    assert_eq!(world.get::<Position>(id), Some(&spawn));
}

#[test]
fn test_chat_lines_reach_singleton() {
    let mut world = World::new();
    let chat = world.create_entity(EntityKind::Singleton).id;
    world.insert(chat, Chat::with_capacity(2)).unwrap();
    let author = world.create_entity(EntityKind::Player).id;
    world
        .insert(
            author,
            Player {
                name: "ada".to_string(),
            },
        )
        .unwrap();
    for text in ["one", "two", "three"] {
        world.events_mut().add_network_event(Event::ChatPosted {
            entity: author,
            author: "ada".to_string(),
            text: text.to_string(),
        });
    }

    scheduler_with(ChatSystem).run_tick(&mut world);

    let lines: Vec<&str> = world
        .get::<Chat>(chat)
        .unwrap()
        .lines
        .iter()
        .map(|l| l.text.as_str())
        .collect();
    assert_eq!(lines, vec!["two", "three"]);
}

#[test]
fn test_register_systems_order() {
    let mut scheduler = TickScheduler::new();
    register_systems(&mut scheduler, &SimSettings::default());
    assert_eq!(
        scheduler.system_names(),
        vec!["input", "movement", "combat", "respawn", "chat"]
    );
}
