//! Gameplay systems run by the server each tick, in registration order.
//!
//! Every system contains its own failures: an entity missing a component the
//! system expects is skipped for the tick and logged, never escalated.

use kestrel_ecs::{
    Chat, ComponentKind, Damage, EntityKind, Event, EventKind, Health, Input, LiveEntities,
    Position, Rotation, System, Velocity, World,
};

use crate::settings::SimSettings;

/// Registers the server's systems on `scheduler` in their fixed order.
pub fn register_systems(scheduler: &mut kestrel_ecs::TickScheduler, settings: &SimSettings) {
    scheduler.add_system(Box::new(InputSystem::new(settings.player_speed)));
    scheduler.add_system(Box::new(MovementSystem::new(settings.dt())));
    scheduler.add_system(Box::new(CombatSystem));
    scheduler.add_system(Box::new(RespawnSystem::new(
        settings.player_max_health,
        settings.spawn_point,
    )));
    scheduler.add_system(Box::new(ChatSystem));
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Turns each entity's latest [`Input`] into a [`Velocity`] and heading.
///
/// Entities whose health is depleted stand still until they respawn.
pub struct InputSystem {
    speed: f32,
}

impl InputSystem {
    /// Moves at `speed` units per second.
    pub fn new(speed: f32) -> Self {
        Self { speed }
    }

    /// Velocity requested by `input`. Diagonal movement is not faster than
    /// straight movement.
    pub fn velocity_for(&self, input: &Input) -> Velocity {
        let axis = |pos: bool, neg: bool| f32::from(u8::from(pos)) - f32::from(u8::from(neg));
        let ahead = axis(input.forward, input.back);
        let side = axis(input.right, input.left);
        let (sin, cos) = input.yaw.sin_cos();

        let mut x = ahead * sin + side * cos;
        let mut z = ahead * cos - side * sin;
        let planar = (x * x + z * z).sqrt();
        if planar > 0.0 {
            x = x / planar * self.speed;
            z = z / planar * self.speed;
        }
        let y = if input.jump { self.speed } else { 0.0 };
        Velocity { x, y, z }
    }
}

impl System for InputSystem {
    fn name(&self) -> &'static str {
        "input"
    }

    fn update(&mut self, world: &mut World, entities: &LiveEntities) {
        for entity in entities.iter() {
            let Some(input) = world.get::<Input>(entity.id).copied() else {
                continue;
            };
            let down = world
                .get::<Health>(entity.id)
                .is_some_and(Health::is_depleted);
            let target = if down {
                Velocity::default()
            } else {
                self.velocity_for(&input)
            };

            // Only write on change so unchanged state stays out of snapshots.
            if world.get::<Velocity>(entity.id) != Some(&target) {
                match world.get_mut::<Velocity>(entity.id) {
                    Some(mut velocity) => *velocity = target,
                    None => {
                        let _ = world.insert(entity.id, target);
                    }
                }
            }

            if !down
                && let Some(mut rotation) = world.get_mut::<Rotation>(entity.id)
                && rotation.yaw != input.yaw
            {
                rotation.yaw = input.yaw;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// Integrates [`Velocity`] into [`Position`]. Stands in for the physics
/// collaborator, which owns collision and gravity.
pub struct MovementSystem {
    dt: f32,
}

impl MovementSystem {
    /// Advances `dt` seconds per tick.
    pub fn new(dt: f32) -> Self {
        Self { dt }
    }
}

impl System for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn update(&mut self, world: &mut World, entities: &LiveEntities) {
        for entity in entities.iter() {
            let Some(velocity) = world.get::<Velocity>(entity.id).copied() else {
                continue;
            };
            if velocity == Velocity::default() {
                continue;
            }
            let Some(mut position) = world.get_mut::<Position>(entity.id) else {
                tracing::debug!(entity = %entity.id, "moving entity has no position, skipped");
                continue;
            };
            position.x += velocity.x * self.dt;
            position.y += velocity.y * self.dt;
            position.z += velocity.z * self.dt;
        }
    }
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// Applies [`Damage`] components as they are attached.
///
/// Each pending hit is subtracted from [`Health`] (kept within `0..=max`) and
/// the `Damage` component removed, so the next hit is a fresh attach. A
/// non-player entity at zero health is destroyed; players stay down until a
/// respawn request.
pub struct CombatSystem;

impl System for CombatSystem {
    fn name(&self) -> &'static str {
        "combat"
    }

    fn update(&mut self, world: &mut World, _entities: &LiveEntities) {
        let hit: Vec<_> = world
            .events()
            .get_events_wrapped(EventKind::ComponentAdded, ComponentKind::Damage)
            .map(Event::entity)
            .collect();

        for id in hit {
            let Some(damage) = world.remove::<Damage>(id) else {
                continue;
            };
            let Some(mut health) = world.get_mut::<Health>(id) else {
                tracing::debug!(entity = %id, "damage on entity without health, ignored");
                continue;
            };
            let remaining = health.current.saturating_sub(damage.amount).min(health.max).max(0);
            health.current = remaining;
            let (current, depleted) = (health.current, health.is_depleted());
            drop(health);

            tracing::debug!(entity = %id, amount = damage.amount, source = ?damage.source, health = current, "damage applied");

            let kind = world.entities().get(id).map(|e| e.kind);
            if depleted && kind != Some(EntityKind::Player) {
                world.destroy_entity(id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Respawn
// ---------------------------------------------------------------------------

/// Restores health and position for entities that asked to respawn.
pub struct RespawnSystem {
    max_health: i32,
    spawn: Position,
}

impl RespawnSystem {
    /// Respawns at `spawn` with `max_health`.
    pub fn new(max_health: i32, spawn: Position) -> Self {
        Self { max_health, spawn }
    }
}

impl System for RespawnSystem {
    fn name(&self) -> &'static str {
        "respawn"
    }

    fn update(&mut self, world: &mut World, _entities: &LiveEntities) {
        let requests: Vec<_> = world
            .events()
            .get_events(EventKind::RespawnRequested)
            .map(Event::entity)
            .collect();

        for id in requests {
            if !world.entities().contains(id) {
                continue;
            }
            let _ = world.insert(id, Health::full(self.max_health));
            let _ = world.insert(id, self.spawn);
            let _ = world.insert(id, Velocity::default());
            tracing::info!(entity = %id, "respawned");
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Appends posted chat lines to the chat singleton's history.
pub struct ChatSystem;

impl System for ChatSystem {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn update(&mut self, world: &mut World, entities: &LiveEntities) {
        let lines: Vec<(String, String)> = world
            .events()
            .get_events(EventKind::ChatPosted)
            .filter_map(|event| match event {
                Event::ChatPosted { author, text, .. } => Some((author.clone(), text.clone())),
                _ => None,
            })
            .collect();
        if lines.is_empty() {
            return;
        }

        let Some(singleton) = world.get_first_entity_with_component(entities, ComponentKind::Chat)
        else {
            tracing::warn!(lines = lines.len(), "no chat entity, lines dropped");
            return;
        };
        if let Some(mut chat) = world.get_mut::<Chat>(singleton.id) {
            for (author, text) in lines {
                chat.push(author, text);
            }
        }
    }
}

#[cfg(test)]
#[path = "systems_tests.rs"]
mod tests;
