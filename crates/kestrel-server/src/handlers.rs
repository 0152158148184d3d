//! Handlers for each client message type.

use kestrel_ecs::{
    EntityId, EntityKind, Event, Health, Input, Player, Rotation, Velocity,
};
use kestrel_net::{ClientMessage, ClientTag, ServerMessage, Welcome};

use crate::router::{HandlerContext, MessageRouter};
use crate::settings::{MAX_CHAT_CHARS, MAX_NAME_CHARS};

/// A router with every client message type wired up.
pub fn default_router() -> MessageRouter {
    let mut router = MessageRouter::new();
    router.register(ClientTag::FirstConnection, handle_handshake);
    router.register(ClientTag::Input, handle_input);
    router.register(ClientTag::Chat, handle_chat);
    router.register(ClientTag::Respawn, handle_respawn);
    router.register(ClientTag::Ping, handle_ping);
    router
}

/// Spawns the connection's player and replies with its id and a full
/// snapshot. A repeated handshake gets the same entity back.
pub fn handle_handshake(message: ClientMessage, ctx: &mut HandlerContext<'_>) {
    let ClientMessage::FirstConnection(hello) = message else {
        return;
    };

    let entity = match ctx.entity() {
        Some(existing) => {
            tracing::debug!(connection = %ctx.connection, entity = %existing, "repeated handshake");
            existing
        }
        None => {
            let entity = spawn_player(ctx, &hello.name);
            ctx.sessions.attach(ctx.connection, entity);
            ctx.world.events_mut().add_event(Event::PlayerJoined {
                entity,
                connection: ctx.connection.0,
            });
            entity
        }
    };

    ctx.reply(ServerMessage::FirstConnection(Welcome {
        entity_id: entity.0,
        tick_rate: ctx.settings.tick_rate,
    }));
    let full = ctx.snapshots.full(&*ctx.world);
    ctx.reply(ServerMessage::Snapshot(full));
}

fn spawn_player(ctx: &mut HandlerContext<'_>, requested: &str) -> EntityId {
    let id = ctx.world.create_entity(EntityKind::Player).id;
    let name = sanitize_name(requested).unwrap_or_else(|| format!("player-{}", id.0));
    let settings = ctx.settings;

    let world = &mut *ctx.world;
    let _ = world.insert(id, Player { name: name.clone() });
    let _ = world.insert(id, settings.spawn_point);
    let _ = world.insert(id, Rotation::default());
    let _ = world.insert(id, Velocity::default());
    let _ = world.insert(id, Health::full(settings.player_max_health));
    let _ = world.insert(id, Input::default());

    tracing::info!(connection = %ctx.connection, entity = %id, %name, "player joined");
    id
}

/// Trims `name`, drops control characters and caps the length. `None` if
/// nothing printable is left.
pub fn sanitize_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_end().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Stores the latest control state; the input system turns it into motion.
pub fn handle_input(message: ClientMessage, ctx: &mut HandlerContext<'_>) {
    let (ClientMessage::Input(state), Some(entity)) = (message, ctx.entity()) else {
        return;
    };
    let input = Input {
        forward: state.forward,
        back: state.back,
        left: state.left,
        right: state.right,
        jump: state.jump,
        yaw: if state.yaw.is_finite() { state.yaw } else { 0.0 },
    };
    let _ = ctx.world.insert(entity, input);
}

/// Posts a chat line under the sender's player name.
pub fn handle_chat(message: ClientMessage, ctx: &mut HandlerContext<'_>) {
    let (ClientMessage::Chat(post), Some(entity)) = (message, ctx.entity()) else {
        return;
    };
    let text = post.text.trim();
    if text.is_empty() {
        return;
    }
    let text: String = text.chars().take(MAX_CHAT_CHARS).collect();
    let author = ctx
        .world
        .get::<Player>(entity)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| format!("player-{}", entity.0));

    tracing::debug!(entity = %entity, %author, "chat posted");
    ctx.world
        .events_mut()
        .add_network_event(Event::ChatPosted { entity, author, text });
}

/// Queues a respawn for the sender's player.
pub fn handle_respawn(_message: ClientMessage, ctx: &mut HandlerContext<'_>) {
    if let Some(entity) = ctx.entity() {
        ctx.world
            .events_mut()
            .add_event(Event::RespawnRequested { entity });
    }
}

/// Echoes a heartbeat.
pub fn handle_ping(message: ClientMessage, ctx: &mut HandlerContext<'_>) {
    if let ClientMessage::Ping(ping) = message {
        ctx.reply(ServerMessage::Pong(kestrel_net::Pong {
            sequence: ping.sequence,
            timestamp_ms: ping.timestamp_ms,
        }));
    }
}
