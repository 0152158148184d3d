//! The authoritative simulation: transport events in, framed messages out.
//!
//! [`ServerRuntime`] owns the world and everything that touches it. It never
//! awaits; the async loop in [`crate::app`] feeds it and ships what it
//! returns, which keeps the whole runtime testable without sockets.

use std::sync::Arc;

use kestrel_config::Config;
use kestrel_ecs::{Chat, EntityKind, Event, EventKind, TickReport, TickScheduler, World};
use kestrel_net::{
    ChatBroadcast, ClientTag, CodecConfig, ConnectionId, Frame, ServerMessage, TransportEvent,
    decode_client, encode_server,
};
use kestrel_replication::{SessionMap, SnapshotBuilder};

use crate::handlers::default_router;
use crate::router::{HandlerContext, MessageRouter};
use crate::settings::{SimSettings, codec_config};
use crate::systems::register_systems;

/// An encoded frame and who should get it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// One connection.
    Send {
        /// Recipient.
        to: ConnectionId,
        /// Encoded message.
        frame: Frame,
    },
    /// The same bytes to several connections.
    Broadcast {
        /// Recipients.
        to: Vec<ConnectionId>,
        /// Encoded message, shared by every recipient.
        frame: Frame,
    },
}

/// World, scheduler, sessions and router for one server.
pub struct ServerRuntime {
    world: World,
    scheduler: TickScheduler,
    sessions: SessionMap,
    router: MessageRouter,
    snapshots: SnapshotBuilder,
    settings: SimSettings,
    codec: CodecConfig,
}

impl ServerRuntime {
    /// Builds the runtime: the chat singleton, the systems and the handlers.
    pub fn new(config: &Config) -> Self {
        let settings = SimSettings::from_config(config);
        let mut world = World::new();

        let chat = world.create_entity(EntityKind::Singleton).id;
        let _ = world.insert(chat, Chat::with_capacity(settings.chat_history));

        let mut scheduler = TickScheduler::new();
        register_systems(&mut scheduler, &settings);

        let router = default_router();
        tracing::info!(
            tick_rate = settings.tick_rate,
            systems = ?scheduler.system_names(),
            handlers = router.registered_tags().count(),
            "runtime ready"
        );

        Self {
            world,
            scheduler,
            sessions: SessionMap::new(),
            router,
            snapshots: SnapshotBuilder::new(),
            settings,
            codec: codec_config(config),
        }
    }

    /// The authoritative world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access, for collaborators that spawn or damage entities.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Connection ↔ entity bindings.
    pub fn sessions(&self) -> &SessionMap {
        &self.sessions
    }

    /// Gameplay parameters in effect.
    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    /// Applies one transport event. Returns replies to send right away.
    pub fn handle_transport(&mut self, event: TransportEvent) -> Vec<Outgoing> {
        match event {
            TransportEvent::Connected { id, peer } => {
                tracing::info!(connection = %id, %peer, "connection opened");
                self.sessions.open(id);
                Vec::new()
            }
            TransportEvent::Frame { id, frame } => self.handle_frame(id, &frame),
            TransportEvent::Disconnected { id } => {
                self.handle_disconnect(id);
                Vec::new()
            }
        }
    }

    fn handle_frame(&mut self, connection: ConnectionId, frame: &[u8]) -> Vec<Outgoing> {
        if !self.sessions.is_open(connection) {
            tracing::debug!(%connection, "frame from unknown connection dropped");
            return Vec::new();
        }
        let message = match decode_client(frame, &self.codec) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%connection, error = %e, len = frame.len(), "malformed frame dropped");
                return Vec::new();
            }
        };
        let tag = message.kind();
        if tag != ClientTag::FirstConnection && self.sessions.entity_of(connection).is_none() {
            tracing::debug!(%connection, ?tag, "message before handshake dropped");
            return Vec::new();
        }

        let mut ctx = HandlerContext {
            connection,
            world: &mut self.world,
            sessions: &mut self.sessions,
            snapshots: &self.snapshots,
            settings: &self.settings,
            replies: Vec::new(),
        };
        self.router.route(message, &mut ctx);
        let replies = ctx.replies;

        replies
            .iter()
            .filter_map(|reply| self.encode(reply))
            .map(|frame| Outgoing::Send {
                to: connection,
                frame,
            })
            .collect()
    }

    fn handle_disconnect(&mut self, connection: ConnectionId) {
        let Some(entity) = self.sessions.detach(connection) else {
            tracing::info!(%connection, "connection closed before handshake");
            return;
        };
        self.world.destroy_entity(entity);
        self.world.events_mut().add_event(Event::PlayerLeft {
            entity,
            connection: connection.0,
        });
        tracing::info!(%connection, %entity, "player left");
    }

    /// Runs one simulation tick and returns its broadcasts: the snapshot,
    /// then chat lines, then dedicated notices for destroyed players.
    pub fn tick(&mut self) -> Vec<Outgoing> {
        let mut messages = Vec::new();
        let snapshots = &self.snapshots;

        let report = self.scheduler.run_tick_with(&mut self.world, |world, removed| {
            let snapshot = snapshots.build(world, removed);
            if !snapshot.is_empty() {
                messages.push(ServerMessage::Snapshot(snapshot));
            }
            messages.extend(
                world
                    .events()
                    .get_events(EventKind::ChatPosted)
                    .filter_map(|event| match event {
                        Event::ChatPosted { author, text, .. } => {
                            Some(ServerMessage::Chat(ChatBroadcast {
                                author: author.clone(),
                                text: text.clone(),
                            }))
                        }
                        _ => None,
                    }),
            );
            messages.extend(
                snapshots
                    .destroyed_notices(removed, |entity| entity.kind == EntityKind::Player)
                    .into_iter()
                    .map(ServerMessage::EntityDestroyed),
            );
        });

        self.release(&report);

        let recipients = self.sessions.connections();
        if recipients.is_empty() {
            return Vec::new();
        }
        messages
            .iter()
            .filter_map(|message| self.encode(message))
            .map(|frame| Outgoing::Broadcast {
                to: recipients.clone(),
                frame,
            })
            .collect()
    }

    fn release(&mut self, report: &TickReport) {
        for &entity in &report.destroyed {
            if let Some(connection) = self.sessions.release_entity(entity) {
                tracing::info!(%connection, %entity, "controlled entity destroyed");
            }
        }
        tracing::trace!(
            tick = report.tick,
            systems = report.systems_run,
            destroyed = report.destroyed.len(),
            sessions = self.sessions.len(),
            "tick complete"
        );
    }

    fn encode(&self, message: &ServerMessage) -> Option<Frame> {
        match encode_server(message, &self.codec) {
            Ok(bytes) => Some(Arc::from(bytes)),
            Err(e) => {
                tracing::error!(tag = ?message.kind(), error = %e, "failed to encode message");
                None
            }
        }
    }
}
