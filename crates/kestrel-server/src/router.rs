//! Message routing: dispatch decoded client messages to per-tag handlers.
//!
//! The [`MessageRouter`] maps [`ClientTag`] values to [`MessageHandler`]s.
//! Handlers run on the simulation thread between ticks, so they get direct
//! mutable access to the world through [`HandlerContext`].

use kestrel_ecs::{EntityId, World};
use kestrel_net::{ClientMessage, ClientTag, ConnectionId, ServerMessage};
use kestrel_replication::{SessionMap, SnapshotBuilder};
use rustc_hash::FxHashMap;

use crate::settings::SimSettings;

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Everything a handler may read or change while processing one message.
pub struct HandlerContext<'a> {
    /// The connection that sent the message.
    pub connection: ConnectionId,
    /// The authoritative world.
    pub world: &'a mut World,
    /// Connection ↔ entity bindings.
    pub sessions: &'a mut SessionMap,
    /// Builds the full snapshot sent after a handshake.
    pub snapshots: &'a SnapshotBuilder,
    /// Gameplay parameters.
    pub settings: &'a SimSettings,
    /// Replies addressed to the sending connection, in send order.
    pub replies: Vec<ServerMessage>,
}

impl HandlerContext<'_> {
    /// The entity the sending connection controls, if its handshake is done.
    pub fn entity(&self) -> Option<EntityId> {
        self.sessions.entity_of(self.connection)
    }

    /// Queues a reply to the sending connection.
    pub fn reply(&mut self, message: ServerMessage) {
        self.replies.push(message);
    }
}

/// Processes one message of the tag it is registered for.
pub trait MessageHandler: Send + Sync {
    /// Handle `message` from `ctx.connection`.
    fn handle(&self, message: ClientMessage, ctx: &mut HandlerContext<'_>);
}

impl<F> MessageHandler for F
where
    F: Fn(ClientMessage, &mut HandlerContext<'_>) + Send + Sync,
{
    fn handle(&self, message: ClientMessage, ctx: &mut HandlerContext<'_>) {
        self(message, ctx);
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes client messages to registered handlers by [`ClientTag`].
#[derive(Default)]
pub struct MessageRouter {
    handlers: FxHashMap<ClientTag, Box<dyn MessageHandler>>,
}

impl MessageRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `tag`, replacing any previous one.
    pub fn register<H: MessageHandler + 'static>(&mut self, tag: ClientTag, handler: H) {
        self.handlers.insert(tag, Box::new(handler));
    }

    /// Routes `message`. Returns `false` if no handler was registered and the
    /// message was dropped.
    pub fn route(&self, message: ClientMessage, ctx: &mut HandlerContext<'_>) -> bool {
        let tag = message.kind();
        match self.handlers.get(&tag) {
            Some(handler) => {
                handler.handle(message, ctx);
                true
            }
            None => {
                tracing::warn!(?tag, connection = %ctx.connection, "no handler registered, dropping message");
                false
            }
        }
    }

    /// Registered tags, for startup logging.
    pub fn registered_tags(&self) -> impl Iterator<Item = &ClientTag> {
        self.handlers.keys()
    }
}
