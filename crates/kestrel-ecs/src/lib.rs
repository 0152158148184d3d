//! Entity-component-event runtime: the entity registry, the component
//! catalogue, the per-tick event bus, and the fixed-order tick scheduler.
//!
//! Everything hangs off an explicit [`World`] context that systems and message
//! handlers receive by reference. There are no globals.

mod catalogue;
pub mod components;
mod entity;
mod events;
pub mod network;
mod schedule;
mod world;

pub use catalogue::{Component, ComponentData, ComponentKind};
pub use components::{
    Chat, ChatLine, DEFAULT_CHAT_CAPACITY, Damage, Health, Input, Player, Position, Rotation,
    Velocity,
};
pub use entity::{
    Entity, EntityId, EntityKind, EntityManager, LiveEntities, get_entity_by_id,
};
pub use events::{Event, EventBus, EventKind, Stage};
pub use network::{NetworkComponent, RecordError};
pub use schedule::{DestroyQueue, System, TickReport, TickScheduler};
pub use world::{Mut, World, get_first_entity_with_component};
