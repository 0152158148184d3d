//! Component data types and their wire records.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::network::NetworkComponent;

/// Default number of chat lines a [`Chat`] component retains.
pub const DEFAULT_CHAT_CAPACITY: usize = 50;

/// World-space position, as reported by the physics collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Position {
    /// Creates a position.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Wire record for [`Position`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    x: f32,
    y: f32,
    z: f32,
}

impl NetworkComponent for Position {
    type Record = PositionRecord;

    fn serialize(&self) -> PositionRecord {
        PositionRecord {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    fn deserialize(&mut self, record: PositionRecord) {
        self.x = record.x;
        self.y = record.y;
        self.z = record.z;
    }
}

/// View orientation in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rotation {
    /// Heading around the vertical axis.
    pub yaw: f32,
    /// Elevation.
    pub pitch: f32,
}

/// Wire record for [`Rotation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationRecord {
    #[serde(rename = "y")]
    yaw: f32,
    #[serde(rename = "p")]
    pitch: f32,
}

impl NetworkComponent for Rotation {
    type Record = RotationRecord;

    fn serialize(&self) -> RotationRecord {
        RotationRecord {
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }

    fn deserialize(&mut self, record: RotationRecord) {
        self.yaw = record.yaw;
        self.pitch = record.pitch;
    }
}

/// Linear velocity in units per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

/// Wire record for [`Velocity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityRecord {
    x: f32,
    y: f32,
    z: f32,
}

impl NetworkComponent for Velocity {
    type Record = VelocityRecord;

    fn serialize(&self) -> VelocityRecord {
        VelocityRecord {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    fn deserialize(&mut self, record: VelocityRecord) {
        self.x = record.x;
        self.y = record.y;
        self.z = record.z;
    }
}

/// Hit points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Health {
    /// Remaining hit points. Zero or below means dead.
    pub current: i32,
    /// Upper bound restored on respawn.
    pub max: i32,
}

impl Health {
    /// Full health at `max`.
    pub fn full(max: i32) -> Self {
        Self { current: max, max }
    }

    /// Returns `true` once current health has dropped to zero or below.
    pub fn is_depleted(&self) -> bool {
        self.current <= 0
    }
}

/// Wire record for [`Health`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    #[serde(rename = "c")]
    current: i32,
    #[serde(rename = "m")]
    max: i32,
}

impl NetworkComponent for Health {
    type Record = HealthRecord;

    fn serialize(&self) -> HealthRecord {
        HealthRecord {
            current: self.current,
            max: self.max,
        }
    }

    fn deserialize(&mut self, record: HealthRecord) {
        self.current = record.current;
        self.max = record.max;
    }
}

/// Marks an entity as a connection's avatar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Player {
    /// Display name chosen at handshake.
    pub name: String,
}

/// Wire record for [`Player`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "n")]
    name: String,
}

impl NetworkComponent for Player {
    type Record = PlayerRecord;

    fn serialize(&self) -> PlayerRecord {
        PlayerRecord {
            name: self.name.clone(),
        }
    }

    fn deserialize(&mut self, record: PlayerRecord) {
        self.name = record.name;
    }
}

/// One posted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    /// Author display name.
    #[serde(rename = "a")]
    pub author: String,
    /// Message body.
    #[serde(rename = "m")]
    pub text: String,
}

/// Bounded chat history, held by the chat singleton entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    /// Oldest first.
    pub lines: VecDeque<ChatLine>,
    /// Maximum retained lines.
    pub capacity: usize,
}

impl Chat {
    /// Empty history retaining at most `capacity` lines.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a line, evicting the oldest when full.
    pub fn push(&mut self, author: impl Into<String>, text: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(ChatLine {
            author: author.into(),
            text: text.into(),
        });
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHAT_CAPACITY)
    }
}

/// Wire record for [`Chat`]. Capacity is a local policy and is not sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(rename = "l")]
    lines: Vec<ChatLine>,
}

impl NetworkComponent for Chat {
    type Record = ChatRecord;

    fn serialize(&self) -> ChatRecord {
        ChatRecord {
            lines: self.lines.iter().cloned().collect(),
        }
    }

    fn deserialize(&mut self, record: ChatRecord) {
        let skip = record.lines.len().saturating_sub(self.capacity);
        self.lines = record.lines.into_iter().skip(skip).collect();
    }
}

/// Pending damage. Attaching one is how a producer reports a hit; the combat
/// system applies and removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    /// Hit points to subtract.
    pub amount: i32,
    /// Entity credited with the hit, if any.
    pub source: Option<EntityId>,
}

/// Latest control state received from the owning connection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Input {
    /// Move forward.
    pub forward: bool,
    /// Move backward.
    pub back: bool,
    /// Strafe left.
    pub left: bool,
    /// Strafe right.
    pub right: bool,
    /// Jump.
    pub jump: bool,
    /// Desired heading in radians.
    pub yaw: f32,
}
