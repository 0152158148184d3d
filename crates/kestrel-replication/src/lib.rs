//! State replication between the authoritative world and client replicas.
//!
//! The server side turns change flags and the tick's removals into a [`Snapshot`]
//! each tick; the client side folds snapshots into a local [`World`] so that
//! it converges on the server's state as long as snapshots keep arriving.
//!
//! [`Snapshot`]: kestrel_net::Snapshot
//! [`World`]: kestrel_ecs::World

mod replica;
mod session;
mod snapshot;

pub use replica::{Applied, ApplyStats, ClientReplica};
pub use session::SessionMap;
pub use snapshot::SnapshotBuilder;
