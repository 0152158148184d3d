//! The network-component contract.
//!
//! A component type opts into replication by implementing
//! [`NetworkComponent`]: it converts itself to a compact record and can be
//! updated in place from one. Records are serialized with [`postcard`] and
//! use single-letter serde keys so that the human-readable debug framing
//! stays small too.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::catalogue::{ComponentData, ComponentKind};

/// Capability of a component to participate in replication.
///
/// `deserialize(serialize(x))` applied to any instance must yield a value
/// observably equal to `x`.
pub trait NetworkComponent: ComponentData + Default {
    /// Compact wire form of the component.
    type Record: Serialize + DeserializeOwned;

    /// Produces the wire record for the current state.
    fn serialize(&self) -> Self::Record;

    /// Overwrites this instance's replicated state from `record`.
    fn deserialize(&mut self, record: Self::Record);
}

/// Errors produced while encoding or decoding a component record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The component kind is local-only and has no wire form.
    #[error("component {0:?} is not networked")]
    NotNetworked(ComponentKind),

    /// The wire tag does not name a known component kind.
    #[error("unknown component tag {0}")]
    UnknownTag(u8),

    /// The record bytes were addressed to a different kind than the target.
    #[error("record for {expected:?} applied to {found:?}")]
    KindMismatch {
        /// Kind named by the record.
        expected: ComponentKind,
        /// Kind of the component being updated.
        found: ComponentKind,
    },

    /// Postcard encoding or decoding failed.
    #[error("record codec error: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Serializes a networked component to record bytes.
pub fn encode<T: NetworkComponent>(component: &T) -> Result<Vec<u8>, RecordError> {
    Ok(postcard::to_allocvec(&component.serialize())?)
}

/// Builds a fresh component from record bytes.
pub fn decode<T: NetworkComponent>(bytes: &[u8]) -> Result<T, RecordError> {
    let record: T::Record = postcard::from_bytes(bytes)?;
    let mut component = T::default();
    component.deserialize(record);
    Ok(component)
}

/// Updates an existing component from record bytes.
pub fn apply<T: NetworkComponent>(component: &mut T, bytes: &[u8]) -> Result<(), RecordError> {
    let record: T::Record = postcard::from_bytes(bytes)?;
    component.deserialize(record);
    Ok(())
}
