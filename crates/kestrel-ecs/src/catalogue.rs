//! The component catalogue: stable type tags, the [`Component`] sum type, and
//! typed projections into it.
//!
//! Every component type lives in one [`ComponentKind`] slot per entity, so a
//! lookup is a map access keyed by the tag rather than a runtime type query.
//! Tags below 64 are networked and travel in snapshots; tags from 64 up are
//! local to whichever process holds them.

use crate::components::{Chat, Damage, Health, Input, Player, Position, Rotation, Velocity};
use crate::network::{self, RecordError};

/// Typed view of one [`Component`] variant.
pub trait ComponentData: Sized + 'static {
    /// Catalogue tag of this type.
    const KIND: ComponentKind;

    /// Projects a shared reference out of the sum type.
    fn from_ref(component: &Component) -> Option<&Self>;

    /// Projects a mutable reference out of the sum type.
    fn from_mut(component: &mut Component) -> Option<&mut Self>;

    /// Extracts the owned value.
    fn from_component(component: Component) -> Option<Self>;

    /// Wraps the value in the sum type.
    fn into_component(self) -> Component;
}

macro_rules! component_catalogue {
    (
        networked { $( $net:ident = $net_tag:literal ),* $(,)? }
        local { $( $local:ident = $local_tag:literal ),* $(,)? }
    ) => {
        /// Stable small-integer identifier of a component type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum ComponentKind {
            $( #[doc = concat!("Tag for [`", stringify!($net), "`].")] $net = $net_tag, )*
            $( #[doc = concat!("Tag for [`", stringify!($local), "`].")] $local = $local_tag, )*
        }

        impl ComponentKind {
            /// Every kind, networked first.
            pub const ALL: &'static [ComponentKind] = &[
                $( ComponentKind::$net, )*
                $( ComponentKind::$local, )*
            ];

            /// Parses a wire tag.
            pub fn from_tag(tag: u8) -> Option<Self> {
                match tag {
                    $( $net_tag => Some(Self::$net), )*
                    $( $local_tag => Some(Self::$local), )*
                    _ => None,
                }
            }

            /// Wire tag of this kind.
            pub fn tag(self) -> u8 {
                self as u8
            }

            /// Whether components of this kind replicate.
            pub fn is_networked(self) -> bool {
                match self {
                    $( Self::$net => true, )*
                    $( Self::$local => false, )*
                }
            }

            /// Type name, for logs.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$net => stringify!($net), )*
                    $( Self::$local => stringify!($local), )*
                }
            }
        }

        /// A component value of any catalogued type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Component {
            $( #[allow(missing_docs)] $net($net), )*
            $( #[allow(missing_docs)] $local($local), )*
        }

        impl Component {
            /// Catalogue tag of the contained value.
            pub fn kind(&self) -> ComponentKind {
                match self {
                    $( Self::$net(_) => ComponentKind::$net, )*
                    $( Self::$local(_) => ComponentKind::$local, )*
                }
            }

            /// Encodes the component's wire record. Local kinds yield `None`.
            pub fn encode_record(&self) -> Result<Option<Vec<u8>>, RecordError> {
                match self {
                    $( Self::$net(c) => network::encode(c).map(Some), )*
                    $( Self::$local(_) => Ok(None), )*
                }
            }

            /// Builds a fresh component of `kind` from record bytes.
            pub fn decode_record(kind: ComponentKind, bytes: &[u8]) -> Result<Self, RecordError> {
                match kind {
                    $( ComponentKind::$net => network::decode::<$net>(bytes).map(Self::$net), )*
                    $( ComponentKind::$local => Err(RecordError::NotNetworked(kind)), )*
                }
            }

            /// Updates this component in place from record bytes of `kind`.
            pub fn apply_record(&mut self, kind: ComponentKind, bytes: &[u8]) -> Result<(), RecordError> {
                if self.kind() != kind {
                    return Err(RecordError::KindMismatch { expected: kind, found: self.kind() });
                }
                match self {
                    $( Self::$net(c) => network::apply(c, bytes), )*
                    $( Self::$local(_) => Err(RecordError::NotNetworked(kind)), )*
                }
            }
        }

        component_catalogue!(@data $( $net, )* $( $local, )*);
    };

    (@data $( $ty:ident, )*) => {
        $(
            impl ComponentData for $ty {
                const KIND: ComponentKind = ComponentKind::$ty;

                #[allow(unreachable_patterns)]
                fn from_ref(component: &Component) -> Option<&Self> {
                    match component {
                        Component::$ty(c) => Some(c),
                        _ => None,
                    }
                }

                #[allow(unreachable_patterns)]
                fn from_mut(component: &mut Component) -> Option<&mut Self> {
                    match component {
                        Component::$ty(c) => Some(c),
                        _ => None,
                    }
                }

                #[allow(unreachable_patterns)]
                fn from_component(component: Component) -> Option<Self> {
                    match component {
                        Component::$ty(c) => Some(c),
                        _ => None,
                    }
                }

                fn into_component(self) -> Component {
                    Component::$ty(self)
                }
            }

            impl From<$ty> for Component {
                fn from(value: $ty) -> Self {
                    Component::$ty(value)
                }
            }
        )*
    };
}

component_catalogue! {
    networked {
        Position = 1,
        Rotation = 2,
        Velocity = 3,
        Health = 4,
        Player = 5,
        Chat = 6,
    }
    local {
        Damage = 64,
        Input = 65,
    }
}
