//! Tag components: zero-sized markers used purely for filtering.
//!
//! Each [`EntityTag`] value has a matching zero-sized component type
//! [`TagComponent<TAG>`] (aliased as e.g. [`UpdateAabbTag`]). Tags are stored
//! in ordinary [`ComponentContainer`]s, which allocate nothing for a ZST, so
//! Systems can declare them in their descriptors like any other component.
//! The entity manager additionally mirrors every entity's tags in a
//! [`TagMask`] for O(1) runtime checks by enum value.

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentTypeId};
use crate::error::EcsError;
use crate::registry::{ComponentFlags, ComponentInterface, ComponentRegistry};

/// Zero-sized marker component for one [`EntityTag`] value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagComponent<const TAG: u8>;

impl<const TAG: u8> TagComponent<TAG> {
    const TAG_VALUE: EntityTag = match EntityTag::from_u8(TAG) {
        Some(tag) => tag,
        None => panic!("TagComponent instantiated with an unknown EntityTag value"),
    };

    /// The enum value this type stands for.
    #[must_use]
    pub const fn tag() -> EntityTag {
        Self::TAG_VALUE
    }
}

impl<const TAG: u8> Component for TagComponent<TAG> {
    fn type_name() -> &'static str {
        Self::TAG_VALUE.name()
    }
}

macro_rules! entity_tags {
    ($( $(#[$doc:meta])* $variant:ident = $value:literal => $alias:ident, )*) => {
        /// Marker values usable as zero-sized tag components.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum EntityTag {
            $( $(#[$doc])* $variant = $value, )*
        }

        impl EntityTag {
            /// Every tag, in discriminant order.
            pub const ALL: &'static [EntityTag] = &[$( EntityTag::$variant, )*];

            /// Component name of the matching tag type.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $( EntityTag::$variant => concat!("Tag.", stringify!($variant)), )*
                }
            }

            /// Inverse of `tag as u8`.
            #[must_use]
            pub const fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $( $value => Some(EntityTag::$variant), )*
                    _ => None,
                }
            }

            /// Registry interface of the matching tag component type.
            #[must_use]
            pub fn interface(self) -> ComponentInterface {
                let flags = ComponentFlags::TAG | ComponentFlags::SERIALIZABLE;
                match self {
                    $( EntityTag::$variant => ComponentInterface::of::<$alias>(flags), )*
                }
            }
        }

        $(
            #[doc = concat!("Tag component for [`EntityTag::", stringify!($variant), "`].")]
            pub type $alias = TagComponent<{ EntityTag::$variant as u8 }>;
        )*
    };
}

entity_tags! {
    /// Never moves after load.
    Static = 0 => StaticTag,
    /// Moves at runtime.
    Dynamic = 1 => DynamicTag,
    /// Bounding box must be recomputed from the transform.
    UpdateAabb = 2 => UpdateAabbTag,
    /// Render proxy must be rebuilt.
    UpdateRenderProxy = 3 => UpdateRenderProxyTag,
    /// Visibility state must be recomputed.
    UpdateVisibility = 4 => UpdateVisibilityTag,
    /// Contributes to baked lighting.
    LightmapElement = 5 => LightmapElementTag,
    /// Selected in the editor.
    EditorFocused = 6 => EditorFocusedTag,
}

impl EntityTag {
    /// Type id of the matching tag component.
    #[must_use]
    pub const fn component_type_id(self) -> ComponentTypeId {
        ComponentTypeId::from_name(self.name())
    }

    /// The tag whose component type id is `type_id`, if any.
    #[must_use]
    pub fn from_component_type(type_id: ComponentTypeId) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.component_type_id() == type_id)
    }

    /// Register every tag component type.
    ///
    /// # Errors
    ///
    /// Propagates [`EcsError::DuplicateRegistration`].
    pub fn register_all(registry: &ComponentRegistry) -> Result<(), EcsError> {
        for tag in Self::ALL {
            registry.register_interface(tag.interface())?;
        }
        Ok(())
    }
}

impl std::fmt::Display for EntityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitset of the tags an entity carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagMask(u64);

impl TagMask {
    /// The empty mask.
    pub const EMPTY: TagMask = TagMask(0);

    /// Set `tag`. Returns `true` if it was not set before.
    pub fn insert(&mut self, tag: EntityTag) -> bool {
        let bit = 1u64 << tag as u8;
        let added = self.0 & bit == 0;
        self.0 |= bit;
        added
    }

    /// Clear `tag`. Returns `true` if it was set.
    pub fn remove(&mut self, tag: EntityTag) -> bool {
        let bit = 1u64 << tag as u8;
        let removed = self.0 & bit != 0;
        self.0 &= !bit;
        removed
    }

    /// Returns `true` if `tag` is set.
    #[must_use]
    pub const fn contains(self, tag: EntityTag) -> bool {
        self.0 & (1u64 << tag as u8) != 0
    }

    /// Returns `true` if no tag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set tags in discriminant order.
    pub fn iter(self) -> impl Iterator<Item = EntityTag> {
        EntityTag::ALL.iter().copied().filter(move |t| self.contains(*t))
    }
}

impl FromIterator<EntityTag> for TagMask {
    fn from_iter<I: IntoIterator<Item = EntityTag>>(iter: I) -> Self {
        let mut mask = TagMask::EMPTY;
        for tag in iter {
            mask.insert(tag);
        }
        mask
    }
}
