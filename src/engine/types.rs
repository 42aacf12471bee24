//! Core identifiers, capacities, and set value types.
//!
//! This module defines the numeric identifier types shared across the
//! engine, the storage layout constants, and the two independent
//! bitset-backed value types [`ComponentTypes`] and [`Tags`].
//!
//! Component types and tags occupy separate index spaces: the same index
//! can simultaneously name a component type in one space and a tag in the
//! other, and a `(ComponentTypes, Tags)` pair uniquely identifies an
//! archetype. Indices are assigned on first use by the
//! [`TypeRegistry`](crate::engine::registry::TypeRegistry); the reserved
//! [`Disabled`](crate::engine::registry::Disabled) tag always holds
//! [`DISABLED_TAG`].

use std::fmt;

use crate::engine::bitset::Bitset;
use crate::engine::registry::{Component, Tag, TypeRegistry};

/// Index of a component or tag type within its index space.
pub type TypeIndex = u16;

/// Identifier of an entity: an index into the store's entity table.
pub type EntityId = u32;

/// Identifier of an archetype: an index into the store's archetype list.
pub type ArchetypeId = u16;

/// Row index of an entity within its archetype.
pub type RowIndex = u32;

/// Maximum number of component types and, separately, tag types.
pub const TYPE_CAP: usize = 256;

/// Number of rows per storage chunk. Columns grow chunk by chunk and all
/// chunk-aligned iteration and job splitting uses this quantum.
pub const CHUNK_LEN: usize = 512;

/// Tag index reserved for the built-in `Disabled` tag.
pub const DISABLED_TAG: TypeIndex = 0;

/// Set of component type indices.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct ComponentTypes {
    bits: Bitset,
}

impl ComponentTypes {
    /// Creates an empty set.
    #[inline]
    pub const fn new() -> Self {
        Self { bits: Bitset::new() }
    }

    /// Adds the component type at `index`.
    #[inline]
    pub fn add(&mut self, index: TypeIndex) {
        self.bits.set(index as usize);
    }

    /// Removes the component type at `index`.
    #[inline]
    pub fn remove(&mut self, index: TypeIndex) {
        self.bits.clear(index as usize);
    }

    /// Returns `true` if the component type at `index` is present.
    #[inline]
    pub fn has(&self, index: TypeIndex) -> bool {
        self.bits.has(index as usize)
    }

    /// Returns `true` if every type in `other` is present.
    #[inline]
    pub fn has_all(&self, other: &ComponentTypes) -> bool {
        self.bits.has_all(&other.bits)
    }

    /// Returns `true` if at least one type in `other` is present.
    #[inline]
    pub fn has_any(&self, other: &ComponentTypes) -> bool {
        self.bits.has_any(&other.bits)
    }

    /// Number of component types in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.count()
    }

    /// Returns `true` if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Registers `T` in `registry` if needed and adds it to the set.
    #[inline]
    pub fn with<T: Component>(mut self, registry: &TypeRegistry) -> Self {
        self.add(registry.component_index::<T>());
        self
    }

    /// Iterates over member indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = TypeIndex> + '_ {
        self.bits.indices().map(|index| index as TypeIndex)
    }

    /// Underlying bitset.
    #[inline]
    pub(crate) fn bits(&self) -> &Bitset {
        &self.bits
    }
}

impl fmt::Display for ComponentTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ComponentTypes")?;
        f.debug_set().entries(self.bits.indices()).finish()
    }
}

/// Set of tag type indices.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct Tags {
    bits: Bitset,
}

impl Tags {
    /// Creates an empty set.
    #[inline]
    pub const fn new() -> Self {
        Self { bits: Bitset::new() }
    }

    /// Adds the tag at `index`.
    #[inline]
    pub fn add(&mut self, index: TypeIndex) {
        self.bits.set(index as usize);
    }

    /// Removes the tag at `index`.
    #[inline]
    pub fn remove(&mut self, index: TypeIndex) {
        self.bits.clear(index as usize);
    }

    /// Returns `true` if the tag at `index` is present.
    #[inline]
    pub fn has(&self, index: TypeIndex) -> bool {
        self.bits.has(index as usize)
    }

    /// Returns `true` if every tag in `other` is present.
    #[inline]
    pub fn has_all(&self, other: &Tags) -> bool {
        self.bits.has_all(&other.bits)
    }

    /// Returns `true` if at least one tag in `other` is present.
    #[inline]
    pub fn has_any(&self, other: &Tags) -> bool {
        self.bits.has_any(&other.bits)
    }

    /// Number of tags in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.count()
    }

    /// Returns `true` if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Registers `T` in `registry` if needed and adds it to the set.
    #[inline]
    pub fn with<T: Tag>(mut self, registry: &TypeRegistry) -> Self {
        self.add(registry.tag_index::<T>());
        self
    }

    /// Iterates over member indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = TypeIndex> + '_ {
        self.bits.indices().map(|index| index as TypeIndex)
    }

    /// Underlying bitset.
    #[inline]
    pub(crate) fn bits(&self) -> &Bitset {
        &self.bits
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tags")?;
        f.debug_set().entries(self.bits.indices()).finish()
    }
}
