//! Component and tag type registration.
//!
//! The [`TypeRegistry`] is an explicit object owned (behind an `Arc`) by
//! each store rather than process-global state: two stores with separate
//! registries may assign different indices to the same Rust type, and
//! stores that must agree on indices share one registry.
//!
//! Indices are assigned on first use, monotonically and idempotently, from
//! an atomic claim counter per index space. Component registration also
//! records a column factory so archetypes can allocate storage for a type
//! index without knowing the concrete type.
//!
//! The built-in [`Disabled`] tag is registered eagerly at construction and
//! always occupies [`DISABLED_TAG`](crate::engine::types::DISABLED_TAG).

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::RwLock;

use crate::engine::archetype::{Column, TypeErasedColumn};
use crate::engine::types::{TypeIndex, DISABLED_TAG, TYPE_CAP};

/// Data stored per entity, in a dense column per archetype.
///
/// `Default` provides the value written into target-only columns during
/// archetype migration; `Clone` lets chunk snapshots and cross-archetype
/// moves copy rows.
pub trait Component: Clone + Default + Send + Sync + 'static {}

/// Zero-sized marker attached to entities. Tags occupy no storage; they
/// only contribute to archetype identity and query filtering.
pub trait Tag: Send + Sync + 'static {}

/// Built-in tag excluding an entity from query results by default.
///
/// Queries skip archetypes carrying `Disabled` unless
/// [`with_disabled`](crate::engine::query::ArchetypeQuery::with_disabled)
/// opts back in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Disabled;

impl Tag for Disabled {}

/// Allocates an empty, type-erased column for a registered component type.
pub type ColumnFactory = fn() -> Box<dyn TypeErasedColumn>;

fn make_column<T: Component>() -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::new())
}

struct ComponentSlot {
    name: &'static str,
    factory: ColumnFactory,
}

#[derive(Default)]
struct ComponentSpace {
    by_type: HashMap<TypeId, TypeIndex>,
    slots: Vec<ComponentSlot>,
}

#[derive(Default)]
struct TagSpace {
    by_type: HashMap<TypeId, TypeIndex>,
    names: Vec<&'static str>,
}

/// Per-store registry mapping Rust types to stable [`TypeIndex`] values.
pub struct TypeRegistry {
    components: RwLock<ComponentSpace>,
    tags: RwLock<TagSpace>,
    next_component: AtomicU16,
    next_tag: AtomicU16,
}

impl TypeRegistry {
    /// Creates a registry with the [`Disabled`] tag pre-registered at
    /// index 0.
    pub fn new() -> Self {
        let registry = Self {
            components: RwLock::new(ComponentSpace::default()),
            tags: RwLock::new(TagSpace::default()),
            next_component: AtomicU16::new(0),
            next_tag: AtomicU16::new(0),
        };
        let disabled = registry.tag_index::<Disabled>();
        debug_assert_eq!(disabled, DISABLED_TAG);
        registry
    }

    /// Returns the index of component type `T`, registering it on first
    /// use. Idempotent: repeated calls for one type yield one index.
    pub fn component_index<T: Component>(&self) -> TypeIndex {
        let type_id = TypeId::of::<T>();
        if let Some(&index) = self.components.read().unwrap().by_type.get(&type_id) {
            return index;
        }
        let mut space = self.components.write().unwrap();
        // Recheck under the write lock: another thread may have claimed
        // the index between the read and the write.
        if let Some(&index) = space.by_type.get(&type_id) {
            return index;
        }
        let index = self.next_component.fetch_add(1, Ordering::Relaxed);
        assert!(
            (index as usize) < TYPE_CAP,
            "component type capacity ({TYPE_CAP}) exceeded"
        );
        space.by_type.insert(type_id, index);
        space.slots.push(ComponentSlot {
            name: type_name::<T>(),
            factory: make_column::<T>,
        });
        index
    }

    /// Returns the index of tag type `T`, registering it on first use.
    pub fn tag_index<T: Tag>(&self) -> TypeIndex {
        let type_id = TypeId::of::<T>();
        if let Some(&index) = self.tags.read().unwrap().by_type.get(&type_id) {
            return index;
        }
        let mut space = self.tags.write().unwrap();
        if let Some(&index) = space.by_type.get(&type_id) {
            return index;
        }
        let index = self.next_tag.fetch_add(1, Ordering::Relaxed);
        assert!(
            (index as usize) < TYPE_CAP,
            "tag type capacity ({TYPE_CAP}) exceeded"
        );
        space.by_type.insert(type_id, index);
        space.names.push(type_name::<T>());
        index
    }

    /// Number of registered component types.
    pub fn component_count(&self) -> usize {
        self.next_component.load(Ordering::Relaxed) as usize
    }

    /// Number of registered tag types.
    pub fn tag_count(&self) -> usize {
        self.next_tag.load(Ordering::Relaxed) as usize
    }

    /// Human-readable name of the component type at `index`.
    pub fn component_name(&self, index: TypeIndex) -> Option<&'static str> {
        self.components
            .read()
            .unwrap()
            .slots
            .get(index as usize)
            .map(|slot| slot.name)
    }

    /// Human-readable name of the tag type at `index`.
    pub fn tag_name(&self, index: TypeIndex) -> Option<&'static str> {
        self.tags.read().unwrap().names.get(index as usize).copied()
    }

    /// Allocates an empty column for the component type at `index`.
    ///
    /// Panics if `index` was never registered; archetype construction only
    /// passes indices taken from registered [`ComponentTypes`] sets.
    ///
    /// [`ComponentTypes`]: crate::engine::types::ComponentTypes
    pub(crate) fn new_column(&self, index: TypeIndex) -> Box<dyn TypeErasedColumn> {
        (self.components.read().unwrap().slots[index as usize].factory)()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Position {
        _x: f32,
        _y: f32,
    }
    impl Component for Position {}

    #[derive(Clone, Default)]
    struct Velocity {
        _dx: f32,
        _dy: f32,
    }
    impl Component for Velocity {}

    struct Frozen;
    impl Tag for Frozen {}

    #[test]
    fn indices_are_stable_and_monotonic() {
        let registry = TypeRegistry::new();
        let position = registry.component_index::<Position>();
        let velocity = registry.component_index::<Velocity>();
        assert_eq!(position, 0);
        assert_eq!(velocity, 1);
        assert_eq!(registry.component_index::<Position>(), position);
        assert_eq!(registry.component_count(), 2);
    }

    #[test]
    fn disabled_tag_claims_index_zero() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.tag_index::<Disabled>(), DISABLED_TAG);
        assert_eq!(registry.tag_index::<Frozen>(), 1);
    }

    #[test]
    fn separate_registries_assign_independently() {
        let a = TypeRegistry::new();
        let b = TypeRegistry::new();
        a.component_index::<Position>();
        let velocity_in_a = a.component_index::<Velocity>();
        let velocity_in_b = b.component_index::<Velocity>();
        assert_eq!(velocity_in_a, 1);
        assert_eq!(velocity_in_b, 0);
        assert_ne!(a.component_name(0), b.component_name(0));
    }
}
