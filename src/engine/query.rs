//! Query construction and chunked iteration over matching archetypes.
//!
//! An [`ArchetypeQuery`] owns a [`QueryFilter`] plus a cached list of
//! matching archetype ids. Because the store's archetype list is
//! append-only, a refresh only scans archetypes created since the last
//! refresh; results for previously scanned archetypes stay valid forever.
//! Mutating the filter resets the cache. A query pinned to a single
//! archetype skips matching entirely.
//!
//! [`Query<S>`] layers typed access on top for tuple signatures of arity
//! 1 to 5: column indices are resolved once against the registry, and
//! iteration visits each matched chunk with one fixed-length slice per
//! component type plus the parallel entity-id slice. A component position
//! marked read-only is served from a private per-chunk snapshot buffer,
//! so writes through its slice are discarded rather than observed.
//!
//! Queries hold no borrows into the store; the store is passed to each
//! call, and results always reflect the store's current state.

use std::any::type_name;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::engine::archetype::{Archetype, Column};
use crate::engine::error::QueryError;
use crate::engine::filter::QueryFilter;
use crate::engine::registry::{Component, TypeRegistry};
use crate::engine::store::EntityStore;
use crate::engine::types::{ArchetypeId, ComponentTypes, EntityId, Tags, TypeIndex};

/// Filtered, incrementally cached selection of archetypes.
pub struct ArchetypeQuery {
    required: ComponentTypes,
    filter: QueryFilter,
    pub(crate) matched: Vec<ArchetypeId>,
    last_archetype_count: usize,
    single: Option<ArchetypeId>,
}

impl ArchetypeQuery {
    /// Creates a query matching archetypes that store at least the
    /// component types in `required`.
    pub fn new(required: ComponentTypes) -> Self {
        Self {
            required,
            filter: QueryFilter::new(),
            matched: Vec::new(),
            last_archetype_count: 0,
            single: None,
        }
    }

    /// Creates a query pinned to exactly one archetype, bypassing
    /// matching.
    pub fn single(archetype: ArchetypeId) -> Self {
        Self {
            required: ComponentTypes::new(),
            filter: QueryFilter::new(),
            matched: vec![archetype],
            last_archetype_count: 0,
            single: Some(archetype),
        }
    }

    fn reset_cache(&mut self) {
        if self.single.is_none() {
            self.matched.clear();
            self.last_archetype_count = 0;
        }
    }

    /// Requires every tag in `tags`. Resets the cache.
    pub fn all_tags(&mut self, tags: &Tags) -> &mut Self {
        self.filter.all_tags(tags);
        self.reset_cache();
        self
    }

    /// Requires at least one tag in `tags`. Resets the cache.
    pub fn any_tags(&mut self, tags: &Tags) -> &mut Self {
        self.filter.any_tags(tags);
        self.reset_cache();
        self
    }

    /// Excludes archetypes carrying every tag in `tags`. Resets the
    /// cache.
    pub fn without_all_tags(&mut self, tags: &Tags) -> &mut Self {
        self.filter.without_all_tags(tags);
        self.reset_cache();
        self
    }

    /// Excludes archetypes carrying any tag in `tags`. Resets the cache.
    pub fn without_any_tags(&mut self, tags: &Tags) -> &mut Self {
        self.filter.without_any_tags(tags);
        self.reset_cache();
        self
    }

    /// Requires every component type in `types`. Resets the cache.
    pub fn all_components(&mut self, types: &ComponentTypes) -> &mut Self {
        self.filter.all_components(types);
        self.reset_cache();
        self
    }

    /// Requires at least one component type in `types`. Resets the cache.
    pub fn any_components(&mut self, types: &ComponentTypes) -> &mut Self {
        self.filter.any_components(types);
        self.reset_cache();
        self
    }

    /// Excludes archetypes storing every component type in `types`.
    /// Resets the cache.
    pub fn without_all_components(&mut self, types: &ComponentTypes) -> &mut Self {
        self.filter.without_all_components(types);
        self.reset_cache();
        self
    }

    /// Excludes archetypes storing any component type in `types`. Resets
    /// the cache.
    pub fn without_any_components(&mut self, types: &ComponentTypes) -> &mut Self {
        self.filter.without_any_components(types);
        self.reset_cache();
        self
    }

    /// Includes entities carrying the `Disabled` tag, which are excluded
    /// by default. Resets the cache.
    pub fn with_disabled(&mut self) -> &mut Self {
        self.filter.with_disabled();
        self.reset_cache();
        self
    }

    fn is_match(&self, archetype: &Archetype) -> bool {
        archetype.component_types().has_all(&self.required)
            && self.filter.is_tags_match(archetype.tags())
            && self.filter.is_components_match(archetype.component_types())
    }

    /// Brings the matched-archetype cache up to date by scanning only the
    /// archetypes appended since the previous refresh.
    pub fn refresh(&mut self, store: &EntityStore) {
        if self.single.is_some() {
            return;
        }
        let count = store.archetype_count();
        if count == self.last_archetype_count {
            return;
        }
        for index in self.last_archetype_count..count {
            let archetype = store.archetype(index as ArchetypeId);
            if self.is_match(archetype) {
                self.matched.push(archetype.id());
            }
        }
        self.last_archetype_count = count;
    }

    /// Ids of the matched archetypes, after refreshing against `store`.
    pub fn archetypes(&mut self, store: &EntityStore) -> &[ArchetypeId] {
        self.refresh(store);
        &self.matched
    }

    /// Total number of entities in matched archetypes.
    pub fn entity_count(&mut self, store: &EntityStore) -> usize {
        self.refresh(store);
        self.matched
            .iter()
            .map(|&id| store.archetype(id).entity_count())
            .sum()
    }

    /// Total number of non-empty chunks in matched archetypes.
    pub fn chunk_count(&mut self, store: &EntityStore) -> usize {
        self.refresh(store);
        self.matched
            .iter()
            .map(|&id| store.archetype(id).chunk_count())
            .sum()
    }

    /// Visits the id of every entity in matched archetypes.
    pub fn for_each_entity<F: FnMut(EntityId)>(&mut self, store: &EntityStore, mut action: F) {
        self.refresh(store);
        for &id in &self.matched {
            for &entity in store.archetype(id).entity_ids() {
                action(entity);
            }
        }
    }
}

/// Tuple of component types forming a typed query signature.
pub trait Signature: 'static {
    /// Number of component types in the signature.
    const ARITY: usize;

    /// Registers the signature's component types in `registry` and
    /// returns their column indices in tuple order.
    fn column_indices(registry: &TypeRegistry) -> Vec<TypeIndex>;
}

/// Typed query over the component tuple `S`.
///
/// Dereferences to [`ArchetypeQuery`] for filter configuration.
pub struct Query<S: Signature> {
    pub(crate) base: ArchetypeQuery,
    registry: Arc<TypeRegistry>,
    pub(crate) indices: Vec<TypeIndex>,
    pub(crate) read_only: Vec<bool>,
    _signature: PhantomData<S>,
}

impl<S: Signature> Query<S> {
    pub(crate) fn new(registry: Arc<TypeRegistry>) -> Self {
        let indices = S::column_indices(&registry);
        for (position, &index) in indices.iter().enumerate() {
            assert!(
                !indices[..position].contains(&index),
                "duplicate component type in query signature"
            );
        }
        let mut required = ComponentTypes::new();
        for &index in &indices {
            required.add(index);
        }
        Self {
            base: ArchetypeQuery::new(required),
            registry,
            indices,
            read_only: vec![false; S::ARITY],
            _signature: PhantomData,
        }
    }

    /// Serves component `T` from a private snapshot during iteration, so
    /// writes through its slice are discarded. `T` must be part of the
    /// signature.
    pub fn mark_read_only<T: Component>(&mut self) -> Result<&mut Self, QueryError> {
        let index = self.registry.component_index::<T>();
        match self.indices.iter().position(|&candidate| candidate == index) {
            Some(position) => {
                self.read_only[position] = true;
                Ok(self)
            }
            None => Err(QueryError::NotInSignature { name: type_name::<T>() }),
        }
    }
}

impl<S: Signature> Deref for Query<S> {
    type Target = ArchetypeQuery;

    fn deref(&self) -> &ArchetypeQuery {
        &self.base
    }
}

impl<S: Signature> DerefMut for Query<S> {
    fn deref_mut(&mut self) -> &mut ArchetypeQuery {
        &mut self.base
    }
}

macro_rules! impl_signature {
    ($(($($name:ident),+) => $arity:expr;)+) => {
        $(
            impl<$($name: Component),+> Signature for ($($name,)+) {
                const ARITY: usize = $arity;

                fn column_indices(registry: &TypeRegistry) -> Vec<TypeIndex> {
                    vec![$(registry.component_index::<$name>()),+]
                }
            }
        )+
    };
}

impl_signature! {
    (A) => 1;
    (A, B) => 2;
    (A, B, C) => 3;
    (A, B, C, D) => 4;
    (A, B, C, D, E) => 5;
}

macro_rules! impl_query_iteration {
    ($(($($name:ident / $index:tt),+);)+) => {
        $(
            impl<$($name: Component),+> Query<($($name,)+)> {
                /// Visits each matched chunk with one component slice per
                /// signature position and the parallel entity-id slice.
                #[allow(non_snake_case)]
                pub fn for_each_chunk<F>(&mut self, store: &EntityStore, mut action: F)
                where
                    F: FnMut($(&[$name],)+ &[EntityId]),
                {
                    self.base.refresh(store);
                    $(let mut $name: Vec<$name> = Vec::new();)+
                    for position in 0..self.base.matched.len() {
                        let archetype = store.archetype(self.base.matched[position]);
                        let columns = ($(
                            archetype
                                .column_as::<$name>(self.indices[$index])
                                .expect("query column matches its registered type"),
                        )+);
                        for chunk in 0..archetype.chunk_count() {
                            let len = archetype.chunk_len(chunk);
                            let ids = archetype.entity_id_chunk(chunk);
                            action(
                                $(
                                    if self.read_only[$index] {
                                        $name.clear();
                                        $name.extend_from_slice(columns.$index.chunk_slice(chunk, len));
                                        &$name[..]
                                    } else {
                                        columns.$index.chunk_slice(chunk, len)
                                    },
                                )+
                                ids,
                            );
                        }
                    }
                }

                /// Visits each matched chunk with mutable component
                /// slices. Positions marked read-only receive a snapshot
                /// whose mutations are discarded.
                #[allow(non_snake_case)]
                pub fn for_each_chunk_mut<F>(&mut self, store: &mut EntityStore, mut action: F)
                where
                    F: FnMut($(&mut [$name],)+ &[EntityId]),
                {
                    self.base.refresh(store);
                    $(let mut $name: Vec<$name> = Vec::new();)+
                    for position in 0..self.base.matched.len() {
                        let archetype: *mut Archetype =
                            store.archetype_mut(self.base.matched[position]);
                        // SAFETY: every access below goes through this one
                        // pointer while the store stays exclusively
                        // borrowed. Columns of distinct signature positions
                        // never alias (duplicate types are rejected in
                        // `new`), and the entity-id slice lives outside all
                        // column storage.
                        unsafe {
                            let chunk_count = (*archetype).chunk_count();
                            let columns = ($(
                                (*archetype)
                                    .column_as_mut::<$name>(self.indices[$index])
                                    .expect("query column matches its registered type")
                                    as *mut Column<$name>,
                            )+);
                            for chunk in 0..chunk_count {
                                let len = (*archetype).chunk_len(chunk);
                                let ids = (*archetype).entity_id_chunk(chunk);
                                action(
                                    $(
                                        if self.read_only[$index] {
                                            $name.clear();
                                            $name.extend_from_slice(
                                                (*columns.$index).chunk_slice(chunk, len),
                                            );
                                            &mut $name[..]
                                        } else {
                                            (*columns.$index).chunk_slice_mut(chunk, len)
                                        },
                                    )+
                                    ids,
                                );
                            }
                        }
                    }
                }

                /// Visits every matched entity with read-only component
                /// references.
                #[allow(non_snake_case)]
                pub fn for_each<F>(&mut self, store: &EntityStore, mut action: F)
                where
                    F: FnMut(EntityId, $(&$name),+),
                {
                    self.for_each_chunk(store, |$($name,)+ ids| {
                        for (row, &entity) in ids.iter().enumerate() {
                            action(entity, $(&$name[row]),+);
                        }
                    });
                }

                /// Visits every matched entity with mutable component
                /// references.
                #[allow(non_snake_case)]
                pub fn for_each_mut<F>(&mut self, store: &mut EntityStore, mut action: F)
                where
                    F: FnMut(EntityId, $(&mut $name),+),
                {
                    self.for_each_chunk_mut(store, |$($name,)+ ids| {
                        for (row, &entity) in ids.iter().enumerate() {
                            action(entity, $(&mut $name[row]),+);
                        }
                    });
                }
            }
        )+
    };
}

impl_query_iteration! {
    (A / 0);
    (A / 0, B / 1);
    (A / 0, B / 1, C / 2);
    (A / 0, B / 1, C / 2, D / 3);
    (A / 0, B / 1, C / 2, D / 3, E / 4);
}
