//! Entity store: owns archetypes, the entity index, and the registry.
//!
//! The archetype list is append-only; archetypes are never removed even
//! when they become empty, which is what allows queries to cache matched
//! archetypes and re-scan only the tail. The entity index maps each id to
//! its `(archetype, row)` location and recycles ids of deleted entities
//! through a free list.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::engine::archetype::{Archetype, EntityIndexUpdater};
use crate::engine::error::{EcsResult, MissingComponentError, RowOutOfBoundsError, StaleEntityError};
use crate::engine::query::{ArchetypeQuery, Query, Signature};
use crate::engine::registry::{Component, Disabled, Tag, TypeRegistry};
use crate::engine::runner::ParallelJobRunner;
use crate::engine::types::{ArchetypeId, ComponentTypes, EntityId, RowIndex, Tags};

#[derive(Clone, Copy, Default)]
struct EntityNode {
    archetype: ArchetypeId,
    row: RowIndex,
    alive: bool,
}

/// Adapter letting archetype storage repair the entity index after dense
/// removal, without storage knowing the index layout.
struct NodeUpdater<'a> {
    nodes: &'a mut [EntityNode],
}

impl EntityIndexUpdater for NodeUpdater<'_> {
    fn update_entity_row(&mut self, entity: EntityId, row: RowIndex) {
        self.nodes[entity as usize].row = row;
    }
}

/// Disjoint mutable access to two archetypes of one list.
fn archetype_pair_mut(
    archetypes: &mut [Archetype],
    first: ArchetypeId,
    second: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
    let first = first as usize;
    let second = second as usize;
    debug_assert_ne!(first, second);
    if first < second {
        let (left, right) = archetypes.split_at_mut(second);
        (&mut left[first], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(first);
        (&mut right[0], &mut left[second])
    }
}

/// Container for entities and their archetype storage.
pub struct EntityStore {
    registry: Arc<TypeRegistry>,
    archetypes: Vec<Archetype>,
    archetype_index: HashMap<(ComponentTypes, Tags), ArchetypeId>,
    nodes: Vec<EntityNode>,
    free_ids: Vec<EntityId>,
    live_count: usize,
    job_runner: Option<Arc<ParallelJobRunner>>,
}

impl EntityStore {
    /// Creates a store with its own registry and a default job runner
    /// sized to the logical CPU count.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TypeRegistry::new()))
    }

    /// Creates a store sharing `registry`, so type indices agree with
    /// other stores built on the same registry.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        let default_archetype = Archetype::new(0, ComponentTypes::new(), Tags::new(), &registry);
        let mut archetype_index = HashMap::new();
        archetype_index.insert((ComponentTypes::new(), Tags::new()), 0);
        Self {
            registry,
            archetypes: vec![default_archetype],
            archetype_index,
            nodes: Vec::new(),
            free_ids: Vec::new(),
            live_count: 0,
            job_runner: Some(Arc::new(ParallelJobRunner::with_available_parallelism())),
        }
    }

    /// The store's type registry.
    #[inline]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.live_count
    }

    /// Number of archetypes, including empty ones.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// The archetype with identifier `id`.
    #[inline]
    pub fn archetype(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id as usize]
    }

    #[inline]
    pub(crate) fn archetype_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id as usize]
    }

    /// Returns `true` if `entity` refers to a live entity.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.nodes.get(entity as usize).map(|node| node.alive).unwrap_or(false)
    }

    /// Location of `entity` as an `(archetype, row)` pair.
    pub fn entity_location(&self, entity: EntityId) -> EcsResult<(ArchetypeId, RowIndex)> {
        let node = self.node(entity)?;
        Ok((node.archetype, node.row))
    }

    /// Creates an entity with no components and no tags. Ids of deleted
    /// entities are recycled.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = match self.free_ids.pop() {
            Some(entity) => entity,
            None => {
                self.nodes.push(EntityNode::default());
                (self.nodes.len() - 1) as EntityId
            }
        };
        let row = self.archetypes[0].add_entity(entity);
        self.nodes[entity as usize] = EntityNode { archetype: 0, row, alive: true };
        self.live_count += 1;
        entity
    }

    /// Deletes `entity`, repacking its archetype densely.
    pub fn delete_entity(&mut self, entity: EntityId) -> EcsResult<()> {
        let node = self.node(entity)?;
        let EntityStore { archetypes, nodes, .. } = self;
        archetypes[node.archetype as usize]
            .move_last_components_to(node.row, &mut NodeUpdater { nodes: nodes.as_mut_slice() });
        self.nodes[entity as usize].alive = false;
        self.free_ids.push(entity);
        self.live_count -= 1;
        Ok(())
    }

    /// Attaches `value` to `entity`, migrating it to the archetype that
    /// also stores `T`. Overwrites in place if `T` is already present.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> EcsResult<()> {
        let index = self.registry.component_index::<T>();
        let node = self.node(entity)?;
        let archetype = &self.archetypes[node.archetype as usize];
        if !archetype.component_types().has(index) {
            let mut component_types = *archetype.component_types();
            let tags = *archetype.tags();
            component_types.add(index);
            self.migrate(entity, component_types, tags)?;
        }
        let node = self.nodes[entity as usize];
        let column = self.archetypes[node.archetype as usize]
            .column_as_mut::<T>(index)
            .expect("column present after migration");
        column.set(node.row, value);
        Ok(())
    }

    /// Detaches `T` from `entity`. Returns `false` if it was not present.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> EcsResult<bool> {
        let index = self.registry.component_index::<T>();
        let node = self.node(entity)?;
        let archetype = &self.archetypes[node.archetype as usize];
        if !archetype.component_types().has(index) {
            return Ok(false);
        }
        let mut component_types = *archetype.component_types();
        let tags = *archetype.tags();
        component_types.remove(index);
        self.migrate(entity, component_types, tags)?;
        Ok(true)
    }

    /// Adds tag `T` to `entity`. No-op if already present.
    pub fn add_tag<T: Tag>(&mut self, entity: EntityId) -> EcsResult<()> {
        let index = self.registry.tag_index::<T>();
        let node = self.node(entity)?;
        let archetype = &self.archetypes[node.archetype as usize];
        if archetype.tags().has(index) {
            return Ok(());
        }
        let component_types = *archetype.component_types();
        let mut tags = *archetype.tags();
        tags.add(index);
        self.migrate(entity, component_types, tags)
    }

    /// Removes tag `T` from `entity`. Returns `false` if it was absent.
    pub fn remove_tag<T: Tag>(&mut self, entity: EntityId) -> EcsResult<bool> {
        let index = self.registry.tag_index::<T>();
        let node = self.node(entity)?;
        let archetype = &self.archetypes[node.archetype as usize];
        if !archetype.tags().has(index) {
            return Ok(false);
        }
        let component_types = *archetype.component_types();
        let mut tags = *archetype.tags();
        tags.remove(index);
        self.migrate(entity, component_types, tags)?;
        Ok(true)
    }

    /// Returns `true` if live `entity` has component `T`.
    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        let index = self.registry.component_index::<T>();
        match self.node(entity) {
            Ok(node) => self.archetypes[node.archetype as usize].component_types().has(index),
            Err(_) => false,
        }
    }

    /// Returns `true` if live `entity` carries tag `T`.
    pub fn has_tag<T: Tag>(&self, entity: EntityId) -> bool {
        let index = self.registry.tag_index::<T>();
        match self.node(entity) {
            Ok(node) => self.archetypes[node.archetype as usize].tags().has(index),
            Err(_) => false,
        }
    }

    /// Reads component `T` of `entity`.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> EcsResult<&T> {
        let index = self.registry.component_index::<T>();
        let node = self.node(entity)?;
        let archetype = &self.archetypes[node.archetype as usize];
        let column = archetype
            .column_as::<T>(index)
            .ok_or(MissingComponentError { name: type_name::<T>() })?;
        let value = column.get(node.row).ok_or(RowOutOfBoundsError {
            row: node.row,
            entity_count: archetype.entity_count(),
        })?;
        Ok(value)
    }

    /// Mutable access to component `T` of `entity`.
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> EcsResult<&mut T> {
        let index = self.registry.component_index::<T>();
        let node = self.node(entity)?;
        let archetype = &mut self.archetypes[node.archetype as usize];
        let entity_count = archetype.entity_count();
        let column = archetype
            .column_as_mut::<T>(index)
            .ok_or(MissingComponentError { name: type_name::<T>() })?;
        let value = column
            .get_mut(node.row)
            .ok_or(RowOutOfBoundsError { row: node.row, entity_count })?;
        Ok(value)
    }

    /// Hides `entity` from queries by adding the [`Disabled`] tag.
    pub fn disable(&mut self, entity: EntityId) -> EcsResult<()> {
        self.add_tag::<Disabled>(entity)
    }

    /// Makes `entity` visible to queries again.
    pub fn enable(&mut self, entity: EntityId) -> EcsResult<()> {
        self.remove_tag::<Disabled>(entity).map(|_| ())
    }

    /// Returns `true` if live `entity` carries the [`Disabled`] tag.
    pub fn is_disabled(&self, entity: EntityId) -> bool {
        self.has_tag::<Disabled>(entity)
    }

    /// Builds a typed query over signature `S`, registering its component
    /// types in this store's registry.
    pub fn query<S: Signature>(&self) -> Query<S> {
        Query::new(Arc::clone(&self.registry))
    }

    /// Builds an untyped query requiring a dynamic component-type set.
    pub fn query_types(&self, required: ComponentTypes) -> ArchetypeQuery {
        ArchetypeQuery::new(required)
    }

    /// Builds a query pinned to a single archetype.
    pub fn archetype_entities(&self, archetype: ArchetypeId) -> ArchetypeQuery {
        ArchetypeQuery::single(archetype)
    }

    /// The store's default parallel job runner, if any.
    pub fn job_runner(&self) -> Option<&Arc<ParallelJobRunner>> {
        self.job_runner.as_ref()
    }

    /// Replaces (or removes) the store's default parallel job runner.
    pub fn set_job_runner(&mut self, runner: Option<Arc<ParallelJobRunner>>) {
        self.job_runner = runner;
    }

    fn node(&self, entity: EntityId) -> Result<EntityNode, StaleEntityError> {
        match self.nodes.get(entity as usize) {
            Some(node) if node.alive => Ok(*node),
            _ => Err(StaleEntityError),
        }
    }

    /// Existing archetype for the identity pair, or a freshly appended
    /// one. Appending never invalidates earlier archetype ids.
    fn archetype_of(&mut self, component_types: ComponentTypes, tags: Tags) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(&(component_types, tags)) {
            return id;
        }
        assert!(
            self.archetypes.len() < ArchetypeId::MAX as usize,
            "archetype capacity exceeded"
        );
        let id = self.archetypes.len() as ArchetypeId;
        self.archetypes.push(Archetype::new(id, component_types, tags, &self.registry));
        self.archetype_index.insert((component_types, tags), id);
        debug!("created archetype {id}: {component_types} {tags}");
        id
    }

    /// Moves `entity` into the archetype identified by the new pair,
    /// creating it if needed.
    fn migrate(
        &mut self,
        entity: EntityId,
        component_types: ComponentTypes,
        tags: Tags,
    ) -> EcsResult<()> {
        let node = self.nodes[entity as usize];
        let target = self.archetype_of(component_types, tags);
        if node.archetype == target {
            return Ok(());
        }
        let EntityStore { archetypes, nodes, .. } = self;
        let (source, dest) = archetype_pair_mut(archetypes, node.archetype, target);
        let new_row =
            source.move_entity_to(dest, node.row, &mut NodeUpdater { nodes: nodes.as_mut_slice() })?;
        let node = &mut self.nodes[entity as usize];
        node.archetype = target;
        node.row = new_row;
        Ok(())
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
