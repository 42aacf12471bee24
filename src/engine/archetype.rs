//! Archetype storage: chunked component columns and dense entity rows.
//!
//! An [`Archetype`] owns every entity whose component-type set and tag set
//! equal the archetype's `(ComponentTypes, Tags)` identity. Per present
//! component type it holds one [`Column<T>`] behind the type-erased
//! [`TypeErasedColumn`] trait, addressed by [`TypeIndex`] through a
//! fixed-size lookup table — no hashing on the row paths.
//!
//! ## Layout
//!
//! Columns store values in fixed-length chunks
//! (`Vec<Box<[T; CHUNK_LEN]>>`). Growth appends whole chunks and never
//! moves existing ones, so a `&[T]` chunk slice stays valid while rows are
//! appended behind it. All columns of an archetype share one
//! `entity_count`; row `i` of every column plus `entity_ids[i]` together
//! form one entity. Rows in `[entity_count, capacity)` exist physically
//! but hold stale or default data and must never be read.
//!
//! ## Dense removal
//!
//! Removal keeps rows dense by moving the last row into the vacated slot
//! ([`Archetype::move_last_components_to`]). The entity that supplied the
//! last row changes its row index, which the caller's entity index learns
//! about through the single-method [`EntityIndexUpdater`] callback —
//! storage never reaches into the index directly.
//!
//! ## Migration
//!
//! [`Archetype::move_entity_to`] transfers one row to another archetype:
//! shared columns copy their value across, target-only columns take the
//! component's default, and the source repacks itself. The caller updates
//! the moved entity's own index entry with the returned row.

use std::any::{type_name, Any, TypeId};

use crate::engine::error::{RowOutOfBoundsError, TypeMismatchError};
use crate::engine::registry::{Component, TypeRegistry};
use crate::engine::types::{
    ArchetypeId, ComponentTypes, EntityId, RowIndex, Tags, TypeIndex, CHUNK_LEN, TYPE_CAP,
};

/// Receives row updates when dense removal relocates an entity.
///
/// Implemented by the entity index of the owning store; injected into
/// removal and migration so column storage stays decoupled from entity
/// bookkeeping.
pub trait EntityIndexUpdater {
    /// Records that `entity` now lives at `row` within its archetype.
    fn update_entity_row(&mut self, entity: EntityId, row: RowIndex);
}

/// Chunked storage for all values of one component type in one archetype.
///
/// Chunks are boxed fixed-length arrays; slots are default-initialized at
/// allocation and overwritten in place, so no initialization tracking is
/// needed. Validity of a row is the owning archetype's concern.
pub struct Column<T: Component> {
    chunks: Vec<Box<[T; CHUNK_LEN]>>,
}

impl<T: Component> Column<T> {
    /// Creates an empty column with no chunks allocated.
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Returns the value at `row`, or `None` past the allocated capacity.
    #[inline]
    pub fn get(&self, row: RowIndex) -> Option<&T> {
        let row = row as usize;
        self.chunks.get(row / CHUNK_LEN)?.get(row % CHUNK_LEN)
    }

    /// Mutable access to the value at `row`.
    #[inline]
    pub fn get_mut(&mut self, row: RowIndex) -> Option<&mut T> {
        let row = row as usize;
        self.chunks.get_mut(row / CHUNK_LEN)?.get_mut(row % CHUNK_LEN)
    }

    /// Overwrites the value at `row`. The row must be within capacity.
    #[inline]
    pub fn set(&mut self, row: RowIndex, value: T) {
        let row = row as usize;
        self.chunks[row / CHUNK_LEN][row % CHUNK_LEN] = value;
    }

    /// The first `len` rows of chunk `chunk` as a slice.
    #[inline]
    pub fn chunk_slice(&self, chunk: usize, len: usize) -> &[T] {
        &self.chunks[chunk][..len]
    }

    /// The first `len` rows of chunk `chunk` as a mutable slice.
    #[inline]
    pub fn chunk_slice_mut(&mut self, chunk: usize, len: usize) -> &mut [T] {
        &mut self.chunks[chunk][..len]
    }
}

impl<T: Component> Default for Column<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased interface over [`Column<T>`].
///
/// Lets an archetype hold heterogeneous columns and move rows between
/// archetypes without knowing element types. Typed access goes through
/// [`as_any`](TypeErasedColumn::as_any) downcasts.
pub trait TypeErasedColumn: Send + Sync {
    /// Upcast for downcasting to the concrete [`Column<T>`].
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete [`Column<T>`].
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// [`TypeId`] of the element type `T`.
    fn element_type_id(&self) -> TypeId;

    /// Human-readable name of the element type.
    fn element_type_name(&self) -> &'static str;

    /// Number of allocated rows (a multiple of `CHUNK_LEN`).
    fn capacity(&self) -> usize;

    /// Grows the column until at least `rows` rows are allocated.
    /// Existing chunks are never moved.
    fn ensure_capacity(&mut self, rows: usize);

    /// Copies the value at `from` over the value at `to`.
    fn copy_row(&mut self, from: RowIndex, to: RowIndex);

    /// Resets the value at `row` to the element type's default.
    fn reset_row(&mut self, row: RowIndex);

    /// Copies the value at `from` into row `to` of `target`, which must
    /// store the same element type.
    fn move_row_to(
        &self,
        target: &mut dyn TypeErasedColumn,
        from: RowIndex,
        to: RowIndex,
    ) -> Result<(), TypeMismatchError>;
}

impl<T: Component> TypeErasedColumn for Column<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn capacity(&self) -> usize {
        self.chunks.len() * CHUNK_LEN
    }

    fn ensure_capacity(&mut self, rows: usize) {
        while self.chunks.len() * CHUNK_LEN < rows {
            self.chunks.push(Box::new(std::array::from_fn(|_| T::default())));
        }
    }

    fn copy_row(&mut self, from: RowIndex, to: RowIndex) {
        let from = from as usize;
        let value = self.chunks[from / CHUNK_LEN][from % CHUNK_LEN].clone();
        let to = to as usize;
        self.chunks[to / CHUNK_LEN][to % CHUNK_LEN] = value;
    }

    fn reset_row(&mut self, row: RowIndex) {
        let row = row as usize;
        self.chunks[row / CHUNK_LEN][row % CHUNK_LEN] = T::default();
    }

    fn move_row_to(
        &self,
        target: &mut dyn TypeErasedColumn,
        from: RowIndex,
        to: RowIndex,
    ) -> Result<(), TypeMismatchError> {
        let actual = target.element_type_id();
        let dest = target
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .ok_or(TypeMismatchError { expected: TypeId::of::<T>(), actual })?;
        let from = from as usize;
        let value = self.chunks[from / CHUNK_LEN][from % CHUNK_LEN].clone();
        dest.set(to, value);
        Ok(())
    }
}

/// Dense columnar storage for all entities sharing one
/// `(ComponentTypes, Tags)` identity.
pub struct Archetype {
    id: ArchetypeId,
    component_types: ComponentTypes,
    tags: Tags,
    /// Direct-index lookup table, `TYPE_CAP` entries; `Some` exactly at
    /// the indices present in `component_types`.
    columns: Vec<Option<Box<dyn TypeErasedColumn>>>,
    /// Present component indices in ascending order, for iteration.
    column_order: Vec<TypeIndex>,
    /// Entity id per live row; always `entity_count` long.
    entity_ids: Vec<EntityId>,
    entity_count: usize,
    capacity: usize,
}

impl Archetype {
    /// Creates an empty archetype, allocating one column per component
    /// type in `component_types` from the registry's factories.
    pub fn new(
        id: ArchetypeId,
        component_types: ComponentTypes,
        tags: Tags,
        registry: &TypeRegistry,
    ) -> Self {
        let mut columns: Vec<Option<Box<dyn TypeErasedColumn>>> =
            (0..TYPE_CAP).map(|_| None).collect();
        let mut column_order = Vec::with_capacity(component_types.len());
        for index in component_types.indices() {
            columns[index as usize] = Some(registry.new_column(index));
            column_order.push(index);
        }
        Self {
            id,
            component_types,
            tags,
            columns,
            column_order,
            entity_ids: Vec::new(),
            entity_count: 0,
            capacity: 0,
        }
    }

    /// Identifier of this archetype within its store.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Component types stored by this archetype.
    #[inline]
    pub fn component_types(&self) -> &ComponentTypes {
        &self.component_types
    }

    /// Tags carried by every entity of this archetype.
    #[inline]
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Number of live rows.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Number of allocated rows (a multiple of `CHUNK_LEN`).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of chunks holding at least one live row.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.entity_count.div_ceil(CHUNK_LEN)
    }

    /// Number of live rows in chunk `chunk`. Only the last chunk may be
    /// partially filled.
    #[inline]
    pub fn chunk_len(&self, chunk: usize) -> usize {
        debug_assert!(chunk < self.chunk_count());
        (self.entity_count - chunk * CHUNK_LEN).min(CHUNK_LEN)
    }

    /// Ids of all live entities, one per row.
    #[inline]
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.entity_ids
    }

    /// Id of the entity at `row`.
    pub fn entity_id(&self, row: RowIndex) -> Result<EntityId, RowOutOfBoundsError> {
        self.entity_ids
            .get(row as usize)
            .copied()
            .ok_or(RowOutOfBoundsError { row, entity_count: self.entity_count })
    }

    /// Entity ids of chunk `chunk`, parallel to the component chunk
    /// slices of the same index.
    #[inline]
    pub fn entity_id_chunk(&self, chunk: usize) -> &[EntityId] {
        let start = chunk * CHUNK_LEN;
        &self.entity_ids[start..start + self.chunk_len(chunk)]
    }

    /// Type-erased column for the component type at `index`.
    #[inline]
    pub fn column(&self, index: TypeIndex) -> Option<&dyn TypeErasedColumn> {
        self.columns[index as usize].as_deref()
    }

    /// Mutable type-erased column for the component type at `index`.
    ///
    /// The object lifetime is spelled out: `&mut` is invariant, so the
    /// boxed column cannot be returned under an elided object lifetime.
    #[inline]
    pub fn column_mut(&mut self, index: TypeIndex) -> Option<&mut (dyn TypeErasedColumn + 'static)> {
        self.columns[index as usize].as_deref_mut()
    }

    /// Typed column for the component type at `index`, or `None` if the
    /// index is absent or registered for a different element type.
    #[inline]
    pub fn column_as<T: Component>(&self, index: TypeIndex) -> Option<&Column<T>> {
        self.column(index)?.as_any().downcast_ref::<Column<T>>()
    }

    /// Mutable typed column for the component type at `index`.
    #[inline]
    pub fn column_as_mut<T: Component>(&mut self, index: TypeIndex) -> Option<&mut Column<T>> {
        self.column_mut(index)?.as_any_mut().downcast_mut::<Column<T>>()
    }

    /// Grows every column until at least `rows` rows are allocated.
    /// Capacity only ever increases, in whole-chunk steps.
    pub fn ensure_capacity(&mut self, rows: usize) {
        if rows <= self.capacity {
            return;
        }
        let chunks = rows.div_ceil(CHUNK_LEN);
        for &index in &self.column_order {
            if let Some(column) = self.columns[index as usize].as_deref_mut() {
                column.ensure_capacity(chunks * CHUNK_LEN);
            }
        }
        self.capacity = chunks * CHUNK_LEN;
    }

    /// Appends a row for `entity` and returns its index.
    ///
    /// Component values at the returned row are unspecified until written;
    /// callers either write every column or migrate in with defaults.
    pub fn add_entity(&mut self, entity: EntityId) -> RowIndex {
        let row = self.entity_count;
        self.ensure_capacity(row + 1);
        self.entity_ids.push(entity);
        self.entity_count += 1;
        row as RowIndex
    }

    /// Removes the row at `row`, keeping storage dense by moving the last
    /// row into the vacated slot. If an entity is relocated this way,
    /// `updater` is told its new row.
    pub fn move_last_components_to(&mut self, row: RowIndex, updater: &mut dyn EntityIndexUpdater) {
        debug_assert!((row as usize) < self.entity_count);
        let last = self.entity_count - 1;
        if (row as usize) < last {
            for &index in &self.column_order {
                if let Some(column) = self.columns[index as usize].as_deref_mut() {
                    column.copy_row(last as RowIndex, row);
                }
            }
            let moved = self.entity_ids[last];
            self.entity_ids[row as usize] = moved;
            updater.update_entity_row(moved, row);
        }
        self.entity_count = last;
        self.entity_ids.truncate(last);
    }

    /// Migrates the entity at `row` into `target`.
    ///
    /// Component types present in both archetypes carry their values over;
    /// types present only in `target` take their default value. The source
    /// repacks itself afterwards (notifying `updater` of any relocated
    /// entity). Returns the entity's row in `target`; the caller is
    /// responsible for updating the migrated entity's own index entry.
    pub fn move_entity_to(
        &mut self,
        target: &mut Archetype,
        row: RowIndex,
        updater: &mut dyn EntityIndexUpdater,
    ) -> Result<RowIndex, TypeMismatchError> {
        debug_assert!((row as usize) < self.entity_count);
        debug_assert!(self.id != target.id);
        let entity = self.entity_ids[row as usize];
        let new_row = target.add_entity(entity);
        for &index in &self.column_order {
            if let (Some(source), Some(dest)) = (
                self.columns[index as usize].as_deref(),
                target.columns[index as usize].as_deref_mut(),
            ) {
                source.move_row_to(dest, row, new_row)?;
            }
        }
        for &index in &target.column_order {
            if !self.component_types.has(index) {
                if let Some(column) = target.columns[index as usize].as_deref_mut() {
                    column.reset_row(new_row);
                }
            }
        }
        self.move_last_components_to(row, updater);
        Ok(new_row)
    }
}
