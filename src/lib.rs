//! # tessera_ecs
//!
//! Archetype-based Entity-Component-System storage and query engine.
//!
//! ## Design Goals
//! - Dense, chunked columnar storage for cache efficiency
//! - Structural identity via `(component types, tags)` bitset pairs
//! - Incrementally cached queries over an append-only archetype list
//! - Low-overhead parallel chunk execution on persistent worker threads
//!
//! Entities live in exactly one [`Archetype`] determined by their
//! component types and tags; adding or removing either migrates the
//! entity between archetypes while keeping every archetype densely
//! packed. Queries select archetypes with bitset algebra and iterate
//! component data one fixed-length chunk at a time.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Store and storage

pub use engine::store::EntityStore;

pub use engine::archetype::{
    Archetype,
    Column,
    EntityIndexUpdater,
    TypeErasedColumn,
};

pub use engine::registry::{
    Component,
    Disabled,
    Tag,
    TypeRegistry,
};

// Queries

pub use engine::filter::QueryFilter;
pub use engine::query::{
    ArchetypeQuery,
    Query,
    Signature,
};

// Parallel execution

pub use engine::job::QueryJob;
pub use engine::runner::ParallelJobRunner;

// Errors

pub use engine::error::{
    EcsError,
    EcsResult,
    JobError,
    MissingComponentError,
    QueryError,
    RowOutOfBoundsError,
    StaleEntityError,
    TypeMismatchError,
};

// Core value types

pub use engine::bitset::Bitset;
pub use engine::types::{
    ArchetypeId,
    ComponentTypes,
    EntityId,
    RowIndex,
    Tags,
    TypeIndex,
    CHUNK_LEN,
    DISABLED_TAG,
    TYPE_CAP,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use tessera_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Component,
        ComponentTypes,
        Disabled,
        EntityStore,
        ParallelJobRunner,
        Query,
        QueryFilter,
        QueryJob,
        Tag,
        Tags,
    };
}
