//! Error types for entity storage, queries, and parallel jobs.
//!
//! This module declares focused, composable error types used across the
//! archetype storage and query pipeline. Each error carries enough context
//! to make failures actionable while remaining small and cheap to pass
//! around or convert into the aggregate [`EcsError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (stale
//!   entity handles, out-of-range row addressing, missing components).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`EcsError`].
//! * **Actionability:** Structured fields (offending row vs. live row
//!   count, expected vs. actual types, type names) make logs useful
//!   without reproducing the issue.
//!
//! These errors all represent contract violations surfaced at the call
//! site. Storage growth never fails and structural operations on validated
//! inputs are infallible, so nothing here is retried or wrapped across
//! layer boundaries. The one failure mode that is not representable as a
//! value is re-entering the parallel runner, which is fatal and panics.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is optimized for operator logs (short, imperative
//!   phrasing).
//! * [`fmt::Debug`] (derived) retains full structure for diagnostics.

use std::any::TypeId;
use std::fmt;

use crate::engine::types::RowIndex;

/// Returned when an entity handle refers to an entity that was deleted.
///
/// Use this to prevent use-after-free style logic errors at the API
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError;

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stale or dead entity reference")
    }
}

impl std::error::Error for StaleEntityError {}

/// Returned when a row index addresses storage beyond the live rows of an
/// archetype.
///
/// ## Context
/// Rows in `[entity_count, capacity)` exist physically but hold stale
/// data; addressing them indicates stale metadata or incorrect index
/// calculations in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowOutOfBoundsError {
    /// Row index that was addressed.
    pub row: RowIndex,

    /// Number of live rows in the archetype.
    pub entity_count: usize,
}

impl fmt::Display for RowOutOfBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} out of bounds ({} live rows)",
            self.row, self.entity_count
        )
    }
}

impl std::error::Error for RowOutOfBoundsError {}

/// Returned when a component access names a type the entity's archetype
/// does not store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingComponentError {
    /// Human-readable component type name.
    pub name: &'static str,
}

impl fmt::Display for MissingComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity has no component of type {}", self.name)
    }
}

impl std::error::Error for MissingComponentError {}

/// Returned when a column write targets a storage slot whose element type
/// does not match the provided value's type.
///
/// This is a logic error surfaced when two columns registered under the
/// same type index disagree on their element type, which cannot happen
/// through the registry and indicates misuse of the type-erased layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatchError {
    /// Destination column's declared element type.
    pub expected: TypeId,

    /// Source column's element type.
    pub actual: TypeId,
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type mismatch: expected {:?}, actual {:?}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for TypeMismatchError {}

/// Errors raised while configuring a typed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    /// A read-only marking named a component type that is not part of the
    /// query's signature.
    NotInSignature {
        /// Human-readable component type name.
        name: &'static str,
    },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NotInSignature { name } => {
                write!(f, "component {} is not part of the query signature", name)
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// Errors raised when dispatching a parallel job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    /// Neither the job nor its store has a runner configured.
    MissingRunner,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::MissingRunner => {
                f.write_str("no parallel job runner configured on the job or its store")
            }
        }
    }
}

impl std::error::Error for JobError {}

/// Aggregate error for store-level operations.
///
/// `From<T>` conversions are implemented for every low-level error so
/// callers can write `?` and still return a single, expressive type,
/// while `Display` preserves the underlying message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// An entity handle was stale or referred to a deleted entity.
    StaleEntity(StaleEntityError),

    /// A row index addressed storage outside the live rows.
    RowOutOfBounds(RowOutOfBoundsError),

    /// A component access named a type the archetype does not store.
    MissingComponent(MissingComponentError),

    /// Two columns under one type index disagreed on their element type.
    TypeMismatch(TypeMismatchError),

    /// A typed query was configured inconsistently.
    Query(QueryError),

    /// A parallel job could not be dispatched.
    Job(JobError),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::StaleEntity(e) => write!(f, "{e}"),
            EcsError::RowOutOfBounds(e) => write!(f, "{e}"),
            EcsError::MissingComponent(e) => write!(f, "{e}"),
            EcsError::TypeMismatch(e) => write!(f, "{e}"),
            EcsError::Query(e) => write!(f, "{e}"),
            EcsError::Job(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<StaleEntityError> for EcsError {
    fn from(e: StaleEntityError) -> Self { EcsError::StaleEntity(e) }
}
impl From<RowOutOfBoundsError> for EcsError {
    fn from(e: RowOutOfBoundsError) -> Self { EcsError::RowOutOfBounds(e) }
}
impl From<MissingComponentError> for EcsError {
    fn from(e: MissingComponentError) -> Self { EcsError::MissingComponent(e) }
}
impl From<TypeMismatchError> for EcsError {
    fn from(e: TypeMismatchError) -> Self { EcsError::TypeMismatch(e) }
}
impl From<QueryError> for EcsError {
    fn from(e: QueryError) -> Self { EcsError::Query(e) }
}
impl From<JobError> for EcsError {
    fn from(e: JobError) -> Self { EcsError::Job(e) }
}

/// Convenience alias for store-level results.
pub type EcsResult<T> = Result<T, EcsError>;
