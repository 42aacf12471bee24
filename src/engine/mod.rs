//! # Engine Module
//!
//! Internal ECS engine implementation.
//!
//! This module contains all core building blocks:
//! - Bitsets and type-index sets
//! - Component/tag registration
//! - Archetypes and chunked column storage
//! - Query filtering and execution
//! - The parallel job runner
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod archetype;
pub mod bitset;
pub mod error;
pub mod filter;
pub mod job;
pub mod query;
pub mod registry;
pub mod runner;
pub mod store;
pub mod types;
