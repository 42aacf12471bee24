//! Parallel execution of typed queries.
//!
//! A [`QueryJob`] pairs a [`Query`] with a chunk action.
//! [`run`](QueryJob::run) executes sequentially on the calling thread;
//! [`run_parallel`](QueryJob::run_parallel) snapshots the matched chunk
//! views under the exclusive store borrow, partitions them into one row
//! range per runner thread — ranges rounded up to whole chunks so no
//! chunk is ever split between tasks — and fans out on a
//! [`ParallelJobRunner`].
//!
//! Workloads below
//! [`min_parallel_chunk_length`](QueryJob::min_parallel_chunk_length)
//! rows fall back to the sequential path; for small queries the handshake
//! costs more than it saves.
//!
//! The action must be `Fn + Send + Sync`: it runs concurrently on
//! disjoint chunk views. Read-only signature positions get a per-task
//! snapshot buffer, never a shared one.

use std::sync::Arc;

use crate::engine::archetype::{Archetype, Column};
use crate::engine::error::JobError;
use crate::engine::query::{Query, Signature};
use crate::engine::registry::Component;
use crate::engine::runner::ParallelJobRunner;
use crate::engine::store::EntityStore;
use crate::engine::types::{EntityId, CHUNK_LEN};

/// Sequential-fallback threshold in rows. Matches roughly where the
/// handshake overhead stops dominating per-row work.
const DEFAULT_MIN_PARALLEL_CHUNK_LENGTH: usize = 1000;

/// Rows per task, rounded up so task boundaries always land on chunk
/// boundaries.
fn task_rows(total_rows: usize, task_count: usize) -> usize {
    total_rows.div_ceil(task_count).div_ceil(CHUNK_LEN) * CHUNK_LEN
}

/// A typed query bound to a chunk action, runnable sequentially or on a
/// parallel runner.
pub struct QueryJob<S: Signature, F> {
    query: Query<S>,
    action: F,
    runner: Option<Arc<ParallelJobRunner>>,
    min_parallel_chunk_length: usize,
}

impl<S: Signature, F> QueryJob<S, F> {
    /// Binds `action` to `query`. The job uses its store's default runner
    /// unless one is set explicitly.
    pub fn new(query: Query<S>, action: F) -> Self {
        Self {
            query,
            action,
            runner: None,
            min_parallel_chunk_length: DEFAULT_MIN_PARALLEL_CHUNK_LENGTH,
        }
    }

    /// Sets a job-specific runner, overriding the store default.
    pub fn with_runner(mut self, runner: Arc<ParallelJobRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// The job-specific runner, if one was set.
    pub fn runner(&self) -> Option<&Arc<ParallelJobRunner>> {
        self.runner.as_ref()
    }

    /// Replaces (or clears) the job-specific runner.
    pub fn set_runner(&mut self, runner: Option<Arc<ParallelJobRunner>>) {
        self.runner = runner;
    }

    /// Row threshold below which `run_parallel` executes sequentially.
    pub fn min_parallel_chunk_length(&self) -> usize {
        self.min_parallel_chunk_length
    }

    /// Sets the sequential-fallback threshold.
    pub fn set_min_parallel_chunk_length(&mut self, rows: usize) {
        self.min_parallel_chunk_length = rows;
    }

    /// The underlying query.
    pub fn query(&self) -> &Query<S> {
        &self.query
    }

    /// Mutable access to the underlying query, e.g. for filter changes.
    pub fn query_mut(&mut self) -> &mut Query<S> {
        &mut self.query
    }
}

macro_rules! impl_query_job {
    ($(($unit:ident: $($name:ident / $index:tt),+);)+) => {
        $(
            /// One chunk's raw views, handed across threads to exactly one
            /// task.
            #[allow(non_snake_case)]
            struct $unit<$($name: Component),+> {
                $($name: *mut $name,)+
                ids: *const EntityId,
                len: usize,
            }

            // SAFETY: a unit is consumed by a single task and its pointers
            // target rows no other unit covers; the caller holds the store
            // exclusively borrowed for the whole dispatch.
            unsafe impl<$($name: Component),+> Send for $unit<$($name),+> {}
            unsafe impl<$($name: Component),+> Sync for $unit<$($name),+> {}

            impl<$($name: Component,)+ F> QueryJob<($($name,)+), F>
            where
                F: Fn($(&mut [$name],)+ &[EntityId]) + Send + Sync,
            {
                /// Runs the action over every matched chunk on the calling
                /// thread.
                #[allow(non_snake_case)]
                pub fn run(&mut self, store: &mut EntityStore) {
                    let action = &self.action;
                    self.query
                        .for_each_chunk_mut(store, |$($name,)+ ids| action($($name,)+ ids));
                }

                /// Runs the action over every matched chunk, fanned out
                /// across the runner's threads. Falls back to [`run`] when
                /// the workload is below the parallel threshold, and fails
                /// when neither the job nor the store has a runner.
                ///
                /// [`run`]: Self::run
                #[allow(non_snake_case)]
                pub fn run_parallel(&mut self, store: &mut EntityStore) -> Result<(), JobError> {
                    let runner = match self.runner.as_ref().or(store.job_runner()) {
                        Some(runner) => Arc::clone(runner),
                        None => return Err(JobError::MissingRunner),
                    };
                    self.query.base.refresh(store);
                    let total_rows: usize = self
                        .query
                        .base
                        .matched
                        .iter()
                        .map(|&id| store.archetype(id).entity_count())
                        .sum();
                    // Decide the fallback from the match list alone, before
                    // any chunk views are materialized.
                    if total_rows < self.min_parallel_chunk_length {
                        self.run(store);
                        return Ok(());
                    }

                    let mut units: Vec<$unit<$($name),+>> = Vec::new();
                    for position in 0..self.query.base.matched.len() {
                        let archetype: *mut Archetype =
                            store.archetype_mut(self.query.base.matched[position]);
                        // SAFETY: same aliasing argument as the sequential
                        // iteration; the raw views stay valid because the
                        // store remains exclusively borrowed until execute
                        // returns and archetype chunks never move.
                        unsafe {
                            let chunk_count = (*archetype).chunk_count();
                            let columns = ($(
                                (*archetype)
                                    .column_as_mut::<$name>(self.query.indices[$index])
                                    .expect("query column matches its registered type")
                                    as *mut Column<$name>,
                            )+);
                            for chunk in 0..chunk_count {
                                let len = (*archetype).chunk_len(chunk);
                                units.push($unit {
                                    $($name: (*columns.$index)
                                        .chunk_slice_mut(chunk, len)
                                        .as_mut_ptr(),)+
                                    ids: (*archetype).entity_id_chunk(chunk).as_ptr(),
                                    len,
                                });
                            }
                        }
                    }

                    let task_count = runner.thread_count();
                    let rows_per_task = task_rows(total_rows, task_count);
                    let mut groups: Vec<Vec<$unit<$($name),+>>> =
                        (0..task_count).map(|_| Vec::new()).collect();
                    let mut group = 0usize;
                    let mut assigned = 0usize;
                    for unit in units {
                        if assigned >= rows_per_task && group + 1 < task_count {
                            group += 1;
                            assigned = 0;
                        }
                        assigned += unit.len;
                        groups[group].push(unit);
                    }

                    let action = &self.action;
                    let read_only = &self.query.read_only;
                    let tasks: Vec<Box<dyn Fn() + Sync + '_>> = groups
                        .into_iter()
                        .map(|group| {
                            Box::new(move || {
                                $(let mut $name: Vec<$name> = Vec::new();)+
                                for unit in &group {
                                    // SAFETY: this task is the sole user of
                                    // the unit's rows; `ids` aliases no
                                    // column data.
                                    unsafe {
                                        let ids =
                                            std::slice::from_raw_parts(unit.ids, unit.len);
                                        action(
                                            $(
                                                if read_only[$index] {
                                                    $name.clear();
                                                    $name.extend_from_slice(
                                                        std::slice::from_raw_parts(
                                                            unit.$name, unit.len,
                                                        ),
                                                    );
                                                    &mut $name[..]
                                                } else {
                                                    std::slice::from_raw_parts_mut(
                                                        unit.$name, unit.len,
                                                    )
                                                },
                                            )+
                                            ids,
                                        );
                                    }
                                }
                            }) as Box<dyn Fn() + Sync + '_>
                        })
                        .collect();
                    let task_refs: Vec<&(dyn Fn() + Sync)> =
                        tasks.iter().map(|task| task.as_ref()).collect();
                    runner.execute(&task_refs);
                    Ok(())
                }
            }
        )+
    };
}

impl_query_job! {
    (ChunkUnit1: A / 0);
    (ChunkUnit2: A / 0, B / 1);
    (ChunkUnit3: A / 0, B / 1, C / 2);
    (ChunkUnit4: A / 0, B / 1, C / 2, D / 3);
    (ChunkUnit5: A / 0, B / 1, C / 2, D / 3, E / 4);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_rows_are_chunk_aligned() {
        assert_eq!(task_rows(CHUNK_LEN * 8, 4), CHUNK_LEN * 2);
        // 9 chunks over 4 tasks: 3 chunks per task, not 2.25.
        assert_eq!(task_rows(CHUNK_LEN * 9, 4), CHUNK_LEN * 3);
        // Partial chunks still round the range up to a chunk multiple.
        assert_eq!(task_rows(CHUNK_LEN + 5, 2), CHUNK_LEN);
        assert_eq!(task_rows(10, 4), CHUNK_LEN);
    }
}
