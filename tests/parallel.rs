use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use tessera_ecs::prelude::*;
use tessera_ecs::{EntityId, JobError};

#[derive(Clone, Default, PartialEq, Debug)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Clone, Default, PartialEq, Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {}

#[derive(Clone, Default, PartialEq, Debug)]
struct Health {
    value: i64,
}
impl Component for Health {}

fn populate_moving(store: &mut EntityStore, count: usize) -> Vec<EntityId> {
    (0..count)
        .map(|i| {
            let entity = store.create_entity();
            store
                .add_component(entity, Position { x: i as f32, y: 0.0 })
                .unwrap();
            store
                .add_component(entity, Velocity { dx: 1.0, dy: 2.0 })
                .unwrap();
            entity
        })
        .collect()
}

#[test]
fn parallel_run_applies_the_action_to_every_row() {
    let mut store = EntityStore::new();
    store.set_job_runner(Some(Arc::new(ParallelJobRunner::new(4))));
    let entities = populate_moving(&mut store, 5_000);

    let query: Query<(Position, Velocity)> = store.query();
    let mut job = QueryJob::new(
        query,
        |positions: &mut [Position], velocities: &mut [Velocity], _ids: &[EntityId]| {
            for (position, velocity) in positions.iter_mut().zip(velocities.iter()) {
                position.x += velocity.dx;
                position.y += velocity.dy;
            }
        },
    );
    job.run_parallel(&mut store).unwrap();

    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(
            store.get_component::<Position>(entity).unwrap(),
            &Position { x: i as f32 + 1.0, y: 2.0 }
        );
    }
}

#[test]
fn parallel_accumulation_matches_sequential() {
    let mut store = EntityStore::new();
    store.set_job_runner(Some(Arc::new(ParallelJobRunner::new(4))));
    let count = 4_000i64;
    for i in 0..count {
        let entity = store.create_entity();
        store.add_component(entity, Health { value: i }).unwrap();
    }
    let expected: i64 = (0..count).sum();

    let total = AtomicI64::new(0);
    let touched = AtomicUsize::new(0);
    let query: Query<(Health,)> = store.query();
    let mut job = QueryJob::new(query, |healths: &mut [Health], _ids: &[EntityId]| {
        let sum: i64 = healths.iter().map(|health| health.value).sum();
        total.fetch_add(sum, Ordering::Relaxed);
        touched.fetch_add(healths.len(), Ordering::Relaxed);
    });
    job.run_parallel(&mut store).unwrap();

    // Every row visited exactly once, associative total intact.
    assert_eq!(touched.load(Ordering::Relaxed), count as usize);
    assert_eq!(total.load(Ordering::Relaxed), expected);
}

#[test]
fn repeated_dispatch_survives_tag_migration() {
    struct Marked;
    impl Tag for Marked {}

    let mut store = EntityStore::new();
    store.set_job_runner(Some(Arc::new(ParallelJobRunner::new(4))));
    let count = 3_000i64;
    let entities: Vec<EntityId> = (0..count)
        .map(|i| {
            let entity = store.create_entity();
            store.add_component(entity, Health { value: i }).unwrap();
            entity
        })
        .collect();
    let expected: i64 = (0..count).sum();

    let total = AtomicI64::new(0);
    let query: Query<(Health,)> = store.query();
    let mut job = QueryJob::new(query, |healths: &mut [Health], _ids: &[EntityId]| {
        let sum: i64 = healths.iter().map(|health| health.value).sum();
        total.fetch_add(sum, Ordering::Relaxed);
    });
    for round in 0..20 {
        total.store(0, Ordering::Relaxed);
        job.run_parallel(&mut store).unwrap();
        assert_eq!(total.load(Ordering::Relaxed), expected, "round {round}");
        // Shuffle an entity between tagged archetypes between rounds; the
        // query keeps matching all of them.
        let entity = entities[round * 37 % entities.len()];
        if store.has_tag::<Marked>(entity) {
            store.remove_tag::<Marked>(entity).unwrap();
        } else {
            store.add_tag::<Marked>(entity).unwrap();
        }
    }
}

#[test]
fn empty_matches_dispatch_no_work() {
    let mut store = EntityStore::new();
    store.set_job_runner(Some(Arc::new(ParallelJobRunner::new(4))));

    let query: Query<(Position, Velocity)> = store.query();
    let mut job = QueryJob::new(
        query,
        |_positions: &mut [Position], _velocities: &mut [Velocity], _ids: &[EntityId]| {
            panic!("no rows to visit");
        },
    );
    job.run_parallel(&mut store).unwrap();
}

#[test]
fn small_workloads_fall_back_to_sequential() {
    let mut store = EntityStore::new();
    store.set_job_runner(Some(Arc::new(ParallelJobRunner::new(4))));
    let entities = populate_moving(&mut store, 10);

    let query: Query<(Position, Velocity)> = store.query();
    let mut job = QueryJob::new(
        query,
        |positions: &mut [Position], _velocities: &mut [Velocity], _ids: &[EntityId]| {
            for position in positions.iter_mut() {
                position.y = 9.0;
            }
        },
    );
    assert!(10 < job.min_parallel_chunk_length());
    job.run_parallel(&mut store).unwrap();
    for &entity in &entities {
        assert_eq!(store.get_component::<Position>(entity).unwrap().y, 9.0);
    }
}

#[test]
fn threshold_can_be_lowered_to_force_parallelism() {
    let mut store = EntityStore::new();
    store.set_job_runner(Some(Arc::new(ParallelJobRunner::new(2))));
    let entities = populate_moving(&mut store, 64);

    let query: Query<(Position, Velocity)> = store.query();
    let mut job = QueryJob::new(
        query,
        |positions: &mut [Position], _velocities: &mut [Velocity], _ids: &[EntityId]| {
            for position in positions.iter_mut() {
                position.y += 1.0;
            }
        },
    );
    job.set_min_parallel_chunk_length(1);
    job.run_parallel(&mut store).unwrap();
    job.run_parallel(&mut store).unwrap();
    for &entity in &entities {
        assert_eq!(store.get_component::<Position>(entity).unwrap().y, 2.0);
    }
}

#[test]
fn missing_runner_is_reported() {
    let mut store = EntityStore::new();
    store.set_job_runner(None);
    populate_moving(&mut store, 2_000);

    let query: Query<(Position, Velocity)> = store.query();
    let mut job = QueryJob::new(
        query,
        |_positions: &mut [Position], _velocities: &mut [Velocity], _ids: &[EntityId]| {},
    );
    assert_eq!(job.run_parallel(&mut store), Err(JobError::MissingRunner));
}

#[test]
fn job_runner_overrides_store_runner() {
    let mut store = EntityStore::new();
    store.set_job_runner(None);
    let entities = populate_moving(&mut store, 3_000);

    let query: Query<(Position, Velocity)> = store.query();
    let mut job = QueryJob::new(
        query,
        |positions: &mut [Position], velocities: &mut [Velocity], _ids: &[EntityId]| {
            for (position, velocity) in positions.iter_mut().zip(velocities.iter()) {
                position.x += velocity.dx;
            }
        },
    )
    .with_runner(Arc::new(ParallelJobRunner::new(3)));
    job.run_parallel(&mut store).unwrap();

    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(
            store.get_component::<Position>(entity).unwrap().x,
            i as f32 + 1.0
        );
    }
}

#[test]
fn read_only_snapshots_are_private_per_task() {
    let mut store = EntityStore::new();
    store.set_job_runner(Some(Arc::new(ParallelJobRunner::new(4))));
    let entities = populate_moving(&mut store, 4_096);

    let mut query: Query<(Position, Velocity)> = store.query();
    query.mark_read_only::<Velocity>().unwrap();
    let mut job = QueryJob::new(
        query,
        |positions: &mut [Position], velocities: &mut [Velocity], _ids: &[EntityId]| {
            for (position, velocity) in positions.iter_mut().zip(velocities.iter_mut()) {
                position.x += velocity.dx;
                velocity.dx = -1.0;
            }
        },
    );
    job.run_parallel(&mut store).unwrap();

    for &entity in &entities {
        // Position writes stuck; velocity writes were discarded.
        assert_eq!(store.get_component::<Velocity>(entity).unwrap().dx, 1.0);
    }
    assert_eq!(
        store.get_component::<Position>(entities[0]).unwrap().x,
        1.0
    );
}
