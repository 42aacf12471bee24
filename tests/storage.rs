use std::collections::HashSet;

use tessera_ecs::prelude::*;
use tessera_ecs::{EcsError, StaleEntityError};

#[derive(Clone, Default, PartialEq, Debug)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Clone, Default, PartialEq, Debug)]
struct Rotation {
    angle: f32,
}
impl Component for Rotation {}

#[derive(Clone, Default, PartialEq, Debug)]
struct Health {
    value: i32,
}
impl Component for Health {}

struct Npc;
impl Tag for Npc {}

#[test]
fn rows_stay_dense_after_arbitrary_removal_order() {
    let mut store = EntityStore::new();
    let entities: Vec<u32> = (0..100)
        .map(|i| {
            let entity = store.create_entity();
            store.add_component(entity, Health { value: i }).unwrap();
            entity
        })
        .collect();

    // Delete half the entities in a scrambled order.
    let mut deleted = HashSet::new();
    for step in 0..50 {
        let victim = entities[(step * 7) % 100];
        if deleted.insert(victim) {
            store.delete_entity(victim).unwrap();
        }
    }
    let survivor_count = 100 - deleted.len();
    assert_eq!(store.entity_count(), survivor_count);

    // Every survivor still reads its own value, and all survivors occupy
    // distinct rows below the live count of their archetype.
    let mut rows = HashSet::new();
    for (i, &entity) in entities.iter().enumerate() {
        if deleted.contains(&entity) {
            assert!(!store.is_alive(entity));
            continue;
        }
        assert_eq!(
            store.get_component::<Health>(entity).unwrap(),
            &Health { value: i as i32 }
        );
        let (archetype, row) = store.entity_location(entity).unwrap();
        assert!((row as usize) < store.archetype(archetype).entity_count());
        assert!(rows.insert(row));
    }
    assert_eq!(rows.len(), survivor_count);
}

#[test]
fn interleaved_create_delete_rounds_stay_consistent() {
    let mut store = EntityStore::new();
    let mut live: Vec<(u32, i32)> = Vec::new();
    let mut next_value = 0i32;

    for round in 0..10 {
        for _ in 0..20 {
            let entity = store.create_entity();
            store.add_component(entity, Health { value: next_value }).unwrap();
            live.push((entity, next_value));
            next_value += 1;
        }
        // Delete a scattered third of the live set each round.
        let mut index = round % 3;
        while index < live.len() {
            let (entity, _) = live.remove(index);
            store.delete_entity(entity).unwrap();
            index += 3;
        }
        assert_eq!(store.entity_count(), live.len());
        for &(entity, value) in &live {
            assert_eq!(
                store.get_component::<Health>(entity).unwrap(),
                &Health { value }
            );
        }
    }

    // After churn every survivor still occupies a distinct dense row.
    let mut rows = HashSet::new();
    for &(entity, _) in &live {
        let (archetype, row) = store.entity_location(entity).unwrap();
        assert!((row as usize) < store.archetype(archetype).entity_count());
        assert!(rows.insert(row));
    }
}

#[test]
fn migration_preserves_shared_values_and_defaults_new() {
    let mut store = EntityStore::new();
    let entity = store.create_entity();
    store.add_component(entity, Position { x: 3.0, y: 4.0 }).unwrap();

    // Adding a second component moves the entity to a new archetype.
    let (before, _) = store.entity_location(entity).unwrap();
    store.add_component(entity, Rotation { angle: 90.0 }).unwrap();
    let (after, _) = store.entity_location(entity).unwrap();
    assert_ne!(before, after);
    assert_eq!(
        store.get_component::<Position>(entity).unwrap(),
        &Position { x: 3.0, y: 4.0 }
    );
    assert_eq!(
        store.get_component::<Rotation>(entity).unwrap(),
        &Rotation { angle: 90.0 }
    );

    // Removing and re-adding yields the default value, not the old one.
    assert!(store.remove_component::<Rotation>(entity).unwrap());
    assert!(!store.has_component::<Rotation>(entity));
    store.add_component(entity, Rotation::default()).unwrap();
    assert_eq!(
        store.get_component::<Rotation>(entity).unwrap(),
        &Rotation { angle: 0.0 }
    );
    assert_eq!(
        store.get_component::<Position>(entity).unwrap(),
        &Position { x: 3.0, y: 4.0 }
    );
}

#[test]
fn migration_repacks_the_source_archetype() {
    let mut store = EntityStore::new();
    let stays = store.create_entity();
    let moves = store.create_entity();
    let swapped = store.create_entity();
    for (entity, value) in [(stays, 1), (moves, 2), (swapped, 3)] {
        store.add_component(entity, Health { value }).unwrap();
    }

    // Migrating the middle entity swap-moves the last one into its row.
    store.add_component(moves, Position::default()).unwrap();
    assert_eq!(store.get_component::<Health>(stays).unwrap(), &Health { value: 1 });
    assert_eq!(store.get_component::<Health>(moves).unwrap(), &Health { value: 2 });
    assert_eq!(store.get_component::<Health>(swapped).unwrap(), &Health { value: 3 });
    let (source, _) = store.entity_location(stays).unwrap();
    assert_eq!(store.archetype(source).entity_count(), 2);
}

#[test]
fn entity_round_trip_with_disable_and_enable() {
    let mut store = EntityStore::new();
    let entity = store.create_entity();
    store.add_component(entity, Position { x: 1.0, y: 2.0 }).unwrap();
    store.add_component(entity, Rotation { angle: 45.0 }).unwrap();

    let mut query: Query<(Position,)> = store.query();
    assert_eq!(query.entity_count(&store), 1);

    store.disable(entity).unwrap();
    assert!(store.is_disabled(entity));
    assert_eq!(query.entity_count(&store), 0);
    // Values survive the disable round trip.
    assert_eq!(
        store.get_component::<Rotation>(entity).unwrap(),
        &Rotation { angle: 45.0 }
    );

    store.enable(entity).unwrap();
    assert!(!store.is_disabled(entity));
    assert_eq!(query.entity_count(&store), 1);
    assert_eq!(
        store.get_component::<Position>(entity).unwrap(),
        &Position { x: 1.0, y: 2.0 }
    );
}

#[test]
fn stale_entities_are_rejected() {
    let mut store = EntityStore::new();
    let entity = store.create_entity();
    store.add_component(entity, Health { value: 5 }).unwrap();
    store.delete_entity(entity).unwrap();

    assert_eq!(
        store.get_component::<Health>(entity),
        Err(EcsError::StaleEntity(StaleEntityError))
    );
    assert_eq!(
        store.add_tag::<Npc>(entity),
        Err(EcsError::StaleEntity(StaleEntityError))
    );
    assert_eq!(
        store.entity_location(entity),
        Err(EcsError::StaleEntity(StaleEntityError))
    );
}

#[test]
fn missing_component_reads_fail() {
    let mut store = EntityStore::new();
    let entity = store.create_entity();
    store.add_component(entity, Position::default()).unwrap();
    assert!(matches!(
        store.get_component::<Health>(entity),
        Err(EcsError::MissingComponent(_))
    ));
    assert!(matches!(
        store.get_component_mut::<Health>(entity),
        Err(EcsError::MissingComponent(_))
    ));
}

#[test]
fn storage_spans_multiple_chunks() {
    let mut store = EntityStore::new();
    let total = tessera_ecs::CHUNK_LEN * 2 + 17;
    let entities: Vec<u32> = (0..total)
        .map(|i| {
            let entity = store.create_entity();
            store.add_component(entity, Health { value: i as i32 }).unwrap();
            entity
        })
        .collect();

    let (archetype, _) = store.entity_location(entities[0]).unwrap();
    assert_eq!(store.archetype(archetype).chunk_count(), 3);
    assert_eq!(store.archetype(archetype).entity_count(), total);

    // Values land in the right chunk-relative slots.
    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(
            store.get_component::<Health>(entity).unwrap(),
            &Health { value: i as i32 }
        );
    }
}

#[test]
fn tag_only_entities_occupy_component_free_archetypes() {
    let mut store = EntityStore::new();
    let entity = store.create_entity();
    store.add_tag::<Npc>(entity).unwrap();
    assert!(store.has_tag::<Npc>(entity));
    let (archetype, _) = store.entity_location(entity).unwrap();
    assert!(store.archetype(archetype).component_types().is_empty());
    assert_eq!(store.archetype(archetype).tags().len(), 1);
}
