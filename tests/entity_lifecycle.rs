//! Entity allocator behavior: id packing, reservation, flushing, and
//! generation management.

use woven_ecs::engine::entity::{AllocAtWithoutReplacement, Entities, Entity, EntityLocation};
use woven_ecs::prelude::*;

#[derive(Debug, PartialEq)]
struct Tag(u32);
impl Component for Tag {}

#[test]
fn entity_bits_round_trip() {
    let entity = Entity::from_raw_and_generation(0xDEAD_BEEF, 0x5F3759DF);
    assert_eq!(Entity::from_bits(entity.to_bits()), entity);
    assert_eq!(entity.index(), 0xDEAD_BEEF);
    assert_eq!(entity.generation(), 0x5F3759DF);
}

#[test]
fn entity_ordering_follows_packed_bits() {
    let low_gen = Entity::from_raw_and_generation(100, 0);
    let high_gen = Entity::from_raw_and_generation(0, 1);
    // Generation occupies the high bits, so it dominates the ordering.
    assert!(low_gen < high_gen);
    assert!(Entity::from_raw(1) < Entity::from_raw(2));

    let mut handles = vec![high_gen, Entity::from_raw(2), low_gen, Entity::from_raw(1)];
    handles.sort();
    assert_eq!(
        handles,
        vec![Entity::from_raw(1), Entity::from_raw(2), low_gen, high_gen]
    );
}

#[test]
fn reserved_entity_is_contained_but_unlocated_until_flush() {
    let mut entities = Entities::new();
    let reserved = entities.reserve_entity();

    assert!(entities.contains(reserved));
    assert!(entities.get(reserved).is_none());

    let mut initialized = Vec::new();
    entities.flush(|entity, location| {
        initialized.push(entity);
        *location = EntityLocation {
            archetype_id: 0,
            archetype_row: 0,
            table_id: 0,
            table_row: 0,
        };
    });
    assert_eq!(initialized, vec![reserved]);
    assert!(entities.get(reserved).is_some());
    assert_eq!(entities.len(), 1);
}

#[test]
fn reservation_reuses_freed_indices_first() {
    let mut entities = Entities::new();
    let first = entities.alloc();
    entities.set(
        first.index(),
        EntityLocation {
            archetype_id: 0,
            archetype_row: 0,
            table_id: 0,
            table_row: 0,
        },
    );
    entities.free(first);

    let reserved = entities.reserve_entity();
    assert_eq!(reserved.index(), first.index());
    assert_eq!(reserved.generation(), first.generation() + 1);

    // A second reservation outruns the free list and names a fresh slot.
    let fresh = entities.reserve_entity();
    assert_eq!(fresh.index(), 1);
    entities.flush_as_invalid();
    assert_eq!(entities.len(), 2);
}

#[test]
#[should_panic(expected = "flush() needs to be called")]
fn alloc_with_pending_flush_panics() {
    let mut entities = Entities::new();
    entities.reserve_entity();
    entities.alloc();
}

#[test]
fn free_bumps_generation_and_rejects_stale_handles() {
    let mut entities = Entities::new();
    let entity = entities.alloc();
    entities.set(
        entity.index(),
        EntityLocation {
            archetype_id: 0,
            archetype_row: 0,
            table_id: 0,
            table_row: 0,
        },
    );
    assert!(entities.free(entity).is_some());
    // Double free of the now-stale handle is a no-op.
    assert!(entities.free(entity).is_none());

    let reused = entities.alloc();
    assert_eq!(reused.index(), entity.index());
    assert_eq!(reused.generation(), entity.generation() + 1);
    assert!(!entities.contains(entity));
    assert!(entities.contains(reused));
}

#[test]
fn reserve_generations_skips_ahead_on_free_slots_only() {
    let mut entities = Entities::new();
    let entity = entities.alloc();

    // Slot is live (location is the sentinel but the slot is allocated):
    // the live check is on the location, so set one first.
    entities.set(
        entity.index(),
        EntityLocation {
            archetype_id: 0,
            archetype_row: 0,
            table_id: 0,
            table_row: 0,
        },
    );
    assert!(!entities.reserve_generations(entity.index(), 5));

    entities.free(entity);
    assert!(entities.reserve_generations(entity.index(), 5));
    let reused = entities.alloc();
    assert!(reused.generation() >= entity.generation() + 5);
}

#[test]
fn alloc_at_without_replacement_reports_all_three_outcomes() {
    let mut entities = Entities::new();
    let target = Entity::from_raw_and_generation(7, 3);

    assert_eq!(
        entities.alloc_at_without_replacement(target),
        AllocAtWithoutReplacement::DidNotExist
    );

    let location = EntityLocation {
        archetype_id: 0,
        archetype_row: 0,
        table_id: 0,
        table_row: 0,
    };
    entities.set(target.index(), location);
    assert_eq!(
        entities.alloc_at_without_replacement(target),
        AllocAtWithoutReplacement::Exists(location)
    );

    let wrong_generation = Entity::from_raw_and_generation(7, 9);
    assert_eq!(
        entities.alloc_at_without_replacement(wrong_generation),
        AllocAtWithoutReplacement::ExistsWithWrongGeneration
    );
}

#[test]
fn world_reserve_then_flush_materializes_in_empty_archetype() {
    let mut world = World::new();
    let reserved = world.reserve_entity();
    assert!(world.contains_entity(reserved));

    world.flush();
    assert!(world.entities().get(reserved).is_some());

    // The flushed entity accepts components like any other.
    world.insert(reserved, Tag(9)).unwrap();
    assert_eq!(world.get::<Tag>(reserved), Some(&Tag(9)));
}

#[test]
fn despawned_handles_stay_stale_after_reuse() {
    let mut world = World::new();
    let first = world.spawn(Tag(1)).id();
    assert!(world.despawn(first));

    let second = world.spawn(Tag(2)).id();
    assert_eq!(second.index(), first.index());
    assert_ne!(second.generation(), first.generation());

    assert!(world.get::<Tag>(first).is_none());
    assert!(!world.despawn(first));
    assert_eq!(world.get::<Tag>(second), Some(&Tag(2)));
}
