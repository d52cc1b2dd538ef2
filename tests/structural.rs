//! Structural operations end to end: archetype transitions, swap-remove
//! back-patching, drop hooks, and mixed table/sparse bundles.

use std::sync::atomic::{AtomicUsize, Ordering};

use woven_ecs::prelude::*;

#[derive(Debug, PartialEq)]
struct Position(i32, i32);
impl Component for Position {}

#[derive(Debug, PartialEq)]
struct Velocity(i32, i32);
impl Component for Velocity {}

#[derive(Debug, PartialEq)]
struct Label(&'static str);
impl Component for Label {}

#[derive(Debug, PartialEq)]
struct Stunned(u32);
impl Component for Stunned {
    fn storage_type() -> StorageType {
        StorageType::SparseSet
    }
}

static PAYLOAD_DROPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
struct Payload(#[allow(dead_code)] u32);
impl Component for Payload {}
impl Drop for Payload {
    fn drop(&mut self) {
        PAYLOAD_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

fn drops() -> usize {
    PAYLOAD_DROPS.load(Ordering::SeqCst)
}

#[test]
fn insert_moves_entity_without_disturbing_neighbors() {
    let mut world = World::new();
    let mover = world.spawn((Position(1, 2), Velocity(3, 4))).id();
    let bystander = world.spawn((Position(10, 20), Velocity(30, 40))).id();

    world.insert(mover, Label("runner")).unwrap();

    // The mover carries all three components with its old values intact.
    assert_eq!(world.get::<Position>(mover), Some(&Position(1, 2)));
    assert_eq!(world.get::<Velocity>(mover), Some(&Velocity(3, 4)));
    assert_eq!(world.get::<Label>(mover), Some(&Label("runner")));

    // The bystander was swap-moved within its table and must still resolve.
    assert_eq!(world.get::<Position>(bystander), Some(&Position(10, 20)));
    assert_eq!(world.get::<Velocity>(bystander), Some(&Velocity(30, 40)));
    assert!(world.get::<Label>(bystander).is_none());

    // Two archetypes now carry the two entities separately.
    let narrow: Vec<Entity> = world.query().with::<Position>().without::<Label>().matched_entities();
    assert_eq!(narrow, vec![bystander]);
    let wide: Vec<Entity> = world.query().with::<Label>().matched_entities();
    assert_eq!(wide, vec![mover]);
}

#[test]
fn reinsert_overwrites_and_drops_the_old_value() {
    let mut world = World::new();
    let entity = world.spawn(Payload(1)).id();

    let before = drops();
    world.insert(entity, Payload(2)).unwrap();
    assert_eq!(drops(), before + 1);
    assert_eq!(world.get::<Payload>(entity).map(|p| p.0), Some(2));
}

#[test]
fn remove_drops_values_and_narrows_the_archetype() {
    let mut world = World::new();
    let entity = world.spawn((Position(0, 0), Payload(7))).id();

    let before = drops();
    world.remove::<Payload>(entity).unwrap();
    assert_eq!(drops(), before + 1);

    assert!(world.get::<Payload>(entity).is_none());
    assert_eq!(world.get::<Position>(entity), Some(&Position(0, 0)));
}

#[test]
fn take_hands_values_back_without_running_drop_hooks() {
    let mut world = World::new();
    let entity = world.spawn((Position(5, 6), Payload(42))).id();

    let before = drops();
    let taken = world.take::<(Position, Payload)>(entity).unwrap();
    // Nothing dropped during the take itself.
    assert_eq!(drops(), before);

    let (position, payload) = taken.expect("both components were present");
    assert_eq!(position, Position(5, 6));
    assert_eq!(payload.0, 42);
    assert!(world.get::<Position>(entity).is_none());
    assert!(world.contains_entity(entity));

    drop(payload);
    assert_eq!(drops(), before + 1);
}

#[test]
fn take_requires_every_component() {
    let mut world = World::new();
    let entity = world.spawn(Position(1, 1)).id();
    let taken = world.take::<(Position, Velocity)>(entity).unwrap();
    assert!(taken.is_none());
    // The incomplete take left the entity untouched.
    assert_eq!(world.get::<Position>(entity), Some(&Position(1, 1)));
}

#[test]
fn despawn_drops_components_and_patches_survivors() {
    let mut world = World::new();
    let doomed = world.spawn((Position(0, 0), Payload(1))).id();
    let survivor_a = world.spawn((Position(1, 1), Payload(2))).id();
    let survivor_b = world.spawn((Position(2, 2), Payload(3))).id();

    let before = drops();
    assert!(world.despawn(doomed));
    assert_eq!(drops(), before + 1);

    // Survivors were swap-moved; both must still resolve correctly.
    assert_eq!(world.get::<Position>(survivor_a), Some(&Position(1, 1)));
    assert_eq!(world.get::<Position>(survivor_b), Some(&Position(2, 2)));
    assert_eq!(world.get::<Payload>(survivor_b).map(|p| p.0), Some(3));
}

#[test]
fn sparse_components_move_without_table_churn() {
    let mut world = World::new();
    let entity = world.spawn(Position(9, 9)).id();
    world.insert(entity, Stunned(3)).unwrap();

    // Sparse insertion changed the archetype but not the component values.
    assert_eq!(world.get::<Position>(entity), Some(&Position(9, 9)));
    assert_eq!(world.get::<Stunned>(entity), Some(&Stunned(3)));

    let stunned: Vec<Entity> = world.query().with::<Stunned>().matched_entities();
    assert_eq!(stunned, vec![entity]);

    world.remove::<Stunned>(entity).unwrap();
    assert!(world.get::<Stunned>(entity).is_none());
    assert_eq!(world.get::<Position>(entity), Some(&Position(9, 9)));
    assert!(world.query().with::<Stunned>().matched_entities().is_empty());
}

#[test]
fn table_swap_patches_entities_of_other_archetypes_sharing_the_table() {
    let mut world = World::new();
    // Two archetypes share the Position-only table: the second differs
    // only in its sparse component.
    let mover = world.spawn(Position(1, 1)).id();
    let sibling = world.spawn((Position(2, 2), Stunned(1))).id();

    // Moving the first row to a wider table swaps the sibling into the
    // vacated row; the sibling belongs to neither the source nor the
    // destination archetype of the move.
    world.insert(mover, Velocity(5, 5)).unwrap();

    assert_eq!(world.get::<Position>(mover), Some(&Position(1, 1)));
    assert_eq!(world.get::<Velocity>(mover), Some(&Velocity(5, 5)));
    assert_eq!(world.get::<Position>(sibling), Some(&Position(2, 2)));
    assert_eq!(world.get::<Stunned>(sibling), Some(&Stunned(1)));
    assert!(world.get::<Velocity>(sibling).is_none());
}

#[test]
fn query_adapters_read_and_write_across_storage_classes() {
    let mut world = World::new();
    let a = world.spawn((Position(1, 0), Velocity(1, 1))).id();
    let b = world.spawn((Position(2, 0), Velocity(2, 2))).id();
    world.insert(b, Stunned(1)).unwrap();

    // read + write over two table columns of the same table.
    world
        .query()
        .for_each_read_write::<Velocity, Position>(|_, velocity, position| {
            position.0 += velocity.0;
            position.1 += velocity.1;
        });
    assert_eq!(world.get::<Position>(a), Some(&Position(2, 1)));
    assert_eq!(world.get::<Position>(b), Some(&Position(4, 2)));

    // table read + sparse write.
    world
        .query()
        .for_each_read_write::<Position, Stunned>(|_, _, stunned| {
            stunned.0 += 1;
        });
    assert_eq!(world.get::<Stunned>(b), Some(&Stunned(2)));

    // has-flag adapter.
    let mut flagged = Vec::new();
    world
        .query()
        .for_each_read_has::<Position, Stunned>(|entity, _, has| flagged.push((entity, has)));
    flagged.sort();
    assert_eq!(flagged, vec![(a, false), (b, true)]);
}

#[test]
fn spawn_empty_then_build_up() {
    let mut world = World::new();
    let entity = world.spawn_empty().id();
    assert!(world.contains_entity(entity));
    assert!(world.get::<Position>(entity).is_none());

    world.entity_mut(entity).unwrap().insert(Position(3, 3)).insert(Velocity(0, 1));
    assert_eq!(world.get::<Position>(entity), Some(&Position(3, 3)));
    assert_eq!(world.get::<Velocity>(entity), Some(&Velocity(0, 1)));
}
