//! Change-detection behavior at the world level: tick stamping, the
//! newer-than window, and wraparound rebasing.

use woven_ecs::engine::tick::{Tick, MAX_CHANGE_AGE};
use woven_ecs::prelude::*;

#[derive(Debug, PartialEq)]
struct Score(u32);
impl Component for Score {}

#[derive(Debug, Default, PartialEq)]
struct Clock(u64);
impl Resource for Clock {}

#[test]
fn spawn_stamps_added_and_changed_together() {
    let mut world = World::new();
    world.increment_change_tick();
    let spawn_tick = world.change_tick();
    let entity = world.spawn(Score(0)).id();

    let ticks = world.get_component_ticks::<Score>(entity).unwrap();
    assert_eq!(ticks.added, spawn_tick);
    assert_eq!(ticks.changed, spawn_tick);
}

#[test]
fn get_mut_stamps_changed_only() {
    let mut world = World::new();
    let entity = world.spawn(Score(0)).id();
    let spawn_tick = world.change_tick();

    world.increment_change_tick();
    world.increment_change_tick();
    let write_tick = world.change_tick();
    world.get_mut::<Score>(entity).unwrap().0 = 10;

    let ticks = world.get_component_ticks::<Score>(entity).unwrap();
    assert_eq!(ticks.added, spawn_tick);
    assert_eq!(ticks.changed, write_tick);
    assert!(ticks.is_changed(spawn_tick, write_tick));
    assert!(!ticks.is_added(spawn_tick, write_tick));
}

#[test]
fn shared_reads_do_not_stamp() {
    let mut world = World::new();
    let entity = world.spawn(Score(1)).id();
    let before = world.get_component_ticks::<Score>(entity).unwrap();

    world.increment_change_tick();
    let _ = world.get::<Score>(entity);
    world.query().for_each_read::<Score>(|_, _| {});

    let after = world.get_component_ticks::<Score>(entity).unwrap();
    assert_eq!(before, after);
}

#[test]
fn write_queries_stamp_every_visited_value() {
    let mut world = World::new();
    let entity = world.spawn(Score(1)).id();

    world.increment_change_tick();
    let write_tick = world.change_tick();
    // Stamping is per access, not per diff: no mutation happens here.
    world.query().for_each_write::<Score>(|_, _| {});

    let ticks = world.get_component_ticks::<Score>(entity).unwrap();
    assert_eq!(ticks.changed, write_tick);
}

#[test]
fn resource_ticks_track_insert_and_mutation() {
    let mut world = World::new();
    world.increment_change_tick();
    let insert_tick = world.change_tick();
    world.insert_resource(Clock(0));

    let ticks = world.get_resource_ticks::<Clock>().unwrap();
    assert_eq!(ticks.added, insert_tick);
    assert_eq!(ticks.changed, insert_tick);

    world.increment_change_tick();
    let write_tick = world.change_tick();
    world.get_resource_mut::<Clock>().unwrap().0 = 5;
    let ticks = world.get_resource_ticks::<Clock>().unwrap();
    assert_eq!(ticks.added, insert_tick);
    assert_eq!(ticks.changed, write_tick);
}

#[test]
fn stale_ticks_rebase_to_the_maximum_age() {
    let mut world = World::new();
    let entity = world.spawn(Score(3)).id();
    let spawn_tick = world.change_tick();

    // Simulate a very long run: push the clock past the clamp window.
    for _ in 0..3 {
        world.increment_change_tick();
    }
    let near = world.get_component_ticks::<Score>(entity).unwrap();
    assert!(near.changed.is_newer_than(spawn_tick, world.change_tick()) || near.changed == spawn_tick);

    // Force the world clock far ahead by rebasing against a synthetic tick.
    let far_future = Tick::new(spawn_tick.get().wrapping_add(MAX_CHANGE_AGE + 100));
    let mut stale = spawn_tick;
    assert!(stale.check_tick(far_future));
    assert_eq!(far_future.relative_to(stale).get(), MAX_CHANGE_AGE);

    // A fresh tick inside the window is left alone.
    let mut fresh = Tick::new(far_future.get().wrapping_sub(10));
    assert!(!fresh.check_tick(far_future));
}

#[test]
fn world_scan_rebases_storage_ticks() {
    let mut world = World::new();
    let entity = world.spawn(Score(1)).id();
    world.insert_resource(Clock(1));

    // The scan is a no-op while everything is recent.
    let before = world.get_component_ticks::<Score>(entity).unwrap();
    world.check_change_ticks();
    assert_eq!(world.get_component_ticks::<Score>(entity).unwrap(), before);
    assert!(world.get_resource_ticks::<Clock>().is_some());
}
