//! The command extension seam and the resource store.

use std::sync::{Arc, Mutex};

use woven_ecs::engine::commands::{DESPAWN_COMMAND, SPAWN_COMMAND};
use woven_ecs::prelude::*;

#[derive(Debug, PartialEq)]
struct Body(u32);
impl Component for Body {}

#[derive(Debug, Default, PartialEq)]
struct FrameCount(u64);
impl Resource for FrameCount {}

#[derive(Debug, PartialEq)]
struct Settings {
    volume: f32,
}
impl Resource for Settings {}

#[test]
fn spawn_and_despawn_are_observable_by_name() {
    let seen: Arc<Mutex<Vec<(String, Entity)>>> = Arc::new(Mutex::new(Vec::new()));

    let mut world = World::new();
    let spawn_log = Arc::clone(&seen);
    world.add_command_after_hook(SPAWN_COMMAND, move |_world, payload| {
        if let Some(&entity) = payload.downcast_ref::<Entity>() {
            spawn_log.lock().unwrap().push(("spawn".to_owned(), entity));
        }
    });
    let despawn_log = Arc::clone(&seen);
    world.add_command_before_hook(DESPAWN_COMMAND, move |world, payload| {
        if let Some(&entity) = payload.downcast_ref::<Entity>() {
            // Before hooks still see the entity's components.
            assert!(world.get::<Body>(entity).is_some());
            despawn_log
                .lock()
                .unwrap()
                .push(("despawn".to_owned(), entity));
        }
    });

    let entity = world.spawn(Body(1)).id();
    world.despawn(entity);

    let log = seen.lock().unwrap();
    assert_eq!(
        *log,
        vec![("spawn".to_owned(), entity), ("despawn".to_owned(), entity)]
    );
}

#[test]
fn despawn_hooks_may_restructure_the_world() {
    let mut world = World::new();
    let a = world.spawn(Body(1)).id();
    let b = world.spawn(Body(2)).id();
    let c = world.spawn(Body(3)).id();

    // Despawning another entity from the hook swaps table and archetype
    // rows around while the outer despawn is in flight.
    world.add_command_before_hook(DESPAWN_COMMAND, move |world, payload| {
        if payload.downcast_ref::<Entity>() == Some(&c) {
            world.despawn(a);
        }
    });

    assert!(world.despawn(c));
    assert!(!world.contains_entity(a));
    assert!(!world.contains_entity(c));
    assert_eq!(world.get::<Body>(b), Some(&Body(2)));
}

#[test]
fn despawn_survives_a_hook_despawning_the_target() {
    let mut world = World::new();
    let entity = world.spawn(Body(7)).id();
    world.add_command_before_hook(DESPAWN_COMMAND, |world, payload| {
        if let Some(&target) = payload.downcast_ref::<Entity>() {
            world.despawn(target);
        }
    });

    assert!(world.despawn(entity));
    assert!(!world.contains_entity(entity));
}

#[test]
fn named_commands_run_with_hooks_around_them() {
    let trace: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut world = World::new();
    let body = Arc::clone(&trace);
    world.register_command("heal", move |world, payload| {
        body.lock().unwrap().push("body");
        if let Some(&(entity, amount)) = payload.downcast_ref::<(Entity, u32)>() {
            if let Some(target) = world.get_mut::<Body>(entity) {
                target.0 += amount;
            }
        }
    });
    let before = Arc::clone(&trace);
    world.add_command_before_hook("heal", move |_, _| before.lock().unwrap().push("before"));
    let after = Arc::clone(&trace);
    world.add_command_after_hook("heal", move |_, _| after.lock().unwrap().push("after"));

    let entity = world.spawn(Body(10)).id();
    world.run_command("heal", &(entity, 5u32)).unwrap();

    assert_eq!(world.get::<Body>(entity), Some(&Body(15)));
    assert_eq!(*trace.lock().unwrap(), vec!["before", "body", "after"]);
}

#[test]
fn unknown_commands_are_reported() {
    let mut world = World::new();
    let error = world.run_command("teleport", &()).unwrap_err();
    assert_eq!(error.name, "teleport");
}

#[test]
fn resources_insert_overwrite_and_remove() {
    let mut world = World::new();
    assert!(!world.contains_resource::<Settings>());

    world.insert_resource(Settings { volume: 0.5 });
    assert!(world.contains_resource::<Settings>());
    assert_eq!(world.get_resource::<Settings>().unwrap().volume, 0.5);

    world.get_resource_mut::<Settings>().unwrap().volume = 0.8;
    world.insert_resource(Settings { volume: 1.0 });
    assert_eq!(world.get_resource::<Settings>().unwrap().volume, 1.0);

    let taken = world.remove_resource::<Settings>().unwrap();
    assert_eq!(taken.volume, 1.0);
    assert!(!world.contains_resource::<Settings>());
    assert!(world.get_resource::<Settings>().is_none());
}

#[test]
fn init_resource_defaults_without_clobbering() {
    let mut world = World::new();
    world.init_resource::<FrameCount>();
    assert_eq!(world.get_resource::<FrameCount>(), Some(&FrameCount(0)));

    world.get_resource_mut::<FrameCount>().unwrap().0 = 42;
    // A second init is a no-op on an existing value.
    world.init_resource::<FrameCount>();
    assert_eq!(world.get_resource::<FrameCount>(), Some(&FrameCount(42)));
}

#[test]
fn systems_read_resources_through_the_world() {
    let mut world = World::new();
    world.init_resource::<FrameCount>();
    let mut schedule = Schedule::new();
    schedule.add_system(
        FnSystem::new("advance_frame", |world: &mut World| {
            if let Some(frames) = world.get_resource_mut::<FrameCount>() {
                frames.0 += 1;
            }
        })
        .into_config(),
    );
    world.add_schedule("tick", schedule);

    world.run_schedule("tick");
    world.run_schedule("tick");
    world.run_schedule("tick");
    assert_eq!(world.get_resource::<FrameCount>(), Some(&FrameCount(3)));
}
