//! Schedule building and execution: ordering, sets, conditions, cycle and
//! ambiguity reporting.

use std::sync::{Arc, Mutex, Once};

use woven_ecs::engine::error::{ScheduleBuildError, ScheduleRunError};
use woven_ecs::prelude::*;

static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Debug, PartialEq)]
struct Counter(u32);
impl Component for Counter {}

#[derive(Debug, PartialEq)]
struct Flag(bool);
impl Component for Flag {}

#[derive(Debug, Default, PartialEq)]
struct Paused(bool);
impl Resource for Paused {}

fn trace_system(name: &'static str, trace: &Arc<Mutex<Vec<&'static str>>>) -> FnSystem {
    let trace = Arc::clone(trace);
    FnSystem::new(name, move |_world| {
        trace.lock().unwrap().push(name);
    })
}

#[test]
fn before_and_after_constraints_order_execution() {
    init_logging();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.add_system(trace_system("third", &trace).after("second"));
    schedule.add_system(trace_system("first", &trace).before("second"));
    schedule.add_system(trace_system("second", &trace).into_config());

    world.add_schedule("update", schedule);
    world.run_schedule("update");

    assert_eq!(*trace.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn set_ordering_applies_to_every_member() {
    init_logging();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.configure_set(SystemSet::new("sim").before("render"));
    schedule.add_system(trace_system("render", &trace).into_config());
    schedule.add_system(trace_system("integrate", &trace).in_set("sim"));
    schedule.add_system(trace_system("collide", &trace).in_set("sim"));

    world.add_schedule("frame", schedule);
    world.run_schedule("frame");

    let order = trace.lock().unwrap();
    let render_pos = order.iter().position(|&n| n == "render").unwrap();
    assert_eq!(render_pos, 2);
    assert_eq!(order.len(), 3);
}

#[test]
fn false_conditions_skip_systems_and_whole_sets() {
    init_logging();
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut world = World::new();
    world.insert_resource(Paused(true));

    let mut schedule = Schedule::new();
    schedule.configure_set(
        SystemSet::new("gameplay")
            .run_if(|world: &World| !world.get_resource::<Paused>().map_or(false, |p| p.0)),
    );
    schedule.add_system(trace_system("simulate", &trace).in_set("gameplay"));
    schedule.add_system(trace_system("ui", &trace).into_config());
    schedule.add_system(trace_system("debug", &trace).run_if(|_| false));

    world.add_schedule("frame", schedule);
    world.run_schedule("frame");
    assert_eq!(*trace.lock().unwrap(), vec!["ui"]);

    // Unpause: the set's members run again next frame.
    world.get_resource_mut::<Paused>().unwrap().0 = false;
    trace.lock().unwrap().clear();
    world.run_schedule("frame");
    let mut ran = trace.lock().unwrap().clone();
    ran.sort_unstable();
    assert_eq!(ran, vec!["simulate", "ui"]);
}

#[test]
fn dependency_cycles_are_reported_with_member_names() {
    init_logging();
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.add_system(FnSystem::new("a", |_| {}).before("b"));
    schedule.add_system(FnSystem::new("b", |_| {}).before("c"));
    schedule.add_system(FnSystem::new("c", |_| {}).before("a"));

    match schedule.initialize(&mut world) {
        Err(ScheduleBuildError::DependencyCycle(names)) => {
            assert_eq!(names, ["a", "b", "c"]);
        }
        other => panic!("expected a dependency cycle, got {other:?}"),
    }
}

#[test]
fn unknown_order_targets_fail_the_build() {
    init_logging();
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.add_system(FnSystem::new("solo", |_| {}).after("ghost"));

    match schedule.initialize(&mut world) {
        Err(ScheduleBuildError::UnknownOrderTarget { node, target }) => {
            assert_eq!(node, "solo");
            assert_eq!(target, "ghost");
        }
        other => panic!("expected an unknown-target error, got {other:?}"),
    }
}

#[test]
fn duplicate_names_fail_the_build() {
    init_logging();
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.add_system(FnSystem::new("tick", |_| {}).into_config());
    schedule.add_system(FnSystem::new("tick", |_| {}).into_config());

    assert_eq!(
        schedule.initialize(&mut world),
        Err(ScheduleBuildError::DuplicateName("tick".to_owned()))
    );
}

#[test]
fn conflicting_unordered_systems_error_when_severity_demands() {
    init_logging();
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.set_ambiguity_detection(AmbiguityDetection::Error);
    schedule.add_system(FnSystem::new("writer_a", |_| {}).writes::<Counter>().into_config());
    schedule.add_system(FnSystem::new("writer_b", |_| {}).writes::<Counter>().into_config());

    match schedule.initialize(&mut world) {
        Err(ScheduleBuildError::Ambiguity(pairs)) => {
            assert_eq!(pairs.len(), 1);
            let (a, b) = &pairs[0];
            assert!([a.as_str(), b.as_str()].contains(&"writer_a"));
            assert!([a.as_str(), b.as_str()].contains(&"writer_b"));
        }
        other => panic!("expected an ambiguity error, got {other:?}"),
    }

    // Ordering the pair resolves it.
    let mut ordered = Schedule::new();
    ordered.set_ambiguity_detection(AmbiguityDetection::Error);
    ordered.add_system(FnSystem::new("writer_a", |_| {}).writes::<Counter>().into_config());
    ordered.add_system(
        FnSystem::new("writer_b", |_| {})
            .writes::<Counter>()
            .after("writer_a"),
    );
    assert!(ordered.initialize(&mut world).is_ok());

    // Distinct components never conflict.
    let mut disjoint = Schedule::new();
    disjoint.set_ambiguity_detection(AmbiguityDetection::Error);
    disjoint.add_system(FnSystem::new("writer_a", |_| {}).writes::<Counter>().into_config());
    disjoint.add_system(FnSystem::new("writer_b", |_| {}).writes::<Flag>().into_config());
    assert!(disjoint.initialize(&mut world).is_ok());
}

#[test]
fn each_run_advances_the_change_tick_once() {
    init_logging();
    let mut world = World::new();
    let mut schedule = Schedule::new();
    schedule.add_system(FnSystem::new("noop_a", |_| {}).into_config());
    schedule.add_system(FnSystem::new("noop_b", |_| {}).into_config());
    world.add_schedule("update", schedule);

    let before = world.change_tick().get();
    world.run_schedule("update");
    assert_eq!(world.change_tick().get(), before + 1);
    world.run_schedule("update");
    assert_eq!(world.change_tick().get(), before + 2);
}

#[test]
fn systems_mutate_the_world_through_queries() {
    init_logging();
    let mut world = World::new();
    let a = world.spawn(Counter(0)).id();
    let b = world.spawn(Counter(10)).id();

    let mut schedule = Schedule::new();
    schedule.add_system(
        FnSystem::new("bump", |world: &mut World| {
            world
                .query()
                .for_each_write::<Counter>(|_, counter| counter.0 += 1);
        })
        .writes::<Counter>()
        .into_config(),
    );
    world.add_schedule("update", schedule);

    world.run_schedule("update");
    world.run_schedule("update");
    assert_eq!(world.get::<Counter>(a), Some(&Counter(2)));
    assert_eq!(world.get::<Counter>(b), Some(&Counter(12)));
}

#[test]
#[should_panic(expected = "no schedule registered under label")]
fn run_schedule_panics_on_missing_label() {
    let mut world = World::new();
    world.run_schedule("missing");
}

#[test]
fn try_run_schedule_returns_the_error_instead() {
    init_logging();
    let mut world = World::new();
    let result = world.try_run_schedule("missing");
    assert!(matches!(result, Err(ScheduleRunError::NotFound(_))));

    world.add_schedule("real", Schedule::new());
    assert!(world.try_run_schedule("real").is_ok());
}
