//! Schedule construction and execution.
//!
//! A [`Schedule`] owns a list of systems and named sets, validates their
//! ordering constraints into a DAG, and runs the systems single-threaded in
//! a topological order.
//!
//! ## Build pipeline
//!
//! Initialization (deferred to the first run, or explicit) performs, in
//! order:
//!
//! 1. name uniqueness across systems and sets;
//! 2. access resolution for every system against the world registry;
//! 3. constraint resolution (`before`/`after` targets must name a known
//!    system or set) into a dependency graph, with set-level edges projected
//!    onto every member system;
//! 4. cycle detection via Tarjan SCC — any component with more than one
//!    node (or a self-edge) is reported with its member names;
//! 5. topological ordering, derived by reversing the SCC stream;
//! 6. ambiguity detection: unordered system pairs with conflicting access
//!    are ignored, logged, or turned into a build error depending on
//!    [`AmbiguityDetection`].
//!
//! ## Execution
//!
//! Each run advances the world change tick once, then walks the topological
//! order. Set conditions are evaluated at most once per run; a false
//! condition (set or system) skips without touching the system's tick
//! window. After the walk the schedule triggers the periodic change-tick
//! scan when the world says one is due, rebasing its own systems' windows
//! alongside the storage scan.

pub mod graph;

use std::collections::HashMap;

use crate::engine::error::ScheduleBuildError;
use crate::engine::schedule::graph::{DiGraph, NodeId};
use crate::engine::systems::{IntoSystemConfig, SystemConfig, SystemSet};
use crate::engine::tick::Tick;
use crate::engine::world::World;

/// What to do about unordered system pairs with conflicting access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AmbiguityDetection {
    /// Say nothing.
    Ignore,
    /// Log each pair once at build time.
    #[default]
    Warn,
    /// Fail the build with [`ScheduleBuildError::Ambiguity`].
    Error,
}

struct Executable {
    /// System indices in execution order.
    order: Vec<usize>,
    /// Per system index, the set indices it belongs to.
    system_sets: Vec<Vec<usize>>,
}

/// An ordered collection of systems, validated and run as a unit.
#[derive(Default)]
pub struct Schedule {
    systems: Vec<SystemConfig>,
    sets: Vec<SystemSet>,
    ambiguity: AmbiguityDetection,
    executable: Option<Executable>,
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a system (or configured system). Invalidates any previous
    /// build.
    pub fn add_system(&mut self, system: impl IntoSystemConfig) -> &mut Self {
        self.systems.push(system.into_config());
        self.executable = None;
        self
    }

    /// Declares a named set. Invalidates any previous build.
    pub fn configure_set(&mut self, set: SystemSet) -> &mut Self {
        self.sets.push(set);
        self.executable = None;
        self
    }

    /// Selects ambiguity handling. Invalidates any previous build.
    pub fn set_ambiguity_detection(&mut self, mode: AmbiguityDetection) -> &mut Self {
        self.ambiguity = mode;
        self.executable = None;
        self
    }

    /// Number of systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Resolves names into the `(name -> node)` map, rejecting duplicates.
    fn node_ids(&self) -> Result<HashMap<String, NodeId>, ScheduleBuildError> {
        let mut ids = HashMap::new();
        for (index, config) in self.systems.iter().enumerate() {
            let name = config.system.name().to_owned();
            if ids.insert(name.clone(), NodeId::System(index)).is_some() {
                return Err(ScheduleBuildError::DuplicateName(name));
            }
        }
        for (index, set) in self.sets.iter().enumerate() {
            if ids.insert(set.name.clone(), NodeId::Set(index)).is_some() {
                return Err(ScheduleBuildError::DuplicateName(set.name.clone()));
            }
        }
        Ok(ids)
    }

    /// Builds the validated execution order. Idempotent; later mutation of
    /// the schedule invalidates it again.
    pub fn initialize(&mut self, world: &mut World) -> Result<(), ScheduleBuildError> {
        if self.executable.is_some() {
            return Ok(());
        }

        let ids = self.node_ids()?;
        for config in &mut self.systems {
            config.system.initialize(world.components_mut());
        }

        // Collect declared edges among system and set nodes. An edge a -> b
        // means "a runs before b".
        let mut declared: Vec<(NodeId, NodeId)> = Vec::new();
        let resolve = |node_name: &str, target: &str| -> Result<NodeId, ScheduleBuildError> {
            ids.get(target)
                .copied()
                .ok_or_else(|| ScheduleBuildError::UnknownOrderTarget {
                    node: node_name.to_owned(),
                    target: target.to_owned(),
                })
        };
        for (index, config) in self.systems.iter().enumerate() {
            let node = NodeId::System(index);
            let name = config.system.name();
            for target in &config.before {
                declared.push((node, resolve(name, target)?));
            }
            for target in &config.after {
                declared.push((resolve(name, target)?, node));
            }
        }
        for (index, set) in self.sets.iter().enumerate() {
            let node = NodeId::Set(index);
            for target in &set.before {
                declared.push((node, resolve(&set.name, target)?));
            }
            for target in &set.after {
                declared.push((resolve(&set.name, target)?, node));
            }
        }

        // Set membership, and per-system membership for run-time skipping.
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.sets.len()];
        let mut system_sets: Vec<Vec<usize>> = vec![Vec::new(); self.systems.len()];
        for (index, config) in self.systems.iter().enumerate() {
            for set_name in &config.sets {
                let node = resolve(config.system.name(), set_name)?;
                match node {
                    NodeId::Set(set_index) => {
                        members[set_index].push(index);
                        system_sets[index].push(set_index);
                    }
                    NodeId::System(_) => {
                        return Err(ScheduleBuildError::UnknownOrderTarget {
                            node: config.system.name().to_owned(),
                            target: set_name.clone(),
                        });
                    }
                }
            }
        }

        // Project set edges onto member systems.
        let expand = |node: NodeId| -> Vec<usize> {
            match node {
                NodeId::System(i) => vec![i],
                NodeId::Set(s) => members[s].clone(),
            }
        };
        let mut dependency = DiGraph::new();
        for index in 0..self.systems.len() {
            dependency.add_node(NodeId::System(index));
        }
        for (from, to) in declared {
            for &a in &expand(from) {
                for &b in &expand(to) {
                    if a == b {
                        // A system ordered against itself through
                        // overlapping sets can never run.
                        return Err(ScheduleBuildError::DependencyCycle(vec![self.systems[a]
                            .system
                            .name()
                            .to_owned()]));
                    }
                    dependency.add_edge(NodeId::System(a), NodeId::System(b));
                }
            }
        }

        // Tarjan yields components in reverse topological order; reversing
        // the singleton stream gives the execution order.
        let mut order = Vec::with_capacity(self.systems.len());
        for scc in dependency.iter_sccs() {
            if scc.len() > 1 {
                let mut names: Vec<String> = scc
                    .iter()
                    .map(|node| self.systems[node.index()].system.name().to_owned())
                    .collect();
                names.sort_unstable();
                return Err(ScheduleBuildError::DependencyCycle(names));
            }
            order.push(scc[0].index());
        }
        order.reverse();

        self.check_ambiguities(&dependency)?;

        self.executable = Some(Executable { order, system_sets });
        Ok(())
    }

    /// Reports unordered conflicting pairs per the configured severity.
    fn check_ambiguities(&self, dependency: &DiGraph) -> Result<(), ScheduleBuildError> {
        if self.ambiguity == AmbiguityDetection::Ignore {
            return Ok(());
        }

        // Transitive reachability over the (acyclic by now) dependency
        // graph; system counts are small enough for the quadratic walk.
        let n = self.systems.len();
        let mut reachable = vec![vec![false; n]; n];
        for start in 0..n {
            let mut stack = vec![start];
            while let Some(v) = stack.pop() {
                for neighbor in dependency.neighbors(NodeId::System(v)) {
                    let w = neighbor.index();
                    if !reachable[start][w] {
                        reachable[start][w] = true;
                        stack.push(w);
                    }
                }
            }
        }

        let mut pairs = Vec::new();
        for a in 0..n {
            for b in (a + 1)..n {
                if reachable[a][b] || reachable[b][a] {
                    continue;
                }
                let access_a = self.systems[a].system.access();
                let access_b = self.systems[b].system.access();
                if access_a.conflicts_with(access_b) {
                    pairs.push((
                        self.systems[a].system.name().to_owned(),
                        self.systems[b].system.name().to_owned(),
                        access_a.conflicting_components(access_b),
                    ));
                }
            }
        }
        if pairs.is_empty() {
            return Ok(());
        }
        match self.ambiguity {
            AmbiguityDetection::Ignore => Ok(()),
            AmbiguityDetection::Warn => {
                for (a, b, components) in &pairs {
                    log::warn!(
                        "systems `{a}` and `{b}` access conflicting components {components:?} and have no ordering between them"
                    );
                }
                Ok(())
            }
            AmbiguityDetection::Error => Err(ScheduleBuildError::Ambiguity(
                pairs.into_iter().map(|(a, b, _)| (a, b)).collect(),
            )),
        }
    }

    /// Runs the schedule once, initializing first if needed.
    pub fn run(&mut self, world: &mut World) -> Result<(), ScheduleBuildError> {
        self.initialize(world)?;

        world.increment_change_tick();
        let this_run = world.change_tick();

        let executable = self
            .executable
            .as_ref()
            .unwrap_or_else(|| unreachable!("initialized above"));
        let mut set_pass: Vec<Option<bool>> = vec![None; self.sets.len()];

        for &system_index in &executable.order {
            let mut skipped = false;
            for &set_index in &executable.system_sets[system_index] {
                let pass = match set_pass[set_index] {
                    Some(pass) => pass,
                    None => {
                        let pass = self.sets[set_index]
                            .conditions
                            .iter_mut()
                            .all(|condition| condition(world));
                        set_pass[set_index] = Some(pass);
                        pass
                    }
                };
                if !pass {
                    skipped = true;
                    break;
                }
            }
            if skipped {
                continue;
            }

            let config = &mut self.systems[system_index];
            if !config.conditions.iter_mut().all(|condition| condition(world)) {
                continue;
            }
            config.system.run(world);
            config.system.set_last_run(this_run);
        }

        if world.take_tick_check_due() {
            world.check_change_ticks();
            self.check_change_ticks(world.change_tick());
        }
        Ok(())
    }

    /// Rebases every system's tick window, warning about long-idle systems.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for config in &mut self.systems {
            let mut last_run = config.system.last_run();
            if last_run.check_tick(change_tick) {
                log::warn!(
                    "system `{}` has not run for more than {} ticks; its change window was clamped",
                    config.system.name(),
                    crate::engine::tick::MAX_CHANGE_AGE
                );
                config.system.set_last_run(last_run);
            }
        }
    }
}

/// Labelled schedules owned by a world.
#[derive(Default)]
pub struct Schedules {
    map: HashMap<String, Schedule>,
}

impl Schedules {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the schedule under `label`.
    pub fn insert(&mut self, label: impl Into<String>, schedule: Schedule) {
        self.map.insert(label.into(), schedule);
    }

    /// Removes the schedule under `label`, for the take-run-reinsert dance.
    pub fn remove(&mut self, label: &str) -> Option<Schedule> {
        self.map.remove(label)
    }

    /// The schedule under `label`.
    pub fn get(&self, label: &str) -> Option<&Schedule> {
        self.map.get(label)
    }

    /// Mutable access to the schedule under `label`.
    pub fn get_mut(&mut self, label: &str) -> Option<&mut Schedule> {
        self.map.get_mut(label)
    }

    /// Returns `true` if a schedule is registered under `label`.
    pub fn contains(&self, label: &str) -> bool {
        self.map.contains_key(label)
    }

    /// Rebases tick windows in every registered schedule.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for schedule in self.map.values_mut() {
            schedule.check_change_ticks(change_tick);
        }
    }
}
