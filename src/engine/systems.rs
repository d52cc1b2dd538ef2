//! Systems and their schedule-facing configuration.
//!
//! A [`System`] is a named unit of work with a declared component access
//! set. Access is declared by type and resolved against the world's
//! component registry when the owning schedule initializes, so systems can
//! be built before any component is registered.
//!
//! [`FnSystem`] wraps a closure; most systems are built that way:
//!
//! ```ignore
//! FnSystem::new("integrate", |world| { /* ... */ })
//!     .reads::<Velocity>()
//!     .writes::<Position>()
//!     .after("input")
//! ```
//!
//! The chaining methods past `reads`/`writes` come from
//! [`IntoSystemConfig`], which lifts a system into a [`SystemConfig`]
//! carrying ordering constraints, set membership, and run conditions.

use std::borrow::Cow;

use crate::engine::component::{Component, Components};
use crate::engine::tick::Tick;
use crate::engine::types::{Access, ComponentId};
use crate::engine::world::World;

/// A predicate evaluated against the world before a system (or set) runs;
/// `false` skips without advancing the system's tick window.
pub type RunCondition = Box<dyn FnMut(&World) -> bool + Send + Sync>;

/// A named, runnable unit of work with declared component access.
pub trait System: Send + Sync {
    /// The system's unique (per schedule) name.
    fn name(&self) -> &str;

    /// Resolves declared access against the registry. Called once by the
    /// owning schedule's initialization.
    fn initialize(&mut self, components: &mut Components);

    /// The resolved access set. Empty until [`System::initialize`] runs.
    fn access(&self) -> &Access;

    /// Runs the system.
    fn run(&mut self, world: &mut World);

    /// The change tick recorded after this system's previous run.
    fn last_run(&self) -> Tick;

    /// Records the change tick window for the run that just completed.
    fn set_last_run(&mut self, tick: Tick);
}

type AccessRegistrar = fn(&mut Components) -> ComponentId;

fn registrar<T: Component>(components: &mut Components) -> ComponentId {
    components.init_component::<T>()
}

/// A [`System`] backed by a closure.
pub struct FnSystem {
    name: Cow<'static, str>,
    func: Box<dyn FnMut(&mut World) + Send + Sync>,
    reads: Vec<AccessRegistrar>,
    writes: Vec<AccessRegistrar>,
    access: Access,
    last_run: Tick,
}

impl FnSystem {
    /// Wraps `func` as a system called `name`.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        func: impl FnMut(&mut World) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
            reads: Vec::new(),
            writes: Vec::new(),
            access: Access::default(),
            last_run: Tick::new(0),
        }
    }

    /// Declares a read of `T`.
    pub fn reads<T: Component>(mut self) -> Self {
        self.reads.push(registrar::<T>);
        self
    }

    /// Declares a write of `T`.
    pub fn writes<T: Component>(mut self) -> Self {
        self.writes.push(registrar::<T>);
        self
    }
}

impl System for FnSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, components: &mut Components) {
        self.access = Access::default();
        for resolve in &self.reads {
            let id = resolve(components);
            self.access.reads.insert(id);
        }
        for resolve in &self.writes {
            let id = resolve(components);
            self.access.writes.insert(id);
        }
    }

    fn access(&self) -> &Access {
        &self.access
    }

    fn run(&mut self, world: &mut World) {
        (self.func)(world);
    }

    fn last_run(&self) -> Tick {
        self.last_run
    }

    fn set_last_run(&mut self, tick: Tick) {
        self.last_run = tick;
    }
}

/// A system plus its schedule-facing constraints.
pub struct SystemConfig {
    pub(crate) system: Box<dyn System>,
    pub(crate) before: Vec<String>,
    pub(crate) after: Vec<String>,
    pub(crate) sets: Vec<String>,
    pub(crate) conditions: Vec<RunCondition>,
}

/// Lifts a system into a [`SystemConfig`], providing the ordering and
/// condition builders.
pub trait IntoSystemConfig: Sized {
    /// Performs the lift.
    fn into_config(self) -> SystemConfig;

    /// Orders this system before the named system or set.
    fn before(self, target: impl Into<String>) -> SystemConfig {
        let mut config = self.into_config();
        config.before.push(target.into());
        config
    }

    /// Orders this system after the named system or set.
    fn after(self, target: impl Into<String>) -> SystemConfig {
        let mut config = self.into_config();
        config.after.push(target.into());
        config
    }

    /// Places this system in the named set.
    fn in_set(self, set: impl Into<String>) -> SystemConfig {
        let mut config = self.into_config();
        config.sets.push(set.into());
        config
    }

    /// Gates this system on a predicate; `false` skips the run.
    fn run_if(self, condition: impl FnMut(&World) -> bool + Send + Sync + 'static) -> SystemConfig {
        let mut config = self.into_config();
        config.conditions.push(Box::new(condition));
        config
    }
}

impl IntoSystemConfig for SystemConfig {
    fn into_config(self) -> SystemConfig {
        self
    }
}

impl IntoSystemConfig for FnSystem {
    fn into_config(self) -> SystemConfig {
        SystemConfig {
            system: Box::new(self),
            before: Vec::new(),
            after: Vec::new(),
            sets: Vec::new(),
            conditions: Vec::new(),
        }
    }
}

impl<S: System + 'static> IntoSystemConfig for Box<S> {
    fn into_config(self) -> SystemConfig {
        SystemConfig {
            system: self,
            before: Vec::new(),
            after: Vec::new(),
            sets: Vec::new(),
            conditions: Vec::new(),
        }
    }
}

/// Declares a named system set, optionally ordered and conditioned.
///
/// Ordering an entire set orders every member; a false set condition skips
/// every member for that run.
pub struct SystemSet {
    pub(crate) name: String,
    pub(crate) before: Vec<String>,
    pub(crate) after: Vec<String>,
    pub(crate) conditions: Vec<RunCondition>,
}

impl SystemSet {
    /// Declares a set called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: Vec::new(),
            after: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Orders every member before the named system or set.
    pub fn before(mut self, target: impl Into<String>) -> Self {
        self.before.push(target.into());
        self
    }

    /// Orders every member after the named system or set.
    pub fn after(mut self, target: impl Into<String>) -> Self {
        self.after.push(target.into());
        self
    }

    /// Gates every member on a predicate.
    pub fn run_if(
        mut self,
        condition: impl FnMut(&World) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }
}
