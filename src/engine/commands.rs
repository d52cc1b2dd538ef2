//! Named commands and their observation hooks.
//!
//! The command registry is the world's extension seam: outer layers register
//! named operations (`"attach_mesh"`, `"set_parent"`) and, independently,
//! hooks that observe an operation by name without owning it. The core
//! itself publishes `"spawn"` and `"despawn"` as observable names, so a
//! hierarchy or rendering layer can react to structural changes without the
//! core knowing it exists.
//!
//! Hooks receive the world **mutably** and the command's type-erased
//! payload. To make that possible while the registry itself lives inside
//! the world, invocation temporarily takes the registry out of the world
//! (`mem::take`) and reinstates it afterwards; a hook that registers more
//! hooks during invocation therefore sees them apply from the next
//! invocation on.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::error::CommandNotFoundError;
use crate::engine::world::World;

/// A named operation body.
pub type CommandFn = Box<dyn Fn(&mut World, &dyn Any) + Send + Sync>;

/// An observer attached before or after a named operation.
pub type CommandHook = Box<dyn Fn(&mut World, &dyn Any) + Send + Sync>;

/// Command name published when an entity is spawned; the payload is the new
/// [`crate::engine::entity::Entity`].
pub const SPAWN_COMMAND: &str = "spawn";

/// Command name published when an entity is despawned; the payload is the
/// despawned [`crate::engine::entity::Entity`].
pub const DESPAWN_COMMAND: &str = "despawn";

/// Registry of named commands and their hooks.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandFn>,
    before_hooks: HashMap<String, Vec<CommandHook>>,
    after_hooks: HashMap<String, Vec<CommandHook>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the body for `name`.
    pub fn register(&mut self, name: impl Into<String>, command: CommandFn) {
        self.commands.insert(name.into(), command);
    }

    /// Returns `true` if a body is registered for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Attaches a hook that runs before the named operation.
    ///
    /// Hooks attach to the **name**, not the body: observing `"spawn"` works
    /// even though spawning has no registered body.
    pub fn add_before_hook(&mut self, name: impl Into<String>, hook: CommandHook) {
        self.before_hooks.entry(name.into()).or_default().push(hook);
    }

    /// Attaches a hook that runs after the named operation.
    pub fn add_after_hook(&mut self, name: impl Into<String>, hook: CommandHook) {
        self.after_hooks.entry(name.into()).or_default().push(hook);
    }

    /// Runs the before hooks for `name`.
    pub(crate) fn fire_before(&self, world: &mut World, name: &str, payload: &dyn Any) {
        if let Some(hooks) = self.before_hooks.get(name) {
            for hook in hooks {
                hook(world, payload);
            }
        }
    }

    /// Runs the after hooks for `name`.
    pub(crate) fn fire_after(&self, world: &mut World, name: &str, payload: &dyn Any) {
        if let Some(hooks) = self.after_hooks.get(name) {
            for hook in hooks {
                hook(world, payload);
            }
        }
    }

    /// Runs the body for `name` (hooks included).
    pub(crate) fn run(
        &self,
        world: &mut World,
        name: &str,
        payload: &dyn Any,
    ) -> Result<(), CommandNotFoundError> {
        let command = self.commands.get(name).ok_or_else(|| CommandNotFoundError {
            name: name.to_owned(),
        })?;
        self.fire_before(world, name, payload);
        command(world, payload);
        self.fire_after(world, name, payload);
        Ok(())
    }
}
