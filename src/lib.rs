//! # woven-ecs
//!
//! Archetype-based entity/component storage and scheduling core.
//!
//! ## Design Goals
//! - Archetype-based storage for cache-friendly iteration
//! - Generation-validated entity handles (no dangling references)
//! - Tick-based change detection that survives counter wraparound
//! - Deterministic single-threaded scheduling with cycle and conflict
//!   validation
//!
//! Entities are plain `(index, generation)` ids; their components live in
//! either dense table columns or per-component sparse sets, grouped by
//! archetype. Bundles move entities between archetypes through memoized
//! graph edges. Schedules validate their ordering constraints into a DAG
//! and run systems in topological order with change-tick bookkeeping.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// World and entities

pub use engine::world::{EntityHandle, World};

pub use engine::entity::{AllocAtWithoutReplacement, Entities, Entity, EntityLocation};

// Components, bundles, and storage

pub use engine::component::{Component, ComponentDescriptor, Components, Resource, StorageType};

pub use engine::bundle::{Bundle, BundleInfo, Bundles};

pub use engine::archetype::{Archetype, ArchetypeEntity, Archetypes, ComponentStatus};

// Queries and systems

pub use engine::query::QueryBuilder;

pub use engine::systems::{FnSystem, IntoSystemConfig, System, SystemConfig, SystemSet};
pub use engine::schedule::{AmbiguityDetection, Schedule, Schedules};

// Change detection

pub use engine::tick::{ComponentTicks, Tick, CHECK_TICK_THRESHOLD, MAX_CHANGE_AGE};

// Errors

pub use engine::error::{
    CommandNotFoundError, ScheduleBuildError, ScheduleNotFoundError, ScheduleRunError,
    StaleEntityError,
};

pub use engine::types::{ArchetypeId, BundleId, ComponentId, TableId};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use woven_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AmbiguityDetection, Bundle, Component, Entity, FnSystem, IntoSystemConfig, Resource,
        Schedule, StorageType, System, SystemSet, World,
    };
}
