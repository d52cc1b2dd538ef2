//! The storage and scheduling core.
//!
//! Modules are layered bottom-up: identifiers and ticks at the base, then
//! the entity allocator and registries, the raw storage classes, the
//! archetype graph and bundle machinery built on them, and finally queries,
//! schedules, and the [`world::World`] facade tying everything together.

pub mod archetype;
pub mod bundle;
pub mod commands;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod schedule;
pub mod storage;
pub mod systems;
pub mod tick;
pub mod types;
pub mod world;
