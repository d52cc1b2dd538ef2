//! Error types for schedule construction, schedule execution, and entity
//! operations.
//!
//! This module declares focused, composable error types used across the
//! storage and scheduling core. Each error carries enough context to make
//! failures actionable while remaining small and cheap to pass around or
//! convert into higher-level variants.
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g. a
//!   dependency cycle, a missing schedule label, a stale entity handle).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into aggregate
//!   errors.
//! * **Actionability:** Structured fields (system names in a cycle, the label
//!   that failed to resolve) make logs useful without reproducing the issue.
//!
//! ## Where panics are used instead
//! Programming-contract violations — a duplicate component inside a bundle,
//! mutating the entity allocator with a pending flush — indicate caller bugs
//! and fail fast by panicking rather than returning any of these types.
//! Soft integrity conditions (generation wraparound, long-idle system tick
//! rebase) are logged, not raised, because they do not corrupt invariants
//! immediately.

use std::fmt;

use crate::engine::entity::Entity;

/// Returned when an operation targets an entity whose generation no longer
/// matches the allocator's current generation for that slot.
///
/// ### Fields
/// * `entity` — The stale handle that was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError {
    /// The handle that failed generation validation.
    pub entity: Entity,
}

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity {:?} is stale or despawned; its generation no longer matches",
            self.entity
        )
    }
}

impl std::error::Error for StaleEntityError {}

/// Returned when a schedule label does not resolve to a registered schedule.
///
/// A missing label is a configuration error: `World::run_schedule` panics on
/// it, while `World::try_run_schedule` surfaces this error and logs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleNotFoundError {
    /// The label that failed to resolve.
    pub label: String,
}

impl fmt::Display for ScheduleNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no schedule registered under label `{}`", self.label)
    }
}

impl std::error::Error for ScheduleNotFoundError {}

/// Returned when a named command does not resolve in the command registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNotFoundError {
    /// The command name that failed to resolve.
    pub name: String,
}

impl fmt::Display for CommandNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no command registered under name `{}`", self.name)
    }
}

impl std::error::Error for CommandNotFoundError {}

/// Errors produced while building a schedule's dependency graph.
///
/// Construction validates the graph before any system runs; all variants
/// indicate a schedule definition that can never execute correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleBuildError {
    /// A dependency cycle among systems and/or sets.
    ///
    /// Contains the names of every node in one strongly-connected component
    /// of length greater than one.
    DependencyCycle(Vec<String>),

    /// A `before`/`after` constraint referenced a name that matches no
    /// registered system or set.
    UnknownOrderTarget {
        /// The system or set declaring the constraint.
        node: String,
        /// The unresolved target name.
        target: String,
    },

    /// Two systems access conflicting components with no ordering between
    /// them, and the schedule's ambiguity detection is set to `Error`.
    Ambiguity(Vec<(String, String)>),

    /// Two systems were registered under the same name, which would make
    /// `before`/`after` targets ambiguous.
    DuplicateName(String),
}

impl fmt::Display for ScheduleBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleBuildError::DependencyCycle(names) => {
                write!(f, "dependency cycle among: {}", names.join(" -> "))
            }
            ScheduleBuildError::UnknownOrderTarget { node, target } => {
                write!(
                    f,
                    "`{node}` orders against `{target}`, which is not a registered system or set"
                )
            }
            ScheduleBuildError::Ambiguity(pairs) => {
                write!(f, "ambiguous system pairs with conflicting access:")?;
                for (a, b) in pairs {
                    write!(f, " ({a}, {b})")?;
                }
                Ok(())
            }
            ScheduleBuildError::DuplicateName(name) => {
                write!(f, "duplicate system or set name `{name}`")
            }
        }
    }
}

impl std::error::Error for ScheduleBuildError {}

/// Aggregate error for best-effort schedule execution.
///
/// `World::try_run_schedule` bubbles either a label lookup failure or a
/// deferred schedule build failure through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleRunError {
    /// The label did not resolve.
    NotFound(ScheduleNotFoundError),
    /// The schedule's graph failed validation during deferred initialization.
    Build(ScheduleBuildError),
}

impl fmt::Display for ScheduleRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleRunError::NotFound(e) => e.fmt(f),
            ScheduleRunError::Build(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ScheduleRunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScheduleRunError::NotFound(e) => Some(e),
            ScheduleRunError::Build(e) => Some(e),
        }
    }
}

impl From<ScheduleNotFoundError> for ScheduleRunError {
    fn from(e: ScheduleNotFoundError) -> Self {
        ScheduleRunError::NotFound(e)
    }
}

impl From<ScheduleBuildError> for ScheduleRunError {
    fn from(e: ScheduleBuildError) -> Self {
        ScheduleRunError::Build(e)
    }
}
