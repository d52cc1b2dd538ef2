//! Raw component and resource storage.
//!
//! Three storage classes live under one roof:
//!
//! * [`table::Tables`] — dense columnar storage for table-backed components.
//! * [`sparse_set::SparseSets`] — per-component sparse sets for components
//!   that trade iteration speed for cheap insert/remove.
//! * [`resource::Resources`] — single-slot world singletons.
//!
//! [`Storages`] owns all three as separate fields so structural operations
//! can split-borrow them (a table move and a sparse-set insert happen inside
//! the same bundle insertion).

pub mod resource;
pub mod sparse_set;
pub mod table;

use crate::engine::tick::Tick;

/// The raw storage owned by a world.
#[derive(Default)]
pub struct Storages {
    /// Dense columnar storage.
    pub tables: table::Tables,
    /// Sparse-set component storage.
    pub sparse_sets: sparse_set::SparseSets,
    /// Resource singletons.
    pub resources: resource::Resources,
}

impl Storages {
    /// Creates empty storage (with the empty table at id 0).
    pub fn new() -> Self {
        Self {
            tables: table::Tables::new(),
            sparse_sets: sparse_set::SparseSets::new(),
            resources: resource::Resources::new(),
        }
    }

    /// Rebases change ticks across all storage classes.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        self.tables.check_change_ticks(change_tick);
        self.sparse_sets.check_change_ticks(change_tick);
        self.resources.check_change_ticks(change_tick);
    }
}
