//! Dense columnar storage.
//!
//! A [`Table`] holds the table-backed components of every entity whose
//! archetype maps to it, one [`Column`] per component id plus a parallel
//! entity list. Rows are compacted by swap-remove, so a row index is only
//! valid until the next structural operation and must be re-read from the
//! entity allocator afterwards.
//!
//! ## Row protocol
//!
//! [`Table::allocate`] appends an entity row but does **not** touch the
//! columns: the caller must push exactly one value into every column before
//! the structural operation completes. The move shapes below and the bundle
//! writer uphold this between them; it is the one place where the
//! columns-match-entities invariant is transiently relaxed.
//!
//! ## Move shapes
//!
//! Three shapes cover every archetype transition:
//!
//! * [`Table::move_to_superset_unchecked`] — the destination has every
//!   source column (component addition).
//! * [`Table::move_to_and_forget_missing_unchecked`] — values without a
//!   destination column are handed to a sink (component `take`).
//! * [`Table::move_to_and_drop_missing_unchecked`] — values without a
//!   destination column run their drop hook (component removal, despawn).
//!
//! "Unchecked" means the caller promises the row is in bounds and the
//! destination actually has the claimed shape; these are validated with
//! debug assertions only.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::component::{ComponentInfo, Components, DropFn};
use crate::engine::entity::Entity;
use crate::engine::storage::sparse_set::SparseArray;
use crate::engine::tick::{check_tick_slice, ComponentTicks, Tick};
use crate::engine::types::{ComponentId, TableId, TableRow};

/// One component's values across every row of a table, with parallel
/// change-detection ticks.
///
/// ## Invariants
/// - `data`, `added_ticks`, and `changed_ticks` always have equal length,
///   and (outside an in-progress structural operation) equal to the owning
///   table's entity count.
pub struct Column {
    data: Vec<Box<dyn Any + Send + Sync>>,
    added_ticks: Vec<Tick>,
    changed_ticks: Vec<Tick>,
    drop: Option<DropFn>,
}

impl Column {
    /// Creates an empty column carrying the component's drop hook.
    pub fn new(info: &ComponentInfo) -> Self {
        Self {
            data: Vec::new(),
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
            drop: info.drop_fn(),
        }
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the column has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends a value with explicit ticks.
    #[inline]
    pub fn push(&mut self, value: Box<dyn Any + Send + Sync>, ticks: ComponentTicks) {
        self.data.push(value);
        self.added_ticks.push(ticks.added);
        self.changed_ticks.push(ticks.changed);
    }

    /// Overwrites the value at `row`, running the drop hook on the old value
    /// and stamping the changed tick. The added tick is preserved.
    pub fn replace(&mut self, row: TableRow, value: Box<dyn Any + Send + Sync>, change_tick: Tick) {
        let old = std::mem::replace(&mut self.data[row], value);
        if let Some(drop_fn) = self.drop {
            drop_fn(old);
        }
        self.changed_ticks[row] = change_tick;
    }

    /// Shared access to the value at `row`.
    #[inline]
    pub fn get(&self, row: TableRow) -> Option<&(dyn Any + Send + Sync)> {
        self.data.get(row).map(|v| &**v)
    }

    /// Mutable access to the value at `row`, stamping the changed tick.
    #[inline]
    pub fn get_mut(
        &mut self,
        row: TableRow,
        change_tick: Tick,
    ) -> Option<&mut (dyn Any + Send + Sync)> {
        let value = self.data.get_mut(row)?;
        self.changed_ticks[row] = change_tick;
        Some(&mut **value)
    }

    /// The ticks for `row`.
    #[inline]
    pub fn get_ticks(&self, row: TableRow) -> Option<ComponentTicks> {
        Some(ComponentTicks {
            added: *self.added_ticks.get(row)?,
            changed: *self.changed_ticks.get(row)?,
        })
    }

    /// Swap-removes `row`, running the drop hook.
    pub fn swap_remove(&mut self, row: TableRow) {
        let value = self.data.swap_remove(row);
        self.added_ticks.swap_remove(row);
        self.changed_ticks.swap_remove(row);
        if let Some(drop_fn) = self.drop {
            drop_fn(value);
        }
    }

    /// Swap-removes `row` and hands the value (and its ticks) back.
    pub fn swap_remove_and_forget(
        &mut self,
        row: TableRow,
    ) -> (Box<dyn Any + Send + Sync>, ComponentTicks) {
        let value = self.data.swap_remove(row);
        let ticks = ComponentTicks {
            added: self.added_ticks.swap_remove(row),
            changed: self.changed_ticks.swap_remove(row),
        };
        (value, ticks)
    }

    /// Rebases every row's ticks against the current change tick.
    pub fn check_change_ticks(&mut self, change_tick: Tick, component_id: ComponentId) {
        check_tick_slice(&mut self.added_ticks, change_tick, component_id);
        check_tick_slice(&mut self.changed_ticks, change_tick, component_id);
    }
}

/// Outcome of moving a row between tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMoveResult {
    /// The moved entity's row in the destination table.
    pub new_row: TableRow,
    /// The entity swap-moved into the vacated source row, if the source row
    /// was not last.
    pub swapped_entity: Option<Entity>,
}

/// Columnar storage for one exact set of table components.
pub struct Table {
    columns: SparseArray<Column>,
    component_ids: Vec<ComponentId>,
    entities: Vec<Entity>,
}

impl Table {
    fn new(component_ids: Vec<ComponentId>, components: &Components) -> Self {
        let mut columns = SparseArray::new();
        for &id in &component_ids {
            let info = components
                .get_info(id)
                .unwrap_or_else(|| panic!("table built over unregistered component id {id}"));
            columns.insert(id, Column::new(info));
        }
        Self {
            columns,
            component_ids,
            entities: Vec::new(),
        }
    }

    /// Number of rows.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The entities stored here, in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The table's component ids, sorted.
    #[inline]
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.component_ids
    }

    /// Returns `true` if the table has a column for `component_id`.
    #[inline]
    pub fn has_column(&self, component_id: ComponentId) -> bool {
        self.columns.contains(component_id)
    }

    /// The column for `component_id`.
    #[inline]
    pub fn get_column(&self, component_id: ComponentId) -> Option<&Column> {
        self.columns.get(component_id)
    }

    /// Mutable access to the column for `component_id`.
    #[inline]
    pub fn get_column_mut(&mut self, component_id: ComponentId) -> Option<&mut Column> {
        self.columns.get_mut(component_id)
    }

    /// Mutable access to two distinct columns at once, for read/write query
    /// adapters over the same table.
    ///
    /// ## Panics
    /// Panics if `a == b`.
    pub fn get_2_columns_mut(
        &mut self,
        a: ComponentId,
        b: ComponentId,
    ) -> (Option<&mut Column>, Option<&mut Column>) {
        self.columns.get_2_mut(a, b)
    }

    /// Appends an entity row. See the module docs for the column protocol:
    /// the caller must push one value into every column before the
    /// structural operation completes.
    pub fn allocate(&mut self, entity: Entity) -> TableRow {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Moves `row` to `new_table`, which must have every column this table
    /// has.
    pub fn move_to_superset_unchecked(
        &mut self,
        row: TableRow,
        new_table: &mut Table,
    ) -> TableMoveResult {
        debug_assert!(row < self.entity_count());
        let entity = self.entities.swap_remove(row);
        let new_row = new_table.allocate(entity);
        for &component_id in &self.component_ids {
            let (value, ticks) = self
                .columns
                .get_mut(component_id)
                .unwrap_or_else(|| unreachable!("component_ids lists only present columns"))
                .swap_remove_and_forget(row);
            debug_assert!(new_table.has_column(component_id));
            if let Some(column) = new_table.get_column_mut(component_id) {
                column.push(value, ticks);
            }
        }
        TableMoveResult {
            new_row,
            swapped_entity: self.entities.get(row).copied(),
        }
    }

    /// Moves `row` to `new_table`; values for columns the destination lacks
    /// are handed to `forget` with their component id.
    pub fn move_to_and_forget_missing_unchecked(
        &mut self,
        row: TableRow,
        new_table: &mut Table,
        forget: &mut impl FnMut(ComponentId, Box<dyn Any + Send + Sync>),
    ) -> TableMoveResult {
        debug_assert!(row < self.entity_count());
        let entity = self.entities.swap_remove(row);
        let new_row = new_table.allocate(entity);
        for &component_id in &self.component_ids {
            let (value, ticks) = self
                .columns
                .get_mut(component_id)
                .unwrap_or_else(|| unreachable!("component_ids lists only present columns"))
                .swap_remove_and_forget(row);
            match new_table.get_column_mut(component_id) {
                Some(column) => column.push(value, ticks),
                None => forget(component_id, value),
            }
        }
        TableMoveResult {
            new_row,
            swapped_entity: self.entities.get(row).copied(),
        }
    }

    /// Moves `row` to `new_table`; values for columns the destination lacks
    /// run their drop hook.
    pub fn move_to_and_drop_missing_unchecked(
        &mut self,
        row: TableRow,
        new_table: &mut Table,
    ) -> TableMoveResult {
        debug_assert!(row < self.entity_count());
        let entity = self.entities.swap_remove(row);
        let new_row = new_table.allocate(entity);
        for &component_id in &self.component_ids {
            let column = self
                .columns
                .get_mut(component_id)
                .unwrap_or_else(|| unreachable!("component_ids lists only present columns"));
            if new_table.has_column(component_id) {
                let (value, ticks) = column.swap_remove_and_forget(row);
                if let Some(new_column) = new_table.get_column_mut(component_id) {
                    new_column.push(value, ticks);
                }
            } else {
                column.swap_remove(row);
            }
        }
        TableMoveResult {
            new_row,
            swapped_entity: self.entities.get(row).copied(),
        }
    }

    /// Swap-removes `row`, dropping every column value. Returns the entity
    /// swap-moved into the vacated row, if any.
    pub fn swap_remove_unchecked(&mut self, row: TableRow) -> Option<Entity> {
        debug_assert!(row < self.entity_count());
        for &component_id in &self.component_ids {
            self.columns
                .get_mut(component_id)
                .unwrap_or_else(|| unreachable!("component_ids lists only present columns"))
                .swap_remove(row);
        }
        self.entities.swap_remove(row);
        self.entities.get(row).copied()
    }

    /// Rebases ticks in every column.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for &component_id in &self.component_ids {
            if let Some(column) = self.columns.get_mut(component_id) {
                column.check_change_ticks(change_tick, component_id);
            }
        }
    }
}

/// All tables, keyed by [`TableId`], deduplicated by sorted component-id
/// list. Table 0 is the empty table and always exists.
pub struct Tables {
    tables: Vec<Table>,
    table_ids: HashMap<Vec<ComponentId>, TableId>,
}

impl Default for Tables {
    fn default() -> Self {
        let empty = Table {
            columns: SparseArray::new(),
            component_ids: Vec::new(),
            entities: Vec::new(),
        };
        let mut table_ids = HashMap::new();
        table_ids.insert(Vec::new(), 0);
        Self {
            tables: vec![empty],
            table_ids,
        }
    }
}

impl Tables {
    /// Creates the collection with the empty table at id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables.
    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if only the empty table exists. Never true in
    /// practice; present for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// The table with `id`.
    #[inline]
    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id)
    }

    /// Mutable access to the table with `id`.
    #[inline]
    pub fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id)
    }

    /// Mutable access to two distinct tables at once, for cross-table row
    /// moves.
    ///
    /// ## Panics
    /// Panics if `a == b` or either id is out of bounds.
    pub fn get_2_mut(&mut self, a: TableId, b: TableId) -> (&mut Table, &mut Table) {
        assert_ne!(a, b, "get_2_mut requires distinct table ids");
        if a < b {
            let (low, high) = self.tables.split_at_mut(b);
            (&mut low[a], &mut high[0])
        } else {
            let (low, high) = self.tables.split_at_mut(a);
            (&mut high[0], &mut low[b])
        }
    }

    /// The table for an exact sorted component-id list, created on first
    /// use.
    ///
    /// ## Invariants
    /// `component_ids` must be sorted and duplicate-free; callers pass the
    /// archetype's table-component list, which the bundle layer keeps
    /// normalized.
    pub fn get_id_or_insert(
        &mut self,
        component_ids: &[ComponentId],
        components: &Components,
    ) -> TableId {
        debug_assert!(component_ids.windows(2).all(|w| w[0] < w[1]));
        if let Some(&id) = self.table_ids.get(component_ids) {
            return id;
        }
        let id = self.tables.len();
        self.tables
            .push(Table::new(component_ids.to_vec(), components));
        self.table_ids.insert(component_ids.to_vec(), id);
        id
    }

    /// Rebases ticks in every table.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for table in &mut self.tables {
            table.check_change_ticks(change_tick);
        }
    }
}
