//! The archetype graph.
//!
//! An archetype is one node per unique component set: the exact pair of
//! (sorted table-component ids, sorted sparse-component ids). Identity is
//! **value-based** — two requests for the same pair always resolve to the
//! same [`ArchetypeId`], regardless of which bundle or code path asked.
//! Archetypes are append-only and never destroyed, so ids stay valid for the
//! life of the world.
//!
//! Each archetype owns its entity list (with per-entity table rows) and an
//! [`Edges`] cache memoizing, per [`BundleId`], where adding, removing, or
//! taking that bundle leads. The cache turns the second and subsequent
//! structural operations of a given shape into a couple of array lookups.
//!
//! ## Swap-remove contract
//!
//! [`Archetype::swap_remove`] compacts the entity list by swapping the last
//! entry into the vacated row. The caller MUST re-point the swapped entity's
//! `archetype_row` in the entity allocator; forgetting that back-patch is
//! the classic way to corrupt the location index.

use std::collections::HashMap;

use crate::engine::component::StorageType;
use crate::engine::entity::Entity;
use crate::engine::storage::sparse_set::SparseArray;
use crate::engine::types::{ArchetypeId, ArchetypeRow, BundleId, ComponentId, TableId, TableRow};

/// How a bundle component lands in its destination archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentStatus {
    /// The component is new to the entity; both ticks are stamped.
    Added,
    /// The entity already had the component; the old value is dropped and
    /// only the changed tick is stamped.
    Mutated,
}

/// Cached result of adding one bundle to one archetype.
#[derive(Clone, Debug)]
pub struct AddBundle {
    /// Destination archetype (may equal the source).
    pub archetype_id: ArchetypeId,
    /// Per bundle component, in the bundle's declaration order.
    pub bundle_status: Vec<ComponentStatus>,
}

/// Per-archetype cache of bundle transition results, keyed by [`BundleId`].
///
/// Remove and take edges store `None` when the transition is impossible
/// (take requires every bundle component to be present); caching the miss
/// avoids recomputing it.
#[derive(Default)]
pub struct Edges {
    add_bundle: SparseArray<AddBundle>,
    remove_bundle: SparseArray<Option<ArchetypeId>>,
    take_bundle: SparseArray<Option<ArchetypeId>>,
}

impl Edges {
    /// Cached add transition for `bundle_id`.
    #[inline]
    pub fn get_add_bundle(&self, bundle_id: BundleId) -> Option<&AddBundle> {
        self.add_bundle.get(bundle_id)
    }

    /// Caches an add transition.
    #[inline]
    pub fn insert_add_bundle(&mut self, bundle_id: BundleId, edge: AddBundle) {
        self.add_bundle.insert(bundle_id, edge);
    }

    /// Cached remove transition for `bundle_id` (outer `None`: not cached).
    #[inline]
    pub fn get_remove_bundle(&self, bundle_id: BundleId) -> Option<Option<ArchetypeId>> {
        self.remove_bundle.get(bundle_id).copied()
    }

    /// Caches a remove transition.
    #[inline]
    pub fn insert_remove_bundle(&mut self, bundle_id: BundleId, archetype: Option<ArchetypeId>) {
        self.remove_bundle.insert(bundle_id, archetype);
    }

    /// Cached take transition for `bundle_id` (outer `None`: not cached).
    #[inline]
    pub fn get_take_bundle(&self, bundle_id: BundleId) -> Option<Option<ArchetypeId>> {
        self.take_bundle.get(bundle_id).copied()
    }

    /// Caches a take transition.
    #[inline]
    pub fn insert_take_bundle(&mut self, bundle_id: BundleId, archetype: Option<ArchetypeId>) {
        self.take_bundle.insert(bundle_id, archetype);
    }
}

/// One entry in an archetype's entity list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchetypeEntity {
    /// The entity.
    pub entity: Entity,
    /// The entity's row in the archetype's table.
    pub table_row: TableRow,
}

/// Outcome of [`Archetype::swap_remove`].
#[derive(Debug, PartialEq, Eq)]
pub struct ArchetypeSwapRemoveResult {
    /// The entity swapped into the vacated row, whose `archetype_row` the
    /// caller must re-point.
    pub swapped_entity: Option<Entity>,
    /// The removed entry's table row, for the caller's table-side cleanup.
    pub table_row: TableRow,
}

/// One node of the archetype graph.
pub struct Archetype {
    id: ArchetypeId,
    table_id: TableId,
    table_components: Vec<ComponentId>,
    sparse_components: Vec<ComponentId>,
    components: SparseArray<StorageType>,
    entities: Vec<ArchetypeEntity>,
    edges: Edges,
}

impl Archetype {
    fn new(
        id: ArchetypeId,
        table_id: TableId,
        table_components: Vec<ComponentId>,
        sparse_components: Vec<ComponentId>,
    ) -> Self {
        let mut components = SparseArray::new();
        for &component_id in &table_components {
            components.insert(component_id, StorageType::Table);
        }
        for &component_id in &sparse_components {
            components.insert(component_id, StorageType::SparseSet);
        }
        Self {
            id,
            table_id,
            table_components,
            sparse_components,
            components,
            entities: Vec::new(),
            edges: Edges::default(),
        }
    }

    /// This archetype's id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The backing table's id.
    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Sorted table-backed component ids.
    #[inline]
    pub fn table_components(&self) -> &[ComponentId] {
        &self.table_components
    }

    /// Sorted sparse-backed component ids.
    #[inline]
    pub fn sparse_components(&self) -> &[ComponentId] {
        &self.sparse_components
    }

    /// Iterates all component ids, table-backed first.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.table_components
            .iter()
            .chain(self.sparse_components.iter())
            .copied()
    }

    /// Returns `true` if this archetype has `component_id`.
    #[inline]
    pub fn contains(&self, component_id: ComponentId) -> bool {
        self.components.contains(component_id)
    }

    /// The storage class of `component_id` here, if present.
    #[inline]
    pub fn get_storage_type(&self, component_id: ComponentId) -> Option<StorageType> {
        self.components.get(component_id).copied()
    }

    /// The entity list, in row order.
    #[inline]
    pub fn entities(&self) -> &[ArchetypeEntity] {
        &self.entities
    }

    /// Number of entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity lives here.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The transition cache.
    #[inline]
    pub fn edges(&self) -> &Edges {
        &self.edges
    }

    /// Mutable access to the transition cache.
    #[inline]
    pub fn edges_mut(&mut self) -> &mut Edges {
        &mut self.edges
    }

    /// Appends an entity row pointing at `table_row`.
    pub fn allocate(&mut self, entity: Entity, table_row: TableRow) -> ArchetypeRow {
        let row = self.entities.len();
        self.entities.push(ArchetypeEntity { entity, table_row });
        row
    }

    /// The table row of the entity at `row`.
    ///
    /// ## Panics
    /// Panics if `row` is out of bounds; callers pass rows read from the
    /// entity allocator, which the location invariant keeps valid.
    #[inline]
    pub fn entity_table_row(&self, row: ArchetypeRow) -> TableRow {
        self.entities[row].table_row
    }

    /// Re-points the table row of the entity at `row`, the back-patch hook
    /// for table-side swap moves.
    #[inline]
    pub fn set_entity_table_row(&mut self, row: ArchetypeRow, table_row: TableRow) {
        self.entities[row].table_row = table_row;
    }

    /// Swap-removes the entity at `row`.
    ///
    /// ## Invariants
    /// The caller must re-point the swapped entity's `archetype_row` in the
    /// entity allocator (see the module docs).
    pub fn swap_remove(&mut self, row: ArchetypeRow) -> ArchetypeSwapRemoveResult {
        let removed = self.entities.swap_remove(row);
        ArchetypeSwapRemoveResult {
            swapped_entity: self.entities.get(row).map(|e| e.entity),
            table_row: removed.table_row,
        }
    }
}

/// Composite key identifying an archetype by value.
type ArchetypeKey = (Vec<ComponentId>, Vec<ComponentId>);

/// The archetype arena. Archetype 0 is the empty archetype over table 0.
pub struct Archetypes {
    archetypes: Vec<Archetype>,
    archetype_ids: HashMap<ArchetypeKey, ArchetypeId>,
}

impl Default for Archetypes {
    fn default() -> Self {
        let mut archetypes = Archetypes {
            archetypes: Vec::new(),
            archetype_ids: HashMap::new(),
        };
        // The empty archetype always exists so spawns have a source node.
        archetypes.get_id_or_insert(0, Vec::new(), Vec::new());
        archetypes
    }
}

impl Archetypes {
    /// Creates the arena with the empty archetype at id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archetypes.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Returns `true` if the arena is empty. Never true in practice;
    /// present for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// The archetype with `id`.
    #[inline]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    /// Mutable access to the archetype with `id`.
    #[inline]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id)
    }

    /// Mutable access to two distinct archetypes at once, for transitions
    /// that patch both the source and the destination.
    ///
    /// ## Panics
    /// Panics if `a == b` or either id is out of bounds.
    pub fn get_2_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "get_2_mut requires distinct archetype ids");
        if a < b {
            let (low, high) = self.archetypes.split_at_mut(b);
            (&mut low[a], &mut high[0])
        } else {
            let (low, high) = self.archetypes.split_at_mut(a);
            (&mut high[0], &mut low[b])
        }
    }

    /// Iterates all archetypes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// The archetype for the exact component-set pair, created on first use.
    ///
    /// ## Invariants
    /// Both lists must be sorted and duplicate-free; the bundle layer keeps
    /// them normalized. `table_id` must be the table for exactly
    /// `table_components`.
    pub fn get_id_or_insert(
        &mut self,
        table_id: TableId,
        table_components: Vec<ComponentId>,
        sparse_components: Vec<ComponentId>,
    ) -> ArchetypeId {
        debug_assert!(table_components.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(sparse_components.windows(2).all(|w| w[0] < w[1]));
        let key = (table_components, sparse_components);
        if let Some(&id) = self.archetype_ids.get(&key) {
            return id;
        }
        let id = self.archetypes.len();
        let (table_components, sparse_components) = key.clone();
        self.archetypes.push(Archetype::new(
            id,
            table_id,
            table_components,
            sparse_components,
        ));
        self.archetype_ids.insert(key, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::EMPTY_ARCHETYPE;

    #[test]
    fn identity_is_value_based() {
        let mut archetypes = Archetypes::new();
        let a = archetypes.get_id_or_insert(1, vec![0, 1], vec![3]);
        let b = archetypes.get_id_or_insert(1, vec![0, 1], vec![3]);
        let c = archetypes.get_id_or_insert(1, vec![0, 1], vec![]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, EMPTY_ARCHETYPE);
    }

    #[test]
    fn swap_remove_reports_swapped_entity_and_table_row() {
        let mut archetypes = Archetypes::new();
        let id = archetypes.get_id_or_insert(1, vec![0], vec![]);
        let archetype = archetypes.get_mut(id).unwrap();

        let e0 = Entity::from_raw(0);
        let e1 = Entity::from_raw(1);
        let e2 = Entity::from_raw(2);
        archetype.allocate(e0, 10);
        archetype.allocate(e1, 11);
        archetype.allocate(e2, 12);

        let result = archetype.swap_remove(0);
        assert_eq!(result.swapped_entity, Some(e2));
        assert_eq!(result.table_row, 10);
        assert_eq!(archetype.entities()[0].entity, e2);
        assert_eq!(archetype.entity_table_row(0), 12);

        // Removing the last row swaps nothing.
        let result = archetype.swap_remove(1);
        assert_eq!(result.swapped_entity, None);
    }
}
