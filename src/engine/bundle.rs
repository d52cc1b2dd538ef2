//! Bundles: statically-typed groups of components moved as a unit.
//!
//! A [`Bundle`] is anything that can enumerate its component ids against the
//! registry and then surrender its values one by one. Every [`Component`] is
//! a one-element bundle, and tuples of bundles are bundles, so
//! `world.spawn((Position(..), Velocity(..)))` works without any runtime
//! type dispatch — passing a non-component is a compile error, not a thrown
//! one.
//!
//! ## Structural flow
//!
//! Spawning and inserting both funnel through the same machinery:
//!
//! 1. [`Bundles::init_info`] registers the bundle type once, capturing its
//!    component ids in declaration order (duplicates panic, naming the
//!    component — a bundle with two `Position`s is a programming error).
//! 2. [`add_bundle_to_archetype`] resolves the destination archetype for a
//!    (source archetype, bundle) pair, memoized on the source's edge cache
//!    together with a per-component [`ComponentStatus`].
//! 3. [`BundleInserter`] / [`BundleSpawner`] execute the move: archetype
//!    swap-remove, table row move, sparse-set writes, and the back-patching
//!    of every entity displaced along the way.
//!
//! The inserter distinguishes three cases decided at construction time:
//! same archetype (only overwrites), new archetype sharing the table (only
//! sparse components were added), and new archetype with a new table (the
//! full move).

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::engine::archetype::{AddBundle, Archetypes, ComponentStatus};
use crate::engine::component::{Component, Components, StorageType};
use crate::engine::entity::{Entities, Entity, EntityLocation};
use crate::engine::storage::sparse_set::SparseSets;
use crate::engine::storage::table::{Table, Tables};
use crate::engine::storage::Storages;
use crate::engine::tick::{ComponentTicks, Tick};
use crate::engine::types::{ArchetypeId, BundleId, ComponentId, TableId, TableRow};

/// A statically-known set of components.
///
/// Implemented for every [`Component`] and for tuples of bundles up to
/// arity eight (nest tuples for more).
pub trait Bundle: Send + Sync + 'static {
    /// Feeds this bundle's component ids, in declaration order, to `ids`,
    /// registering them as needed.
    fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId));

    /// Surrenders this bundle's values, in the same order as
    /// [`Bundle::component_ids`].
    fn get_components(self, func: &mut impl FnMut(StorageType, Box<dyn Any + Send + Sync>));

    /// Rebuilds the bundle from type-erased values supplied in the same
    /// order as [`Bundle::component_ids`]. Used by `take`.
    ///
    /// ## Panics
    /// Panics if a supplied value is not the expected component type; the
    /// caller feeds values captured from this very bundle's components, so
    /// a mismatch is a programming error.
    fn from_components(func: &mut impl FnMut() -> Box<dyn Any + Send + Sync>) -> Self;
}

impl<C: Component> Bundle for C {
    fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId)) {
        ids(components.init_component::<C>());
    }

    fn get_components(self, func: &mut impl FnMut(StorageType, Box<dyn Any + Send + Sync>)) {
        func(C::storage_type(), Box::new(self));
    }

    fn from_components(func: &mut impl FnMut() -> Box<dyn Any + Send + Sync>) -> Self {
        *func()
            .downcast::<C>()
            .unwrap_or_else(|_| panic!("captured value is not a {}", std::any::type_name::<C>()))
    }
}

macro_rules! tuple_bundle_impl {
    ($($name:ident),*) => {
        impl<$($name: Bundle),*> Bundle for ($($name,)*) {
            #[allow(unused_variables)]
            fn component_ids(components: &mut Components, ids: &mut impl FnMut(ComponentId)) {
                $(<$name as Bundle>::component_ids(components, ids);)*
            }

            #[allow(unused_variables, non_snake_case)]
            fn get_components(
                self,
                func: &mut impl FnMut(StorageType, Box<dyn Any + Send + Sync>),
            ) {
                let ($($name,)*) = self;
                $($name.get_components(func);)*
            }

            #[allow(unused_variables, clippy::unused_unit)]
            fn from_components(func: &mut impl FnMut() -> Box<dyn Any + Send + Sync>) -> Self {
                ($(<$name as Bundle>::from_components(func),)*)
            }
        }
    };
}

tuple_bundle_impl!();
tuple_bundle_impl!(B0);
tuple_bundle_impl!(B0, B1);
tuple_bundle_impl!(B0, B1, B2);
tuple_bundle_impl!(B0, B1, B2, B3);
tuple_bundle_impl!(B0, B1, B2, B3, B4);
tuple_bundle_impl!(B0, B1, B2, B3, B4, B5);
tuple_bundle_impl!(B0, B1, B2, B3, B4, B5, B6);
tuple_bundle_impl!(B0, B1, B2, B3, B4, B5, B6, B7);

/// Registered metadata for one bundle type.
pub struct BundleInfo {
    id: BundleId,
    component_ids: Vec<ComponentId>,
    storage_types: Vec<StorageType>,
}

impl BundleInfo {
    /// Validates and records a bundle's component list.
    ///
    /// ## Panics
    /// Panics if the bundle names the same component twice, identifying the
    /// duplicated component by name.
    fn new(
        bundle_name: &'static str,
        components: &Components,
        component_ids: Vec<ComponentId>,
        id: BundleId,
    ) -> Self {
        let mut seen = component_ids.clone();
        seen.sort_unstable();
        if let Some(&dup) = seen.windows(2).find(|w| w[0] == w[1]).map(|w| &w[0]) {
            panic!(
                "bundle {bundle_name} contains component {} more than once",
                components.get_name(dup)
            );
        }
        let storage_types = component_ids
            .iter()
            .map(|&component_id| {
                components
                    .get_info(component_id)
                    .unwrap_or_else(|| {
                        panic!("bundle {bundle_name} references unregistered component id {component_id}")
                    })
                    .storage_type()
            })
            .collect();
        Self {
            id,
            component_ids,
            storage_types,
        }
    }

    /// The bundle's id.
    #[inline]
    pub fn id(&self) -> BundleId {
        self.id
    }

    /// Component ids in declaration order.
    #[inline]
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.component_ids
    }

    /// Storage types parallel to [`BundleInfo::component_ids`].
    #[inline]
    pub fn storage_types(&self) -> &[StorageType] {
        &self.storage_types
    }
}

/// Bundle registry, keyed by `TypeId`.
#[derive(Default)]
pub struct Bundles {
    bundle_infos: Vec<BundleInfo>,
    bundle_ids: HashMap<TypeId, BundleId>,
}

impl Bundles {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `B` (and its components) once, returning its metadata.
    pub fn init_info<B: Bundle>(&mut self, components: &mut Components) -> &BundleInfo {
        let type_id = TypeId::of::<B>();
        let id = match self.bundle_ids.get(&type_id) {
            Some(&id) => id,
            None => {
                let mut component_ids = Vec::new();
                B::component_ids(components, &mut |component_id| {
                    component_ids.push(component_id);
                });
                let id = self.bundle_infos.len();
                self.bundle_infos.push(BundleInfo::new(
                    std::any::type_name::<B>(),
                    components,
                    component_ids,
                    id,
                ));
                self.bundle_ids.insert(type_id, id);
                id
            }
        };
        &self.bundle_infos[id]
    }

    /// Metadata for a registered bundle id.
    #[inline]
    pub fn get(&self, id: BundleId) -> Option<&BundleInfo> {
        self.bundle_infos.get(id)
    }
}

/// Resolves where adding `bundle_info` to `archetype_id` leads, memoized on
/// the source archetype's edge cache.
pub(crate) fn add_bundle_to_archetype(
    archetypes: &mut Archetypes,
    tables: &mut Tables,
    components: &Components,
    archetype_id: ArchetypeId,
    bundle_info: &BundleInfo,
) -> ArchetypeId {
    let archetype = archetypes
        .get(archetype_id)
        .unwrap_or_else(|| panic!("unknown source archetype {archetype_id}"));
    if let Some(edge) = archetype.edges().get_add_bundle(bundle_info.id()) {
        return edge.archetype_id;
    }

    let mut bundle_status = Vec::with_capacity(bundle_info.component_ids().len());
    let mut added_table = Vec::new();
    let mut added_sparse = Vec::new();
    for (&component_id, &storage_type) in bundle_info
        .component_ids()
        .iter()
        .zip(bundle_info.storage_types())
    {
        if archetype.contains(component_id) {
            bundle_status.push(ComponentStatus::Mutated);
        } else {
            bundle_status.push(ComponentStatus::Added);
            match storage_type {
                StorageType::Table => added_table.push(component_id),
                StorageType::SparseSet => added_sparse.push(component_id),
            }
        }
    }

    let new_archetype_id = if added_table.is_empty() && added_sparse.is_empty() {
        archetype_id
    } else {
        let mut table_components = archetype.table_components().to_vec();
        table_components.extend(added_table.iter().copied());
        table_components.sort_unstable();
        let mut sparse_components = archetype.sparse_components().to_vec();
        sparse_components.extend(added_sparse.iter().copied());
        sparse_components.sort_unstable();

        let table_id = if added_table.is_empty() {
            archetype.table_id()
        } else {
            tables.get_id_or_insert(&table_components, components)
        };
        archetypes.get_id_or_insert(table_id, table_components, sparse_components)
    };

    archetypes
        .get_mut(archetype_id)
        .unwrap_or_else(|| panic!("unknown source archetype {archetype_id}"))
        .edges_mut()
        .insert_add_bundle(
            bundle_info.id(),
            AddBundle {
                archetype_id: new_archetype_id,
                bundle_status,
            },
        );
    new_archetype_id
}

/// Resolves where removing `bundle_info` from `archetype_id` leads.
///
/// With `intersection` set, components the archetype lacks are skipped
/// (`remove` semantics); without it, any missing component makes the whole
/// transition impossible and `None` is returned (`take` semantics). Both
/// outcomes are memoized, including the miss.
pub(crate) fn remove_bundle_from_archetype(
    archetypes: &mut Archetypes,
    tables: &mut Tables,
    components: &Components,
    archetype_id: ArchetypeId,
    bundle_info: &BundleInfo,
    intersection: bool,
) -> Option<ArchetypeId> {
    let archetype = archetypes
        .get(archetype_id)
        .unwrap_or_else(|| panic!("unknown source archetype {archetype_id}"));
    let cached = if intersection {
        archetype.edges().get_remove_bundle(bundle_info.id())
    } else {
        archetype.edges().get_take_bundle(bundle_info.id())
    };
    if let Some(result) = cached {
        return result;
    }

    let result = if !intersection
        && bundle_info
            .component_ids()
            .iter()
            .any(|&id| !archetype.contains(id))
    {
        None
    } else {
        let mut table_components = archetype.table_components().to_vec();
        let mut sparse_components = archetype.sparse_components().to_vec();
        table_components.retain(|id| !bundle_info.component_ids().contains(id));
        sparse_components.retain(|id| !bundle_info.component_ids().contains(id));

        let table_id = if table_components.len() == archetype.table_components().len() {
            archetype.table_id()
        } else {
            tables.get_id_or_insert(&table_components, components)
        };
        Some(archetypes.get_id_or_insert(table_id, table_components, sparse_components))
    };

    let edges = archetypes
        .get_mut(archetype_id)
        .unwrap_or_else(|| panic!("unknown source archetype {archetype_id}"))
        .edges_mut();
    if intersection {
        edges.insert_remove_bundle(bundle_info.id(), result);
    } else {
        edges.insert_take_bundle(bundle_info.id(), result);
    }
    result
}

/// Writes a bundle's values into their destination storage.
///
/// `values` parallels the bundle's declaration order. Added table components
/// push onto their column (completing the row the caller allocated);
/// mutated ones overwrite in place, dropping the displaced value.
#[allow(clippy::too_many_arguments)]
fn write_bundle_components(
    bundle_info: &BundleInfo,
    statuses: &[ComponentStatus],
    values: Vec<Box<dyn Any + Send + Sync>>,
    components: &Components,
    table: &mut Table,
    table_row: TableRow,
    sparse_sets: &mut SparseSets,
    entity: Entity,
    change_tick: Tick,
) {
    debug_assert_eq!(values.len(), bundle_info.component_ids().len());
    for (((&component_id, &storage_type), &status), value) in bundle_info
        .component_ids()
        .iter()
        .zip(bundle_info.storage_types())
        .zip(statuses)
        .zip(values)
    {
        match storage_type {
            StorageType::Table => {
                let column = table
                    .get_column_mut(component_id)
                    .unwrap_or_else(|| panic!("destination table lacks column {component_id}"));
                match status {
                    ComponentStatus::Added => {
                        column.push(value, ComponentTicks::new(change_tick));
                    }
                    ComponentStatus::Mutated => {
                        column.replace(table_row, value, change_tick);
                    }
                }
            }
            StorageType::SparseSet => {
                let info = components
                    .get_info(component_id)
                    .unwrap_or_else(|| panic!("unregistered component id {component_id}"));
                sparse_sets.get_or_insert(info).insert(entity, value, change_tick);
            }
        }
    }
}

/// Re-points a displaced entity's archetype row after a swap-remove.
pub(crate) fn patch_archetype_swap(entities: &mut Entities, swapped: Entity, archetype_row: usize) {
    let location = entities
        .get(swapped)
        .unwrap_or_else(|| panic!("swapped entity {swapped:?} has no location"));
    entities.set(
        swapped.index(),
        EntityLocation {
            archetype_row,
            ..location
        },
    );
}

/// Re-points a displaced entity after a table-side swap move: both its
/// stored location and its archetype's entity entry.
pub(crate) fn patch_table_swap(
    entities: &mut Entities,
    archetypes: &mut Archetypes,
    swapped: Entity,
    table_row: TableRow,
) {
    let location = entities
        .get(swapped)
        .unwrap_or_else(|| panic!("swapped entity {swapped:?} has no location"));
    entities.set(
        swapped.index(),
        EntityLocation {
            table_row,
            ..location
        },
    );
    archetypes
        .get_mut(location.archetype_id)
        .unwrap_or_else(|| panic!("unknown archetype {}", location.archetype_id))
        .set_entity_table_row(location.archetype_row, table_row);
}

/// Executes bundle insertion into an existing entity.
///
/// Construction resolves the destination once; [`BundleInserter::insert`]
/// can then be applied to any entity currently in the source archetype.
pub(crate) struct BundleInserter {
    archetype_id: ArchetypeId,
    new_archetype_id: ArchetypeId,
    table_id: TableId,
    new_table_id: TableId,
    bundle_status: Vec<ComponentStatus>,
}

impl BundleInserter {
    /// Resolves the transition for inserting `bundle_info` into entities of
    /// `archetype_id`.
    pub fn new(
        archetypes: &mut Archetypes,
        tables: &mut Tables,
        components: &Components,
        archetype_id: ArchetypeId,
        bundle_info: &BundleInfo,
    ) -> Self {
        let new_archetype_id =
            add_bundle_to_archetype(archetypes, tables, components, archetype_id, bundle_info);
        let bundle_status = archetypes
            .get(archetype_id)
            .and_then(|a| a.edges().get_add_bundle(bundle_info.id()))
            .map(|edge| edge.bundle_status.clone())
            .unwrap_or_else(|| panic!("add edge missing after resolution"));
        let table_id = archetypes
            .get(archetype_id)
            .map(|a| a.table_id())
            .unwrap_or_else(|| panic!("unknown archetype {archetype_id}"));
        let new_table_id = archetypes
            .get(new_archetype_id)
            .map(|a| a.table_id())
            .unwrap_or_else(|| panic!("unknown archetype {new_archetype_id}"));
        Self {
            archetype_id,
            new_archetype_id,
            table_id,
            new_table_id,
            bundle_status,
        }
    }

    /// Moves `entity` to the destination archetype and writes the bundle's
    /// values. Returns the entity's new location (also stored in the
    /// allocator).
    ///
    /// ## Invariants
    /// `location` must be the entity's current location, and the entity must
    /// be in the archetype this inserter was built for.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &self,
        entities: &mut Entities,
        archetypes: &mut Archetypes,
        storages: &mut Storages,
        components: &Components,
        bundle_info: &BundleInfo,
        entity: Entity,
        location: EntityLocation,
        values: Vec<Box<dyn Any + Send + Sync>>,
        change_tick: Tick,
    ) -> EntityLocation {
        debug_assert_eq!(location.archetype_id, self.archetype_id);

        if self.new_archetype_id == self.archetype_id {
            // Case 1: every component already present; overwrite in place.
            let table = storages
                .tables
                .get_mut(self.table_id)
                .unwrap_or_else(|| panic!("unknown table {}", self.table_id));
            write_bundle_components(
                bundle_info,
                &self.bundle_status,
                values,
                components,
                table,
                location.table_row,
                &mut storages.sparse_sets,
                entity,
                change_tick,
            );
            return location;
        }

        let remove_result = archetypes
            .get_mut(self.archetype_id)
            .unwrap_or_else(|| panic!("unknown archetype {}", self.archetype_id))
            .swap_remove(location.archetype_row);
        if let Some(swapped) = remove_result.swapped_entity {
            patch_archetype_swap(entities, swapped, location.archetype_row);
        }

        let new_location = if self.new_table_id == self.table_id {
            // Case 2: only sparse components added; the table row stays put.
            let archetype_row = archetypes
                .get_mut(self.new_archetype_id)
                .unwrap_or_else(|| panic!("unknown archetype {}", self.new_archetype_id))
                .allocate(entity, remove_result.table_row);
            let new_location = EntityLocation {
                archetype_id: self.new_archetype_id,
                archetype_row,
                table_id: self.table_id,
                table_row: remove_result.table_row,
            };
            entities.set(entity.index(), new_location);

            let table = storages
                .tables
                .get_mut(self.table_id)
                .unwrap_or_else(|| panic!("unknown table {}", self.table_id));
            write_bundle_components(
                bundle_info,
                &self.bundle_status,
                values,
                components,
                table,
                new_location.table_row,
                &mut storages.sparse_sets,
                entity,
                change_tick,
            );
            new_location
        } else {
            // Case 3: full move to a wider table.
            let (old_table, new_table) =
                storages.tables.get_2_mut(self.table_id, self.new_table_id);
            let move_result =
                old_table.move_to_superset_unchecked(remove_result.table_row, new_table);
            if let Some(swapped) = move_result.swapped_entity {
                patch_table_swap(entities, archetypes, swapped, remove_result.table_row);
            }

            let archetype_row = archetypes
                .get_mut(self.new_archetype_id)
                .unwrap_or_else(|| panic!("unknown archetype {}", self.new_archetype_id))
                .allocate(entity, move_result.new_row);
            let new_location = EntityLocation {
                archetype_id: self.new_archetype_id,
                archetype_row,
                table_id: self.new_table_id,
                table_row: move_result.new_row,
            };
            entities.set(entity.index(), new_location);

            let new_table = storages
                .tables
                .get_mut(self.new_table_id)
                .unwrap_or_else(|| panic!("unknown table {}", self.new_table_id));
            write_bundle_components(
                bundle_info,
                &self.bundle_status,
                values,
                components,
                new_table,
                new_location.table_row,
                &mut storages.sparse_sets,
                entity,
                change_tick,
            );
            new_location
        };
        new_location
    }
}

/// Executes bundle spawning from the empty archetype.
pub(crate) struct BundleSpawner {
    archetype_id: ArchetypeId,
    table_id: TableId,
    bundle_status: Vec<ComponentStatus>,
}

impl BundleSpawner {
    /// Resolves the destination archetype for spawning `bundle_info`.
    pub fn new(
        archetypes: &mut Archetypes,
        tables: &mut Tables,
        components: &Components,
        bundle_info: &BundleInfo,
    ) -> Self {
        let archetype_id = add_bundle_to_archetype(
            archetypes,
            tables,
            components,
            crate::engine::types::EMPTY_ARCHETYPE,
            bundle_info,
        );
        // Out of the empty archetype every component is an addition.
        let bundle_status = vec![ComponentStatus::Added; bundle_info.component_ids().len()];
        let table_id = archetypes
            .get(archetype_id)
            .map(|a| a.table_id())
            .unwrap_or_else(|| panic!("unknown archetype {archetype_id}"));
        Self {
            archetype_id,
            table_id,
            bundle_status,
        }
    }

    /// Places a freshly allocated entity and the bundle's values.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        &self,
        entities: &mut Entities,
        archetypes: &mut Archetypes,
        storages: &mut Storages,
        components: &Components,
        bundle_info: &BundleInfo,
        entity: Entity,
        values: Vec<Box<dyn Any + Send + Sync>>,
        change_tick: Tick,
    ) -> EntityLocation {
        let table = storages
            .tables
            .get_mut(self.table_id)
            .unwrap_or_else(|| panic!("unknown table {}", self.table_id));
        let table_row = table.allocate(entity);
        let archetype_row = archetypes
            .get_mut(self.archetype_id)
            .unwrap_or_else(|| panic!("unknown archetype {}", self.archetype_id))
            .allocate(entity, table_row);
        let location = EntityLocation {
            archetype_id: self.archetype_id,
            archetype_row,
            table_id: self.table_id,
            table_row,
        };
        entities.set(entity.index(), location);

        write_bundle_components(
            bundle_info,
            &self.bundle_status,
            values,
            components,
            table,
            table_row,
            &mut storages.sparse_sets,
            entity,
            change_tick,
        );
        location
    }
}
