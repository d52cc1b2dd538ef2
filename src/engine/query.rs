//! Typed iteration over matching entities.
//!
//! [`QueryBuilder`] is handed out by [`World::query`], accumulates
//! `with`/`without` filters, and is **consumed** by one of the `for_each`
//! adapters or [`QueryBuilder::matched_entities`]. Matching happens at
//! archetype granularity: an archetype either matches the filters (and
//! carries the queried components) or is skipped wholesale, so per-entity
//! work is just row lookups and downcasts.
//!
//! Write adapters stamp the changed tick of every value they hand out,
//! whether or not the closure actually mutated it; change detection is
//! per-access, not per-diff.

use crate::engine::archetype::Archetype;
use crate::engine::component::{Component, StorageType};
use crate::engine::entity::Entity;
use crate::engine::types::ComponentId;
use crate::engine::world::World;

fn archetype_matches(
    archetype: &Archetype,
    required: &[ComponentId],
    without: &[ComponentId],
) -> bool {
    required.iter().all(|&id| archetype.contains(id))
        && !without.iter().any(|&id| archetype.contains(id))
}

/// A filtered view over the world's entities. See the module docs.
pub struct QueryBuilder<'w> {
    world: &'w mut World,
    with: Vec<ComponentId>,
    without: Vec<ComponentId>,
}

impl<'w> QueryBuilder<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self {
            world,
            with: Vec::new(),
            without: Vec::new(),
        }
    }

    /// Restricts matches to entities that have `T` (without fetching it).
    pub fn with<T: Component>(mut self) -> Self {
        let id = self.world.components_mut().init_component::<T>();
        self.with.push(id);
        self
    }

    /// Restricts matches to entities that lack `T`.
    pub fn without<T: Component>(mut self) -> Self {
        let id = self.world.components_mut().init_component::<T>();
        self.without.push(id);
        self
    }

    /// Collects every matching entity.
    pub fn matched_entities(self) -> Vec<Entity> {
        let mut out = Vec::new();
        for archetype in self.world.archetypes().iter() {
            if archetype_matches(archetype, &self.with, &self.without) {
                out.extend(archetype.entities().iter().map(|e| e.entity));
            }
        }
        out
    }

    /// Calls `f` with a shared reference to each matching entity's `T`.
    pub fn for_each_read<T: Component>(self, mut f: impl FnMut(Entity, &T)) {
        let Some(id) = self.world.components().get_id::<T>() else {
            return;
        };
        let mut required = self.with.clone();
        required.push(id);
        let world = &*self.world;
        for archetype in world.archetypes().iter() {
            if !archetype_matches(archetype, &required, &self.without) {
                continue;
            }
            match storage_of(archetype, id) {
                StorageType::Table => {
                    let column = world
                        .storages()
                        .tables
                        .get(archetype.table_id())
                        .and_then(|t| t.get_column(id))
                        .unwrap_or_else(|| unreachable!("matching archetype backs column"));
                    for entry in archetype.entities() {
                        let value = column
                            .get(entry.table_row)
                            .and_then(|v| v.downcast_ref::<T>())
                            .unwrap_or_else(|| unreachable!("row holds the column's type"));
                        f(entry.entity, value);
                    }
                }
                StorageType::SparseSet => {
                    let Some(set) = world.storages().sparse_sets.get(id) else {
                        continue;
                    };
                    for entry in archetype.entities() {
                        let value = set
                            .get(entry.entity)
                            .and_then(|v| v.downcast_ref::<T>())
                            .unwrap_or_else(|| unreachable!("member entity has the component"));
                        f(entry.entity, value);
                    }
                }
            }
        }
    }

    /// Calls `f` with shared references to each matching entity's `A` and
    /// `B`.
    pub fn for_each_read2<A: Component, B: Component>(self, mut f: impl FnMut(Entity, &A, &B)) {
        let (Some(a_id), Some(b_id)) = (
            self.world.components().get_id::<A>(),
            self.world.components().get_id::<B>(),
        ) else {
            return;
        };
        let mut required = self.with.clone();
        required.extend([a_id, b_id]);
        let world = &*self.world;
        for archetype in world.archetypes().iter() {
            if !archetype_matches(archetype, &required, &self.without) {
                continue;
            }
            for entry in archetype.entities() {
                let a = fetch_ref::<A>(world, archetype, a_id, entry.entity, entry.table_row);
                let b = fetch_ref::<B>(world, archetype, b_id, entry.entity, entry.table_row);
                f(entry.entity, a, b);
            }
        }
    }

    /// Calls `f` with a shared `A` and a flag for whether the entity also
    /// has `H`.
    pub fn for_each_read_has<A: Component, H: Component>(
        self,
        mut f: impl FnMut(Entity, &A, bool),
    ) {
        let Some(a_id) = self.world.components().get_id::<A>() else {
            return;
        };
        let h_id = self.world.components().get_id::<H>();
        let mut required = self.with.clone();
        required.push(a_id);
        let world = &*self.world;
        for archetype in world.archetypes().iter() {
            if !archetype_matches(archetype, &required, &self.without) {
                continue;
            }
            let has = h_id.is_some_and(|h| archetype.contains(h));
            for entry in archetype.entities() {
                let a = fetch_ref::<A>(world, archetype, a_id, entry.entity, entry.table_row);
                f(entry.entity, a, has);
            }
        }
    }

    /// Calls `f` with a mutable reference to each matching entity's `T`,
    /// stamping changed ticks.
    pub fn for_each_write<T: Component>(self, mut f: impl FnMut(Entity, &mut T)) {
        let Some(id) = self.world.components().get_id::<T>() else {
            return;
        };
        let mut required = self.with.clone();
        required.push(id);
        let change_tick = self.world.change_tick();
        let (archetypes, storages) = self.world.archetypes_and_storages_mut();
        for archetype in archetypes.iter() {
            if !archetype_matches(archetype, &required, &self.without) {
                continue;
            }
            match storage_of(archetype, id) {
                StorageType::Table => {
                    let column = storages
                        .tables
                        .get_mut(archetype.table_id())
                        .and_then(|t| t.get_column_mut(id))
                        .unwrap_or_else(|| unreachable!("matching archetype backs column"));
                    for entry in archetype.entities() {
                        let value = column
                            .get_mut(entry.table_row, change_tick)
                            .and_then(|v| v.downcast_mut::<T>())
                            .unwrap_or_else(|| unreachable!("row holds the column's type"));
                        f(entry.entity, value);
                    }
                }
                StorageType::SparseSet => {
                    let Some(set) = storages.sparse_sets.get_mut(id) else {
                        continue;
                    };
                    for entry in archetype.entities() {
                        let value = set
                            .get_mut(entry.entity, change_tick)
                            .and_then(|v| v.downcast_mut::<T>())
                            .unwrap_or_else(|| unreachable!("member entity has the component"));
                        f(entry.entity, value);
                    }
                }
            }
        }
    }

    /// Calls `f` with a shared `R` and a mutable `W` per matching entity,
    /// stamping `W`'s changed ticks.
    ///
    /// ## Panics
    /// Panics if `R` and `W` are the same component.
    pub fn for_each_read_write<R: Component, W: Component>(
        self,
        mut f: impl FnMut(Entity, &R, &mut W),
    ) {
        let (Some(r_id), Some(w_id)) = (
            self.world.components().get_id::<R>(),
            self.world.components().get_id::<W>(),
        ) else {
            return;
        };
        assert_ne!(r_id, w_id, "query reads and writes the same component");
        let mut required = self.with.clone();
        required.extend([r_id, w_id]);
        let change_tick = self.world.change_tick();
        let (archetypes, storages) = self.world.archetypes_and_storages_mut();
        for archetype in archetypes.iter() {
            if !archetype_matches(archetype, &required, &self.without) {
                continue;
            }
            let r_storage = storage_of(archetype, r_id);
            let w_storage = storage_of(archetype, w_id);
            match (r_storage, w_storage) {
                (StorageType::Table, StorageType::Table) => {
                    let table = storages
                        .tables
                        .get_mut(archetype.table_id())
                        .unwrap_or_else(|| unreachable!("archetype has a table"));
                    let (r_column, w_column) = table.get_2_columns_mut(r_id, w_id);
                    let r_column =
                        r_column.unwrap_or_else(|| unreachable!("matching archetype backs column"));
                    let w_column =
                        w_column.unwrap_or_else(|| unreachable!("matching archetype backs column"));
                    for entry in archetype.entities() {
                        let r = r_column
                            .get(entry.table_row)
                            .and_then(|v| v.downcast_ref::<R>())
                            .unwrap_or_else(|| unreachable!("row holds the column's type"));
                        let w = w_column
                            .get_mut(entry.table_row, change_tick)
                            .and_then(|v| v.downcast_mut::<W>())
                            .unwrap_or_else(|| unreachable!("row holds the column's type"));
                        f(entry.entity, r, w);
                    }
                }
                (StorageType::Table, StorageType::SparseSet) => {
                    let r_column = storages
                        .tables
                        .get(archetype.table_id())
                        .and_then(|t| t.get_column(r_id))
                        .unwrap_or_else(|| unreachable!("matching archetype backs column"));
                    let w_set = storages
                        .sparse_sets
                        .get_mut(w_id)
                        .unwrap_or_else(|| unreachable!("matching archetype backs sparse set"));
                    for entry in archetype.entities() {
                        let r = r_column
                            .get(entry.table_row)
                            .and_then(|v| v.downcast_ref::<R>())
                            .unwrap_or_else(|| unreachable!("row holds the column's type"));
                        let w = w_set
                            .get_mut(entry.entity, change_tick)
                            .and_then(|v| v.downcast_mut::<W>())
                            .unwrap_or_else(|| unreachable!("member entity has the component"));
                        f(entry.entity, r, w);
                    }
                }
                (StorageType::SparseSet, StorageType::Table) => {
                    let r_set = storages
                        .sparse_sets
                        .get(r_id)
                        .unwrap_or_else(|| unreachable!("matching archetype backs sparse set"));
                    let w_column = storages
                        .tables
                        .get_mut(archetype.table_id())
                        .and_then(|t| t.get_column_mut(w_id))
                        .unwrap_or_else(|| unreachable!("matching archetype backs column"));
                    for entry in archetype.entities() {
                        let r = r_set
                            .get(entry.entity)
                            .and_then(|v| v.downcast_ref::<R>())
                            .unwrap_or_else(|| unreachable!("member entity has the component"));
                        let w = w_column
                            .get_mut(entry.table_row, change_tick)
                            .and_then(|v| v.downcast_mut::<W>())
                            .unwrap_or_else(|| unreachable!("row holds the column's type"));
                        f(entry.entity, r, w);
                    }
                }
                (StorageType::SparseSet, StorageType::SparseSet) => {
                    let (r_set, w_set) = storages.sparse_sets.get_2_mut(r_id, w_id);
                    let r_set =
                        r_set.unwrap_or_else(|| unreachable!("matching archetype backs sparse set"));
                    let w_set =
                        w_set.unwrap_or_else(|| unreachable!("matching archetype backs sparse set"));
                    for entry in archetype.entities() {
                        let r = r_set
                            .get(entry.entity)
                            .and_then(|v| v.downcast_ref::<R>())
                            .unwrap_or_else(|| unreachable!("member entity has the component"));
                        let w = w_set
                            .get_mut(entry.entity, change_tick)
                            .and_then(|v| v.downcast_mut::<W>())
                            .unwrap_or_else(|| unreachable!("member entity has the component"));
                        f(entry.entity, r, w);
                    }
                }
            }
        }
    }
}

fn storage_of(archetype: &Archetype, id: ComponentId) -> StorageType {
    archetype
        .get_storage_type(id)
        .unwrap_or_else(|| unreachable!("matching archetype has the component"))
}

fn fetch_ref<'a, T: Component>(
    world: &'a World,
    archetype: &Archetype,
    id: ComponentId,
    entity: Entity,
    table_row: usize,
) -> &'a T {
    let value = match storage_of(archetype, id) {
        StorageType::Table => world
            .storages()
            .tables
            .get(archetype.table_id())
            .and_then(|t| t.get_column(id))
            .and_then(|c| c.get(table_row)),
        StorageType::SparseSet => world
            .storages()
            .sparse_sets
            .get(id)
            .and_then(|s| s.get(entity)),
    };
    value
        .and_then(|v| v.downcast_ref::<T>())
        .unwrap_or_else(|| unreachable!("matching archetype carries the component"))
}
