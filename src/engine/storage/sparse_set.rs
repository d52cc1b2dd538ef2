//! Sparse-set component storage.
//!
//! Components declared [`StorageType::SparseSet`] live here instead of in
//! table columns. The trade: insertion and removal never trigger an archetype
//! table move (the value stays put, only archetype membership changes), at
//! the cost of an extra indirection during iteration.
//!
//! ## Layout
//!
//! A [`ComponentSparseSet`] is three parallel dense arrays (values, ticks,
//! owning entities) plus a sparse entity-index → dense-row map. The entity
//! array exists for generation validation: a slot in the sparse map can
//! outlive the entity that created it, so every lookup checks
//! `entities[row] == entity` before trusting the row.

use std::any::Any;

use crate::engine::component::{ComponentInfo, DropFn, StorageType};
use crate::engine::entity::Entity;
use crate::engine::tick::{ComponentTicks, Tick};
use crate::engine::types::ComponentId;

/// A growable index → value map backed by a `Vec<Option<V>>`.
///
/// Shared infrastructure: backs the entity-row map here, the per-component
/// column map in tables, and the resource store.
#[derive(Debug)]
pub struct SparseArray<V> {
    values: Vec<Option<V>>,
}

impl<V> Default for SparseArray<V> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<V> SparseArray<V> {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` at `index`, growing as needed. Returns the previous
    /// occupant.
    pub fn insert(&mut self, index: usize, value: V) -> Option<V> {
        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        self.values[index].replace(value)
    }

    /// Returns `true` if a value is present at `index`.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(Option::is_some)
    }

    /// Shared access to the value at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&V> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Mutable access to the value at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut V> {
        self.values.get_mut(index).and_then(Option::as_mut)
    }

    /// Mutable access to two distinct indices at once.
    ///
    /// ## Panics
    /// Panics if `a == b`.
    pub fn get_2_mut(&mut self, a: usize, b: usize) -> (Option<&mut V>, Option<&mut V>) {
        assert_ne!(a, b, "get_2_mut requires distinct indices");
        if a < b {
            let (low, high) = self.values.split_at_mut(b);
            (
                low.get_mut(a).and_then(Option::as_mut),
                high.first_mut().and_then(Option::as_mut),
            )
        } else {
            let (low, high) = self.values.split_at_mut(a);
            (
                high.first_mut().and_then(Option::as_mut),
                low.get_mut(b).and_then(Option::as_mut),
            )
        }
    }

    /// Removes and returns the value at `index`.
    pub fn remove(&mut self, index: usize) -> Option<V> {
        self.values.get_mut(index).and_then(Option::take)
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Iterates present `(index, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
    }

    /// Iterates present `(index, value)` pairs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut V)> {
        self.values
            .iter_mut()
            .enumerate()
            .filter_map(|(i, v)| v.as_mut().map(|v| (i, v)))
    }
}

/// Dense storage for one sparse-set component across all entities.
///
/// ## Invariants
/// - `dense`, `ticks`, and `entities` always have equal length.
/// - For every dense row `r`: `sparse[entities[r].index()] == r`.
pub struct ComponentSparseSet {
    dense: Vec<Box<dyn Any + Send + Sync>>,
    ticks: Vec<ComponentTicks>,
    entities: Vec<Entity>,
    sparse: SparseArray<usize>,
    drop: Option<DropFn>,
}

impl ComponentSparseSet {
    /// Creates an empty set carrying the component's drop hook.
    pub fn new(info: &ComponentInfo) -> Self {
        debug_assert_eq!(info.storage_type(), StorageType::SparseSet);
        Self {
            dense: Vec::new(),
            ticks: Vec::new(),
            entities: Vec::new(),
            sparse: SparseArray::new(),
            drop: info.drop_fn(),
        }
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if no value is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Returns `true` if `entity` has a value here.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_row(entity).is_some()
    }

    #[inline]
    fn dense_row(&self, entity: Entity) -> Option<usize> {
        let row = *self.sparse.get(entity.index() as usize)?;
        // A stale sparse slot can point at a row now owned by a reused
        // entity index; the generation check catches that.
        (self.entities[row] == entity).then_some(row)
    }

    /// Inserts or overwrites the value for `entity`.
    ///
    /// An overwrite runs the drop hook on the displaced value and stamps the
    /// changed tick; a fresh insert stamps both ticks.
    pub fn insert(
        &mut self,
        entity: Entity,
        value: Box<dyn Any + Send + Sync>,
        change_tick: Tick,
    ) {
        if let Some(row) = self.dense_row(entity) {
            let old = std::mem::replace(&mut self.dense[row], value);
            if let Some(drop_fn) = self.drop {
                drop_fn(old);
            }
            self.ticks[row].set_changed(change_tick);
        } else {
            let row = self.dense.len();
            self.dense.push(value);
            self.ticks.push(ComponentTicks::new(change_tick));
            self.entities.push(entity);
            self.sparse.insert(entity.index() as usize, row);
        }
    }

    /// Shared access to `entity`'s value.
    pub fn get(&self, entity: Entity) -> Option<&(dyn Any + Send + Sync)> {
        self.dense_row(entity).map(|row| &*self.dense[row])
    }

    /// Mutable access to `entity`'s value, stamping the changed tick.
    pub fn get_mut(
        &mut self,
        entity: Entity,
        change_tick: Tick,
    ) -> Option<&mut (dyn Any + Send + Sync)> {
        let row = self.dense_row(entity)?;
        self.ticks[row].set_changed(change_tick);
        Some(&mut *self.dense[row])
    }

    /// Shared access to `entity`'s value together with its ticks.
    pub fn get_with_ticks(
        &self,
        entity: Entity,
    ) -> Option<(&(dyn Any + Send + Sync), &ComponentTicks)> {
        let row = self.dense_row(entity)?;
        Some((&*self.dense[row], &self.ticks[row]))
    }

    /// Removes `entity`'s value and hands it back.
    ///
    /// The last dense row is swap-moved into the vacated slot and the
    /// swapped entity's sparse mapping is re-pointed.
    pub fn remove_and_forget(&mut self, entity: Entity) -> Option<Box<dyn Any + Send + Sync>> {
        let row = self.dense_row(entity)?;
        self.sparse.remove(entity.index() as usize);
        let value = self.dense.swap_remove(row);
        self.ticks.swap_remove(row);
        self.entities.swap_remove(row);
        if row < self.entities.len() {
            let swapped = self.entities[row];
            self.sparse.insert(swapped.index() as usize, row);
        }
        Some(value)
    }

    /// Removes `entity`'s value, running the drop hook. Returns `true` if a
    /// value was present.
    pub fn remove(&mut self, entity: Entity) -> bool {
        match self.remove_and_forget(entity) {
            Some(value) => {
                if let Some(drop_fn) = self.drop {
                    drop_fn(value);
                }
                true
            }
            None => false,
        }
    }

    /// Rebases every row's ticks against the current change tick.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for ticks in &mut self.ticks {
            ticks.check_ticks(change_tick);
        }
    }
}

/// All sparse-set component stores, keyed by [`ComponentId`].
#[derive(Default)]
pub struct SparseSets {
    sets: SparseArray<ComponentSparseSet>,
}

impl SparseSets {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The store for `component_id`, if any entity ever had that component.
    #[inline]
    pub fn get(&self, component_id: ComponentId) -> Option<&ComponentSparseSet> {
        self.sets.get(component_id)
    }

    /// Mutable access to the store for `component_id`.
    #[inline]
    pub fn get_mut(&mut self, component_id: ComponentId) -> Option<&mut ComponentSparseSet> {
        self.sets.get_mut(component_id)
    }

    /// Mutable access to two distinct stores at once.
    ///
    /// ## Panics
    /// Panics if `a == b`.
    pub fn get_2_mut(
        &mut self,
        a: ComponentId,
        b: ComponentId,
    ) -> (Option<&mut ComponentSparseSet>, Option<&mut ComponentSparseSet>) {
        self.sets.get_2_mut(a, b)
    }

    /// The store for `info`'s component, created on first use.
    pub fn get_or_insert(&mut self, info: &ComponentInfo) -> &mut ComponentSparseSet {
        let id = info.id();
        if !self.sets.contains(id) {
            self.sets.insert(id, ComponentSparseSet::new(info));
        }
        self.sets
            .get_mut(id)
            .unwrap_or_else(|| unreachable!("sparse set inserted above"))
    }

    /// Rebases ticks in every store.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for (_, set) in self.sets.iter_mut() {
            set.check_change_ticks(change_tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::component::{Component, Components, StorageType};

    struct Marker(u32);
    impl Component for Marker {
        fn storage_type() -> StorageType {
            StorageType::SparseSet
        }
    }

    fn marker_set() -> (Components, ComponentSparseSet) {
        let mut components = Components::new();
        let id = components.init_component::<Marker>();
        let set = ComponentSparseSet::new(components.get_info(id).unwrap());
        (components, set)
    }

    #[test]
    fn stale_generation_is_rejected() {
        let (_c, mut set) = marker_set();
        let old = Entity::from_raw_and_generation(4, 0);
        let new = Entity::from_raw_and_generation(4, 1);
        set.insert(new, Box::new(Marker(9)), Tick::new(1));
        assert!(set.contains(new));
        assert!(!set.contains(old));
        assert!(set.get(old).is_none());
    }

    #[test]
    fn swap_remove_repoints_swapped_entity() {
        let (_c, mut set) = marker_set();
        let a = Entity::from_raw(0);
        let b = Entity::from_raw(1);
        let c = Entity::from_raw(2);
        for (e, v) in [(a, 10), (b, 20), (c, 30)] {
            set.insert(e, Box::new(Marker(v)), Tick::new(1));
        }
        assert!(set.remove(a));
        // c was swapped into a's dense row and must still resolve.
        let value = set.get(c).unwrap().downcast_ref::<Marker>().unwrap();
        assert_eq!(value.0, 30);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn overwrite_stamps_changed_only() {
        let (_c, mut set) = marker_set();
        let e = Entity::from_raw(0);
        set.insert(e, Box::new(Marker(1)), Tick::new(5));
        set.insert(e, Box::new(Marker(2)), Tick::new(9));
        let (_, ticks) = set.get_with_ticks(e).unwrap();
        assert_eq!(ticks.added, Tick::new(5));
        assert_eq!(ticks.changed, Tick::new(9));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn sparse_array_split_borrow() {
        let mut arr = SparseArray::new();
        arr.insert(1, "one");
        arr.insert(5, "five");
        let (a, b) = arr.get_2_mut(5, 1);
        assert_eq!(a.copied(), Some("five"));
        assert_eq!(b.copied(), Some("one"));
    }
}
