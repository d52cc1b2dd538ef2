//! World-singleton resource storage.
//!
//! A resource is a single value per world. Each registered resource id owns a
//! [`ResourceData`] slot: the sparse-set pattern collapsed to one row, with
//! the same tick pair and drop-hook handling.

use std::any::Any;

use crate::engine::component::{ComponentInfo, DropFn};
use crate::engine::storage::sparse_set::SparseArray;
use crate::engine::tick::{ComponentTicks, Tick};
use crate::engine::types::ComponentId;

/// A single resource slot.
pub struct ResourceData {
    value: Option<Box<dyn Any + Send + Sync>>,
    ticks: ComponentTicks,
    drop: Option<DropFn>,
}

impl ResourceData {
    fn new(info: &ComponentInfo) -> Self {
        Self {
            value: None,
            ticks: ComponentTicks::new(Tick::new(0)),
            drop: info.drop_fn(),
        }
    }

    /// Returns `true` if a value is present.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Inserts or overwrites the value. An overwrite runs the drop hook on
    /// the displaced value and stamps only the changed tick.
    pub fn insert(&mut self, value: Box<dyn Any + Send + Sync>, change_tick: Tick) {
        match self.value.replace(value) {
            Some(old) => {
                if let Some(drop_fn) = self.drop {
                    drop_fn(old);
                }
                self.ticks.set_changed(change_tick);
            }
            None => self.ticks = ComponentTicks::new(change_tick),
        }
    }

    /// Shared access to the value.
    #[inline]
    pub fn get(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.value.as_deref()
    }

    /// Mutable access, stamping the changed tick.
    pub fn get_mut(&mut self, change_tick: Tick) -> Option<&mut (dyn Any + Send + Sync)> {
        let value = self.value.as_deref_mut()?;
        self.ticks.set_changed(change_tick);
        Some(value)
    }

    /// The slot's ticks, if a value is present.
    #[inline]
    pub fn get_ticks(&self) -> Option<ComponentTicks> {
        self.value.is_some().then_some(self.ticks)
    }

    /// Removes the value and hands it back without running the drop hook.
    pub fn remove(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.value.take()
    }

    /// Rebases the slot's ticks.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        if self.value.is_some() {
            self.ticks.check_ticks(change_tick);
        }
    }
}

/// All resource slots, keyed by the registry's resource [`ComponentId`].
#[derive(Default)]
pub struct Resources {
    slots: SparseArray<ResourceData>,
}

impl Resources {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `component_id`, if the resource was ever initialized.
    #[inline]
    pub fn get(&self, component_id: ComponentId) -> Option<&ResourceData> {
        self.slots.get(component_id)
    }

    /// Mutable access to the slot for `component_id`.
    #[inline]
    pub fn get_mut(&mut self, component_id: ComponentId) -> Option<&mut ResourceData> {
        self.slots.get_mut(component_id)
    }

    /// The slot for `info`'s resource, created empty on first use.
    pub fn get_or_insert(&mut self, info: &ComponentInfo) -> &mut ResourceData {
        let id = info.id();
        if !self.slots.contains(id) {
            self.slots.insert(id, ResourceData::new(info));
        }
        self.slots
            .get_mut(id)
            .unwrap_or_else(|| unreachable!("resource slot inserted above"))
    }

    /// Rebases ticks in every occupied slot.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for (_, slot) in self.slots.iter_mut() {
            slot.check_change_ticks(change_tick);
        }
    }
}
