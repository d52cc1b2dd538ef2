//! The world: the single owner of all storage, registries, and schedules.
//!
//! Everything outside this module manipulates entities through the
//! [`World`] facade. Structural operations (spawn, insert, remove, take,
//! despawn) re-validate the entity's generation, route through the bundle
//! machinery, and keep the location index consistent; component access
//! (`get`, `get_mut`, queries) is plain lookups over the resulting layout.
//!
//! ## Command surface
//!
//! The world publishes `"spawn"` and `"despawn"` through its command
//! registry so outer layers can observe structural changes by name; see
//! [`crate::engine::commands`]. User-registered commands run through
//! [`World::run_command`].
//!
//! ## Ticks
//!
//! The change tick advances once per schedule run and once per
//! [`World::flush`]. The periodic wraparound scan fires from inside
//! schedule runs when [`CHECK_TICK_THRESHOLD`] ticks have elapsed since the
//! last scan.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::archetype::Archetypes;
use crate::engine::bundle::{
    patch_archetype_swap, patch_table_swap, remove_bundle_from_archetype, Bundle, BundleInserter,
    BundleSpawner, Bundles,
};
use crate::engine::commands::{
    CommandFn, CommandHook, CommandRegistry, DESPAWN_COMMAND, SPAWN_COMMAND,
};
use crate::engine::component::{Component, Components, Resource, StorageType};
use crate::engine::entity::{Entities, Entity, EntityLocation};
use crate::engine::error::{
    CommandNotFoundError, ScheduleNotFoundError, ScheduleRunError, StaleEntityError,
};
use crate::engine::query::QueryBuilder;
use crate::engine::schedule::{Schedule, Schedules};
use crate::engine::storage::Storages;
use crate::engine::tick::{ComponentTicks, Tick, CHECK_TICK_THRESHOLD};
use crate::engine::types::{ComponentId, EMPTY_ARCHETYPE, EMPTY_TABLE};

/// The top-level container. See the module docs.
#[derive(Default)]
pub struct World {
    entities: Entities,
    components: Components,
    archetypes: Archetypes,
    storages: Storages,
    bundles: Bundles,
    schedules: Schedules,
    commands: CommandRegistry,
    change_tick: Tick,
    last_check_tick: Tick,
}

impl World {
    /// Creates an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity allocator.
    #[inline]
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// The component registry.
    #[inline]
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Mutable access to the component registry.
    #[inline]
    pub fn components_mut(&mut self) -> &mut Components {
        &mut self.components
    }

    /// The archetype arena.
    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    /// The raw storage.
    #[inline]
    pub fn storages(&self) -> &Storages {
        &self.storages
    }

    /// Split borrow for iteration adapters that read archetype layout while
    /// mutating storage.
    #[inline]
    pub(crate) fn archetypes_and_storages_mut(&mut self) -> (&Archetypes, &mut Storages) {
        (&self.archetypes, &mut self.storages)
    }

    /// The current change tick.
    #[inline]
    pub fn change_tick(&self) -> Tick {
        self.change_tick
    }

    /// Advances the change tick by one (wrapping).
    pub fn increment_change_tick(&mut self) {
        self.change_tick = Tick::new(self.change_tick.get().wrapping_add(1));
    }

    /// Returns `true` once per [`CHECK_TICK_THRESHOLD`] elapsed ticks,
    /// resetting the countdown.
    pub(crate) fn take_tick_check_due(&mut self) -> bool {
        if self.change_tick.relative_to(self.last_check_tick).get() >= CHECK_TICK_THRESHOLD {
            self.last_check_tick = self.change_tick;
            true
        } else {
            false
        }
    }

    /// Rebases change ticks across storage and every registered schedule.
    pub fn check_change_ticks(&mut self) {
        let change_tick = self.change_tick;
        self.storages.check_change_ticks(change_tick);
        self.schedules.check_change_ticks(change_tick);
        self.last_check_tick = change_tick;
    }

    // ---- entity lifecycle -------------------------------------------------

    /// Returns `true` if `entity` is current (reservations included).
    #[inline]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Reserves an entity without mutating any storage; materialized by the
    /// next [`World::flush`].
    pub fn reserve_entity(&self) -> Entity {
        self.entities.reserve_entity()
    }

    /// Materializes reserved entities into the empty archetype and advances
    /// the change tick.
    pub fn flush(&mut self) {
        let Self {
            entities,
            archetypes,
            storages,
            ..
        } = self;
        let archetype = archetypes
            .get_mut(EMPTY_ARCHETYPE)
            .unwrap_or_else(|| unreachable!("empty archetype always exists"));
        let table = storages
            .tables
            .get_mut(EMPTY_TABLE)
            .unwrap_or_else(|| unreachable!("empty table always exists"));
        entities.flush(|entity, location| {
            let table_row = table.allocate(entity);
            let archetype_row = archetype.allocate(entity, table_row);
            *location = EntityLocation {
                archetype_id: EMPTY_ARCHETYPE,
                archetype_row,
                table_id: EMPTY_TABLE,
                table_row,
            };
        });
        self.increment_change_tick();
    }

    /// Spawns an entity with no components.
    pub fn spawn_empty(&mut self) -> EntityHandle<'_> {
        let entity = self.entities.alloc();
        let commands = std::mem::take(&mut self.commands);
        commands.fire_before(self, SPAWN_COMMAND, &entity);
        self.place_in_empty_archetype(entity);
        commands.fire_after(self, SPAWN_COMMAND, &entity);
        self.commands = commands;
        EntityHandle {
            world: self,
            entity,
        }
    }

    fn place_in_empty_archetype(&mut self, entity: Entity) {
        let table = self
            .storages
            .tables
            .get_mut(EMPTY_TABLE)
            .unwrap_or_else(|| unreachable!("empty table always exists"));
        let table_row = table.allocate(entity);
        let archetype_row = self
            .archetypes
            .get_mut(EMPTY_ARCHETYPE)
            .unwrap_or_else(|| unreachable!("empty archetype always exists"))
            .allocate(entity, table_row);
        self.entities.set(
            entity.index(),
            EntityLocation {
                archetype_id: EMPTY_ARCHETYPE,
                archetype_row,
                table_id: EMPTY_TABLE,
                table_row,
            },
        );
    }

    /// Spawns an entity with `bundle`'s components.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> EntityHandle<'_> {
        let entity = self.entities.alloc();
        let commands = std::mem::take(&mut self.commands);
        commands.fire_before(self, SPAWN_COMMAND, &entity);

        let mut values = Vec::new();
        bundle.get_components(&mut |_storage, value| values.push(value));
        let change_tick = self.change_tick;
        {
            let Self {
                entities,
                components,
                archetypes,
                storages,
                bundles,
                ..
            } = self;
            let bundle_info = bundles.init_info::<B>(components);
            let spawner =
                BundleSpawner::new(archetypes, &mut storages.tables, components, bundle_info);
            spawner.spawn(
                entities,
                archetypes,
                storages,
                components,
                bundle_info,
                entity,
                values,
                change_tick,
            );
        }

        commands.fire_after(self, SPAWN_COMMAND, &entity);
        self.commands = commands;
        EntityHandle {
            world: self,
            entity,
        }
    }

    /// Removes `entity` and drops all its components. Returns `false` for a
    /// stale handle.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if self.entities.get(entity).is_none() {
            return false;
        }
        let commands = std::mem::take(&mut self.commands);
        commands.fire_before(self, DESPAWN_COMMAND, &entity);

        // Hooks run with mutable world access and may have moved rows
        // around (or despawned this very entity); the location must be
        // re-read after they return.
        let Some(location) = self.entities.get(entity) else {
            commands.fire_after(self, DESPAWN_COMMAND, &entity);
            self.commands = commands;
            return true;
        };

        let sparse_components: Vec<ComponentId> = self
            .archetypes
            .get(location.archetype_id)
            .map(|a| a.sparse_components().to_vec())
            .unwrap_or_default();
        for component_id in sparse_components {
            if let Some(set) = self.storages.sparse_sets.get_mut(component_id) {
                set.remove(entity);
            }
        }

        let remove_result = self
            .archetypes
            .get_mut(location.archetype_id)
            .unwrap_or_else(|| unreachable!("live location names a real archetype"))
            .swap_remove(location.archetype_row);
        if let Some(swapped) = remove_result.swapped_entity {
            patch_archetype_swap(&mut self.entities, swapped, location.archetype_row);
        }

        let table = self
            .storages
            .tables
            .get_mut(location.table_id)
            .unwrap_or_else(|| unreachable!("live location names a real table"));
        if let Some(swapped) = table.swap_remove_unchecked(remove_result.table_row) {
            patch_table_swap(
                &mut self.entities,
                &mut self.archetypes,
                swapped,
                remove_result.table_row,
            );
        }

        self.entities.free(entity);
        commands.fire_after(self, DESPAWN_COMMAND, &entity);
        self.commands = commands;
        true
    }

    // ---- component access -------------------------------------------------

    /// Inserts `bundle`'s components into `entity`, overwriting any it
    /// already has.
    pub fn insert<B: Bundle>(&mut self, entity: Entity, bundle: B) -> Result<(), StaleEntityError> {
        let location = self.entities.get(entity).ok_or(StaleEntityError { entity })?;
        let mut values = Vec::new();
        bundle.get_components(&mut |_storage, value| values.push(value));
        let change_tick = self.change_tick;

        let Self {
            entities,
            components,
            archetypes,
            storages,
            bundles,
            ..
        } = self;
        let bundle_info = bundles.init_info::<B>(components);
        let inserter = BundleInserter::new(
            archetypes,
            &mut storages.tables,
            components,
            location.archetype_id,
            bundle_info,
        );
        inserter.insert(
            entities,
            archetypes,
            storages,
            components,
            bundle_info,
            entity,
            location,
            values,
            change_tick,
        );
        Ok(())
    }

    /// Removes `B`'s components from `entity`, dropping their values.
    /// Components the entity lacks are skipped.
    pub fn remove<B: Bundle>(&mut self, entity: Entity) -> Result<(), StaleEntityError> {
        self.remove_inner::<B>(entity, true).map(|_| ())
    }

    /// Removes `B`'s components from `entity` and returns them by value.
    ///
    /// Unlike [`World::remove`], this requires **every** bundle component to
    /// be present; otherwise nothing happens and `Ok(None)` is returned.
    /// Drop hooks do not run for taken values.
    pub fn take<B: Bundle>(&mut self, entity: Entity) -> Result<Option<B>, StaleEntityError> {
        let captured = self.remove_inner::<B>(entity, false)?;
        let Some(mut captured) = captured else {
            return Ok(None);
        };
        let bundle_info = {
            let Self {
                components,
                bundles,
                ..
            } = self;
            bundles.init_info::<B>(components)
        };
        let mut order = bundle_info.component_ids().iter();
        let bundle = B::from_components(&mut || {
            let component_id = order
                .next()
                .unwrap_or_else(|| panic!("bundle rebuilt with too many components"));
            captured
                .remove(component_id)
                .unwrap_or_else(|| panic!("captured values missing component {component_id}"))
        });
        Ok(Some(bundle))
    }

    /// Shared machinery for `remove` and `take`.
    ///
    /// With `drop_values` the removed components run their drop hooks and
    /// `Ok(Some(empty map))` is returned on success; without it, removal
    /// requires all components present and the captured values come back
    /// keyed by component id (`Ok(None)` when the bundle is incomplete).
    fn remove_inner<B: Bundle>(
        &mut self,
        entity: Entity,
        drop_values: bool,
    ) -> Result<Option<HashMap<ComponentId, Box<dyn Any + Send + Sync>>>, StaleEntityError> {
        let location = self.entities.get(entity).ok_or(StaleEntityError { entity })?;

        let Self {
            entities,
            components,
            archetypes,
            storages,
            bundles,
            ..
        } = self;
        let bundle_info = bundles.init_info::<B>(components);
        let Some(new_archetype_id) = remove_bundle_from_archetype(
            archetypes,
            &mut storages.tables,
            components,
            location.archetype_id,
            bundle_info,
            drop_values,
        ) else {
            return Ok(None);
        };

        let mut captured: HashMap<ComponentId, Box<dyn Any + Send + Sync>> = HashMap::new();

        if new_archetype_id == location.archetype_id {
            // Nothing overlapped; `take` of the empty bundle lands here too.
            return Ok(Some(captured));
        }

        // Sparse components leave their set directly.
        for &component_id in bundle_info.component_ids() {
            let in_archetype = archetypes
                .get(location.archetype_id)
                .is_some_and(|a| a.get_storage_type(component_id) == Some(StorageType::SparseSet));
            if !in_archetype {
                continue;
            }
            if let Some(set) = storages.sparse_sets.get_mut(component_id) {
                if drop_values {
                    set.remove(entity);
                } else if let Some(value) = set.remove_and_forget(entity) {
                    captured.insert(component_id, value);
                }
            }
        }

        let remove_result = archetypes
            .get_mut(location.archetype_id)
            .unwrap_or_else(|| unreachable!("live location names a real archetype"))
            .swap_remove(location.archetype_row);
        if let Some(swapped) = remove_result.swapped_entity {
            patch_archetype_swap(entities, swapped, location.archetype_row);
        }

        let new_table_id = archetypes
            .get(new_archetype_id)
            .map(|a| a.table_id())
            .unwrap_or_else(|| unreachable!("destination archetype exists"));

        let (new_table_row, swapped_table_entity) = if new_table_id == location.table_id {
            (remove_result.table_row, None)
        } else {
            let (old_table, new_table) = storages.tables.get_2_mut(location.table_id, new_table_id);
            let move_result = if drop_values {
                old_table.move_to_and_drop_missing_unchecked(remove_result.table_row, new_table)
            } else {
                old_table.move_to_and_forget_missing_unchecked(
                    remove_result.table_row,
                    new_table,
                    &mut |component_id, value| {
                        captured.insert(component_id, value);
                    },
                )
            };
            (move_result.new_row, move_result.swapped_entity)
        };
        if let Some(swapped) = swapped_table_entity {
            patch_table_swap(entities, archetypes, swapped, remove_result.table_row);
        }

        let archetype_row = archetypes
            .get_mut(new_archetype_id)
            .unwrap_or_else(|| unreachable!("destination archetype exists"))
            .allocate(entity, new_table_row);
        entities.set(
            entity.index(),
            EntityLocation {
                archetype_id: new_archetype_id,
                archetype_row,
                table_id: new_table_id,
                table_row: new_table_row,
            },
        );
        Ok(Some(captured))
    }

    /// Shared access to `entity`'s `T`.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let location = self.entities.get(entity)?;
        let id = self.components.get_id::<T>()?;
        let storage_type = self.archetypes.get(location.archetype_id)?.get_storage_type(id)?;
        let value = match storage_type {
            StorageType::Table => self
                .storages
                .tables
                .get(location.table_id)?
                .get_column(id)?
                .get(location.table_row)?,
            StorageType::SparseSet => self.storages.sparse_sets.get(id)?.get(entity)?,
        };
        value.downcast_ref::<T>()
    }

    /// Mutable access to `entity`'s `T`, stamping its changed tick.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let location = self.entities.get(entity)?;
        let id = self.components.get_id::<T>()?;
        let storage_type = self.archetypes.get(location.archetype_id)?.get_storage_type(id)?;
        let change_tick = self.change_tick;
        let value = match storage_type {
            StorageType::Table => self
                .storages
                .tables
                .get_mut(location.table_id)?
                .get_column_mut(id)?
                .get_mut(location.table_row, change_tick)?,
            StorageType::SparseSet => self
                .storages
                .sparse_sets
                .get_mut(id)?
                .get_mut(entity, change_tick)?,
        };
        value.downcast_mut::<T>()
    }

    /// The change-detection ticks for `entity`'s `T`.
    pub fn get_component_ticks<T: Component>(&self, entity: Entity) -> Option<ComponentTicks> {
        let location = self.entities.get(entity)?;
        let id = self.components.get_id::<T>()?;
        let storage_type = self.archetypes.get(location.archetype_id)?.get_storage_type(id)?;
        match storage_type {
            StorageType::Table => self
                .storages
                .tables
                .get(location.table_id)?
                .get_column(id)?
                .get_ticks(location.table_row),
            StorageType::SparseSet => self
                .storages
                .sparse_sets
                .get(id)?
                .get_with_ticks(entity)
                .map(|(_, ticks)| *ticks),
        }
    }

    /// Opens a query over the world.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// A handle for operating repeatedly on one entity.
    pub fn entity_mut(&mut self, entity: Entity) -> Option<EntityHandle<'_>> {
        self.entities.get(entity)?;
        Some(EntityHandle {
            world: self,
            entity,
        })
    }

    // ---- resources --------------------------------------------------------

    /// Ensures resource `R` exists, constructing a default if absent.
    pub fn init_resource<R: Resource + Default>(&mut self) {
        let id = self.components.init_resource::<R>();
        let present = self
            .storages
            .resources
            .get(id)
            .is_some_and(|slot| slot.is_present());
        if !present {
            self.insert_resource(R::default());
        }
    }

    /// Inserts (or overwrites) resource `R`.
    pub fn insert_resource<R: Resource>(&mut self, value: R) {
        let id = self.components.init_resource::<R>();
        let info = self
            .components
            .get_info(id)
            .unwrap_or_else(|| unreachable!("resource registered above"));
        let change_tick = self.change_tick;
        self.storages
            .resources
            .get_or_insert(info)
            .insert(Box::new(value), change_tick);
    }

    /// Shared access to resource `R`.
    pub fn get_resource<R: Resource>(&self) -> Option<&R> {
        let id = self.components.get_resource_id::<R>()?;
        self.storages.resources.get(id)?.get()?.downcast_ref::<R>()
    }

    /// Mutable access to resource `R`, stamping its changed tick.
    pub fn get_resource_mut<R: Resource>(&mut self) -> Option<&mut R> {
        let id = self.components.get_resource_id::<R>()?;
        let change_tick = self.change_tick;
        self.storages
            .resources
            .get_mut(id)?
            .get_mut(change_tick)?
            .downcast_mut::<R>()
    }

    /// Removes resource `R`, returning it by value.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        let id = self.components.get_resource_id::<R>()?;
        let value = self.storages.resources.get_mut(id)?.remove()?;
        value
            .downcast::<R>()
            .map(|boxed| *boxed)
            .map_err(|_| ())
            .ok()
    }

    /// Returns `true` if resource `R` is present.
    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.components
            .get_resource_id::<R>()
            .and_then(|id| self.storages.resources.get(id))
            .is_some_and(|slot| slot.is_present())
    }

    /// The change-detection ticks for resource `R`.
    pub fn get_resource_ticks<R: Resource>(&self) -> Option<ComponentTicks> {
        let id = self.components.get_resource_id::<R>()?;
        self.storages.resources.get(id)?.get_ticks()
    }

    // ---- schedules --------------------------------------------------------

    /// Registers `schedule` under `label`.
    pub fn add_schedule(&mut self, label: impl Into<String>, schedule: Schedule) {
        self.schedules.insert(label, schedule);
    }

    /// Mutable access to the schedule under `label`.
    pub fn schedule_mut(&mut self, label: &str) -> Option<&mut Schedule> {
        self.schedules.get_mut(label)
    }

    /// Runs the schedule under `label` once.
    ///
    /// ## Panics
    /// Panics if the label is unknown or the schedule fails to build; both
    /// are configuration errors. Use [`World::try_run_schedule`] for the
    /// fallible form.
    pub fn run_schedule(&mut self, label: &str) {
        if let Err(error) = self.try_run_schedule_silent(label) {
            panic!("run_schedule(`{label}`) failed: {error}");
        }
    }

    /// Runs the schedule under `label`, logging and returning any failure.
    pub fn try_run_schedule(&mut self, label: &str) -> Result<(), ScheduleRunError> {
        let result = self.try_run_schedule_silent(label);
        if let Err(error) = &result {
            log::warn!("schedule `{label}` did not run: {error}");
        }
        result
    }

    fn try_run_schedule_silent(&mut self, label: &str) -> Result<(), ScheduleRunError> {
        let mut schedule =
            self.schedules
                .remove(label)
                .ok_or_else(|| ScheduleNotFoundError {
                    label: label.to_owned(),
                })?;
        let result = schedule.run(self);
        self.schedules.insert(label, schedule);
        result.map_err(ScheduleRunError::from)
    }

    // ---- commands ---------------------------------------------------------

    /// Registers (or replaces) the named command body.
    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        command: impl Fn(&mut World, &dyn Any) + Send + Sync + 'static,
    ) {
        self.commands.register(name, Box::new(command) as CommandFn);
    }

    /// Attaches an observer before the named command (or built-in
    /// operation).
    pub fn add_command_before_hook(
        &mut self,
        name: impl Into<String>,
        hook: impl Fn(&mut World, &dyn Any) + Send + Sync + 'static,
    ) {
        self.commands
            .add_before_hook(name, Box::new(hook) as CommandHook);
    }

    /// Attaches an observer after the named command (or built-in
    /// operation).
    pub fn add_command_after_hook(
        &mut self,
        name: impl Into<String>,
        hook: impl Fn(&mut World, &dyn Any) + Send + Sync + 'static,
    ) {
        self.commands
            .add_after_hook(name, Box::new(hook) as CommandHook);
    }

    /// Runs the named command with its hooks.
    pub fn run_command(
        &mut self,
        name: &str,
        payload: &dyn Any,
    ) -> Result<(), CommandNotFoundError> {
        let commands = std::mem::take(&mut self.commands);
        let result = commands.run(self, name, payload);
        self.commands = commands;
        result
    }
}

/// A borrow of the world focused on one entity.
pub struct EntityHandle<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl EntityHandle<'_> {
    /// The entity this handle points at.
    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Inserts more components; see [`World::insert`].
    ///
    /// ## Panics
    /// Panics if the entity was despawned out from under the handle.
    pub fn insert<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        if let Err(error) = self.world.insert(self.entity, bundle) {
            panic!("insert through a live handle failed: {error}");
        }
        self
    }

    /// Shared access to this entity's `T`.
    pub fn get<T: Component>(&self) -> Option<&T> {
        self.world.get::<T>(self.entity)
    }

    /// Mutable access to this entity's `T`, stamping its changed tick.
    pub fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.world.get_mut::<T>(self.entity)
    }

    /// Returns `true` if this entity has `T`.
    pub fn contains<T: Component>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Despawns the entity, consuming the handle.
    pub fn despawn(self) -> bool {
        self.world.despawn(self.entity)
    }
}
