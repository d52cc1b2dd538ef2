//! Component and resource registration.
//!
//! The [`Components`] registry assigns every component and resource type a
//! dense [`ComponentId`] the first time it is seen. Ids are append-only and
//! never reassigned within a world, so every other module can index parallel
//! arrays by them.
//!
//! The registry is **world-scoped state**: each [`crate::engine::world::World`]
//! owns its own `Components`, and two worlds in the same process assign ids
//! independently. Nothing here touches process-global statics.
//!
//! Resources share the numeric id space with components but are looked up
//! through a separate `TypeId` index, so a type can in principle be registered
//! as both without collision.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::engine::types::ComponentId;

/// Which storage class holds a component's data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageType {
    /// Dense columnar storage; fast iteration, moved on archetype change.
    #[default]
    Table,
    /// Per-component sparse set; fast insert/remove, never moved on
    /// archetype change.
    SparseSet,
}

/// A type stored per-entity.
///
/// The associated storage type decides whether values live in table columns
/// or in a sparse set; [`StorageType::Table`] is the default and the right
/// choice for anything iterated frequently.
pub trait Component: Send + Sync + 'static {
    /// Storage class for this component.
    fn storage_type() -> StorageType {
        StorageType::Table
    }
}

/// A type stored once per world.
pub trait Resource: Send + Sync + 'static {}

/// Hook invoked when a type-erased component value is dropped as part of a
/// structural operation (overwrite on re-insert, `remove`, despawn).
///
/// Not invoked by `take`, which hands the value back to the caller instead.
pub type DropFn = fn(Box<dyn Any + Send + Sync>);

/// Everything the storage layer needs to know about a registered type.
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: Cow<'static, str>,
    storage_type: StorageType,
    type_id: TypeId,
    drop: Option<DropFn>,
}

impl ComponentDescriptor {
    /// Builds a descriptor from a component type.
    pub fn new<T: Component>() -> Self {
        Self {
            name: Cow::Borrowed(std::any::type_name::<T>()),
            storage_type: T::storage_type(),
            type_id: TypeId::of::<T>(),
            drop: Some(|value| drop(value)),
        }
    }

    /// Builds a descriptor for a resource type. Storage type is nominal;
    /// resources never live in tables.
    pub fn new_resource<T: Resource>() -> Self {
        Self {
            name: Cow::Borrowed(std::any::type_name::<T>()),
            storage_type: StorageType::SparseSet,
            type_id: TypeId::of::<T>(),
            drop: Some(|value| drop(value)),
        }
    }

    /// The type's full name, used in panic messages and logs.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage class.
    #[inline]
    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// The underlying `TypeId`.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The drop hook, if the type needs one.
    #[inline]
    pub fn drop_fn(&self) -> Option<DropFn> {
        self.drop
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("storage_type", &self.storage_type)
            .finish()
    }
}

/// Registered metadata for one component id.
#[derive(Debug)]
pub struct ComponentInfo {
    id: ComponentId,
    descriptor: ComponentDescriptor,
}

impl ComponentInfo {
    /// The dense id.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The type's full name.
    #[inline]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Storage class.
    #[inline]
    pub fn storage_type(&self) -> StorageType {
        self.descriptor.storage_type()
    }

    /// The drop hook, if any.
    #[inline]
    pub fn drop_fn(&self) -> Option<DropFn> {
        self.descriptor.drop_fn()
    }

    /// The underlying `TypeId`.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.descriptor.type_id()
    }
}

/// World-scoped component and resource registry.
///
/// ## Invariants
/// - Ids are dense: `infos[id].id() == id` for every registered id.
/// - A `TypeId` registered as a component always resolves to the same id;
///   likewise for resources through their separate index.
#[derive(Default)]
pub struct Components {
    infos: Vec<ComponentInfo>,
    component_ids: HashMap<TypeId, ComponentId>,
    resource_ids: HashMap<TypeId, ComponentId>,
}

impl Components {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` as a component, or returns its existing id.
    pub fn init_component<T: Component>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.component_ids.get(&type_id) {
            return id;
        }
        let id = self.register(ComponentDescriptor::new::<T>());
        self.component_ids.insert(type_id, id);
        id
    }

    /// Registers `T` as a resource, or returns its existing resource id.
    pub fn init_resource<T: Resource>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.resource_ids.get(&type_id) {
            return id;
        }
        let id = self.register(ComponentDescriptor::new_resource::<T>());
        self.resource_ids.insert(type_id, id);
        id
    }

    fn register(&mut self, descriptor: ComponentDescriptor) -> ComponentId {
        let id = self.infos.len();
        self.infos.push(ComponentInfo { id, descriptor });
        id
    }

    /// Looks up a component type's id without registering it.
    #[inline]
    pub fn get_id<T: Component>(&self) -> Option<ComponentId> {
        self.component_ids.get(&TypeId::of::<T>()).copied()
    }

    /// Looks up a resource type's id without registering it.
    #[inline]
    pub fn get_resource_id<T: Resource>(&self) -> Option<ComponentId> {
        self.resource_ids.get(&TypeId::of::<T>()).copied()
    }

    /// Metadata for a registered id.
    #[inline]
    pub fn get_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id)
    }

    /// The type name for an id, or a placeholder if unregistered.
    pub fn get_name(&self, id: ComponentId) -> &str {
        self.get_info(id)
            .map(ComponentInfo::name)
            .unwrap_or("<unregistered>")
    }

    /// Number of registered ids (components and resources together).
    #[inline]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns `true` if nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Cooldown;
    impl Component for Cooldown {
        fn storage_type() -> StorageType {
            StorageType::SparseSet
        }
    }

    struct Clock;
    impl Resource for Clock {}

    #[test]
    fn ids_are_dense_and_stable() {
        let mut components = Components::new();
        let a = components.init_component::<Position>();
        let b = components.init_component::<Cooldown>();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(components.init_component::<Position>(), a);
        assert_eq!(components.get_id::<Position>(), Some(a));
        assert_eq!(components.get_info(b).unwrap().storage_type(), StorageType::SparseSet);
    }

    #[test]
    fn resources_use_separate_index() {
        let mut components = Components::new();
        let c = components.init_component::<Position>();
        let r = components.init_resource::<Clock>();
        assert_ne!(c, r);
        assert_eq!(components.get_resource_id::<Clock>(), Some(r));
        assert_eq!(components.len(), 2);
    }
}
