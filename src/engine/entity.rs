//! Entity identity and allocation.
//!
//! An [`Entity`] is a `(index, generation)` pair packed into 64 bits. The
//! index addresses a slot in the [`Entities`] allocator; the generation
//! counts how many times that slot has been reused, so a stale handle held
//! across a despawn can be detected instead of silently aliasing the new
//! occupant.
//!
//! ## Allocation model
//!
//! * `alloc` pops the free list or grows the metadata arena.
//! * `free` bumps the slot's generation and pushes the index back onto the
//!   free list. On generation wraparound the allocator logs an aliasing-risk
//!   warning and continues (soft integrity condition, not a failure).
//! * `reserve_entity` hands out an entity **without** mutating the arena,
//!   by decrementing an atomic cursor over the free list; the cursor may go
//!   negative, in which case the reservation refers to a slot that does not
//!   exist yet. Reservations become real entities on the next
//!   [`Entities::flush`].
//!
//! ## Flush discipline
//!
//! Between a reservation and the flush that materializes it, the arena and
//! the free list are out of sync. Every row-mutating operation therefore
//! calls [`Entities::verify_flushed`], which panics on a pending flush —
//! that situation is a programming error in the caller, never a recoverable
//! state.
//!
//! ## Location tracking
//!
//! The allocator doubles as the entity → storage index: each live slot holds
//! an [`EntityLocation`] naming the archetype, archetype row, table, and
//! table row where the entity's data currently lives. Structural operations
//! (spawn, insert, despawn) must keep this synchronized with the archetype
//! entity lists and table rows they touch; swap-remove back-patching happens
//! through [`Entities::set`].

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::engine::types::{
    ArchetypeId, ArchetypeRow, TableId, TableRow, INVALID_ARCHETYPE, INVALID_ROW,
};

/// A handle to a logical object: a slot index plus a reuse generation.
///
/// The handle is valid only while its generation matches the allocator's
/// current generation for that slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// Creates an entity from a slot index with generation zero.
    #[inline]
    pub const fn from_raw(index: u32) -> Self {
        Self {
            index,
            generation: 0,
        }
    }

    /// Creates an entity from an explicit `(index, generation)` pair.
    #[inline]
    pub const fn from_raw_and_generation(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the reuse generation.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packs the handle into a single `u64`: generation high, index low.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Reverses [`Entity::to_bits`].
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl PartialOrd for Entity {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entity {
    /// Entities order by their packed bits, i.e. by generation first and
    /// index second.
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bits().cmp(&other.to_bits())
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Where an entity's data currently lives.
///
/// ## Invariants
/// Always consistent with the archetype's entity list and the owning
/// table's row count; updated atomically (with respect to the single-threaded
/// operation in progress) whenever either moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    /// The archetype holding the entity.
    pub archetype_id: ArchetypeId,
    /// The entity's row in the archetype's entity list.
    pub archetype_row: ArchetypeRow,
    /// The table backing the archetype's dense components.
    pub table_id: TableId,
    /// The entity's row in that table.
    pub table_row: TableRow,
}

impl EntityLocation {
    /// Sentinel location for slots that are reserved or freed.
    pub const INVALID: EntityLocation = EntityLocation {
        archetype_id: INVALID_ARCHETYPE,
        archetype_row: INVALID_ROW,
        table_id: usize::MAX,
        table_row: INVALID_ROW,
    };

    /// Returns `true` if this is the invalid sentinel.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.archetype_id == INVALID_ARCHETYPE
    }
}

/// Outcome of [`Entities::alloc_at_without_replacement`].
#[derive(Debug, PartialEq, Eq)]
pub enum AllocAtWithoutReplacement {
    /// The slot did not exist (or was free) and has been allocated.
    DidNotExist,
    /// The exact entity already exists; its current location is returned.
    Exists(EntityLocation),
    /// The slot is occupied by a different generation.
    ExistsWithWrongGeneration,
}

#[derive(Clone, Copy)]
struct EntityMeta {
    generation: u32,
    location: EntityLocation,
}

impl EntityMeta {
    const EMPTY: EntityMeta = EntityMeta {
        generation: 0,
        location: EntityLocation::INVALID,
    };
}

/// Issues and reclaims entity identifiers with generation counters, and
/// tracks each live entity's [`EntityLocation`].
#[derive(Default)]
pub struct Entities {
    meta: Vec<EntityMeta>,
    /// Freed slot indices available for reuse.
    pending: Vec<u32>,
    /// Cursor over `pending`, decremented by reservations. Values in
    /// `0..=pending.len()` mean that many free-list entries remain
    /// unreserved; negative values count reservations of slots that do not
    /// exist in `meta` yet.
    free_cursor: AtomicI64,
    /// Number of live (allocated or reserved) entities.
    len: u32,
}

impl Entities {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves one entity without mutating the arena.
    ///
    /// ## Behavior
    /// Pre-allocates from the free-list cursor; safe to call while the arena
    /// itself is logically borrowed elsewhere (the lock-free reservation
    /// pattern), even though execution here is single-threaded. The
    /// reservation must be materialized by [`Entities::flush`] before any
    /// row-mutating operation runs.
    pub fn reserve_entity(&self) -> Entity {
        let n = self.free_cursor.fetch_sub(1, Ordering::Relaxed);
        if n > 0 {
            let index = self.pending[(n - 1) as usize];
            Entity {
                index,
                generation: self.meta[index as usize].generation,
            }
        } else {
            // Free list exhausted: the reservation names a slot past the
            // current arena end, created at flush time.
            Entity::from_raw(self.meta.len() as u32 + (-n) as u32)
        }
    }

    /// Reserves `count` entities, returning them in reservation order.
    pub fn reserve_entities(&self, count: u32) -> Vec<Entity> {
        (0..count).map(|_| self.reserve_entity()).collect()
    }

    /// Allocates an entity immediately.
    ///
    /// ## Panics
    /// Panics if a flush is pending (see [`Entities::verify_flushed`]).
    pub fn alloc(&mut self) -> Entity {
        self.verify_flushed();
        self.len += 1;
        if let Some(index) = self.pending.pop() {
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            Entity {
                index,
                generation: self.meta[index as usize].generation,
            }
        } else {
            let index = self.meta.len() as u32;
            self.meta.push(EntityMeta::EMPTY);
            Entity::from_raw(index)
        }
    }

    /// Allocates the specific entity `entity`, displacing any current
    /// occupant of the slot.
    ///
    /// Returns the location of the displaced entity if the slot was live.
    ///
    /// ## Panics
    /// Panics if a flush is pending.
    pub fn alloc_at(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();

        let loc = if entity.index as usize >= self.meta.len() {
            self.pending.extend((self.meta.len() as u32)..entity.index);
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            self.meta
                .resize(entity.index as usize + 1, EntityMeta::EMPTY);
            self.len += 1;
            None
        } else if let Some(slot) = self.pending.iter().position(|&i| i == entity.index) {
            self.pending.swap_remove(slot);
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            self.len += 1;
            None
        } else {
            let old = std::mem::replace(
                &mut self.meta[entity.index as usize].location,
                EntityLocation::INVALID,
            );
            (!old.is_invalid()).then_some(old)
        };

        self.meta[entity.index as usize].generation = entity.generation;
        loc
    }

    /// Allocates the specific entity `entity` only if the slot is not
    /// occupied by a conflicting generation.
    ///
    /// ## Panics
    /// Panics if a flush is pending.
    pub fn alloc_at_without_replacement(&mut self, entity: Entity) -> AllocAtWithoutReplacement {
        self.verify_flushed();

        if entity.index as usize >= self.meta.len() {
            self.pending.extend((self.meta.len() as u32)..entity.index);
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            self.meta
                .resize(entity.index as usize + 1, EntityMeta::EMPTY);
            self.len += 1;
            self.meta[entity.index as usize].generation = entity.generation;
            return AllocAtWithoutReplacement::DidNotExist;
        }

        if let Some(slot) = self.pending.iter().position(|&i| i == entity.index) {
            self.pending.swap_remove(slot);
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            self.len += 1;
            self.meta[entity.index as usize].generation = entity.generation;
            return AllocAtWithoutReplacement::DidNotExist;
        }

        let meta = &self.meta[entity.index as usize];
        if meta.generation != entity.generation {
            AllocAtWithoutReplacement::ExistsWithWrongGeneration
        } else {
            AllocAtWithoutReplacement::Exists(meta.location)
        }
    }

    /// Frees an entity, bumping the slot generation and recycling the index.
    ///
    /// Returns the freed entity's last location, or `None` if the handle was
    /// stale.
    ///
    /// ## Behavior
    /// On generation wraparound the counter restarts at 1 (never 0, which
    /// fresh slots use) and an aliasing-risk warning is logged; the
    /// allocator continues operating.
    ///
    /// ## Panics
    /// Panics if a flush is pending.
    pub fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();

        let meta = self.meta.get_mut(entity.index as usize)?;
        if meta.generation != entity.generation {
            return None;
        }

        meta.generation = meta.generation.wrapping_add(1);
        if meta.generation == 0 {
            meta.generation = 1;
            log::warn!(
                "entity index {} generation wrapped on free; aliasing with very old handles may occur",
                entity.index
            );
        }

        let loc = std::mem::replace(&mut meta.location, EntityLocation::INVALID);
        self.pending.push(entity.index);
        *self.free_cursor.get_mut() = self.pending.len() as i64;
        self.len -= 1;
        Some(loc)
    }

    /// Advances a freed slot's generation by at least `generations`.
    ///
    /// Returns `false` (and does nothing) if the slot is currently live.
    pub fn reserve_generations(&mut self, index: u32, generations: u32) -> bool {
        let Some(meta) = self.meta.get_mut(index as usize) else {
            return false;
        };
        if meta.location.is_invalid() {
            meta.generation = meta.generation.wrapping_add(generations);
            if meta.generation == 0 {
                meta.generation = 1;
            }
            true
        } else {
            false
        }
    }

    /// Returns the entity's current location.
    ///
    /// `None` for stale handles and for live slots still holding the
    /// `INVALID` sentinel (reserved but not yet flushed).
    pub fn get(&self, entity: Entity) -> Option<EntityLocation> {
        let meta = self.meta.get(entity.index as usize)?;
        if meta.generation != entity.generation || meta.location.is_invalid() {
            None
        } else {
            Some(meta.location)
        }
    }

    /// Returns `true` if the handle refers to a current entity, including
    /// reservations that have not been flushed yet.
    pub fn contains(&self, entity: Entity) -> bool {
        self.resolve_from_id(entity.index)
            .is_some_and(|current| current.generation == entity.generation)
    }

    /// Resolves a raw slot index to the entity currently (or imminently)
    /// occupying it, if any.
    pub fn resolve_from_id(&self, index: u32) -> Option<Entity> {
        if let Some(meta) = self.meta.get(index as usize) {
            return Some(Entity {
                index,
                generation: meta.generation,
            });
        }
        // Beyond the arena end: only valid if covered by negative-cursor
        // reservations.
        let free_cursor = self.free_cursor.load(Ordering::Relaxed);
        let num_pending = usize::try_from(-free_cursor).ok()?;
        if (index as usize) < self.meta.len() + num_pending {
            Some(Entity::from_raw(index))
        } else {
            None
        }
    }

    /// Overwrites the stored location for a slot.
    ///
    /// ## Invariants
    /// The caller promises the slot is live; this is the back-patch hook
    /// used after swap-removes and table moves.
    #[inline]
    pub fn set(&mut self, index: u32, location: EntityLocation) {
        debug_assert!(
            (index as usize) < self.meta.len(),
            "set called for an unallocated entity slot {index}"
        );
        self.meta[index as usize].location = location;
    }

    /// Materializes every reserved-but-uninitialized entity.
    ///
    /// `init` is invoked once per such entity with a mutable reference to
    /// its location slot; the callback must either store a real location or
    /// deliberately leave the sentinel.
    pub fn flush(&mut self, mut init: impl FnMut(Entity, &mut EntityLocation)) {
        let free_cursor = self.free_cursor.get_mut();
        let current_free_cursor = *free_cursor;

        let new_free_cursor = if current_free_cursor >= 0 {
            current_free_cursor as usize
        } else {
            // Reservations ran past the free list: grow the arena to cover
            // them.
            let old_meta_len = self.meta.len();
            let new_meta_len = old_meta_len + (-current_free_cursor) as usize;
            self.meta.resize(new_meta_len, EntityMeta::EMPTY);
            self.len += (-current_free_cursor) as u32;
            for (index, meta) in self.meta.iter_mut().enumerate().skip(old_meta_len) {
                init(
                    Entity {
                        index: index as u32,
                        generation: meta.generation,
                    },
                    &mut meta.location,
                );
            }
            *free_cursor = 0;
            0
        };

        self.len += (self.pending.len() - new_free_cursor) as u32;
        for index in self.pending.drain(new_free_cursor..) {
            let meta = &mut self.meta[index as usize];
            init(
                Entity {
                    index,
                    generation: meta.generation,
                },
                &mut meta.location,
            );
        }
    }

    /// Flushes all reservations to the invalid sentinel.
    ///
    /// Used when reserved entities must become addressable before their
    /// storage exists.
    pub fn flush_as_invalid(&mut self) {
        self.flush(|_entity, location| {
            *location = EntityLocation::INVALID;
        });
    }

    /// Panics if reservations are pending.
    ///
    /// Row-mutating operations call this first: running them with a pending
    /// flush is a programming error because reserved indices would alias
    /// rows created during the operation.
    pub fn verify_flushed(&mut self) {
        assert!(
            !self.needs_flush(),
            "flush() needs to be called before this operation is legal"
        );
    }

    #[inline]
    fn needs_flush(&mut self) -> bool {
        *self.free_cursor.get_mut() != self.pending.len() as i64
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Returns `true` if no entities are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of slots ever allocated, live or free.
    #[inline]
    pub fn total_count(&self) -> usize {
        self.meta.len()
    }

    /// Frees every entity and resets the free list.
    pub fn clear(&mut self) {
        self.meta.clear();
        self.pending.clear();
        *self.free_cursor.get_mut() = 0;
        self.len = 0;
    }
}
