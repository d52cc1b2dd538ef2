//! Core identifiers and access-set types shared across the engine.
//!
//! This module defines the **fundamental identifier types and capacity
//! constants** used throughout the storage and scheduling core. These
//! definitions form the semantic backbone of the system and are shared across
//! entity management, archetypes, tables, bundles, queries, and scheduling.
//!
//! ## Design Philosophy
//!
//! The engine is designed around:
//!
//! - **Dense, append-only identifiers** — components, archetypes, tables, and
//!   bundles are all addressed by small integers assigned once and never
//!   reassigned within a process.
//! - **Arena-indexed cross references** — entities, archetypes, and tables are
//!   parallel arenas; every "pointer" between them is a plain index that is
//!   re-validated against a generation counter, never a language reference.
//! - **Bitset-based access sets** — system read/write declarations are packed
//!   component bitsets so conflict detection is a handful of word operations.
//!
//! ## Identifier spaces
//!
//! | Alias | Addresses | Assigned by |
//! |---|---|---|
//! | [`ComponentId`] | a registered component or resource type | `Components` |
//! | [`ArchetypeId`] | a unique component-set node | `Archetypes` |
//! | [`TableId`] | a dense column store | `Tables` |
//! | [`BundleId`] | a registered bundle type | `Bundles` |
//!
//! Row indices ([`ArchetypeRow`], [`TableRow`]) are positions inside the
//! owning arena and are only meaningful together with the arena id; both are
//! invalidated by swap-remove and must be re-read from the entity allocator
//! after any structural operation.

/// Identifier for a registered component or resource type.
///
/// Ids are dense, append-only, and never reassigned to a different type
/// within a process. Resources share the numeric space but are looked up
/// through a separate index.
pub type ComponentId = usize;

/// Identifier for an archetype (one node per unique component set).
pub type ArchetypeId = usize;

/// Row index inside an archetype's entity list.
pub type ArchetypeRow = usize;

/// Identifier for a table (columnar storage shared by archetypes with an
/// identical table-component set).
pub type TableId = usize;

/// Row index inside a table.
pub type TableRow = usize;

/// Identifier for a registered bundle type.
pub type BundleId = usize;

/// The archetype containing entities with no components.
pub const EMPTY_ARCHETYPE: ArchetypeId = 0;

/// The table backing the empty archetype.
pub const EMPTY_TABLE: TableId = 0;

/// Sentinel archetype id used by invalid entity locations.
pub const INVALID_ARCHETYPE: ArchetypeId = usize::MAX;

/// Sentinel row index used by invalid entity locations.
pub const INVALID_ROW: usize = usize::MAX;

/// A growable bitset over [`ComponentId`]s.
///
/// ## Purpose
/// Backs system access declarations and query filters: membership tests and
/// pairwise intersection checks are word-level operations regardless of how
/// many components are registered.
///
/// ## Invariants
/// - Bits beyond the highest inserted id read as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentSet {
    words: Vec<u64>,
}

impl ComponentSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn insert(&mut self, component_id: ComponentId) {
        let word = component_id / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (component_id % 64);
    }

    /// Returns `true` if `component_id` is present.
    #[inline]
    pub fn contains(&self, component_id: ComponentId) -> bool {
        let word = component_id / 64;
        self.words
            .get(word)
            .is_some_and(|bits| (bits >> (component_id % 64)) & 1 == 1)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns `true` if the two sets share no component.
    #[inline]
    pub fn is_disjoint(&self, other: &ComponentSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    /// Iterates over all component ids set in this bitset.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(base + tz)
            })
        })
    }
}

/// Declared component access of a system or query.
///
/// ## Purpose
/// Conflict detection between systems that lack an explicit ordering: two
/// access sets conflict when one writes a component the other reads or
/// writes. The schedule builder treats such pairs as ambiguities.
#[derive(Clone, Debug, Default)]
pub struct Access {
    /// Components read.
    pub reads: ComponentSet,
    /// Components written.
    pub writes: ComponentSet,
}

impl Access {
    /// Returns `true` if this access set conflicts with another.
    ///
    /// Conflicts if: (W ∩ W) or (W ∩ R) or (R ∩ W).
    #[inline]
    pub fn conflicts_with(&self, other: &Access) -> bool {
        !self.writes.is_disjoint(&other.writes)
            || !self.writes.is_disjoint(&other.reads)
            || !self.reads.is_disjoint(&other.writes)
    }

    /// Components involved in a conflict with `other`, for diagnostics.
    pub fn conflicting_components(&self, other: &Access) -> Vec<ComponentId> {
        let mut out: Vec<ComponentId> = self
            .writes
            .iter()
            .filter(|&id| other.writes.contains(id) || other.reads.contains(id))
            .collect();
        out.extend(
            self.reads
                .iter()
                .filter(|&id| other.writes.contains(id)),
        );
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_set_membership() {
        let mut set = ComponentSet::new();
        set.insert(3);
        set.insert(200);
        assert!(set.contains(3));
        assert!(set.contains(200));
        assert!(!set.contains(4));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 200]);
    }

    #[test]
    fn access_conflicts() {
        let mut a = Access::default();
        let mut b = Access::default();
        a.writes.insert(7);
        b.reads.insert(7);
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));

        let mut c = Access::default();
        c.reads.insert(7);
        let mut d = Access::default();
        d.reads.insert(7);
        assert!(!c.conflicts_with(&d));
    }

    #[test]
    fn conflicting_components_lists_the_overlap() {
        let mut a = Access::default();
        a.writes.insert(3);
        a.reads.insert(9);
        let mut b = Access::default();
        b.reads.insert(3);
        b.writes.insert(9);
        b.writes.insert(11);
        assert_eq!(a.conflicting_components(&b), vec![3, 9]);
        assert!(a.conflicting_components(&Access::default()).is_empty());
    }
}
