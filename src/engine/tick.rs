//! Tick-based change detection.
//!
//! Every column row and every resource slot carries two [`Tick`]s: the tick
//! at which the value was added and the tick at which it last changed. A
//! system compares those against its own `(last_run, this_run)` window to
//! decide whether a value is new to it.
//!
//! ## Wraparound safety
//!
//! The world tick is a `u32` that eventually wraps. All comparisons are
//! therefore performed on **ages** — `this_run - candidate`, computed with
//! wrapping subtraction and clamped to [`MAX_CHANGE_AGE`] — never on raw
//! values. This stays correct across wraparound as long as a periodic
//! [`Tick::check_tick`] scan runs at least once every [`CHECK_TICK_THRESHOLD`]
//! ticks: the threshold is chosen so that `2 * threshold - 1` ticks can
//! elapse between two scans without an age escaping the clamp window.
//!
//! The scan rebases any tick older than [`MAX_CHANGE_AGE`] to exactly that
//! age, which also serves as a soft-integrity signal: a system whose
//! `last_run` needed rebasing has not run for a very long time, and the
//! scheduler logs a warning for it.

use crate::engine::types::ComponentId;

/// The maximum number of ticks that may elapse between two
/// `check_change_ticks` scans without risking false change-detection
/// positives.
pub const CHECK_TICK_THRESHOLD: u32 = 518_400_000;

/// Maximum age a tick may report. Ages are clamped here, and ticks older
/// than this are rebased by the periodic scan.
pub const MAX_CHANGE_AGE: u32 = u32::MAX - (2 * CHECK_TICK_THRESHOLD - 1);

/// A value of the world's monotonically increasing (and wrapping) counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tick {
    tick: u32,
}

impl Tick {
    /// The tick at maximum permitted age.
    pub const MAX: Tick = Tick::new(MAX_CHANGE_AGE);

    /// Creates a tick from a raw counter value.
    #[inline]
    pub const fn new(tick: u32) -> Self {
        Self { tick }
    }

    /// Returns the raw counter value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.tick
    }

    /// Overwrites the raw counter value.
    #[inline]
    pub fn set(&mut self, tick: u32) {
        self.tick = tick;
    }

    /// Returns the number of ticks from `other` to `self`, as a tick.
    ///
    /// The subtraction wraps, so the result is meaningful whenever fewer
    /// than `u32::MAX` ticks separate the two values.
    #[inline]
    pub const fn relative_to(self, other: Tick) -> Tick {
        Tick {
            tick: self.tick.wrapping_sub(other.tick),
        }
    }

    /// Returns `true` if this tick occurred since the system's `last_run`.
    ///
    /// ## Behavior
    /// Both the candidate tick and `last_run` are converted to ages relative
    /// to `this_run` and clamped to [`MAX_CHANGE_AGE`]; the candidate is
    /// newer when its age is strictly smaller. Comparing ages rather than
    /// raw values keeps the test correct across counter wraparound.
    #[inline]
    pub fn is_newer_than(self, last_run: Tick, this_run: Tick) -> bool {
        let ticks_since_insert = this_run.relative_to(self).get().min(MAX_CHANGE_AGE);
        let ticks_since_system = this_run.relative_to(last_run).get().min(MAX_CHANGE_AGE);
        ticks_since_system > ticks_since_insert
    }

    /// Clamps this tick's age relative to `tick` to [`MAX_CHANGE_AGE`].
    ///
    /// Returns `true` if the tick was stale and had to be rebased. Callers
    /// use the return value to warn about values (or systems) that have not
    /// been touched in a very long time.
    pub fn check_tick(&mut self, tick: Tick) -> bool {
        let age = tick.relative_to(*self);
        if age.get() > MAX_CHANGE_AGE {
            *self = tick.relative_to(Tick::MAX);
            true
        } else {
            false
        }
    }
}

/// The pair of change-detection ticks carried by every component row and
/// resource slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentTicks {
    /// Tick at which the value was inserted.
    pub added: Tick,
    /// Tick at which the value was last written.
    pub changed: Tick,
}

impl ComponentTicks {
    /// Ticks for a freshly inserted value: added and changed both stamp the
    /// current change tick.
    #[inline]
    pub fn new(change_tick: Tick) -> Self {
        Self {
            added: change_tick,
            changed: change_tick,
        }
    }

    /// Returns `true` if the value was added after the system's last run.
    #[inline]
    pub fn is_added(&self, last_run: Tick, this_run: Tick) -> bool {
        self.added.is_newer_than(last_run, this_run)
    }

    /// Returns `true` if the value was written after the system's last run.
    #[inline]
    pub fn is_changed(&self, last_run: Tick, this_run: Tick) -> bool {
        self.changed.is_newer_than(last_run, this_run)
    }

    /// Stamps the changed tick.
    #[inline]
    pub fn set_changed(&mut self, change_tick: Tick) {
        self.changed = change_tick;
    }

    /// Rebases both ticks against the current change tick.
    pub fn check_ticks(&mut self, change_tick: Tick) {
        self.added.check_tick(change_tick);
        self.changed.check_tick(change_tick);
    }
}

/// Rebases a slice of per-row ticks, logging when any row was stale.
///
/// Shared by table columns and sparse sets during the periodic scan; the
/// component id only feeds the log line.
pub(crate) fn check_tick_slice(ticks: &mut [Tick], change_tick: Tick, component_id: ComponentId) {
    let mut rebased = 0usize;
    for tick in ticks.iter_mut() {
        if tick.check_tick(change_tick) {
            rebased += 1;
        }
    }
    if rebased > 0 {
        log::debug!(
            "rebased {rebased} stale change tick(s) for component {component_id} during periodic scan"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_than_simple_window() {
        let last_run = Tick::new(10);
        let this_run = Tick::new(50);
        assert!(Tick::new(30).is_newer_than(last_run, this_run));
        assert!(!Tick::new(5).is_newer_than(last_run, this_run));
        // The last_run tick itself is not newer than the window start.
        assert!(!Tick::new(10).is_newer_than(last_run, this_run));
    }

    #[test]
    fn newer_than_across_wraparound() {
        // this_run has wrapped past zero; the change happened shortly before
        // the wrap, the system last ran long before that.
        let this_run = Tick::new(100);
        let change = Tick::new(u32::MAX - 50);
        let last_run = Tick::new(u32::MAX - 1_000_000);
        assert!(change.is_newer_than(last_run, this_run));
        assert!(!last_run.is_newer_than(change, this_run));
    }

    #[test]
    fn check_tick_rebases_only_stale() {
        let clock = Tick::new(MAX_CHANGE_AGE + 500);
        let mut fresh = Tick::new(600);
        assert!(!fresh.check_tick(clock));
        assert_eq!(fresh.get(), 600);

        let mut stale = Tick::new(0);
        assert!(stale.check_tick(clock));
        // Rebased to exactly MAX_CHANGE_AGE old.
        assert_eq!(clock.relative_to(stale).get(), MAX_CHANGE_AGE);
    }
}
