//! Bidirectional scroll synchronisation with loop protection
//!
//! Scrolling one pane moves the other by percentage. Moving the other pane
//! usually produces a scroll event of its own, so three guards keep the two
//! scrollbars from chasing each other:
//! 1. an in-progress flag that rejects re-entrant calls
//! 2. a per-update counter that trips after `MAX_SYNC_ITERATIONS`
//! 3. coalescing of deltas below `COALESCE_THRESHOLD_PX`
//!
//! All state is single-threaded; `Cell` is enough.

use crate::error::PreviewError;
use std::cell::Cell;
use tracing::{debug, warn};

/// Applied syncs allowed in one logical update before the cycle is aborted
pub const MAX_SYNC_ITERATIONS: u32 = 100;

/// Scroll deltas smaller than this (px) are ignored
pub const COALESCE_THRESHOLD_PX: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    EditorToPreview,
    PreviewToEditor,
}

impl SyncDirection {
    fn index(self) -> usize {
        match self {
            SyncDirection::EditorToPreview => 0,
            SyncDirection::PreviewToEditor => 1,
        }
    }

    fn opposite(self) -> Self {
        match self {
            SyncDirection::EditorToPreview => SyncDirection::PreviewToEditor,
            SyncDirection::PreviewToEditor => SyncDirection::EditorToPreview,
        }
    }
}

/// What a sync call did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// The other side was moved to this percentage
    Applied(f64),
    Disabled,
    /// Another sync is running
    Busy,
    /// Delta below the coalescing threshold
    Coalesced,
    /// Loop guard tripped for this update
    LoopAborted,
    /// The source side cannot report a position
    Unsupported,
}

impl SyncOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SyncOutcome::Applied(_))
    }
}

/// Clears the in-progress flag on every exit path
struct SyncGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Scroll sync state owned by the pipeline
#[derive(Debug)]
pub struct ScrollSync {
    enabled: Cell<bool>,
    in_progress: Cell<bool>,
    iterations: Cell<u32>,
    tripped: Cell<bool>,
    /// Last source value seen per direction (px)
    last_values: [Cell<Option<i32>>; 2],
    aborted_loops: Cell<u64>,
}

impl ScrollSync {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Cell::new(enabled),
            in_progress: Cell::new(false),
            iterations: Cell::new(0),
            tripped: Cell::new(false),
            last_values: [Cell::new(None), Cell::new(None)],
            aborted_loops: Cell::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
        self.forget_positions();
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.get()
    }

    /// Number of loops aborted so far
    pub fn aborted_loops(&self) -> u64 {
        self.aborted_loops.get()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Close the current logical update and re-arm the loop guard
    pub fn end_update(&self) {
        self.iterations.set(0);
        self.tripped.set(false);
    }

    /// Synchronise `value` out of `maximum` on the source side of `direction`
    ///
    /// `apply` receives the percentage and moves the other side; it returns
    /// the resulting pixel value there if known, so the echo event coming
    /// back from that side is coalesced.
    pub fn sync<F>(&self, direction: SyncDirection, value: i32, maximum: i32, apply: F) -> SyncOutcome
    where
        F: FnOnce(f64) -> Option<i32>,
    {
        if !self.enabled.get() {
            return SyncOutcome::Disabled;
        }
        let Some(_guard) = SyncGuard::acquire(&self.in_progress) else {
            return SyncOutcome::Busy;
        };
        if self.tripped.get() {
            return SyncOutcome::LoopAborted;
        }

        let last = &self.last_values[direction.index()];
        if let Some(previous) = last.get() {
            if value.abs_diff(previous) < COALESCE_THRESHOLD_PX.unsigned_abs() {
                return SyncOutcome::Coalesced;
            }
        }

        let iterations = self.iterations.get() + 1;
        self.iterations.set(iterations);
        if iterations > MAX_SYNC_ITERATIONS {
            self.trip(iterations);
            return SyncOutcome::LoopAborted;
        }

        last.set(Some(value));
        let percentage = scroll_percentage(value, maximum);
        if let Some(target) = apply(percentage) {
            self.last_values[direction.opposite().index()].set(Some(target));
        }

        debug!(?direction, value, maximum, percentage, "scroll synced");
        SyncOutcome::Applied(percentage)
    }

    fn trip(&self, iterations: u32) {
        let err = PreviewError::ScrollLoopDetected { iterations };
        warn!(error = %err, "breaking scroll sync loop");
        self.tripped.set(true);
        self.aborted_loops.set(self.aborted_loops.get() + 1);
        self.forget_positions();
    }

    fn forget_positions(&self) {
        for last in &self.last_values {
            last.set(None);
        }
    }
}

impl Default for ScrollSync {
    fn default() -> Self {
        Self::new(true)
    }
}

/// `value / maximum` in `[0, 1]`; zero when there is nothing to scroll
pub fn scroll_percentage(value: i32, maximum: i32) -> f64 {
    if maximum <= 0 {
        return 0.0;
    }
    (value as f64 / maximum as f64).clamp(0.0, 1.0)
}
