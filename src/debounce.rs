//! Adaptive debounce for preview renders
//!
//! The delay between the last edit and the next render grows with document
//! size on a cold start, then follows the observed render cost once enough
//! samples exist. Rapid typing pushes the delay toward the upper bound.

use crate::history::SampleHistory;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cold-start delays by document size in bytes: `(exclusive upper bound, delay ms)`
const SIZE_TIERS: &[(usize, u64)] = &[
    (5_000, 50),
    (50_000, 150),
    (200_000, 300),
    (500_000, 600),
];

/// Consecutive quick edits before typing counts as a burst
const BURST_MIN_EDITS: u32 = 3;

/// Debounce tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// When false every edit renders on the next tick
    pub enabled: bool,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Render durations kept for the rolling average
    pub history_size: usize,
    /// Samples required before leaving the size tiers
    pub min_samples: usize,
    /// Edits closer together than this are part of a burst
    pub burst_interval_ms: u64,
    /// Delay as a multiple of the average render time
    pub render_cost_factor: f64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: 50,
            max_delay_ms: 1000,
            history_size: 10,
            min_samples: 3,
            burst_interval_ms: 150,
            render_cost_factor: 1.5,
        }
    }
}

/// Snapshot of debouncer state for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebouncerStats {
    pub enabled: bool,
    pub samples: usize,
    pub average_render_ms: Option<f64>,
    pub last_delay_ms: u64,
    pub in_burst: bool,
    pub cold_start: bool,
}

/// Computes how long to wait after an edit before rendering
#[derive(Debug, Clone)]
pub struct AdaptiveDebouncer {
    config: DebounceConfig,
    render_times: SampleHistory<Duration>,
    last_edit: Option<Instant>,
    rapid_edits: u32,
    last_delay: Duration,
}

impl AdaptiveDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        let render_times = SampleHistory::with_max_size(config.history_size);
        Self {
            config,
            render_times,
            last_edit: None,
            rapid_edits: 0,
            last_delay: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DebounceConfig) {
        self.render_times.set_max_size(config.history_size);
        self.config = config;
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Toggle debouncing; history from the other mode is meaningless, so clear it
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.config.enabled != enabled {
            self.config.enabled = enabled;
            self.reset();
        }
    }

    /// Delay to wait before rendering a document of `document_size` bytes
    pub fn calculate_delay(&mut self, document_size: usize) -> Duration {
        if !self.config.enabled {
            self.last_delay = Duration::ZERO;
            return Duration::ZERO;
        }

        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);

        let base_ms = match self.adaptive_delay_ms() {
            Some(ms) => ms,
            None => Self::tier_delay_ms(document_size, max),
        };
        let mut delay_ms = base_ms.clamp(min, max);

        if self.in_burst() {
            // Lean toward the long end while the user is still typing
            delay_ms += (max - delay_ms) / 2;
        }

        debug!(
            document_size,
            delay_ms,
            samples = self.render_times.len(),
            burst = self.in_burst(),
            "debounce delay"
        );

        self.last_delay = Duration::from_millis(delay_ms);
        self.last_delay
    }

    /// Record an edit at the current time
    pub fn on_text_changed(&mut self) {
        self.on_text_changed_at(Instant::now());
    }

    /// Record an edit at `now`
    pub fn on_text_changed_at(&mut self, now: Instant) {
        let burst_window = Duration::from_millis(self.config.burst_interval_ms);
        self.rapid_edits = match self.last_edit {
            Some(last) if now.saturating_duration_since(last) < burst_window => {
                self.rapid_edits.saturating_add(1)
            }
            _ => 0,
        };
        self.last_edit = Some(now);
    }

    /// Fold an observed render duration into the history
    pub fn on_render_complete(&mut self, duration: Duration) {
        self.render_times.push(duration);
    }

    /// Forget render history and typing state
    pub fn reset(&mut self) {
        self.render_times.clear();
        self.last_edit = None;
        self.rapid_edits = 0;
        self.last_delay = Duration::ZERO;
    }

    pub fn in_burst(&self) -> bool {
        self.rapid_edits >= BURST_MIN_EDITS
    }

    pub fn stats(&self) -> DebouncerStats {
        DebouncerStats {
            enabled: self.config.enabled,
            samples: self.render_times.len(),
            average_render_ms: self
                .render_times
                .average()
                .map(|avg| avg.as_secs_f64() * 1000.0),
            last_delay_ms: self.last_delay.as_millis() as u64,
            in_burst: self.in_burst(),
            cold_start: self.is_cold(),
        }
    }

    fn is_cold(&self) -> bool {
        self.render_times.len() < self.config.min_samples.max(1)
    }

    fn adaptive_delay_ms(&self) -> Option<u64> {
        if self.is_cold() {
            return None;
        }
        let average = self.render_times.average()?;
        let scaled = average.as_secs_f64() * 1000.0 * self.config.render_cost_factor.max(0.0);
        Some(scaled.round() as u64)
    }

    fn tier_delay_ms(document_size: usize, max_ms: u64) -> u64 {
        SIZE_TIERS
            .iter()
            .find(|(limit, _)| document_size < *limit)
            .map(|(_, ms)| *ms)
            .unwrap_or(max_ms)
    }
}

impl Default for AdaptiveDebouncer {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}

/// Single-shot cooperative timer
///
/// Restarting replaces the deadline, so at most one render is ever pending.
#[derive(Debug, Default, Clone)]
pub struct DebounceTimer {
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)arm the timer
    pub fn start(&mut self, delay: Duration, now: Instant) {
        self.deadline = Some(now + delay);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before firing
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Disarm and return true if the deadline has passed
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_start_tiers() {
        let mut debouncer = AdaptiveDebouncer::default();
        assert_eq!(debouncer.calculate_delay(100), Duration::from_millis(50));
        assert_eq!(debouncer.calculate_delay(20_000), Duration::from_millis(150));
        assert_eq!(debouncer.calculate_delay(100_000), Duration::from_millis(300));
        assert_eq!(debouncer.calculate_delay(400_000), Duration::from_millis(600));
        assert_eq!(debouncer.calculate_delay(10_000_000), Duration::from_millis(1000));
    }

    #[test]
    fn test_adaptive_after_samples() {
        let mut debouncer = AdaptiveDebouncer::default();
        for _ in 0..3 {
            debouncer.on_render_complete(Duration::from_millis(200));
        }
        // 200ms average * 1.5
        assert_eq!(debouncer.calculate_delay(100), Duration::from_millis(300));
        assert!(!debouncer.stats().cold_start);
    }

    #[test]
    fn test_adaptive_is_clamped() {
        let mut debouncer = AdaptiveDebouncer::default();
        for _ in 0..5 {
            debouncer.on_render_complete(Duration::from_secs(5));
        }
        assert_eq!(debouncer.calculate_delay(100), Duration::from_millis(1000));

        debouncer.reset();
        for _ in 0..5 {
            debouncer.on_render_complete(Duration::from_micros(10));
        }
        assert_eq!(debouncer.calculate_delay(100), Duration::from_millis(50));
    }

    #[test]
    fn test_burst_leans_long() {
        let mut debouncer = AdaptiveDebouncer::default();
        let start = Instant::now();
        for i in 0..5 {
            debouncer.on_text_changed_at(start + Duration::from_millis(i * 30));
        }
        assert!(debouncer.in_burst());
        // Tier says 50ms, burst moves halfway to 1000ms
        assert_eq!(debouncer.calculate_delay(100), Duration::from_millis(525));

        // A pause ends the burst
        debouncer.on_text_changed_at(start + Duration::from_secs(2));
        assert!(!debouncer.in_burst());
    }

    #[test]
    fn test_disabled_is_immediate() {
        let mut debouncer = AdaptiveDebouncer::default();
        debouncer.on_render_complete(Duration::from_millis(400));
        debouncer.set_enabled(false);
        assert_eq!(debouncer.stats().samples, 0);
        assert_eq!(debouncer.calculate_delay(1_000_000), Duration::ZERO);
    }

    #[test]
    fn test_timer_is_single_shot() {
        let mut timer = DebounceTimer::new();
        let now = Instant::now();
        timer.start(Duration::from_millis(100), now);
        timer.start(Duration::from_millis(200), now);

        assert!(!timer.fire_if_due(now + Duration::from_millis(150)));
        assert!(timer.fire_if_due(now + Duration::from_millis(200)));
        assert!(!timer.is_active());
        assert!(!timer.fire_if_due(now + Duration::from_millis(400)));
    }
}
