//! Bounded rolling history of samples
//!
//! Keeps the most recent `max_size` observations; the oldest sample falls off
//! when a new one arrives at capacity.

use std::collections::VecDeque;
use std::time::Duration;

/// Fixed-capacity sample window
#[derive(Debug, Clone)]
pub struct SampleHistory<T> {
    samples: VecDeque<T>,
    /// Maximum history size
    max_size: usize,
}

impl<T> SampleHistory<T> {
    pub fn new() -> Self {
        Self::with_max_size(10)
    }

    /// Capacity is at least one so a push never has to be dropped outright
    pub fn with_max_size(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            samples: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Record a sample, evicting the oldest at capacity
    pub fn push(&mut self, sample: T) {
        if self.samples.len() == self.max_size {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    /// Change capacity, dropping the oldest samples if shrinking
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size.max(1);
        while self.samples.len() > self.max_size {
            self.samples.pop_front();
        }
    }
}

impl SampleHistory<Duration> {
    /// Mean of the window, `None` when empty
    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }
}

impl<T> Default for SampleHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut history = SampleHistory::with_max_size(3);
        for i in 0..5 {
            history.push(i);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(history.latest(), Some(&4));
    }

    #[test]
    fn test_average_of_empty_is_none() {
        let history: SampleHistory<Duration> = SampleHistory::new();
        assert_eq!(history.average(), None);
    }

    #[test]
    fn test_average() {
        let mut history = SampleHistory::with_max_size(4);
        history.push(Duration::from_millis(100));
        history.push(Duration::from_millis(300));
        assert_eq!(history.average(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let mut history = SampleHistory::with_max_size(0);
        history.push(1);
        history.push(2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest(), Some(&2));

        history.set_max_size(0);
        assert_eq!(history.max_size(), 1);
    }
}
