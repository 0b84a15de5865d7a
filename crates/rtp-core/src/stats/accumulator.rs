//! Sliding time window accumulator
//!
//! Keeps the values added during the last `window` milliseconds. Used for
//! instant bitrates (bytes per window), frame rates and wait-time statistics.

use std::collections::VecDeque;

/// Time-windowed value accumulator
#[derive(Debug, Clone)]
pub struct Accumulator {
    /// Window length in milliseconds
    window: u64,
    /// (time, value) pairs inside the window, oldest first
    values: VecDeque<(u64, u64)>,
    /// Sum of all values ever added
    accumulated: u64,
    /// Sum of the values inside the window
    instant: u64,
    /// Largest instant sum seen
    max: u64,
    /// Smallest instant sum seen once the window was full
    min: Option<u64>,
    /// Time of the first update
    first: Option<u64>,
    /// Time of the last update
    last: u64,
    /// Whether a full window has elapsed
    in_window: bool,
}

impl Accumulator {
    /// Create an accumulator with a window in milliseconds
    pub fn new(window: u64) -> Self {
        Self {
            window,
            values: VecDeque::new(),
            accumulated: 0,
            instant: 0,
            max: 0,
            min: None,
            first: None,
            last: 0,
            in_window: false,
        }
    }

    /// Add a value at `now` and return the instant sum
    pub fn update(&mut self, now: u64, value: u64) -> u64 {
        self.accumulated += value;
        self.instant += value;
        self.values.push_back((now, value));
        self.evict(now);

        self.first.get_or_insert(now);
        self.last = now;

        self.max = self.max.max(self.instant);
        if self.in_window {
            self.min = Some(self.min.map_or(self.instant, |min| min.min(self.instant)));
        }
        self.instant
    }

    /// Drop values that left the window without adding a new one
    pub fn refresh(&mut self, now: u64) -> u64 {
        self.evict(now);
        self.instant
    }

    fn evict(&mut self, now: u64) {
        while let Some(&(time, value)) = self.values.front() {
            if time + self.window >= now {
                break;
            }
            self.instant -= value;
            self.values.pop_front();
            self.in_window = true;
        }
    }

    /// Clear everything
    pub fn reset(&mut self) {
        *self = Self::new(self.window);
    }

    /// Window length in milliseconds
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Sum of all values ever added
    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    /// Sum of the values inside the window
    pub fn instant(&self) -> u64 {
        self.instant
    }

    /// Number of values inside the window
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Largest instant sum seen
    pub fn max(&self) -> u64 {
        self.max
    }

    /// Smallest instant sum seen after the first full window
    pub fn min(&self) -> Option<u64> {
        self.min
    }

    /// Whether a full window has elapsed
    pub fn is_in_window(&self) -> bool {
        self.in_window
    }

    /// Instant sum scaled to one second
    pub fn instant_avg(&self) -> f64 {
        if self.window == 0 {
            return 0.0;
        }
        self.instant as f64 * 1000.0 / self.window as f64
    }

    /// Mean of the values inside the window
    pub fn instant_media(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.instant as f64 / self.values.len() as f64
    }

    /// Smallest single value inside the window
    pub fn min_value_in_window(&self) -> Option<u64> {
        self.values.iter().map(|&(_, value)| value).min()
    }

    /// Largest single value inside the window
    pub fn max_value_in_window(&self) -> Option<u64> {
        self.values.iter().map(|&(_, value)| value).max()
    }
}
