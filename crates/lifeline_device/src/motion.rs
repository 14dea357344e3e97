#![forbid(unsafe_code)]

use lifeline_contracts::EpochTimeMs;

use crate::signal_cache::SharedSignalCache;

/// Consecutive 3-axis delta magnitude above this registers as movement
/// (raw sensor units).
pub const MOVEMENT_DELTA_THRESHOLD: f32 = 1.5;
/// Minimum spacing between two registered movement events.
pub const MOVEMENT_DEBOUNCE_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Turns raw accelerometer samples into movement timestamps on the signal
/// cache. Samples are compared pairwise; the first sample only seeds the
/// comparison state. The debounce keeps a jitter burst from being counted
/// as many movement events.
#[derive(Debug)]
pub struct MotionDetector {
    cache: SharedSignalCache,
    previous: Option<AccelSample>,
    last_registered_at: Option<EpochTimeMs>,
}

impl MotionDetector {
    pub fn new(cache: SharedSignalCache) -> Self {
        Self {
            cache,
            previous: None,
            last_registered_at: None,
        }
    }

    /// Feeds one sample; returns whether a movement event was registered.
    pub fn on_sample(&mut self, sample: AccelSample, now: EpochTimeMs) -> bool {
        let registered = match self.previous {
            Some(previous) => {
                let dx = sample.x - previous.x;
                let dy = sample.y - previous.y;
                let dz = sample.z - previous.z;
                let delta = (dx * dx + dy * dy + dz * dz).sqrt();
                delta > MOVEMENT_DELTA_THRESHOLD && self.debounce_elapsed(now)
            }
            None => false,
        };
        self.previous = Some(sample);
        if registered {
            self.last_registered_at = Some(now);
            self.cache.record_movement(now);
        }
        registered
    }

    fn debounce_elapsed(&self, now: EpochTimeMs) -> bool {
        match self.last_registered_at {
            Some(at) => now.age_since(at) > MOVEMENT_DEBOUNCE_MS,
            None => true,
        }
    }
}
