// Frame timing
//
// Delta time is clamped so a stall (debugger, window drag, hitch) does
// not turn into one giant simulation step.

use std::time::Instant;

const MAX_DELTA_SECONDS: f32 = 0.2;

/// Clamp a raw frame delta to the maximum step.
pub fn clamp_delta(delta: f32) -> f32 {
    delta.min(MAX_DELTA_SECONDS)
}

pub struct FrameClock {
    previous: Instant,
    delta: f32,
    elapsed: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            previous: Instant::now(),
            delta: 0.01,
            elapsed: 0.0,
        }
    }

    /// Call once per frame, before updates that consume delta time.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = clamp_delta(now.duration_since(self.previous).as_secs_f32());
        self.previous = now;
        self.elapsed += self.delta;
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_deltas_pass_through() {
        assert_eq!(clamp_delta(0.016), 0.016);
        assert_eq!(clamp_delta(0.0), 0.0);
    }

    #[test]
    fn large_deltas_are_clamped() {
        assert_eq!(clamp_delta(0.5), MAX_DELTA_SECONDS);
        assert_eq!(clamp_delta(1000.0), MAX_DELTA_SECONDS);
        assert_eq!(clamp_delta(MAX_DELTA_SECONDS), MAX_DELTA_SECONDS);
    }

    #[test]
    fn clock_accumulates_elapsed_time() {
        let mut clock = FrameClock::new();
        let before = clock.elapsed();
        clock.tick();
        assert!(clock.elapsed() >= before);
        assert!(clock.delta() <= MAX_DELTA_SECONDS);
    }
}
