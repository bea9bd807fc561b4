//! Timing utilities.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Logs frames per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    pub fn tick(&mut self) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!("{}: {} FPS", self.name, self.frames);

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

/// Hands out strictly increasing millisecond timestamps based on the wall clock.
///
/// Live-stream detection rejects a timestamp that is not greater than the previous one, which the
/// wall clock alone does not guarantee (two frames within the same millisecond, clock
/// adjustments). Such timestamps are bumped to one past the previous value.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: AtomicU64,
}

impl FrameClock {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the next timestamp, in milliseconds since the UNIX epoch.
    pub fn now_ms(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        self.next_after(wall)
    }

    fn next_after(&self, candidate: u64) -> u64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn timestamps_strictly_increase() {
        let clock = FrameClock::new();
        assert_eq!(clock.next_after(100), 100);
        assert_eq!(clock.next_after(100), 101);
        assert_eq!(clock.next_after(50), 102);
        assert_eq!(clock.next_after(500), 500);
    }

    #[test]
    fn wall_clock_timestamps_are_unique_across_threads() {
        let clock = Arc::new(FrameClock::new());
        let handles = (0..4)
            .map(|_| {
                let clock = clock.clone();
                thread::spawn(move || (0..500).map(|_| clock.now_ms()).collect::<Vec<_>>())
            })
            .collect::<Vec<_>>();

        let mut all = Vec::new();
        for handle in handles {
            let stamps = handle.join().unwrap();
            assert!(stamps.windows(2).all(|w| w[0] < w[1]));
            all.extend(stamps);
        }
        let len = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), len);
    }

    #[test]
    fn fps_counter_resets_after_a_second() {
        let mut fps = FpsCounter::new("test");
        fps.start -= Duration::from_secs(2);
        fps.tick();
        assert_eq!(fps.frames, 0);
        fps.tick();
        assert_eq!(fps.frames, 1);
    }
}
