/// Frame timing from a monotonic clock reading in seconds.
///
/// The first tick yields a zero delta; later ticks yield the time since the
/// previous one, never negative even if the source steps backwards.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    start: Option<f64>,
    previous: Option<f64>,
    delta: f32,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `now` and return the frame delta in seconds.
    pub fn tick(&mut self, now: f64) -> f32 {
        self.delta = match self.previous {
            Some(previous) => (now - previous).max(0.0) as f32,
            None => 0.0,
        };
        self.start.get_or_insert(now);
        self.previous = Some(match self.previous {
            Some(previous) => now.max(previous),
            None => now,
        });
        self.frames += 1;
        self.delta
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Seconds since the first tick.
    pub fn elapsed(&self) -> f32 {
        match (self.start, self.previous) {
            (Some(start), Some(previous)) => (previous - start) as f32,
            _ => 0.0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
