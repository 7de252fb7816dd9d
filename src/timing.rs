use std::time::{Duration, Instant};

pub struct FrameTiming {
    previous: Option<Instant>,
    window_start: Instant,
    window_frames: u32,
    pub frame_dt: f32,
    fps: f32,
    frames_total: u64,
}

impl FrameTiming {
    pub fn new() -> Self {
        Self {
            previous: None,
            window_start: Instant::now(),
            window_frames: 0,
            frame_dt: 1.0 / 60.0,
            fps: 0.0,
            frames_total: 0,
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total
    }

    /// Advances the clock by one frame. Returns the fresh fps value every
    /// half second, `None` in between.
    pub fn update(&mut self, now: Instant) -> Option<f32> {
        let dt = if let Some(last) = self.previous {
            now.saturating_duration_since(last)
        } else {
            Duration::from_millis(16)
        };
        self.previous = Some(now);
        self.frame_dt = dt.as_secs_f32().max(0.0);
        self.frames_total = self.frames_total.saturating_add(1);

        self.window_frames = self.window_frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed.as_secs_f32() >= 0.5 {
            self.fps = self.window_frames as f32 / elapsed.as_secs_f32();
            self.window_frames = 0;
            self.window_start = now;
            log::debug!(
                "{:.1} fps (cadence {:.2} ms)",
                self.fps,
                (self.frame_dt * 1000.0).max(0.0)
            );
            return Some(self.fps);
        }
        None
    }
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new()
    }
}
