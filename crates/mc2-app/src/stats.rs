//! Frame-time statistics reported at shutdown.

/// Running min, max and average FPS.
#[derive(Debug, Clone)]
pub struct FrameStats {
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    samples: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            samples: 0,
        }
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame that took `dt` seconds. Zero-length frames are ignored.
    pub fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn min_fps(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.min_fps)
    }

    pub fn max_fps(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.max_fps)
    }

    pub fn average_fps(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.fps_sum / self.samples as f64)
    }

    /// Log the summary, alongside the number of frames actually presented.
    pub fn log(&self, frames_presented: u64) {
        let (Some(min), Some(max), Some(avg)) =
            (self.min_fps(), self.max_fps(), self.average_fps())
        else {
            return;
        };
        tracing::info!("FPS Statistics:");
        tracing::info!("  Min: {min:.1}");
        tracing::info!("  Max: {max:.1}");
        tracing::info!("  Avg: {avg:.1}");
        tracing::info!("  Total frames: {frames_presented}");
    }
}
