//! ═══════════════════════════════════════════════════════════════════════════════
//! VISUAL — Frame-to-Frame Noise Estimation
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Turns periodic low-res camera frames into a single 0..1 "visual noise"
//! score: how much the view is fluctuating between frames, from brightness
//! shifts and edge-density churn. The gate wants a band in the middle of
//! this scale (a live, hand-held view) rather than either extreme.
//!
//! Frame capture is an external collaborator; it hands us grayscale buffers
//! or nothing at all. No frames means a neutral constant score, not an error.
//! ═══════════════════════════════════════════════════════════════════════════════

use crate::config::VisualConfig;
use crate::stats::Ewma;

/// A captured grayscale frame. One byte of luminance per pixel, row-major.
/// Construction goes through `new` so the dimensions always match the data.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn luma(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Source of low-res frames. Returns None on any capture failure
/// (no camera, no permission, busy device); never panics.
pub trait FrameSource {
    fn capture_low_res(&mut self) -> Option<PixelBuffer>;
}

/// A source with no camera at all.
pub struct NoCamera;

impl FrameSource for NoCamera {
    fn capture_low_res(&mut self) -> Option<PixelBuffer> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameMetrics {
    /// Mean luminance over the sampled grid, 0..255
    brightness: f64,
    /// Fraction of sampled pixels whose right/down neighbor differs sharply
    edge_density: f64,
}

/// Rolling estimate of visual fluctuation between consecutive frames.
pub struct VisualNoiseEstimator {
    config: VisualConfig,
    previous: Option<FrameMetrics>,
    score: Ewma,
}

impl VisualNoiseEstimator {
    pub fn new(config: VisualConfig) -> Self {
        let score = Ewma::new(config.smoothing);
        Self {
            config,
            previous: None,
            score,
        }
    }

    /// Fold one frame (or a capture failure) into the score.
    pub fn analyze(&mut self, frame: Option<&PixelBuffer>) {
        let Some(frame) = frame else {
            // Capture failed: fall back to the neutral constant.
            self.previous = None;
            self.score = Ewma::new(self.config.smoothing);
            return;
        };
        if frame.width == 0 || frame.height == 0 {
            return;
        }

        let metrics = self.measure(frame);
        if let Some(previous) = self.previous {
            let delta_brightness = (metrics.brightness - previous.brightness).abs() / 255.0;
            let delta_edges = (metrics.edge_density - previous.edge_density).abs();
            let raw = ((delta_brightness * self.config.brightness_weight
                + delta_edges * self.config.edge_weight)
                / 2.0)
                .clamp(0.0, 1.0);
            self.score.update(raw);
        }
        self.previous = Some(metrics);
    }

    /// Current 0..1 score; the neutral constant until real frames flow.
    pub fn visual_noise_score(&self) -> f64 {
        self.score.value_or(self.config.neutral_score)
    }

    /// Sample the frame on a coarse grid and measure brightness plus
    /// 4-neighbor edge density.
    fn measure(&self, frame: &PixelBuffer) -> FrameMetrics {
        let step_x = (frame.width / self.config.analysis_width).max(1);
        let step_y = (frame.height / self.config.analysis_height).max(1);
        let threshold = i32::from(self.config.edge_threshold);

        let mut total: u64 = 0;
        let mut count: u64 = 0;
        let mut edges: u64 = 0;
        let mut comparisons: u64 = 0;

        let mut y = 0;
        while y < frame.height {
            let mut x = 0;
            while x < frame.width {
                let here = i32::from(frame.luma(x, y));
                total += here as u64;
                count += 1;

                if x + step_x < frame.width {
                    comparisons += 1;
                    if (here - i32::from(frame.luma(x + step_x, y))).abs() > threshold {
                        edges += 1;
                    }
                }
                if y + step_y < frame.height {
                    comparisons += 1;
                    if (here - i32::from(frame.luma(x, y + step_y))).abs() > threshold {
                        edges += 1;
                    }
                }
                x += step_x;
            }
            y += step_y;
        }

        FrameMetrics {
            brightness: if count == 0 { 0.0 } else { total as f64 / count as f64 },
            edge_density: if comparisons == 0 {
                0.0
            } else {
                edges as f64 / comparisons as f64
            },
        }
    }
}
