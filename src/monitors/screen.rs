use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mean absolute grayscale difference (0-255 scale) above which two
/// consecutive frames count as a change.
const CHANGE_THRESHOLD: f64 = 10.0;

/// Statistics derived from one screen capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenSample {
    /// Mean grayscale intensity, 0-255.
    pub brightness: f64,
    /// Standard deviation of grayscale intensities.
    pub contrast: f64,
    /// True iff a previous frame of identical dimensions existed and the
    /// frames differ by more than [CHANGE_THRESHOLD] on average.
    pub change_detected: bool,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Grayscale plane of one captured frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub gray: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Channel count of the source image the plane was derived from.
    pub channels: u8,
}

/// Intended to serve as a contract screen capture backends must implement.
#[cfg_attr(test, mockall::automock)]
pub trait ScreenGrabber: Send {
    fn grab(&mut self) -> Result<Frame>;
}

/// Captures the primary display through [xcap].
pub struct XcapGrabber;

impl XcapGrabber {
    pub fn new() -> Self {
        Self
    }
}

impl Default for XcapGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenGrabber for XcapGrabber {
    fn grab(&mut self) -> Result<Frame> {
        let monitors = xcap::Monitor::all()?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .ok_or_else(|| anyhow!("no monitor is available for capture"))?;
        let image: image::RgbaImage = monitor.capture_image()?;
        let (width, height) = image.dimensions();
        let gray = image.pixels().map(luma).collect();
        Ok(Frame {
            gray,
            width,
            height,
            channels: 4,
        })
    }
}

fn luma(pixel: &image::Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8
}

/// Handles screen capture and per-frame analysis. Retains a short frame
/// history so consecutive captures can be compared for change detection.
pub struct ScreenMonitor {
    grabber: Box<dyn ScreenGrabber>,
    history: VecDeque<Frame>,
    depth: usize,
}

impl ScreenMonitor {
    pub fn new(grabber: Box<dyn ScreenGrabber>, depth: usize) -> Self {
        Self {
            grabber,
            history: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Captures the current screen and returns its analysis. Returns `None`
    /// when no capture backend is available, the tick continues with
    /// partial data.
    pub fn capture(&mut self) -> Option<ScreenSample> {
        let frame = match self.grabber.grab() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Screen capture failed {e:?}");
                return None;
            }
        };

        let brightness = mean(&frame.gray);
        let contrast = std_deviation(&frame.gray, brightness);
        let change_detected = self
            .history
            .back()
            .filter(|prev| prev.width == frame.width && prev.height == frame.height)
            .is_some_and(|prev| mean_abs_diff(&prev.gray, &frame.gray) > CHANGE_THRESHOLD);

        let sample = ScreenSample {
            brightness,
            contrast,
            change_detected,
            width: frame.width,
            height: frame.height,
            channels: frame.channels,
        };

        if self.history.len() == self.depth {
            self.history.pop_front();
        }
        self.history.push_back(frame);

        Some(sample)
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.len()
    }
}

fn mean(values: &[u8]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

fn std_deviation(values: &[u8], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| {
            let diff = v as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x as f64 - y as f64).abs())
        .sum::<f64>()
        / a.len() as f64
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    fn solid_frame(value: u8, width: u32, height: u32) -> Frame {
        Frame {
            gray: vec![value; (width * height) as usize],
            width,
            height,
            channels: 4,
        }
    }

    fn monitor_with_frames(frames: Vec<Frame>) -> ScreenMonitor {
        let mut grabber = MockScreenGrabber::new();
        let mut frames = frames.into_iter();
        grabber
            .expect_grab()
            .returning(move || frames.next().ok_or_else(|| anyhow!("out of frames")));
        ScreenMonitor::new(Box::new(grabber), 10)
    }

    #[test]
    fn computes_brightness_and_contrast() {
        let mut frame = solid_frame(100, 2, 2);
        frame.gray = vec![0, 0, 200, 200];
        let mut monitor = monitor_with_frames(vec![frame]);

        let sample = monitor.capture().unwrap();
        assert_eq!(sample.brightness, 100.0);
        assert_eq!(sample.contrast, 100.0);
        assert!(!sample.change_detected);
    }

    #[test]
    fn first_capture_never_reports_change() {
        let mut monitor = monitor_with_frames(vec![solid_frame(255, 2, 2)]);
        let sample = monitor.capture().unwrap();
        assert!(!sample.change_detected);
    }

    #[test]
    fn detects_change_above_threshold() {
        let mut monitor =
            monitor_with_frames(vec![solid_frame(100, 2, 2), solid_frame(120, 2, 2)]);
        monitor.capture().unwrap();
        let sample = monitor.capture().unwrap();
        assert!(sample.change_detected);
    }

    #[test]
    fn small_difference_is_not_a_change() {
        let mut monitor =
            monitor_with_frames(vec![solid_frame(100, 2, 2), solid_frame(105, 2, 2)]);
        monitor.capture().unwrap();
        let sample = monitor.capture().unwrap();
        assert!(!sample.change_detected);
    }

    #[test]
    fn dimension_mismatch_disables_change_detection() {
        let mut monitor =
            monitor_with_frames(vec![solid_frame(0, 2, 2), solid_frame(255, 4, 4)]);
        monitor.capture().unwrap();
        let sample = monitor.capture().unwrap();
        assert!(!sample.change_detected);
    }

    #[test]
    fn failed_grab_returns_absent() {
        let mut grabber = MockScreenGrabber::new();
        grabber
            .expect_grab()
            .returning(|| Err(anyhow!("no backend")));
        let mut monitor = ScreenMonitor::new(Box::new(grabber), 10);
        assert!(monitor.capture().is_none());
    }

    #[test]
    fn history_is_bounded() {
        let frames = (0..15).map(|_| solid_frame(1, 2, 2)).collect();
        let mut monitor = monitor_with_frames(frames);
        for _ in 0..15 {
            monitor.capture().unwrap();
        }
        assert_eq!(monitor.history_len(), 10);
    }
}
