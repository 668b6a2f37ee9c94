use image::RgbaImage;

pub trait PresenceDetector: Send + Sync {
    fn detect(&self, frame: &RgbaImage) -> bool;
}

/// Baseline detector: a frame with almost no luminance variation (lens
/// covered, camera facing a blank wall, black frame) is treated as absence.
pub struct ContrastPresenceDetector {
    min_std_dev: f64,
}

impl Default for ContrastPresenceDetector {
    fn default() -> Self {
        Self { min_std_dev: 12.0 }
    }
}

impl ContrastPresenceDetector {
    pub fn new(min_std_dev: f64) -> Self {
        Self { min_std_dev }
    }
}

impl PresenceDetector for ContrastPresenceDetector {
    fn detect(&self, frame: &RgbaImage) -> bool {
        luma_std_dev(frame) >= self.min_std_dev
    }
}

fn luma_std_dev(frame: &RgbaImage) -> f64 {
    let count = frame.width() as usize * frame.height() as usize;
    if count == 0 {
        return 0.0;
    }

    let (mut sum, mut sum_sq) = (0.0f64, 0.0f64);
    for pixel in frame.pixels() {
        let [r, g, b, _] = pixel.0;
        let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        sum += luma;
        sum_sq += luma * luma;
    }

    let n = count as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn flat_frame_is_absent() {
        let frame = RgbaImage::from_pixel(16, 16, Rgba([40, 40, 40, 255]));
        assert!(!ContrastPresenceDetector::default().detect(&frame));
    }

    #[test]
    fn textured_frame_is_present() {
        let frame = RgbaImage::from_fn(16, 16, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([230, 200, 180, 255])
            } else {
                Rgba([20, 20, 20, 255])
            }
        });
        assert!(ContrastPresenceDetector::default().detect(&frame));
    }

    #[test]
    fn empty_frame_is_absent() {
        let frame = RgbaImage::new(0, 0);
        assert!(!ContrastPresenceDetector::default().detect(&frame));
    }
}
