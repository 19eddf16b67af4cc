use std::time::Instant;

use image::RgbImage;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgb: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgb,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; width as usize * height as usize * 3], width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.rgb.is_empty()
    }

    /// Mirrors the frame around its vertical axis.
    pub fn flip_horizontal(&mut self) {
        if self.width < 2 {
            return;
        }
        let row_len = self.width as usize * 3;
        for row in self.rgb.chunks_exact_mut(row_len) {
            let mut left = 0;
            let mut right = row_len - 3;
            while left < right {
                for c in 0..3 {
                    row.swap(left + c, right + c);
                }
                left += 3;
                right -= 3;
            }
        }
    }
}

/// One tracked body joint. `x` and `y` are normalized to the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_depth(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Single-channel foreground probability, row-major, covering the whole frame.
#[derive(Clone, Debug)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl SegmentationMask {
    /// Nearest-neighbour lookup in normalized frame coordinates.
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub frame: Frame,
    pub landmarks: Vec<Landmark>,
    pub mask: Option<SegmentationMask>,
    pub timestamp_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub mask: Option<Frame>,
    pub any_wrong: bool,
    pub timestamp_ms: u64,
}
