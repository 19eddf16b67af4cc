use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};

use super::{LandmarkEngine, LandmarkOutput};
use crate::{
    pose::LANDMARK_COUNT,
    types::{Frame, Landmark, SegmentationMask},
};

const INPUT_SIZE: u32 = 256;
// x, y, z, visibility, presence
const VALUES_PER_LANDMARK: usize = 5;

#[derive(Clone, Debug)]
pub struct BlazePoseConfig {
    pub model_path: PathBuf,
    pub min_pose_score: f32,
    pub intra_threads: usize,
}

/// BlazePose full-body landmark model run through ONNX Runtime on the whole
/// (letterboxed) frame.
pub struct BlazePoseEngine {
    session: Session,
    min_pose_score: f32,
}

impl BlazePoseEngine {
    pub fn new(config: &BlazePoseConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(&config.model_path)
            .with_context(|| {
                format!(
                    "failed to load ORT session from {}",
                    config.model_path.display()
                )
            })?;

        log::info!(
            "blazepose ORT backend ready using {}",
            config.model_path.display()
        );

        Ok(Self {
            session,
            min_pose_score: config.min_pose_score,
        })
    }
}

impl LandmarkEngine for BlazePoseEngine {
    fn infer(&mut self, frame: &Frame) -> Result<LandmarkOutput> {
        let (input, letterbox) = prepare_input(frame)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 2 {
            return Err(anyhow!("model returned {} outputs, expected at least 2", outputs.len()));
        }

        // The pose flag output is a logit.
        let score = outputs[1]
            .try_extract_array::<f32>()?
            .iter()
            .next()
            .copied()
            .map_or(0.0, sigmoid);
        if score < self.min_pose_score {
            return Ok(LandmarkOutput::default());
        }

        let raw: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let landmarks = decode_landmarks(&raw, &letterbox)?;

        let mask = if outputs.len() > 2 {
            let logits = outputs[2].try_extract_array::<f32>()?;
            match mask_dims(logits.shape()) {
                Some((width, height)) => {
                    let logits: Vec<f32> = logits.iter().copied().collect();
                    decode_mask(&logits, width, height, &letterbox)
                }
                None => {
                    log::debug!("unexpected segmentation shape {:?}", logits.shape());
                    None
                }
            }
        } else {
            None
        };

        Ok(LandmarkOutput { landmarks, mask })
    }
}

/// Placement of the scaled frame inside the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    pad_x: u32,
    pad_y: u32,
    content_width: u32,
    content_height: u32,
}

fn prepare_input(frame: &Frame) -> Result<(Array4<f32>, Letterbox)> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;

    let letterbox = letterbox_for(frame.width, frame.height);
    let resized = image::imageops::resize(
        &image,
        letterbox.content_width,
        letterbox.content_height,
        FilterType::Triangle,
    );

    let size = INPUT_SIZE as usize;
    let mut input = Array4::<f32>::zeros((1, size, size, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let row = (y + letterbox.pad_y) as usize;
        let col = (x + letterbox.pad_x) as usize;
        for c in 0..3 {
            input[[0, row, col, c]] = pixel[c] as f32 / 255.0;
        }
    }

    Ok((input, letterbox))
}

fn letterbox_for(width: u32, height: u32) -> Letterbox {
    let scale = INPUT_SIZE as f32 / width.max(height).max(1) as f32;
    let content_width = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let content_height = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    Letterbox {
        pad_x: (INPUT_SIZE - content_width) / 2,
        pad_y: (INPUT_SIZE - content_height) / 2,
        content_width,
        content_height,
    }
}

fn decode_landmarks(raw: &[f32], letterbox: &Letterbox) -> Result<Vec<Landmark>> {
    if raw.len() < LANDMARK_COUNT * VALUES_PER_LANDMARK {
        return Err(anyhow!(
            "expected {} landmark values, got {}",
            LANDMARK_COUNT * VALUES_PER_LANDMARK,
            raw.len()
        ));
    }

    let width = letterbox.content_width as f32;
    let height = letterbox.content_height as f32;
    Ok(raw
        .chunks_exact(VALUES_PER_LANDMARK)
        .take(LANDMARK_COUNT)
        .map(|values| {
            Landmark::with_depth(
                (values[0] - letterbox.pad_x as f32) / width,
                (values[1] - letterbox.pad_y as f32) / height,
                values[2] / width,
            )
        })
        .collect())
}

/// Width and height of a single-channel mask tensor such as `[1, 128, 128, 1]`.
fn mask_dims(shape: &[usize]) -> Option<(u32, u32)> {
    match shape {
        [.., height, width, 1] | [.., 1, height, width] | [height, width] => {
            Some((*width as u32, *height as u32))
        }
        _ => None,
    }
}

/// Crops the padding off a `mask_width` x `mask_height` logit grid that
/// covers the square model input, and turns logits into probabilities.
fn decode_mask(
    logits: &[f32],
    mask_width: u32,
    mask_height: u32,
    letterbox: &Letterbox,
) -> Option<SegmentationMask> {
    if mask_width == 0 || mask_height == 0 || logits.len() < (mask_width * mask_height) as usize {
        log::debug!(
            "segmentation output has {} values, expected {mask_width}x{mask_height}",
            logits.len()
        );
        return None;
    }

    let scale_x = mask_width as f32 / INPUT_SIZE as f32;
    let scale_y = mask_height as f32 / INPUT_SIZE as f32;
    let left = ((letterbox.pad_x as f32 * scale_x).round() as u32).min(mask_width - 1);
    let top = ((letterbox.pad_y as f32 * scale_y).round() as u32).min(mask_height - 1);
    let width = ((letterbox.content_width as f32 * scale_x).round() as u32).clamp(1, mask_width - left);
    let height =
        ((letterbox.content_height as f32 * scale_y).round() as u32).clamp(1, mask_height - top);

    let mut data = Vec::with_capacity((width * height) as usize);
    for y in top..top + height {
        let row = y as usize * mask_width as usize;
        for x in left..left + width {
            data.push(sigmoid(logits[row + x as usize]));
        }
    }

    Some(SegmentationMask {
        width,
        height,
        data,
    })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
