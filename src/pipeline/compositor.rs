use std::{borrow::Cow, path::Path};

use image::{RgbImage, imageops::FilterType};
use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    types::{Frame, SegmentationMask},
};

const MASK_THRESHOLD: f32 = 0.5;

/// Loads an image and letterboxes it into `width` x `height`.
pub fn load_background(path: &Path, width: u32, height: u32) -> Result<RgbImage> {
    if !path.is_file() {
        return Err(Error::BackgroundNotFound(path.to_path_buf()));
    }
    let image = image::open(path)
        .map_err(|err| Error::LoadBackground(err, path.to_path_buf()))?
        .to_rgb8();
    Ok(fit_background(&image, width, height))
}

/// Scales `image` to fit inside the target while keeping its aspect ratio,
/// centered on black.
pub fn fit_background(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = image.dimensions();
    let mut canvas = RgbImage::new(width, height);
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return canvas;
    }

    let aspect = src_w as f32 / src_h as f32;
    let target = width as f32 / height as f32;
    let (new_w, new_h) = if aspect > target {
        (width, ((width as f32 / aspect) as u32).clamp(1, height))
    } else {
        (((height as f32 * aspect) as u32).clamp(1, width), height)
    };

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let x = (width - new_w) / 2;
    let y = (height - new_h) / 2;
    image::imageops::replace(&mut canvas, &resized, x as i64, y as i64);
    canvas
}

/// Thresholds the probability mask and replicates it into a three-channel
/// black/white frame of the given size.
pub fn visualize_mask(mask: &SegmentationMask, width: u32, height: u32) -> Frame {
    let mut out = Frame::blank(width, height);
    for_each_row(&mut out.rgb, width, height, |y, row| {
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            let value = if is_foreground(mask, x as u32, y, width, height) {
                255
            } else {
                0
            };
            px.fill(value);
        }
    });
    out
}

/// Keeps the foreground of `frame` according to `mask`. Pixels outside the
/// mask take the background when one is set and turn black otherwise.
/// Without a mask the frame is returned unchanged.
pub fn compose(
    frame: &Frame,
    mask: Option<&SegmentationMask>,
    background: Option<&RgbImage>,
) -> Frame {
    let mut out = frame.clone();
    let Some(mask) = mask else {
        return out;
    };
    let (width, height) = (frame.width, frame.height);

    let background = background.map(|bg| {
        if bg.dimensions() == (width, height) {
            Cow::Borrowed(bg)
        } else {
            log::debug!(
                "refitting background from {:?} to {width}x{height}",
                bg.dimensions()
            );
            Cow::Owned(fit_background(bg, width, height))
        }
    });
    let background = background.as_deref().map(|bg| bg.as_raw().as_slice());

    for_each_row(&mut out.rgb, width, height, |y, row| {
        let row_start = y as usize * width as usize * 3;
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            if is_foreground(mask, x as u32, y, width, height) {
                continue;
            }
            match background {
                Some(bg) => {
                    let offset = row_start + x * 3;
                    px.copy_from_slice(&bg[offset..offset + 3]);
                }
                None => px.fill(0),
            }
        }
    });
    out
}

fn is_foreground(mask: &SegmentationMask, x: u32, y: u32, width: u32, height: u32) -> bool {
    let u = (x as f32 + 0.5) / width as f32;
    let v = (y as f32 + 0.5) / height as f32;
    mask.sample(u, v) >= MASK_THRESHOLD
}

fn for_each_row<F>(rgb: &mut [u8], width: u32, height: u32, f: F)
where
    F: Fn(u32, &mut [u8]) + Sync + Send,
{
    let row_len = width as usize * 3;
    if row_len == 0 || height == 0 {
        return;
    }
    rgb.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| f(y as u32, row));
}
