use crate::{
    pose::{Classification, ConnectionStyle},
    types::{Frame, Landmark},
};

const LANDMARK_COLOR: [u8; 3] = [235, 235, 235];
const LANDMARK_RADIUS: i32 = 3;

/// Draws every connection in its classification style, then the landmarks.
pub fn draw_skeleton(frame: &mut Frame, landmarks: &[Landmark], classification: &Classification) {
    if landmarks.is_empty() {
        return;
    }

    let (width, height) = (frame.width, frame.height);
    // Normal first so highlighted segments stay on top where they overlap.
    let mut segments: Vec<_> = classification.iter().collect();
    segments.sort_by_key(|(_, style)| *style != ConnectionStyle::Normal);

    for (connection, style) in segments {
        let (a, b) = connection.landmarks();
        let (Some(start), Some(end)) = (landmarks.get(a), landmarks.get(b)) else {
            continue;
        };
        draw_line(
            frame,
            start.to_pixel(width, height),
            end.to_pixel(width, height),
            style.color(),
            style.thickness(),
        );
    }

    for landmark in landmarks {
        let (x, y) = landmark.to_pixel(width, height);
        if !is_drawable(x, width) || !is_drawable(y, height) {
            continue;
        }
        fill_disc(frame, x as i32, y as i32, LANDMARK_RADIUS, LANDMARK_COLOR);
    }
}

// Points further than this outside the frame are never drawn.
fn is_drawable(value: f32, extent: u32) -> bool {
    let margin = extent as f32 + LANDMARK_RADIUS as f32;
    value.is_finite() && value > -margin && value < extent as f32 + margin
}

pub fn draw_line(
    frame: &mut Frame,
    (x0, y0): (f32, f32),
    (x1, y1): (f32, f32),
    color: [u8; 3],
    thickness: u32,
) {
    if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
        return;
    }

    let radius = thickness.div_ceil(2).max(1) as i32;
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as i32;
    // Segments far outside the frame would only waste stamping.
    if steps > 4 * (frame.width + frame.height) as i32 {
        return;
    }

    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = x0 + (x1 - x0) * t;
        let y = y0 + (y1 - y0) * t;
        fill_disc(frame, x.round() as i32, y.round() as i32, radius, color);
    }
}

fn fill_disc(frame: &mut Frame, cx: i32, cy: i32, radius: i32, color: [u8; 3]) {
    let (width, height) = (frame.width as i64, frame.height as i64);
    let (cx, cy, radius) = (cx as i64, cy as i64, radius as i64);
    let (x_min, x_max) = ((cx - radius).max(0), (cx + radius).min(width - 1));
    let (y_min, y_max) = ((cy - radius).max(0), (cy + radius).min(height - 1));

    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let offset = (y * width + x) as usize * 3;
            frame.rgb[offset..offset + 3].copy_from_slice(&color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::LANDMARK_COUNT;

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let offset = (y as usize * frame.width as usize + x as usize) * 3;
        [frame.rgb[offset], frame.rgb[offset + 1], frame.rgb[offset + 2]]
    }

    #[test]
    fn line_is_drawn_in_color() {
        let mut frame = Frame::blank(20, 20);
        draw_line(&mut frame, (2.0, 10.0), (17.0, 10.0), [255, 0, 0], 2);
        assert_eq!(pixel(&frame, 10, 10), [255, 0, 0]);
        assert_eq!(pixel(&frame, 10, 2), [0, 0, 0]);
    }

    #[test]
    fn off_frame_line_is_clipped() {
        let mut frame = Frame::blank(10, 10);
        draw_line(&mut frame, (-5.0, 5.0), (15.0, 5.0), [0, 255, 0], 3);
        assert_eq!(pixel(&frame, 0, 5), [0, 255, 0]);
        assert_eq!(pixel(&frame, 9, 5), [0, 255, 0]);
    }

    fn painted_rows(frame: &Frame, x: u32) -> usize {
        (0..frame.height)
            .filter(|&y| pixel(frame, x, y) != [0, 0, 0])
            .count()
    }

    #[test]
    fn wrong_segments_are_thicker_than_normal() {
        let mut rows = Vec::new();
        for style in [ConnectionStyle::Normal, ConnectionStyle::Wrong] {
            let mut frame = Frame::blank(40, 20);
            draw_line(&mut frame, (5.0, 10.0), (35.0, 10.0), style.color(), style.thickness());
            rows.push(painted_rows(&frame, 20));
        }
        assert!(rows[1] > rows[0], "normal {} rows, wrong {} rows", rows[0], rows[1]);
    }

    #[test]
    fn far_away_landmarks_are_skipped() {
        let mut frame = Frame::blank(10, 10);
        let landmarks = [
            Landmark::new(1.0e12, 0.5),
            Landmark::new(f32::NAN, 0.5),
            Landmark::new(0.5, f32::NEG_INFINITY),
        ];
        draw_skeleton(&mut frame, &landmarks, &Classification::default());
        assert!(frame.rgb.iter().all(|&v| v == 0));
    }

    #[test]
    fn disc_at_extreme_center_does_not_overflow() {
        let mut frame = Frame::blank(10, 10);
        fill_disc(&mut frame, i32::MAX, i32::MIN, 3, [255, 255, 255]);
        assert!(frame.rgb.iter().all(|&v| v == 0));
    }

    #[test]
    fn no_landmarks_draws_nothing() {
        let mut frame = Frame::blank(10, 10);
        draw_skeleton(&mut frame, &[], &Classification::default());
        assert!(frame.rgb.iter().all(|&v| v == 0));
    }

    #[test]
    fn skeleton_uses_style_colors() {
        let mut frame = Frame::blank(100, 100);
        let mut landmarks = vec![Landmark::new(0.0, 0.0); LANDMARK_COUNT];
        // Left shoulder (11) to right shoulder (12) across the middle.
        landmarks[11] = Landmark::new(0.2, 0.5);
        landmarks[12] = Landmark::new(0.8, 0.5);
        draw_skeleton(&mut frame, &landmarks, &Classification::default());
        assert_eq!(pixel(&frame, 50, 50), ConnectionStyle::Normal.color());
    }
}
