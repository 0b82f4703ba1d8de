use crate::assets::TileImage;
use crate::draw::DrawTarget;
use crate::tiles::SourceRect;

pub(crate) const CLEAR_COLOR: [u8; 4] = [12, 10, 16, 255];
/// Light left over when every torch is out.
pub(crate) const MIN_BRIGHTNESS: f32 = 0.35;

/// Rasterizes tile draws into an RGBA frame with alpha blending.
pub struct FrameCanvas<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
    light: f32,
}

impl<'a> FrameCanvas<'a> {
    /// `brightness` is the level's burning-torch ratio in `[0, 1]`.
    pub fn new(frame: &'a mut [u8], width: u32, height: u32, brightness: f32) -> Self {
        let brightness = if brightness.is_finite() {
            brightness.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            frame,
            width,
            height,
            light: MIN_BRIGHTNESS + (1.0 - MIN_BRIGHTNESS) * brightness,
        }
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for chunk in self.frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    fn blend_pixel(&mut self, x: i32, y: i32, color: [u8; 4], opacity: f32) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let Some(dst) = self.frame.get_mut(offset..offset + 4) else {
            return;
        };
        let alpha = (color[3] as f32 / 255.0) * opacity;
        if alpha <= 0.0 {
            return;
        }
        for channel in 0..3 {
            let src = color[channel] as f32 * self.light;
            let blended = src * alpha + dst[channel] as f32 * (1.0 - alpha);
            dst[channel] = blended.round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = 255;
    }
}

impl DrawTarget for FrameCanvas<'_> {
    fn draw_tile(
        &mut self,
        image: &TileImage,
        source: SourceRect,
        dest_x: i32,
        dest_y: i32,
        opacity: f32,
    ) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity == 0.0 {
            return;
        }
        let src_width = source.width.min(image.width().saturating_sub(source.x));
        let src_height = source.height.min(image.height().saturating_sub(source.y));
        let (Some(dx_range), Some(dy_range)) = (
            clip_span(dest_x, src_width, self.width),
            clip_span(dest_y, src_height, self.height),
        ) else {
            return;
        };
        for dy in dy_range {
            let y = (i64::from(dest_y) + i64::from(dy)) as i32;
            for dx in dx_range.clone() {
                let x = (i64::from(dest_x) + i64::from(dx)) as i32;
                let color = image.get_pixel(source.x + dx, source.y + dy).0;
                self.blend_pixel(x, y, color, opacity);
            }
        }
    }
}

/// Offsets in `0..len` that land inside `0..limit` when added to `start`.
fn clip_span(start: i32, len: u32, limit: u32) -> Option<std::ops::Range<u32>> {
    let start = i64::from(start);
    let first = (-start).max(0);
    let last = (i64::from(limit) - start).min(i64::from(len));
    (first < last).then(|| first as u32..last as u32)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::{Rgba, RgbaImage};

    use super::*;

    fn source(width: u32, height: u32) -> SourceRect {
        SourceRect {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    fn pixel(frame: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * width + x) * 4) as usize;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    #[test]
    fn opaque_tile_copies_pixels_at_full_brightness() {
        let image: TileImage = Arc::new(RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255])));
        let mut frame = vec![0u8; 4 * 4 * 4];
        let mut canvas = FrameCanvas::new(&mut frame, 4, 4, 1.0);
        canvas.draw_tile(&image, source(2, 2), 1, 1, 1.0);

        assert_eq!(pixel(&frame, 4, 1, 1), [200, 100, 50, 255]);
        assert_eq!(pixel(&frame, 4, 2, 2), [200, 100, 50, 255]);
        assert_eq!(pixel(&frame, 4, 0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn draws_far_outside_the_frame_are_skipped() {
        let image: TileImage = Arc::new(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
        let mut frame = vec![0u8; 2 * 2 * 4];
        let mut canvas = FrameCanvas::new(&mut frame, 2, 2, 1.0);
        canvas.draw_tile(&image, source(4, 4), i32::MAX - 1, 0, 1.0);
        canvas.draw_tile(&image, source(4, 4), 0, i32::MAX, 1.0);
        canvas.draw_tile(&image, source(4, 4), i32::MIN, i32::MIN, 1.0);
        assert!(frame.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn clip_span_limits_offsets_to_the_frame() {
        assert_eq!(clip_span(-1, 4, 2), Some(1..3));
        assert_eq!(clip_span(1, 4, 2), Some(0..1));
        assert_eq!(clip_span(2, 4, 2), None);
        assert_eq!(clip_span(i32::MAX, 16, 96), None);
        assert_eq!(clip_span(i32::MIN, 16, 96), None);
    }

    #[test]
    fn draws_are_clipped_to_frame() {
        let image: TileImage = Arc::new(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
        let mut frame = vec![0u8; 2 * 2 * 4];
        let mut canvas = FrameCanvas::new(&mut frame, 2, 2, 1.0);
        canvas.draw_tile(&image, source(4, 4), -1, -1, 1.0);
        assert_eq!(pixel(&frame, 2, 0, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&frame, 2, 1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn transparent_pixels_and_zero_opacity_leave_frame_untouched() {
        let image: TileImage = Arc::new(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 0])));
        let mut frame = vec![9u8; 4];
        let mut canvas = FrameCanvas::new(&mut frame, 1, 1, 1.0);
        canvas.draw_tile(&image, source(1, 1), 0, 0, 1.0);
        canvas.draw_tile(&image, source(1, 1), 0, 0, 0.0);
        assert_eq!(frame, vec![9, 9, 9, 9]);
    }

    #[test]
    fn half_opacity_blends_with_background() {
        let image: TileImage = Arc::new(RgbaImage::from_pixel(1, 1, Rgba([200, 200, 200, 255])));
        let mut frame = vec![0u8, 0, 0, 255];
        let mut canvas = FrameCanvas::new(&mut frame, 1, 1, 1.0);
        canvas.draw_tile(&image, source(1, 1), 0, 0, 0.5);
        assert_eq!(frame, vec![100, 100, 100, 255]);
    }

    #[test]
    fn darkness_dims_but_never_blacks_out() {
        let image: TileImage = Arc::new(RgbaImage::from_pixel(1, 1, Rgba([200, 200, 200, 255])));
        let mut frame = vec![0u8; 4];
        let mut canvas = FrameCanvas::new(&mut frame, 1, 1, 0.0);
        canvas.draw_tile(&image, source(1, 1), 0, 0, 1.0);
        assert_eq!(frame[0], (200.0 * MIN_BRIGHTNESS).round() as u8);
    }
}
