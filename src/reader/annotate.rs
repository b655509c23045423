//! Display overlays and privacy blur.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::config::defaults::{BORDER_THICKNESS, COMPOSITE_SCALE, NEEDLE_THICKNESS};
use crate::reader::vision::{kernel_sigma, LineSegment};

const NEEDLE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BORDER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Copy of `frame` with the needle drawn in red and a green frame border.
pub fn annotate(frame: &RgbImage, needle: Option<&LineSegment>) -> RgbImage {
    let mut out = frame.clone();

    if let Some(seg) = needle {
        for ox in 0..NEEDLE_THICKNESS {
            for oy in 0..NEEDLE_THICKNESS {
                draw_line_segment_mut(
                    &mut out,
                    ((seg.x1 + ox) as f32, (seg.y1 + oy) as f32),
                    ((seg.x2 + ox) as f32, (seg.y2 + oy) as f32),
                    NEEDLE_COLOR,
                );
            }
        }
    }

    let (w, h) = out.dimensions();
    for i in 0..BORDER_THICKNESS {
        let (rw, rh) = (w.saturating_sub(2 * i), h.saturating_sub(2 * i));
        if rw == 0 || rh == 0 {
            break;
        }
        draw_hollow_rect_mut(&mut out, Rect::at(i as i32, i as i32).of_size(rw, rh), BORDER_COLOR);
    }

    out
}

/// Strong Gaussian blur used for archived and composite frames.
pub fn privacy_blur(frame: &RgbImage, kernel: u32) -> RgbImage {
    imageops::blur(frame, kernel_sigma(kernel))
}

/// Annotated frame and its blurred twin side by side, each scaled down.
pub fn composite(annotated: &RgbImage, blur_kernel: u32) -> RgbImage {
    let (w, h) = annotated.dimensions();
    let sw = ((w as f32 * COMPOSITE_SCALE).round() as u32).max(1);
    let sh = ((h as f32 * COMPOSITE_SCALE).round() as u32).max(1);

    let left = imageops::resize(annotated, sw, sh, FilterType::Triangle);
    let right = imageops::resize(&privacy_blur(annotated, blur_kernel), sw, sh, FilterType::Triangle);

    let mut canvas = RgbImage::new(sw * 2, sh);
    imageops::replace(&mut canvas, &left, 0, 0);
    imageops::replace(&mut canvas, &right, i64::from(sw), 0);
    canvas
}
