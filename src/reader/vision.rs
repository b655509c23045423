//! Needle detection: smoothing, edge map, probabilistic Hough transform,
//! and needle/tip selection.
//!
//! The line detector is the progressive probabilistic Hough transform: edge
//! points are visited in a seeded random order, each votes into a
//! (θ, ρ) accumulator, and as soon as a bin crosses the vote threshold the
//! line through that point is walked in both directions (tolerating gaps up
//! to `max_line_gap`). Walked pixels are removed from further consideration;
//! if the walk is long enough their votes are withdrawn and the segment is
//! emitted.

use image::{GrayImage, RgbImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::f64::consts::PI;

use crate::config::defaults::LINE_DETECTOR_SEED;
use crate::config::VisionConfig;

/// A detected straight segment in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Euclidean endpoint-to-endpoint length.
    pub fn length(&self) -> f64 {
        f64::from(self.x2 - self.x1).hypot(f64::from(self.y2 - self.y1))
    }

    pub fn is_degenerate(&self) -> bool {
        self.x1 == self.x2 && self.y1 == self.y2
    }

    pub fn endpoints(&self) -> [(i32, i32); 2] {
        [(self.x1, self.y1), (self.x2, self.y2)]
    }
}

/// Probabilistic Hough parameters.
#[derive(Debug, Clone, Copy)]
pub struct HoughParams {
    /// Distance resolution (px)
    pub rho: f64,
    /// Angle resolution (rad)
    pub theta: f64,
    /// Minimum accumulator votes
    pub threshold: u32,
    pub min_line_length: u32,
    pub max_line_gap: u32,
}

impl HoughParams {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            rho: 1.0,
            theta: PI / 180.0,
            threshold: config.hough_threshold,
            min_line_length: config.min_line_length,
            max_line_gap: config.max_line_gap,
        }
    }
}

// ============================================================================
// Preprocessing
// ============================================================================

/// Bump even kernel sizes to the next odd size.
pub fn odd_kernel(k: u32) -> u32 {
    if k % 2 == 1 {
        k
    } else {
        k + 1
    }
}

/// Gaussian sigma equivalent to a square kernel of side `k`.
pub fn kernel_sigma(k: u32) -> f32 {
    let k = odd_kernel(k) as f32;
    0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
}

/// Intensity → blur → Canny.
pub fn edge_map(frame: &RgbImage, config: &VisionConfig) -> GrayImage {
    let gray = image::imageops::grayscale(frame);
    let smoothed = if config.blur_kernel > 1 {
        gaussian_blur_f32(&gray, kernel_sigma(config.blur_kernel))
    } else {
        gray
    };
    canny(&smoothed, config.canny_low, config.canny_high)
}

// ============================================================================
// Probabilistic Hough
// ============================================================================

struct Accumulator {
    cells: Vec<i32>,
    num_rho: usize,
    rho_offset: i32,
    /// (cos θ / ρ, sin θ / ρ) per angle bin
    trig: Vec<(f64, f64)>,
}

impl Accumulator {
    fn new(width: u32, height: u32, params: &HoughParams) -> Self {
        let num_angle = (PI / params.theta).round().max(1.0) as usize;
        let num_rho = ((f64::from(width + height) * 2.0 + 1.0) / params.rho).round() as usize;
        let trig = (0..num_angle)
            .map(|n| {
                let angle = n as f64 * params.theta;
                (angle.cos() / params.rho, angle.sin() / params.rho)
            })
            .collect();
        Self {
            cells: vec![0; num_angle * num_rho],
            num_rho,
            rho_offset: ((num_rho - 1) / 2) as i32,
            trig,
        }
    }

    fn bin(&self, n: usize, x: i32, y: i32) -> usize {
        let (c, s) = self.trig[n];
        let r = (f64::from(x) * c + f64::from(y) * s).round() as i32 + self.rho_offset;
        n * self.num_rho + r.clamp(0, self.num_rho as i32 - 1) as usize
    }

    /// Add one point's votes; returns the best bin if it reached `threshold`.
    fn vote(&mut self, x: i32, y: i32, threshold: i32) -> Option<usize> {
        let mut max_votes = threshold - 1;
        let mut best = None;
        for n in 0..self.trig.len() {
            let idx = self.bin(n, x, y);
            self.cells[idx] += 1;
            if self.cells[idx] > max_votes {
                max_votes = self.cells[idx];
                best = Some(n);
            }
        }
        best
    }

    fn unvote(&mut self, x: i32, y: i32) {
        for n in 0..self.trig.len() {
            let idx = self.bin(n, x, y);
            self.cells[idx] -= 1;
        }
    }
}

/// Unit step along a line whose normal is at `angle`: one whole pixel on the
/// dominant axis, a fraction on the other.
fn walk_step(angle: f64) -> (f64, f64) {
    let a = -angle.sin();
    let b = angle.cos();
    if a.abs() > b.abs() {
        (a.signum(), b / a.abs())
    } else {
        (a / b.abs(), b.signum())
    }
}

/// Detect line segments in a binary edge map (non-zero = edge).
///
/// Output order is the order segments were confirmed, which is fixed for a
/// given frame because the point order is seeded.
pub fn detect_segments(edges: &GrayImage, params: &HoughParams) -> Vec<LineSegment> {
    let (width, height) = edges.dimensions();
    let (w, h) = (width as i32, height as i32);
    let index = |x: i32, y: i32| (y * w + x) as usize;
    let in_bounds = |x: i32, y: i32| x >= 0 && y >= 0 && x < w && y < h;

    let mut mask = vec![false; (width * height) as usize];
    let mut voted = vec![false; mask.len()];
    let mut points = Vec::new();
    for (x, y, p) in edges.enumerate_pixels() {
        if p[0] > 0 {
            mask[index(x as i32, y as i32)] = true;
            points.push((x as i32, y as i32));
        }
    }

    let mut rng = StdRng::seed_from_u64(LINE_DETECTOR_SEED);
    points.shuffle(&mut rng);

    let mut acc = Accumulator::new(width, height, params);
    let threshold = params.threshold.max(1) as i32;
    let max_gap = params.max_line_gap as i32;
    let min_len = params.min_line_length as i32;
    let mut segments = Vec::new();

    for &(x0, y0) in &points {
        // Already consumed by an earlier walk
        if !mask[index(x0, y0)] {
            continue;
        }

        let best = acc.vote(x0, y0, threshold);
        voted[index(x0, y0)] = true;
        let Some(n) = best else {
            continue;
        };

        let (dx, dy) = walk_step(n as f64 * params.theta);
        let start = (f64::from(x0), f64::from(y0));

        let mut ends = [(x0, y0); 2];
        for (k, end) in ends.iter_mut().enumerate() {
            let sign = if k == 0 { 1.0 } else { -1.0 };
            let (mut fx, mut fy) = start;
            let mut gap = 0;
            loop {
                let (px, py) = (fx.round() as i32, fy.round() as i32);
                if !in_bounds(px, py) {
                    break;
                }
                if mask[index(px, py)] {
                    gap = 0;
                    *end = (px, py);
                } else {
                    gap += 1;
                    if gap > max_gap {
                        break;
                    }
                }
                fx += sign * dx;
                fy += sign * dy;
            }
        }

        let good_line = (ends[1].0 - ends[0].0).abs() >= min_len
            || (ends[1].1 - ends[0].1).abs() >= min_len;

        for (k, end) in ends.iter().enumerate() {
            let sign = if k == 0 { 1.0 } else { -1.0 };
            let (mut fx, mut fy) = start;
            loop {
                let (px, py) = (fx.round() as i32, fy.round() as i32);
                if !in_bounds(px, py) {
                    break;
                }
                let i = index(px, py);
                if mask[i] {
                    if good_line && voted[i] {
                        acc.unvote(px, py);
                        voted[i] = false;
                    }
                    mask[i] = false;
                }
                if (px, py) == *end {
                    break;
                }
                fx += sign * dx;
                fy += sign * dy;
            }
        }

        if good_line {
            segments.push(LineSegment::new(ends[0].0, ends[0].1, ends[1].0, ends[1].1));
        }
    }

    segments
}

// ============================================================================
// Needle / Tip Selection
// ============================================================================

/// The longest segment; equal lengths resolve to the earliest in detector order.
pub fn select_needle(segments: &[LineSegment]) -> Option<LineSegment> {
    let mut best: Option<LineSegment> = None;
    for segment in segments {
        if best.map_or(true, |b| segment.length() > b.length()) {
            best = Some(*segment);
        }
    }
    best
}

/// The endpoint farther from `center`; the needle points outward from a
/// pivot near the centre. Degenerate segments have no tip.
pub fn select_tip(segment: &LineSegment, center: (i32, i32)) -> Option<(i32, i32)> {
    if segment.is_degenerate() {
        return None;
    }
    let dist = |(x, y): (i32, i32)| f64::from(x - center.0).hypot(f64::from(y - center.1));
    let [p1, p2] = segment.endpoints();
    Some(if dist(p1) > dist(p2) { p1 } else { p2 })
}
