//! Normalized cross-correlation template search.
//!
//! The matcher slides the template over every valid offset of a full-screen
//! capture and scores each window with the normalized cross-correlation
//! coefficient. Per-window means and variances come from integral sum tables
//! so only the cross term needs a per-pixel pass; rows are scored in
//! parallel with rayon and the global maximum wins.

use image::GrayImage;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

/// Outcome of a single match attempt.
///
/// `x`/`y` are the **center** of the best-scoring window, in the coordinate
/// space of the capture (absolute screen coordinates for a full-screen
/// grab). `confidence` is the correlation score clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    pub found: bool,
    pub x: i32,
    pub y: i32,
    pub confidence: f64,
}

impl MatchResult {
    fn miss() -> Self {
        Self {
            found: false,
            x: 0,
            y: 0,
            confidence: 0.0,
        }
    }
}

/// Integral sum and squared-sum tables with a zero row/column of padding,
/// so window sums never branch on the image border.
struct SumTables {
    stride: usize,
    sums: Vec<u64>,
    squares: Vec<u64>,
}

impl SumTables {
    fn build(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        let mut squares = vec![0u64; stride * (h + 1)];
        let pixels = image.as_raw();
        for y in 0..h {
            for x in 0..w {
                let v = pixels[y * w + x] as u64;
                let i = (y + 1) * stride + (x + 1);
                sums[i] = v + sums[i - 1] + sums[i - stride] - sums[i - stride - 1];
                squares[i] = v * v + squares[i - 1] + squares[i - stride] - squares[i - stride - 1];
            }
        }
        Self {
            stride,
            sums,
            squares,
        }
    }

    /// Sum and squared sum over the `tw` x `th` window at top-left `(x, y)`.
    fn window(&self, x: usize, y: usize, tw: usize, th: usize) -> (u64, u64) {
        let s = self.stride;
        let (x2, y2) = (x + tw, y + th);
        let sum = self.sums[y2 * s + x2] + self.sums[y * s + x]
            - self.sums[y * s + x2]
            - self.sums[y2 * s + x];
        let squares = self.squares[y2 * s + x2] + self.squares[y * s + x]
            - self.squares[y * s + x2]
            - self.squares[y2 * s + x];
        (sum, squares)
    }
}

/// Search `screen` for `template`, scanning all valid offsets.
///
/// `found` is set when the best score exceeds `threshold`. Identical inputs
/// always produce identical output: ties on the score resolve to the
/// smallest `(y, x)` offset regardless of scan order.
pub fn find_match(screen: &GrayImage, template: &GrayImage, threshold: f64) -> MatchResult {
    let (sw, sh) = (screen.width() as usize, screen.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > sw || th > sh {
        debug!(sw, sh, tw, th, "template does not fit the capture");
        return MatchResult::miss();
    }

    let tables = SumTables::build(screen);
    let tpl = template.as_raw();
    let area = (tw * th) as f64;
    let tpl_sum: u64 = tpl.iter().map(|&v| v as u64).sum();
    let tpl_squares: u64 = tpl.iter().map(|&v| (v as u64) * (v as u64)).sum();
    let tpl_mean = tpl_sum as f64 / area;
    let tpl_deviation = tpl_squares as f64 - (tpl_sum as f64).powi(2) / area;

    let screen_px = screen.as_raw();
    let (score, best_x, best_y) = (0..=(sh - th))
        .into_par_iter()
        .map(|y| {
            let mut row_best = (-2.0f64, 0usize, 0usize);
            for x in 0..=(sw - tw) {
                let (win_sum, win_squares) = tables.window(x, y, tw, th);
                let win_deviation = win_squares as f64 - (win_sum as f64).powi(2) / area;
                let denominator = (win_deviation * tpl_deviation).sqrt();
                if denominator <= f64::EPSILON {
                    // flat window or flat template, nothing to correlate
                    continue;
                }
                let mut cross = 0u64;
                for ty in 0..th {
                    let screen_row = &screen_px[(y + ty) * sw + x..][..tw];
                    let tpl_row = &tpl[ty * tw..][..tw];
                    for (s, t) in screen_row.iter().zip(tpl_row) {
                        cross += (*s as u64) * (*t as u64);
                    }
                }
                let numerator = cross as f64 - win_sum as f64 * tpl_mean;
                let corr = numerator / denominator;
                if corr > row_best.0 {
                    row_best = (corr, x, y);
                }
            }
            row_best
        })
        .reduce(
            || (-2.0f64, 0usize, 0usize),
            |a, b| {
                if b.0 > a.0 || (b.0 == a.0 && (b.2, b.1) < (a.2, a.1)) {
                    b
                } else {
                    a
                }
            },
        );

    if score < -1.5 {
        // no window produced a defined score
        return MatchResult::miss();
    }
    MatchResult {
        found: score > threshold,
        x: (best_x + tw / 2) as i32,
        y: (best_y + th / 2) as i32,
        confidence: score.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn patch_pixel(seed: u32, x: u32, y: u32) -> u8 {
        // cheap multiplicative hash so patterns for different seeds stay
        // decorrelated
        let v = x
            .wrapping_mul(31)
            .wrapping_add(y.wrapping_mul(17))
            .wrapping_add(seed.wrapping_mul(97));
        (v.wrapping_mul(2_654_435_761) >> 24) as u8
    }

    fn template(seed: u32, w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([patch_pixel(seed, x, y)]))
    }

    fn screen_with(seed: u32, at: (u32, u32)) -> GrayImage {
        let (px, py) = at;
        GrayImage::from_fn(64, 48, |x, y| {
            if x >= px && x < px + 8 && y >= py && y < py + 6 {
                Luma([patch_pixel(seed, x - px, y - py)])
            } else {
                Luma([120])
            }
        })
    }

    #[test]
    fn finds_embedded_template_at_its_center() {
        let screen = screen_with(1, (20, 10));
        let result = find_match(&screen, &template(1, 8, 6), 0.8);
        assert!(result.found);
        // top-left (20, 10) plus half the 8x6 template
        assert_eq!((result.x, result.y), (24, 13));
        assert!(result.confidence > 0.99);
    }

    #[test]
    fn misses_on_a_uniform_screen() {
        let screen = GrayImage::from_pixel(64, 48, Luma([120]));
        let result = find_match(&screen, &template(1, 8, 6), 0.6);
        assert!(!result.found);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn unrelated_pattern_scores_below_threshold() {
        // horizontal stripes on screen, vertical stripes in the template:
        // the covariance is exactly zero at every offset
        let screen =
            GrayImage::from_fn(64, 48, |_, y| Luma([if y % 2 == 0 { 40 } else { 200 }]));
        let tpl = GrayImage::from_fn(8, 6, |x, _| Luma([if x % 2 == 0 { 40 } else { 200 }]));
        let result = find_match(&screen, &tpl, 0.8);
        assert!(!result.found);
    }

    #[test]
    fn oversized_template_is_a_miss() {
        let screen = GrayImage::from_pixel(16, 16, Luma([80]));
        let result = find_match(&screen, &template(1, 32, 8), 0.5);
        assert!(!result.found);
    }

    #[test]
    fn identical_inputs_produce_identical_output() {
        let screen = screen_with(3, (5, 7));
        let tpl = template(3, 8, 6);
        assert_eq!(find_match(&screen, &tpl, 0.8), find_match(&screen, &tpl, 0.8));
    }

    #[test]
    fn threshold_gates_found_but_not_the_report() {
        let screen = screen_with(2, (30, 20));
        let tpl = template(2, 8, 6);
        let strict = find_match(&screen, &tpl, 0.999_999);
        let lax = find_match(&screen, &tpl, 0.8);
        assert_eq!((strict.x, strict.y), (lax.x, lax.y));
        assert!(lax.found);
    }
}
