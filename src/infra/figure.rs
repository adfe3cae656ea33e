// ============================================================
// Layer 6 — Figure Renderer
// ============================================================
// Turns a domain Figure into an 8-bit grayscale PNG.
//
//   ┌────────┐ gap ┌────────┐ gap ┌────────┐
//   │Original│     │Reduced │     │Predicted
//   └────────┘     └────────┘     └────────┘
//
// Each panel is min-max scaled on its own (like imshow with
// automatic limits). Row 0 of a panel is drawn at the bottom,
// so the image has a lower-left origin. Panels shorter than
// the tallest one are bottom-aligned on a white background.

use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use std::path::Path;

use crate::domain::figure::{Figure, Panel};

/// Horizontal space between panels, in pixels
const GAP: u32 = 4;
const BACKGROUND: u8 = 255;

pub fn render(figure: &Figure) -> GrayImage {
    let height = figure.panels.iter().map(|p| p.pixels.nrows()).max().unwrap_or(0) as u32;
    let width  = figure.panels.iter().map(|p| p.pixels.ncols() as u32).sum::<u32>()
        + GAP * figure.panels.len().saturating_sub(1) as u32;

    let mut img = GrayImage::from_pixel(width, height, Luma([BACKGROUND]));
    let mut x0  = 0u32;

    for panel in &figure.panels {
        draw_panel(&mut img, panel, x0, height);
        x0 += panel.pixels.ncols() as u32 + GAP;
    }
    img
}

fn draw_panel(img: &mut GrayImage, panel: &Panel, x0: u32, height: u32) {
    let (lo, hi) = finite_range(panel);

    for ((r, c), &v) in panel.pixels.indexed_iter() {
        let y = height - 1 - r as u32;
        img.put_pixel(x0 + c as u32, y, Luma([to_gray(v, lo, hi)]));
    }
}

fn finite_range(panel: &Panel) -> (f32, f32) {
    panel
        .pixels
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn to_gray(v: f32, lo: f32, hi: f32) -> u8 {
    let range = hi - lo;
    if !v.is_finite() || !range.is_finite() || range <= 0.0 {
        return 0;
    }
    (((v - lo) / range) * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Render and write as PNG.
pub fn save_png(figure: &Figure, path: &Path) -> Result<()> {
    let img = render(figure);
    if img.width() == 0 || img.height() == 0 {
        anyhow::bail!("Figure '{}' has no pixels to draw", figure.title);
    }
    img
        .save(path)
        .with_context(|| format!("Cannot write figure to '{}'", path.display()))
}
