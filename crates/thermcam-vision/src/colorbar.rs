//! Vertical temperature scale appended to the right of the thermal image.

use thermcam_types::config::ColorbarConfig;

use crate::{colormap::Colormap, MIN_SPAN_C};

const BACKGROUND: [u8; 3] = [255, 255, 255];
const TICK: [u8; 3] = [0, 0, 0];

pub fn strip_width(bar: &ColorbarConfig) -> u32 {
    bar.width + 2 * bar.margin
}

/// Paints the strip occupying columns `image_w..out_w`; hottest colour on top.
pub fn draw(
    pixels: &mut [u8],
    (out_w, out_h): (u32, u32),
    image_w: u32,
    bar: &ColorbarConfig,
    colormap: &Colormap,
    (lo, hi): (f32, f32),
) {
    let (out_w, height) = (out_w as usize, out_h as usize);
    let mut put = |x: usize, y: usize, rgb: [u8; 3]| {
        let offset = (y * out_w + x) * 3;
        pixels[offset..offset + 3].copy_from_slice(&rgb);
    };

    let strip_x0 = image_w as usize;
    for y in 0..height {
        for x in strip_x0..out_w {
            put(x, y, BACKGROUND);
        }
    }

    let margin = bar.margin as usize;
    let (top, bottom) = if height > 2 * margin + 1 {
        (margin, height - margin)
    } else {
        (0, height)
    };
    let bar_h = bottom - top;
    let bar_x0 = strip_x0 + margin;
    let bar_x1 = (bar_x0 + bar.width as usize).min(out_w);
    for row in 0..bar_h {
        let t = if bar_h > 1 {
            1.0 - row as f32 / (bar_h - 1) as f32
        } else {
            1.0
        };
        let rgb = colormap.color(t);
        for x in bar_x0..bar_x1 {
            put(x, top + row, rgb);
        }
    }

    let span = hi - lo;
    let tick_len = margin.max(2).min(out_w - bar_x1);
    if span <= MIN_SPAN_C || bar_h < 2 || tick_len == 0 || bar.tick_step_c <= 0.0 {
        return;
    }
    let base = (lo / bar.tick_step_c).floor() * bar.tick_step_c;
    for k in 0..=bar_h {
        let value = base + k as f32 * bar.tick_step_c;
        if value < lo {
            continue;
        }
        if value > hi {
            break;
        }
        let row = top + ((hi - value) / span * (bar_h - 1) as f32).round() as usize;
        for x in bar_x1..bar_x1 + tick_len {
            put(x, row, TICK);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermcam_types::config::ColormapKind;

    fn render(lo: f32, hi: f32) -> (Vec<u8>, u32, u32) {
        let bar = ColorbarConfig {
            width: 4,
            margin: 3,
            tick_step_c: 5.0,
        };
        let (out_w, out_h) = (2 + strip_width(&bar), 23);
        let mut pixels = vec![7u8; (out_w * out_h * 3) as usize];
        draw(
            &mut pixels,
            (out_w, out_h),
            2,
            &bar,
            &Colormap::new(ColormapKind::Grayscale),
            (lo, hi),
        );
        (pixels, out_w, out_h)
    }

    fn at(pixels: &[u8], out_w: u32, x: u32, y: u32) -> [u8; 3] {
        let offset = ((y * out_w + x) * 3) as usize;
        [pixels[offset], pixels[offset + 1], pixels[offset + 2]]
    }

    #[test]
    fn gradient_runs_hot_to_cold_and_leaves_image_alone() {
        let (pixels, out_w, out_h) = render(20.0, 40.0);
        assert_eq!(at(&pixels, out_w, 0, 0), [7, 7, 7]);
        assert_eq!(at(&pixels, out_w, 5, 3), [255, 255, 255]);
        assert_eq!(at(&pixels, out_w, 5, out_h - 4), [0, 0, 0]);
        assert_eq!(at(&pixels, out_w, 5, 0), BACKGROUND);
    }

    #[test]
    fn ticks_mark_multiples_of_step() {
        let (pixels, out_w, _) = render(20.0, 40.0);
        let tick_col = 2 + 3 + 4;
        let ticked: Vec<u32> = (0..23)
            .filter(|y| at(&pixels, out_w, tick_col, *y) == TICK)
            .collect();
        // 20 through 40 over a 17-row bar starting at row 3.
        assert_eq!(ticked, vec![3, 7, 11, 15, 19]);
    }

    #[test]
    fn ticks_below_the_range_are_skipped() {
        let (pixels, out_w, _) = render(21.0, 41.0);
        let tick_col = 2 + 3 + 4;
        let ticked: Vec<u32> = (0..23)
            .filter(|y| at(&pixels, out_w, tick_col, *y) == TICK)
            .collect();
        // 25, 30, 35 and 40; 20 lies below the scale.
        assert_eq!(ticked, vec![4, 8, 12, 16]);
    }

    #[test]
    fn flat_range_draws_no_ticks() {
        let (pixels, out_w, _) = render(30.0, 30.0);
        let tick_col = 2 + 3 + 4;
        assert!((0..23).all(|y| at(&pixels, out_w, tick_col, y) != TICK));
    }
}
