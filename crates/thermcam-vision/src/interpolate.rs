use thermcam_types::config::Interpolation;

/// Upscales a row-major grid by an integer factor.
pub fn upscale(
    src: &[f32],
    width: usize,
    height: usize,
    factor: usize,
    method: Interpolation,
) -> Vec<f32> {
    let out_w = width * factor;
    let out_h = height * factor;
    let mut out = Vec::with_capacity(out_w * out_h);
    match method {
        Interpolation::Nearest => {
            for y in 0..out_h {
                let row = &src[(y / factor) * width..(y / factor + 1) * width];
                out.extend((0..out_w).map(|x| row[x / factor]));
            }
        }
        Interpolation::Bilinear => {
            let xs: Vec<(usize, usize, f32)> = (0..out_w)
                .map(|x| source_coord(x, factor, width))
                .collect();
            for y in 0..out_h {
                let (y0, y1, fy) = source_coord(y, factor, height);
                let top = &src[y0 * width..(y0 + 1) * width];
                let bottom = &src[y1 * width..(y1 + 1) * width];
                for &(x0, x1, fx) in &xs {
                    let upper = top[x0] + (top[x1] - top[x0]) * fx;
                    let lower = bottom[x0] + (bottom[x1] - bottom[x0]) * fx;
                    out.push(upper + (lower - upper) * fy);
                }
            }
        }
    }
    out
}

/// Half-pixel-centre mapping of an output index onto the source axis.
fn source_coord(dst: usize, factor: usize, len: usize) -> (usize, usize, f32) {
    let max = (len - 1) as f32;
    let pos = ((dst as f32 + 0.5) / factor as f32 - 0.5).clamp(0.0, max);
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(len - 1);
    (lo, hi, pos - lo as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_repeats_cells() {
        let out = upscale(&[1.0, 2.0, 3.0, 4.0], 2, 2, 2, Interpolation::Nearest);
        assert_eq!(
            out,
            vec![
                1.0, 1.0, 2.0, 2.0, //
                1.0, 1.0, 2.0, 2.0, //
                3.0, 3.0, 4.0, 4.0, //
                3.0, 3.0, 4.0, 4.0,
            ]
        );
    }

    #[test]
    fn bilinear_blends_between_cells_and_clamps_edges() {
        let out = upscale(&[0.0, 10.0], 2, 1, 4, Interpolation::Bilinear);
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[7], 10.0);
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert!(out[3] > 0.0 && out[3] < 10.0);
    }

    #[test]
    fn factor_one_is_identity() {
        let src = vec![1.0, 5.0, -2.0, 8.0, 3.0, 0.5];
        assert_eq!(upscale(&src, 3, 2, 1, Interpolation::Bilinear), src);
        assert_eq!(upscale(&src, 3, 2, 1, Interpolation::Nearest), src);
    }
}
