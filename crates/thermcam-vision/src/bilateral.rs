use thermcam_types::config::BilateralConfig;

/// Largest summed per-channel difference between two RGB pixels.
const MAX_COLOR_DISTANCE: usize = 3 * 255;

/// Edge-preserving smoothing over the `width` x `height` region at the top
/// left of an RGB buffer with `stride` pixels per row.
///
/// Neighbours are weighted by spatial distance and by colour distance, so
/// flat areas blur while sharp colour steps survive. Borders are clamped.
pub fn apply(
    pixels: &mut [u8],
    stride: usize,
    (width, height): (usize, usize),
    config: &BilateralConfig,
) {
    let radius = (config.diameter / 2) as isize;
    if radius == 0 || width == 0 || height == 0 {
        return;
    }

    let space_coeff = -0.5 / (config.sigma_space * config.sigma_space);
    let mut kernel = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f32;
            if dist2 > (radius * radius) as f32 {
                continue;
            }
            kernel.push((dx, dy, (dist2 * space_coeff).exp()));
        }
    }

    let color_coeff = -0.5 / (config.sigma_color * config.sigma_color);
    let color_weights: Vec<f32> = (0..=MAX_COLOR_DISTANCE)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let source = pixels.to_vec();
    let at = |x: usize, y: usize| {
        let offset = (y * stride + x) * 3;
        [source[offset], source[offset + 1], source[offset + 2]]
    };

    for y in 0..height {
        for x in 0..width {
            let centre = at(x, y);
            let mut sum = [0f32; 3];
            let mut total = 0f32;
            for &(dx, dy, space_weight) in &kernel {
                let nx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                let ny = (y as isize + dy).clamp(0, height as isize - 1) as usize;
                let neighbour = at(nx, ny);
                let distance: usize = centre
                    .iter()
                    .zip(neighbour.iter())
                    .map(|(a, b)| a.abs_diff(*b) as usize)
                    .sum();
                let weight = space_weight * color_weights[distance];
                for (acc, channel) in sum.iter_mut().zip(neighbour) {
                    *acc += weight * channel as f32;
                }
                total += weight;
            }
            let offset = (y * stride + x) * 3;
            for (out, acc) in pixels[offset..offset + 3].iter_mut().zip(sum) {
                *out = (acc / total).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
