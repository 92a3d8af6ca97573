//! Gradient colormaps resolved into 256-entry lookup tables.

use thermcam_types::config::ColormapKind;

type Stop = (f32, [f32; 3]);

const JET: &[Stop] = &[
    (0.0, [0.0, 0.0, 0.5]),
    (0.125, [0.0, 0.0, 1.0]),
    (0.375, [0.0, 1.0, 1.0]),
    (0.625, [1.0, 1.0, 0.0]),
    (0.875, [1.0, 0.0, 0.0]),
    (1.0, [0.5, 0.0, 0.0]),
];

const BWR: &[Stop] = &[
    (0.0, [0.0, 0.0, 1.0]),
    (0.5, [1.0, 1.0, 1.0]),
    (1.0, [1.0, 0.0, 0.0]),
];

const SEISMIC: &[Stop] = &[
    (0.0, [0.0, 0.0, 0.3]),
    (0.25, [0.0, 0.0, 1.0]),
    (0.5, [1.0, 1.0, 1.0]),
    (0.75, [1.0, 0.0, 0.0]),
    (1.0, [0.5, 0.0, 0.0]),
];

const COOLWARM: &[Stop] = &[
    (0.0, [0.230, 0.299, 0.754]),
    (0.25, [0.552, 0.690, 0.996]),
    (0.5, [0.865, 0.865, 0.865]),
    (0.75, [0.958, 0.603, 0.482]),
    (1.0, [0.706, 0.016, 0.150]),
];

// Breakpoints of gnuplot's rgbformulae 7,5,15 so linear segments are exact.
const GNUPLOT2: &[Stop] = &[
    (0.0, [0.0, 0.0, 0.0]),
    (0.244, [0.0, 0.0, 0.976]),
    (0.25, [0.0187, 0.0, 1.0]),
    (0.42, [0.5438, 0.0, 1.0]),
    (0.564, [1.0, 0.288, 0.712]),
    (0.92, [1.0, 1.0, 0.0]),
    (1.0, [1.0, 1.0, 1.0]),
];

const BRG: &[Stop] = &[
    (0.0, [0.0, 0.0, 1.0]),
    (0.5, [1.0, 0.0, 0.0]),
    (1.0, [0.0, 1.0, 0.0]),
];

const GRAYSCALE: &[Stop] = &[(0.0, [0.0, 0.0, 0.0]), (1.0, [1.0, 1.0, 1.0])];

#[derive(Debug, Clone)]
pub struct Colormap {
    lut: [[u8; 3]; 256],
}

impl Colormap {
    pub fn new(kind: ColormapKind) -> Self {
        let stops = stops_for(kind);
        let mut lut = [[0u8; 3]; 256];
        for (idx, entry) in lut.iter_mut().enumerate() {
            let rgb = sample(stops, idx as f32 / 255.0);
            *entry = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
        Self { lut }
    }

    /// Colour for a normalised position in `[0, 1]`; values outside are clamped.
    pub fn color(&self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        self.lut[(t * 255.0).round() as usize]
    }
}

fn stops_for(kind: ColormapKind) -> &'static [Stop] {
    match kind {
        ColormapKind::Jet => JET,
        ColormapKind::Bwr => BWR,
        ColormapKind::Seismic => SEISMIC,
        ColormapKind::Coolwarm => COOLWARM,
        ColormapKind::Gnuplot2 => GNUPLOT2,
        ColormapKind::Brg => BRG,
        ColormapKind::Grayscale => GRAYSCALE,
    }
}

fn sample(stops: &[Stop], t: f32) -> [f32; 3] {
    let (first_pos, first) = stops[0];
    if t <= first_pos {
        return first;
    }
    for pair in stops.windows(2) {
        let (p0, c0) = pair[0];
        let (p1, c1) = pair[1];
        if t <= p1 {
            let w = if p1 > p0 { (t - p0) / (p1 - p0) } else { 1.0 };
            return [
                c0[0] + (c1[0] - c0[0]) * w,
                c0[1] + (c1[1] - c0[1]) * w,
                c0[2] + (c1[2] - c0[2]) * w,
            ];
        }
    }
    stops[stops.len() - 1].1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grayscale_endpoints_and_midpoint() {
        let map = Colormap::new(ColormapKind::Grayscale);
        assert_eq!(map.color(0.0), [0, 0, 0]);
        assert_eq!(map.color(1.0), [255, 255, 255]);
        assert_eq!(map.color(0.5), [128, 128, 128]);
    }

    #[test]
    fn out_of_range_positions_clamp() {
        let map = Colormap::new(ColormapKind::Jet);
        assert_eq!(map.color(-3.0), map.color(0.0));
        assert_eq!(map.color(7.5), map.color(1.0));
        assert_eq!(map.color(f32::NAN), map.color(0.0));
    }

    #[test]
    fn diverging_maps_are_near_white_in_the_middle() {
        for kind in [ColormapKind::Bwr, ColormapKind::Seismic] {
            let mid = Colormap::new(kind).color(0.5);
            assert!(mid.iter().all(|c| *c >= 250), "{kind:?} mid {mid:?}");
        }
    }

    #[test]
    fn jet_runs_from_blue_to_red() {
        let map = Colormap::new(ColormapKind::Jet);
        let cold = map.color(0.0);
        let hot = map.color(1.0);
        assert!(cold[2] > cold[0]);
        assert!(hot[0] > hot[2]);
    }
}
