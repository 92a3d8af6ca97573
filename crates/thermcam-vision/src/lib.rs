//! Turns raw temperature grids into display-ready images.

mod bilateral;
mod colorbar;
pub mod colormap;
mod dead_pixels;
mod interpolate;

use std::{
    fs,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, ColorType, ImageBuffer, Rgb};
use thermcam_types::{
    config::{ProcessingConfig, RangeMode},
    frame::{FrameStats, ProcessedFrame, RawFrame},
    ProcessingError, Result, ThermcamError,
};
use tracing::debug;

pub use colormap::Colormap;
pub use dead_pixels::is_dead;

/// Spans narrower than this render as a single colour.
const MIN_SPAN_C: f32 = 1e-6;

/// Repaired and validated readings of one frame.
struct Prepared {
    readings: Vec<f32>,
    min_c: f32,
    max_c: f32,
    mean_c: f32,
}

/// Pure raw-to-image conversion for one sensor geometry.
///
/// Output dimensions depend only on the configuration and sensor size, so
/// they never change for the lifetime of a processor.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    config: ProcessingConfig,
    sensor_width: usize,
    sensor_height: usize,
    colormap: Colormap,
}

impl FrameProcessor {
    pub fn new(config: ProcessingConfig, sensor_width: usize, sensor_height: usize) -> Self {
        let colormap = Colormap::new(config.colormap);
        Self {
            config,
            sensor_width,
            sensor_height,
            colormap,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Size of the thermal image without the colorbar strip.
    pub fn image_dimensions(&self) -> (u32, u32) {
        let factor = self.config.interpolation_factor.max(1);
        (
            self.sensor_width as u32 * factor,
            self.sensor_height as u32 * factor,
        )
    }

    pub fn output_dimensions(&self) -> (u32, u32) {
        let (width, height) = self.image_dimensions();
        let strip = self
            .config
            .colorbar
            .as_ref()
            .map(colorbar::strip_width)
            .unwrap_or(0);
        (width + strip, height)
    }

    pub fn process(&self, raw: &RawFrame) -> Result<ProcessedFrame, ProcessingError> {
        self.process_with_range(raw, self.config.range)
    }

    /// Same as [`process`](Self::process) but colours over `range` instead of the configured one.
    pub fn process_with_range(
        &self,
        raw: &RawFrame,
        range: RangeMode,
    ) -> Result<ProcessedFrame, ProcessingError> {
        let prepared = self.prepare(raw)?;
        let (scale_min_c, scale_max_c) = match range {
            RangeMode::Auto => (prepared.min_c, prepared.max_c),
            RangeMode::Fixed { min, max } => (min, max),
        };

        let (image_w, image_h) = self.image_dimensions();
        let (out_w, out_h) = self.output_dimensions();
        let upscaled = interpolate::upscale(
            &prepared.readings,
            self.sensor_width,
            self.sensor_height,
            self.config.interpolation_factor.max(1) as usize,
            self.config.interpolation,
        );

        let span = scale_max_c - scale_min_c;
        let mut pixels = vec![0u8; out_w as usize * out_h as usize * 3];
        for (idx, value) in upscaled.iter().enumerate() {
            let x = idx % image_w as usize;
            let y = idx / image_w as usize;
            let x = if self.config.mirror_horizontal {
                image_w as usize - 1 - x
            } else {
                x
            };
            let t = if span > MIN_SPAN_C {
                (value - scale_min_c) / span
            } else {
                0.0
            };
            let offset = (y * out_w as usize + x) * 3;
            pixels[offset..offset + 3].copy_from_slice(&self.colormap.color(t));
        }

        if let Some(filter) = &self.config.filter {
            bilateral::apply(
                &mut pixels,
                out_w as usize,
                (image_w as usize, image_h as usize),
                filter,
            );
        }

        if let Some(bar) = &self.config.colorbar {
            colorbar::draw(
                &mut pixels,
                (out_w, out_h),
                image_w,
                bar,
                &self.colormap,
                (scale_min_c, scale_max_c),
            );
        }

        debug!(
            "Processed frame {} ({:.1}..{:.1}°C)",
            raw.sequence(),
            prepared.min_c,
            prepared.max_c
        );
        Ok(ProcessedFrame::new(
            out_w,
            out_h,
            pixels,
            raw.sequence(),
            raw.captured_at(),
            FrameStats {
                min_c: prepared.min_c,
                max_c: prepared.max_c,
                mean_c: prepared.mean_c,
                scale_min_c,
                scale_max_c,
            },
        ))
    }

    /// Min and max of the repaired frame, as `AutoRange` would use them.
    pub fn measure(&self, raw: &RawFrame) -> Result<(f32, f32), ProcessingError> {
        let prepared = self.prepare(raw)?;
        Ok((prepared.min_c, prepared.max_c))
    }

    fn prepare(&self, raw: &RawFrame) -> Result<Prepared, ProcessingError> {
        if raw.width() != self.sensor_width || raw.height() != self.sensor_height {
            return Err(ProcessingError::DimensionMismatch {
                expected_width: self.sensor_width,
                expected_height: self.sensor_height,
                actual_width: raw.width(),
                actual_height: raw.height(),
            });
        }
        let readings = dead_pixels::repair(
            raw.temperatures(),
            raw.width(),
            raw.height(),
            self.config.max_dead_pixels,
        )?;

        let (min, max) = (self.config.plausible_min_c, self.config.plausible_max_c);
        let mut min_c = f32::INFINITY;
        let mut max_c = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        for (idx, &value) in readings.iter().enumerate() {
            if !(min..=max).contains(&value) {
                return Err(ProcessingError::OutOfRange {
                    x: idx % raw.width(),
                    y: idx / raw.width(),
                    value,
                    min,
                    max,
                });
            }
            min_c = min_c.min(value);
            max_c = max_c.max(value);
            sum += value as f64;
        }
        let mean_c = (sum / readings.len() as f64) as f32;
        Ok(Prepared {
            readings,
            min_c,
            max_c,
            mean_c,
        })
    }
}

/// Stateless convenience wrapper around [`FrameProcessor::process`].
pub fn process_frame(
    raw: &RawFrame,
    config: &ProcessingConfig,
) -> Result<ProcessedFrame, ProcessingError> {
    FrameProcessor::new(config.clone(), raw.width(), raw.height()).process(raw)
}

pub fn encode_jpeg(frame: &ProcessedFrame, quality: u8) -> Result<Bytes> {
    let mut buffer = Vec::with_capacity(frame.pixels().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(frame.pixels(), frame.width(), frame.height(), ColorType::Rgb8)
        .map_err(|err| imaging_error(format!("jpeg encoding failed: {err}")))?;
    Ok(Bytes::from(buffer))
}

/// Writes the frame as a PNG into `dir`, returning the file path.
pub fn persist_snapshot(frame: &ProcessedFrame, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| {
        imaging_error(format!(
            "failed to create snapshot directory {}: {err}",
            dir.display()
        ))
    })?;
    let timestamp = frame.captured_at().format("%Y%m%d_%H%M%S_%3f");
    let path = dir.join(format!("frame_{}_{}.png", timestamp, frame.sequence()));
    let Some(buffer) = ImageBuffer::<Rgb<u8>, _>::from_raw(
        frame.width(),
        frame.height(),
        frame.pixels().to_vec(),
    ) else {
        return Err(imaging_error("pixel buffer does not match frame size"));
    };
    buffer
        .save(&path)
        .map_err(|err| imaging_error(format!("failed to save snapshot: {err}")))?;
    Ok(path)
}

pub fn imaging_error(message: impl Into<String>) -> ThermcamError {
    ThermcamError::Imaging(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use thermcam_types::config::{BilateralConfig, ColorbarConfig, ColormapKind, Interpolation};

    fn raw(width: usize, height: usize, temps: Vec<f32>, seq: u64) -> RawFrame {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        RawFrame::new(width, height, temps, seq, at).expect("valid raw frame")
    }

    fn gradient(width: usize, height: usize) -> Vec<f32> {
        (0..width * height).map(|i| 20.0 + (i % width) as f32).collect()
    }

    fn small_config() -> ProcessingConfig {
        ProcessingConfig {
            interpolation_factor: 3,
            mirror_horizontal: false,
            ..ProcessingConfig::default()
        }
    }

    #[test]
    fn processing_is_deterministic() {
        let processor = FrameProcessor::new(small_config(), 8, 6);
        let frame = raw(8, 6, gradient(8, 6), 4);
        let a = processor.process(&frame).expect("process a");
        let b = processor.process(&frame).expect("process b");
        assert_eq!(a.pixels(), b.pixels());
        assert_eq!(a.stats(), b.stats());
        assert_eq!(a.sequence(), 4);
        assert_eq!(a.captured_at(), frame.captured_at());
    }

    #[test]
    fn filtered_processing_is_deterministic() {
        let config = ProcessingConfig {
            filter: Some(BilateralConfig::default()),
            ..small_config()
        };
        let processor = FrameProcessor::new(config, 8, 6);
        let frame = raw(8, 6, gradient(8, 6), 2);
        let a = processor.process(&frame).expect("filtered a");
        let b = processor.process(&frame).expect("filtered b");
        assert_eq!(a.pixels(), b.pixels());

        let plain = FrameProcessor::new(small_config(), 8, 6)
            .process(&frame)
            .expect("unfiltered");
        assert_eq!((a.width(), a.height()), (plain.width(), plain.height()));
        assert_ne!(a.pixels(), plain.pixels());
        assert_eq!(a.stats(), plain.stats());
    }

    #[test]
    fn uniform_frame_with_auto_range_is_one_colour() {
        let processor = FrameProcessor::new(small_config(), 8, 6);
        let processed = processor
            .process(&raw(8, 6, vec![0.0; 48], 1))
            .expect("uniform frame");
        let first = processed.pixel(0, 0);
        assert!(processed.pixels().chunks(3).all(|px| px == first));
        assert_eq!(processed.stats().scale_min_c, processed.stats().scale_max_c);
    }

    #[test]
    fn output_size_follows_factor_and_colorbar() {
        let mut config = small_config();
        let processor = FrameProcessor::new(config.clone(), 32, 24);
        assert_eq!(processor.output_dimensions(), (96, 72));

        config.colorbar = Some(ColorbarConfig {
            width: 12,
            margin: 4,
            tick_step_c: 5.0,
        });
        let processor = FrameProcessor::new(config, 32, 24);
        assert_eq!(processor.output_dimensions(), (96 + 20, 72));
        let processed = processor
            .process(&raw(32, 24, gradient(32, 24), 1))
            .expect("process with colorbar");
        assert_eq!(processed.pixels().len(), 116 * 72 * 3);
    }

    #[test]
    fn fixed_range_clamps_colours() {
        let config = ProcessingConfig {
            range: RangeMode::Fixed {
                min: 25.0,
                max: 30.0,
            },
            interpolation_factor: 1,
            colormap: ColormapKind::Grayscale,
            ..small_config()
        };
        let processor = FrameProcessor::new(config, 3, 1);
        let processed = processor
            .process(&raw(3, 1, vec![10.0, 27.5, 80.0], 1))
            .expect("process");
        assert_eq!(processed.pixel(0, 0), [0, 0, 0]);
        assert_eq!(processed.pixel(2, 0), [255, 255, 255]);
        assert_eq!(processed.stats().scale_min_c, 25.0);
        assert_eq!(processed.stats().max_c, 80.0);
    }

    #[test]
    fn mirror_flips_columns() {
        let config = ProcessingConfig {
            interpolation_factor: 1,
            colormap: ColormapKind::Grayscale,
            mirror_horizontal: true,
            ..small_config()
        };
        let processed = FrameProcessor::new(config, 2, 1)
            .process(&raw(2, 1, vec![20.0, 30.0], 1))
            .expect("process");
        assert_eq!(processed.pixel(0, 0), [255, 255, 255]);
        assert_eq!(processed.pixel(1, 0), [0, 0, 0]);
    }

    #[test]
    fn implausible_reading_is_rejected() {
        let processor = FrameProcessor::new(small_config(), 2, 2);
        let err = processor
            .process(&raw(2, 2, vec![20.0, 20.0, 20.0, 450.0], 1))
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::OutOfRange { x: 1, y: 1, .. }
        ));
    }

    #[test]
    fn dead_pixel_is_repaired_before_statistics() {
        let processor = FrameProcessor::new(small_config(), 3, 1);
        let processed = processor
            .process(&raw(3, 1, vec![20.0, -273.15, 24.0], 1))
            .expect("repairable frame");
        assert_eq!(processed.stats().min_c, 20.0);
        assert!((processed.stats().mean_c - 22.0).abs() < 1e-4);
    }

    #[test]
    fn wrong_geometry_is_rejected() {
        let processor = FrameProcessor::new(small_config(), 4, 4);
        let err = processor
            .process(&raw(2, 2, vec![20.0; 4], 1))
            .unwrap_err();
        assert!(matches!(err, ProcessingError::DimensionMismatch { .. }));
    }

    #[test]
    fn nearest_and_bilinear_share_dimensions() {
        let frame = raw(4, 3, gradient(4, 3), 1);
        let nearest = process_frame(
            &frame,
            &ProcessingConfig {
                interpolation: Interpolation::Nearest,
                ..small_config()
            },
        )
        .expect("nearest");
        let bilinear = process_frame(&frame, &small_config()).expect("bilinear");
        assert_eq!(
            (nearest.width(), nearest.height()),
            (bilinear.width(), bilinear.height())
        );
        assert_ne!(nearest.pixels(), bilinear.pixels());
    }

    #[test]
    fn jpeg_output_has_soi_marker() {
        let processed = process_frame(&raw(4, 3, gradient(4, 3), 1), &small_config())
            .expect("process");
        let jpeg = encode_jpeg(&processed, 80).expect("encode");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn snapshot_is_written_as_png() {
        let dir = std::env::temp_dir().join(format!("thermcam-snapshots-{}", std::process::id()));
        let processed = process_frame(&raw(4, 3, gradient(4, 3), 9), &small_config())
            .expect("process");
        let path = persist_snapshot(&processed, &dir).expect("persist");
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with("_9.png"));
        fs::remove_dir_all(&dir).expect("cleanup snapshot dir");
    }
}
