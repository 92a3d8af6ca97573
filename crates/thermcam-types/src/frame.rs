use bytes::Bytes;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::{Result, SensorFailure};

/// One grid of temperature readings as delivered by the sensor, row-major, in °C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    width: usize,
    height: usize,
    temperatures: Vec<f32>,
    sequence: u64,
    captured_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(
        width: usize,
        height: usize,
        temperatures: Vec<f32>,
        sequence: u64,
        captured_at: DateTime<Utc>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SensorFailure::InvalidData("frame has no cells".into()).into());
        }
        if temperatures.len() != width * height {
            return Err(SensorFailure::InvalidData(format!(
                "expected {} readings for {}x{}, got {}",
                width * height,
                width,
                height,
                temperatures.len()
            ))
            .into());
        }
        Ok(Self {
            width,
            height,
            temperatures,
            sequence,
            captured_at,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn temperatures(&self) -> &[f32] {
        &self.temperatures
    }

    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.temperatures[y * self.width + x]
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Summary of the temperatures behind a processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub min_c: f32,
    pub max_c: f32,
    pub mean_c: f32,
    /// Range the colormap was stretched over; differs from min/max under fixed or smoothed ranges.
    pub scale_min_c: f32,
    pub scale_max_c: f32,
}

/// Display-ready RGB image derived from exactly one [`RawFrame`].
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    sequence: u64,
    captured_at: DateTime<Utc>,
    stats: FrameStats,
    jpeg: OnceCell<Bytes>,
}

impl ProcessedFrame {
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        sequence: u64,
        captured_at: DateTime<Utc>,
        stats: FrameStats,
    ) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            pixels,
            sequence,
            captured_at,
            stats,
            jpeg: OnceCell::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB8 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Encoded image bytes, produced on first request and shared afterwards.
    pub fn encoded_or_try_init<F, E>(&self, encode: F) -> std::result::Result<Bytes, E>
    where
        F: FnOnce() -> std::result::Result<Bytes, E>,
    {
        self.jpeg.get_or_try_init(encode).map(Bytes::clone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_celsius(self, celsius: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThermcamError;

    #[test]
    fn raw_frame_rejects_wrong_cell_count() {
        let err = RawFrame::new(4, 3, vec![20.0; 11], 1, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            ThermcamError::Sensor(SensorFailure::InvalidData(_))
        ));
        assert!(RawFrame::new(0, 3, Vec::new(), 1, Utc::now()).is_err());
    }

    #[test]
    fn raw_frame_indexes_row_major() {
        let temps: Vec<f32> = (0..6).map(|v| v as f32).collect();
        let frame = RawFrame::new(3, 2, temps, 7, Utc::now()).expect("valid frame");
        assert_eq!(frame.at(2, 0), 2.0);
        assert_eq!(frame.at(0, 1), 3.0);
        assert_eq!(frame.sequence(), 7);
    }

    #[test]
    fn encoded_bytes_are_computed_once() {
        let stats = FrameStats {
            min_c: 0.0,
            max_c: 0.0,
            mean_c: 0.0,
            scale_min_c: 0.0,
            scale_max_c: 0.0,
        };
        let frame = ProcessedFrame::new(1, 1, vec![1, 2, 3], 1, Utc::now(), stats);
        let mut calls = 0;
        let first: std::result::Result<Bytes, ()> = frame.encoded_or_try_init(|| {
            calls += 1;
            Ok(Bytes::from_static(b"abc"))
        });
        let second: std::result::Result<Bytes, ()> =
            frame.encoded_or_try_init(|| Ok(Bytes::from_static(b"zzz")));
        assert_eq!(calls, 1);
        assert_eq!(first.expect("first"), second.expect("second"));
    }

    #[test]
    fn fahrenheit_conversion() {
        assert_eq!(TemperatureUnit::Fahrenheit.from_celsius(100.0), 212.0);
        assert_eq!(TemperatureUnit::Celsius.from_celsius(21.5), 21.5);
    }
}
