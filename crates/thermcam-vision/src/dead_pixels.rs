use thermcam_types::ProcessingError;

/// Readings at or below this are cells the sensor failed to read.
const DEAD_THRESHOLD_C: f32 = -273.0;

pub fn is_dead(value: f32) -> bool {
    value.is_nan() || value <= DEAD_THRESHOLD_C
}

/// Replaces dead cells with the mean of their readable 3x3 neighbours.
pub fn repair(
    readings: &[f32],
    width: usize,
    height: usize,
    limit: usize,
) -> Result<Vec<f32>, ProcessingError> {
    let dead: Vec<usize> = readings
        .iter()
        .enumerate()
        .filter(|(_, v)| is_dead(**v))
        .map(|(idx, _)| idx)
        .collect();
    if dead.len() > limit {
        return Err(ProcessingError::DeadPixels {
            count: dead.len(),
            limit,
        });
    }

    let mut repaired = readings.to_vec();
    for &idx in &dead {
        let (x, y) = (idx % width, idx / width);
        let mut sum = 0.0;
        let mut count = 0usize;
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let value = readings[ny * width + nx];
                if !is_dead(value) {
                    sum += value;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return Err(ProcessingError::DeadPixels {
                count: dead.len(),
                limit,
            });
        }
        repaired[idx] = sum / count as f32;
    }
    Ok(repaired)
}
