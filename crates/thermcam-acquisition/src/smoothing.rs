/// Exponential moving average over per-frame min/max, used to calm
/// colour flicker under auto range.
#[derive(Debug, Clone)]
pub struct RangeSmoother {
    history_weight: f32,
    current: Option<(f32, f32)>,
}

impl RangeSmoother {
    pub fn new(history_weight: f32) -> Self {
        Self {
            history_weight: history_weight.clamp(0.0, 0.999),
            current: None,
        }
    }

    pub fn update(&mut self, min: f32, max: f32) -> (f32, f32) {
        let w = self.history_weight;
        let next = match self.current {
            None => (min, max),
            Some((prev_min, prev_max)) => (
                w * prev_min + (1.0 - w) * min,
                w * prev_max + (1.0 - w) * max,
            ),
        };
        self.current = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_passes_through_then_blends() {
        let mut smoother = RangeSmoother::new(0.75);
        assert_eq!(smoother.update(20.0, 40.0), (20.0, 40.0));
        assert_eq!(smoother.update(24.0, 48.0), (21.0, 42.0));
    }
}
