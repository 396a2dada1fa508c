//! Randomized cycle intervals.

use o2_core::Timing;
use rand::Rng;

/// Delay for a uniform `sample` in `[0, 1)`:
/// `min + floor(sample * (max - min + 1))`, always within `[min, max]`.
pub fn jittered_delay(min_ms: u64, max_ms: u64, sample: f64) -> u64 {
    let (min, max) = (min_ms.min(max_ms), min_ms.max(max_ms));
    let span = (max - min).saturating_add(1) as f64;
    let offset = (sample.clamp(0.0, 1.0) * span).floor() as u64;
    min + offset.min(max - min)
}

/// Random delay within the timing window.
pub fn random_delay(timing: &Timing) -> u64 {
    let (min, max) = timing.bounds();
    jittered_delay(min, max, rand::thread_rng().gen::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extremes_stay_in_bounds() {
        assert_eq!(jittered_delay(3_000, 5_000, 0.0), 3_000);
        assert_eq!(jittered_delay(3_000, 5_000, 0.999_999_9), 5_000);
        assert_eq!(jittered_delay(3_000, 5_000, 1.0), 5_000);
    }

    #[test]
    fn test_swapped_bounds_are_ordered() {
        assert_eq!(jittered_delay(5_000, 3_000, 0.0), 3_000);
    }

    #[test]
    fn test_zero_width_window() {
        assert_eq!(jittered_delay(2_500, 2_500, 0.7), 2_500);
    }

    #[test]
    fn test_random_delay_within_window() {
        let timing = Timing {
            cycle_interval_min_ms: 100,
            cycle_interval_max_ms: 110,
        };
        for _ in 0..1_000 {
            let d = random_delay(&timing);
            assert!((100..=110).contains(&d), "delay {d} out of range");
        }
    }
}
