pub const DEFAULT_BATCH_SIZE: u32 = 50;
pub const DEFAULT_MAX_BATCHES: u32 = 20;
pub const MIN_BATCH: u32 = 1;
pub const MAX_BATCH: u32 = 200;

/// Clamp a caller-supplied number into `[min, max]`.
///
/// Fractions are truncated toward zero and non-finite values map to `min`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_int(value: f64, min: u32, max: u32) -> u32 {
    if !value.is_finite() {
        return min;
    }
    let truncated = value.trunc();
    if truncated <= f64::from(min) {
        min
    } else if truncated >= f64::from(max) {
        max
    } else {
        truncated as u32
    }
}

/// Normalized knobs shared by both backfill jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillParams {
    pub dry_run: bool,
    pub batch_size: u32,
    pub max_batches: u32,
}

impl Default for BackfillParams {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batches: DEFAULT_MAX_BATCHES,
        }
    }
}

impl BackfillParams {
    /// Build params from raw caller input, applying defaults and clamps.
    #[must_use]
    pub fn from_raw(dry_run: Option<bool>, batch_size: Option<f64>, max_batches: Option<f64>) -> Self {
        Self {
            dry_run: dry_run.unwrap_or(false),
            batch_size: clamp_int(
                batch_size.unwrap_or(f64::from(DEFAULT_BATCH_SIZE)),
                MIN_BATCH,
                MAX_BATCH,
            ),
            max_batches: clamp_int(
                max_batches.unwrap_or(f64::from(DEFAULT_MAX_BATCHES)),
                MIN_BATCH,
                MAX_BATCH,
            ),
        }
    }

    /// Defaults with only the dry-run flag chosen, as used by scheduled runs.
    #[must_use]
    pub fn scheduled(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn clamp_examples() {
        assert_eq!(clamp_int(500.0, 1, 200), 200);
        assert_eq!(clamp_int(0.9, 1, 200), 1);
        assert_eq!(clamp_int(f64::NAN, 1, 200), 1);
        assert_eq!(clamp_int(f64::INFINITY, 1, 200), 1);
        assert_eq!(clamp_int(f64::NEG_INFINITY, 1, 200), 1);
        assert_eq!(clamp_int(-3.0, 1, 200), 1);
        assert_eq!(clamp_int(42.99, 1, 200), 42);
        assert_eq!(clamp_int(200.5, 1, 200), 200);
    }

    #[test]
    fn from_raw_applies_defaults() {
        let params = BackfillParams::from_raw(None, None, None);
        assert_eq!(params, BackfillParams::default());
        assert!(!params.dry_run);
        assert_eq!(params.batch_size, 50);
        assert_eq!(params.max_batches, 20);
    }

    #[test]
    fn from_raw_clamps_inputs() {
        let params = BackfillParams::from_raw(Some(true), Some(1000.0), Some(0.0));
        assert!(params.dry_run);
        assert_eq!(params.batch_size, 200);
        assert_eq!(params.max_batches, 1);
    }

    #[test]
    fn scheduled_uses_default_sizes() {
        let params = BackfillParams::scheduled(true);
        assert!(params.dry_run);
        assert_eq!(params.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(params.max_batches, DEFAULT_MAX_BATCHES);
    }

    proptest! {
        #[test]
        fn clamp_stays_in_range(value in proptest::num::f64::ANY, min in 0u32..100, span in 0u32..100) {
            let max = min + span;
            let out = clamp_int(value, min, max);
            prop_assert!(out >= min && out <= max);
        }

        #[test]
        fn clamp_truncates_in_range_values(value in 1.0f64..200.0) {
            prop_assert_eq!(clamp_int(value, 1, 200), value.trunc() as u32);
        }
    }
}
