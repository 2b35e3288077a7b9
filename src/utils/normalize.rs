/// Spike-in scale factor computation. Pure function of the two cached
/// counts; recomputed on resume, never persisted.

use crate::config::defs::{PipelineError, SampleRole};

/// Fixed decimal precision of the factors. Downstream subsampling takes
/// the factor as a literal fraction string, so the precision is part of
/// run reproducibility.
pub const FACTOR_PRECISION: u32 = 6;

/// Computes per-sample subsampling factors from spike-in read counts.
/// The smaller-count sample gets 1.0; the other is scaled down by
/// min/count. A zero count on either side is an invariant violation
/// distinct from tool failure.
pub fn scale_factors(treat: u64, control: u64) -> Result<(f64, f64), PipelineError> {
    if treat == 0 {
        return Err(PipelineError::ZeroSpikeinCount {
            role: SampleRole::Treatment,
        });
    }
    if control == 0 {
        return Err(PipelineError::ZeroSpikeinCount {
            role: SampleRole::Control,
        });
    }

    let min_count = treat.min(control) as f64;
    let factor_treat = round_fixed(min_count / treat as f64);
    let factor_control = round_fixed(min_count / control as f64);
    Ok((factor_treat, factor_control))
}

fn round_fixed(x: f64) -> f64 {
    let scale = 10f64.powi(FACTOR_PRECISION as i32);
    (x * scale).round() / scale
}

/// Renders a factor the way the subsampler consumes it.
pub fn format_factor(factor: f64) -> String {
    format!("{:.1$}", factor, FACTOR_PRECISION as usize)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_scenario() {
        // treatment 1,000,000 vs control 250,000
        let (ft, fc) = scale_factors(1_000_000, 250_000).unwrap();
        assert_eq!(ft, 0.25);
        assert_eq!(fc, 1.0);
    }

    #[test]
    fn test_smaller_sample_always_gets_unit_factor() {
        let pairs: [(u64, u64); 5] = [
            (10, 20),
            (20, 10),
            (1, 1_000_000),
            (3, 7),
            (123_456, 654_321),
        ];
        for (a, b) in pairs {
            let (ft, fc) = scale_factors(a, b).unwrap();
            assert_eq!(ft.max(fc), 1.0, "counts ({}, {})", a, b);
            let expected = round_fixed(a.min(b) as f64 / a.max(b) as f64);
            assert_eq!(ft.min(fc), expected, "counts ({}, {})", a, b);
        }
    }

    #[test]
    fn test_equal_counts_give_unit_factors() {
        let (ft, fc) = scale_factors(5_000, 5_000).unwrap();
        assert_eq!(ft, 1.0);
        assert_eq!(fc, 1.0);
    }

    #[test]
    fn test_zero_counts_are_invariant_violations() {
        match scale_factors(0, 100) {
            Err(PipelineError::ZeroSpikeinCount { role }) => {
                assert_eq!(role, SampleRole::Treatment)
            }
            other => panic!("expected ZeroSpikeinCount, got {:?}", other),
        }
        match scale_factors(100, 0) {
            Err(PipelineError::ZeroSpikeinCount { role }) => {
                assert_eq!(role, SampleRole::Control)
            }
            other => panic!("expected ZeroSpikeinCount, got {:?}", other),
        }
        assert!(scale_factors(0, 0).is_err());
    }

    #[test]
    fn test_factor_rounds_to_six_decimals() {
        let (ft, fc) = scale_factors(7, 3).unwrap();
        assert_eq!(fc, 1.0);
        // 3/7 = 0.428571428... rounds to 0.428571
        assert_eq!(ft, 0.428571);
    }

    #[test]
    fn test_format_factor_fixed_width() {
        assert_eq!(format_factor(0.25), "0.250000");
        assert_eq!(format_factor(1.0), "1.000000");
        assert_eq!(format_factor(0.428571), "0.428571");
    }
}
