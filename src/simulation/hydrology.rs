//! # Reservoir Hydrology
//!
//! Inflow, outflow and the resulting volume/level update for one tick.
//! Flows are random walks with seasonal and level-dependent bias, clamped to
//! the dam's physical limits.

use chrono::{Datelike, NaiveDateTime};
use rand::Rng;

use crate::domain::{DamLimits, DamState};

/// Level above which inflow is shut off entirely (fraction of max height)
pub const INFLOW_CUTOFF_RATIO: f64 = 0.99;
/// Level above which inflow starts being throttled
pub const INFLOW_THROTTLE_RATIO: f64 = 0.90;

const INFLOW_NOISE: f64 = 1.0;
const OUTFLOW_NOISE: f64 = 5.0;
/// Extra gate opening when demand exceeds generation
const DEMAND_GATE_BIAS: f64 = 10.0;
const SPILL_RATIO: f64 = 0.8;
const CONSERVE_RATIO: f64 = 0.3;
const LEVEL_CORRECTION: f64 = 3.0;

/// Seasonal inflow bias for a calendar month (1-12)
///
/// Snowmelt in spring and autumn rains raise inflow, summer lowers it,
/// winter is neutral.
pub fn seasonal_inflow_bias(month: u32) -> f64 {
    match month {
        3..=5 => 0.3,
        6..=8 => -0.3,
        9..=11 => 0.3,
        _ => 0.0,
    }
}

/// Multiplier applied to inflow as the reservoir nears full
///
/// 1.0 up to 90% of max height, falling linearly to 0.0 at 99%, and 0.0
/// above that.
pub fn inflow_reduction_factor(level: f64, max_height: f64) -> f64 {
    if level > max_height * INFLOW_CUTOFF_RATIO {
        0.0
    } else if level > max_height * INFLOW_THROTTLE_RATIO {
        let band = max_height * (INFLOW_CUTOFF_RATIO - INFLOW_THROTTLE_RATIO);
        1.0 - (level - max_height * INFLOW_THROTTLE_RATIO) / band
    } else {
        1.0
    }
}

/// Next inflow given the previous one and the current level
pub fn simulate_inflow<R: Rng + ?Sized>(
    previous: f64,
    level: f64,
    limits: &DamLimits,
    now: NaiveDateTime,
    rng: &mut R,
) -> f64 {
    let variation = rng.gen_range(-INFLOW_NOISE..=INFLOW_NOISE);
    let inflow = (previous + variation + seasonal_inflow_bias(now.month()))
        .clamp(limits.min_inflow, limits.max_inflow);

    inflow * inflow_reduction_factor(level, limits.max_height)
}

/// Next outflow given the previous one, the current level and the demand
/// balance
///
/// `power_generated` is the figure from the previous tick's outflow; the
/// one-tick lag is part of the model.
pub fn simulate_outflow<R: Rng + ?Sized>(
    previous: f64,
    level: f64,
    energy_request: f64,
    power_generated: f64,
    limits: &DamLimits,
    rng: &mut R,
) -> f64 {
    let variation = rng.gen_range(-OUTFLOW_NOISE..=OUTFLOW_NOISE);
    let mut outflow = if energy_request > power_generated {
        previous + variation + DEMAND_GATE_BIAS
    } else {
        previous + variation
    };

    outflow += level_correction(level, limits.max_height);
    outflow.clamp(limits.min_outflow, limits.max_outflow)
}

/// Spill pressure when high, conservation when low
fn level_correction(level: f64, max_height: f64) -> f64 {
    if level > max_height * SPILL_RATIO {
        LEVEL_CORRECTION
    } else if level < max_height * CONSERVE_RATIO {
        -LEVEL_CORRECTION
    } else {
        0.0
    }
}

/// Apply one interval of net flow to the reservoir
pub fn update_volume_and_level(state: &mut DamState, inflow: f64, outflow: f64, limits: &DamLimits) {
    let volume_change = (inflow - outflow) * limits.interval_seconds;
    state.set_volume(state.volume + volume_change, limits);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn limits() -> DamLimits {
        DamLimits::new(100.0, 1_000_000.0, 50.0, 50.0)
    }

    fn at_month(month: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[rstest]
    #[case(1, 0.0)]
    #[case(3, 0.3)]
    #[case(5, 0.3)]
    #[case(6, -0.3)]
    #[case(8, -0.3)]
    #[case(9, 0.3)]
    #[case(11, 0.3)]
    #[case(12, 0.0)]
    fn test_seasonal_bias(#[case] month: u32, #[case] expected: f64) {
        assert_eq!(seasonal_inflow_bias(month), expected);
    }

    #[test]
    fn test_inflow_cut_when_nearly_full() {
        let limits = limits();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let inflow = simulate_inflow(40.0, 99.5, &limits, at_month(4), &mut rng);
            assert_eq!(inflow, 0.0);
        }
    }

    #[test]
    fn test_inflow_throttled_in_upper_band() {
        let factor = inflow_reduction_factor(95.0, 100.0);
        let expected = 1.0 - (95.0 - 90.0) / 9.0;
        assert!((factor - expected).abs() < 1e-12);
        assert!(factor > 0.0 && factor < 1.0);

        // Same seed, same draw: the throttled value is the unthrottled one
        // scaled by the factor.
        let limits = limits();
        let free = simulate_inflow(20.0, 50.0, &limits, at_month(1), &mut StdRng::seed_from_u64(3));
        let throttled =
            simulate_inflow(20.0, 95.0, &limits, at_month(1), &mut StdRng::seed_from_u64(3));
        assert!((throttled - free * factor).abs() < 1e-9);
    }

    #[test]
    fn test_inflow_unthrottled_below_band() {
        assert_eq!(inflow_reduction_factor(90.0, 100.0), 1.0);
        assert_eq!(inflow_reduction_factor(10.0, 100.0), 1.0);
    }

    #[test]
    fn test_inflow_stays_within_limits() {
        let limits = limits();
        let mut rng = StdRng::seed_from_u64(11);

        let mut inflow = 49.9;
        for _ in 0..1000 {
            inflow = simulate_inflow(inflow, 50.0, &limits, at_month(4), &mut rng);
            assert!(inflow >= limits.min_inflow && inflow <= limits.max_inflow);
        }

        let mut inflow = 0.1;
        for _ in 0..1000 {
            inflow = simulate_inflow(inflow, 50.0, &limits, at_month(7), &mut rng);
            assert!(inflow >= limits.min_inflow && inflow <= limits.max_inflow);
        }
    }

    #[test]
    fn test_outflow_opens_gates_under_demand() {
        let limits = limits();
        // Mid level: no correction. Noise is at most 5, bias is 10.
        let mut rng = StdRng::seed_from_u64(5);
        let outflow = simulate_outflow(20.0, 50.0, 100.0, 10.0, &limits, &mut rng);
        assert!(outflow >= 25.0 && outflow <= 35.0);

        let outflow = simulate_outflow(20.0, 50.0, 10.0, 100.0, &limits, &mut rng);
        assert!(outflow >= 15.0 && outflow <= 25.0);
    }

    #[test]
    fn test_outflow_level_correction() {
        assert_eq!(level_correction(85.0, 100.0), 3.0);
        assert_eq!(level_correction(50.0, 100.0), 0.0);
        assert_eq!(level_correction(20.0, 100.0), -3.0);
    }

    #[test]
    fn test_outflow_clamped() {
        let limits = limits();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..500 {
            let high = simulate_outflow(50.0, 95.0, 100.0, 0.0, &limits, &mut rng);
            assert_eq!(high, limits.max_outflow);
            let low = simulate_outflow(0.0, 5.0, 0.0, 100.0, &limits, &mut rng);
            assert!(low >= limits.min_outflow && low <= 2.0);
        }
    }

    #[test]
    fn test_balanced_flows_keep_volume() {
        let limits = limits().with_interval_seconds(5.0);
        let mut state = DamState::initial(&limits, 0.5, 40.0);

        update_volume_and_level(&mut state, 25.0, 25.0, &limits);

        assert_eq!(state.volume(), 500_000.0);
        assert_eq!(state.level(), 50.0);
    }

    #[test]
    fn test_net_flow_moves_volume() {
        let limits = limits().with_interval_seconds(5.0);
        let mut state = DamState::initial(&limits, 0.5, 40.0);

        update_volume_and_level(&mut state, 30.0, 10.0, &limits);

        assert_eq!(state.volume(), 500_100.0);
        assert!((state.level() - 50.01).abs() < 1e-9);
    }

    #[test]
    fn test_volume_clamped_at_bounds() {
        let limits = limits().with_interval_seconds(5.0);
        let mut state = DamState::initial(&limits, 0.0, 40.0);

        update_volume_and_level(&mut state, 0.0, 50.0, &limits);
        assert_eq!(state.volume(), 0.0);
        assert_eq!(state.level(), 0.0);

        let mut state = DamState::initial(&limits, 1.0, 40.0);
        update_volume_and_level(&mut state, 50.0, 0.0, &limits);
        assert_eq!(state.volume(), limits.max_volume);
        assert_eq!(state.level(), limits.max_height);
    }
}
