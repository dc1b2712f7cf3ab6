//! # Hydraulic Power
//!
//! P = η · ρ · Q · g · h, scaled to megawatts.

use crate::domain::DamLimits;

/// Watts per megawatt
const WATTS_PER_MEGAWATT: f64 = 1_000_000.0;

/// Generated power in MW for a given outflow (m³/s) and head (m)
pub fn calculate_power(outflow: f64, level: f64, efficiency: f64, limits: &DamLimits) -> f64 {
    efficiency * limits.density * outflow * limits.gravity * level / WATTS_PER_MEGAWATT
}

/// Energy in MWh produced at `power_mw` over one interval
pub fn energy_for_interval(power_mw: f64, interval_seconds: f64) -> f64 {
    power_mw * (interval_seconds / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_equation() {
        let limits = DamLimits::new(100.0, 1_000_000.0, 50.0, 50.0);
        let power = calculate_power(25.0, 50.0, 0.9, &limits);
        let expected = 0.9 * 1000.0 * 25.0 * 9.81 * 50.0 / 1_000_000.0;
        assert!((power - expected).abs() < 1e-12);
    }

    #[test]
    fn test_no_outflow_no_power() {
        let limits = DamLimits::new(100.0, 1_000_000.0, 50.0, 50.0);
        assert_eq!(calculate_power(0.0, 80.0, 0.99, &limits), 0.0);
        assert_eq!(calculate_power(30.0, 0.0, 0.99, &limits), 0.0);
    }

    #[test]
    fn test_energy_for_interval() {
        // 36 MW for 5 s = 0.05 MWh
        assert!((energy_for_interval(36.0, 5.0) - 0.05).abs() < 1e-12);
    }
}
