//! # Turbine Fault Injection
//!
//! Rare sensor anomalies on the generator output. A fault pulls either the
//! voltage or the current reading out of its nominal value and permanently
//! costs the turbine some efficiency.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::domain::DamLimits;

/// Nameplate rating used to scale external power from outflow (kW)
const EXTERNAL_POWER_RATING: f64 = 15_000.0;

/// Tunables for the fault model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FaultProfile {
    /// Probability that a fault fires on a given tick
    #[validate(range(min = 0.0, max = 1.0))]
    pub probability: f64,
    /// Share of faults that hit voltage rather than current
    #[validate(range(min = 0.0, max = 1.0))]
    pub voltage_share: f64,
    #[validate(range(min = 0.0))]
    pub nominal_voltage: f64,
    #[validate(range(min = 0.0))]
    pub nominal_ampere: f64,
    /// Range sampled for an anomalous voltage reading
    #[validate(range(min = 0.0))]
    pub faulty_voltage_min: f64,
    pub faulty_voltage_max: f64,
    /// Range sampled for an anomalous current reading
    #[validate(range(min = 0.0))]
    pub faulty_ampere_min: f64,
    pub faulty_ampere_max: f64,
    /// Efficiency lost per fault
    #[validate(range(min = 0.0, max = 1.0))]
    pub degradation_step: f64,
    /// Efficiency never drops below this
    #[validate(range(min = 0.0, max = 1.0))]
    pub efficiency_floor: f64,
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            probability: 0.001,
            voltage_share: 0.5,
            nominal_voltage: 25.0,
            nominal_ampere: 10.0,
            faulty_voltage_min: 17.0,
            faulty_voltage_max: 20.0,
            faulty_ampere_min: 3.0,
            faulty_ampere_max: 5.0,
            degradation_step: 0.01,
            efficiency_floor: 0.2,
        }
    }
}

/// Which reading a fault affected
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SensorFault {
    Voltage(f64),
    Current(f64),
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFault::Voltage(v) => write!(f, "voltage out of range: {:.2}V", v),
            SensorFault::Current(a) => write!(f, "current out of range: {:.2}A", a),
        }
    }
}

/// Electrical readings for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricalReading {
    /// Efficiency after this tick's degradation, if any
    pub efficiency: f64,
    pub voltage: f64,
    pub ampere: f64,
    /// Power fed to the external grid (kW)
    pub external_power: f64,
    pub fault: Option<SensorFault>,
}

impl ElectricalReading {
    /// Human-readable alert for the fault, if one fired
    pub fn alert(&self) -> Option<String> {
        self.fault.map(|f| f.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    profile: FaultProfile,
}

impl FaultInjector {
    pub fn new(profile: FaultProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &FaultProfile {
        &self.profile
    }

    /// Sample this tick's electrical readings
    ///
    /// At most one of voltage/current deviates from nominal. `efficiency` in
    /// the result is never above the input and never below the floor.
    pub fn inspect<R: Rng + ?Sized>(
        &self,
        efficiency: f64,
        outflow: f64,
        limits: &DamLimits,
        rng: &mut R,
    ) -> ElectricalReading {
        let p = &self.profile;
        let mut voltage = p.nominal_voltage;
        let mut ampere = p.nominal_ampere;

        let fault = if rng.gen_bool(p.probability.clamp(0.0, 1.0)) {
            if rng.gen_bool(p.voltage_share.clamp(0.0, 1.0)) {
                voltage = rng.gen_range(p.faulty_voltage_min..=p.faulty_voltage_max);
                Some(SensorFault::Voltage(voltage))
            } else {
                ampere = rng.gen_range(p.faulty_ampere_min..=p.faulty_ampere_max);
                Some(SensorFault::Current(ampere))
            }
        } else {
            None
        };

        let efficiency = if fault.is_some() {
            (efficiency - p.degradation_step).max(p.efficiency_floor)
        } else {
            efficiency
        };

        ElectricalReading {
            efficiency,
            voltage,
            ampere,
            external_power: external_power(outflow, limits),
            fault,
        }
    }
}

/// Power delivered to the grid, proportional to the outflow's position in
/// its range
pub fn external_power(outflow: f64, limits: &DamLimits) -> f64 {
    let span = (limits.max_outflow - limits.min_outflow).max(1.0);
    (outflow - limits.min_outflow) / span * EXTERNAL_POWER_RATING
}
