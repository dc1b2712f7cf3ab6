//! # Dam Domain Types
//!
//! Physical limits of the reservoir and the mutable state that the
//! simulation advances once per tick.

use serde::{Deserialize, Serialize};

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f64 = 9.81;
/// Density of fresh water in kg/m³
pub const WATER_DENSITY: f64 = 1000.0;
/// Efficiency of a freshly commissioned turbine
pub const DEFAULT_BASE_EFFICIENCY: f64 = 0.99;
/// Default simulation tick length
pub const DEFAULT_INTERVAL_SECONDS: f64 = 5.0;

/// Immutable physical limits of a dam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamLimits {
    /// Height of the reservoir when full (m)
    pub max_height: f64,
    /// Volume of the reservoir when full (m³)
    pub max_volume: f64,
    /// Inflow bounds (m³/s)
    pub min_inflow: f64,
    pub max_inflow: f64,
    /// Outflow bounds (m³/s)
    pub min_outflow: f64,
    pub max_outflow: f64,
    pub gravity: f64,
    pub density: f64,
    /// Length of one simulation tick in seconds
    pub interval_seconds: f64,
    /// Turbine efficiency before any degradation
    pub base_efficiency: f64,
}

impl DamLimits {
    /// Limits with zero minimum flows and standard physical constants
    pub fn new(max_height: f64, max_volume: f64, max_inflow: f64, max_outflow: f64) -> Self {
        Self {
            max_height,
            max_volume,
            min_inflow: 0.0,
            max_inflow,
            min_outflow: 0.0,
            max_outflow,
            gravity: STANDARD_GRAVITY,
            density: WATER_DENSITY,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            base_efficiency: DEFAULT_BASE_EFFICIENCY,
        }
    }

    pub fn with_interval_seconds(mut self, interval_seconds: f64) -> Self {
        self.interval_seconds = interval_seconds;
        self
    }

    /// Generation at full outflow and full head, in MW
    pub fn max_generation_capacity(&self) -> f64 {
        crate::simulation::calculate_power(
            self.max_outflow,
            self.max_height,
            self.base_efficiency,
            self,
        )
    }

    /// Water level for a given stored volume
    pub fn level_for_volume(&self, volume: f64) -> f64 {
        volume / self.max_volume * self.max_height
    }
}

/// Mutable reservoir state, owned by [`crate::simulation::DamModel`]
///
/// `level` is always derived from `volume`; there is no way to set it
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamState {
    pub(crate) volume: f64,
    pub(crate) level: f64,
    pub(crate) inflow: f64,
    pub(crate) outflow: f64,
    pub(crate) efficiency: f64,
    pub(crate) total_energy_mwh: f64,
    pub(crate) energy_request: f64,
}

impl DamState {
    /// State of a reservoir filled to `fill` (0.0-1.0) with flows at the same
    /// fraction of their range and demand at half capacity.
    pub fn initial(limits: &DamLimits, fill: f64, max_capacity: f64) -> Self {
        let volume = (limits.max_volume * fill).clamp(0.0, limits.max_volume);
        Self {
            volume,
            level: limits.level_for_volume(volume),
            inflow: limits.min_inflow + (limits.max_inflow - limits.min_inflow) * fill,
            outflow: limits.min_outflow + (limits.max_outflow - limits.min_outflow) * fill,
            efficiency: limits.base_efficiency,
            total_energy_mwh: 0.0,
            energy_request: max_capacity / 2.0,
        }
    }

    /// Replace the stored volume, re-deriving the level
    pub fn set_volume(&mut self, volume: f64, limits: &DamLimits) {
        self.volume = volume.clamp(0.0, limits.max_volume);
        self.level = limits.level_for_volume(self.volume);
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn inflow(&self) -> f64 {
        self.inflow
    }

    pub fn outflow(&self) -> f64 {
        self.outflow
    }

    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn total_energy_mwh(&self) -> f64 {
        self.total_energy_mwh
    }

    pub fn energy_request(&self) -> f64 {
        self.energy_request
    }

    /// Fill ratio of the reservoir (0.0-1.0)
    pub fn fill_ratio(&self, limits: &DamLimits) -> f64 {
        self.level / limits.max_height
    }
}
