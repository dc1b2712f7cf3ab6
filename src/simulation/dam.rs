//! # Dam Model
//!
//! Owns the reservoir state and advances it one tick at a time.

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::demand::update_energy_request;
use super::faults::{ElectricalReading, FaultInjector};
use super::hydrology::{simulate_inflow, simulate_outflow, update_volume_and_level};
use super::power::{calculate_power, energy_for_interval};
use crate::domain::{DamLimits, DamState};

/// Everything produced by one tick, consumed by the publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub timestamp: NaiveDateTime,
    pub level: f64,
    pub volume: f64,
    pub inflow: f64,
    pub outflow: f64,
    /// Power generated from the previous tick's outflow and level (MW)
    pub power_mw: f64,
    pub total_energy_mwh: f64,
    pub energy_request: f64,
    pub electrical: ElectricalReading,
}

pub struct DamModel {
    limits: DamLimits,
    state: DamState,
    max_capacity: f64,
    faults: FaultInjector,
    rng: StdRng,
}

impl DamModel {
    /// Create a model for a reservoir filled to `initial_fill` (0.0-1.0)
    ///
    /// `random_seed` makes the run reproducible; `None` seeds from entropy.
    pub fn new(
        limits: DamLimits,
        initial_fill: f64,
        faults: FaultInjector,
        random_seed: Option<u64>,
    ) -> Self {
        let rng = match random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let max_capacity = limits.max_generation_capacity();
        let state = DamState::initial(&limits, initial_fill, max_capacity);

        Self {
            limits,
            state,
            max_capacity,
            faults,
            rng,
        }
    }

    /// Replace the current state, e.g. to resume from a snapshot
    pub fn with_state(mut self, state: DamState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &DamState {
        &self.state
    }

    pub fn limits(&self) -> &DamLimits {
        &self.limits
    }

    pub fn max_generation_capacity(&self) -> f64 {
        self.max_capacity
    }

    /// Advance the reservoir by one interval
    ///
    /// Order matters: power is computed from the outflow and level left by
    /// the previous tick, and outflow reacts to that power against the
    /// previous tick's energy request.
    pub fn advance(&mut self, now: NaiveDateTime) -> TickReport {
        let limits = &self.limits;
        let state = &mut self.state;

        let inflow = simulate_inflow(state.inflow, state.level, limits, now, &mut self.rng);
        let power_mw = calculate_power(state.outflow, state.level, state.efficiency, limits);
        let outflow = simulate_outflow(
            state.outflow,
            state.level,
            state.energy_request,
            power_mw,
            limits,
            &mut self.rng,
        );
        let energy_request = update_energy_request(self.max_capacity, now, &mut self.rng);
        update_volume_and_level(state, inflow, outflow, limits);

        state.inflow = inflow;
        state.outflow = outflow;
        state.energy_request = energy_request;
        state.total_energy_mwh += energy_for_interval(power_mw, limits.interval_seconds).max(0.0);

        let electrical = self
            .faults
            .inspect(state.efficiency, outflow, limits, &mut self.rng);
        state.efficiency = electrical.efficiency;

        TickReport {
            timestamp: now,
            level: state.level,
            volume: state.volume,
            inflow,
            outflow,
            power_mw,
            total_energy_mwh: state.total_energy_mwh,
            energy_request,
            electrical,
        }
    }
}
