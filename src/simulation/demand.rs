//! # Grid Energy Demand
//!
//! Energy requested from the plant, built from a seasonal offset, a day/night
//! load factor and a diurnal sinusoid.

use chrono::{Datelike, NaiveDateTime, Timelike};
use rand::Rng;
use std::f64::consts::PI;

const DAY_START_HOUR: u32 = 6;
const DAY_END_HOUR: u32 = 20;
const DAY_LOAD_FACTOR: f64 = 0.7;
const NIGHT_LOAD_FACTOR: f64 = 0.3;
const LOAD_FACTOR_JITTER: f64 = 0.01;

/// Seasonal demand offset in MW; negative in the first half of the year
pub fn seasonal_demand(month: u32, max_capacity: f64) -> f64 {
    let seasonal_factor = (month as f64 - 6.0) / 12.0;
    seasonal_factor * max_capacity * 0.5
}

/// Day/night fraction of capacity requested, with a small jitter
pub fn load_factor<R: Rng + ?Sized>(hour: u32, rng: &mut R) -> f64 {
    let base = if (DAY_START_HOUR..=DAY_END_HOUR).contains(&hour) {
        DAY_LOAD_FACTOR
    } else {
        NIGHT_LOAD_FACTOR
    };
    base + rng.gen_range(-LOAD_FACTOR_JITTER..=LOAD_FACTOR_JITTER)
}

/// Diurnal sinusoid in MW, period 24 h
pub fn diurnal_demand(hour: u32, max_capacity: f64) -> f64 {
    (max_capacity / 4.0) * (2.0 * PI * hour as f64 / 24.0).sin()
}

/// Energy request for the current time, clamped to `[0, max_capacity]`
pub fn update_energy_request<R: Rng + ?Sized>(
    max_capacity: f64,
    now: NaiveDateTime,
    rng: &mut R,
) -> f64 {
    let request = max_capacity * load_factor(now.hour(), rng)
        + seasonal_demand(now.month(), max_capacity)
        + diurnal_demand(now.hour(), max_capacity);

    request.clamp(0.0, max_capacity.max(0.0))
}
