//! # Dam Simulation Module
//!
//! Plausible, bounded stochastic model of a hydroelectric reservoir.
//!
//! ## Components
//!
//! - **Hydrology**: inflow/outflow random walks with seasonal and level bias, volume/level update
//! - **Demand**: grid energy request with seasonal, day/night and diurnal components
//! - **Power**: hydraulic power equation and energy accumulation
//! - **Faults**: rare voltage/current anomalies that degrade turbine efficiency
//! - **Dam**: the model that owns the state and advances it once per tick
//!
//! ## Usage
//!
//! ```rust
//! use hydro_dam_sensor::domain::DamLimits;
//! use hydro_dam_sensor::simulation::{DamModel, FaultInjector};
//!
//! let limits = DamLimits::new(100.0, 1_000_000.0, 50.0, 50.0);
//! let mut model = DamModel::new(limits, 0.5, FaultInjector::default(), Some(42));
//!
//! let report = model.advance(chrono::Local::now().naive_local());
//! assert!(report.level >= 0.0 && report.level <= 100.0);
//! ```

pub mod dam;
pub mod demand;
pub mod faults;
pub mod hydrology;
pub mod power;

pub use dam::{DamModel, TickReport};
pub use demand::update_energy_request;
pub use faults::{external_power, ElectricalReading, FaultInjector, FaultProfile, SensorFault};
pub use hydrology::{
    inflow_reduction_factor, seasonal_inflow_bias, simulate_inflow, simulate_outflow,
    update_volume_and_level,
};
pub use power::{calculate_power, energy_for_interval};
