//! Outgoing telemetry payloads
//!
//! Field names are the wire format consumed by dashboards and the turbine
//! data queue, so they keep their external spelling.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::DamLimits;
use crate::simulation::TickReport;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lower bound advertised for metrics that are never exactly zero on a graph
const DISPLAY_FLOOR: f64 = 0.1;

/// Round to two decimals for publishing
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Static display ranges, computed once from the dam limits
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRanges {
    max_height: f64,
    max_volume: f64,
    min_inflow: f64,
    max_inflow: f64,
    min_outflow: f64,
    max_outflow: f64,
    max_capacity: f64,
}

impl MetricRanges {
    pub fn new(limits: &DamLimits, max_capacity: f64) -> Self {
        Self {
            max_height: limits.max_height,
            max_volume: limits.max_volume,
            min_inflow: limits.min_inflow,
            max_inflow: limits.max_inflow,
            min_outflow: limits.min_outflow,
            max_outflow: limits.max_outflow,
            max_capacity,
        }
    }
}

/// Physical metrics with their display ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    #[serde(rename = "SensorId")]
    pub sensor_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "LakeDepth")]
    pub lake_depth: f64,
    #[serde(rename = "LakeVol")]
    pub lake_volume: f64,
    #[serde(rename = "Water_IN")]
    pub water_in: f64,
    #[serde(rename = "Water_OUT")]
    pub water_out: f64,
    #[serde(rename = "InstantPower")]
    pub instant_power: f64,
    #[serde(rename = "TotalEnergy")]
    pub total_energy: f64,
    #[serde(rename = "EnergyRequest")]
    pub energy_request: f64,
    #[serde(rename = "LakeDepthMin")]
    pub lake_depth_min: f64,
    #[serde(rename = "LakeDepthMax")]
    pub lake_depth_max: f64,
    #[serde(rename = "LakeVolMin")]
    pub lake_volume_min: f64,
    #[serde(rename = "LakeVolMax")]
    pub lake_volume_max: f64,
    #[serde(rename = "Water_IN_Min")]
    pub water_in_min: f64,
    #[serde(rename = "Water_IN_Max")]
    pub water_in_max: f64,
    #[serde(rename = "Water_OUT_Min")]
    pub water_out_min: f64,
    #[serde(rename = "Water_OUT_Max")]
    pub water_out_max: f64,
    #[serde(rename = "InstantPowerMin")]
    pub instant_power_min: f64,
    #[serde(rename = "InstantPowerMax")]
    pub instant_power_max: f64,
    #[serde(rename = "EnergyRequestMin")]
    pub energy_request_min: f64,
    #[serde(rename = "EnergyRequestMax")]
    pub energy_request_max: f64,
}

impl TelemetrySummary {
    pub fn new(sensor_id: &str, report: &TickReport, ranges: &MetricRanges) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            timestamp: format_timestamp(report.timestamp),
            lake_depth: round2(report.level),
            lake_volume: round2(report.volume),
            water_in: round2(report.inflow),
            water_out: round2(report.outflow),
            instant_power: round2(report.power_mw),
            total_energy: round2(report.total_energy_mwh),
            energy_request: round2(report.energy_request),
            lake_depth_min: DISPLAY_FLOOR,
            lake_depth_max: ranges.max_height,
            lake_volume_min: DISPLAY_FLOOR,
            lake_volume_max: ranges.max_volume,
            water_in_min: ranges.min_inflow,
            water_in_max: ranges.max_inflow,
            water_out_min: ranges.min_outflow,
            water_out_max: ranges.max_outflow,
            instant_power_min: DISPLAY_FLOOR,
            instant_power_max: ranges.max_capacity,
            energy_request_min: DISPLAY_FLOOR,
            energy_request_max: ranges.max_capacity,
        }
    }

    /// Per-metric scalar announcements as `(metric name, value)`
    pub fn scalar_metrics(&self) -> [(&'static str, f64); 7] {
        [
            ("LakeDepth", self.lake_depth),
            ("LakeVolume", self.lake_volume),
            ("Water_IN", self.water_in),
            ("Water_OUT", self.water_out),
            ("InstantPower", self.instant_power),
            ("TotalEnergy", self.total_energy),
            ("EnergyRequest", self.energy_request),
        ]
    }
}

/// Electrical, fault-facing view of the turbine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryStatus {
    #[serde(rename = "SensorId")]
    pub sensor_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "EFFICIENCY")]
    pub efficiency: f64,
    #[serde(rename = "Voltage")]
    pub voltage: f64,
    #[serde(rename = "Ampere")]
    pub ampere: f64,
    #[serde(rename = "Power")]
    pub power: f64,
    #[serde(rename = "Alert", default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
}

impl TelemetryStatus {
    pub fn new(sensor_id: &str, report: &TickReport) -> Self {
        let electrical = &report.electrical;
        Self {
            sensor_id: sensor_id.to_string(),
            timestamp: format_timestamp(report.timestamp),
            efficiency: round2(electrical.efficiency),
            voltage: round2(electrical.voltage),
            ampere: round2(electrical.ampere),
            power: round2(electrical.external_power),
            alert: electrical.alert(),
        }
    }
}
