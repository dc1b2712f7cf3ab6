use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::domain::{DamLimits, DEFAULT_BASE_EFFICIENCY, STANDARD_GRAVITY, WATER_DENSITY};
use crate::publisher::Addressing;
use crate::simulation::FaultProfile;
use crate::transport::{ReconnectPolicy, TransportMode};

/// Flat variable names used by existing deployments, mapped to config keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("DAM_FOLDER", "dam.dam_id"),
    ("CLIENT_ID", "dam.sensor_id"),
    ("MQTT_BROKER", "broker.host"),
    ("RABBIT_HOST", "queue.host"),
    ("MAX_HEIGHT", "dam.max_height"),
    ("MAX_VOLUME", "dam.max_volume"),
    ("INITIAL_FILL_PERCENTAGE", "dam.initial_fill_percentage"),
    ("MAX_INFLOW", "dam.max_inflow"),
    ("MAX_OUTFLOW", "dam.max_outflow"),
];

/// Floor on the reconnect delay so an unreachable server is not hammered
const MIN_RETRY_DELAY_SECONDS: u64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid setting: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("`{min_key}` ({min}) exceeds `{max_key}` ({max})")]
    InvertedRange {
        min_key: &'static str,
        min: f64,
        max_key: &'static str,
        max: f64,
    },
    #[error("`{key}` = {value} is not allowed: {reason}")]
    Rejected {
        key: &'static str,
        value: f64,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dam: DamConfig,
    #[serde(default)]
    pub faults: FaultProfile,
    pub broker: BrokerConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DamConfig {
    #[serde(default)]
    pub dam_id: String,
    #[serde(default)]
    pub sensor_id: String,
    #[validate(range(exclusive_min = 0.0))]
    pub max_height: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub max_volume: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub initial_fill_percentage: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub min_inflow: f64,
    #[validate(range(min = 0.0))]
    pub max_inflow: f64,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub min_outflow: f64,
    #[validate(range(min = 0.0))]
    pub max_outflow: f64,
    #[serde(default = "default_base_efficiency")]
    #[validate(range(min = 0.2, max = 1.0))]
    pub base_efficiency: f64,
    #[serde(default = "default_gravity")]
    #[validate(range(exclusive_min = 0.0))]
    pub gravity: f64,
    #[serde(default = "default_density")]
    #[validate(range(exclusive_min = 0.0))]
    pub density: f64,
    #[serde(default = "default_interval_seconds")]
    #[validate(range(min = 1))]
    pub interval_seconds: u64,
    /// Fixed seed for reproducible runs
    #[serde(default)]
    pub random_seed: Option<u64>,
}

fn default_base_efficiency() -> f64 {
    DEFAULT_BASE_EFFICIENCY
}
fn default_gravity() -> f64 {
    STANDARD_GRAVITY
}
fn default_density() -> f64 {
    WATER_DENSITY
}
fn default_interval_seconds() -> u64 {
    5
}

impl DamConfig {
    pub fn limits(&self) -> DamLimits {
        DamLimits {
            max_height: self.max_height,
            max_volume: self.max_volume,
            min_inflow: self.min_inflow,
            max_inflow: self.max_inflow,
            min_outflow: self.min_outflow,
            max_outflow: self.max_outflow,
            gravity: self.gravity,
            density: self.density,
            interval_seconds: self.interval_seconds as f64,
            base_efficiency: self.base_efficiency,
        }
    }

    pub fn addressing(&self) -> Addressing {
        Addressing::new(self.dam_id.clone(), self.sensor_id.clone())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}
fn default_keep_alive() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_amqp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
}

fn default_amqp_port() -> u16 {
    5672
}
fn default_vhost() -> String {
    "/".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub retry_delay_seconds: u64,
    pub publish_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_delay_seconds: 10,
            publish_timeout_ms: 2000,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            retry_delay: Duration::from_secs(self.retry_delay_seconds.max(MIN_RETRY_DELAY_SECONDS)),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms.max(1)),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let cfg = Self::from_figment(Self::figment("config/default.toml"))?;
        Ok(cfg)
    }

    /// Layered sources: TOML file, `HYDRO__` variables, then legacy flat
    /// variables
    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("HYDRO__").split("__"))
            .merge(legacy_env())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Merge overrides on top of a figment, mainly for tests
    pub fn with_overrides<T: Serialize>(figment: Figment, overrides: T) -> Figment {
        figment.merge(Serialized::defaults(overrides))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let dam = &self.dam;
        if dam.dam_id.trim().is_empty() {
            return Err(ConfigError::Missing("dam.dam_id"));
        }
        if dam.sensor_id.trim().is_empty() {
            return Err(ConfigError::Missing("dam.sensor_id"));
        }
        self.check_finite()?;
        dam.validate()?;
        self.faults.validate()?;

        // The near-full cut drives inflow to zero, which a positive floor
        // would contradict
        if dam.min_inflow > 0.0 {
            return Err(ConfigError::Rejected {
                key: "dam.min_inflow",
                value: dam.min_inflow,
                reason: "inflow is cut to 0 when the reservoir is nearly full",
            });
        }

        if dam.min_inflow > dam.max_inflow {
            return Err(ConfigError::InvertedRange {
                min_key: "dam.min_inflow",
                min: dam.min_inflow,
                max_key: "dam.max_inflow",
                max: dam.max_inflow,
            });
        }
        if dam.min_outflow > dam.max_outflow {
            return Err(ConfigError::InvertedRange {
                min_key: "dam.min_outflow",
                min: dam.min_outflow,
                max_key: "dam.max_outflow",
                max: dam.max_outflow,
            });
        }
        if self.faults.efficiency_floor > dam.base_efficiency {
            return Err(ConfigError::InvertedRange {
                min_key: "faults.efficiency_floor",
                min: self.faults.efficiency_floor,
                max_key: "dam.base_efficiency",
                max: dam.base_efficiency,
            });
        }
        if self.faults.faulty_voltage_min > self.faults.faulty_voltage_max {
            return Err(ConfigError::InvertedRange {
                min_key: "faults.faulty_voltage_min",
                min: self.faults.faulty_voltage_min,
                max_key: "faults.faulty_voltage_max",
                max: self.faults.faulty_voltage_max,
            });
        }
        if self.faults.faulty_ampere_min > self.faults.faulty_ampere_max {
            return Err(ConfigError::InvertedRange {
                min_key: "faults.faulty_ampere_min",
                min: self.faults.faulty_ampere_min,
                max_key: "faults.faulty_ampere_max",
                max: self.faults.faulty_ampere_max,
            });
        }
        Ok(())
    }

    /// Range checks pass NaN through, so reject it up front
    fn check_finite(&self) -> Result<(), ConfigError> {
        let dam = &self.dam;
        let faults = &self.faults;
        let values = [
            ("dam.max_height", dam.max_height),
            ("dam.max_volume", dam.max_volume),
            ("dam.initial_fill_percentage", dam.initial_fill_percentage),
            ("dam.min_inflow", dam.min_inflow),
            ("dam.max_inflow", dam.max_inflow),
            ("dam.min_outflow", dam.min_outflow),
            ("dam.max_outflow", dam.max_outflow),
            ("dam.base_efficiency", dam.base_efficiency),
            ("dam.gravity", dam.gravity),
            ("dam.density", dam.density),
            ("faults.probability", faults.probability),
            ("faults.voltage_share", faults.voltage_share),
            ("faults.nominal_voltage", faults.nominal_voltage),
            ("faults.nominal_ampere", faults.nominal_ampere),
            ("faults.faulty_voltage_min", faults.faulty_voltage_min),
            ("faults.faulty_voltage_max", faults.faulty_voltage_max),
            ("faults.faulty_ampere_min", faults.faulty_ampere_min),
            ("faults.faulty_ampere_max", faults.faulty_ampere_max),
            ("faults.degradation_step", faults.degradation_step),
            ("faults.efficiency_floor", faults.efficiency_floor),
        ];
        match values.into_iter().find(|(_, value)| !value.is_finite()) {
            Some((key, value)) => Err(ConfigError::Rejected {
                key,
                value,
                reason: "must be a finite number",
            }),
            None => Ok(()),
        }
    }
}

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(name, _)| key == *name)
            .map(|(_, path)| (*path).into())
            .unwrap_or_else(|| key.as_str().into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml;
    use serde_json::json;

    const BASE: &str = r#"
        [dam]
        dam_id = "Hoover"
        sensor_id = "T1"
        max_height = 100
        max_volume = 1000000
        initial_fill_percentage = 0.5
        max_inflow = 50
        max_outflow = 50

        [broker]
        host = "localhost"

        [queue]
        host = "localhost"
    "#;

    fn base() -> Figment {
        Figment::new().merge(Toml::string(BASE))
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = Config::from_figment(base()).unwrap();

        assert_eq!(cfg.dam.interval_seconds, 5);
        assert_eq!(cfg.dam.base_efficiency, 0.99);
        assert_eq!(cfg.dam.gravity, 9.81);
        assert_eq!(cfg.broker.port, 1883);
        assert_eq!(cfg.queue.port, 5672);
        assert_eq!(cfg.broker.mode, TransportMode::Simulated);
        assert_eq!(cfg.reconnect.policy().retry_delay, Duration::from_secs(10));
        assert_eq!(cfg.faults, FaultProfile::default());

        let limits = cfg.dam.limits();
        assert_eq!(limits.max_height, 100.0);
        assert_eq!(limits.min_inflow, 0.0);
        assert_eq!(limits.interval_seconds, 5.0);
    }

    #[test]
    fn test_missing_limit_is_error() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [dam]
            dam_id = "Hoover"
            sensor_id = "T1"
            max_volume = 1000000
            initial_fill_percentage = 0.5
            max_inflow = 50
            max_outflow = 50
            [broker]
            [queue]
            "#,
        ));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_missing_identifier_is_error() {
        let figment = Config::with_overrides(base(), json!({ "dam": { "sensor_id": "" } }));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(err.to_string().contains("dam.sensor_id"));
    }

    #[test]
    fn test_fill_out_of_range_is_error() {
        let figment =
            Config::with_overrides(base(), json!({ "dam": { "initial_fill_percentage": 1.5 } }));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_inverted_flow_range_is_error() {
        let figment = Config::with_overrides(base(), json!({ "dam": { "min_outflow": 60.0 } }));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_legacy_variables() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("dam.toml", BASE)?;
            jail.set_env("DAM_FOLDER", "Itaipu");
            jail.set_env("CLIENT_ID", "T9");
            jail.set_env("MAX_HEIGHT", "196");
            jail.set_env("MQTT_BROKER", "mqtt.local");

            let cfg = Config::from_figment(Config::figment("dam.toml")).unwrap();
            assert_eq!(cfg.dam.dam_id, "Itaipu");
            assert_eq!(cfg.dam.sensor_id, "T9");
            assert_eq!(cfg.dam.max_height, 196.0);
            assert_eq!(cfg.broker.host, "mqtt.local");
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_variables() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("dam.toml", BASE)?;
            jail.set_env("HYDRO__RECONNECT__RETRY_DELAY_SECONDS", "3");
            jail.set_env("HYDRO__QUEUE__MODE", "live");

            let cfg = Config::from_figment(Config::figment("dam.toml")).unwrap();
            assert_eq!(cfg.reconnect.retry_delay_seconds, 3);
            assert_eq!(cfg.queue.mode, TransportMode::Live);
            Ok(())
        });
    }

    #[test]
    fn test_negative_degradation_is_error() {
        let figment =
            Config::with_overrides(base(), json!({ "faults": { "degradation_step": -0.05 } }));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_fault_probability_out_of_range_is_error() {
        let figment = Config::with_overrides(base(), json!({ "faults": { "probability": 1.5 } }));
        assert!(Config::from_figment(figment).is_err());
    }

    #[test]
    fn test_nan_probability_is_error() {
        let mut cfg = Config::from_figment(base()).unwrap();
        cfg.faults.probability = f64::NAN;

        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Rejected { key: "faults.probability", .. }
        ));
    }

    #[test]
    fn test_positive_min_inflow_is_error() {
        let figment = Config::with_overrides(base(), json!({ "dam": { "min_inflow": 5.0 } }));
        let err = Config::from_figment(figment).unwrap_err();
        assert!(err.to_string().contains("dam.min_inflow"));
    }

    #[test]
    fn test_zero_retry_delay_is_clamped() {
        let figment =
            Config::with_overrides(base(), json!({ "reconnect": { "retry_delay_seconds": 0 } }));
        let cfg = Config::from_figment(figment).unwrap();
        assert_eq!(cfg.reconnect.policy().retry_delay, Duration::from_secs(1));
    }
}
