use serde::{Deserialize, Serialize};

/// Names of topics, queues and exchanges for one sensor of one dam
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressing {
    pub dam_id: String,
    pub sensor_id: String,
}

impl Addressing {
    pub fn new(dam_id: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            dam_id: dam_id.into(),
            sensor_id: sensor_id.into(),
        }
    }

    /// `{dam}/{sensor}/{metric}`
    pub fn topic(&self, metric: &str) -> String {
        format!("{}/{}/{}", self.dam_id, self.sensor_id, metric)
    }

    pub fn status_topic(&self) -> String {
        self.topic("Status")
    }

    pub fn summary_topic(&self) -> String {
        self.topic("Summary")
    }

    pub fn queue_name(&self) -> String {
        format!("{}_Turbin_data", self.sensor_id)
    }

    pub fn exchange_name(&self) -> String {
        format!("{}_Exchange", self.dam_id)
    }

    pub fn routing_key(&self) -> String {
        format!("{}_Turbin_key", self.sensor_id)
    }
}
