use crate::estimator::ModuleParameters;
use crate::topics::SensorTopic;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const CONFIG_ENV: &str = "PVTWIN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "pvtwin.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("invalid module parameters: {0}")]
    Module(String),
    #[error("topic {0} is configured more than once")]
    DuplicateTopic(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TwinConfig {
    pub mqtt: MqttConf,
    pub topics: TopicsConf,
    pub module: ModuleParameters,
    pub diagnostics: DiagnosticsConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    /// 0, 1 ou 2
    pub qos: u8,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: None,
            keep_alive_secs: 60,
            qos: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TopicsConf {
    pub power_meter: String,
    pub light: String,
    pub temp_humidity: String,
    pub temp_pressure: String,
    pub irradiance: String,
    pub pins: String,
    pub estimated_power: String,
}

impl Default for TopicsConf {
    fn default() -> Self {
        Self {
            power_meter: "iot/painel/INA226".into(),
            light: "iot/painel/TSL2591".into(),
            temp_humidity: "iot/painel/AHT20".into(),
            temp_pressure: "iot/painel/BMP280".into(),
            irradiance: "iot/painel/irradiance".into(),
            pins: "iot/painel/pins".into(),
            estimated_power: "iot/painel/estimatedPower".into(),
        }
    }
}

impl TopicsConf {
    pub fn topic_for(&self, sensor: SensorTopic) -> &str {
        match sensor {
            SensorTopic::PowerMeter => &self.power_meter,
            SensorTopic::Light => &self.light,
            SensorTopic::TempHumidity => &self.temp_humidity,
            SensorTopic::TempPressure => &self.temp_pressure,
            SensorTopic::Irradiance => &self.irradiance,
            SensorTopic::Pins => &self.pins,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DiagnosticsConf {
    /// Pas de publication si absent
    pub topic: Option<String>,
    pub interval_secs: u64,
}

impl Default for DiagnosticsConf {
    fn default() -> Self {
        Self {
            topic: None,
            interval_secs: 30,
        }
    }
}

impl TwinConfig {
    /// Chemin du fichier de config : $PVTWIN_CONFIG ou ./pvtwin.yaml
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
            .into()
    }

    /// Charge la config YAML. Fichier absent ou vide = config par défaut.
    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!("[config] no {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&txt).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Surcharges par variables d'environnement (PVTWIN_MQTT_HOST, ...)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PVTWIN_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("PVTWIN_MQTT_PORT") {
            self.mqtt.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: "PVTWIN_MQTT_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(client_id) = lookup("PVTWIN_CLIENT_ID") {
            self.mqtt.client_id = Some(client_id);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.module.validate().map_err(ConfigError::Module)?;

        let mut seen = HashSet::new();
        let outbound = [self.topics.estimated_power.as_str()]
            .into_iter()
            .chain(self.diagnostics.topic.as_deref());
        for topic in SensorTopic::ALL
            .iter()
            .map(|&s| self.topics.topic_for(s))
            .chain(outbound)
        {
            if !seen.insert(topic) {
                return Err(ConfigError::DuplicateTopic(topic.to_string()));
            }
        }

        if self.mqtt.qos > 2 {
            return Err(ConfigError::Env {
                var: "mqtt.qos",
                value: self.mqtt.qos.to_string(),
            });
        }
        Ok(())
    }

    /// Identifiant MQTT : configuré, sinon "pvtwin-<uuid>"
    pub fn client_id(&self) -> String {
        self.mqtt
            .client_id
            .clone()
            .unwrap_or_else(|| format!("pvtwin-{}", uuid::Uuid::new_v4()))
    }
}

/// Config complète : fichier + environnement + validation
pub async fn load_config() -> Result<TwinConfig, ConfigError> {
    let path = TwinConfig::default_path();
    let mut cfg = TwinConfig::load_from(&path).await?;
    cfg.apply_env_overrides(|var| std::env::var(var).ok())?;
    cfg.validate()?;
    Ok(cfg)
}
