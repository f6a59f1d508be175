use crate::config::TopicsConf;
use std::collections::HashMap;

/// Capteurs connus du panneau, un topic MQTT chacun
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorTopic {
    /// INA226 : voltage, current, power
    PowerMeter,
    /// TSL2591 : lux
    Light,
    /// AHT20 : temperature, humidity
    TempHumidity,
    /// BMP280 : temperature, pressure
    TempPressure,
    Irradiance,
    /// États des GPIO auxiliaires, fusionnés clé par clé
    Pins,
}

impl SensorTopic {
    pub const ALL: [SensorTopic; 6] = [
        SensorTopic::PowerMeter,
        SensorTopic::Light,
        SensorTopic::TempHumidity,
        SensorTopic::TempPressure,
        SensorTopic::Irradiance,
        SensorTopic::Pins,
    ];

    /// Seule la mesure de tension déclenche une estimation
    pub fn triggers_estimate(self) -> bool {
        matches!(self, SensorTopic::PowerMeter)
    }
}

#[derive(Debug, Clone)]
pub struct TopicMap {
    inbound: HashMap<String, SensorTopic>, // "iot/painel/INA226" -> PowerMeter
    estimated_power: String,
}

impl TopicMap {
    pub fn from_conf(conf: &TopicsConf) -> Self {
        let inbound = SensorTopic::ALL
            .iter()
            .map(|&sensor| (conf.topic_for(sensor).to_string(), sensor))
            .collect();

        Self {
            inbound,
            estimated_power: conf.estimated_power.clone(),
        }
    }

    pub fn resolve(&self, topic: &str) -> Option<SensorTopic> {
        self.inbound.get(topic).copied()
    }

    /// Topics à (ré)abonner à chaque connexion
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inbound.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn estimated_power(&self) -> &str {
        &self.estimated_power
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics_resolve() {
        let map = TopicMap::from_conf(&TopicsConf::default());
        assert_eq!(map.resolve("iot/painel/INA226"), Some(SensorTopic::PowerMeter));
        assert_eq!(map.resolve("iot/painel/AHT20"), Some(SensorTopic::TempHumidity));
        assert_eq!(map.resolve("iot/painel/pins"), Some(SensorTopic::Pins));
        assert_eq!(map.resolve("iot/painel/unknown"), None);
        assert_eq!(map.estimated_power(), "iot/painel/estimatedPower");
    }

    #[test]
    fn test_subscriptions_cover_every_sensor() {
        let map = TopicMap::from_conf(&TopicsConf::default());
        let subs = map.subscriptions();
        assert_eq!(subs.len(), SensorTopic::ALL.len());
        assert!(!subs.contains(&"iot/painel/estimatedPower".to_string()));
    }

    #[test]
    fn test_only_power_meter_triggers() {
        let triggering: Vec<_> = SensorTopic::ALL.iter().filter(|t| t.triggers_estimate()).collect();
        assert_eq!(triggering, vec![&SensorTopic::PowerMeter]);
    }
}
