/*!
Bus de télémétrie simulé pour développement sans broker

Implémente `TelemetryBus` en mémoire : toutes les publications sont
enregistrées pour les assertions, et le bus peut être mis en panne.
*/

use async_trait::async_trait;
use pvtwin_kernel::config::TopicsConf;
use pvtwin_kernel::{BusError, TelemetryBus};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Bus simulé, clonable : les clones partagent le même journal
#[derive(Clone, Default)]
pub struct MockBus {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    failing: Arc<AtomicBool>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les publications suivantes échouent tant que `failing` est vrai
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
    }
}

#[async_trait]
impl TelemetryBus for MockBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "mock bus offline".to_string(),
            });
        }

        log::info!("📤 [MOCK] Published to {}: {} bytes", topic, payload.len());
        self.published_messages.lock().unwrap().push(MockMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Payloads capteurs au format publié par le panneau
pub struct SensorMessageBuilder {
    topics: TopicsConf,
}

impl SensorMessageBuilder {
    pub fn new(topics: TopicsConf) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &TopicsConf {
        &self.topics
    }

    /// INA226 : tension [V], courant [A], puissance [W]
    pub fn power_meter(voltage: f64, current: f64, power: f64) -> Value {
        serde_json::json!({
            "voltage": voltage,
            "current": current,
            "power": power
        })
    }

    /// TSL2591
    pub fn light(lux: f64) -> Value {
        serde_json::json!({ "lux": lux })
    }

    /// AHT20 (température utilisée par l'estimateur)
    pub fn temp_humidity(temperature: f64, humidity: f64) -> Value {
        serde_json::json!({
            "temperature": temperature,
            "humidity": humidity
        })
    }

    /// BMP280
    pub fn temp_pressure(temperature: f64, pressure: f64) -> Value {
        serde_json::json!({
            "temperature": temperature,
            "pressure": pressure
        })
    }

    pub fn irradiance(irradiance: f64) -> Value {
        serde_json::json!({ "irradiance": irradiance })
    }

    /// États GPIO, ex: [("GPIO23", "high")]
    pub fn pins(states: &[(&str, Value)]) -> Value {
        let map = states
            .iter()
            .map(|(pin, state)| (pin.to_string(), state.clone()))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

impl Default for SensorMessageBuilder {
    fn default() -> Self {
        Self::new(TopicsConf::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_bus_records_publications() {
        let bus = MockBus::new();
        bus.publish("iot/painel/estimatedPower", br#"{"estimatedPower":1.5}"#.to_vec())
            .await
            .unwrap();

        let messages = bus.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "iot/painel/estimatedPower");

        let parsed: Option<Value> = bus.get_last_json_message("iot/painel/estimatedPower").unwrap();
        assert_eq!(parsed.unwrap()["estimatedPower"], 1.5);

        bus.clear();
        assert!(bus.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_failing_bus() {
        let bus = MockBus::new();
        let clone = bus.clone();
        bus.set_failing(true);

        assert!(clone.publish("t", vec![]).await.is_err());
        assert!(bus.get_published_messages().is_empty());

        bus.set_failing(false);
        assert!(clone.publish("t", vec![]).await.is_ok());
        assert_eq!(bus.find_messages_by_topic("t").len(), 1);
    }

    #[test]
    fn test_message_builders() {
        let ina = SensorMessageBuilder::power_meter(18.1, 0.62, 11.2);
        assert_eq!(ina["voltage"], 18.1);
        assert_eq!(ina["power"], 11.2);

        let pins = SensorMessageBuilder::pins(&[("GPIO23", Value::from("high"))]);
        assert_eq!(pins["GPIO23"], "high");

        let builder = SensorMessageBuilder::default();
        assert_eq!(builder.topics().power_meter, "iot/painel/INA226");
    }
}
