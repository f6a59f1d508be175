/*!
Test Harness pour l'estimateur PV

Facilite l'écriture de tests de bout en bout :
- Dispatcher réel branché sur un `MockBus`
- Envoi de messages capteurs sur les topics configurés
- Assertions sur les estimations publiées
*/

use crate::mqtt_stub::{MockBus, SensorMessageBuilder};
use anyhow::Result;
use pvtwin_kernel::config::TopicsConf;
use pvtwin_kernel::dispatcher::{DispatchError, DispatchOutcome};
use pvtwin_kernel::models::EstimatedPowerOut;
use pvtwin_kernel::store::SensorSnapshot;
use pvtwin_kernel::{new_shared_store, DiagnosticsTracker, Dispatcher, ModuleParameters, TopicMap};
use serde_json::Value;

pub struct TestHarness {
    pub bus: MockBus,
    pub dispatcher: Dispatcher<MockBus>,
    topics: TopicsConf,
}

impl TestHarness {
    /// Harness avec les topics et le module par défaut
    pub fn new() -> Self {
        Self::with_module(ModuleParameters::default())
    }

    pub fn with_module(params: ModuleParameters) -> Self {
        env_logger::builder().is_test(true).try_init().ok();

        let topics = TopicsConf::default();
        let bus = MockBus::new();
        let dispatcher = Dispatcher::new(
            new_shared_store(),
            TopicMap::from_conf(&topics),
            params,
            bus.clone(),
            DiagnosticsTracker::new(),
        );

        Self { bus, dispatcher, topics }
    }

    /// Envoie un payload brut (JSON valide ou non) sur un topic
    pub async fn send_raw(&self, topic: &str, payload: &[u8]) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.handle_message(topic, payload).await
    }

    pub async fn send_json(&self, topic: &str, value: &Value) -> Result<DispatchOutcome> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.send_raw(topic, &payload).await?)
    }

    pub async fn send_power_meter(&self, voltage: f64, current: f64, power: f64) -> Result<DispatchOutcome> {
        let topic = self.topics.power_meter.clone();
        self.send_json(&topic, &SensorMessageBuilder::power_meter(voltage, current, power)).await
    }

    pub async fn send_temp_humidity(&self, temperature: f64, humidity: f64) -> Result<DispatchOutcome> {
        let topic = self.topics.temp_humidity.clone();
        self.send_json(&topic, &SensorMessageBuilder::temp_humidity(temperature, humidity)).await
    }

    pub async fn send_temp_pressure(&self, temperature: f64, pressure: f64) -> Result<DispatchOutcome> {
        let topic = self.topics.temp_pressure.clone();
        self.send_json(&topic, &SensorMessageBuilder::temp_pressure(temperature, pressure)).await
    }

    pub async fn send_light(&self, lux: f64) -> Result<DispatchOutcome> {
        let topic = self.topics.light.clone();
        self.send_json(&topic, &SensorMessageBuilder::light(lux)).await
    }

    pub async fn send_irradiance(&self, irradiance: f64) -> Result<DispatchOutcome> {
        let topic = self.topics.irradiance.clone();
        self.send_json(&topic, &SensorMessageBuilder::irradiance(irradiance)).await
    }

    pub async fn send_pins(&self, states: &[(&str, Value)]) -> Result<DispatchOutcome> {
        let topic = self.topics.pins.clone();
        self.send_json(&topic, &SensorMessageBuilder::pins(states)).await
    }

    pub fn topics(&self) -> &TopicsConf {
        &self.topics
    }

    /// Estimations publiées, dans l'ordre
    pub fn estimates(&self) -> Result<Vec<f64>> {
        self.bus
            .find_messages_by_topic(&self.topics.estimated_power)
            .iter()
            .map(|msg| -> Result<f64> {
                let out: EstimatedPowerOut = serde_json::from_slice(&msg.payload)?;
                Ok(out.estimated_power)
            })
            .collect()
    }

    pub fn readings(&self) -> SensorSnapshot {
        self.dispatcher.store().lock().readings().clone()
    }

    pub fn incomplete_count(&self) -> u64 {
        self.dispatcher.store().lock().incomplete_count()
    }

    /// Assert qu'exactement `count` estimations ont été publiées
    pub fn assert_estimate_count(&self, count: usize) -> Result<()> {
        let actual = self.estimates()?.len();
        if actual != count {
            anyhow::bail!("expected {} estimates on {}, got {}", count, self.topics.estimated_power, actual);
        }
        Ok(())
    }

    /// Assert que la dernière estimation vaut `expected` à `tolerance` près
    pub fn assert_last_estimate(&self, expected: f64, tolerance: f64) -> Result<()> {
        match self.estimates()?.last() {
            Some(actual) if (actual - expected).abs() <= tolerance => Ok(()),
            Some(actual) => anyhow::bail!("last estimate {} differs from {} (±{})", actual, expected, tolerance),
            None => anyhow::bail!("no estimate published on {}", self.topics.estimated_power),
        }
    }

    /// Reset les messages publiés (le store est conservé)
    pub fn clear_published(&self) {
        self.bus.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::new();
        harness.send_temp_humidity(25.0, 45.0).await.unwrap();
        harness.send_irradiance(1000.0).await.unwrap();
        harness.send_power_meter(15.0, 0.66, 9.9).await.unwrap();

        harness.assert_estimate_count(1).unwrap();
        assert!(harness.assert_estimate_count(2).is_err());
        assert!(harness.estimates().unwrap()[0] > 0.0);

        harness.clear_published();
        harness.assert_estimate_count(0).unwrap();
        assert!(harness.assert_last_estimate(0.0, 1.0).is_err());
    }
}
