/**
 * DISPATCHER - Routage des messages capteurs vers le store et l'estimateur
 *
 * RÔLE : Décode chaque payload, met à jour le SensorStore selon le topic et,
 * sur réception de la tension (INA226), tente une estimation puis publie
 * {"estimatedPower": ...} sur le topic de sortie.
 *
 * ERREURS : rien n'est fatal. Payload invalide ou topic inconnu = message
 * ignoré ; données incomplètes = compteur incrémenté ; dégénérescence
 * numérique = pas de publication.
 */

use crate::bus::{BusError, InboundMessage, TelemetryBus};
use crate::diagnostics::DiagnosticsTracker;
use crate::estimator::{self, EstimationError, ModuleParameters, PowerEstimate};
use crate::models::EstimatedPowerOut;
use crate::store::{SensorFields, SharedStore};
use crate::topics::{SensorTopic, TopicMap};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown topic {0}")]
    UnknownTopic(String),
    #[error("invalid JSON on {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("payload on {topic} is not a JSON object")]
    NotAnObject { topic: String },
    #[error("failed to encode estimate: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Publish(#[from] BusError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Store mis à jour, pas d'estimation demandée
    Stored(SensorTopic),
    Published(PowerEstimate),
    /// Irradiance, température ou tension manquante
    NotReady { incomplete: u64 },
    Degenerate(EstimationError),
}

pub struct Dispatcher<B: TelemetryBus> {
    store: SharedStore,
    topics: TopicMap,
    params: ModuleParameters,
    bus: B,
    diagnostics: DiagnosticsTracker,
}

impl<B: TelemetryBus> Dispatcher<B> {
    pub fn new(
        store: SharedStore,
        topics: TopicMap,
        params: ModuleParameters,
        bus: B,
        diagnostics: DiagnosticsTracker,
    ) -> Self {
        Self { store, topics, params, bus, diagnostics }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn diagnostics(&self) -> &DiagnosticsTracker {
        &self.diagnostics
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    /// Traite un message entrant jusqu'au bout (mise à jour + estimation éventuelle)
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> Result<DispatchOutcome, DispatchError> {
        let Some(sensor) = self.topics.resolve(topic) else {
            self.diagnostics.record_unknown_topic();
            return Err(DispatchError::UnknownTopic(topic.to_string()));
        };

        let fields = decode_fields(topic, payload).inspect_err(|_| self.diagnostics.record_decode_error())?;

        // update + gate + lecture du triplet sous le même verrou
        let inputs = {
            let mut store = self.store.lock();
            store.update(sensor, &fields);
            log::debug!("[dispatch] {topic} -> {sensor:?}");

            if !sensor.triggers_estimate() {
                return Ok(DispatchOutcome::Stored(sensor));
            }
            log::info!("[dispatch] measured power: {:?}", store.readings().power);

            match store.estimate_inputs() {
                Some(inputs) => inputs,
                None => {
                    let incomplete = store.record_incomplete();
                    log::info!("[dispatch] waiting for irradiance/temperature/voltage (incomplete: {incomplete})");
                    return Ok(DispatchOutcome::NotReady { incomplete });
                }
            }
        };

        match estimator::estimate(inputs.temperature, inputs.irradiance, inputs.voltage, &self.params) {
            Ok(estimate) => {
                let payload = serde_json::to_vec(&EstimatedPowerOut::from(&estimate))
                    .map_err(DispatchError::Encode)?;
                self.bus.publish(self.topics.estimated_power(), payload).await?;
                self.diagnostics.record_published();
                log::info!(
                    "[dispatch] estimated power {} published ({:?}, i={:.4})",
                    estimate.power,
                    estimate.segment,
                    estimate.current
                );
                Ok(DispatchOutcome::Published(estimate))
            }
            Err(err) => {
                self.diagnostics.record_degenerate();
                log::warn!(
                    "[dispatch] {err} (T={}, G={}, V={}), nothing published",
                    inputs.temperature,
                    inputs.irradiance,
                    inputs.voltage
                );
                Ok(DispatchOutcome::Degenerate(err))
            }
        }
    }

    /// Consomme les messages un par un jusqu'à fermeture du canal
    pub async fn run(&self, mut rx: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = self.handle_message(&msg.topic, &msg.payload).await {
                match e {
                    DispatchError::UnknownTopic(_) => log::debug!("[dispatch] {e}"),
                    _ => log::warn!("[dispatch] {e}"),
                }
            }
        }
        log::info!("[dispatch] inbound channel closed");
    }
}

/// Payload JSON objet -> champs. Tout le reste est rejeté.
pub fn decode_fields(topic: &str, payload: &[u8]) -> Result<SensorFields, DispatchError> {
    let value: Value = serde_json::from_slice(payload).map_err(|source| DispatchError::Decode {
        topic: topic.to_string(),
        source,
    })?;
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(DispatchError::NotAnObject { topic: topic.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicsConf;
    use crate::store::new_shared_store;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingBus {
        sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    }

    #[async_trait]
    impl TelemetryBus for RecordingBus {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
            self.sent.lock().push((topic.to_string(), payload));
            Ok(())
        }
    }

    fn dispatcher() -> (Dispatcher<RecordingBus>, RecordingBus) {
        let bus = RecordingBus::default();
        let d = Dispatcher::new(
            new_shared_store(),
            TopicMap::from_conf(&TopicsConf::default()),
            ModuleParameters::default(),
            bus.clone(),
            DiagnosticsTracker::new(),
        );
        (d, bus)
    }

    #[test]
    fn test_decode_fields() {
        assert!(decode_fields("t", br#"{"lux": 3}"#).is_ok());
        assert!(matches!(decode_fields("t", b"{oops"), Err(DispatchError::Decode { .. })));
        assert!(matches!(decode_fields("t", b"42"), Err(DispatchError::NotAnObject { .. })));
        assert!(matches!(decode_fields("t", b"[1,2]"), Err(DispatchError::NotAnObject { .. })));
    }

    #[tokio::test]
    async fn test_full_cycle_publishes_estimate() {
        let (d, bus) = dispatcher();
        d.handle_message("iot/painel/AHT20", br#"{"temperature": 25, "humidity": 40}"#).await.unwrap();
        d.handle_message("iot/painel/irradiance", br#"{"irradiance": 1000}"#).await.unwrap();
        let outcome = d
            .handle_message("iot/painel/INA226", br#"{"voltage": 18.81, "current": 0.6, "power": 11.2}"#)
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Published(e) if (e.power - 11850.3).abs() < 1e-3));
        let sent = bus.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "iot/painel/estimatedPower");
        let body: Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(body, serde_json::json!({"estimatedPower": 11850.3}));
    }

    #[tokio::test]
    async fn test_non_voltage_topics_never_estimate() {
        let (d, bus) = dispatcher();
        d.handle_message("iot/painel/INA226", br#"{"voltage": 18.0}"#).await.unwrap();
        d.handle_message("iot/painel/AHT20", br#"{"temperature": 25}"#).await.unwrap();
        let outcome = d.handle_message("iot/painel/irradiance", br#"{"irradiance": 900}"#).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Stored(SensorTopic::Irradiance));
        assert!(bus.sent.lock().is_empty());
        assert!(d.store().lock().ready_for_estimate());
    }

    #[tokio::test]
    async fn test_missing_irradiance_counts_incomplete() {
        let (d, bus) = dispatcher();
        d.handle_message("iot/painel/AHT20", br#"{"temperature": 25}"#).await.unwrap();
        let outcome = d.handle_message("iot/painel/INA226", br#"{"voltage": 18.0}"#).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::NotReady { incomplete: 1 });
        assert_eq!(d.store().lock().incomplete_count(), 1);
        assert!(bus.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_degenerate_input_is_not_published() {
        let (d, bus) = dispatcher();
        d.handle_message("iot/painel/AHT20", br#"{"temperature": 25}"#).await.unwrap();
        d.handle_message("iot/painel/irradiance", br#"{"irradiance": -3}"#).await.unwrap();
        let outcome = d.handle_message("iot/painel/INA226", br#"{"voltage": 12.0}"#).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Degenerate(_)));
        assert!(bus.sent.lock().is_empty());
        assert_eq!(d.diagnostics().report(&d.store().lock()).numeric_degeneracies, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_leaves_store_untouched() {
        let (d, _bus) = dispatcher();
        d.handle_message("iot/painel/INA226", br#"{"voltage": 17.0}"#).await.unwrap();

        let err = d.handle_message("iot/painel/INA226", b"voltage=18").await.unwrap_err();
        assert!(matches!(err, DispatchError::Decode { .. }));
        assert_eq!(d.store().lock().readings().voltage, Some(17.0));
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let (d, _bus) = dispatcher();
        let err = d.handle_message("iot/painel/camera", br#"{"frame": 1}"#).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTopic(t) if t == "iot/painel/camera"));
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let (d, bus) = dispatcher();
        let (tx, rx) = mpsc::channel(8);
        for (topic, payload) in [
            ("iot/painel/AHT20", r#"{"temperature": 25}"#),
            ("iot/painel/camera", "{}"),
            ("iot/painel/irradiance", "not json"),
            ("iot/painel/irradiance", r#"{"irradiance": 1000}"#),
            ("iot/painel/INA226", r#"{"voltage": 15.0}"#),
        ] {
            tx.send(InboundMessage { topic: topic.into(), payload: payload.as_bytes().to_vec() })
                .await
                .unwrap();
        }
        drop(tx);

        d.run(rx).await;
        assert_eq!(bus.sent.lock().len(), 1);
    }
}
