use crate::config::MqttConf;
use crate::diagnostics::DiagnosticsTracker;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS, SubscribeFilter};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// Côté sortant du bus de télémétrie
#[async_trait]
pub trait TelemetryBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Message reçu du broker, transmis tel quel au dispatcher
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    qos: QoS,
}

impl MqttBus {
    pub fn client(&self) -> &AsyncClient {
        &self.client
    }
}

#[async_trait]
impl TelemetryBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Crée le client MQTT ; la connexion s'établit au premier poll de l'EventLoop
pub fn connect(conf: &MqttConf, client_id: &str) -> (MqttBus, EventLoop) {
    let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs));
    opts.set_clean_session(true);

    let (client, eventloop) = AsyncClient::new(opts, 10);
    let bus = MqttBus {
        client,
        qos: qos_from_level(conf.qos),
    };
    (bus, eventloop)
}

/// Poll rumqttc en tâche de fond : réabonnement à chaque ConnAck,
/// publications entrantes vers le dispatcher, pause de 2s sur erreur.
pub fn spawn_event_loop(
    mut eventloop: EventLoop,
    bus: MqttBus,
    subscriptions: Vec<String>,
    diagnostics: DiagnosticsTracker,
    tx: mpsc::Sender<InboundMessage>,
) -> JoinHandle<()> {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    log::info!("[bus] connected to broker ({:?})", ack.code);
                    diagnostics.mark_mqtt_connected();

                    // hors de la boucle de poll : subscribe passe par le même canal de requêtes
                    let client = bus.client.clone();
                    let filters: Vec<SubscribeFilter> = subscriptions
                        .iter()
                        .map(|t| SubscribeFilter::new(t.clone(), bus.qos))
                        .collect();
                    let topics = subscriptions.clone();
                    task::spawn(async move {
                        match client.subscribe_many(filters).await {
                            Ok(()) => log::info!("[bus] subscribed to {:?}", topics),
                            Err(e) => log::error!("[bus] subscribe failed: {e:?}"),
                        }
                    });
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    let msg = InboundMessage {
                        topic: p.topic.clone(),
                        payload: p.payload.to_vec(),
                    };
                    if tx.send(msg).await.is_err() {
                        log::info!("[bus] dispatcher stopped, leaving event loop");
                        break;
                    }
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    diagnostics.mark_mqtt_disconnected();
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("[bus] MQTT error: {e:?}, retrying in 2s");
                    diagnostics.increment_reconnects();
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2), QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn test_connect_uses_configured_qos() {
        let conf = MqttConf { qos: 0, ..MqttConf::default() };
        let (bus, _eventloop) = connect(&conf, "pvtwin-test");
        assert_eq!(bus.qos, QoS::AtMostOnce);
    }
}
