use crate::bus::TelemetryBus;
use crate::store::{SensorSnapshot, SensorStore, SharedStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::{self, JoinHandle};

#[derive(Debug, Serialize)]
pub struct DiagnosticsReport {
    pub uptime_seconds: u64,
    pub incomplete_estimates: u64,
    pub estimates_published: u64,
    pub numeric_degeneracies: u64,
    pub decode_errors: u64,
    pub unknown_topics: u64,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
    pub readings: SensorSnapshot,
    pub timestamp: String,
}

/// Compteurs d'observabilité, partagés entre bus et dispatcher
#[derive(Clone)]
pub struct DiagnosticsTracker {
    start_time: Instant,
    estimates_published: Arc<AtomicU64>,
    numeric_degeneracies: Arc<AtomicU64>,
    decode_errors: Arc<AtomicU64>,
    unknown_topics: Arc<AtomicU64>,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<Mutex<String>>,
}

impl Default for DiagnosticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticsTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            estimates_published: Arc::new(AtomicU64::new(0)),
            numeric_degeneracies: Arc::new(AtomicU64::new(0)),
            decode_errors: Arc::new(AtomicU64::new(0)),
            unknown_topics: Arc::new(AtomicU64::new(0)),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn mark_mqtt_disconnected(&self) {
        *self.mqtt_status.lock() = "disconnected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn record_published(&self) {
        self.estimates_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degenerate(&self) {
        self.numeric_degeneracies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_topic(&self) {
        self.unknown_topics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self, store: &SensorStore) -> DiagnosticsReport {
        DiagnosticsReport {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            incomplete_estimates: store.incomplete_count(),
            estimates_published: self.estimates_published.load(Ordering::Relaxed),
            numeric_degeneracies: self.numeric_degeneracies.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unknown_topics: self.unknown_topics.load(Ordering::Relaxed),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
            readings: store.readings().clone(),
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }

    /// Publication périodique du rapport sur `topic`
    pub fn spawn_publisher<B>(&self, store: SharedStore, bus: B, topic: String, every: Duration) -> JoinHandle<()>
    where
        B: TelemetryBus + 'static,
    {
        let tracker = self.clone();

        task::spawn(async move {
            let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
            // le premier tick est immédiat : rien d'utile à publier au démarrage
            interval.tick().await;

            loop {
                interval.tick().await;
                let report = {
                    let store = store.lock();
                    tracker.report(&store)
                };
                match serde_json::to_vec(&report) {
                    Ok(payload) => match bus.publish(&topic, payload).await {
                        Ok(()) => log::debug!(
                            "[diagnostics] published (uptime: {}s, estimates: {}, incomplete: {})",
                            report.uptime_seconds,
                            report.estimates_published,
                            report.incomplete_estimates
                        ),
                        Err(e) => log::warn!("[diagnostics] {e}"),
                    },
                    Err(e) => log::error!("[diagnostics] failed to serialize report: {e}"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::SensorTopic;
    use serde_json::json;

    #[test]
    fn test_report_counts() {
        let tracker = DiagnosticsTracker::new();
        let mut store = SensorStore::new();
        store.record_incomplete();

        tracker.record_published();
        tracker.record_published();
        tracker.record_degenerate();
        tracker.record_decode_error();
        tracker.record_unknown_topic();
        tracker.increment_reconnects();

        let report = tracker.report(&store);
        assert_eq!(report.incomplete_estimates, 1);
        assert_eq!(report.estimates_published, 2);
        assert_eq!(report.numeric_degeneracies, 1);
        assert_eq!(report.decode_errors, 1);
        assert_eq!(report.unknown_topics, 1);
        assert_eq!(report.mqtt_reconnects, 1);
        assert_eq!(report.mqtt_status, "reconnecting");
        assert!(!report.timestamp.is_empty());
    }

    #[test]
    fn test_clones_share_counters() {
        let tracker = DiagnosticsTracker::new();
        let other = tracker.clone();
        other.record_published();
        other.mark_mqtt_connected();

        let report = tracker.report(&SensorStore::new());
        assert_eq!(report.estimates_published, 1);
        assert_eq!(report.mqtt_status, "connected");
    }

    #[test]
    fn test_report_serializes_readings() {
        let mut store = SensorStore::new();
        let fields = json!({"irradiance": 912.5});
        store.update(SensorTopic::Irradiance, fields.as_object().unwrap());

        let report = DiagnosticsTracker::new().report(&store);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["readings"]["irradiance"], json!(912.5));
        assert_eq!(value["readings"]["voltage"], serde_json::Value::Null);
        assert_eq!(value["mqtt_status"], "connecting");
    }
}
