/**
 * SENSOR STORE - Dernières valeurs connues des capteurs du panneau
 *
 * RÔLE : Source unique des lectures les plus récentes (dernière écriture gagne)
 * et porte d'entrée de l'estimation : irradiance, température AHT20 et tension
 * doivent être connues pour tenter un calcul.
 *
 * PARTAGE : `SharedStore` (Arc<Mutex>) entre dispatcher et diagnostics.
 * Mise à jour + vérification + lecture du triplet se font sous un seul verrou.
 */

use crate::topics::SensorTopic;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub type SharedStore = Arc<Mutex<SensorStore>>;

pub fn new_shared_store() -> SharedStore {
    Arc::new(Mutex::new(SensorStore::new()))
}

/// Champs décodés d'un payload JSON objet
pub type SensorFields = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub lux: Option<f64>,
    /// AHT20, utilisée par l'estimateur
    pub temperature_primary: Option<f64>,
    pub humidity: Option<f64>,
    /// BMP280, informative
    pub temperature_secondary: Option<f64>,
    pub pressure: Option<f64>,
    pub irradiance: Option<f64>,
    pub pins: SensorFields,
}

/// Triplet (T, G, V) complet, prêt pour l'estimateur
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateInputs {
    pub temperature: f64,
    pub irradiance: f64,
    pub voltage: f64,
}

#[derive(Debug, Default)]
pub struct SensorStore {
    snapshot: SensorSnapshot,
    incomplete: u64,
}

impl SensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Écrit les champs du topic dans le snapshot. Une clé absente ou non
    /// numérique efface la valeur précédente ; les pins sont fusionnés.
    pub fn update(&mut self, topic: SensorTopic, fields: &SensorFields) {
        let s = &mut self.snapshot;
        match topic {
            SensorTopic::PowerMeter => {
                s.voltage = number(fields, "voltage");
                s.current = number(fields, "current");
                s.power = number(fields, "power");
            }
            SensorTopic::Light => {
                s.lux = number(fields, "lux");
            }
            SensorTopic::TempHumidity => {
                s.temperature_primary = number(fields, "temperature");
                s.humidity = number(fields, "humidity");
            }
            SensorTopic::TempPressure => {
                s.temperature_secondary = number(fields, "temperature");
                s.pressure = number(fields, "pressure");
            }
            SensorTopic::Irradiance => {
                s.irradiance = number(fields, "irradiance");
            }
            SensorTopic::Pins => {
                for (pin, state) in fields {
                    s.pins.insert(pin.clone(), state.clone());
                }
            }
        }
    }

    pub fn ready_for_estimate(&self) -> bool {
        self.estimate_inputs().is_some()
    }

    /// Vérification de complétude et lecture du triplet en une seule opération
    pub fn estimate_inputs(&self) -> Option<EstimateInputs> {
        Some(EstimateInputs {
            temperature: self.snapshot.temperature_primary?,
            irradiance: self.snapshot.irradiance?,
            voltage: self.snapshot.voltage?,
        })
    }

    pub fn readings(&self) -> &SensorSnapshot {
        &self.snapshot
    }

    /// Compte une tentative d'estimation sans données suffisantes
    pub fn record_incomplete(&mut self) -> u64 {
        self.incomplete += 1;
        self.incomplete
    }

    pub fn incomplete_count(&self) -> u64 {
        self.incomplete
    }
}

fn number(fields: &SensorFields, key: &str) -> Option<f64> {
    fields.get(key).and_then(Value::as_f64)
}
