/*!
# PV Twin DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests de l'estimateur sans broker MQTT :
- Bus de télémétrie simulé qui enregistre les publications
- Builders de payloads capteurs (INA226, AHT20, irradiance, pins...)
- Harness pilotant un vrai `Dispatcher`
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockBus, SensorMessageBuilder};
pub use test_utils::TestHarness;
