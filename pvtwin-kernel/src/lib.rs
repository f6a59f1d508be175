/*!
# PV Twin Kernel - Estimation de puissance d'un module photovoltaïque

Jumeau numérique alimenté par la télémétrie MQTT du panneau :
- `store` : dernières valeurs des capteurs + porte de complétude
- `estimator` : modèle I-V analytique, fonction pure de (T, G, V)
- `dispatcher` : routage des messages, estimation, publication
- `bus` : interface du bus de télémétrie et implémentation rumqttc
- `diagnostics` : compteurs et rapport périodique
*/

pub mod bus;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod estimator;
pub mod models;
pub mod store;
pub mod topics;

pub use bus::{BusError, InboundMessage, MqttBus, TelemetryBus};
pub use config::TwinConfig;
pub use diagnostics::DiagnosticsTracker;
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
pub use estimator::{estimate, EstimationError, ModuleParameters, PowerEstimate};
pub use store::{new_shared_store, SensorStore, SharedStore};
pub use topics::{SensorTopic, TopicMap};
