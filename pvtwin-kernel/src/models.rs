use crate::estimator::PowerEstimate;
use serde::{Deserialize, Serialize};

/// Payload publié sur le topic de sortie : {"estimatedPower": 11850.3}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatedPowerOut {
    #[serde(rename = "estimatedPower")]
    pub estimated_power: f64,
}

impl From<&PowerEstimate> for EstimatedPowerOut {
    fn from(estimate: &PowerEstimate) -> Self {
        Self {
            estimated_power: estimate.power,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let out = EstimatedPowerOut { estimated_power: 6720.286 };
        assert_eq!(serde_json::to_string(&out).unwrap(), r#"{"estimatedPower":6720.286}"#);

        let back: EstimatedPowerOut = serde_json::from_str(r#"{"estimatedPower": 0.0}"#).unwrap();
        assert_eq!(back.estimated_power, 0.0);
    }
}
