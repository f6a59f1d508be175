/**
 * ESTIMATOR - Modèle analytique du module photovoltaïque
 *
 * RÔLE : Calcule la puissance instantanée estimée du module à partir de la
 * température de cellule, de l'irradiance et de la tension mesurée.
 *
 * FONCTIONNEMENT :
 * - Compensation de voc/isc/vmp/imp en température et irradiance
 * - Courbe I-V approchée par deux segments (quadratique côté tension haute,
 *   racine carrée côté source de courant), sélectionnés par un échelon unitaire
 * - Aucune donnée conservée entre deux appels : fonction pure de (T, G, V)
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Irradiance de référence STC [W/m²]
pub const G0: f64 = 1000.0;
/// Température de référence STC [°C]
pub const T0: f64 = 25.0;
/// Charge élémentaire [C]
pub const ELEMENTARY_CHARGE: f64 = 1.602e-19;
/// Constante de Boltzmann [J/K]
pub const BOLTZMANN: f64 = 1.3806503e-23;
/// Facteur appliqué au produit V·I avant publication
pub const POWER_SCALE: f64 = 1000.0;

const CELSIUS_TO_KELVIN: f64 = 273.15;
// évite ln(0) quand G == 0
const LOG_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EstimationError {
    #[error("numeric degeneracy while computing {quantity}")]
    NumericDegeneracy { quantity: &'static str },
}

/// Caractéristiques datasheet du module (chargées une fois au démarrage)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleParameters {
    /// Tension de circuit ouvert STC [V]
    pub voc0: f64,
    /// Courant de court-circuit STC [A]
    pub isc0: f64,
    /// Tension au point de puissance max STC [V]
    pub vmp0: f64,
    /// Courant au point de puissance max STC [A]
    pub imp0: f64,
    /// Coefficient de température de la tension [1/°C]
    pub alphav: f64,
    /// Coefficient de température du courant [1/°C]
    pub alphai: f64,
    /// Nombre de cellules en série
    pub ns: u32,
}

impl Default for ModuleParameters {
    fn default() -> Self {
        Self {
            voc0: 22.06,
            isc0: 0.70,
            vmp0: 18.81,
            imp0: 0.63,
            alphav: -0.31 / 100.0,
            alphai: 0.06 / 100.0,
            ns: 36,
        }
    }
}

impl ModuleParameters {
    pub fn kv(&self) -> f64 {
        self.vmp0 / self.voc0
    }

    pub fn ki(&self) -> f64 {
        self.imp0 / self.isc0
    }

    /// Vérifie la cohérence des valeurs datasheet
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("voc0", self.voc0),
            ("isc0", self.isc0),
            ("vmp0", self.vmp0),
            ("imp0", self.imp0),
            ("alphav", self.alphav),
            ("alphai", self.alphai),
        ];
        if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("{} is not a finite number", name));
        }
        if self.ns == 0 {
            return Err("ns must be at least 1".into());
        }
        if !(self.vmp0 > 0.0 && self.vmp0 < self.voc0) {
            return Err(format!("expected 0 < vmp0 < voc0, got vmp0={} voc0={}", self.vmp0, self.voc0));
        }
        if !(self.imp0 > 0.0 && self.imp0 < self.isc0) {
            return Err(format!("expected 0 < imp0 < isc0, got imp0={} isc0={}", self.imp0, self.isc0));
        }
        Ok(())
    }
}

/// voc/isc/vmp/imp dans les conditions courantes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePoints {
    pub voc: f64,
    pub isc: f64,
    pub vmp: f64,
    pub imp: f64,
}

impl ReferencePoints {
    /// Compense les points datasheet en température et irradiance.
    /// Une irradiance négative est traitée comme 0.
    pub fn compute(temperature: f64, irradiance: f64, params: &ModuleParameters) -> Result<Self, EstimationError> {
        let g = irradiance.max(0.0);
        let vt = BOLTZMANN * (temperature + CELSIUS_TO_KELVIN) / ELEMENTARY_CHARGE;

        let voc = f64::from(params.ns) * vt * (g / G0 + LOG_EPSILON).ln()
            + params.voc0 * (1.0 + params.alphav * (temperature - T0));
        let isc = params.isc0 * g / G0 * (1.0 + params.alphai * (temperature - T0));
        let imp = isc * params.ki();
        let vmp = voc * params.kv();

        Ok(Self {
            voc: finite("voc", voc)?,
            isc: finite("isc", isc)?,
            vmp: finite("vmp", vmp)?,
            imp: finite("imp", imp)?,
        })
    }
}

/// Coefficients de forme des deux segments de la courbe I-V
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl ShapeCoefficients {
    pub fn from_reference(rp: &ReferencePoints) -> Result<Self, EstimationError> {
        let ReferencePoints { voc, isc, vmp, imp } = *rp;

        nonzero("vmp", vmp)?;
        nonzero("imp", imp)?;
        nonzero("voc - vmp", voc - vmp)?;
        nonzero("imp - isc", imp - isc)?;

        let dv2 = (voc - vmp).powi(2);
        let di2 = (imp - isc).powi(2);

        let a = imp / dv2 * (voc / vmp - 2.0);
        let b = -2.0 * vmp * imp / dv2 * (voc / vmp - 2.0) - imp / vmp;
        let c = imp * voc / vmp - voc * imp * (voc - 2.0 * vmp).powi(2) / (vmp * dv2);
        let d = -vmp * (2.0 * imp - isc) / (imp * di2);
        let e = 2.0 * vmp * (2.0 * imp - isc) / di2 - vmp / imp;
        let f = vmp * isc * (2.0 * isc - 3.0 * imp) / di2;

        Ok(Self {
            a: finite("a", a)?,
            b: finite("b", b)?,
            c: finite("c", c)?,
            d: nonzero("d", d)?,
            e: finite("e", e)?,
            f: finite("f", f)?,
        })
    }

    /// Segment haute tension : i = a·V² + b·V + c
    pub fn quadratic_current(&self, voltage: f64) -> f64 {
        self.a * voltage.powi(2) + self.b * voltage + self.c
    }

    /// Segment source de courant. Le discriminant est ramené à 0 s'il est négatif.
    pub fn sqrt_current(&self, voltage: f64) -> f64 {
        let discriminant = (self.e.powi(2) - 4.0 * self.d * (self.f - voltage)).max(0.0);
        (-self.e - discriminant.sqrt()) / (2.0 * self.d)
    }
}

/// Segment actif de la courbe, choisi par le signe de V - vmp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// V < vmp : branche racine carrée (d, e, f)
    CurrentSource,
    /// V == vmp exactement : moyenne des deux branches
    Boundary,
    /// V > vmp : branche quadratique (a, b, c)
    VoltageSource,
}

impl Segment {
    pub fn select(voltage: f64, vmp: f64) -> Self {
        let delta = voltage - vmp;
        if delta < 0.0 {
            Segment::CurrentSource
        } else if delta > 0.0 {
            Segment::VoltageSource
        } else {
            Segment::Boundary
        }
    }

    /// Poids (u1, u2) appliqués aux branches quadratique et racine carrée
    pub fn weights(self) -> (f64, f64) {
        match self {
            Segment::CurrentSource => (0.0, 1.0),
            Segment::Boundary => (0.5, 0.5),
            Segment::VoltageSource => (1.0, 0.0),
        }
    }
}

/// Résultat d'une estimation avec le point de fonctionnement calculé
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerEstimate {
    /// Puissance estimée, arrondie à 3 décimales
    pub power: f64,
    pub current: f64,
    pub segment: Segment,
    pub reference: ReferencePoints,
}

/// Estime la puissance du module pour (T [°C], G [W/m²], V [V])
pub fn estimate(
    temperature: f64,
    irradiance: f64,
    voltage: f64,
    params: &ModuleParameters,
) -> Result<PowerEstimate, EstimationError> {
    let reference = ReferencePoints::compute(temperature, irradiance, params)?;
    let segment = Segment::select(voltage, reference.vmp);
    let coeffs = ShapeCoefficients::from_reference(&reference)?;

    let (u1, u2) = segment.weights();
    let current = finite(
        "current",
        coeffs.quadratic_current(voltage) * u1 + coeffs.sqrt_current(voltage) * u2,
    )?;
    let power = finite("power", voltage * current * POWER_SCALE)?;

    Ok(PowerEstimate {
        power: round_to_millis(power),
        current,
        segment,
        reference,
    })
}

/// Arrondi décimal exact à 3 chiffres (passe par la représentation décimale)
pub fn round_to_millis(value: f64) -> f64 {
    format!("{:.3}", value).parse::<f64>().unwrap_or(value)
}

fn finite(quantity: &'static str, value: f64) -> Result<f64, EstimationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EstimationError::NumericDegeneracy { quantity })
    }
}

fn nonzero(quantity: &'static str, value: f64) -> Result<f64, EstimationError> {
    if value == 0.0 {
        return Err(EstimationError::NumericDegeneracy { quantity });
    }
    finite(quantity, value)
}
