//! # Efficiency zones
//!
//! Each gear accelerates at full rate only inside its ideal duty band. Bands are closed ranges in
//! percent duty and the ideal band takes precedence where bands touch.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::motor::EfficiencyZone;
use serde::Deserialize;

use super::params::{MotorCtrlParams, NUM_GEARS};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A closed duty cycle range, `[min, max]` percent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Band(pub f64, pub f64);

/// Bands for one gear. Anything outside them is poor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GearZones {
    pub ideal: Band,

    #[serde(default)]
    pub suboptimal: Vec<Band>,
}

/// Bands for every gear, first gear first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ZoneTable(pub [GearZones; NUM_GEARS]);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Band {
    pub fn contains(&self, duty: f64) -> bool {
        duty >= self.0 && duty <= self.1
    }
}

impl Default for ZoneTable {
    fn default() -> Self {
        let gear = |ideal: (f64, f64), sub: &[(f64, f64)]| GearZones {
            ideal: Band(ideal.0, ideal.1),
            suboptimal: sub.iter().map(|b| Band(b.0, b.1)).collect(),
        };

        ZoneTable([
            gear((0.0, 20.0), &[(20.0, 30.0)]),
            gear((20.0, 40.0), &[(10.0, 20.0), (40.0, 50.0)]),
            gear((40.0, 60.0), &[(30.0, 40.0), (60.0, 70.0)]),
            gear((60.0, 80.0), &[(50.0, 60.0), (80.0, 90.0)]),
            gear((80.0, 100.0), &[(70.0, 80.0)]),
        ])
    }
}

impl ZoneTable {
    /// Classify a duty cycle in the given gear (1 based). Unknown gears are always poor.
    pub fn classify(&self, gear: u8, duty: f64) -> EfficiencyZone {
        let zones = match self.get(gear) {
            Some(z) => z,
            None => return EfficiencyZone::Poor
        };

        if zones.ideal.contains(duty) {
            EfficiencyZone::Ideal
        }
        else if zones.suboptimal.iter().any(|b| b.contains(duty)) {
            EfficiencyZone::Suboptimal
        }
        else {
            EfficiencyZone::Poor
        }
    }

    /// Position of the duty cycle inside the gear's ideal band as a percentage.
    ///
    /// Below the band is 0, above it is 100.
    pub fn ideal_zone_pct(&self, gear: u8, duty: f64) -> f64 {
        let Band(min, max) = match self.get(gear) {
            Some(z) => z.ideal,
            None => return 0.0
        };

        if duty < min {
            0.0
        }
        else if duty > max || max <= min {
            100.0
        }
        else {
            ((duty - min) / (max - min) * 100.0).max(0.0).min(100.0)
        }
    }

    fn get(&self, gear: u8) -> Option<&GearZones> {
        MotorCtrlParams::gear_index(gear).map(|i| &self.0[i])
    }
}
