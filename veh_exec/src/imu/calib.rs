//! # Offset calibration
//!
//! The manual calibration pass averages samples taken while the vehicle is stationary and level.
//! Whatever remains after removing gravity from the vertical axis is treated as bias.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::fusion::GRAVITY;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Additive corrections subtracted from every converted sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationOffsets {
    /// Units: m/s^2
    pub accel: [f64; 3],

    /// Units: degrees/second
    pub gyro: [f64; 3],

    /// Number of samples the offsets were averaged over.
    pub num_samples: usize,
}

/// Running sums for the averaging pass.
#[derive(Debug, Default)]
pub struct CalibrationAccumulator {
    accel_sum: [f64; 3],
    gyro_sum: [f64; 3],
    count: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CalibrationOffsets {
    /// Apply the offsets to a converted sample.
    pub fn apply(&self, accel: [f64; 3], gyro: [f64; 3]) -> ([f64; 3], [f64; 3]) {
        let mut a = accel;
        let mut g = gyro;

        for i in 0..3 {
            a[i] -= self.accel[i];
            g[i] -= self.gyro[i];
        }

        (a, g)
    }
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one uncorrected sample.
    pub fn add(&mut self, accel: [f64; 3], gyro: [f64; 3]) {
        self.accel_sum[0] += accel[0];
        self.accel_sum[1] += accel[1];
        self.accel_sum[2] += accel[2] - GRAVITY;

        for i in 0..3 {
            self.gyro_sum[i] += gyro[i];
        }

        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Average the samples into offsets, or `None` if no samples were added.
    pub fn finish(&self) -> Option<CalibrationOffsets> {
        if self.count == 0 {
            return None;
        }

        let n = self.count as f64;
        let mut offsets = CalibrationOffsets {
            num_samples: self.count,
            ..Default::default()
        };

        for i in 0..3 {
            offsets.accel[i] = self.accel_sum[i] / n;
            offsets.gyro[i] = self.gyro_sum[i] / n;
        }

        Some(offsets)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_pass_gives_none() {
        assert_eq!(CalibrationAccumulator::new().finish(), None);
    }

    #[test]
    fn test_average_removes_gravity() {
        let mut acc = CalibrationAccumulator::new();
        acc.add([0.1, -0.2, GRAVITY + 0.3], [1.0, 2.0, -0.5]);
        acc.add([0.3, -0.4, GRAVITY + 0.1], [3.0, 2.0, -1.5]);

        let off = acc.finish().unwrap();
        assert_eq!(off.num_samples, 2);
        assert!((off.accel[0] - 0.2).abs() < 1e-9);
        assert!((off.accel[1] + 0.3).abs() < 1e-9);
        assert!((off.accel[2] - 0.2).abs() < 1e-9);
        assert_eq!(off.gyro, [2.0, 2.0, -1.0]);

        // A stationary sample corrects to rest
        let (a, g) = off.apply([0.2, -0.3, GRAVITY + 0.2], [2.0, 2.0, -1.0]);
        assert!(a[0].abs() < 1e-9 && a[1].abs() < 1e-9);
        assert!((a[2] - GRAVITY).abs() < 1e-9);
        assert_eq!(g, [0.0; 3]);
    }
}
