/// Magnitude filter - converts raw per-bin spectrum data into display heights
/// Owns the nonlinear noise-suppression curve that keeps quiet passages calm
/// without squashing loud ones

use serde::{Deserialize, Serialize};

/// How many pixels of bar height one filtered dB is worth
pub const HEIGHT_PER_DB: f32 = 16.0;

/// Tunable presentation curve for noise suppression
///
/// The curve is `min(x^exponent / cutoff, x) + 2` where `x = max(db - 2, 0)`.
/// Below the crossover the power-law branch wins and quiet signals are
/// squashed toward the floor; above it the linear branch passes the signal
/// through untouched.
///
/// `cutoff` sets where suppression stops: the higher the number, the more
/// of the quiet range gets filtered. `exponent` sets how hard quiet values
/// are turned down - note it also moves the crossover significantly, so
/// tune the pair together (a function graph calculator helps).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterCurve {
    /// Divisor of the power-law branch (default 560)
    pub cutoff: f32,

    /// Exponent of the power-law branch (default 2.86)
    pub exponent: f32,
}

impl Default for FilterCurve {
    fn default() -> Self {
        Self {
            cutoff: 560.0,
            exponent: 2.86,
        }
    }
}

impl FilterCurve {
    /// Squared magnitude of one complex bin
    ///
    /// The capture hands us signed bytes, so the largest magnitude is
    /// 128*128 + 128*128 - comfortably inside f32.
    pub fn magnitude(re: i8, im: i8) -> f32 {
        let re = re as i32;
        let im = im as i32;
        (re * re + im * im) as f32
    }

    /// Integer-truncated dB value for a squared magnitude
    ///
    /// Zero magnitude maps to 0 dB rather than -inf, the floor the rest of
    /// the curve expects.
    pub fn db_value(magnitude: f32) -> i32 {
        if magnitude > 0.0 {
            (10.0 * magnitude.log10()) as i32
        } else {
            0
        }
    }

    /// Apply the noise-suppression curve to a dB value
    ///
    /// Output is always >= 2 and non-decreasing in `db`.
    pub fn filtered(&self, db: i32) -> f32 {
        let x = (db as f32 - 2.0).max(0.0);
        ((1.0 / self.cutoff) * x.powf(self.exponent)).min(x) + 2.0
    }

    /// Full pipeline for one bin: complex pair in, bar height delta out
    pub fn bar_delta(&self, re: i8, im: i8) -> f32 {
        let db = Self::db_value(Self::magnitude(re, im));
        self.filtered(db) * HEIGHT_PER_DB
    }
}

// ========== Tests ============
