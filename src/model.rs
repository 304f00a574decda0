//! Grade-adjustment model: pace factor as a quartic function of gradient.
//!
//! The model is fitted once from a reference dataset of
//! `(gradient %, pace-adjustment factor)` pairs and is immutable afterwards.
//! It is an ordinary value: callers own it, pass it by reference to the
//! binner and projector, and may hold several at once (one per runner
//! profile, for example).
//!
//! ## Example
//! ```rust
//! use trail_analytics::GradeAdjustmentModel;
//!
//! let gradients = [-10.0, -5.0, 0.0, 5.0, 10.0];
//! let factors = [1.5, 1.1, 1.0, 1.2, 1.6];
//! let model = GradeAdjustmentModel::fit(&gradients, &factors).unwrap();
//!
//! assert!((model.evaluate(0.0) - 1.0).abs() < 1e-9);
//! assert!(model.evaluate(10.0) > model.evaluate(5.0));
//! ```

use std::fmt;

use log::{info, warn};
use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TrailError};

/// Gradients are clamped to `±GRADIENT_CLAMP_PERCENT` before evaluation.
pub const GRADIENT_CLAMP_PERCENT: f64 = 35.0;

/// Minimum number of paired samples needed to fit a quartic.
pub const MIN_REFERENCE_SAMPLES: usize = 5;

const DEGREE: usize = 4;
const TERMS: usize = DEGREE + 1;

/// Quartic pace-adjustment polynomial `a·g⁴ + b·g³ + c·g² + d·g + e`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradeAdjustmentModel {
    /// Coefficients `[a, b, c, d, e]`, highest power first
    pub coefficients: [f64; TERMS],
}

impl GradeAdjustmentModel {
    /// Wrap coefficients that were fitted elsewhere. No normalisation is applied.
    pub fn from_coefficients(coefficients: [f64; TERMS]) -> Self {
        Self { coefficients }
    }

    /// Least-squares quartic fit of `factors` against `gradients`, normalised
    /// so the constant term is 1.
    ///
    /// Rows where either value is non-finite are dropped. Fails with
    /// [`TrailError::InsufficientData`] when the columns differ in length,
    /// fewer than five pairs remain or the fitted constant is zero, and with
    /// [`TrailError::DegenerateModel`] when the system is singular.
    pub fn fit(gradients: &[f64], factors: &[f64]) -> Result<Self> {
        if gradients.len() != factors.len() {
            return Err(TrailError::InsufficientData {
                available: gradients.len().min(factors.len()),
                minimum_required: MIN_REFERENCE_SAMPLES,
                message: format!(
                    "gradient and factor columns differ in length ({} vs {})",
                    gradients.len(),
                    factors.len()
                ),
            });
        }

        let pairs: Vec<(f64, f64)> = gradients
            .iter()
            .zip(factors)
            .filter(|(g, f)| g.is_finite() && f.is_finite())
            .map(|(&g, &f)| (g, f))
            .collect();

        if pairs.len() < MIN_REFERENCE_SAMPLES {
            warn!(
                "[Model] Only {} usable reference samples, need {}",
                pairs.len(),
                MIN_REFERENCE_SAMPLES
            );
            return Err(TrailError::InsufficientData {
                available: pairs.len(),
                minimum_required: MIN_REFERENCE_SAMPLES,
                message: "not enough numeric reference pairs".to_string(),
            });
        }

        let raw = least_squares_quartic(&pairs)?;
        if raw[DEGREE] == 0.0 {
            // Flat baseline is undetermined; more reference rows are needed
            return Err(TrailError::InsufficientData {
                available: pairs.len(),
                minimum_required: MIN_REFERENCE_SAMPLES,
                message: "fitted constant term is zero, cannot normalise".to_string(),
            });
        }
        let model = Self::from_coefficients(raw).normalized()?;

        info!(
            "[Model] Fitted quartic from {} samples: {}",
            pairs.len(),
            model
        );
        Ok(model)
    }

    /// Divide every coefficient by the constant term.
    ///
    /// Idempotent: a normalised model has `e == 1` and is returned unchanged.
    pub fn normalized(&self) -> Result<Self> {
        let e = self.coefficients[DEGREE];
        if e == 0.0 || !e.is_finite() {
            return Err(TrailError::DegenerateModel {
                message: format!("constant term is {}, cannot normalise", e),
            });
        }
        let mut coefficients = self.coefficients;
        for c in coefficients.iter_mut() {
            *c /= e;
        }
        Ok(Self { coefficients })
    }

    /// Pace-adjustment factor at `gradient_percent`, clamped to ±35%.
    pub fn evaluate(&self, gradient_percent: f64) -> f64 {
        let g = gradient_percent.clamp(-GRADIENT_CLAMP_PERCENT, GRADIENT_CLAMP_PERCENT);
        self.coefficients.iter().fold(0.0, |acc, &c| acc * g + c)
    }
}

/// Evaluate an optional model; no model means flat-equivalent (factor 1).
pub fn adjustment_factor(model: Option<&GradeAdjustmentModel>, gradient_percent: f64) -> f64 {
    model.map_or(1.0, |m| m.evaluate(gradient_percent))
}

impl fmt::Display for GradeAdjustmentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DECIMALS: usize = 10;
        let [a, b, c, d, e] = self.coefficients;

        let term = |value: f64, power: &str| -> String {
            if value.abs() < 0.000001 {
                format!("{:.6e}x{}", value, power)
            } else {
                let fixed = format!("{:.*}", DECIMALS, value);
                let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
                format!("{}x{}", trimmed, power)
            }
        };
        let signed = |value: f64, power: &str| -> String {
            if value >= 0.0 {
                format!(" + {}", term(value, power))
            } else {
                format!(" - {}", term(value.abs(), power))
            }
        };

        write!(f, "{}", term(a, "⁴"))?;
        write!(f, "{}", signed(b, "³"))?;
        write!(f, "{}", signed(c, "²"))?;
        write!(f, "{}", signed(d, ""))?;
        if e >= 0.0 {
            write!(f, " + {:.*}", DECIMALS, e)
        } else {
            write!(f, " - {:.*}", DECIMALS, e.abs())
        }
    }
}

/// Singular values below this fraction of the largest count as zero.
const RANK_TOLERANCE: f64 = 1e-12;

/// Solve the normal equations `(XᵀX)·c = Xᵀy` for the quartic coefficients.
///
/// Gradients are scaled to `[-1, 1]` before building the system so the
/// matrix stays well conditioned, then coefficients are scaled back.
fn least_squares_quartic(pairs: &[(f64, f64)]) -> Result<[f64; TERMS]> {
    let scale = pairs
        .iter()
        .map(|(g, _)| g.abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let mut xtx = SMatrix::<f64, TERMS, TERMS>::zeros();
    let mut xty = SVector::<f64, TERMS>::zeros();

    for &(g, y) in pairs {
        let s = g / scale;
        // Design row [s⁴, s³, s², s, 1]
        let row = SVector::<f64, TERMS>::from([s.powi(4), s.powi(3), s.powi(2), s, 1.0]);
        xtx += row * row.transpose();
        xty += row * y;
    }

    let scaled = solve_normal_equations(xtx, xty)
        .ok_or_degenerate("normal equations are singular (too few distinct gradients)")?;

    let mut coefficients = [0.0; TERMS];
    for (i, c) in scaled.iter().enumerate() {
        let power = (DEGREE - i) as i32;
        coefficients[i] = c / scale.powi(power);
    }
    Ok(coefficients)
}

/// SVD solve. Returns `None` when the system is rank deficient.
fn solve_normal_equations(
    xtx: SMatrix<f64, TERMS, TERMS>,
    xty: SVector<f64, TERMS>,
) -> Option<SVector<f64, TERMS>> {
    let svd = xtx.svd(true, true);
    let tolerance = svd.singular_values.max() * RANK_TOLERANCE;
    if tolerance <= 0.0 || svd.rank(tolerance) < TERMS {
        return None;
    }
    svd.solve(&xty, tolerance)
        .ok()
        .filter(|x| x.iter().all(|v| v.is_finite()))
}

/// Numeric `(gradient, factor)` pairs taken from an already-parsed
/// delimited source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDataset {
    pub gradients: Vec<f64>,
    pub factors: Vec<f64>,
}

impl ReferenceDataset {
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self {
            gradients: pairs.iter().map(|(g, _)| *g).collect(),
            factors: pairs.iter().map(|(_, f)| *f).collect(),
        }
    }

    /// Build a dataset from split rows.
    ///
    /// The first row is skipped when `has_header` is set. Rows with fewer
    /// than two cells, or whose first two cells are not both numeric, are
    /// dropped.
    pub fn from_rows<S: AsRef<str>>(rows: &[Vec<S>], has_header: bool) -> Self {
        let skip = usize::from(has_header);
        let pairs: Vec<(f64, f64)> = rows
            .iter()
            .skip(skip)
            .filter(|row| row.len() >= 2)
            .filter_map(|row| {
                let g = row[0].as_ref().trim().parse::<f64>().ok()?;
                let f = row[1].as_ref().trim().parse::<f64>().ok()?;
                (g.is_finite() && f.is_finite()).then_some((g, f))
            })
            .collect();
        Self::from_pairs(&pairs)
    }

    pub fn len(&self) -> usize {
        self.gradients.len().min(self.factors.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fit a normalised grade-adjustment model to this dataset.
    pub fn fit(&self) -> Result<GradeAdjustmentModel> {
        GradeAdjustmentModel::fit(&self.gradients, &self.factors)
    }
}
