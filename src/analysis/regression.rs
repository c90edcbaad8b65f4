use serde::{Deserialize, Serialize};

use crate::errors::BoxboxError;

/// Ordinary least-squares line `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination, 1 for a perfect fit. A flat series that
    /// is fitted exactly also reports 1.
    pub r_squared: f64,
    pub samples: usize,
}

impl LinearFit {
    /// Fit a line through paired samples.
    ///
    /// Needs at least two samples with distinct x values.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, BoxboxError> {
        let n = xs.len().min(ys.len());
        if n < 2 {
            return Err(BoxboxError::insufficient(format!(
                "a linear fit needs at least 2 samples, got {}",
                n
            )));
        }
        let (xs, ys) = (&xs[..n], &ys[..n]);
        let mean_x = xs.iter().sum::<f64>() / n as f64;
        let mean_y = ys.iter().sum::<f64>() / n as f64;

        let mut sxx = 0.;
        let mut sxy = 0.;
        for (x, y) in xs.iter().zip(ys) {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }
        if sxx <= f64::EPSILON {
            return Err(BoxboxError::insufficient(
                "a linear fit needs at least 2 distinct x values",
            ));
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let mut ss_res = 0.;
        let mut ss_tot = 0.;
        for (x, y) in xs.iter().zip(ys) {
            let predicted = intercept + slope * x;
            ss_res += (y - predicted) * (y - predicted);
            ss_tot += (y - mean_y) * (y - mean_y);
        }
        let r_squared = if ss_tot <= f64::EPSILON {
            1.
        } else {
            1. - ss_res / ss_tot
        };

        Ok(Self {
            slope,
            intercept,
            r_squared,
            samples: n,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (n - 1 denominator)
pub(crate) fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let fit = LinearFit::fit(&[0., 1., 2., 3.], &[90., 90.1, 90.2, 90.3]).unwrap();
        assert!((fit.slope - 0.1).abs() < 1e-9);
        assert!((fit.intercept - 90.).abs() < 1e-9);
        assert!((fit.r_squared - 1.).abs() < 1e-9);
        assert!((fit.predict(10.) - 91.).abs() < 1e-9);
    }

    #[test]
    fn test_noisy_line_quality() {
        let fit = LinearFit::fit(&[0., 1., 2., 3., 4.], &[1., 3., 2., 5., 4.]).unwrap();
        assert!((fit.slope - 0.8).abs() < 1e-9);
        assert!(fit.r_squared > 0. && fit.r_squared < 1.);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(matches!(
            LinearFit::fit(&[1.], &[2.]),
            Err(BoxboxError::InsufficientData { .. })
        ));
        assert!(LinearFit::fit(&[2., 2.], &[1., 3.]).is_err());
    }

    #[test]
    fn test_summary_statistics() {
        assert_eq!(median(&[3., 1., 2.]), Some(2.));
        assert_eq!(median(&[4., 1., 2., 3.]), Some(2.5));
        assert_eq!(mean(&[]), None);
        let sd = std_dev(&[2., 4., 4., 4., 5., 5., 7., 9.]).unwrap();
        assert!((sd - 2.138089935).abs() < 1e-6);
    }
}
