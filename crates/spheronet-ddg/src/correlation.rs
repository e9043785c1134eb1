use crate::error::PipelineError;
use statrs::distribution::{ContinuousCDF, StudentsT};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub r: f64,
    /// Two-sided p-value of `r` under a Student t with `n - 2` degrees of freedom.
    pub p_value: f64,
    pub n: usize,
}

/// Pearson correlation of two equally long samples.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<Correlation, PipelineError> {
    if x.len() != y.len() {
        return Err(PipelineError::LengthMismatch {
            predicted: x.len(),
            observed: y.len(),
        });
    }
    let n = x.len();
    if n < 3 {
        return Err(PipelineError::TooFewPairs(n));
    }
    let mean = |v: &[f64]| v.iter().sum::<f64>() / n as f64;
    let (mx, my) = (mean(x), mean(y));

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 {
        return Err(PipelineError::ZeroVariance("prediction"));
    }
    if syy == 0.0 {
        return Err(PipelineError::ZeroVariance("observation"));
    }
    let r = (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0);

    let df = (n - 2) as f64;
    let p_value = if r.abs() >= 1.0 {
        0.0
    } else {
        let t = r * (df / (1.0 - r * r)).sqrt();
        match StudentsT::new(0.0, 1.0, df) {
            Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
            Err(_) => f64::NAN,
        }
    };
    Ok(Correlation { r, p_value, n })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_correlation() -> Result<(), PipelineError> {
        let c = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0])?;
        assert!((c.r - 1.0).abs() < 1e-12);
        assert!(c.p_value < 1e-6);
        assert_eq!(c.n, 4);
        let c = pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0])?;
        assert!((c.r + 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_known_value() -> Result<(), PipelineError> {
        // scipy.stats.pearsonr([1, 2, 3, 4, 5], [2, 1, 4, 3, 5]) = (0.8, 0.1040880...)
        let c = pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 1.0, 4.0, 3.0, 5.0])?;
        assert!((c.r - 0.8).abs() < 1e-12);
        assert!((c.p_value - 0.104088).abs() < 1e-4, "{}", c.p_value);
        Ok(())
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(matches!(
            pearson(&[1.0, 2.0], &[1.0, 2.0]),
            Err(PipelineError::TooFewPairs(2))
        ));
        assert!(matches!(
            pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(PipelineError::ZeroVariance("prediction"))
        ));
    }

    #[test]
    fn test_unequal_lengths() {
        assert!(matches!(
            pearson(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0]),
            Err(PipelineError::LengthMismatch {
                predicted: 4,
                observed: 3
            })
        ));
    }
}
