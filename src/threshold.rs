//! Branch value thresholds.
//!
//! A pass pares branches whose value is at or below a threshold derived from
//! the internal-branch values of the current tree. Policies only see the
//! sorted values, which keeps them pure: the same tree always gives the
//! same threshold.

/// Computes a pass threshold from internal-branch values sorted ascending.
///
/// Any `Fn(&[f64]) -> f64` is a policy, so callers can plug in their own rule.
pub trait ThresholdPolicy: Send + Sync {
    fn threshold(&self, sorted_values: &[f64]) -> f64;
}

impl<F> ThresholdPolicy for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn threshold(&self, sorted_values: &[f64]) -> f64 {
        self(sorted_values)
    }
}

/// The same threshold for every pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fixed(pub f64);

impl ThresholdPolicy for Fixed {
    fn threshold(&self, _sorted_values: &[f64]) -> f64 {
        self.0
    }
}

/// Nearest-rank quantile of the internal-branch values.
///
/// `Quantile(0.25)` picks the value below which a quarter of the branches
/// fall. With no internal branches the threshold is negative infinity and
/// nothing qualifies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantile(pub f64);

impl Default for Quantile {
    fn default() -> Self {
        Quantile(0.25)
    }
}

impl ThresholdPolicy for Quantile {
    fn threshold(&self, sorted_values: &[f64]) -> f64 {
        if sorted_values.is_empty() {
            return f64::NEG_INFINITY;
        }
        let q = self.0.clamp(0.0, 1.0);
        let rank = (q * sorted_values.len() as f64).ceil() as usize;
        sorted_values[rank.saturating_sub(1).min(sorted_values.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_nearest_rank() {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        assert_eq!(Quantile(0.25).threshold(&values), 0.2);
        assert_eq!(Quantile(0.5).threshold(&values), 0.4);
        assert_eq!(Quantile(1.0).threshold(&values), 0.8);
        assert_eq!(Quantile(0.0).threshold(&values), 0.1);
        assert_eq!(Quantile(0.25).threshold(&[0.9]), 0.9);
    }

    #[test]
    fn test_quantile_empty_admits_nothing() {
        let t = Quantile::default().threshold(&[]);
        assert!(t < 0.0);
    }

    #[test]
    fn test_fixed_and_closure_policies() {
        assert_eq!(Fixed(0.6).threshold(&[0.1, 2.0]), 0.6);
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len().max(1) as f64;
        assert_eq!(mean.threshold(&[1.0, 3.0]), 2.0);
    }

    #[test]
    fn test_policies_are_deterministic() {
        let values = [0.05, 0.5, 0.9, 1.2, 3.3];
        let policy = Quantile(0.4);
        let first = policy.threshold(&values);
        for _ in 0..10 {
            assert_eq!(policy.threshold(&values), first);
        }
    }
}
