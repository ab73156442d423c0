//! Continuous box spaces declaring the shape of actions and observations.

use anyhow::{Result, bail};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// An axis-aligned box in `dim()` dimensions, closed on both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSpace {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl BoxSpace {
    /// Create a box from per-component bounds.
    ///
    /// # Errors
    /// Returns an error if the bounds differ in length, are empty,
    /// are not finite, or if any lower bound exceeds its upper bound.
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Result<Self> {
        if low.len() != high.len() {
            bail!(
                "bounds must have equal lengths, but have {} and {}",
                low.len(),
                high.len()
            );
        }
        if low.is_empty() {
            bail!("box must have at least one dimension");
        }
        for (i_dim, (&lo, &hi)) in low.iter().zip(&high).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                bail!("bounds of dimension {i_dim} must be finite");
            }
            if lo > hi {
                bail!("lower bound {lo} of dimension {i_dim} exceeds upper bound {hi}");
            }
        }
        Ok(Self { low, high })
    }

    /// Create a box from bounds known to be valid.
    pub(crate) fn from_bounds(low: Vec<f64>, high: Vec<f64>) -> Self {
        debug_assert_eq!(low.len(), high.len());
        Self { low, high }
    }

    /// Create a box with the same bounds in every dimension.
    pub fn uniform(low: f64, high: f64, dim: usize) -> Result<Self> {
        Self::new(vec![low; dim], vec![high; dim])
    }

    pub fn dim(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Whether `point` has the right dimension and lies inside the box.
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dim()
            && point
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(&val, (&lo, &hi))| (lo..=hi).contains(&val))
    }

    /// Clamp every component of `point` to the box bounds.
    pub fn clip(&self, point: &[f64]) -> Vec<f64> {
        point
            .iter()
            .zip(self.low.iter().zip(&self.high))
            .map(|(&val, (&lo, &hi))| val.clamp(lo, hi))
            .collect()
    }

    /// Draw a point uniformly from the box.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f64>> {
        let mut point = Vec::with_capacity(self.dim());
        for (&lo, &hi) in self.low.iter().zip(&self.high) {
            let dist = Uniform::new_inclusive(lo, hi)?;
            point.push(dist.sample(rng));
        }
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn rejects_bad_bounds() {
        assert!(BoxSpace::new(vec![0.0], vec![1.0, 2.0]).is_err());
        assert!(BoxSpace::new(vec![], vec![]).is_err());
        assert!(BoxSpace::new(vec![2.0], vec![1.0]).is_err());
        assert!(BoxSpace::new(vec![f64::NEG_INFINITY], vec![1.0]).is_err());
    }

    #[test]
    fn contains_checks_dimension_and_bounds() {
        let space = BoxSpace::uniform(-25.0, 25.0, 2).unwrap();
        assert!(space.contains(&[-25.0, 25.0]));
        assert!(space.contains(&[0.0, 0.0]));
        assert!(!space.contains(&[0.0]));
        assert!(!space.contains(&[0.0, 0.0, 0.0]));
        assert!(!space.contains(&[25.1, 0.0]));
        assert!(!space.contains(&[f64::NAN, 0.0]));
    }

    #[test]
    fn clip_clamps_each_component() {
        let space = BoxSpace::uniform(0.0, 500.0, 1).unwrap();
        assert_eq!(space.clip(&[-3.0]), vec![0.0]);
        assert_eq!(space.clip(&[612.0]), vec![500.0]);
        assert_eq!(space.clip(&[99.5]), vec![99.5]);
    }

    #[test]
    fn samples_stay_inside() {
        let space = BoxSpace::new(vec![-25.0, 0.0], vec![25.0, 1.0]).unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let point = space.sample(&mut rng).unwrap();
            assert!(space.contains(&point), "{point:?}");
        }
    }
}
