//! Compactly supported radial weighting kernels.
//!
//! The engine only ever consumes `sqrt(w)`, never `w` itself (the
//! assembly stage builds `sqrt(W) * P` and `sqrt(W) * I`), so
//! [`WeightingKernel::weight`] and [`WeightingKernel::sqrt_weight`] are
//! both provided; callers in the hot assembly loop should prefer the
//! latter to avoid a redundant `sqrt`.

/// A choice of radial weight function `W(r)` for `r = ||x_nbr - x_t|| /
/// epsilon`. The exact kernel is a configuration knob; the single variant
/// here is this crate's default, a Wendland-type C^2 cubic bump satisfying
/// `W(0)=1`, `W(1)=0`, monotone decreasing, and compactly supported on
/// `[0,1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WeightingKernel {
    #[default]
    WendlandC2,
}

impl WeightingKernel {
    /// `W(r)`, zero for `r >= 1` (strictly so: support radius alone
    /// controls locality).
    pub fn weight(self, r: f64) -> f64 {
        if r >= 1.0 {
            return 0.0;
        }
        let r = r.max(0.0);
        match self {
            WeightingKernel::WendlandC2 => {
                let base = 1.0 - r;
                base.powi(4) * (4.0 * r + 1.0)
            }
        }
    }

    pub fn sqrt_weight(self, r: f64) -> f64 {
        self.weight(r).sqrt()
    }
}

/// `w(i) = W(||x_nbr(i) - x_t|| / epsilon(t))` for every neighbor, given
/// precomputed relative distances.
pub fn weights_for_distances(kernel: WeightingKernel, distances: &[f64], epsilon: f64) -> Vec<f64> {
    distances
        .iter()
        .map(|&dist| kernel.weight(dist / epsilon))
        .collect()
}

pub fn sqrt_weights_for_distances(
    kernel: WeightingKernel,
    distances: &[f64],
    epsilon: f64,
) -> Vec<f64> {
    distances
        .iter()
        .map(|&dist| kernel.sqrt_weight(dist / epsilon))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        let k = WeightingKernel::WendlandC2;
        assert!((k.weight(0.0) - 1.0).abs() < 1e-14);
        assert_eq!(k.weight(1.0), 0.0);
        assert_eq!(k.weight(1.5), 0.0);
    }

    #[test]
    fn monotone_decreasing() {
        let k = WeightingKernel::WendlandC2;
        let mut prev = k.weight(0.0);
        for i in 1..=20 {
            let r = i as f64 / 20.0;
            let cur = k.weight(r);
            assert!(cur <= prev + 1e-15, "weight increased at r={r}");
            prev = cur;
        }
    }

    #[test]
    fn sqrt_weight_matches_weight() {
        let k = WeightingKernel::WendlandC2;
        for &r in &[0.0, 0.25, 0.5, 0.75] {
            assert!((k.sqrt_weight(r).powi(2) - k.weight(r)).abs() < 1e-14);
        }
    }
}
