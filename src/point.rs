use nalgebra::DMatrix;

/// One emitted draw: the parameter vector, its unit-cube preimage, the
/// log-likelihood, and the integration weights assigned at emission.
#[derive(Debug, Clone)]
pub struct Sample {
    pub theta: Box<[f64]>,
    pub unit: Box<[f64]>,
    pub logl: f64,
    /// Log prior mass still enclosed by the likelihood contour.
    pub logvol: f64,
    /// `logvol + logl`, the contribution to the evidence.
    pub logwt: f64,
}

/// The N live points, stored column-major in both spaces plus a parallel
/// log-likelihood vector. Column j is evicted and rewritten atomically
/// each iteration; no reallocation happens after construction.
#[derive(Debug)]
pub(crate) struct LivePoints {
    unit: DMatrix<f64>,
    prior: DMatrix<f64>,
    logl: Vec<f64>,
}

impl LivePoints {
    pub(crate) fn new(dim: usize, nlive: usize) -> Self {
        Self {
            unit: DMatrix::zeros(dim, nlive),
            prior: DMatrix::zeros(dim, nlive),
            logl: vec![f64::NEG_INFINITY; nlive],
        }
    }

    pub(crate) fn nlive(&self) -> usize {
        self.logl.len()
    }

    pub(crate) fn dim(&self) -> usize {
        self.unit.nrows()
    }

    pub(crate) fn set(&mut self, j: usize, unit: &[f64], theta: &[f64], logl: f64) {
        for (dst, src) in self.unit.column_mut(j).iter_mut().zip(unit) {
            *dst = *src;
        }
        for (dst, src) in self.prior.column_mut(j).iter_mut().zip(theta) {
            *dst = *src;
        }
        self.logl[j] = logl;
    }

    /// Index and log-likelihood of the worst live point.
    pub(crate) fn worst(&self) -> (usize, f64) {
        let mut idx = 0;
        let mut min = self.logl[0];
        for (j, &logl) in self.logl.iter().enumerate().skip(1) {
            if logl < min {
                idx = j;
                min = logl;
            }
        }
        (idx, min)
    }

    pub(crate) fn max_logl(&self) -> f64 {
        self.logl.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub(crate) fn logl(&self, j: usize) -> f64 {
        self.logl[j]
    }

    pub(crate) fn unit_point(&self, j: usize) -> Vec<f64> {
        self.unit.column(j).iter().copied().collect()
    }

    pub(crate) fn prior_point(&self, j: usize) -> Vec<f64> {
        self.prior.column(j).iter().copied().collect()
    }

    /// The unit-space matrix the bounds are fitted to.
    pub(crate) fn unit_matrix(&self) -> &DMatrix<f64> {
        &self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_tracks_replacement() {
        let mut live = LivePoints::new(2, 3);
        live.set(0, &[0.1, 0.2], &[1., 2.], -3.);
        live.set(1, &[0.3, 0.4], &[3., 4.], -1.);
        live.set(2, &[0.5, 0.6], &[5., 6.], -2.);

        assert_eq!(live.worst(), (0, -3.));
        live.set(0, &[0.7, 0.8], &[7., 8.], -0.5);
        assert_eq!(live.worst(), (2, -2.));
        assert_eq!(live.max_logl(), -0.5);
        assert_eq!(live.unit_point(0), vec![0.7, 0.8]);
        assert_eq!(live.prior_point(0), vec![7., 8.]);
    }
}
