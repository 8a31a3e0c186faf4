use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::math::ln_unit_ball_volume;
use crate::{NestError, Result};

/// A d-dimensional bounding ellipsoid { x : (x - c)' A^-1 (x - c) <= 1 }.
///
/// The shape matrix, its Cholesky factor, its inverse and the log volume
/// are kept together so sampling and containment tests never refactor.
#[derive(Debug, Clone)]
pub struct Ellipsoid {
    center: DVector<f64>,
    shape: DMatrix<f64>,
    chol: DMatrix<f64>,
    inv: DMatrix<f64>,
    ln_vol: f64,
}

impl Ellipsoid {
    fn from_shape(center: DVector<f64>, shape: DMatrix<f64>) -> Option<Self> {
        let dim = shape.nrows();
        let chol = Cholesky::new(shape.clone())?;
        let inv = chol.inverse();
        let lower = chol.unpack();
        let ln_vol =
            ln_unit_ball_volume(dim) + lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();
        if !ln_vol.is_finite() {
            return None;
        }
        Some(Self {
            center,
            shape,
            chol: lower,
            inv,
            ln_vol,
        })
    }

    /// Fit the smallest covariance-shaped ellipsoid containing `points`
    /// (columns), then floor its volume at `n * pointvol`.
    ///
    /// A rank-deficient sample covariance is regularized by adding
    /// escalating multiples of the identity before giving up.
    pub(crate) fn fit(points: &DMatrix<f64>, pointvol: f64) -> Result<Self> {
        let dim = points.nrows();
        let npoints = points.ncols();
        if npoints < 2 {
            return Err(NestError::DegenerateBound);
        }

        let mut center = DVector::zeros(dim);
        for col in points.column_iter() {
            center += col;
        }
        center /= npoints as f64;

        let mut cov = DMatrix::zeros(dim, dim);
        for col in points.column_iter() {
            let delta = col.clone_owned() - &center;
            cov.ger(1., &delta, &delta, 1.);
        }
        cov /= (npoints - 1) as f64;

        let diag_scale = cov.diagonal().amax().max(f64::MIN_POSITIVE);
        let mut shape = cov;
        let mut eps = 1e-10;
        let inv = loop {
            match Cholesky::new(shape.clone()) {
                Some(chol) => break chol.inverse(),
                None => {
                    if eps > 1e-4 {
                        return Err(NestError::DegenerateBound);
                    }
                    for i in 0..dim {
                        shape[(i, i)] += eps * diag_scale;
                    }
                    eps *= 100.;
                }
            }
        };

        let mut fmax: f64 = 0.;
        for col in points.column_iter() {
            let delta = col.clone_owned() - &center;
            fmax = fmax.max((&inv * &delta).dot(&delta));
        }
        if fmax > 0. {
            // tiny slack so the extremal point passes `contains` despite
            // rounding in the refactorization
            shape *= fmax * (1. + 1e-10);
        }

        let mut ell = Self::from_shape(center, shape).ok_or(NestError::DegenerateBound)?;

        let ln_target = (npoints as f64 * pointvol).ln();
        if ln_target.is_finite() && ell.ln_vol < ln_target {
            ell.enlarge((ln_target - ell.ln_vol).exp());
        }
        Ok(ell)
    }

    /// Scale the volume by `factor`, keeping shape and orientation.
    pub(crate) fn enlarge(&mut self, factor: f64) {
        let dim = self.dim() as f64;
        self.shape *= factor.powf(2. / dim);
        self.chol *= factor.powf(1. / dim);
        self.inv *= factor.powf(-2. / dim);
        self.ln_vol += factor.ln();
    }

    /// Draw uniformly: a unit-ball point pushed through the Cholesky
    /// factor and recentered.
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        let dim = self.dim();
        let mut z = DVector::from_fn(dim, |_, _| rng.sample::<f64, _>(StandardNormal));
        let norm = z.norm();
        if norm > 0. {
            let radius = rng.gen::<f64>().powf(1. / dim as f64);
            z *= radius / norm;
        }
        &self.center + &self.chol * z
    }

    pub(crate) fn contains(&self, x: &[f64]) -> bool {
        self.mahalanobis_sq(x) <= 1.
    }

    pub(crate) fn mahalanobis_sq(&self, x: &[f64]) -> f64 {
        let delta = DVector::from_fn(self.dim(), |i, _| x[i] - self.center[i]);
        (&self.inv * &delta).dot(&delta)
    }

    pub(crate) fn dim(&self) -> usize {
        self.center.len()
    }

    pub(crate) fn ln_volume(&self) -> f64 {
        self.ln_vol
    }

    pub(crate) fn volume(&self) -> f64 {
        self.ln_vol.exp()
    }

    /// Principal-axis frame (the Cholesky factor); column k spans the
    /// k-th axis with its length.
    pub(crate) fn axes(&self) -> &DMatrix<f64> {
        &self.chol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gaussian_cloud(rng: &mut StdRng, dim: usize, npoints: usize) -> DMatrix<f64> {
        DMatrix::from_fn(dim, npoints, |_, _| rng.sample::<f64, _>(StandardNormal))
    }

    #[test]
    fn fit_contains_every_point() {
        let mut rng = StdRng::seed_from_u64(3);
        let points = gaussian_cloud(&mut rng, 3, 40);
        let ell = Ellipsoid::fit(&points, 0.).unwrap();
        for col in points.column_iter() {
            let x: Vec<f64> = col.iter().copied().collect();
            assert!(ell.contains(&x));
        }
    }

    #[test]
    fn samples_from_enlarged_fit_are_contained() {
        let mut rng = StdRng::seed_from_u64(4);
        let points = gaussian_cloud(&mut rng, 2, 30);
        let mut ell = Ellipsoid::fit(&points, 0.).unwrap();
        ell.enlarge(1.25);
        for _ in 0..200 {
            let x = ell.sample(&mut rng);
            let x: Vec<f64> = x.iter().copied().collect();
            assert!(ell.contains(&x));
        }
    }

    #[test]
    fn refit_of_own_samples_recovers_volume() {
        let mut rng = StdRng::seed_from_u64(5);
        let shape = DMatrix::from_row_slice(2, 2, &[2., 0.5, 0.5, 1.]);
        let original = Ellipsoid::from_shape(DVector::from_element(2, 0.3), shape).unwrap();

        let samples = DMatrix::from_columns(
            &(0..1000)
                .map(|_| original.sample(&mut rng))
                .collect::<Vec<_>>(),
        );
        let refit = Ellipsoid::fit(&samples, 0.).unwrap();
        let ratio = (refit.ln_volume() - original.ln_volume()).exp();
        assert!(ratio > 0.5 && ratio < 2., "volume ratio {ratio}");
    }

    #[test]
    fn volume_floor_applies() {
        let mut rng = StdRng::seed_from_u64(6);
        let points = gaussian_cloud(&mut rng, 2, 10) * 1e-3;
        let pointvol = 0.01;
        let ell = Ellipsoid::fit(&points, pointvol).unwrap();
        let target = 10. * pointvol;
        assert!(ell.volume() >= target * (1. - 1e-9));
    }

    #[test]
    fn coincident_points_are_regularized() {
        let points = DMatrix::from_fn(3, 8, |i, _| i as f64);
        let ell = Ellipsoid::fit(&points, 0.).unwrap();
        assert!(ell.ln_volume().is_finite());
        assert!(ell.contains(&[0., 1., 2.]));
    }

    #[test]
    fn enlarge_scales_volume() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = gaussian_cloud(&mut rng, 2, 20);
        let mut ell = Ellipsoid::fit(&points, 0.).unwrap();
        let before = ell.ln_volume();
        ell.enlarge(1.25);
        assert!((ell.ln_volume() - before - 1.25f64.ln()).abs() < 1e-12);
    }
}
