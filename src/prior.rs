use statrs::distribution::ContinuousCDF;

use crate::{NestError, Result};

/// A univariate prior distribution, supplied as a trait object so models
/// can mix distribution families freely.
pub type Prior = Box<dyn ContinuousCDF<f64, f64> + Send + Sync>;

/// Componentwise inverse-CDF map from the unit hypercube to prior space.
///
/// All geometry (bounds, proposals) lives in the unit cube; this is the
/// only place where unit points become parameter vectors.
pub struct PriorTransform {
    priors: Vec<Prior>,
}

impl std::fmt::Debug for PriorTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorTransform")
            .field("priors", &format_args!("[{} priors]", self.priors.len()))
            .finish()
    }
}

impl PriorTransform {
    pub fn new(priors: Vec<Prior>) -> Result<Self> {
        if priors.is_empty() {
            return Err(NestError::Config("at least one prior is required".into()));
        }
        Ok(Self { priors })
    }

    pub fn dim(&self) -> usize {
        self.priors.len()
    }

    /// Map a unit point to prior space, writing into `out`.
    pub(crate) fn transform(&self, unit: &[f64], out: &mut [f64]) {
        for ((u, prior), theta) in unit.iter().zip(&self.priors).zip(out.iter_mut()) {
            *theta = prior.inverse_cdf(*u);
        }
    }

    pub(crate) fn transform_vec(&self, unit: &[f64]) -> Vec<f64> {
        let mut out = vec![0.; unit.len()];
        self.transform(unit, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::{Normal, Uniform};

    #[test]
    fn uniform_prior_is_affine() {
        let transform = PriorTransform::new(vec![
            Box::new(Uniform::new(-5., 5.).unwrap()),
            Box::new(Uniform::new(0., 2.).unwrap()),
        ])
        .unwrap();
        let theta = transform.transform_vec(&[0.5, 0.25]);
        assert!((theta[0] - 0.).abs() < 1e-12);
        assert!((theta[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn normal_prior_round_trips() {
        let normal = Normal::new(1., 2.).unwrap();
        let transform = PriorTransform::new(vec![Box::new(normal)]).unwrap();
        let theta = transform.transform_vec(&[0.5]);
        assert!((theta[0] - 1.).abs() < 1e-6);
        let u = normal.cdf(theta[0]);
        assert!((u - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_priors_rejected() {
        assert!(PriorTransform::new(vec![]).is_err());
    }
}
