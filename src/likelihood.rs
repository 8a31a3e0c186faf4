use crate::{NestError, Result};

/// Errors that happen when we evaluate the user's log-likelihood function.
pub trait LoglikeError: std::error::Error + Send + Sync + 'static {
    /// Unrecoverable errors abort the run, recoverable errors are treated
    /// as a log-likelihood of negative infinity and the point is rejected.
    fn is_recoverable(&self) -> bool;
}

/// The model contract consumed by the sampler.
///
/// Implementors provide the dimensionality of the parameter space and the
/// log-likelihood at a parameter vector of that length. The function must
/// be pure in its inputs; it may return negative infinity for points
/// outside the support, which the proposal layer rejects.
pub trait LogLikelihood {
    type Error: LoglikeError;

    /// The dimensionality of the parameter space.
    fn dim(&self) -> usize;

    /// The log-likelihood at `theta`, a slice of length [`dim`](Self::dim).
    fn loglike(&mut self, theta: &[f64]) -> std::result::Result<f64, Self::Error>;
}

/// Evaluate the likelihood, mapping recoverable failures and NaN to
/// negative infinity so they flow through the rejection path.
pub(crate) fn evaluate<L: LogLikelihood>(like: &mut L, theta: &[f64]) -> Result<f64> {
    match like.loglike(theta) {
        Ok(logl) => {
            if logl.is_nan() {
                Ok(f64::NEG_INFINITY)
            } else {
                Ok(logl)
            }
        }
        Err(err) if err.is_recoverable() => Ok(f64::NEG_INFINITY),
        Err(err) => Err(NestError::LoglikeFailure(Box::new(err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("evaluation failed")]
    struct Failure {
        recoverable: bool,
    }

    impl LoglikeError for Failure {
        fn is_recoverable(&self) -> bool {
            self.recoverable
        }
    }

    struct Flaky {
        fail: Option<bool>,
    }

    impl LogLikelihood for Flaky {
        type Error = Failure;

        fn dim(&self) -> usize {
            1
        }

        fn loglike(&mut self, theta: &[f64]) -> std::result::Result<f64, Failure> {
            match self.fail {
                Some(recoverable) => Err(Failure { recoverable }),
                None => Ok(-theta[0] * theta[0]),
            }
        }
    }

    #[test]
    fn recoverable_failure_rejects() {
        let mut like = Flaky { fail: Some(true) };
        let logl = evaluate(&mut like, &[0.5]).unwrap();
        assert_eq!(logl, f64::NEG_INFINITY);
    }

    #[test]
    fn unrecoverable_failure_propagates() {
        let mut like = Flaky { fail: Some(false) };
        let err = evaluate(&mut like, &[0.5]).unwrap_err();
        assert!(matches!(err, NestError::LoglikeFailure(_)));
    }

    #[test]
    fn nan_is_rejected() {
        struct NanLike;
        impl LogLikelihood for NanLike {
            type Error = Failure;
            fn dim(&self) -> usize {
                1
            }
            fn loglike(&mut self, _theta: &[f64]) -> std::result::Result<f64, Failure> {
                Ok(f64::NAN)
            }
        }
        let logl = evaluate(&mut NanLike, &[0.5]).unwrap();
        assert_eq!(logl, f64::NEG_INFINITY);
    }
}
