use itertools::izip;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::bound::{Bound, BoundChoice};
use crate::evidence::EvidenceAccumulator;
use crate::likelihood::{evaluate, LogLikelihood};
use crate::math::logaddexp;
use crate::point::{LivePoints, Sample};
use crate::prior::PriorTransform;
use crate::proposal::{propose_uniform, Proposal, ProposalChoice};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum NestError {
    #[error("invalid sampler configuration: {0}")]
    Config(String),

    #[error("log-likelihood function returned error: {0}")]
    LoglikeFailure(Box<dyn std::error::Error + Send + Sync>),

    #[error("bound fit produced a singular covariance after regularization")]
    DegenerateBound,

    #[error(
        "uniform proposal exhausted its budget of {budget} likelihood calls \
         at iteration {iteration} (log L* = {logl_star})"
    )]
    StuckProposal {
        budget: u64,
        iteration: u64,
        logl_star: f64,
    },
}

pub type Result<T> = std::result::Result<T, NestError>;

/// Thresholds that delay the first bound fit. Until the run has spent
/// `min_ncall` likelihood calls and its efficiency has dropped below
/// `min_eff` percent, proposals are plain rejection draws from the unit
/// cube.
#[derive(Debug, Clone, Copy)]
pub struct FirstUpdate {
    pub min_ncall: u64,
    pub min_eff: f64,
}

impl Default for FirstUpdate {
    fn default() -> Self {
        Self {
            min_ncall: 1000,
            min_eff: 10.,
        }
    }
}

/// Settings for the nested sampler
#[derive(Clone, Copy, Debug)]
pub struct NestOptions {
    /// The number of live points. At least twice the dimension is
    /// recommended.
    pub nlive: usize,
    /// The bounding strategy fitted around the live set.
    pub bound: BoundChoice,
    /// The strategy that replaces the worst live point each iteration.
    pub proposal: ProposalChoice,
    /// Volume inflation applied after every bound fit, compensating the
    /// finite-sample underestimate of the likelihood contour.
    pub enlarge: f64,
    /// Iterations between bound refits; defaults to round(0.6 * nlive).
    pub update_interval: Option<usize>,
    /// When set, bounding stays off until both thresholds are crossed.
    pub first_update: Option<FirstUpdate>,
    /// Likelihood-call budget per uniform proposal. When exhausted the
    /// step surfaces a stuck-proposal error instead of looping on.
    pub rejection_budget: Option<u64>,
}

impl Default for NestOptions {
    fn default() -> Self {
        Self {
            nlive: 500,
            bound: BoundChoice::default(),
            proposal: ProposalChoice::default(),
            enlarge: 1.25,
            update_interval: None,
            first_update: None,
            rejection_budget: None,
        }
    }
}

impl NestOptions {
    /// Default options with the given number of live points.
    pub fn new(nlive: usize) -> Self {
        Self {
            nlive,
            ..Self::default()
        }
    }
}

/// The static nested sampler: a fixed-size live set shrinking through
/// nested likelihood shells while the evidence and information moments
/// accumulate.
///
/// [`step`](Self::step) advances one iteration and emits the outgoing
/// sample; callers either drive the loop themselves, checking the
/// termination predicates between steps, or use [`run`](Self::run).
#[derive(Debug)]
pub struct NestedSampler<L: LogLikelihood> {
    like: L,
    transform: PriorTransform,
    live: LivePoints,
    bound: Bound,
    proposal: Proposal,
    acc: EvidenceAccumulator,
    samples: Vec<Sample>,
    options: NestOptions,
    update_interval: usize,
    rng: SmallRng,
    ncall: u64,
    bounding: bool,
    n_degenerate: u64,
    warned_degenerate: bool,
}

impl<L: LogLikelihood> NestedSampler<L> {
    /// Validate the configuration, draw the initial live set from the
    /// prior and fit the initial bound (unless a first-update gate defers
    /// it).
    pub fn new<R: Rng + ?Sized>(
        mut like: L,
        transform: PriorTransform,
        options: NestOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let dim = like.dim();
        if dim == 0 {
            return Err(NestError::Config("model dimension must be positive".into()));
        }
        if transform.dim() != dim {
            return Err(NestError::Config(format!(
                "{} priors supplied for a {dim}-dimensional model",
                transform.dim()
            )));
        }
        if options.nlive < 2 {
            return Err(NestError::Config(
                "at least two live points are required".into(),
            ));
        }
        if options.enlarge < 1. {
            return Err(NestError::Config(format!(
                "enlargement factor {} would shrink the bound",
                options.enlarge
            )));
        }
        if options.update_interval == Some(0) {
            return Err(NestError::Config(
                "update interval must be positive".into(),
            ));
        }
        let slice_proposal = matches!(
            options.proposal,
            ProposalChoice::Slice { .. } | ProposalChoice::RSlice { .. }
        );
        if slice_proposal && options.bound == BoundChoice::UnitCube {
            return Err(NestError::Config(
                "slice proposals need an ellipsoid bound for their axis frame".into(),
            ));
        }
        if options.nlive < 2 * dim {
            log::warn!(
                "nlive = {} is below the recommended 2 * dim = {}",
                options.nlive,
                2 * dim
            );
        }

        let mut rng = SmallRng::from_rng(rng).expect("could not seed rng");

        let mut live = LivePoints::new(dim, options.nlive);
        let mut ncall = 0u64;
        let mut unit = vec![0.; dim];
        let mut theta = vec![0.; dim];
        for j in 0..options.nlive {
            for u in unit.iter_mut() {
                *u = rng.gen();
            }
            transform.transform(&unit, &mut theta);
            let logl = evaluate(&mut like, &theta)?;
            ncall += 1;
            live.set(j, &unit, &theta, logl);
        }

        let update_interval = options
            .update_interval
            .unwrap_or_else(|| (0.6 * options.nlive as f64).round().max(1.) as usize);

        let mut sampler = Self {
            like,
            transform,
            live,
            bound: Bound::unit_cube(dim),
            proposal: Proposal::new(options.proposal),
            acc: EvidenceAccumulator::new(options.nlive),
            samples: Vec::new(),
            options,
            update_interval,
            rng,
            ncall,
            bounding: options.first_update.is_none(),
            n_degenerate: 0,
            warned_degenerate: false,
        };
        if sampler.bounding {
            sampler.refit_bound();
        }
        Ok(sampler)
    }

    /// One nested-sampling iteration: absorb the worst live point into
    /// the moments, refit the bound when the schedule says so, replace
    /// the evicted slot via the proposal, and emit the outgoing sample.
    ///
    /// On error the iteration is incomplete: the moments already include
    /// the outgoing shell, but the live set is unchanged.
    pub fn step(&mut self) -> Result<Sample> {
        let (worst, logl_star) = self.live.worst();
        let outgoing_unit = self.live.unit_point(worst);
        let outgoing_theta = self.live.prior_point(worst);

        let (logvol, logwt) = self.acc.step(logl_star);

        if !self.bounding {
            if let Some(gate) = self.options.first_update {
                if self.ncall > gate.min_ncall && self.efficiency() < gate.min_eff {
                    self.bounding = true;
                    self.refit_bound();
                }
            }
        } else if self.acc.iter % self.update_interval == 0 {
            self.refit_bound();
        }

        let proposed = if self.bounding {
            self.proposal.propose(
                &mut self.rng,
                &self.bound,
                &self.transform,
                &mut self.like,
                logl_star,
                &self.live,
                worst,
                self.options.rejection_budget,
                self.acc.iter,
            )?
        } else {
            propose_uniform(
                &mut self.rng,
                &self.bound,
                &self.transform,
                &mut self.like,
                logl_star,
                self.options.rejection_budget,
                self.acc.iter,
            )?
        };
        self.ncall += proposed.ncall;
        self.live
            .set(worst, &proposed.unit, &proposed.theta, proposed.logl);

        let sample = Sample {
            theta: outgoing_theta.into_boxed_slice(),
            unit: outgoing_unit.into_boxed_slice(),
            logl: logl_star,
            logvol,
            logwt,
        };
        self.samples.push(sample.clone());
        Ok(sample)
    }

    /// Refit the bound to the current live set in unit space, falling
    /// back to the previous bound when the fit degenerates.
    fn refit_bound(&mut self) {
        let nlive = self.options.nlive as f64;
        let iter = self.acc.iter.max(1) as f64;
        let pointvol = (-(iter - 1.) / nlive).exp() / nlive;
        match Bound::fit(
            self.options.bound,
            self.live.unit_matrix(),
            pointvol,
            self.options.enlarge,
            &mut self.rng,
        ) {
            Ok(bound) => {
                if let Bound::MultiEllipsoid(multi) = &bound {
                    log::debug!(
                        "bound refit at iteration {} split the live set into {} ellipsoids",
                        self.acc.iter,
                        multi.len()
                    );
                } else {
                    log::debug!(
                        "bound refit at iteration {}: ln volume {:.3}",
                        self.acc.iter,
                        bound.ln_volume()
                    );
                }
                self.bound = bound;
            }
            Err(_) => {
                self.n_degenerate += 1;
                if !self.warned_degenerate {
                    log::warn!(
                        "degenerate bound fit at iteration {}; keeping the previous bound",
                        self.acc.iter
                    );
                    self.warned_degenerate = true;
                }
            }
        }
    }

    /// The log-fraction of evidence the live set could still contribute:
    /// logaddexp(log Z, max live log L - (i - 1)/N) - log Z.
    pub fn dlogz_remaining(&self) -> f64 {
        let shrink = self.acc.iter.saturating_sub(1) as f64 / self.options.nlive as f64;
        let logz_remain = self.live.max_logl() - shrink;
        logaddexp(self.acc.logz, logz_remain) - self.acc.logz
    }

    /// Stop when the remaining fractional evidence drops below
    /// `threshold` (default 0.5 in common usage).
    pub fn dlogz_convergence(&self, threshold: f64) -> bool {
        self.dlogz_remaining() < threshold
    }

    /// Stop when the posterior weights have declined for more than
    /// `factor * iterations` consecutive iterations.
    pub fn decline_convergence(&self, factor: f64) -> bool {
        self.acc.ndecl as f64 > factor * self.acc.iter as f64
    }

    /// Iterate until [`dlogz_convergence`](Self::dlogz_convergence) at
    /// `dlogz`, then finalize.
    pub fn run(mut self, dlogz: f64) -> Result<NestResult> {
        while !self.dlogz_convergence(dlogz) {
            self.step()?;
        }
        Ok(self.finalize())
    }

    /// Sweep the remaining live points into the evidence sum at an equal
    /// partition of the residual prior mass, then package the result.
    pub fn finalize(mut self) -> NestResult {
        let nlive = self.options.nlive;
        let niter = self.acc.iter;
        let logvol = -(niter as f64) / nlive as f64 - (nlive as f64).ln();
        for j in 0..nlive {
            let logl = self.live.logl(j);
            let logwt = self.acc.absorb(logl, logvol);
            self.samples.push(Sample {
                theta: self.live.prior_point(j).into_boxed_slice(),
                unit: self.live.unit_point(j).into_boxed_slice(),
                logl,
                logvol,
                logwt,
            });
        }

        let mut h = self.acc.h;
        if h < 0. {
            if h < -f64::EPSILON.sqrt() {
                log::warn!("information H = {h:.3e} negative beyond float tolerance; clamped to 0");
            }
            h = 0.;
        }
        let logz = self.acc.logz;
        let logzerr = (h / nlive as f64).sqrt();

        let raw: Vec<f64> = self
            .samples
            .iter()
            .map(|s| (s.logwt - logz).exp())
            .collect();
        let total: f64 = raw.iter().sum();
        let tolerance = if h > 0. {
            3. * (h / nlive as f64).sqrt()
        } else {
            1e-3
        };
        if (total - 1.).abs() > tolerance {
            log::warn!("posterior weights sum to {total}, outside tolerance {tolerance}");
        }
        let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();

        let eff = self.efficiency();
        NestResult {
            logz,
            logzerr,
            h,
            niter: niter as u64,
            ncall: self.ncall,
            eff,
            n_degenerate: self.n_degenerate,
            samples: self.samples,
            weights,
        }
    }

    /// Running log-evidence estimate.
    pub fn logz(&self) -> f64 {
        self.acc.logz
    }

    /// Running information estimate.
    pub fn h(&self) -> f64 {
        self.acc.h
    }

    pub fn niter(&self) -> usize {
        self.acc.iter
    }

    /// Total likelihood calls so far, including initialization.
    pub fn ncall(&self) -> u64 {
        self.ncall
    }

    /// Sampling efficiency in percent: iterations per likelihood call.
    pub fn efficiency(&self) -> f64 {
        if self.ncall == 0 {
            return 0.;
        }
        100. * self.acc.iter as f64 / self.ncall as f64
    }

    /// Samples emitted so far, in iteration order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// Final estimates and the weighted sample stream of a finished run.
#[derive(Debug, Clone)]
pub struct NestResult {
    /// Log evidence.
    pub logz: f64,
    /// Evidence uncertainty, sqrt(H / nlive).
    pub logzerr: f64,
    /// Negative information H.
    pub h: f64,
    pub niter: u64,
    pub ncall: u64,
    /// Sampling efficiency in percent.
    pub eff: f64,
    /// Bound refits that fell back to the previous bound.
    pub n_degenerate: u64,
    /// Emitted samples in iteration order, final live sweep last.
    pub samples: Vec<Sample>,
    /// Normalized posterior weights, parallel to `samples`.
    pub weights: Vec<f64>,
}

impl NestResult {
    /// Posterior mean per dimension under the normalized weights.
    pub fn posterior_mean(&self) -> Vec<f64> {
        let dim = self.samples.first().map_or(0, |s| s.theta.len());
        let mut mean = vec![0.; dim];
        for (sample, w) in izip!(&self.samples, &self.weights) {
            for (acc, theta) in mean.iter_mut().zip(sample.theta.iter()) {
                *acc += w * theta;
            }
        }
        mean
    }

    /// Posterior variance per dimension under the normalized weights.
    pub fn posterior_variance(&self) -> Vec<f64> {
        let mean = self.posterior_mean();
        let mut var = vec![0.; mean.len()];
        for (sample, w) in izip!(&self.samples, &self.weights) {
            for ((acc, theta), mu) in var.iter_mut().zip(sample.theta.iter()).zip(&mean) {
                let delta = theta - mu;
                *acc += w * delta * delta;
            }
        }
        var
    }

    /// Draw `count` equally weighted posterior samples by multinomial
    /// resampling of the dead points.
    pub fn resample_equal<R: Rng + ?Sized>(&self, rng: &mut R, count: usize) -> Vec<Box<[f64]>> {
        let mut cumulative = Vec::with_capacity(self.weights.len());
        let mut acc = 0.;
        for w in &self.weights {
            acc += w;
            cumulative.push(acc);
        }
        (0..count)
            .map(|_| {
                let r = rng.gen::<f64>() * acc;
                let idx = cumulative.partition_point(|&c| c < r);
                self.samples[idx.min(self.samples.len() - 1)].theta.clone()
            })
            .collect()
    }
}

/// Likelihoods shared by the test-suite and the benchmarks.
pub mod test_models {
    use thiserror::Error;

    use crate::likelihood::{LogLikelihood, LoglikeError};

    /// An isotropic unnormalized Gaussian log-likelihood centered at the
    /// origin: log L = -|theta|^2 / 2.
    #[derive(Clone, Debug)]
    pub struct UnitGaussian {
        dim: usize,
    }

    impl UnitGaussian {
        pub fn new(dim: usize) -> Self {
            Self { dim }
        }
    }

    #[derive(Error, Debug)]
    pub enum UnitGaussianError {}

    impl LoglikeError for UnitGaussianError {
        fn is_recoverable(&self) -> bool {
            false
        }
    }

    impl LogLikelihood for UnitGaussian {
        type Error = UnitGaussianError;

        fn dim(&self) -> usize {
            self.dim
        }

        fn loglike(&mut self, theta: &[f64]) -> std::result::Result<f64, UnitGaussianError> {
            Ok(theta.iter().map(|t| -0.5 * t * t).sum())
        }
    }
}
