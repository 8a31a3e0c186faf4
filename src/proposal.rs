use nalgebra::DVector;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::bound::Bound;
use crate::likelihood::{evaluate, LogLikelihood};
use crate::point::LivePoints;
use crate::prior::PriorTransform;
use crate::{NestError, Result};

/// Which replacement strategy generates new live points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProposalChoice {
    /// Rejection sampling from the bound.
    Uniform,
    /// A likelihood-constrained random walk of `walks` steps started from
    /// a randomly chosen other live point.
    RWalk { walks: usize },
    /// Slice sampling along random directions drawn through the bound's
    /// axis frame.
    RSlice { slices: usize },
    /// Slice sampling along the bound's principal axes, one pass per
    /// axis, `slices` passes.
    Slice { slices: usize },
}

impl Default for ProposalChoice {
    fn default() -> Self {
        ProposalChoice::Uniform
    }
}

/// The point a proposal hands back to the driver, with the number of
/// likelihood calls it spent.
#[derive(Debug)]
pub(crate) struct Proposed {
    pub(crate) unit: Vec<f64>,
    pub(crate) theta: Vec<f64>,
    pub(crate) logl: f64,
    pub(crate) ncall: u64,
}

/// Proposal state. The walk and random-slice variants carry a mutable
/// scale adapted after every call; nothing here may retain references to
/// the driver's live points beyond one call.
#[derive(Debug, Clone)]
pub(crate) enum Proposal {
    Uniform,
    RWalk { walks: usize, scale: f64 },
    RSlice { slices: usize, scale: f64 },
    Slice { slices: usize },
}

impl Proposal {
    pub(crate) fn new(choice: ProposalChoice) -> Self {
        match choice {
            ProposalChoice::Uniform => Proposal::Uniform,
            ProposalChoice::RWalk { walks } => Proposal::RWalk { walks, scale: 1. },
            ProposalChoice::RSlice { slices } => Proposal::RSlice { slices, scale: 1. },
            ProposalChoice::Slice { slices } => Proposal::Slice { slices },
        }
    }

    /// Generate a point with log-likelihood at or above `logl_star`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn propose<R: Rng + ?Sized, L: LogLikelihood>(
        &mut self,
        rng: &mut R,
        bound: &Bound,
        transform: &PriorTransform,
        like: &mut L,
        logl_star: f64,
        live: &LivePoints,
        worst: usize,
        budget: Option<u64>,
        iteration: usize,
    ) -> Result<Proposed> {
        match self {
            Proposal::Uniform => {
                propose_uniform(rng, bound, transform, like, logl_star, budget, iteration)
            }
            Proposal::RWalk { walks, scale } => {
                let (proposed, new_scale) = rwalk(
                    rng, bound, transform, like, logl_star, live, worst, *walks, *scale,
                )?;
                *scale = new_scale;
                Ok(proposed)
            }
            Proposal::RSlice { slices, scale } => {
                let (proposed, new_scale) = rslice(
                    rng, bound, transform, like, logl_star, live, worst, *slices, *scale,
                )?;
                *scale = new_scale;
                Ok(proposed)
            }
            Proposal::Slice { slices } => {
                axis_slice(rng, bound, transform, like, logl_star, live, worst, *slices)
            }
        }
    }
}

/// Rejection sampling from the bound. Only this strategy honors the
/// caller's rejection budget; the walk variants always terminate on
/// their own.
pub(crate) fn propose_uniform<R: Rng + ?Sized, L: LogLikelihood>(
    rng: &mut R,
    bound: &Bound,
    transform: &PriorTransform,
    like: &mut L,
    logl_star: f64,
    budget: Option<u64>,
    iteration: usize,
) -> Result<Proposed> {
    let mut ncall = 0u64;
    loop {
        let unit = bound.sample(rng);
        if !inside_cube(&unit) {
            continue;
        }
        let theta = transform.transform_vec(&unit);
        let logl = evaluate(like, &theta)?;
        ncall += 1;
        if logl >= logl_star {
            return Ok(Proposed {
                unit,
                theta,
                logl,
                ncall,
            });
        }
        if let Some(limit) = budget {
            if ncall >= limit {
                return Err(NestError::StuckProposal {
                    budget: limit,
                    iteration: iteration as u64,
                    logl_star,
                });
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rwalk<R: Rng + ?Sized, L: LogLikelihood>(
    rng: &mut R,
    bound: &Bound,
    transform: &PriorTransform,
    like: &mut L,
    logl_star: f64,
    live: &LivePoints,
    worst: usize,
    walks: usize,
    scale: f64,
) -> Result<(Proposed, f64)> {
    let start = pick_start(rng, live, worst);
    let mut unit = live.unit_point(start);
    let mut theta = live.prior_point(start);
    let mut logl = live.logl(start);

    let walks = walks.max(2);
    let mut ncall = 0u64;
    let mut naccept = 0usize;
    let mut nreject = 0usize;
    let mut steps = 0usize;
    // walk at least `walks` steps, and keep going until something was
    // accepted, up to a hard cap
    while steps < walks || naccept == 0 {
        steps += 1;
        if steps > 100 * walks {
            break;
        }
        let eta = bound.shape_step(rng, &unit);
        let prop: Vec<f64> = unit
            .iter()
            .zip(eta.iter())
            .map(|(u, e)| u + scale * e)
            .collect();
        if !inside_cube(&prop) {
            nreject += 1;
            continue;
        }
        let prop_theta = transform.transform_vec(&prop);
        let prop_logl = evaluate(like, &prop_theta)?;
        ncall += 1;
        if prop_logl >= logl_star {
            unit = prop;
            theta = prop_theta;
            logl = prop_logl;
            naccept += 1;
        } else {
            nreject += 1;
        }
    }

    if naccept == 0 {
        log::warn!(
            "random walk made no accepted moves in {steps} steps at log L* = {logl_star}; \
             returning its start point"
        );
    }

    let total = (naccept + nreject).max(1);
    let ratio = naccept as f64 / total as f64;
    let new_scale = scale * ((ratio - 0.5) / naccept.max(1) as f64).exp();

    Ok((
        Proposed {
            unit,
            theta,
            logl,
            ncall,
        },
        new_scale,
    ))
}

#[allow(clippy::too_many_arguments)]
fn rslice<R: Rng + ?Sized, L: LogLikelihood>(
    rng: &mut R,
    bound: &Bound,
    transform: &PriorTransform,
    like: &mut L,
    logl_star: f64,
    live: &LivePoints,
    worst: usize,
    slices: usize,
    scale: f64,
) -> Result<(Proposed, f64)> {
    let start = pick_start(rng, live, worst);
    let mut unit = live.unit_point(start);
    let mut theta = live.prior_point(start);
    let mut logl = live.logl(start);
    let dim = live.dim();

    let mut stats = SliceStats::default();
    for _ in 0..slices.max(1) {
        let mut z = DVector::from_fn(dim, |_, _| rng.sample::<f64, _>(StandardNormal));
        let norm = z.norm();
        if norm > 0. {
            z /= norm;
        }
        let dir = match bound.axes_at(&unit) {
            Some(axes) => axes * z * scale,
            None => z * scale,
        };
        slice_along(
            rng, transform, like, logl_star, &mut unit, &mut theta, &mut logl, &dir, &mut stats,
        )?;
    }

    let nexpand = stats.nexpand.max(1) as f64;
    let ncontract = stats.ncontract.max(1) as f64;
    let new_scale = scale * (2. * nexpand / (nexpand + ncontract)).powf(1. / dim as f64);

    Ok((
        Proposed {
            unit,
            theta,
            logl,
            ncall: stats.ncall,
        },
        new_scale,
    ))
}

#[allow(clippy::too_many_arguments)]
fn axis_slice<R: Rng + ?Sized, L: LogLikelihood>(
    rng: &mut R,
    bound: &Bound,
    transform: &PriorTransform,
    like: &mut L,
    logl_star: f64,
    live: &LivePoints,
    worst: usize,
    slices: usize,
) -> Result<Proposed> {
    let start = pick_start(rng, live, worst);
    let mut unit = live.unit_point(start);
    let mut theta = live.prior_point(start);
    let mut logl = live.logl(start);
    let dim = live.dim();

    let mut stats = SliceStats::default();
    let mut order: Vec<usize> = (0..dim).collect();
    for _ in 0..slices.max(1) {
        order.shuffle(rng);
        for &axis in &order {
            // the frame is re-read per move so multi-ellipsoid bounds
            // follow the point between members
            let dir = match bound.axes_at(&unit) {
                Some(axes) => axes.column(axis).clone_owned(),
                None => unit_axis(dim, axis),
            };
            slice_along(
                rng, transform, like, logl_star, &mut unit, &mut theta, &mut logl, &dir,
                &mut stats,
            )?;
        }
    }

    Ok(Proposed {
        unit,
        theta,
        logl,
        ncall: stats.ncall,
    })
}

#[derive(Default)]
struct SliceStats {
    ncall: u64,
    nexpand: u64,
    ncontract: u64,
}

/// One slice-sampling move along `dir`: place a unit window around the
/// current point, step out while the ends stay above the threshold, then
/// shrink until a draw lands back inside the slice.
#[allow(clippy::too_many_arguments)]
fn slice_along<R: Rng + ?Sized, L: LogLikelihood>(
    rng: &mut R,
    transform: &PriorTransform,
    like: &mut L,
    logl_star: f64,
    unit: &mut Vec<f64>,
    theta: &mut Vec<f64>,
    logl: &mut f64,
    dir: &DVector<f64>,
    stats: &mut SliceStats,
) -> Result<()> {
    const MAX_EXPAND: u64 = 100;

    let mut left = -rng.gen::<f64>();
    let mut right = left + 1.;

    let mut expansions = 0u64;
    while expansions < MAX_EXPAND
        && probe(unit, dir, left, transform, like, logl_star, stats)?.is_some()
    {
        left -= 1.;
        expansions += 1;
    }
    while expansions < MAX_EXPAND
        && probe(unit, dir, right, transform, like, logl_star, stats)?.is_some()
    {
        right += 1.;
        expansions += 1;
    }
    stats.nexpand += expansions;

    loop {
        let window = right - left;
        if window < 1e-30 {
            // interval collapsed onto the origin; keep the current point
            return Ok(());
        }
        let t = left + rng.gen::<f64>() * window;
        match probe(unit, dir, t, transform, like, logl_star, stats)? {
            Some((prop, prop_theta, prop_logl)) => {
                *unit = prop;
                *theta = prop_theta;
                *logl = prop_logl;
                return Ok(());
            }
            None => {
                if t < 0. {
                    left = t;
                } else {
                    right = t;
                }
                stats.ncontract += 1;
            }
        }
    }
}

/// Evaluate `origin + t * dir`; `Some` only when the point is inside the
/// unit cube and above the threshold. Out-of-cube points cost no
/// likelihood call.
fn probe<L: LogLikelihood>(
    origin: &[f64],
    dir: &DVector<f64>,
    t: f64,
    transform: &PriorTransform,
    like: &mut L,
    logl_star: f64,
    stats: &mut SliceStats,
) -> Result<Option<(Vec<f64>, Vec<f64>, f64)>> {
    let prop: Vec<f64> = origin
        .iter()
        .zip(dir.iter())
        .map(|(u, d)| u + t * d)
        .collect();
    if !inside_cube(&prop) {
        return Ok(None);
    }
    let theta = transform.transform_vec(&prop);
    let logl = evaluate(like, &theta)?;
    stats.ncall += 1;
    if logl >= logl_star {
        Ok(Some((prop, theta, logl)))
    } else {
        Ok(None)
    }
}

fn pick_start<R: Rng + ?Sized>(rng: &mut R, live: &LivePoints, worst: usize) -> usize {
    debug_assert!(live.nlive() >= 2);
    loop {
        let idx = rng.gen_range(0..live.nlive());
        if idx != worst {
            return idx;
        }
    }
}

fn inside_cube(unit: &[f64]) -> bool {
    unit.iter().all(|&u| u > 0. && u < 1.)
}

fn unit_axis(dim: usize, axis: usize) -> DVector<f64> {
    DVector::from_fn(dim, |i, _| if i == axis { 1. } else { 0. })
}
