use statrs::function::gamma::ln_gamma;

/// log(exp(a) + exp(b)), computed against the larger argument so the
/// exponentials never overflow.
#[inline]
pub(crate) fn logaddexp(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    let max = a.max(b);
    if max.is_infinite() {
        // a +inf term dominates; two -inf terms sum to -inf
        return max;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// log(1 - exp(x)) for x < 0, switching formulations at ln(2) to keep
/// full precision on both ends.
#[inline]
pub(crate) fn ln_1m_exp(x: f64) -> f64 {
    if x >= 0. {
        return f64::NAN;
    }
    if x > -std::f64::consts::LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

/// Log volume of the unit ball in `dim` dimensions.
pub(crate) fn ln_unit_ball_volume(dim: usize) -> f64 {
    let half = 0.5 * dim as f64;
    half * std::f64::consts::PI.ln() - ln_gamma(half + 1.)
}
