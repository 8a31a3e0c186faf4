use crate::math::{ln_1m_exp, logaddexp};

/// Sentinel for the initial log-evidence. A finite very-negative value
/// keeps the information update free of 0 * inf terms that a true
/// negative infinity would produce.
pub(crate) const LOGZ_INIT: f64 = -1e300;

/// Running evidence and information moments of the shrinking-shell
/// estimator, together with the shrinkage schedule state.
#[derive(Debug)]
pub(crate) struct EvidenceAccumulator {
    nlive: f64,
    pub(crate) logz: f64,
    pub(crate) h: f64,
    pub(crate) logvol: f64,
    pub(crate) iter: usize,
    pub(crate) ndecl: usize,
    last_logwt: f64,
}

impl EvidenceAccumulator {
    pub(crate) fn new(nlive: usize) -> Self {
        Self {
            nlive: nlive as f64,
            logz: LOGZ_INIT,
            h: 0.,
            logvol: 0.,
            iter: 0,
            ndecl: 0,
            last_logwt: f64::NEG_INFINITY,
        }
    }

    /// Absorb the worst live point at threshold `logl_star` as iteration
    /// `i`, advancing the expected shrinkage and the (log Z, H) moments.
    /// Returns the shell's (log vol, log wt).
    pub(crate) fn step(&mut self, logl_star: f64) -> (f64, f64) {
        self.iter += 1;
        self.logvol = if self.iter == 1 {
            ln_1m_exp(-1. / self.nlive)
        } else {
            self.logvol - 1. / self.nlive
        };
        let logwt = self.logvol + logl_star;
        self.update_moments(logwt, logl_star);

        if logwt < self.last_logwt {
            self.ndecl += 1;
        } else {
            self.ndecl = 0;
        }
        self.last_logwt = logwt;

        (self.logvol, logwt)
    }

    /// The moment update used for both shell samples and the final live
    /// sweep, where the caller fixes the log volume.
    pub(crate) fn absorb(&mut self, logl: f64, logvol: f64) -> f64 {
        let logwt = logvol + logl;
        self.update_moments(logwt, logl);
        logwt
    }

    fn update_moments(&mut self, logwt: f64, logl: f64) {
        let logz_new = logaddexp(self.logz, logwt);
        let wt_frac = (logwt - logz_new).exp();
        let carry = if wt_frac == 0. { 0. } else { wt_frac * logl };
        self.h = carry + (self.logz - logz_new).exp() * (self.h + self.logz) - logz_new;
        self.logz = logz_new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logsumexp(vals: &[f64]) -> f64 {
        let max = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        max + vals.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
    }

    #[test]
    fn moments_match_closed_form() {
        let nlive = 10;
        let logls = [-4., -3.5, -2.8, -2., -1.4, -1.1, -0.9, -0.6];
        let mut acc = EvidenceAccumulator::new(nlive);
        let mut logwts = Vec::new();
        for &logl in &logls {
            let (_, logwt) = acc.step(logl);
            logwts.push(logwt);
        }

        let logz = logsumexp(&logwts);
        assert!((acc.logz - logz).abs() < 1e-10);

        // H = sum w_i/Z * logl_i - log Z
        let h: f64 = logwts
            .iter()
            .zip(&logls)
            .map(|(&logwt, &logl)| (logwt - logz).exp() * logl)
            .sum::<f64>()
            - logz;
        assert!((acc.h - h).abs() < 1e-10, "{} vs {}", acc.h, h);
    }

    #[test]
    fn shrinkage_schedule() {
        let nlive = 5;
        let mut acc = EvidenceAccumulator::new(nlive);
        let (logvol1, _) = acc.step(-1.);
        assert!((logvol1 - ln_1m_exp(-0.2)).abs() < 1e-12);
        let (logvol2, _) = acc.step(-0.9);
        assert!((logvol2 - (logvol1 - 0.2)).abs() < 1e-12);
        assert!(logvol2 < logvol1);
    }

    #[test]
    fn decline_counter_resets_on_rise() {
        let mut acc = EvidenceAccumulator::new(100);
        // likelihood rising fast enough that weights increase
        acc.step(-10.);
        acc.step(-1.);
        assert_eq!(acc.ndecl, 0);
        // stalled likelihood makes weights decline with the volume
        acc.step(-1.);
        acc.step(-1.);
        assert_eq!(acc.ndecl, 2);
        acc.step(10.);
        assert_eq!(acc.ndecl, 0);
    }

    #[test]
    fn neg_infinity_threshold_is_stable() {
        let mut acc = EvidenceAccumulator::new(4);
        acc.step(f64::NEG_INFINITY);
        assert!(acc.logz.is_finite());
        assert!(!acc.h.is_nan());
        acc.step(-2.);
        assert!(acc.logz.is_finite());
        assert!(!acc.h.is_nan());
    }

    #[test]
    fn final_sweep_uses_fixed_volume() {
        let mut acc = EvidenceAccumulator::new(3);
        acc.step(-2.);
        let logz_before = acc.logz;
        let logwt = acc.absorb(-1., -2.5);
        assert!((logwt - (-3.5)).abs() < 1e-12);
        assert!(acc.logz > logz_before);
    }
}
