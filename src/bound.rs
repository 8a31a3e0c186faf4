use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::cluster::kmeans2;
use crate::ellipsoid::Ellipsoid;
use crate::Result;

/// Which bounding strategy the sampler should fit around its live points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundChoice {
    /// No bounding; proposals draw from the whole unit cube.
    UnitCube,
    /// A single covariance-shaped ellipsoid.
    Ellipsoid,
    /// A union of ellipsoids, split by clustering for multi-modal sets.
    MultiEllipsoid,
}

impl Default for BoundChoice {
    fn default() -> Self {
        BoundChoice::Ellipsoid
    }
}

/// A fitted union of ellipsoids with cached volumes for weighted draws.
#[derive(Debug, Clone)]
pub(crate) struct MultiEllipsoid {
    ells: Vec<Ellipsoid>,
    vols: Vec<f64>,
    total_vol: f64,
}

impl MultiEllipsoid {
    pub(crate) fn fit<R: Rng + ?Sized>(
        points: &DMatrix<f64>,
        pointvol: f64,
        rng: &mut R,
    ) -> Result<Self> {
        // recursion depth is capped so ill-conditioned point sets cannot
        // blow up into arbitrarily many fragments
        let depth_cap = (points.ncols() as f64).log2().ceil().max(1.) as usize;
        let seed = Ellipsoid::fit(points, pointvol)?;
        let mut ells = Vec::new();
        split_recursive(points, seed, pointvol, depth_cap, rng, &mut ells);
        let vols: Vec<f64> = ells.iter().map(Ellipsoid::volume).collect();
        let total_vol = vols.iter().sum();
        Ok(Self {
            ells,
            vols,
            total_vol,
        })
    }

    /// Draw uniformly from the union: pick an ellipsoid by volume, draw
    /// from it, then thin by the number of members containing the draw so
    /// overlap regions are not over-counted.
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        loop {
            let mut pick = rng.gen::<f64>() * self.total_vol;
            let mut idx = self.ells.len() - 1;
            for (i, vol) in self.vols.iter().enumerate() {
                if pick < *vol {
                    idx = i;
                    break;
                }
                pick -= vol;
            }
            let x = self.ells[idx].sample(rng);
            let buf: Vec<f64> = x.iter().copied().collect();
            let overlap = self.ells.iter().filter(|e| e.contains(&buf)).count().max(1);
            if overlap == 1 || rng.gen::<f64>() < (overlap as f64).recip() {
                return x;
            }
        }
    }

    pub(crate) fn contains(&self, x: &[f64]) -> bool {
        self.ells.iter().any(|e| e.contains(x))
    }

    pub(crate) fn ln_volume(&self) -> f64 {
        self.total_vol.ln()
    }

    pub(crate) fn len(&self) -> usize {
        self.ells.len()
    }

    /// The member ellipsoid whose metric the point sits deepest inside.
    pub(crate) fn member_for(&self, x: &[f64]) -> &Ellipsoid {
        self.ells
            .iter()
            .min_by(|a, b| {
                let da = a.mahalanobis_sq(x);
                let db = b.mahalanobis_sq(x);
                da.partial_cmp(&db).expect("finite metric")
            })
            .expect("at least one ellipsoid")
    }

    pub(crate) fn enlarge_all(&mut self, factor: f64) {
        for ell in &mut self.ells {
            ell.enlarge(factor);
        }
        self.vols = self.ells.iter().map(Ellipsoid::volume).collect();
        self.total_vol = self.vols.iter().sum();
    }
}

fn split_recursive<R: Rng + ?Sized>(
    points: &DMatrix<f64>,
    fitted: Ellipsoid,
    pointvol: f64,
    depth: usize,
    rng: &mut R,
    out: &mut Vec<Ellipsoid>,
) {
    let dim = points.nrows();
    let npoints = points.ncols();

    let target = 2. * npoints as f64 * pointvol;
    if depth == 0 || npoints < 2 * (dim + 1) || fitted.volume() <= target {
        out.push(fitted);
        return;
    }

    let (left, right) = kmeans2(points, rng);
    if left.len() <= dim || right.len() <= dim {
        out.push(fitted);
        return;
    }

    let left_points = points.select_columns(left.iter());
    let right_points = points.select_columns(right.iter());
    match (
        Ellipsoid::fit(&left_points, pointvol),
        Ellipsoid::fit(&right_points, pointvol),
    ) {
        (Ok(left_ell), Ok(right_ell))
            if left_ell.volume() + right_ell.volume() <= fitted.volume() =>
        {
            split_recursive(&left_points, left_ell, pointvol, depth - 1, rng, out);
            split_recursive(&right_points, right_ell, pointvol, depth - 1, rng, out);
        }
        _ => out.push(fitted),
    }
}

/// The bounding envelope the driver samples proposals from, as a tagged
/// variant so the step loop never branches on the concrete shape beyond
/// these operations.
#[derive(Debug, Clone)]
pub(crate) enum Bound {
    UnitCube { dim: usize },
    Ellipsoid(Ellipsoid),
    MultiEllipsoid(MultiEllipsoid),
}

impl Bound {
    pub(crate) fn unit_cube(dim: usize) -> Self {
        Bound::UnitCube { dim }
    }

    /// Fit the chosen bound to the columns of `points` and apply the
    /// enlargement factor. The unit-cube fit is a no-op.
    pub(crate) fn fit<R: Rng + ?Sized>(
        choice: BoundChoice,
        points: &DMatrix<f64>,
        pointvol: f64,
        enlarge: f64,
        rng: &mut R,
    ) -> Result<Self> {
        match choice {
            BoundChoice::UnitCube => Ok(Bound::UnitCube {
                dim: points.nrows(),
            }),
            BoundChoice::Ellipsoid => {
                let mut ell = Ellipsoid::fit(points, pointvol)?;
                ell.enlarge(enlarge);
                Ok(Bound::Ellipsoid(ell))
            }
            BoundChoice::MultiEllipsoid => {
                let mut multi = MultiEllipsoid::fit(points, pointvol, rng)?;
                multi.enlarge_all(enlarge);
                Ok(Bound::MultiEllipsoid(multi))
            }
        }
    }

    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        match self {
            Bound::UnitCube { dim } => (0..*dim).map(|_| rng.gen()).collect(),
            Bound::Ellipsoid(ell) => ell.sample(rng).iter().copied().collect(),
            Bound::MultiEllipsoid(multi) => multi.sample(rng).iter().copied().collect(),
        }
    }

    pub(crate) fn contains(&self, x: &[f64]) -> bool {
        match self {
            Bound::UnitCube { .. } => x.iter().all(|&v| (0. ..1.).contains(&v)),
            Bound::Ellipsoid(ell) => ell.contains(x),
            Bound::MultiEllipsoid(multi) => multi.contains(x),
        }
    }

    pub(crate) fn ln_volume(&self) -> f64 {
        match self {
            Bound::UnitCube { .. } => 0.,
            Bound::Ellipsoid(ell) => ell.ln_volume(),
            Bound::MultiEllipsoid(multi) => multi.ln_volume(),
        }
    }

    /// A random step shaped like the bound at `at`: Gaussian through the
    /// local ellipsoid frame, isotropic Gaussian for the unit cube.
    pub(crate) fn shape_step<R: Rng + ?Sized>(&self, rng: &mut R, at: &[f64]) -> DVector<f64> {
        let dim = self.dim();
        let z = DVector::from_fn(dim, |_, _| rng.sample::<f64, _>(StandardNormal));
        match self {
            Bound::UnitCube { .. } => z,
            Bound::Ellipsoid(ell) => ell.axes() * z,
            Bound::MultiEllipsoid(multi) => multi.member_for(at).axes() * z,
        }
    }

    /// The principal-axis frame used by slice proposals, evaluated at a
    /// point for multi-ellipsoid bounds. The unit cube has no preferred
    /// frame and yields `None`.
    pub(crate) fn axes_at(&self, at: &[f64]) -> Option<&DMatrix<f64>> {
        match self {
            Bound::UnitCube { .. } => None,
            Bound::Ellipsoid(ell) => Some(ell.axes()),
            Bound::MultiEllipsoid(multi) => Some(multi.member_for(at).axes()),
        }
    }

    pub(crate) fn dim(&self) -> usize {
        match self {
            Bound::UnitCube { dim } => *dim,
            Bound::Ellipsoid(ell) => ell.dim(),
            Bound::MultiEllipsoid(multi) => multi.ells[0].dim(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_blobs(rng: &mut StdRng, npoints: usize) -> DMatrix<f64> {
        DMatrix::from_fn(2, npoints, |row, col| {
            let offset = if col % 2 == 0 { -0.3 } else { 0.3 };
            let jitter: f64 = rng.sample(StandardNormal);
            if row == 0 {
                0.5 + offset + 0.02 * jitter
            } else {
                0.5 + 0.02 * jitter
            }
        })
    }

    #[test]
    fn multi_fit_splits_two_blobs() {
        let mut rng = StdRng::seed_from_u64(21);
        let points = two_blobs(&mut rng, 100);
        // target volume far below the blob separation forces a split
        let multi = MultiEllipsoid::fit(&points, 1e-6, &mut rng).unwrap();
        assert!(multi.len() >= 2, "expected a split, got {}", multi.len());
    }

    #[test]
    fn multi_samples_land_in_union() {
        let mut rng = StdRng::seed_from_u64(22);
        let points = two_blobs(&mut rng, 100);
        let multi = MultiEllipsoid::fit(&points, 1e-6, &mut rng).unwrap();
        for _ in 0..300 {
            let x = multi.sample(&mut rng);
            let buf: Vec<f64> = x.iter().copied().collect();
            assert!(multi.contains(&buf));
        }
    }

    #[test]
    fn compact_cloud_stays_single() {
        let mut rng = StdRng::seed_from_u64(23);
        let points = DMatrix::from_fn(2, 50, |_, _| {
            let jitter: f64 = rng.sample(StandardNormal);
            0.5 + 0.05 * jitter
        });
        let single = Ellipsoid::fit(&points, 0.).unwrap();
        let multi = MultiEllipsoid::fit(&points, single.volume(), &mut rng).unwrap();
        assert_eq!(multi.len(), 1);
    }

    #[test]
    fn unit_cube_operations() {
        let mut rng = StdRng::seed_from_u64(24);
        let cube = Bound::unit_cube(3);
        assert_eq!(cube.ln_volume(), 0.);
        for _ in 0..50 {
            let x = cube.sample(&mut rng);
            assert!(cube.contains(&x));
        }
        assert!(!cube.contains(&[0.5, 0.5, 1.5]));
    }

    #[test]
    fn fitted_bound_encloses_points() {
        let mut rng = StdRng::seed_from_u64(25);
        let points = two_blobs(&mut rng, 80);
        let bound = Bound::fit(BoundChoice::MultiEllipsoid, &points, 1e-6, 1.25, &mut rng).unwrap();
        for col in points.column_iter() {
            let x: Vec<f64> = col.iter().copied().collect();
            assert!(bound.contains(&x));
        }
    }
}
