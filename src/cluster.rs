use nalgebra::{DMatrix, DVector};
use rand::Rng;

const MAX_SWEEPS: usize = 50;

/// Two-means clustering of the columns of `points`.
///
/// Centers start at two distinct random points; assignment and update
/// sweeps run until labels stop changing. An emptied cluster steals the
/// point farthest from the surviving center so both index sets stay
/// non-empty.
pub(crate) fn kmeans2<R: Rng + ?Sized>(
    points: &DMatrix<f64>,
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let npoints = points.ncols();
    debug_assert!(npoints >= 2);

    let first = rng.gen_range(0..npoints);
    let mut second = rng.gen_range(0..npoints);
    while second == first {
        second = rng.gen_range(0..npoints);
    }
    let mut centers = [
        points.column(first).clone_owned(),
        points.column(second).clone_owned(),
    ];

    let mut labels = vec![0u8; npoints];
    for _ in 0..MAX_SWEEPS {
        let mut changed = false;
        for (idx, col) in points.column_iter().enumerate() {
            let d0 = (col.clone_owned() - &centers[0]).norm_squared();
            let d1 = (col.clone_owned() - &centers[1]).norm_squared();
            let label = u8::from(d1 < d0);
            if labels[idx] != label {
                labels[idx] = label;
                changed = true;
            }
        }

        for cluster in 0..2u8 {
            let members: Vec<usize> = (0..npoints).filter(|&i| labels[i] == cluster).collect();
            if members.is_empty() {
                let other = centers[usize::from(cluster == 0)].clone();
                let farthest = (0..npoints)
                    .max_by(|&a, &b| {
                        let da = (points.column(a).clone_owned() - &other).norm_squared();
                        let db = (points.column(b).clone_owned() - &other).norm_squared();
                        da.partial_cmp(&db).expect("finite distances")
                    })
                    .expect("non-empty point set");
                labels[farthest] = cluster;
                changed = true;
            }
        }

        for cluster in 0..2u8 {
            let mut mean = DVector::zeros(points.nrows());
            let mut count = 0usize;
            for (idx, col) in points.column_iter().enumerate() {
                if labels[idx] == cluster {
                    mean += col;
                    count += 1;
                }
            }
            mean /= count as f64;
            centers[usize::from(cluster)] = mean;
        }

        if !changed {
            break;
        }
    }

    let left = (0..npoints).filter(|&i| labels[i] == 0).collect();
    let right = (0..npoints).filter(|&i| labels[i] == 1).collect();
    (left, right)
}
