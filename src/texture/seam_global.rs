use log::info;
use nalgebra::DVector;
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix;

use crate::settings::Settings;
use crate::texture::patches::{TexturePatch, VertexProjectionInfos};
use crate::texture::*;

struct SeamSample {
    p: usize,
    q: usize,
    color_p: Vector3,
    color_q: Vector3,
}

/// Corresponding color samples across patch borders: one per pair of
/// patches meeting at a shared vertex.
fn collect_seam_samples(
    patches: &[TexturePatch],
    infos: &VertexProjectionInfos,
) -> Vec<SeamSample> {
    let mut samples = vec![];
    for projections in infos {
        for (i, a) in projections.iter().enumerate() {
            for b in &projections[i + 1..] {
                let color_p = patches[a.patch_idx].color_at(a.pixel);
                let color_q = patches[b.patch_idx].color_at(b.pixel);
                if let (Some(color_p), Some(color_q)) = (color_p, color_q)
                {
                    samples.push(SeamSample {
                        p: a.patch_idx,
                        q: b.patch_idx,
                        color_p,
                        color_q,
                    });
                }
            }
        }
    }
    samples
}

/// Total squared color difference at vertices shared between patches.
pub fn seam_discrepancy(
    patches: &[TexturePatch],
    infos: &VertexProjectionInfos,
) -> f64 {
    collect_seam_samples(patches, infos)
        .iter()
        .map(|s| (s.color_p - s.color_q).norm_squared())
        .sum()
}

fn conjugate_gradients_solve(
    a: &CsrMatrix<f64>,
    b: DVector<f64>,
    x0: DVector<f64>,
    steps: usize,
) -> DVector<f64> {
    // Solve the system ax = b, where a is a sparse positive definite
    // matrix. Following Wikipedia's "Example code in MATLAB / GNU
    // Octave".
    assert!(
        a.nrows() == a.ncols()
            && a.nrows() == b.nrows()
            && a.nrows() == x0.nrows()
    );

    let mut x = x0;
    let mut r = b - a * &x;
    let mut p = r.clone();
    let mut rsold = r.dot(&r);

    for _ in 0..steps {
        if rsold < f64::EPSILON {
            break;
        }
        let ap = a * &p;
        let alpha = rsold / (p.dot(&ap));
        x += alpha * p.clone();
        r -= alpha * ap;
        let rsnew = r.dot(&r);
        p = r.clone() + (rsnew / rsold) * p;
        rsold = rsnew;
    }

    x
}

/// Removes low-frequency seams by solving for one additive color
/// adjustment per patch that minimizes the squared color discrepancy
/// at all shared vertices, with seam-free patches regularized toward
/// zero change. This is the one global solve of the pipeline: the full
/// cross-patch system is formed before anything is applied.
pub fn global_seam_leveling(
    patches: &mut [TexturePatch],
    infos: &VertexProjectionInfos,
    settings: &Settings,
) {
    let samples = collect_seam_samples(patches, infos);
    if samples.is_empty() {
        return;
    }
    let before = samples
        .iter()
        .map(|s| (s.color_p - s.color_q).norm_squared())
        .sum::<f64>();

    let n = patches.len();
    let mut coo = CooMatrix::new(n, n);
    for p in 0..n {
        coo.push(p, p, settings.leveling_regularization);
    }
    for s in &samples {
        coo.push(s.p, s.p, 1.0);
        coo.push(s.q, s.q, 1.0);
        coo.push(s.p, s.q, -1.0);
        coo.push(s.q, s.p, -1.0);
    }
    let a = CsrMatrix::from(&coo);

    let mut adjustments = vec![Vector3::zeros(); n];
    for channel in 0..3 {
        let mut b = DVector::zeros(n);
        for s in &samples {
            let diff = s.color_q[channel] - s.color_p[channel];
            b[s.p] += diff;
            b[s.q] -= diff;
        }
        // Starting from zero adjustment guarantees the solution never
        // exceeds the initial discrepancy.
        let x = conjugate_gradients_solve(
            &a,
            b,
            DVector::zeros(n),
            settings.leveling_steps,
        );
        for p in 0..n {
            adjustments[p][channel] = x[p];
        }
    }

    for (patch, adjustment) in patches.iter_mut().zip(&adjustments) {
        let (w, h) = patch.image.dimensions();
        for y in 0..h {
            for x in 0..w {
                if !patch.is_valid(x, y) {
                    continue;
                }
                let color = pixel_to_vector3(patch.image.get_pixel(x, y))
                    + adjustment;
                put_pixel_clamped(x, y, color, &mut patch.image);
            }
        }
    }

    info!(
        "global seam leveling: discrepancy {:.1} -> {:.1}",
        before,
        seam_discrepancy(patches, infos)
    );
}
