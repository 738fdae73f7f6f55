//! L5: vector cluster basis builder.
//!
//! For each decorated orbit, averages the cartesian rotation part of its
//! stabiliser subgroup into a projector `G0` (the Reynolds operator), then
//! takes the eigenspace of `G0` for eigenvalue 1 as the orbit's vector
//! basis. Centrosymmetric orbits project to zero and contribute an empty
//! basis (spec §4.2, §9 "empty vector basis" open question).

use nalgebra::{Matrix3, Vector3, SVD};

use crate::compiler::enumerator::DecoratedOrbit;
use crate::core::lattice::Supercell;
use crate::core::symmetry::{SymmetryGroup, SymmetryOp};

/// Tolerance below which an SVD singular value of `G0 - I` is treated as
/// zero, i.e. its corresponding right-singular vector spans the
/// eigenvalue-1 eigenspace.
const EIGENVALUE_ONE_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct VectorClusterBasis {
    pub orbit_index: usize,
    /// Orthonormal basis of the orbit's vector-cluster eigenspace. Length 0
    /// for orbits whose stabiliser averages to the zero projector.
    pub vectors: Vec<Vector3<f64>>,
}

impl VectorClusterBasis {
    pub fn num_vecs(&self) -> usize {
        self.vectors.len()
    }
}

fn stabiliser_of<'a>(
    orbit: &DecoratedOrbit,
    symmetry: &'a SymmetryGroup,
    sc: &Supercell,
) -> Vec<&'a SymmetryOp> {
    let rep = &orbit.representative;
    symmetry.stabiliser(|op| rep.apply_symmetry(op, sc) == *rep)
}

fn reynolds_operator(stabiliser: &[&SymmetryOp]) -> Matrix3<f64> {
    let sum = stabiliser
        .iter()
        .fold(Matrix3::zeros(), |acc, op| acc + op.rot_cart);
    sum / (stabiliser.len() as f64)
}

/// Right-singular vectors of `g0 - I` whose singular value is (near) zero,
/// i.e. the null space of `g0 - I`, equivalently `g0`'s eigenspace for
/// eigenvalue 1.
fn eigenspace_for_eigenvalue_one(g0: &Matrix3<f64>) -> Vec<Vector3<f64>> {
    let m = g0 - Matrix3::identity();
    let svd = SVD::new(m, true, true);
    let v_t = svd.v_t.expect("SVD of a 3x3 matrix always yields V^T");
    let mut basis = Vec::new();
    for i in 0..3 {
        if svd.singular_values[i] < EIGENVALUE_ONE_TOLERANCE {
            let row = v_t.row(i);
            basis.push(Vector3::new(row[0], row[1], row[2]));
        }
    }
    basis
}

pub fn build(
    orbits: &[DecoratedOrbit],
    symmetry: &SymmetryGroup,
    sc: &Supercell,
) -> Vec<VectorClusterBasis> {
    orbits
        .iter()
        .enumerate()
        .map(|(idx, orbit)| {
            let stabiliser = stabiliser_of(orbit, symmetry, sc);
            let g0 = reynolds_operator(&stabiliser);
            let vectors = eigenspace_for_eigenvalue_one(&g0);
            VectorClusterBasis {
                orbit_index: idx,
                vectors,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cluster::{DecoratedCluster, GeometricCluster};
    use crate::core::lattice::{RVec, SiteLabel};
    use crate::core::species::SpeciesAlphabet;
    use crate::compiler::enumerator::{enumerate, ClusterVacancyPolicy};

    fn identity_only() -> SymmetryGroup {
        SymmetryGroup::new(vec![SymmetryOp::identity(1)])
    }

    fn identity_and_inversion() -> SymmetryGroup {
        SymmetryGroup::new(vec![
            SymmetryOp::identity(1),
            SymmetryOp {
                basis_permutation: vec![0],
                rot_int: [[-1, 0, 0], [0, -1, 0], [0, 0, -1]],
                trans: RVec::zero(),
                rot_cart: Matrix3::identity() * -1.0,
            },
        ])
    }

    fn point_orbit_at_origin(sc: &Supercell, species: &SpeciesAlphabet) -> DecoratedOrbit {
        let group = SymmetryGroup::new(vec![SymmetryOp::identity(1)]);
        let point_orbit = vec![GeometricCluster {
            sites: vec![SiteLabel::new(0, RVec::zero())],
        }];
        enumerate(&[point_orbit], species, &group, sc, ClusterVacancyPolicy::AllClusters)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn trivial_stabiliser_yields_full_rank_basis() {
        let sc = Supercell::new(2, 1).unwrap();
        let species = SpeciesAlphabet::new(vec!["A".into()], 0).unwrap();
        let orbit = point_orbit_at_origin(&sc, &species);
        let group = identity_only();
        let bases = build(&[orbit], &group, &sc);
        assert_eq!(bases[0].num_vecs(), 3);
    }

    #[test]
    fn centrosymmetric_stabiliser_yields_empty_basis() {
        let sc = Supercell::new(2, 1).unwrap();
        let species = SpeciesAlphabet::new(vec!["A".into()], 0).unwrap();
        // Build an orbit whose representative is fixed by both identity and
        // inversion: a single site at the origin is fixed by both.
        let group = identity_and_inversion();
        let dc = DecoratedCluster::canonicalize(
            &[SiteLabel::new(0, RVec::zero())],
            &[0usize],
            &sc,
        );
        let orbit = DecoratedOrbit {
            representative: dc.clone(),
            members: vec![dc],
            member_rotations: vec![Matrix3::identity()],
            geometric_orbit: 0,
        };
        let bases = build(&[orbit], &group, &sc);
        assert_eq!(bases[0].num_vecs(), 0);
    }
}
