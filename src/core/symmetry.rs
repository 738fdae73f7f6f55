//! L2: symmetry group, represented as flat data rather than an object
//! hierarchy (per spec §9's design note: "Group operations as data, not
//! behaviour").

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::core::lattice::{RVec, SiteLabel, Supercell};

/// One space-group operation: a permutation of basis sites, an integer
/// rotation acting on lattice-translation vectors, an integer translation,
/// and the cartesian rotation matrix used to transform basis vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymmetryOp {
    /// `basis_permutation[i]` is the basis index that site `i` maps to.
    pub basis_permutation: Vec<usize>,
    /// Integer 3x3 rotation/reflection acting on `RVec`s.
    pub rot_int: [[i64; 3]; 3],
    /// Integer translation, in units of the primitive cell.
    pub trans: RVec,
    /// Cartesian rotation matrix, acting on basis vectors in ℝ³.
    pub rot_cart: Matrix3<f64>,
}

impl SymmetryOp {
    pub fn identity(num_basis: usize) -> Self {
        Self {
            basis_permutation: (0..num_basis).collect(),
            rot_int: [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
            trans: RVec::zero(),
            rot_cart: Matrix3::identity(),
        }
    }

    fn apply_rot_int(&self, r: RVec) -> RVec {
        let m = &self.rot_int;
        RVec::new(
            m[0][0] * r.x + m[0][1] * r.y + m[0][2] * r.z,
            m[1][0] * r.x + m[1][1] * r.y + m[1][2] * r.z,
            m[2][0] * r.x + m[2][1] * r.y + m[2][2] * r.z,
        )
    }

    /// Applies this operation to a site, WITHOUT wrapping into the
    /// supercell — callers wrap explicitly where the spec calls for it
    /// (L4 canonicalisation).
    pub fn apply_site_unwrapped(&self, site: SiteLabel) -> SiteLabel {
        let new_basis = self.basis_permutation[site.basis];
        let rotated = self.apply_rot_int(site.r) + self.trans;
        SiteLabel::new(new_basis, rotated)
    }

    pub fn apply_site(&self, site: SiteLabel, sc: &Supercell) -> SiteLabel {
        let unwrapped = self.apply_site_unwrapped(site);
        SiteLabel::new(unwrapped.basis, sc.wrap(unwrapped.r))
    }

    pub fn apply_vector(&self, v: Vector3<f64>) -> Vector3<f64> {
        self.rot_cart * v
    }
}

/// A finite group of symmetry operations. No attempt is made here to
/// enumerate the group from a space-group symbol — per spec §1 that is an
/// external collaborator; this type just carries and applies a given set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymmetryGroup {
    pub ops: Vec<SymmetryOp>,
}

impl SymmetryGroup {
    pub fn new(ops: Vec<SymmetryOp>) -> Self {
        Self { ops }
    }

    pub fn order(&self) -> usize {
        self.ops.len()
    }

    /// The stabiliser of a site under cluster-level equality, i.e. the
    /// subset of operations `g` for which `pred(g)` holds (the caller
    /// supplies the cluster-equality predicate, since `SymmetryGroup`
    /// itself has no notion of clusters).
    pub fn stabiliser<'a, F>(&'a self, mut fixes: F) -> Vec<&'a SymmetryOp>
    where
        F: FnMut(&SymmetryOp) -> bool,
    {
        self.ops.iter().filter(|op| fixes(op)).collect()
    }
}
