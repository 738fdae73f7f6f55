//! L1: crystal/supercell primitive.
//!
//! A diagonal supercell `N*I` over a crystal with `num_basis` sites per unit
//! cell. `RVec` is the integer lattice-translation part of a site label;
//! `SiteLabel` is `(basis, R)`. `Supercell` provides the `(R, ci) <-> siteIdx`
//! bijection and the mod-N wrap that stands in for translation through the
//! supercell.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

use crate::error::BuildError;

/// Integer lattice-translation vector, in units of the primitive cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RVec {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl RVec {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Floor division by a positive scalar, matching Python's `//` used by
    /// the original source's centroid translation.
    pub fn div_floor(self, n: i64) -> Self {
        debug_assert!(n > 0);
        Self::new(self.x.div_euclid(n), self.y.div_euclid(n), self.z.div_euclid(n))
    }

    /// Wraps each component into `[0, n)`.
    pub fn rem_euclid(self, n: i64) -> Self {
        debug_assert!(n > 0);
        Self::new(self.x.rem_euclid(n), self.y.rem_euclid(n), self.z.rem_euclid(n))
    }

    pub fn norm_sq(self) -> i64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn to_cartesian_basis(self) -> Vector3<f64> {
        Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    pub fn as_array(self) -> [i64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for RVec {
    type Output = RVec;
    fn add(self, rhs: RVec) -> RVec {
        RVec::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for RVec {
    type Output = RVec;
    fn sub(self, rhs: RVec) -> RVec {
        RVec::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// `(basis, R)` identifying a site in the infinite lattice, before it is
/// folded into a supercell index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteLabel {
    pub basis: usize,
    pub r: RVec,
}

impl SiteLabel {
    pub fn new(basis: usize, r: RVec) -> Self {
        Self { basis, r }
    }
}

/// The crystal's geometric data: lattice vectors and fractional basis
/// positions. Used only to hand cartesian coordinates to the external rate
/// oracle (§6) and to visualise/serialize compiled tables; none of the
/// enumeration or sampler math needs it directly (that all happens in
/// integer `(basis, R)` coordinates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crystal {
    /// Columns are the three lattice vectors, in Angstrom.
    pub lattice_vectors: nalgebra::Matrix3<f64>,
    /// Fractional coordinates of each basis site within the unit cell.
    pub basis_fractional: Vec<Vector3<f64>>,
}

impl Crystal {
    pub fn num_basis(&self) -> usize {
        self.basis_fractional.len()
    }

    pub fn cartesian_of(&self, site: SiteLabel) -> Vector3<f64> {
        let frac = self.basis_fractional[site.basis] + site.r.to_cartesian_basis();
        self.lattice_vectors * frac
    }
}

/// A diagonal `N*I` supercell of a crystal with `num_basis` sites per cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Supercell {
    pub n: i64,
    pub num_basis: usize,
    pub num_sites: usize,
}

impl Supercell {
    pub fn new(n: i64, num_basis: usize) -> Result<Self, BuildError> {
        if n <= 0 {
            return Err(BuildError::InvalidSupercellSize(n));
        }
        if num_basis == 0 {
            return Err(BuildError::SupercellNondiagonalUnsupported);
        }
        let num_sites = (n * n * n) as usize * num_basis;
        Ok(Self { n, num_basis, num_sites })
    }

    #[inline]
    pub fn wrap(&self, r: RVec) -> RVec {
        r.rem_euclid(self.n)
    }

    /// `(R, ci) -> siteIdx`, wrapping `R` into `[0, N)^3` first.
    #[inline]
    pub fn site_index(&self, site: SiteLabel) -> usize {
        let w = self.wrap(site.r);
        let n = self.n;
        (((w.x * n + w.y) * n + w.z) as usize) * self.num_basis + site.basis
    }

    /// Inverse of `site_index`.
    pub fn site_label(&self, idx: usize) -> SiteLabel {
        let basis = idx % self.num_basis;
        let mut cell = (idx / self.num_basis) as i64;
        let n = self.n;
        let z = cell % n;
        cell /= n;
        let y = cell % n;
        cell /= n;
        let x = cell % n;
        SiteLabel::new(basis, RVec::new(x, y, z))
    }

    /// Translates a site by a lattice shift, wrapping mod N.
    pub fn translate(&self, site: SiteLabel, shift: RVec) -> SiteLabel {
        SiteLabel::new(site.basis, self.wrap(site.r + shift))
    }
}
