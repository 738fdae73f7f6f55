//! L3 (geometric cluster orbits, taken as input) and the canonical,
//! hashable `DecoratedCluster` value that L4 produces from them (spec §3,
//! §4.1, §9's "canonicalised clusters as hashable values" design note).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::lattice::{RVec, SiteLabel, Supercell};
use crate::core::symmetry::SymmetryOp;

/// A purely geometric cluster: an ordered list of sites, with no species
/// assignment. `max_order` records the intended arity for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometricCluster {
    pub sites: Vec<SiteLabel>,
}

impl GeometricCluster {
    pub fn order(&self) -> usize {
        self.sites.len()
    }
}

/// An L3 input: a list of geometric clusters already grouped into one orbit
/// by the symmetry group's action on sites only.
pub type GeometricOrbit = Vec<GeometricCluster>;

fn sort_key(pair: &(SiteLabel, usize)) -> (i64, i64, i64, usize, usize) {
    let r = pair.0.r;
    (r.x, r.y, r.z, pair.0.basis, pair.1)
}

/// A decorated (site, species) cluster, canonicalised by shifting its
/// centroid into the origin unit cell (integer floor division, spec
/// §4.1's "zero" policy) and wrapping every site into the supercell.
///
/// Equality and hashing are order-invariant: two `DecoratedCluster`s are
/// equal iff they carry the same multiset of `(site, species)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoratedCluster {
    /// Stored in construction order; use `sorted_pairs` for canonical
    /// comparisons, hashing, and the "first site" check used by the
    /// `VacancyAtOriginOnly` enumeration policy.
    pub pairs: Vec<(SiteLabel, usize)>,
}

impl DecoratedCluster {
    /// Builds a canonical decorated cluster from raw sites/species: shifts
    /// the centroid to the origin cell via floor division, then wraps every
    /// site coordinate mod N.
    pub fn canonicalize(sites: &[SiteLabel], species: &[usize], sc: &Supercell) -> Self {
        debug_assert_eq!(sites.len(), species.len());
        let n = sites.len() as i64;
        let sum = sites.iter().fold(RVec::zero(), |acc, s| acc + s.r);
        let r_trans = sum.div_floor(n);
        let pairs = sites
            .iter()
            .zip(species.iter())
            .map(|(s, &sp)| (SiteLabel::new(s.basis, sc.wrap(s.r - r_trans)), sp))
            .collect();
        Self { pairs }
    }

    pub fn order(&self) -> usize {
        self.pairs.len()
    }

    pub fn sorted_pairs(&self) -> Vec<(SiteLabel, usize)> {
        let mut v = self.pairs.clone();
        v.sort_by_key(sort_key);
        v
    }

    pub fn species_count(&self, spec: usize) -> usize {
        self.pairs.iter().filter(|(_, s)| *s == spec).count()
    }

    /// Applies a symmetry operation to this decorated cluster, producing a
    /// fresh canonical representative (re-centroiding and re-wrapping, as
    /// the original `ClusterSpecies.g()` does by re-running its
    /// constructor on the transformed sites).
    pub fn apply_symmetry(&self, op: &SymmetryOp, sc: &Supercell) -> DecoratedCluster {
        let sites: Vec<SiteLabel> = self
            .pairs
            .iter()
            .map(|(s, _)| op.apply_site_unwrapped(*s))
            .collect();
        let species: Vec<usize> = self.pairs.iter().map(|(_, sp)| *sp).collect();
        DecoratedCluster::canonicalize(&sites, &species, sc)
    }

    /// Sort key used to deterministically order a list of decorated-cluster
    /// orbits: the squared norm of the last sorted site's R, tie-broken
    /// lexicographically on `(site.R, site.basis, species)` across all
    /// sites (spec §4.1).
    pub fn orbit_sort_key(&self) -> (i64, Vec<(i64, i64, i64, usize, usize)>) {
        let sorted = self.sorted_pairs();
        let last_norm_sq = sorted.last().map(|(s, _)| s.r.norm_sq()).unwrap_or(0);
        let full_key = sorted.iter().map(sort_key).collect();
        (last_norm_sq, full_key)
    }
}

impl PartialEq for DecoratedCluster {
    fn eq(&self, other: &Self) -> bool {
        self.sorted_pairs() == other.sorted_pairs()
    }
}
impl Eq for DecoratedCluster {}

impl Hash for DecoratedCluster {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Commutative combiner (order-invariant): XOR of per-pair hashes,
        // folded with the cardinality so that distinct multiplicities of
        // otherwise-identical pairs don't collide (spec §9 design note;
        // SPEC_FULL's supplement over the original source's product+sum
        // combiner).
        let mut combined: u64 = 0;
        for pair in &self.pairs {
            let mut h = DefaultHasher::new();
            pair.hash(&mut h);
            combined ^= h.finish();
        }
        combined ^= (self.pairs.len() as u64).wrapping_mul(0x9E3779B97F4A7C15);
        state.write_u64(combined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symmetry::SymmetryOp;

    fn sc() -> Supercell {
        Supercell::new(4, 1).unwrap()
    }

    #[test]
    fn canonicalize_shifts_centroid_by_floor_division() {
        let sc = sc();
        let sites = [
            SiteLabel::new(0, RVec::new(0, 0, 0)),
            SiteLabel::new(0, RVec::new(1, 0, 0)),
        ];
        let species = [0usize, 1usize];
        let dc = DecoratedCluster::canonicalize(&sites, &species, &sc);
        // sum = (1,0,0), floor div by 2 => (0,0,0); sites stay at (0,0,0) and (1,0,0)
        let sorted = dc.sorted_pairs();
        assert_eq!(sorted[0].0.r, RVec::new(0, 0, 0));
        assert_eq!(sorted[1].0.r, RVec::new(1, 0, 0));
    }

    #[test]
    fn equality_is_order_invariant() {
        let sc = sc();
        let sites_a = [
            SiteLabel::new(0, RVec::new(0, 0, 0)),
            SiteLabel::new(0, RVec::new(1, 0, 0)),
        ];
        let sites_b = [sites_a[1], sites_a[0]];
        let species_a = [0usize, 1usize];
        let species_b = [1usize, 0usize];
        let dc_a = DecoratedCluster::canonicalize(&sites_a, &species_a, &sc);
        let dc_b = DecoratedCluster::canonicalize(&sites_b, &species_b, &sc);
        assert_eq!(dc_a, dc_b);

        use std::collections::hash_map::DefaultHasher;
        let mut ha = DefaultHasher::new();
        dc_a.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        dc_b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn translated_decoration_is_not_equal_to_different_species() {
        let sc = sc();
        let sites = [
            SiteLabel::new(0, RVec::new(0, 0, 0)),
            SiteLabel::new(0, RVec::new(1, 0, 0)),
        ];
        let dc1 = DecoratedCluster::canonicalize(&sites, &[0, 1], &sc);
        let dc2 = DecoratedCluster::canonicalize(&sites, &[1, 0], &sc);
        assert_ne!(dc1, dc2);
    }

    #[test]
    fn apply_identity_symmetry_is_a_fixed_point() {
        let sc = sc();
        let sites = [
            SiteLabel::new(0, RVec::new(0, 0, 0)),
            SiteLabel::new(0, RVec::new(1, 0, 0)),
        ];
        let dc = DecoratedCluster::canonicalize(&sites, &[0, 1], &sc);
        let id = SymmetryOp::identity(1);
        let mapped = dc.apply_symmetry(&id, &sc);
        assert_eq!(dc, mapped);
    }
}
