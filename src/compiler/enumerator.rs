//! L4: decorated cluster enumerator.
//!
//! For every geometric cluster orbit, enumerates all species decorations of
//! a representative cluster, rejects those with more than one vacancy,
//! canonicalises each decoration, and expands it under the full symmetry
//! group to produce an orbit of `DecoratedCluster`s (spec §4.1).

use std::collections::HashSet;

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::core::cluster::{DecoratedCluster, GeometricOrbit};
use crate::core::lattice::Supercell;
use crate::core::species::SpeciesAlphabet;
use crate::core::symmetry::SymmetryGroup;
use crate::error::BuildError;

/// Resolves spec §9's "origVac" open question: whether only clusters
/// carrying the vacancy at the canonical origin site should be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterVacancyPolicy {
    /// Keep every decorated cluster that satisfies the vacancy-count
    /// constraint, regardless of where the vacancy (if any) sits.
    AllClusters,
    /// Keep only decorations whose canonical first (lowest-sorted) site
    /// carries the vacancy species.
    VacancyAtOriginOnly,
}

/// One orbit of decorated clusters: a representative and the full list of
/// symmetry-distinct members (including the representative).
#[derive(Debug, Clone)]
pub struct DecoratedOrbit {
    pub representative: DecoratedCluster,
    pub members: Vec<DecoratedCluster>,
    /// Cartesian rotation that carried the representative to `members[i]`,
    /// parallel to `members`. L6 uses this to rotate the orbit's vector
    /// basis into each member's frame without re-deriving group elements.
    pub member_rotations: Vec<Matrix3<f64>>,
    /// Index into the geometric-orbit input list this orbit was derived
    /// from; provenance only, not used for coefficient lookup (coefficient
    /// tables are indexed by this orbit's own position in the returned
    /// `Vec`, matching the original source's `SpecClusters` indexing).
    pub geometric_orbit: usize,
}

/// Shared with L7's local TS-cluster decoration loop, which needs the same
/// `Nspec^k` enumeration but expands under a jump's point group rather than
/// the full crystal symmetry group.
pub(crate) fn species_tuples(k: usize, n_spec: usize) -> impl Iterator<Item = Vec<usize>> {
    SpeciesTuples::new(k, n_spec)
}

struct SpeciesTuples {
    k: usize,
    n_spec: usize,
    next: Option<Vec<usize>>,
}

impl SpeciesTuples {
    fn new(k: usize, n_spec: usize) -> Self {
        if k == 0 || n_spec == 0 {
            Self { k, n_spec, next: None }
        } else {
            Self { k, n_spec, next: Some(vec![0; k]) }
        }
    }
}

impl Iterator for SpeciesTuples {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut advance = current.clone();
        let mut carry = true;
        for slot in advance.iter_mut().rev() {
            if !carry {
                break;
            }
            *slot += 1;
            if *slot == self.n_spec {
                *slot = 0;
            } else {
                carry = false;
            }
        }
        self.next = if carry { None } else { Some(advance) };
        Some(current)
    }
}

/// Enumerates decorated cluster orbits for every geometric orbit in the
/// input, subject to the vacancy-count constraint and `policy`.
pub fn enumerate(
    geometric_orbits: &[GeometricOrbit],
    species: &SpeciesAlphabet,
    symmetry: &SymmetryGroup,
    sc: &Supercell,
    policy: ClusterVacancyPolicy,
) -> Result<Vec<DecoratedOrbit>, BuildError> {
    let mut seen: HashSet<DecoratedCluster> = HashSet::new();
    let mut orbits = Vec::new();

    for (geom_idx, orbit) in geometric_orbits.iter().enumerate() {
        let rep_cluster = match orbit.first() {
            Some(c) => c,
            None => continue,
        };
        let rep_sites = &rep_cluster.sites;
        let k = rep_sites.len();

        for decoration in SpeciesTuples::new(k, species.num_species()) {
            if decoration.len() != rep_sites.len() {
                return Err(BuildError::SpeciesAndSitesLengthMismatch {
                    species_len: decoration.len(),
                    sites_len: rep_sites.len(),
                });
            }
            let vac_count = decoration.iter().filter(|&&s| species.is_vacancy(s)).count();
            if vac_count > 1 {
                continue;
            }

            let dc = DecoratedCluster::canonicalize(rep_sites, &decoration, sc);
            if seen.contains(&dc) {
                continue;
            }
            if policy == ClusterVacancyPolicy::VacancyAtOriginOnly {
                let first_species = dc.sorted_pairs().first().map(|(_, sp)| *sp);
                if first_species != Some(species.vac_spec) {
                    continue;
                }
            }

            let mut member_set: HashSet<DecoratedCluster> = HashSet::new();
            member_set.insert(dc.clone());
            let mut members = vec![dc.clone()];
            let mut member_rotations = vec![Matrix3::identity()];
            for op in &symmetry.ops {
                let transformed = dc.apply_symmetry(op, sc);
                if member_set.insert(transformed.clone()) {
                    members.push(transformed);
                    member_rotations.push(op.rot_cart);
                }
            }

            for m in &members {
                seen.insert(m.clone());
            }

            orbits.push(DecoratedOrbit {
                representative: dc,
                members,
                member_rotations,
                geometric_orbit: geom_idx,
            });
        }
    }

    orbits.sort_by(|a, b| a.representative.orbit_sort_key().cmp(&b.representative.orbit_sort_key()));
    Ok(orbits)
}
