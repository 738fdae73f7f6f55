//! L6: interaction table builder.
//!
//! Translates every decorated-orbit member through all `N^3` cells of the
//! supercell, assigns each resulting site tuple a flat interaction index,
//! and records everything the sampler needs as dense arrays rather than a
//! graph of objects (spec §9 "dense tables over object graphs").

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::compiler::enumerator::DecoratedOrbit;
use crate::compiler::vector_basis::VectorClusterBasis;
use crate::core::lattice::{RVec, SiteLabel, Supercell};
use crate::core::species::SpeciesAlphabet;
use crate::error::BuildError;

/// Dense tables describing every translated, symmetry-expanded cluster
/// interaction in the supercell. Indices into the top-level `Vec`s are
/// "interaction indices"; everything else is keyed off them.
#[derive(Debug, Clone, Default)]
pub struct InteractionTables {
    /// Number of sites in interaction `k` (== `sup_sites_interacts[k].len()`).
    pub num_sites_interacts: Vec<usize>,
    /// Supercell site indices making up interaction `k`.
    pub sup_sites_interacts: Vec<Vec<usize>>,
    /// Species occupying each site of interaction `k`, in the same order.
    pub spec_on_interact_sites: Vec<Vec<usize>>,
    /// Energy contribution of interaction `k` when fully "on".
    pub interaction_to_energy: Vec<f64>,
    /// Number of vector-basis components carried by interaction `k`.
    pub num_vecs_interacts: Vec<usize>,
    /// Per-interaction vector-basis components, rotated into the member's
    /// frame (cartesian, same units as the crystal's lattice vectors).
    pub vecs_interacts: Vec<Vec<Vector3<f64>>>,
    /// Global vector-component id for each entry of `vecs_interacts[k]`,
    /// i.e. which row of the assembled `W`/`b` accumulators it feeds.
    pub vec_group_interacts: Vec<Vec<usize>>,
    /// `num_interacts_site_spec[site][spec]`: how many interactions involve
    /// `spec` occupying `site`.
    pub num_interacts_site_spec: Vec<Vec<usize>>,
    /// `site_spec_inter_array[site][spec]`: the interaction indices that
    /// involve `spec` occupying `site`, and the position of `site` within
    /// that interaction's site list.
    pub site_spec_inter_array: Vec<Vec<Vec<(usize, usize)>>>,
    /// Vector-basis dimension contributed by each decorated orbit, indexed
    /// the same way `energies` is. Mirrors the original source's
    /// `clus2LenVecClus` bookkeeping.
    vec_dim_per_orbit: Vec<usize>,
}

impl InteractionTables {
    pub fn num_interactions(&self) -> usize {
        self.num_sites_interacts.len()
    }

    /// Number of vector-basis components orbit `orbit_idx` contributes.
    pub fn vec_group_len(&self, orbit_idx: usize) -> usize {
        self.vec_dim_per_orbit[orbit_idx]
    }
}

/// Builds the dense interaction tables for a compiled set of decorated
/// orbits, given their per-orbit vector bases and energy coefficients
/// (`energies[i]` is the scalar energy for `orbits[i]`).
pub fn build(
    orbits: &[DecoratedOrbit],
    vector_bases: &[VectorClusterBasis],
    energies: &[f64],
    species: &SpeciesAlphabet,
    sc: &Supercell,
) -> Result<InteractionTables, BuildError> {
    let mut tables = InteractionTables::default();
    tables.num_interacts_site_spec = vec![vec![0usize; species.num_species()]; sc.num_sites];
    tables.site_spec_inter_array = vec![vec![Vec::new(); species.num_species()]; sc.num_sites];

    // Global vector-component offsets, one block per orbit.
    let mut vec_offset = Vec::with_capacity(orbits.len());
    let mut running = 0usize;
    for vb in vector_bases {
        vec_offset.push(running);
        running += vb.num_vecs();
    }

    tables.vec_dim_per_orbit = vector_bases.iter().map(|vb| vb.num_vecs()).collect();

    let mut seen: HashMap<Vec<(usize, usize)>, usize> = HashMap::new();

    for (orbit_idx, orbit) in orbits.iter().enumerate() {
        let energy = *energies
            .get(orbit_idx)
            .ok_or(BuildError::MissingCoefficient(orbit_idx))?;
        let vec_basis = &vector_bases[orbit_idx];

        for (member, rot) in orbit.members.iter().zip(orbit.member_rotations.iter()) {
            let rotated_vecs: Vec<Vector3<f64>> =
                vec_basis.vectors.iter().map(|v| rot * v).collect();
            let vec_group_ids: Vec<usize> = (0..vec_basis.num_vecs())
                .map(|i| vec_offset[orbit_idx] + i)
                .collect();

            for x in 0..sc.n {
                for y in 0..sc.n {
                    for z in 0..sc.n {
                        let shift = RVec::new(x, y, z);
                        let site_indices: Vec<usize> = member
                            .pairs
                            .iter()
                            .map(|(s, _)| sc.site_index(SiteLabel::new(s.basis, sc.wrap(s.r + shift))))
                            .collect();
                        let spec_list: Vec<usize> =
                            member.pairs.iter().map(|(_, sp)| *sp).collect();

                        let mut key: Vec<(usize, usize)> = site_indices
                            .iter()
                            .copied()
                            .zip(spec_list.iter().copied())
                            .collect();
                        key.sort_unstable();

                        if seen.contains_key(&key) {
                            return Err(BuildError::DuplicateInteractionDuringTranslation {
                                orbit: orbit_idx,
                                site: site_indices[0],
                            });
                        }
                        let interaction_idx = tables.num_interactions();
                        seen.insert(key, interaction_idx);

                        for (pos, (&site, &spec)) in
                            site_indices.iter().zip(spec_list.iter()).enumerate()
                        {
                            tables.num_interacts_site_spec[site][spec] += 1;
                            tables.site_spec_inter_array[site][spec]
                                .push((interaction_idx, pos));
                        }

                        tables.num_sites_interacts.push(site_indices.len());
                        tables.sup_sites_interacts.push(site_indices);
                        tables.spec_on_interact_sites.push(spec_list);
                        tables.interaction_to_energy.push(energy);
                        tables.num_vecs_interacts.push(vec_basis.num_vecs());
                        tables.vecs_interacts.push(rotated_vecs.clone());
                        tables.vec_group_interacts.push(vec_group_ids.clone());
                    }
                }
            }
        }
    }

    Ok(tables)
}
