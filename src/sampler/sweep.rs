//! C2: Metropolis sweep engine.
//!
//! Draws random same-arity species swaps via the location table (O(1), no
//! rejection sampling), evaluates the energy change by probing the shared
//! `off` vector in place, and accepts or reverts per the Metropolis
//! criterion `exp(-ΔE/kT)` (grounded in the teacher's basin-hopping
//! acceptance rule).

use rand::Rng;

use crate::compiler::interactions::InteractionTables;
use crate::error::InvariantViolation;
use crate::sampler::state::{OffSiteCounts, State};

/// Picks two sites occupied by different non-vacancy species, uniformly
/// among occupied species first and then uniformly within each species'
/// site list. Vacancy motion is the KMC engine's job (C3), not the
/// Metropolis sweep's, so the vacancy species is never a candidate here.
/// This never rejects: every draw yields a valid swap pair as long as at
/// least two non-vacancy species are populated.
pub fn pick_swap_pair<R: Rng + ?Sized>(state: &State, num_species: usize, rng: &mut R) -> Option<(usize, usize)> {
    let occupied_species: Vec<usize> = (0..num_species)
        .filter(|&s| s != state.vac_spec && !state.sites_of(s).is_empty())
        .collect();
    if occupied_species.len() < 2 {
        return None;
    }
    let spec_a = occupied_species[rng.gen_range(0..occupied_species.len())];
    let mut spec_b = occupied_species[rng.gen_range(0..occupied_species.len())];
    while spec_b == spec_a {
        spec_b = occupied_species[rng.gen_range(0..occupied_species.len())];
    }
    let site_a = state.sites_of(spec_a)[rng.gen_range(0..state.sites_of(spec_a).len())];
    let site_b = state.sites_of(spec_b)[rng.gen_range(0..state.sites_of(spec_b).len())];
    Some((site_a, site_b))
}

fn on_energy(off: &OffSiteCounts, tables: &InteractionTables, interactions: &[usize]) -> f64 {
    interactions
        .iter()
        .filter(|&&i| off.off[i] == 0)
        .map(|&i| tables.interaction_to_energy[i])
        .sum()
}

/// Probes the energy change of swapping `site_a` and `site_b`, applying the
/// swap to `state`/`off` in place. Returns `ΔE`; callers that reject the
/// move must call [`revert_swap`] to undo it.
pub fn probe_swap(
    state: &mut State,
    off: &mut OffSiteCounts,
    tables: &InteractionTables,
    site_a: usize,
    site_b: usize,
) -> f64 {
    let spec_a = state.occupancy[site_a];
    let spec_b = state.occupancy[site_b];
    let affected = OffSiteCounts::affected_by_swap(tables, site_a, spec_a, site_b, spec_b);
    let energy_before = on_energy(off, tables, &affected);

    off.apply_site_change(tables, site_a, spec_a, spec_b);
    off.apply_site_change(tables, site_b, spec_b, spec_a);
    state.swap_sites(site_a, site_b);

    let energy_after = on_energy(off, tables, &affected);
    energy_after - energy_before
}

/// Undoes a swap previously applied by [`probe_swap`], restoring `state`
/// and `off` to their pre-probe values without ever snapshotting them.
pub fn revert_swap(
    state: &mut State,
    off: &mut OffSiteCounts,
    tables: &InteractionTables,
    site_a: usize,
    site_b: usize,
) {
    let spec_at_a = state.occupancy[site_a];
    let spec_at_b = state.occupancy[site_b];
    off.apply_site_change(tables, site_a, spec_at_a, spec_at_b);
    off.apply_site_change(tables, site_b, spec_at_b, spec_at_a);
    state.swap_sites(site_a, site_b);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub attempts: u64,
    pub accepted: u64,
}

/// Runs `n_attempts` Metropolis swap attempts at inverse temperature
/// `beta`, mutating `state`/`off` in place.
pub fn sweep<R: Rng + ?Sized>(
    state: &mut State,
    off: &mut OffSiteCounts,
    tables: &InteractionTables,
    num_species: usize,
    beta: f64,
    n_attempts: u64,
    rng: &mut R,
) -> SweepStats {
    let mut stats = SweepStats::default();
    for _ in 0..n_attempts {
        let (site_a, site_b) = match pick_swap_pair(state, num_species, rng) {
            Some(pair) => pair,
            None => break,
        };
        stats.attempts += 1;
        let delta_e = probe_swap(state, off, tables, site_a, site_b);
        let accept = delta_e <= 0.0 || rng.gen::<f64>() < (-beta * delta_e).exp();
        if accept {
            stats.accepted += 1;
        } else {
            revert_swap(state, off, tables, site_a, site_b);
        }
    }
    stats
}

/// Debug-mode invariant: the incrementally maintained `off` vector must
/// agree with a from-scratch recount.
pub fn check_offsite_invariant(
    state: &State,
    off: &OffSiteCounts,
    tables: &InteractionTables,
) -> Result<(), InvariantViolation> {
    off.check_against_recount(state, tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::enumerator::{enumerate, ClusterVacancyPolicy};
    use crate::compiler::{interactions, vector_basis};
    use crate::core::cluster::GeometricCluster;
    use crate::core::lattice::{RVec, SiteLabel, Supercell};
    use crate::core::species::SpeciesAlphabet;
    use crate::core::symmetry::{SymmetryGroup, SymmetryOp};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn single_site_tables() -> (InteractionTables, SpeciesAlphabet, Supercell) {
        let sc = Supercell::new(2, 1).unwrap();
        let species = SpeciesAlphabet::new(vec!["A".into(), "B".into(), "Vac".into()], 2).unwrap();
        let group = SymmetryGroup::new(vec![SymmetryOp::identity(1)]);
        let point_orbit = vec![GeometricCluster {
            sites: vec![SiteLabel::new(0, RVec::zero())],
        }];
        let orbits = enumerate(&[point_orbit], &species, &group, &sc, ClusterVacancyPolicy::AllClusters).unwrap();
        let vector_bases = vector_basis::build(&orbits, &group, &sc);
        let energies: Vec<f64> = orbits
            .iter()
            .map(|o| if o.representative.species_count(0) == 1 { 1.0 } else { 0.0 })
            .collect();
        let tables = interactions::build(&orbits, &vector_bases, &energies, &species, &sc).unwrap();
        (tables, species, sc)
    }

    #[test]
    fn off_counts_stay_consistent_across_many_random_sweeps() {
        let (tables, species, sc) = single_site_tables();
        let occupancy = vec![0, 0, 0, 1, 1, 1, 2, 0];
        assert_eq!(occupancy.len(), sc.num_sites);
        let mut state = State::new(occupancy, species.num_species(), species.vac_spec).unwrap();
        let mut off = OffSiteCounts::recompute(&state, &tables);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..200 {
            sweep(&mut state, &mut off, &tables, species.num_species(), 1.0, 1, &mut rng);
            check_offsite_invariant(&state, &off, &tables).unwrap();
            state.check_vacancy_invariant().unwrap();
        }
    }

    #[test]
    fn pick_swap_pair_never_selects_the_vacancy_species() {
        let (_, species, sc) = single_site_tables();
        let occupancy = vec![0, 2, 1, 1, 1, 1, 1, 1];
        assert_eq!(occupancy.len(), sc.num_sites);
        let state = State::new(occupancy, species.num_species(), species.vac_spec).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..200 {
            let (site_a, site_b) = pick_swap_pair(&state, species.num_species(), &mut rng).unwrap();
            assert_ne!(state.occupancy[site_a], species.vac_spec);
            assert_ne!(state.occupancy[site_b], species.vac_spec);
        }
    }

    #[test]
    fn probe_then_revert_is_idempotent() {
        let (tables, species, sc) = single_site_tables();
        let occupancy = vec![0, 0, 0, 1, 1, 1, 2, 0];
        assert_eq!(occupancy.len(), sc.num_sites);
        let mut state = State::new(occupancy.clone(), species.num_species(), species.vac_spec).unwrap();
        let mut off = OffSiteCounts::recompute(&state, &tables);
        let off_before = off.off.clone();

        let _delta = probe_swap(&mut state, &mut off, &tables, 0, 3);
        revert_swap(&mut state, &mut off, &tables, 0, 3);

        assert_eq!(state.occupancy, occupancy);
        assert_eq!(off.off, off_before);
    }
}
