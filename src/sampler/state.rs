//! C1: occupancy state, per-species location table, and off-site counter.
//!
//! `State` keeps a species-indexed location table (site indices per species)
//! so the sweep and trajectory engines can draw a random site of a given
//! species in O(1), instead of the rejection sampling the original source
//! used (spec §9 design note). `OffSiteCounts` tracks, per compiled
//! interaction, how many of its sites currently disagree with the
//! interaction's required decoration; an interaction contributes to the
//! energy/vector sums exactly when its off-count is zero.

use std::collections::HashSet;

use crate::compiler::interactions::InteractionTables;
use crate::error::{BuildError, InvariantViolation};

/// Site occupancy plus a species -> site-list index for O(1) sampling.
#[derive(Debug, Clone)]
pub struct State {
    /// `occupancy[site]` is the species occupying that site.
    pub occupancy: Vec<usize>,
    pub vac_spec: usize,
    /// `locations[spec]` lists every site currently occupied by `spec`.
    locations: Vec<Vec<usize>>,
    /// `location_index[site]` is `site`'s position within
    /// `locations[occupancy[site]]`, kept in sync for O(1) removal.
    location_index: Vec<usize>,
}

impl State {
    pub fn new(occupancy: Vec<usize>, num_species: usize, vac_spec: usize) -> Result<Self, BuildError> {
        let vac_count = occupancy.iter().filter(|&&s| s == vac_spec).count();
        if vac_count != 1 {
            return Err(BuildError::VacancyCountNotOneAtInit(vac_count));
        }
        let mut locations = vec![Vec::new(); num_species];
        let mut location_index = vec![0usize; occupancy.len()];
        for (site, &spec) in occupancy.iter().enumerate() {
            location_index[site] = locations[spec].len();
            locations[spec].push(site);
        }
        Ok(Self {
            occupancy,
            vac_spec,
            locations,
            location_index,
        })
    }

    pub fn num_sites(&self) -> usize {
        self.occupancy.len()
    }

    pub fn vacancy_site(&self) -> usize {
        self.locations[self.vac_spec][0]
    }

    pub fn sites_of(&self, spec: usize) -> &[usize] {
        &self.locations[spec]
    }

    /// Removes `site` from its current species' location list via
    /// swap-remove, patching the index of whichever entry got moved.
    fn remove_from_locations(&mut self, site: usize) {
        let spec = self.occupancy[site];
        let idx = self.location_index[site];
        let list = &mut self.locations[spec];
        let last = list.len() - 1;
        list.swap(idx, last);
        let moved_site = list[idx];
        list.pop();
        self.location_index[moved_site] = idx;
    }

    fn insert_into_locations(&mut self, site: usize, spec: usize) {
        self.location_index[site] = self.locations[spec].len();
        self.locations[spec].push(site);
    }

    /// Sets `site`'s occupying species directly, maintaining the location
    /// table. Returns the species that previously occupied `site`.
    pub fn set_species(&mut self, site: usize, spec: usize) -> usize {
        let old = self.occupancy[site];
        if old == spec {
            return old;
        }
        self.remove_from_locations(site);
        self.occupancy[site] = spec;
        self.insert_into_locations(site, spec);
        old
    }

    /// Swaps the species occupying two sites.
    pub fn swap_sites(&mut self, site_a: usize, site_b: usize) {
        if site_a == site_b {
            return;
        }
        let spec_a = self.occupancy[site_a];
        let spec_b = self.occupancy[site_b];
        self.set_species(site_a, spec_b);
        self.set_species(site_b, spec_a);
    }

    pub fn check_vacancy_invariant(&self) -> Result<(), InvariantViolation> {
        let count = self.locations[self.vac_spec].len();
        if count != 1 {
            return Err(InvariantViolation::VacancyCountNotOne(count));
        }
        Ok(())
    }
}

/// Off-site counts for every compiled interaction: `off[k] == 0` iff
/// interaction `k` is fully "on" (every site matches its required species).
#[derive(Debug, Clone)]
pub struct OffSiteCounts {
    pub off: Vec<i64>,
}

impl OffSiteCounts {
    /// Rebuilds the off-site counts from scratch by directly comparing
    /// state occupancy against every interaction's required decoration.
    /// Used at startup, after checkpoint reload, and as a debug-mode
    /// invariant check against the incrementally maintained counts.
    pub fn recompute(state: &State, tables: &InteractionTables) -> Self {
        let off = tables
            .spec_on_interact_sites
            .iter()
            .zip(tables.sup_sites_interacts.iter())
            .map(|(specs, sites)| {
                specs
                    .iter()
                    .zip(sites.iter())
                    .filter(|(&required, &site)| state.occupancy[site] != required)
                    .count() as i64
            })
            .collect();
        Self { off }
    }

    /// Applies the effect of `site`'s occupant changing from `old_spec` to
    /// `new_spec` on every interaction that references `site` with either
    /// species, without touching interactions that don't.
    pub fn apply_site_change(
        &mut self,
        tables: &InteractionTables,
        site: usize,
        old_spec: usize,
        new_spec: usize,
    ) {
        if old_spec == new_spec {
            return;
        }
        for &(inter_idx, _) in &tables.site_spec_inter_array[site][old_spec] {
            self.off[inter_idx] += 1;
        }
        for &(inter_idx, _) in &tables.site_spec_inter_array[site][new_spec] {
            self.off[inter_idx] -= 1;
        }
    }

    /// Interaction indices whose off-count can change when `site_a` and
    /// `site_b` (currently holding `spec_a`/`spec_b`) swap species.
    pub fn affected_by_swap(
        tables: &InteractionTables,
        site_a: usize,
        spec_a: usize,
        site_b: usize,
        spec_b: usize,
    ) -> Vec<usize> {
        let mut affected = HashSet::new();
        for &(idx, _) in &tables.site_spec_inter_array[site_a][spec_a] {
            affected.insert(idx);
        }
        for &(idx, _) in &tables.site_spec_inter_array[site_a][spec_b] {
            affected.insert(idx);
        }
        for &(idx, _) in &tables.site_spec_inter_array[site_b][spec_a] {
            affected.insert(idx);
        }
        for &(idx, _) in &tables.site_spec_inter_array[site_b][spec_b] {
            affected.insert(idx);
        }
        affected.into_iter().collect()
    }

    pub fn check_against_recount(&self, state: &State, tables: &InteractionTables) -> Result<(), InvariantViolation> {
        let recount = Self::recompute(state, tables);
        for (i, (&incr, &full)) in self.off.iter().zip(recount.off.iter()).enumerate() {
            if incr != full {
                return Err(InvariantViolation::OffCountMismatchAfterSweep {
                    interaction: i,
                    incremental: incr,
                    recount: full,
                });
            }
        }
        Ok(())
    }
}
