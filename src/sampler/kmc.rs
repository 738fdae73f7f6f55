//! C3: kinetic Monte Carlo trajectory engine.
//!
//! Evaluates every jump direction available to the vacancy at its current
//! site, selects one by residence-time sampling (cumulative sum over rates,
//! threshold drawn uniform in `[0, total_rate)` -- the same scheme as the
//! teacher pack's macrostate-exit sampler), commits it, and advances the
//! trajectory clock by the drawn residence time.

use nalgebra::Vector3;
use rand::Rng;

use crate::compiler::interactions::InteractionTables;
use crate::compiler::kra::{ConcreteJump, KraExpansion};
use crate::core::lattice::{Crystal, SiteLabel, Supercell};
use crate::error::{InvariantViolation, OracleError};
use crate::oracle::RateOracle;
use crate::sampler::sweep::{probe_swap, revert_swap};
use crate::sampler::state::{OffSiteCounts, State};

/// Tracks individual atom identities across vacancy-mediated swaps, which
/// pure species occupancy loses (two atoms of the same species are
/// indistinguishable to `State`). Needed for tracer-correlation statistics.
#[derive(Debug, Clone)]
pub struct AtomTracker {
    site_to_atom: Vec<usize>,
    atom_to_site: Vec<usize>,
    pub cumulative_displacement: Vec<Vector3<f64>>,
}

impl AtomTracker {
    pub fn new(num_sites: usize) -> Self {
        Self {
            site_to_atom: (0..num_sites).collect(),
            atom_to_site: (0..num_sites).collect(),
            cumulative_displacement: vec![Vector3::zeros(); num_sites],
        }
    }

    pub fn atom_at(&self, site: usize) -> usize {
        self.site_to_atom[site]
    }

    pub fn site_of(&self, atom: usize) -> usize {
        self.atom_to_site[atom]
    }

    /// Records a vacancy hop from `vac_old_site` to `target_site`, with the
    /// vacancy itself displaced by `cart_disp` (cartesian, unwrapped across
    /// the periodic boundary). The atom that occupied `target_site` is
    /// displaced by `-cart_disp`.
    ///
    /// `pub(crate)` so `sampler::expansion`'s combined select-and-accumulate
    /// step can share this bookkeeping instead of duplicating it.
    pub(crate) fn record_jump(&mut self, vac_old_site: usize, target_site: usize, cart_disp: Vector3<f64>) {
        let vac_atom = self.site_to_atom[vac_old_site];
        let neighbour_atom = self.site_to_atom[target_site];

        self.cumulative_displacement[vac_atom] += cart_disp;
        self.cumulative_displacement[neighbour_atom] -= cart_disp;

        self.site_to_atom[target_site] = vac_atom;
        self.site_to_atom[vac_old_site] = neighbour_atom;
        self.atom_to_site[vac_atom] = target_site;
        self.atom_to_site[neighbour_atom] = vac_old_site;
    }
}

/// The result of attempting one KMC step.
#[derive(Debug, Clone)]
pub enum JumpOutcome {
    /// A jump was taken: `dt` is the residence time consumed, `atom_id`
    /// identifies the atom that moved into the vacancy's old site, and
    /// `atom_disp` is that atom's cartesian displacement.
    Jumped {
        template_idx: usize,
        dt: f64,
        atom_id: usize,
        atom_disp: Vector3<f64>,
    },
    /// The total outgoing rate fell below the numerical floor; the
    /// trajectory has reached an absorbing state and should stop, not
    /// error (spec §7: structured result, not an exception).
    Absorbing,
}

/// Evaluates the KRA contribution of one concrete jump from scratch against
/// the current occupancy (mirrors the original source's from-scratch
/// transition-state off-site rebuild rather than incremental tracking,
/// since each jump only needs to be evaluated once per attempt).
pub(crate) fn delta_kra_for_jump(
    state: &State,
    sc: &Supercell,
    vac_label: SiteLabel,
    cj: &ConcreteJump,
    kra: &KraExpansion,
    target: usize,
) -> f64 {
    let ts_tables = &kra.jumps[cj.template_idx];
    let spec_b = state.occupancy[target];
    let mut total = kra.kra_spec_constants[spec_b];
    for i in 0..ts_tables.num_ts_interactions() {
        let matches = ts_tables.ts_interact_sites[i].iter().zip(ts_tables.ts_interact_specs[i].iter()).all(
            |(&offset, &spec)| {
                let transformed = cj.transform_offset(offset);
                let abs_r = sc.wrap(vac_label.r + transformed.r);
                let site = sc.site_index(SiteLabel::new(transformed.basis, abs_r));
                state.occupancy[site] == spec
            },
        );
        if matches {
            total += ts_tables.jump_to_kra_energy[i];
        }
    }
    total
}

pub(crate) fn target_site(sc: &Supercell, vac_label: SiteLabel, cj: &ConcreteJump) -> usize {
    let target = SiteLabel::new(cj.to_basis, sc.wrap(vac_label.r + cj.displacement));
    sc.site_index(target)
}

/// The numerical floor below which a total outgoing rate is treated as zero
/// (an absorbing state), shared with `sampler::expansion`'s combined step.
pub(crate) const RATE_FLOOR: f64 = 1e-8;

pub(crate) struct Candidate {
    pub(crate) cj_index: usize,
    pub(crate) target: usize,
    pub(crate) rate: f64,
}

/// Evaluates every jump direction reachable from the vacancy's current site
/// against `oracle`, without committing any of them. Shared by `step` and
/// `sampler::expansion`'s combined select-and-accumulate step.
pub(crate) fn evaluate_candidates(
    state: &mut State,
    off: &mut OffSiteCounts,
    tables: &InteractionTables,
    kra: &KraExpansion,
    jump_star: &[ConcreteJump],
    sc: &Supercell,
    oracle: &dyn RateOracle,
    beta: f64,
    vac_site: usize,
    vac_label: SiteLabel,
) -> Result<Vec<Candidate>, OracleError> {
    let mut candidates = Vec::new();
    for (idx, cj) in jump_star.iter().enumerate() {
        if cj.from_basis != vac_label.basis {
            continue;
        }
        let target = target_site(sc, vac_label, cj);
        let delta_e = probe_swap(state, off, tables, vac_site, target);
        revert_swap(state, off, tables, vac_site, target);

        let spec_b = state.occupancy[target];
        let delta_kra = delta_kra_for_jump(state, sc, vac_label, cj, kra, target);
        let barrier = 0.5 * delta_e + delta_kra;
        if barrier < 0.0 {
            log::warn!(
                "negative activation energy for jump template {}: 0.5*dE({delta_e:.6}) + dE_KRA({delta_kra:.6}) = {barrier:.6}",
                cj.template_idx
            );
        }
        let rate = oracle.rate(beta, delta_e, delta_kra, spec_b)?;
        candidates.push(Candidate {
            cj_index: idx,
            target,
            rate,
        });
    }
    Ok(candidates)
}

/// Residence-time jump selection: draws a threshold uniform in
/// `[0, total_rate)` and walks the cumulative sum of candidate rates until
/// it crosses zero.
pub(crate) fn select_by_residence_time<R: Rng + ?Sized>(
    candidates: &[Candidate],
    total_rate: f64,
    rng: &mut R,
) -> usize {
    let mut threshold = rng.gen::<f64>() * total_rate;
    let mut chosen = candidates.len() - 1;
    for (i, c) in candidates.iter().enumerate() {
        if threshold < c.rate {
            chosen = i;
            break;
        }
        threshold -= c.rate;
    }
    chosen
}

/// Attempts one KMC step: evaluates every jump direction reachable from the
/// vacancy's current basis, picks one by residence-time sampling, and
/// commits it. Returns [`JumpOutcome::Absorbing`] without mutating state if
/// the total outgoing rate is numerically negligible.
#[allow(clippy::too_many_arguments)]
pub fn step<R: Rng + ?Sized>(
    state: &mut State,
    off: &mut OffSiteCounts,
    tables: &InteractionTables,
    kra: &KraExpansion,
    jump_star: &[ConcreteJump],
    crystal: &Crystal,
    sc: &Supercell,
    atoms: &mut AtomTracker,
    oracle: &dyn RateOracle,
    beta: f64,
    rng: &mut R,
) -> Result<JumpOutcome, OracleError> {
    let vac_site = state.vacancy_site();
    let vac_label = sc.site_label(vac_site);

    let candidates = evaluate_candidates(
        state, off, tables, kra, jump_star, sc, oracle, beta, vac_site, vac_label,
    )?;

    let total_rate: f64 = candidates.iter().map(|c| c.rate).sum();
    if total_rate < RATE_FLOOR {
        return Ok(JumpOutcome::Absorbing);
    }

    let chosen = select_by_residence_time(&candidates, total_rate, rng);
    let candidate = &candidates[chosen];
    let cj = &jump_star[candidate.cj_index];
    let _ = probe_swap(state, off, tables, vac_site, candidate.target);
    state.check_vacancy_invariant().map_err(|e| {
        // Not reachable in a correctly compiled table set; surfaced via
        // OracleError::ProcessFailed since RateOracle's Result is the only
        // channel available at this call depth.
        OracleError::ProcessFailed(format!("{e}"))
    })?;

    let from_frac = crystal.basis_fractional[cj.from_basis];
    let to_frac = crystal.basis_fractional[cj.to_basis];
    let cart_disp = crystal.lattice_vectors * (to_frac - from_frac + cj.displacement.to_cartesian_basis());
    atoms.record_jump(vac_site, candidate.target, cart_disp);

    let dt = -rng.gen::<f64>().ln() / total_rate;

    Ok(JumpOutcome::Jumped {
        template_idx: cj.template_idx,
        dt,
        atom_id: atoms.atom_at(vac_site),
        atom_disp: -cart_disp,
    })
}

pub fn check_vacancy_count(state: &State) -> Result<(), InvariantViolation> {
    state.check_vacancy_invariant()
}
