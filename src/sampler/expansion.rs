//! C4: vector cluster expansion accumulator.
//!
//! For a given state, walks every jump in the vacancy's exit set -- the same
//! candidate evaluation `sampler::kmc` does for a trajectory step -- and
//! collects each candidate's change in every vector-cluster component
//! (`Δλ`), mirroring the original source's `Expand` (rate-weighted sum over
//! `ijList`/`dxList`) rather than `getTraj`'s single-jump stepper. `W̄_ij`
//! and `b̄_i` are scalar sums over the exit set: `Σ_k rate_k (Δλ_i·Δλ_j)` and
//! `Σ_k rate_k (Δλ_i·δx_k)`, where `δx_k` is the displacement of whichever
//! species `observed_species` names (`+dx` if it's the vacancy, `-dx` if
//! it's the species moving into the vacancy's old site, zero otherwise) --
//! the same sign convention `AtomTracker::record_jump` uses for a committed
//! step, generalized here to an arbitrary tracked species instead of always
//! tracking every atom.

use nalgebra::Vector3;
use rand::Rng;

use crate::compiler::interactions::InteractionTables;
use crate::compiler::kra::{ConcreteJump, KraExpansion};
use crate::core::lattice::{Crystal, Supercell};
use crate::error::OracleError;
use crate::oracle::RateOracle;
use crate::sampler::kmc::{self, AtomTracker, JumpOutcome};
use crate::sampler::state::{OffSiteCounts, State};
use crate::sampler::sweep::{probe_swap, revert_swap};

/// Running `W̄`/`b̄` accumulators over `dim` global vector-cluster
/// components. Both are scalar: `W̄_ij` is the rate-weighted sum of
/// `Δλ_i·Δλ_j` dot products, `b̄_i` the rate-weighted sum of `Δλ_i·δx`.
#[derive(Debug, Clone)]
pub struct VectorExpansionAccumulator {
    pub dim: usize,
    /// Flattened `dim x dim` scalar matrix, `w_bar[i*dim+j]`.
    pub w_bar: Vec<f64>,
    pub b_bar: Vec<f64>,
    pub total_time: f64,
}

impl VectorExpansionAccumulator {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            w_bar: vec![0.0; dim * dim],
            b_bar: vec![0.0; dim],
            total_time: 0.0,
        }
    }

    pub fn block(&self, i: usize, j: usize) -> f64 {
        self.w_bar[i * self.dim + j]
    }

    /// Accumulates a full exit set's contribution into `W̄`/`b̄`: every
    /// candidate jump's `Δλ`, weighted by that candidate's rate (spec §4.8),
    /// not by whichever single jump residence-time sampling goes on to pick.
    pub(crate) fn accumulate_exit_set(
        &mut self,
        delta_lambdas: &[Vec<Vector3<f64>>],
        rates: &[f64],
        signed_disps: &[Vector3<f64>],
    ) {
        debug_assert_eq!(delta_lambdas.len(), rates.len());
        debug_assert_eq!(delta_lambdas.len(), signed_disps.len());
        for ((delta_lambda, &rate), disp) in delta_lambdas.iter().zip(rates).zip(signed_disps) {
            debug_assert_eq!(delta_lambda.len(), self.dim);
            for i in 0..self.dim {
                self.b_bar[i] += rate * delta_lambda[i].dot(disp);
                for j in 0..self.dim {
                    self.w_bar[i * self.dim + j] += rate * delta_lambda[i].dot(&delta_lambda[j]);
                }
            }
        }
    }

    /// `W̄` is a scalar Gram-like matrix and so symmetric by construction
    /// (`Δλ_i·Δλ_j == Δλ_j·Δλ_i`); kept as an explicit check because the
    /// sampler's debug build verifies it after every batch.
    pub fn asymmetry(&self) -> f64 {
        let mut acc = 0.0;
        for i in 0..self.dim {
            for j in 0..self.dim {
                let diff = self.block(i, j) - self.block(j, i);
                acc += diff * diff;
            }
        }
        acc.sqrt()
    }
}

/// Computes `(ΔE, Δλ)` for swapping `site_a` and `site_b`, leaving `state`
/// and `off` mutated to the post-swap configuration. Callers that don't
/// want to commit the swap must call [`crate::sampler::sweep::revert_swap`].
pub fn probe_delta_lambda(
    state: &mut State,
    off: &mut OffSiteCounts,
    tables: &InteractionTables,
    dim: usize,
    site_a: usize,
    site_b: usize,
) -> (f64, Vec<Vector3<f64>>) {
    let spec_a = state.occupancy[site_a];
    let spec_b = state.occupancy[site_b];
    let affected = OffSiteCounts::affected_by_swap(tables, site_a, spec_a, site_b, spec_b);

    let mut delta_e = 0.0;
    let mut delta_lambda = vec![Vector3::zeros(); dim];
    for &i in &affected {
        if off.off[i] == 0 {
            delta_e -= tables.interaction_to_energy[i];
            for (k, &g) in tables.vec_group_interacts[i].iter().enumerate() {
                delta_lambda[g] -= tables.vecs_interacts[i][k];
            }
        }
    }

    off.apply_site_change(tables, site_a, spec_a, spec_b);
    off.apply_site_change(tables, site_b, spec_b, spec_a);
    state.swap_sites(site_a, site_b);

    for &i in &affected {
        if off.off[i] == 0 {
            delta_e += tables.interaction_to_energy[i];
            for (k, &g) in tables.vec_group_interacts[i].iter().enumerate() {
                delta_lambda[g] += tables.vecs_interacts[i][k];
            }
        }
    }

    (delta_e, delta_lambda)
}

/// Computes one candidate jump's cartesian vacancy displacement.
fn jump_cart_disp(crystal: &Crystal, cj: &ConcreteJump) -> Vector3<f64> {
    let from_frac = crystal.basis_fractional[cj.from_basis];
    let to_frac = crystal.basis_fractional[cj.to_basis];
    crystal.lattice_vectors * (to_frac - from_frac + cj.displacement.to_cartesian_basis())
}

/// The displacement `δx` that feeds `b̄_i = Σ rate·(Δλ_i·δx)` for one
/// candidate jump, generalizing tracer correlation to an arbitrary tracked
/// species (`original_source`'s `Expand(..., spec, ...)` parameter): `+dx`
/// if `observed_species` is the vacancy itself, `-dx` if it's the species
/// the jump moves into the vacancy's old site, zero otherwise.
fn observed_displacement(
    observed_species: usize,
    vac_spec: usize,
    spec_b: usize,
    cart_disp: Vector3<f64>,
) -> Vector3<f64> {
    if observed_species == vac_spec {
        cart_disp
    } else if observed_species == spec_b {
        -cart_disp
    } else {
        Vector3::zeros()
    }
}

/// Evaluates the vacancy's full exit set from the current state, accumulates
/// its rate-weighted `W̄`/`b̄` contribution (spec §4.8), then separately
/// commits one jump by residence-time selection to advance the trajectory
/// (spec §4.7), exactly as `sampler::kmc::step` does. `observed_species`
/// selects which species' displacement feeds `b̄`.
#[allow(clippy::too_many_arguments)]
pub fn step_and_accumulate<R: Rng + ?Sized>(
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
    observed_species: usize,
    accumulator: &mut VectorExpansionAccumulator,
    rng: &mut R,
) -> Result<JumpOutcome, OracleError> {
    let vac_site = state.vacancy_site();
    let vac_label = sc.site_label(vac_site);

    let candidates = kmc::evaluate_candidates(
        state, off, tables, kra, jump_star, sc, oracle, beta, vac_site, vac_label,
    )?;

    let total_rate: f64 = candidates.iter().map(|c| c.rate).sum();
    if total_rate < kmc::RATE_FLOOR {
        return Ok(JumpOutcome::Absorbing);
    }

    let mut delta_lambdas = Vec::with_capacity(candidates.len());
    let mut signed_disps = Vec::with_capacity(candidates.len());
    let mut rates = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let cj = &jump_star[candidate.cj_index];
        let spec_b = state.occupancy[candidate.target];
        let (_, delta_lambda) =
            probe_delta_lambda(state, off, tables, accumulator.dim, vac_site, candidate.target);
        revert_swap(state, off, tables, vac_site, candidate.target);

        let cart_disp = jump_cart_disp(crystal, cj);
        let signed_disp = observed_displacement(observed_species, state.vac_spec, spec_b, cart_disp);

        delta_lambdas.push(delta_lambda);
        signed_disps.push(signed_disp);
        rates.push(candidate.rate);
    }
    accumulator.accumulate_exit_set(&delta_lambdas, &rates, &signed_disps);

    let chosen = kmc::select_by_residence_time(&candidates, total_rate, rng);
    let candidate = &candidates[chosen];
    let cj = &jump_star[candidate.cj_index];

    let _ = probe_swap(state, off, tables, vac_site, candidate.target);
    state
        .check_vacancy_invariant()
        .map_err(|e| OracleError::ProcessFailed(format!("{e}")))?;

    let cart_disp = jump_cart_disp(crystal, cj);
    atoms.record_jump(vac_site, candidate.target, cart_disp);

    let dt = -rng.gen::<f64>().ln() / total_rate;
    accumulator.total_time += dt;

    Ok(JumpOutcome::Jumped {
        template_idx: cj.template_idx,
        dt,
        atom_id: atoms.atom_at(vac_site),
        atom_disp: -cart_disp,
    })
}
