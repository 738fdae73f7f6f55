//! Ties L1-L7 together: takes one JSON-deserialisable `CompilerInput` and
//! runs the full compile pipeline into a `CompiledSystem` the sampler can
//! run against (spec §6's compile-time configuration surface).

use serde::{Deserialize, Serialize};

use crate::compiler::enumerator::{self, ClusterVacancyPolicy, DecoratedOrbit};
use crate::compiler::interactions::{self, InteractionTables};
use crate::compiler::kra::{self, ConcreteJump, JumpTemplate, KraExpansion};
use crate::compiler::vector_basis::{self, VectorClusterBasis};
use crate::core::cluster::GeometricOrbit;
use crate::core::lattice::{Crystal, Supercell};
use crate::core::species::SpeciesAlphabet;
use crate::core::symmetry::SymmetryGroup;
use crate::error::BuildError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerInput {
    pub crystal: Crystal,
    pub supercell_n: i64,
    pub species_names: Vec<String>,
    pub vac_spec: usize,
    pub symmetry: SymmetryGroup,
    pub geometric_orbits: Vec<GeometricOrbit>,
    pub energies: Vec<f64>,
    pub vacancy_policy: ClusterVacancyPolicy,
    pub jumps: Vec<JumpTemplate>,
    pub ts_geometric_orbits_per_jump: Vec<Vec<GeometricOrbit>>,
    pub kra_coeffs_per_jump: Vec<Vec<f64>>,
    /// Per-species constant term added to every jump's `ΔE_KRA`
    /// (`kra_spec_constants[vac_spec]` must be zero).
    pub kra_spec_constants: Vec<f64>,
    /// Per-species attempt-frequency prefactor `ν[Nspec]`
    /// (`rate_prefactors[vac_spec]` must be zero).
    pub rate_prefactors: Vec<f64>,
    /// Starting occupancy for fresh (non-checkpointed) trajectories.
    pub initial_occupancy: Vec<usize>,
}

pub struct CompiledSystem {
    pub crystal: Crystal,
    pub supercell: Supercell,
    pub species: SpeciesAlphabet,
    pub symmetry: SymmetryGroup,
    pub decorated_orbits: Vec<DecoratedOrbit>,
    pub vector_bases: Vec<VectorClusterBasis>,
    pub tables: InteractionTables,
    pub kra: KraExpansion,
    pub jump_star: Vec<ConcreteJump>,
    pub rate_prefactors: Vec<f64>,
}

impl CompiledSystem {
    pub fn vector_dim(&self) -> usize {
        self.vector_bases.iter().map(|vb| vb.num_vecs()).sum()
    }
}

pub fn compile(input: &CompilerInput) -> Result<CompiledSystem, BuildError> {
    let supercell = Supercell::new(input.supercell_n, input.crystal.num_basis())?;
    let species = SpeciesAlphabet::new(input.species_names.clone(), input.vac_spec)?;

    let decorated_orbits = enumerator::enumerate(
        &input.geometric_orbits,
        &species,
        &input.symmetry,
        &supercell,
        input.vacancy_policy,
    )?;
    let vector_bases = vector_basis::build(&decorated_orbits, &input.symmetry, &supercell);
    let tables = interactions::build(
        &decorated_orbits,
        &vector_bases,
        &input.energies,
        &species,
        &supercell,
    )?;

    let kra_expansion = kra::build(
        &input.jumps,
        &input.ts_geometric_orbits_per_jump,
        &species,
        &input.kra_coeffs_per_jump,
        &input.kra_spec_constants,
        &input.symmetry,
    )?;
    let jump_star = kra::expand_jump_star(&input.jumps, &input.symmetry);

    if let Some(&value) = input.rate_prefactors.get(species.vac_spec) {
        if value.abs() > 1e-12 {
            return Err(BuildError::VacSpecRatePrefactorNonzero {
                vac_spec: species.vac_spec,
                value,
            });
        }
    }

    Ok(CompiledSystem {
        crystal: input.crystal.clone(),
        supercell,
        species,
        symmetry: input.symmetry.clone(),
        decorated_orbits,
        vector_bases,
        tables,
        kra: kra_expansion,
        jump_star,
        rate_prefactors: input.rate_prefactors.clone(),
    })
}
