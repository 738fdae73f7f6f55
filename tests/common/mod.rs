//! Shared fixture for cross-module scenario tests.
//!
//! Builds a tiny synthetic crystal -- single-basis simple-cubic, not the
//! production FCC lattice -- with a handful of symmetry operations and a
//! first-neighbour pair cluster, so every scenario test can compile a real
//! `CompiledSystem` without re-deriving crystallography by hand.

use nalgebra::{Matrix3, Vector3};

use vkmc_core::compiler::enumerator::ClusterVacancyPolicy;
use vkmc_core::compiler::kra::JumpTemplate;
use vkmc_core::compiler::pipeline::CompilerInput;
use vkmc_core::core::cluster::GeometricCluster;
use vkmc_core::core::cluster::GeometricOrbit;
use vkmc_core::core::lattice::{Crystal, RVec, SiteLabel};
use vkmc_core::core::symmetry::{SymmetryGroup, SymmetryOp};

pub fn simple_cubic_crystal() -> Crystal {
    Crystal {
        lattice_vectors: Matrix3::identity(),
        basis_fractional: vec![Vector3::zeros()],
    }
}

pub fn identity_group() -> SymmetryGroup {
    SymmetryGroup::new(vec![SymmetryOp::identity(1)])
}

/// The full cubic point group `O_h`, order 48: every signed permutation of
/// the three axes. Single basis, so `basis_permutation` is always `[0]` and
/// `trans` is always zero -- these are pure point-group operations about
/// the origin site.
pub fn full_cubic_group() -> SymmetryGroup {
    let perms: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let signs: [[i64; 3]; 8] = [
        [1, 1, 1],
        [1, 1, -1],
        [1, -1, 1],
        [1, -1, -1],
        [-1, 1, 1],
        [-1, 1, -1],
        [-1, -1, 1],
        [-1, -1, -1],
    ];
    let mut ops = Vec::with_capacity(48);
    for perm in perms {
        for sign in signs {
            let mut rot_int = [[0i64; 3]; 3];
            for (row, (&p, &s)) in perm.iter().zip(sign.iter()).enumerate() {
                rot_int[row][p] = s;
            }
            let rot_cart = Matrix3::new(
                rot_int[0][0] as f64,
                rot_int[0][1] as f64,
                rot_int[0][2] as f64,
                rot_int[1][0] as f64,
                rot_int[1][1] as f64,
                rot_int[1][2] as f64,
                rot_int[2][0] as f64,
                rot_int[2][1] as f64,
                rot_int[2][2] as f64,
            );
            ops.push(SymmetryOp {
                basis_permutation: vec![0],
                rot_int,
                trans: RVec::zero(),
                rot_cart,
            });
        }
    }
    SymmetryGroup::new(ops)
}

pub fn point_orbit_at_origin() -> GeometricOrbit {
    vec![GeometricCluster {
        sites: vec![SiteLabel::new(0, RVec::zero())],
    }]
}

pub fn nearest_neighbour_pair_orbit() -> GeometricOrbit {
    vec![GeometricCluster {
        sites: vec![SiteLabel::new(0, RVec::zero()), SiteLabel::new(0, RVec::new(1, 0, 0))],
    }]
}

/// One of the six equivalent axis-direction vacancy hops; `symmetry` is
/// expected to expand it into the full star when compiled.
pub fn axis_jump_template() -> JumpTemplate {
    JumpTemplate {
        from_basis: 0,
        to_basis: 0,
        displacement: RVec::new(1, 0, 0),
    }
}

/// All six axis-direction hops, listed explicitly so a single-operation
/// symmetry group still gives the vacancy a full simple-cubic coordination
/// shell to exit through.
pub fn all_axis_jump_templates() -> Vec<JumpTemplate> {
    [
        RVec::new(1, 0, 0),
        RVec::new(-1, 0, 0),
        RVec::new(0, 1, 0),
        RVec::new(0, -1, 0),
        RVec::new(0, 0, 1),
        RVec::new(0, 0, -1),
    ]
    .into_iter()
    .map(|displacement| JumpTemplate {
        from_basis: 0,
        to_basis: 0,
        displacement,
    })
    .collect()
}

/// A single-species-plus-vacancy `CompilerInput` with zero energies and
/// zero `ΔE_KRA` everywhere, suitable for measuring the vacancy-mediated
/// tracer correlation factor: with a uniform rate across all six hop
/// directions, the only remaining physics is the geometric correlation of
/// the vacancy mechanism itself (spec's S3, here on simple-cubic rather
/// than FCC).
pub fn tracer_compiler_input(supercell_n: i64) -> CompilerInput {
    let num_sites = (supercell_n * supercell_n * supercell_n) as usize;
    let mut initial_occupancy = vec![0usize; num_sites];
    initial_occupancy[0] = 1;
    let jumps = all_axis_jump_templates();
    let num_jumps = jumps.len();

    CompilerInput {
        crystal: simple_cubic_crystal(),
        supercell_n,
        species_names: vec!["A".into(), "Vac".into()],
        vac_spec: 1,
        symmetry: identity_group(),
        geometric_orbits: vec![nearest_neighbour_pair_orbit()],
        // Two species under `AllClusters`, identity symmetry: every
        // decoration except the double-vacancy one, i.e. 2^2 - 1.
        energies: vec![0.0; 3],
        vacancy_policy: ClusterVacancyPolicy::AllClusters,
        jumps,
        ts_geometric_orbits_per_jump: vec![vec![]; num_jumps],
        kra_coeffs_per_jump: vec![vec![]; num_jumps],
        kra_spec_constants: vec![0.0, 0.0],
        rate_prefactors: vec![1.0, 0.0],
        initial_occupancy,
    }
}

/// A minimal but complete `CompilerInput`: one pair-cluster geometric
/// orbit, one jump template with no transition-state interactions (so
/// `delta_kra` is always the per-species constant, zero here), and a
/// uniform occupancy with the vacancy on site 0.
///
/// Assumes `symmetry` is the identity-only group, so the pair cluster's
/// decorated-orbit count is exactly analytical: `num_species^2 - 1` under
/// `AllClusters` (every decoration except the double-vacancy one), or
/// `num_species - 1` under `VacancyAtOriginOnly` (the pair's lower-sorted
/// site is always the geometric origin, so only decorations with the
/// vacancy there survive). `energies` is sized to match so `compile`
/// never sees a missing-coefficient mismatch.
pub fn minimal_compiler_input(
    supercell_n: i64,
    species_names: Vec<String>,
    vac_spec: usize,
    symmetry: SymmetryGroup,
    vacancy_policy: ClusterVacancyPolicy,
    rate_prefactors: Vec<f64>,
) -> CompilerInput {
    let num_species = species_names.len();
    let num_sites = (supercell_n * supercell_n * supercell_n) as usize;
    let baseline_spec = if vac_spec == 0 { 1 } else { 0 };
    let mut initial_occupancy = vec![baseline_spec; num_sites];
    initial_occupancy[0] = vac_spec;

    let num_decorated_orbits = match vacancy_policy {
        ClusterVacancyPolicy::AllClusters => num_species * num_species - 1,
        ClusterVacancyPolicy::VacancyAtOriginOnly => num_species - 1,
    };

    CompilerInput {
        crystal: simple_cubic_crystal(),
        supercell_n,
        species_names,
        vac_spec,
        symmetry,
        geometric_orbits: vec![nearest_neighbour_pair_orbit()],
        energies: vec![0.0; num_decorated_orbits],
        vacancy_policy,
        jumps: vec![axis_jump_template()],
        ts_geometric_orbits_per_jump: vec![vec![]],
        kra_coeffs_per_jump: vec![vec![]],
        kra_spec_constants: vec![0.0; num_species],
        rate_prefactors,
        initial_occupancy,
    }
}
