//! L7: KRA (kinetically resolved activation) expander.
//!
//! Builds, for each symmetry-distinct vacancy jump, a template of
//! transition-state interactions expressed as site offsets relative to the
//! vacancy's own site (spec §4.6). The sampler looks these up once per jump
//! type and translates them by the vacancy's actual site at runtime, the
//! same way L6's dense tables are translated through the full supercell at
//! compile time.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::compiler::enumerator::species_tuples;
use crate::core::cluster::GeometricOrbit;
use crate::core::lattice::{RVec, SiteLabel};
use crate::core::species::SpeciesAlphabet;
use crate::core::symmetry::{SymmetryGroup, SymmetryOp};
use crate::error::BuildError;

/// A symmetry-distinct vacancy jump: hop from a vacancy at
/// `(from_basis, 0)` to a neighbour at `(to_basis, displacement)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpTemplate {
    pub from_basis: usize,
    pub to_basis: usize,
    pub displacement: RVec,
}

/// Site-offset-relative transition-state interaction tables for one jump
/// template.
#[derive(Debug, Clone, Default)]
pub struct JumpInteractionTables {
    pub num_sites_ts_interacts: Vec<usize>,
    /// Site offsets relative to the vacancy at `(from_basis, 0)`.
    pub ts_interact_sites: Vec<Vec<SiteLabel>>,
    pub ts_interact_specs: Vec<Vec<usize>>,
    pub jump_to_kra_energy: Vec<f64>,
    /// Images of this jump under its own point group, including the
    /// identity image.
    pub num_jump_point_groups: usize,
    /// Per point-group image, how many TS interactions belong to it.
    pub num_ts_interacts_in_pt_groups: Vec<usize>,
    /// Per point-group image, the TS-interaction indices belonging to it.
    pub jump_interacts: Vec<Vec<usize>>,
}

impl JumpInteractionTables {
    pub fn num_ts_interactions(&self) -> usize {
        self.num_sites_ts_interacts.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KraExpansion {
    pub jumps: Vec<JumpInteractionTables>,
    /// Per-species constant term added to every jump's `ΔE_KRA` before its
    /// transition-state interactions are summed in (spec §4.4/§4.7 step 2),
    /// indexed by the species ending up at the jump's destination site.
    /// `kra_spec_constants[vacSpec]` must be exactly zero.
    pub kra_spec_constants: Vec<f64>,
}

fn canonical_key(sites: &[SiteLabel], species: &[usize]) -> Vec<(usize, i64, i64, i64, usize)> {
    let mut key: Vec<(usize, i64, i64, i64, usize)> = sites
        .iter()
        .zip(species.iter())
        .map(|(s, &sp)| (s.basis, s.r.x, s.r.y, s.r.z, sp))
        .collect();
    key.sort_unstable();
    key
}

/// The subgroup of `symmetry` fixing both endpoints of `jump` (spec §9's
/// "jump's own point group", distinct from a cluster orbit's stabiliser).
fn jump_point_group(jump: &JumpTemplate, symmetry: &SymmetryGroup) -> Vec<SymmetryOp> {
    let origin = SiteLabel::new(jump.from_basis, RVec::zero());
    let target = SiteLabel::new(jump.to_basis, jump.displacement);
    symmetry
        .ops
        .iter()
        .filter(|op| op.apply_site_unwrapped(origin) == origin && op.apply_site_unwrapped(target) == target)
        .cloned()
        .collect()
}

/// Expands the transition-state cluster orbits attached to one jump
/// template into its dense interaction tables.
///
/// `ts_geometric_orbits` are candidate TS-active clusters around the jump,
/// expressed as site offsets relative to the vacancy's own site (the same
/// shape as L3/L4's geometric orbit input, but local to this jump rather
/// than global to the crystal). `kra_coeffs[i]` is the KRA energy
/// coefficient for the `i`-th such orbit.
pub fn build_one(
    jump: &JumpTemplate,
    ts_geometric_orbits: &[GeometricOrbit],
    species: &SpeciesAlphabet,
    kra_coeffs: &[f64],
    symmetry: &SymmetryGroup,
) -> Result<JumpInteractionTables, BuildError> {
    let point_group = jump_point_group(jump, symmetry);
    let mut tables = JumpInteractionTables {
        num_jump_point_groups: point_group.len(),
        num_ts_interacts_in_pt_groups: vec![0; point_group.len()],
        jump_interacts: vec![Vec::new(); point_group.len()],
        ..Default::default()
    };

    for (orbit_idx, orbit) in ts_geometric_orbits.iter().enumerate() {
        let kra = *kra_coeffs
            .get(orbit_idx)
            .ok_or(BuildError::MissingCoefficient(orbit_idx))?;
        let rep = match orbit.first() {
            Some(c) => c,
            None => continue,
        };
        let k = rep.sites.len();

        for decoration in species_tuples(k, species.num_species()) {
            let vac_count = decoration.iter().filter(|&&s| species.is_vacancy(s)).count();
            if vac_count > 1 {
                continue;
            }

            // Dedupes this decoration's own point-group orbit: distinct
            // operations can map the representative onto the same site
            // tuple when it is a fixed point of more than one of them.
            let mut seen_in_orbit: HashSet<Vec<(usize, i64, i64, i64, usize)>> = HashSet::new();

            for (pt_idx, op) in point_group.iter().enumerate() {
                let transformed_sites: Vec<SiteLabel> = rep
                    .sites
                    .iter()
                    .map(|s| op.apply_site_unwrapped(*s))
                    .collect();
                let transformed_key = canonical_key(&transformed_sites, &decoration);
                if !seen_in_orbit.insert(transformed_key) {
                    continue;
                }

                let interaction_idx = tables.num_ts_interactions();
                tables.num_sites_ts_interacts.push(k);
                tables.ts_interact_sites.push(transformed_sites);
                tables.ts_interact_specs.push(decoration.clone());
                tables.jump_to_kra_energy.push(kra);

                tables.num_ts_interacts_in_pt_groups[pt_idx] += 1;
                tables.jump_interacts[pt_idx].push(interaction_idx);
            }
        }
    }

    Ok(tables)
}

/// One symmetry image of a jump template: the full set of directions a
/// vacancy can hop in, reached by expanding each canonical template through
/// the full crystal symmetry group (distinct from that template's own
/// stabilising point group used in `build_one`).
#[derive(Debug, Clone)]
pub struct ConcreteJump {
    pub template_idx: usize,
    pub from_basis: usize,
    pub to_basis: usize,
    pub displacement: RVec,
    /// The symmetry operation carrying the template onto this image, used
    /// to transform its TS-interaction site offsets at evaluation time.
    pub op: SymmetryOp,
    /// Image of the template's own vacancy origin `(from_basis, 0)` under
    /// `op`; offsets are re-centred on this before being read off.
    pub from_image: SiteLabel,
}

impl ConcreteJump {
    /// Transforms a TS-interaction site offset (relative to the template's
    /// vacancy origin) into the equivalent offset relative to this image's
    /// vacancy origin.
    pub fn transform_offset(&self, offset: SiteLabel) -> SiteLabel {
        let image = self.op.apply_site_unwrapped(offset);
        SiteLabel::new(image.basis, image.r - self.from_image.r)
    }
}

/// Expands every jump template into its full star of symmetry-equivalent
/// hop directions.
pub fn expand_jump_star(jumps: &[JumpTemplate], symmetry: &SymmetryGroup) -> Vec<ConcreteJump> {
    let mut seen: HashSet<(usize, usize, i64, i64, i64)> = HashSet::new();
    let mut out = Vec::new();
    for (idx, jump) in jumps.iter().enumerate() {
        for op in &symmetry.ops {
            let from_image = op.apply_site_unwrapped(SiteLabel::new(jump.from_basis, RVec::zero()));
            let to_image = op.apply_site_unwrapped(SiteLabel::new(jump.to_basis, jump.displacement));
            let displacement = to_image.r - from_image.r;
            let key = (from_image.basis, to_image.basis, displacement.x, displacement.y, displacement.z);
            if seen.insert(key) {
                out.push(ConcreteJump {
                    template_idx: idx,
                    from_basis: from_image.basis,
                    to_basis: to_image.basis,
                    displacement,
                    op: op.clone(),
                    from_image,
                });
            }
        }
    }
    out
}

pub fn build(
    jumps: &[JumpTemplate],
    ts_geometric_orbits_per_jump: &[Vec<GeometricOrbit>],
    species: &SpeciesAlphabet,
    kra_coeffs_per_jump: &[Vec<f64>],
    kra_spec_constants: &[f64],
    symmetry: &SymmetryGroup,
) -> Result<KraExpansion, BuildError> {
    if let Some(&value) = kra_spec_constants.get(species.vac_spec) {
        if value.abs() > 1e-12 {
            return Err(BuildError::VacSpecConstantNonzero {
                vac_spec: species.vac_spec,
                value,
            });
        }
    }

    let mut expansion = KraExpansion {
        kra_spec_constants: kra_spec_constants.to_vec(),
        ..Default::default()
    };
    for (i, jump) in jumps.iter().enumerate() {
        let orbits = &ts_geometric_orbits_per_jump[i];
        let coeffs = &kra_coeffs_per_jump[i];
        expansion
            .jumps
            .push(build_one(jump, orbits, species, coeffs, symmetry)?);
    }
    Ok(expansion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cluster::GeometricCluster;

    fn simple_cubic_nn_jump() -> JumpTemplate {
        JumpTemplate {
            from_basis: 0,
            to_basis: 0,
            displacement: RVec::new(1, 0, 0),
        }
    }

    #[test]
    fn rejects_nonzero_kra_spec_constant_for_vacancy_species() {
        let jump = simple_cubic_nn_jump();
        let species = SpeciesAlphabet::new(vec!["A".into(), "Vac".into()], 1).unwrap();
        let group = SymmetryGroup::new(vec![SymmetryOp::identity(1)]);
        let bare_orbit: GeometricOrbit = vec![GeometricCluster {
            sites: vec![SiteLabel::new(0, RVec::zero())],
        }];

        let err = build(
            &[jump],
            &[vec![bare_orbit]],
            &species,
            &[vec![0.0]],
            &[0.0, 0.5],
            &group,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::VacSpecConstantNonzero { vac_spec: 1, .. }));
    }

    #[test]
    fn zero_kra_spec_constant_for_vacancy_species_is_accepted_and_stored() {
        let jump = simple_cubic_nn_jump();
        let species = SpeciesAlphabet::new(vec!["A".into(), "Vac".into()], 1).unwrap();
        let group = SymmetryGroup::new(vec![SymmetryOp::identity(1)]);
        let bare_orbit: GeometricOrbit = vec![GeometricCluster {
            sites: vec![SiteLabel::new(0, RVec::zero())],
        }];

        let expansion = build(
            &[jump],
            &[vec![bare_orbit]],
            &species,
            &[vec![0.0]],
            &[0.3, 0.0],
            &group,
        )
        .unwrap();
        assert_eq!(expansion.kra_spec_constants, vec![0.3, 0.0]);
    }

    #[test]
    fn repeated_point_group_images_do_not_duplicate_interactions() {
        let jump = simple_cubic_nn_jump();
        let species = SpeciesAlphabet::new(vec!["A".into(), "B".into()], 1).unwrap();
        // Two point-group images that both fix the representative exactly:
        // the second image must be dropped as a duplicate, not double-counted.
        let group = SymmetryGroup::new(vec![SymmetryOp::identity(1), SymmetryOp::identity(1)]);

        let pair_orbit: GeometricOrbit = vec![GeometricCluster {
            sites: vec![
                SiteLabel::new(0, RVec::zero()),
                SiteLabel::new(0, RVec::new(1, 0, 0)),
            ],
        }];

        let tables = build_one(&jump, &[pair_orbit], &species, &[1.0], &group).unwrap();
        // 3 surviving decorations (A,A)/(A,B)/(B,A) -- (B,B) has 2 vacancies
        // and is rejected -- each contributing exactly one interaction since
        // both point-group images collapse onto the same site tuple.
        assert_eq!(tables.num_ts_interactions(), 3);
    }

    #[test]
    fn expand_jump_star_under_identity_keeps_single_image() {
        let jump = simple_cubic_nn_jump();
        let group = SymmetryGroup::new(vec![SymmetryOp::identity(1)]);
        let star = expand_jump_star(&[jump], &group);
        assert_eq!(star.len(), 1);
        assert_eq!(star[0].displacement, RVec::new(1, 0, 0));
    }

    #[test]
    fn expand_jump_star_under_inversion_adds_opposite_direction() {
        let jump = simple_cubic_nn_jump();
        let group = SymmetryGroup::new(vec![
            SymmetryOp::identity(1),
            SymmetryOp {
                basis_permutation: vec![0],
                rot_int: [[-1, 0, 0], [0, -1, 0], [0, 0, -1]],
                trans: RVec::zero(),
                rot_cart: nalgebra::Matrix3::identity() * -1.0,
            },
        ]);
        let star = expand_jump_star(&[jump], &group);
        assert_eq!(star.len(), 2);
        assert!(star.iter().any(|cj| cj.displacement == RVec::new(-1, 0, 0)));
    }
}
