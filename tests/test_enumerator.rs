//! Integration coverage for L4's two `ClusterVacancyPolicy` variants,
//! exercised through the full compile pipeline rather than `enumerate`
//! in isolation.

mod common;

use vkmc_core::compiler::enumerator::ClusterVacancyPolicy;
use vkmc_core::compiler::pipeline::compile;

#[test]
fn all_clusters_policy_keeps_decorations_with_the_vacancy_at_either_site() {
    let input = common::minimal_compiler_input(
        3,
        vec!["A".into(), "Vac".into()],
        1,
        common::identity_group(),
        ClusterVacancyPolicy::AllClusters,
        vec![1.0, 0.0],
    );
    let compiled = compile(&input).unwrap();

    let pair_orbits: Vec<_> = compiled
        .decorated_orbits
        .iter()
        .filter(|o| o.geometric_orbit == 0)
        .collect();

    // (A,A), (A,Vac), (Vac,A): three singleton orbits under the identity
    // group, with no symmetry available to merge (A,Vac) into (Vac,A).
    assert_eq!(pair_orbits.len(), 3);
    for o in &pair_orbits {
        assert_eq!(o.members.len(), 1);
    }

    let vacancy_not_at_origin = pair_orbits.iter().any(|o| {
        o.representative.sorted_pairs().first().map(|(_, sp)| *sp) != Some(input.vac_spec)
    });
    assert!(
        vacancy_not_at_origin,
        "AllClusters must keep at least one decoration whose canonical first site isn't the vacancy"
    );
}

#[test]
fn vacancy_at_origin_only_policy_keeps_only_vacancy_first_decorations() {
    let input = common::minimal_compiler_input(
        3,
        vec!["A".into(), "Vac".into()],
        1,
        common::identity_group(),
        ClusterVacancyPolicy::VacancyAtOriginOnly,
        vec![1.0, 0.0],
    );
    let compiled = compile(&input).unwrap();

    let pair_orbits: Vec<_> = compiled
        .decorated_orbits
        .iter()
        .filter(|o| o.geometric_orbit == 0)
        .collect();

    assert!(!pair_orbits.is_empty());
    for o in &pair_orbits {
        let first_species = o.representative.sorted_pairs().first().map(|(_, sp)| *sp);
        assert_eq!(first_species, Some(input.vac_spec));
    }
}

#[test]
fn vacancy_at_origin_only_never_keeps_more_orbits_than_all_clusters() {
    let all = compile(&common::minimal_compiler_input(
        3,
        vec!["A".into(), "Vac".into()],
        1,
        common::identity_group(),
        ClusterVacancyPolicy::AllClusters,
        vec![1.0, 0.0],
    ))
    .unwrap();
    let vac_only = compile(&common::minimal_compiler_input(
        3,
        vec!["A".into(), "Vac".into()],
        1,
        common::identity_group(),
        ClusterVacancyPolicy::VacancyAtOriginOnly,
        vec![1.0, 0.0],
    ))
    .unwrap();

    assert!(vac_only.decorated_orbits.len() <= all.decorated_orbits.len());
    assert!(vac_only.tables.num_interactions() <= all.tables.num_interactions());
}
