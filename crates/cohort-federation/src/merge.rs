//! Merge rules for copies of one instance returned by several members.
//!
//! For each GUID exactly one copy survives:
//!
//! 1. the copy returned by the instance's home member;
//! 2. otherwise the copy with the highest version;
//! 3. ties broken by the lexicographically lowest responding member id.
//!
//! The result does not depend on the order responses arrive in.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use cohort_core::Guid;
use cohort_core::Instance;
use cohort_core::MetadataCollectionId;

/// Whether the copy `candidate` returned by `candidate_source` beats
/// `current` returned by `current_source`.
pub fn outranks<T: Instance>(
    candidate: &T,
    candidate_source: &MetadataCollectionId,
    current: &T,
    current_source: &MetadataCollectionId,
) -> bool {
    let candidate_home = &candidate.header().home == candidate_source;
    let current_home = &current.header().home == current_source;
    let ordering = candidate_home
        .cmp(&current_home)
        .then_with(|| candidate.version().cmp(&current.version()))
        .then_with(|| current_source.cmp(candidate_source));
    ordering == Ordering::Greater
}

/// Merge per-member results into one copy per GUID, ordered by GUID.
pub fn merge_instances<T, I>(responses: I) -> Vec<T>
where
    T: Instance,
    I: IntoIterator<Item = (MetadataCollectionId, Vec<T>)>,
{
    let mut winners: BTreeMap<Guid, (MetadataCollectionId, T)> = BTreeMap::new();
    for (source, instances) in responses {
        for instance in instances {
            match winners.entry(instance.guid().clone()) {
                Entry::Vacant(slot) => {
                    slot.insert((source.clone(), instance));
                }
                Entry::Occupied(mut slot) => {
                    let (held_source, held) = slot.get();
                    if outranks(&instance, &source, held, held_source) {
                        slot.insert((source.clone(), instance));
                    }
                }
            }
        }
    }
    winners.into_values().map(|(_, instance)| instance).collect()
}

#[cfg(test)]
mod tests {
    use cohort_core::Entity;
    use proptest::prelude::*;

    use super::*;

    fn copy(guid: &str, home: &str, version: u64, tag: &str) -> Entity {
        Entity::new(Guid::new(guid), "Asset", home.into(), 0).with_version(version).with_property("tag", tag)
    }

    #[test]
    fn test_home_copy_wins_over_newer_reference_copy() {
        let merged = merge_instances(vec![
            (MetadataCollectionId::new("b"), vec![copy("g1", "a", 9, "cached")]),
            (MetadataCollectionId::new("a"), vec![copy("g1", "a", 4, "home")]),
        ]);
        assert_eq!(merged, vec![copy("g1", "a", 4, "home")]);
    }

    #[test]
    fn test_highest_version_wins_without_home() {
        let merged = merge_instances(vec![
            (MetadataCollectionId::new("b"), vec![copy("g1", "a", 2, "b")]),
            (MetadataCollectionId::new("c"), vec![copy("g1", "a", 3, "c")]),
        ]);
        assert_eq!(merged, vec![copy("g1", "a", 3, "c")]);
    }

    #[test]
    fn test_tie_goes_to_lowest_member_id() {
        let merged = merge_instances(vec![
            (MetadataCollectionId::new("d"), vec![copy("g1", "a", 2, "d")]),
            (MetadataCollectionId::new("b"), vec![copy("g1", "a", 2, "b")]),
            (MetadataCollectionId::new("c"), vec![copy("g1", "a", 2, "c")]),
        ]);
        assert_eq!(merged, vec![copy("g1", "a", 2, "b")]);
    }

    fn member_id() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string)
    }

    /// Per responding member: (guid index, version) pairs. The home of a
    /// GUID is fixed by its index.
    fn responses() -> impl Strategy<Value = Vec<(String, Vec<(u8, u64)>)>> {
        let copies = prop::collection::vec((0u8..6, 1u64..5), 0..8);
        prop::collection::vec((member_id(), copies), 0..5)
    }

    fn build(raw: &[(String, Vec<(u8, u64)>)]) -> Vec<(MetadataCollectionId, Vec<Entity>)> {
        const HOMES: [&str; 4] = ["a", "b", "c", "d"];
        raw.iter()
            .map(|(source, copies)| {
                let entities = copies
                    .iter()
                    .map(|(guid, version)| {
                        copy(&format!("g{guid}"), HOMES[*guid as usize % HOMES.len()], *version, source)
                    })
                    .collect();
                (MetadataCollectionId::new(source.as_str()), entities)
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_merge_yields_unique_guids(raw in responses()) {
            let merged = merge_instances(build(&raw));
            let mut guids: Vec<_> = merged.iter().map(|e| e.header.guid.clone()).collect();
            let total = guids.len();
            guids.dedup();
            prop_assert_eq!(guids.len(), total);

            let expected: std::collections::BTreeSet<_> =
                build(&raw).into_iter().flat_map(|(_, es)| es).map(|e| e.header.guid).collect();
            prop_assert_eq!(total, expected.len());
        }

        #[test]
        fn prop_merge_ignores_response_order(raw in responses()) {
            let forward = merge_instances(build(&raw));
            let mut reversed = build(&raw);
            reversed.reverse();
            for (_, entities) in reversed.iter_mut() {
                entities.reverse();
            }
            prop_assert_eq!(forward, merge_instances(reversed));
        }

        #[test]
        fn prop_no_copy_outranks_the_winner(raw in responses()) {
            let merged = merge_instances(build(&raw));
            for (source, entities) in build(&raw) {
                for entity in entities {
                    let winner = merged.iter().find(|w| w.header.guid == entity.header.guid);
                    prop_assert!(winner.is_some());
                    if let Some(winner) = winner {
                        let winner_source = MetadataCollectionId::new(
                            winner.properties.get("tag").and_then(|v| v.as_str()).unwrap_or_default(),
                        );
                        prop_assert!(!outranks(&entity, &source, winner, &winner_source));
                    }
                }
            }
        }
    }
}
