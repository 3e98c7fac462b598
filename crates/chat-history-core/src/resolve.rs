//! Version resolution: pick one canonical version per logical key.
//!
//! Resolution is a pure reducer over the versions of a key. The winner is the
//! maximum under [`precedence`], a total order over properties of the versions
//! themselves, so the outcome never depends on the order records were read.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ResolutionMode;
use crate::model::{canonical_json, RawRecord, StoreName};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Greatest update marker wins.
    LatestMarker,
    /// Any live version beats every deleted one; greatest marker within each side.
    PreferLive,
    /// Greatest marker wins; on equal markers a live profile beats a deleted one,
    /// then a profile carrying a `realname` beats one without.
    MemberProfile,
}

impl SelectionPolicy {
    #[must_use]
    pub fn for_store(store: StoreName) -> Self {
        match store {
            StoreName::Member => Self::MemberProfile,
            StoreName::Chat => Self::LatestMarker,
            StoreName::ChatMessage => Self::PreferLive,
        }
    }
}

fn has_realname(record: &RawRecord) -> bool {
    record
        .value
        .get("realname")
        .and_then(Value::as_str)
        .is_some_and(|realname| !realname.is_empty())
}

/// Compare two versions of the same key; `Greater` means `lhs` is preferred.
#[must_use]
pub fn precedence(policy: SelectionPolicy, lhs: &RawRecord, rhs: &RawRecord) -> Ordering {
    let liveness = match policy {
        SelectionPolicy::PreferLive => (!lhs.deleted).cmp(&!rhs.deleted),
        SelectionPolicy::LatestMarker | SelectionPolicy::MemberProfile => Ordering::Equal,
    };
    let profile = || match policy {
        SelectionPolicy::MemberProfile => (!lhs.deleted)
            .cmp(&!rhs.deleted)
            .then_with(|| has_realname(lhs).cmp(&has_realname(rhs))),
        SelectionPolicy::LatestMarker | SelectionPolicy::PreferLive => Ordering::Equal,
    };

    liveness
        .then_with(|| lhs.update_marker.cmp(&rhs.update_marker))
        .then_with(profile)
        .then_with(|| canonical_json(&lhs.value).cmp(&canonical_json(&rhs.value)))
        .then_with(|| rhs.original_store_index.cmp(&lhs.original_store_index))
}

/// Select the canonical version among all versions of one logical key.
#[must_use]
pub fn resolve_versions<'a>(
    policy: SelectionPolicy,
    versions: &[&'a RawRecord],
) -> Option<&'a RawRecord> {
    versions.iter().copied().fold(None, |best, candidate| match best {
        Some(current) if precedence(policy, candidate, current) != Ordering::Greater => {
            Some(current)
        }
        _ => Some(candidate),
    })
}

/// Group records by logical key.
#[must_use]
pub fn group_by_key<'a>(
    records: impl IntoIterator<Item = &'a RawRecord>,
) -> BTreeMap<&'a str, Vec<&'a RawRecord>> {
    let mut groups: BTreeMap<&'a str, Vec<&'a RawRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.logical_key.as_str()).or_default().push(record);
    }
    groups
}

/// Resolve a whole store.
///
/// In [`ResolutionMode::Deduplicate`] one canonical version per key is kept; in
/// [`ResolutionMode::PreserveDuplicates`] every record is kept. Either way the
/// result is ordered by `original_store_index`.
#[must_use]
pub fn resolve_store<'a>(
    records: impl IntoIterator<Item = &'a RawRecord>,
    policy: SelectionPolicy,
    mode: ResolutionMode,
) -> Vec<&'a RawRecord> {
    let mut selected = match mode {
        ResolutionMode::PreserveDuplicates => records.into_iter().collect::<Vec<_>>(),
        ResolutionMode::Deduplicate => group_by_key(records)
            .values()
            .filter_map(|versions| resolve_versions(policy, versions))
            .collect::<Vec<_>>(),
    };
    selected.sort_by(|lhs, rhs| {
        lhs.original_store_index
            .cmp(&rhs.original_store_index)
            .then_with(|| lhs.logical_key.cmp(&rhs.logical_key))
    });
    selected
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::model::UpdateMarker;

    fn version(
        key: &str,
        marker: Option<i64>,
        deleted: bool,
        index: usize,
        value: Value,
    ) -> RawRecord {
        RawRecord {
            store: StoreName::ChatMessage,
            logical_key: key.to_string(),
            value,
            update_marker: marker.map(UpdateMarker),
            deleted,
            original_store_index: index,
        }
    }

    fn seeded_permutation(records: &[RawRecord], seed: u64) -> Vec<RawRecord> {
        fn splitmix64(mut value: u64) -> u64 {
            value = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
            value = (value ^ (value >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            value = (value ^ (value >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            value ^ (value >> 31)
        }

        let mut keyed = records
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, record)| {
                let index_u64 = u64::try_from(index).unwrap_or(u64::MAX);
                (splitmix64(seed ^ index_u64), record)
            })
            .collect::<Vec<_>>();
        keyed.sort_by_key(|(key, _)| *key);
        keyed.into_iter().map(|(_, record)| record).collect()
    }

    fn selected_indexes(records: &[RawRecord], policy: SelectionPolicy) -> Vec<usize> {
        resolve_store(records, policy, ResolutionMode::Deduplicate)
            .into_iter()
            .map(|record| record.original_store_index)
            .collect()
    }

    #[test]
    fn latest_live_version_wins_over_newer_deleted_one() {
        let records = vec![
            version("m1", Some(10), false, 0, json!({"gid": "m1", "content": "first"})),
            version("m1", Some(20), true, 1, json!({"gid": "m1", "content": "gone"})),
            version("m1", Some(15), false, 2, json!({"gid": "m1", "content": "edited"})),
        ];
        let refs = records.iter().collect::<Vec<_>>();

        let selected = resolve_versions(SelectionPolicy::PreferLive, &refs);
        assert_eq!(selected.and_then(|record| record.update_marker), Some(UpdateMarker(15)));
    }

    #[test]
    fn all_deleted_versions_resolve_to_latest_deleted() {
        let records = vec![
            version("m1", Some(5), true, 0, json!({"n": 1})),
            version("m1", Some(9), true, 1, json!({"n": 2})),
        ];
        let refs = records.iter().collect::<Vec<_>>();

        let selected = resolve_versions(SelectionPolicy::PreferLive, &refs);
        assert_eq!(selected.map(|record| record.original_store_index), Some(1));
    }

    #[test]
    fn latest_marker_policy_ignores_deleted_flag() {
        let records = vec![
            version("c1", Some(5), false, 0, json!({"n": 1})),
            version("c1", Some(9), true, 1, json!({"n": 2})),
        ];
        assert_eq!(selected_indexes(&records, SelectionPolicy::LatestMarker), vec![1]);
    }

    #[test]
    fn missing_marker_never_beats_present_marker() {
        let records = vec![
            version("m1", None, false, 0, json!({"z": "zzz"})),
            version("m1", Some(0), false, 1, json!({"a": "aaa"})),
        ];
        assert_eq!(selected_indexes(&records, SelectionPolicy::PreferLive), vec![1]);
    }

    #[test]
    fn equal_markers_break_ties_on_canonical_value_then_read_order() {
        let records = vec![
            version("m1", Some(7), false, 0, json!({"content": "a"})),
            version("m1", Some(7), false, 1, json!({"content": "b"})),
        ];
        assert_eq!(selected_indexes(&records, SelectionPolicy::PreferLive), vec![1]);

        let reversed = vec![records[1].clone(), records[0].clone()];
        assert_eq!(selected_indexes(&reversed, SelectionPolicy::PreferLive), vec![1]);

        let identical = vec![
            version("m1", Some(7), false, 3, json!({"content": "same"})),
            version("m1", Some(7), false, 8, json!({"content": "same"})),
        ];
        assert_eq!(selected_indexes(&identical, SelectionPolicy::PreferLive), vec![3]);
    }

    #[test]
    fn member_profiles_prefer_live_then_named_versions_on_equal_markers() {
        let records = vec![
            version("1", None, false, 0, json!({"id": 1, "account": "alice", "realname": "Alice"})),
            version("1", None, false, 1, json!({"id": 1, "account": "alice"})),
            version("2", None, false, 2, json!({"id": 2, "account": "bob"})),
            version("2", None, true, 3, json!({"id": 2, "account": "bob", "realname": "Bob"})),
        ];
        assert_eq!(selected_indexes(&records, SelectionPolicy::MemberProfile), vec![0, 2]);

        let blank = vec![
            version("3", Some(4), false, 0, json!({"id": 3, "realname": "Carol"})),
            version("3", Some(4), false, 1, json!({"id": 3, "realname": ""})),
        ];
        assert_eq!(selected_indexes(&blank, SelectionPolicy::MemberProfile), vec![0]);
    }

    #[test]
    fn member_profile_marker_outranks_liveness_and_realname() {
        let records = vec![
            version("1", Some(1), false, 0, json!({"id": 1, "realname": "Alice"})),
            version("1", Some(2), true, 1, json!({"id": 1})),
        ];
        assert_eq!(selected_indexes(&records, SelectionPolicy::MemberProfile), vec![1]);
    }

    #[test]
    fn member_store_uses_member_profile_policy() {
        assert_eq!(SelectionPolicy::for_store(StoreName::Member), SelectionPolicy::MemberProfile);
        assert_eq!(SelectionPolicy::for_store(StoreName::Chat), SelectionPolicy::LatestMarker);
    }

    #[test]
    fn preserve_duplicates_keeps_every_version_in_read_order() {
        let records = vec![
            version("m2", Some(1), false, 4, json!({})),
            version("m1", Some(1), false, 1, json!({})),
            version("m1", Some(2), true, 2, json!({})),
        ];
        let rows = resolve_store(
            &records,
            SelectionPolicy::PreferLive,
            ResolutionMode::PreserveDuplicates,
        );
        assert_eq!(
            rows.iter().map(|record| record.original_store_index).collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
    }

    #[test]
    fn empty_store_resolves_to_nothing() {
        let records: Vec<RawRecord> = Vec::new();
        assert!(resolve_store(&records, SelectionPolicy::PreferLive, ResolutionMode::Deduplicate)
            .is_empty());
    }

    fn arb_versions() -> impl Strategy<Value = Vec<RawRecord>> {
        prop::collection::vec(
            (0_u8..4, prop::option::of(0_i64..6), any::<bool>(), 0_u8..3),
            0..24,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(index, (key, marker, deleted, content))| {
                    version(
                        &format!("k{key}"),
                        marker,
                        deleted,
                        index,
                        json!({"content": format!("c{content}")}),
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn property_resolution_is_invariant_under_permutation(
            records in arb_versions(),
            seed in any::<u64>(),
        ) {
            let permuted = seeded_permutation(&records, seed);
            for policy in [
                SelectionPolicy::PreferLive,
                SelectionPolicy::LatestMarker,
                SelectionPolicy::MemberProfile,
            ] {
                prop_assert_eq!(
                    selected_indexes(&records, policy),
                    selected_indexes(&permuted, policy)
                );
            }
        }

        #[test]
        fn property_live_version_always_wins_when_present(records in arb_versions()) {
            for (key, versions) in group_by_key(&records) {
                let Some(selected) = resolve_versions(SelectionPolicy::PreferLive, &versions) else {
                    continue;
                };
                if versions.iter().any(|record| !record.deleted) {
                    prop_assert!(!selected.deleted, "key {} resolved to a deleted version", key);
                }
            }
        }

        #[test]
        fn property_duplicate_mode_keeps_row_count(records in arb_versions()) {
            let rows = resolve_store(
                &records,
                SelectionPolicy::PreferLive,
                ResolutionMode::PreserveDuplicates,
            );
            prop_assert_eq!(rows.len(), records.len());
        }

        #[test]
        fn property_dedup_yields_one_row_per_key(records in arb_versions()) {
            let rows =
                resolve_store(&records, SelectionPolicy::LatestMarker, ResolutionMode::Deduplicate);
            prop_assert_eq!(rows.len(), group_by_key(&records).len());
        }
    }
}
