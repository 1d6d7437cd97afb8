//! Keyed list merging for environments

use std::collections::HashMap;
use std::hash::Hash;

use crate::types::Environment;

/// How incoming environments combine with the workspace's existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Match by name: replace in place, append new, keep the rest
    ByName,
    /// Discard existing entries and take `incoming` as-is
    Replace,
}

impl MergePolicy {
    pub fn from_merge_flag(merge_environments: bool) -> Self {
        if merge_environments {
            MergePolicy::ByName
        } else {
            MergePolicy::Replace
        }
    }
}

/// Merge `incoming` into `existing` by key
///
/// A matching incoming entry replaces the existing one at its position,
/// unmatched incoming entries are appended in order, and existing entries
/// without a counterpart are kept. When `incoming` repeats a key the later
/// entry wins.
pub fn merge_by_key<T, K, F>(existing: Vec<T>, incoming: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut merged = existing;
    let mut positions: HashMap<K, usize> = HashMap::with_capacity(merged.len());
    for (idx, entry) in merged.iter().enumerate() {
        positions.entry(key(entry)).or_insert(idx);
    }

    for entry in incoming {
        let k = key(&entry);
        match positions.get(&k) {
            Some(&idx) => merged[idx] = entry,
            None => {
                positions.insert(k, merged.len());
                merged.push(entry);
            }
        }
    }

    merged
}

pub fn merge_environments(
    existing: Vec<Environment>,
    incoming: Vec<Environment>,
) -> Vec<Environment> {
    merge_by_key(existing, incoming, |env| env.name.clone())
}

/// Apply a merge policy
pub fn apply_policy(
    policy: MergePolicy,
    existing: Vec<Environment>,
    incoming: Vec<Environment>,
) -> Vec<Environment> {
    match policy {
        MergePolicy::ByName => merge_environments(existing, incoming),
        MergePolicy::Replace => incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, v: &str) -> Environment {
        Environment::new(name).with_variable("v", v)
    }

    #[test]
    fn test_incoming_wins_position_preserved() {
        let merged = merge_environments(vec![env("A", "1"), env("B", "2")], vec![env("A", "9")]);
        assert_eq!(merged, vec![env("A", "9"), env("B", "2")]);
    }

    #[test]
    fn test_new_keys_appended_in_order() {
        let merged = merge_environments(vec![env("A", "1")], vec![env("C", "3"), env("B", "2")]);
        let names: Vec<&str> = merged.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_disjoint_keys_commute_as_sets() {
        let a = vec![env("A", "1")];
        let b = vec![env("B", "2")];
        let mut ab = merge_environments(a.clone(), b.clone());
        let mut ba = merge_environments(b, a);
        ab.sort_by(|x, y| x.name.cmp(&y.name));
        ba.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_repeated_incoming_key_last_wins() {
        let merged = merge_environments(vec![], vec![env("A", "1"), env("A", "2")]);
        assert_eq!(merged, vec![env("A", "2")]);
    }

    #[test]
    fn test_replace_policy_bypasses_merge() {
        let existing = vec![env("A", "1"), env("B", "2")];
        let result = apply_policy(MergePolicy::Replace, existing, vec![env("C", "3")]);
        assert_eq!(result, vec![env("C", "3")]);

        let policy = MergePolicy::from_merge_flag(true);
        let result = apply_policy(policy, vec![env("A", "1")], vec![env("C", "3")]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_generic_key() {
        let merged = merge_by_key(vec![(1, "a"), (2, "b")], vec![(2, "z"), (3, "c")], |(k, _)| *k);
        assert_eq!(merged, vec![(1, "a"), (2, "z"), (3, "c")]);
    }
}
