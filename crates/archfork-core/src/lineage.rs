//! Queries over the fork forest formed by `parent_id` links.

use std::collections::HashSet;

use crate::{find_arrangement, Arrangement};

/// Arrangements with no parent, in collection order.
pub fn roots(arrangements: &[Arrangement]) -> Vec<&Arrangement> {
    arrangements.iter().filter(|a| a.parent_id.is_none()).collect()
}

/// Direct forks of `id`, in collection order.
pub fn children<'a>(arrangements: &'a [Arrangement], id: &str) -> Vec<&'a Arrangement> {
    arrangements
        .iter()
        .filter(|a| a.parent_id.as_deref() == Some(id))
        .collect()
}

/// Parent chain of `id`, nearest first. Stops at a dangling parent reference.
pub fn ancestors<'a>(arrangements: &'a [Arrangement], id: &str) -> Vec<&'a Arrangement> {
    let mut chain = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = find_arrangement(arrangements, id);
    while let Some(arr) = current {
        if !seen.insert(arr.id.as_str()) {
            break;
        }
        current = arr
            .parent_id
            .as_deref()
            .and_then(|pid| find_arrangement(arrangements, pid));
        if let Some(parent) = current {
            if seen.contains(parent.id.as_str()) {
                break;
            }
            chain.push(parent);
        }
    }
    chain
}

/// Number of forks between `id` and its root. Roots (and unknown ids) are 0.
pub fn lineage_depth(arrangements: &[Arrangement], id: &str) -> usize {
    ancestors(arrangements, id).len()
}
