//! Topological ordering over dependency graphs.

use std::collections::HashSet;
use std::hash::Hash;

/// Sort `items` so that every item appears after all of its dependencies.
///
/// The sort is stable: when several items are ready at the same time, they
/// are emitted in their original input order. Returns `None` if the graph
/// contains a cycle. Dependencies not present in `items` are ignored here;
/// callers that require closure over the dependency set must check that
/// separately.
pub fn topological_sort<T, F>(items: &[T], deps_of: F) -> Option<Vec<T>>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> Vec<T>,
{
    let members: HashSet<&T> = items.iter().collect();
    let mut emitted: HashSet<&T> = HashSet::with_capacity(items.len());
    let mut sorted = Vec::with_capacity(items.len());

    while sorted.len() < items.len() {
        let mut progressed = false;
        for item in items {
            if emitted.contains(item) {
                continue;
            }
            let ready = deps_of(item)
                .iter()
                .all(|dep| !members.contains(dep) || emitted.contains(dep));
            if ready {
                emitted.insert(item);
                sorted.push(item.clone());
                progressed = true;
            }
        }
        if !progressed {
            // Every remaining item waits on another remaining item.
            return None;
        }
    }

    Some(sorted)
}

/// Check whether `items` is already in a dependency-consistent order.
pub fn is_topologically_sorted<T, F>(items: &[T], deps_of: F) -> bool
where
    T: Eq + Hash,
    F: Fn(&T) -> Vec<T>,
{
    let members: HashSet<&T> = items.iter().collect();
    let mut seen: HashSet<&T> = HashSet::with_capacity(items.len());
    for item in items {
        for dep in deps_of(item) {
            if members.contains(&dep) && !seen.contains(&dep) {
                return false;
            }
        }
        seen.insert(item);
    }
    true
}
