use crate::Arrangement;

/// Source of fresh ids for forked arrangements and containers.
///
/// Ids must not depend on wall-clock time, so rapid forks never collide.
/// [`crate::graph::fork`] additionally skips any id already in the collection.
pub trait IdAllocator {
    fn next_id(&mut self, prefix: &str) -> String;
}

/// Monotonic "{prefix}-{N}" ids.
#[derive(Debug, Clone, Default)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting after the highest numeric suffix already used by any
    /// arrangement or container id in `arrangements`.
    pub fn after(arrangements: &[Arrangement]) -> Self {
        let max = arrangements
            .iter()
            .flat_map(|a| [a.id.as_str(), a.container.id.as_str()])
            .filter_map(numeric_suffix)
            .max()
            .unwrap_or(0);
        SequentialIds { next: max }
    }
}

fn numeric_suffix(id: &str) -> Option<u64> {
    id.rsplit_once('-').and_then(|(_, n)| n.parse::<u64>().ok())
}

impl IdAllocator for SequentialIds {
    fn next_id(&mut self, prefix: &str) -> String {
        // Seed ids are free text, so the counter may start at u64::MAX.
        // Wrap to 1; the graph skips any id that is already taken.
        self.next = self.next.checked_add(1).unwrap_or(1);
        format!("{}-{}", prefix, self.next)
    }
}

/// Random v4 UUID ids, prefixed.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdAllocator for UuidIds {
    fn next_id(&mut self, prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sequential_ids_never_repeat() {
        let mut ids = SequentialIds::new();
        let issued: HashSet<String> = (0..100).map(|_| ids.next_id("arr")).collect();
        assert_eq!(issued.len(), 100);
    }

    #[test]
    fn sequential_ids_skip_past_existing_suffixes() {
        let arrangements: Vec<Arrangement> = serde_json::from_value(serde_json::json!([
            {
                "id": "arr-7",
                "name": "Baseline",
                "container": { "id": "ctr-12", "versionLabel": "v1.0" }
            }
        ]))
        .unwrap();
        let mut ids = SequentialIds::after(&arrangements);
        assert_eq!(ids.next_id("arr"), "arr-13");
    }

    #[test]
    fn sequential_ids_wrap_after_largest_suffix() {
        let arrangements: Vec<Arrangement> = serde_json::from_value(serde_json::json!([
            {
                "id": "arr-18446744073709551615",
                "name": "Baseline",
                "container": { "id": "ctr-1", "versionLabel": "v1.0" }
            }
        ]))
        .unwrap();
        let mut ids = SequentialIds::after(&arrangements);
        assert_eq!(ids.next_id("arr"), "arr-1");
        assert_eq!(ids.next_id("ctr"), "ctr-2");
    }

    #[test]
    fn uuid_ids_are_prefixed_and_distinct() {
        let mut ids = UuidIds;
        let a = ids.next_id("arr");
        let b = ids.next_id("arr");
        assert!(a.starts_with("arr-"));
        assert_ne!(a, b);
    }
}
