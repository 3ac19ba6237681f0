//! The candidate set — entities currently believed idle.
//!
//! One flat ordered set keyed by the full component tuple, with
//! depth-aware helpers for prefix deletion. This is the single piece of
//! state a detector run owns: seeded from the first sample, narrowed by
//! every later one. Because keys are stored at full depth, an emptied
//! branch (say, a namespace whose last pod was removed) simply ceases to
//! exist — `len()` counts full-depth tuples and nothing else.

use std::collections::BTreeSet;

use crate::key::EntityKey;
use crate::sample::SampleSet;

/// Hierarchical set of entity keys idle across every step seen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    depth: usize,
    keys: BTreeSet<EntityKey>,
}

impl CandidateSet {
    /// An empty candidate set for keys of the given depth.
    pub fn new(depth: usize) -> Self {
        Self { depth, keys: BTreeSet::new() }
    }

    /// Seed from the first sample of a run. Deep copy: the sample is
    /// ephemeral, the candidates are not.
    pub fn seed(sample: &SampleSet) -> Self {
        Self {
            depth: sample.depth(),
            keys: sample.iter().cloned().collect(),
        }
    }

    /// Remove every candidate absent from `sample`. Presence in the new
    /// sample is the only survival condition.
    ///
    /// Returns the number of keys removed. The count never grows.
    pub fn narrow(&mut self, sample: &SampleSet) -> usize {
        debug_assert_eq!(sample.depth(), self.depth, "sample depth mismatch");
        let before = self.keys.len();
        self.keys.retain(|key| sample.contains(key));
        before - self.keys.len()
    }

    /// Remove every key whose leading components match `prefix`.
    ///
    /// A one-component prefix drops a whole top-level branch in one
    /// operation; a full-depth prefix removes a single leaf.
    pub fn remove_prefix(&mut self, prefix: &[String]) -> usize {
        let before = self.keys.len();
        self.keys.retain(|key| !key.starts_with(prefix));
        before - self.keys.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of full-depth candidate tuples.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityKey> {
        self.keys.iter()
    }

    /// Distinct values of the first key component (e.g. the namespaces
    /// still holding candidates).
    pub fn top_level_components(&self) -> BTreeSet<&str> {
        self.keys
            .iter()
            .filter_map(|key| key.component(0))
            .collect()
    }
}
