//! Aggregation of fan-out instance outputs.
//!
//! After every instance of a fanned-out task reaches a terminal state,
//! the aggregator gathers their per-item outputs into a single merged
//! artifact keyed by item identifier, so a downstream task can
//! re-associate each result with its originating item.

use crate::core::OutputValue;
use crate::errors::AggregationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The terminal outcome of one fan-out instance, as reported to the
/// aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceOutcome {
    /// The instance completed; an explicitly empty output is legitimate
    /// and distinct from a missing instance.
    Completed(OutputValue),
    /// The instance failed with the given reason.
    Failed(String),
}

/// A merged fan-out output, addressable by item identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedArtifact {
    /// The fanned-out producer task.
    pub task: String,
    /// The output slot that was merged.
    pub slot: String,
    /// The published base path the per-item contents live under.
    pub base_path: String,
    /// Per-item outputs, ordered by item identifier.
    pub entries: BTreeMap<String, OutputValue>,
}

impl MergedArtifact {
    /// Looks up one item's contribution.
    #[must_use]
    pub fn entry(&self, item_id: &str) -> Option<&OutputValue> {
        self.entries.get(item_id)
    }

    /// The item identifiers present in the merge.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The number of contributing items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no items contributed, as with a zero-length
    /// fan-out collection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merges per-instance outputs against the expected item-id set.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputAggregator;

impl OutputAggregator {
    /// Merges the outcomes of all instances of one fanned-out slot.
    ///
    /// `expected_ids` is the identifier set of the original dynamic
    /// collection; an empty set merges to an empty artifact rather
    /// than an error.
    ///
    /// # Errors
    ///
    /// Returns `IncompleteFanOut` when any expected id has no recorded
    /// outcome, or when its instance failed. The ids are reported
    /// separately so a missing instance is distinguishable from a
    /// failed one.
    pub fn merge(
        task: impl Into<String>,
        slot: impl Into<String>,
        base_path: impl Into<String>,
        expected_ids: &[String],
        outcomes: &HashMap<String, InstanceOutcome>,
    ) -> Result<MergedArtifact, AggregationError> {
        let task = task.into();

        let mut missing = Vec::new();
        let mut failed = Vec::new();
        let mut entries = BTreeMap::new();

        for id in expected_ids {
            match outcomes.get(id) {
                None => missing.push(id.clone()),
                Some(InstanceOutcome::Failed(_)) => failed.push(id.clone()),
                Some(InstanceOutcome::Completed(value)) => {
                    entries.insert(id.clone(), value.clone());
                }
            }
        }

        if !missing.is_empty() || !failed.is_empty() {
            return Err(AggregationError::incomplete(task, missing, failed));
        }

        Ok(MergedArtifact {
            task,
            slot: slot.into(),
            base_path: base_path.into(),
            entries,
        })
    }
}
