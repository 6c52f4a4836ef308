//! Output-side data model: per-unit result records and batch statistics.
//!
//! Every [`UnitDescriptor`] handed to the orchestrator produces exactly one
//! [`ResultRecord`]. The vote map always holds every [`Category`]; a `None`
//! value means no extraction happened, and [`ResultRecord::outcome`] says why.

use crate::model::{Category, UnitDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Vote value per category, iterated in document order.
pub type VoteMap = BTreeMap<Category, Option<u32>>;

/// Terminal classification of one unit's processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Every row was recognised.
    Success,
    /// The unit has no (recognisable) document reference.
    NoDocument,
    /// A pipeline stage failed for this unit.
    ExtractionError,
    /// The worker running this unit died (panic or abort).
    InfrastructureError,
    /// The batch was cancelled before this unit started.
    Cancelled,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::NoDocument => "NO_DOCUMENT",
            Outcome::ExtractionError => "EXTRACTION_ERROR",
            Outcome::InfrastructureError => "INFRASTRUCTURE_ERROR",
            Outcome::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of processing one [`UnitDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub department: String,
    pub municipality: String,
    pub zone: String,
    pub center: String,
    pub table_number: u32,
    pub unit_id: String,
    /// Document reference, kept on extraction failures too.
    pub document: Option<String>,
    pub tags: Vec<String>,
    pub votes: VoteMap,
    /// Categories whose value defaulted to 0 because nothing was read.
    #[serde(default)]
    pub unread: Vec<Category>,
    pub outcome: Outcome,
    /// Failure detail for non-success outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    /// Record with every category set and outcome `SUCCESS`.
    ///
    /// `values` is zipped with `categories` in order; the caller guarantees
    /// `categories` is a full permutation of [`Category::ALL`].
    pub(crate) fn success(
        unit: &UnitDescriptor,
        categories: &[Category],
        values: Vec<Option<u32>>,
    ) -> Self {
        let mut votes = VoteMap::new();
        let mut unread = Vec::new();
        for (category, value) in categories.iter().copied().zip(values) {
            if value.is_none() {
                unread.push(category);
            }
            votes.insert(category, Some(value.unwrap_or(0)));
        }
        unread.sort();
        Self {
            votes,
            unread,
            ..Self::base(unit, unit.document.clone(), Outcome::Success, None)
        }
    }

    /// Record for a unit without a usable document. Never carries a reference.
    pub(crate) fn no_document(unit: &UnitDescriptor) -> Self {
        Self::base(unit, None, Outcome::NoDocument, None)
    }

    /// Null-vote record for any failure outcome; the reference is preserved.
    pub(crate) fn failed(unit: &UnitDescriptor, outcome: Outcome, error: impl Into<String>) -> Self {
        Self::base(unit, unit.document.clone(), outcome, Some(error.into()))
    }

    fn base(
        unit: &UnitDescriptor,
        document: Option<String>,
        outcome: Outcome,
        error: Option<String>,
    ) -> Self {
        Self {
            department: unit.department.clone(),
            municipality: unit.municipality.clone(),
            zone: unit.zone.clone(),
            center: unit.center.clone(),
            table_number: unit.table_number,
            unit_id: unit.unit_id.clone(),
            document,
            tags: unit.tags.clone(),
            votes: empty_votes(),
            unread: Vec::new(),
            outcome,
            error,
        }
    }

    /// Convenience accessor for one category's value.
    pub fn vote(&self, category: Category) -> Option<u32> {
        self.votes.get(&category).copied().flatten()
    }
}

/// A vote map with every category present and null.
pub fn empty_votes() -> VoteMap {
    Category::ALL.into_iter().map(|c| (c, None)).collect()
}

/// Aggregate counts for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_units: usize,
    pub success: usize,
    pub no_document: usize,
    pub extraction_error: usize,
    pub infrastructure_error: usize,
    pub cancelled: usize,
    pub total_duration_ms: u64,
}

impl BatchStats {
    pub(crate) fn record(&mut self, outcome: Outcome) {
        self.total_units += 1;
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::NoDocument => self.no_document += 1,
            Outcome::ExtractionError => self.extraction_error += 1,
            Outcome::InfrastructureError => self.infrastructure_error += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Everything a batch run produces, records in completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub records: Vec<ResultRecord>,
    pub stats: BatchStats,
}
