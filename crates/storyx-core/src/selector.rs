//! Comparison selector
//!
//! Lets a user pick exactly two snapshots, ordered `from` then `to`, out of
//! an arbitrary click sequence. Entering the two-selected state is the only
//! transition that asks for a comparison.
//!
//! Every transition bumps a generation counter. A [`ComparisonRequest`]
//! carries the generation it was issued at, and [`ComparisonSelector::accept`]
//! drops results whose ticket is no longer current, so a late diff can never
//! land in a selection that has since changed or been cleared.

use crate::diff::model::ChangeSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Selection {
    #[default]
    Empty,
    OneSelected { from: String },
    TwoSelected { from: String, to: String },
}

/// A comparison the caller should compute and hand back via `accept`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub ticket: u64,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonSelector {
    selection: Selection,
    generation: u64,
    result: Option<ChangeSet>,
}

impl ComparisonSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The accepted comparison for the current two-snapshot selection
    pub fn result(&self) -> Option<&ChangeSet> {
        self.result.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn transition(&mut self, next: Selection) {
        self.generation += 1;
        self.result = None;
        self.selection = next;
    }

    /// Apply a click on `snapshot_id`.
    ///
    /// Returns a request exactly when the selection enters `TwoSelected`.
    /// Clicking `from` while two are selected keeps `to`, which becomes the
    /// new anchor.
    pub fn select(&mut self, snapshot_id: impl Into<String>) -> Option<ComparisonRequest> {
        let id = snapshot_id.into();
        let next = match &self.selection {
            Selection::Empty => Selection::OneSelected { from: id },
            Selection::OneSelected { from } if *from == id => Selection::Empty,
            Selection::OneSelected { from } => Selection::TwoSelected {
                from: from.clone(),
                to: id,
            },
            Selection::TwoSelected { from, to } if *from == id => {
                Selection::OneSelected { from: to.clone() }
            }
            Selection::TwoSelected { from, to } if *to == id => {
                Selection::OneSelected { from: from.clone() }
            }
            Selection::TwoSelected { .. } => Selection::OneSelected { from: id },
        };
        self.transition(next);

        match &self.selection {
            Selection::TwoSelected { from, to } => Some(ComparisonRequest {
                ticket: self.generation,
                from: from.clone(),
                to: to.clone(),
            }),
            _ => None,
        }
    }

    /// Reset to `Empty`, invalidating any outstanding request
    pub fn clear(&mut self) {
        self.transition(Selection::Empty);
    }

    /// Whether a result for `ticket` would still be accepted
    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.generation && matches!(self.selection, Selection::TwoSelected { .. })
    }

    /// Store a computed comparison if its ticket is current. Returns whether
    /// the result was kept.
    pub fn accept(&mut self, ticket: u64, result: ChangeSet) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                ticket,
                generation = self.generation,
                "discarded stale comparison result"
            );
            return false;
        }
        self.result = Some(result);
        true
    }
}
