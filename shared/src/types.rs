//! Common types used across the ledger

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Inclusive date range for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Outcome of a one-way state transition that may already have happened
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum Transition<T> {
    /// The transition ran and produced `T`
    Applied(T),
    /// The entity was already in its terminal state; nothing was written
    AlreadyDone,
}

impl<T> Transition<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Transition::Applied(value) => Some(value),
            Transition::AlreadyDone => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}
