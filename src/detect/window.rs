//! Trailing-window aggregation: the one query shape every detection rule uses.
//!
//! A [`WindowQuery`] describes the selection, grouping and threshold; the
//! event source evaluates it. Groups come back ordered by measure descending,
//! then key ascending, and a query over no qualifying events yields no
//! groups, including for [`GroupBy::Nothing`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::model::{EventKind, Severity};

/// Which events a window query looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Events whose kind is any of these.
    Kinds(Vec<EventKind>),
    /// Events recorded at exactly this severity.
    Severity(Severity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    SourceAddress,
    EventKind,
    /// One global group.
    Nothing,
}

/// What the threshold and the ordering are applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Events,
    DistinctSubjects,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowQuery {
    pub selector: Selector,
    /// Skip events without a subject.
    pub require_subject: bool,
    /// Exclusive lower bound: only events strictly after this instant count.
    pub since: DateTime<Utc>,
    pub group_by: GroupBy,
    pub measure: Measure,
    /// Groups whose measure falls below this are dropped.
    pub min_count: u64,
}

impl WindowQuery {
    pub fn new(selector: Selector, since: DateTime<Utc>) -> Self {
        Self {
            selector,
            require_subject: false,
            since,
            group_by: GroupBy::Nothing,
            measure: Measure::Events,
            min_count: 1,
        }
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn measure(mut self, measure: Measure) -> Self {
        self.measure = measure;
        self
    }

    pub fn require_subject(mut self) -> Self {
        self.require_subject = true;
        self
    }

    pub fn min_count(mut self, min_count: u64) -> Self {
        self.min_count = min_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupKey {
    Address(String),
    Kind(EventKind),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGroup {
    pub key: GroupKey,
    /// Value of the query's measure.
    pub count: u64,
    /// Raw number of events in the group.
    pub total: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub subjects: BTreeSet<String>,
}
