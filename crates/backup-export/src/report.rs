//! Per-record failures and per-category counts.

use std::fmt;

use serde::Serialize;

use crate::intermediate::SourceRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    NamedConversation,
    DirectConversation,
    MembershipSnapshot,
    MembershipEvent,
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordCategory::NamedConversation => "named conversation",
            RecordCategory::DirectConversation => "direct conversation",
            RecordCategory::MembershipSnapshot => "membership snapshot",
            RecordCategory::MembershipEvent => "membership event",
        };
        f.write_str(name)
    }
}

/// One source row that could not be converted, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionFailure {
    pub category: RecordCategory,
    pub source: SourceRef,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub failures: Vec<ConversionFailure>,
}

impl FailureReport {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn in_category(&self, category: RecordCategory) -> impl Iterator<Item = &ConversionFailure> {
        self.failures
            .iter()
            .filter(move |f| f.category == category)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub converted: usize,
    pub failed: usize,
}

impl CategoryCount {
    pub fn total(&self) -> usize {
        self.converted + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub named_conversations: CategoryCount,
    pub direct_conversations: CategoryCount,
    pub membership_snapshots: CategoryCount,
    pub membership_events: CategoryCount,
}

impl ExportSummary {
    pub fn get(&self, category: RecordCategory) -> CategoryCount {
        match category {
            RecordCategory::NamedConversation => self.named_conversations,
            RecordCategory::DirectConversation => self.direct_conversations,
            RecordCategory::MembershipSnapshot => self.membership_snapshots,
            RecordCategory::MembershipEvent => self.membership_events,
        }
    }

    pub fn failed(&self) -> usize {
        self.named_conversations.failed
            + self.direct_conversations.failed
            + self.membership_snapshots.failed
            + self.membership_events.failed
    }
}
