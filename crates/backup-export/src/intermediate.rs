//! Platform-agnostic rows produced by the schema adapters.
//!
//! Encodings are already normalised here (Unix epoch milliseconds, split
//! member lists, canonical message kinds) but identifiers are still the raw
//! text: they are parsed during conversion so that a malformed id becomes a
//! per-row failure instead of a load error. A field the adapter could not read
//! is carried as a [`FieldError`] and reported by the converter.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::source::{Platform, RowKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("column {column} is missing")]
    Missing { column: &'static str },

    #[error("column {column} is null")]
    Null { column: &'static str },

    #[error("column {column} holds {found}")]
    WrongType {
        column: &'static str,
        found: &'static str,
    },

    #[error("column {column} references unknown row {key}")]
    Unresolved { column: &'static str, key: RowKey },

    #[error("column {column} is invalid: {reason}")]
    Invalid { column: &'static str, reason: String },
}

pub type Field<T> = Result<T, FieldError>;

/// Where a row came from: source table plus its native key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub table: &'static str,
    pub key: RowKey,
}

/// Milliseconds since 1970-01-01T00:00:00Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EpochMillis(pub i64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    MemberJoin,
    MemberLeave,
    Text,
    Other(String),
}

impl MessageKind {
    pub fn is_membership_change(&self) -> bool {
        matches!(self, MessageKind::MemberJoin | MessageKind::MemberLeave)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub source: SourceRef,
    pub id: Field<String>,
    /// `Ok(None)` marks a conversation without an explicit name.
    pub name: Field<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub source: SourceRef,
    pub conversation_id: Field<String>,
    pub kind: Field<MessageKind>,
    pub user_id: Field<String>,
    /// Ordered user ids named by a membership change; empty when the column is null.
    pub members: Field<Vec<String>>,
    pub time: Field<EpochMillis>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberRow {
    pub source: SourceRef,
    pub conversation_id: Field<String>,
    pub user_id: Field<String>,
}

/// All membership rows referencing one conversation key, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipGroup {
    pub source: SourceRef,
    pub members: Vec<MemberRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateRows {
    pub platform: Platform,
    pub schema_version: u32,
    pub conversations: Vec<ConversationRow>,
    pub messages: Vec<MessageRow>,
    /// Keyed by the conversation's source key (the same key as `ConversationRow::source.key`).
    pub memberships: BTreeMap<RowKey, MembershipGroup>,
}

/// Split a comma-joined id list. Tokens are trimmed, empty tokens dropped,
/// order kept.
pub fn split_members(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}
