//! Schema adapters: one pure mapping per (platform, schema version) from raw
//! rows to [`IntermediateRows`].
//!
//! Adapters are plain values holding function pointers, registered in a
//! static table. An unregistered version fails the whole job; there is no
//! best-effort fallback to a neighbouring version.

pub mod android;
pub mod ios;

use std::collections::BTreeMap;

use tracing::info;

use crate::error::ExportError;
use crate::intermediate::{
    ConversationRow, IntermediateRows, MemberRow, MembershipGroup, MessageRow, SourceRef,
};
use crate::source::{Platform, PlaintextStore, RawRow, SourceStore};

pub type ConversationFn = fn(SourceRef, &RawRow) -> ConversationRow;
pub type MessageFn = fn(SourceRef, &RawRow, &PlaintextStore) -> MessageRow;
pub type MemberFn = fn(SourceRef, &RawRow, &PlaintextStore) -> MemberRow;

pub struct SchemaAdapter {
    pub platform: Platform,
    pub version: u32,
    pub conversation_columns: &'static [&'static str],
    pub message_columns: &'static [&'static str],
    pub member_columns: &'static [&'static str],
    pub conversation: ConversationFn,
    pub message: MessageFn,
    pub member: MemberFn,
}

static REGISTRY: [&SchemaAdapter; 4] = [
    &android::V1,
    &android::V2,
    &ios::V1,
    &ios::V2,
];

/// Adapter registered for `(platform, version)`.
pub fn lookup(platform: Platform, version: u32) -> Result<&'static SchemaAdapter, ExportError> {
    REGISTRY
        .iter()
        .copied()
        .find(|a| a.platform == platform && a.version == version)
        .ok_or_else(|| ExportError::UnsupportedSchemaVersion {
            platform,
            version: version.to_string(),
        })
}

pub fn supported_versions(platform: Platform) -> Vec<u32> {
    REGISTRY
        .iter()
        .filter(|a| a.platform == platform)
        .map(|a| a.version)
        .collect()
}

/// Look up the adapter for `version` and map every row of `store`.
pub fn adapt(store: &PlaintextStore, version: u32) -> Result<IntermediateRows, ExportError> {
    Ok(lookup(store.platform(), version)?.adapt(store))
}

impl SchemaAdapter {
    /// Check that every column this adapter reads exists, before any row is
    /// converted.
    pub async fn verify(&self, store: &SourceStore) -> Result<(), ExportError> {
        let layout = store.layout();
        store
            .require_columns(layout.conversations.name, self.conversation_columns)
            .await?;
        store
            .require_columns(layout.messages.name, self.message_columns)
            .await?;
        store
            .require_columns(layout.members.name, self.member_columns)
            .await
    }

    pub fn adapt(&self, store: &PlaintextStore) -> IntermediateRows {
        let layout = store.layout();
        let source = |table: &'static str, row: &RawRow| SourceRef {
            table,
            key: row.key.clone(),
        };

        let conversations = store
            .conversations()
            .iter()
            .map(|row| (self.conversation)(source(layout.conversations.name, row), row))
            .collect();

        let messages = store
            .messages()
            .iter()
            .map(|row| (self.message)(source(layout.messages.name, row), row, store))
            .collect();

        let memberships: BTreeMap<_, _> = store
            .memberships()
            .iter()
            .map(|(conversation, rows)| {
                let members = rows
                    .iter()
                    .map(|row| (self.member)(source(layout.members.name, row), row, store))
                    .collect();
                let group = MembershipGroup {
                    source: SourceRef {
                        table: layout.members.name,
                        key: conversation.clone(),
                    },
                    members,
                };
                (conversation.clone(), group)
            })
            .collect();

        info!(
            platform = %self.platform,
            version = self.version,
            "rows adapted"
        );
        IntermediateRows {
            platform: self.platform,
            schema_version: self.version,
            conversations,
            messages,
            memberships,
        }
    }
}
