//! Android backup schemas.
//!
//! v1: `Messages.time` in epoch milliseconds, message types in CamelCase
//! (`MemberJoin`, `MemberLeave`, `Text`).
//! v2: `time` renamed to `server_time`; message types in upper snake case
//! (`MEMBER_JOIN`, `MEMBER_LEAVE`, `TEXT`).

use crate::intermediate::{
    split_members, ConversationRow, EpochMillis, Field, MemberRow, MessageKind, MessageRow,
    SourceRef,
};
use crate::source::{Platform, PlaintextStore, RawRow};

use super::SchemaAdapter;

const CONVERSATION_COLUMNS: &[&str] = &["_id", "name"];
const MEMBER_COLUMNS: &[&str] = &["conv_id", "user_id"];

pub static V1: SchemaAdapter = SchemaAdapter {
    platform: Platform::Android,
    version: 1,
    conversation_columns: CONVERSATION_COLUMNS,
    message_columns: &["_id", "conv_id", "msg_type", "user_id", "members", "time"],
    member_columns: MEMBER_COLUMNS,
    conversation,
    message: message_v1,
    member,
};

pub static V2: SchemaAdapter = SchemaAdapter {
    platform: Platform::Android,
    version: 2,
    conversation_columns: CONVERSATION_COLUMNS,
    message_columns: &["_id", "conv_id", "msg_type", "user_id", "members", "server_time"],
    member_columns: MEMBER_COLUMNS,
    conversation,
    message: message_v2,
    member,
};

fn conversation(source: SourceRef, row: &RawRow) -> ConversationRow {
    ConversationRow {
        source,
        id: row.text("_id"),
        name: row.optional_text("name"),
    }
}

fn member(source: SourceRef, row: &RawRow, _store: &PlaintextStore) -> MemberRow {
    MemberRow {
        source,
        conversation_id: row.text("conv_id"),
        user_id: row.text("user_id"),
    }
}

fn message_v1(source: SourceRef, row: &RawRow, _store: &PlaintextStore) -> MessageRow {
    MessageRow {
        source,
        conversation_id: row.text("conv_id"),
        kind: row.text("msg_type").map(|t| kind_v1(&t)),
        user_id: row.text("user_id"),
        members: members(row),
        time: row.integer("time").map(EpochMillis),
    }
}

fn message_v2(source: SourceRef, row: &RawRow, _store: &PlaintextStore) -> MessageRow {
    MessageRow {
        source,
        conversation_id: row.text("conv_id"),
        kind: row.text("msg_type").map(|t| kind_v2(&t)),
        user_id: row.text("user_id"),
        members: members(row),
        time: row.integer("server_time").map(EpochMillis),
    }
}

fn members(row: &RawRow) -> Field<Vec<String>> {
    row.optional_text("members")
        .map(|joined| joined.as_deref().map(split_members).unwrap_or_default())
}

fn kind_v1(raw: &str) -> MessageKind {
    match raw {
        "MemberJoin" => MessageKind::MemberJoin,
        "MemberLeave" => MessageKind::MemberLeave,
        "Text" => MessageKind::Text,
        other => MessageKind::Other(other.to_string()),
    }
}

fn kind_v2(raw: &str) -> MessageKind {
    match raw {
        "MEMBER_JOIN" => MessageKind::MemberJoin,
        "MEMBER_LEAVE" => MessageKind::MemberLeave,
        "TEXT" => MessageKind::Text,
        other => MessageKind::Other(other.to_string()),
    }
}
