//! iOS (Core Data) backup schemas.
//!
//! Rows reference their conversation by the integer `Z_PK` of
//! `ZCONVERSATION`; the conversation's UUID lives in `ZREMOTEIDENTIFIER`.
//!
//! v1: `ZSERVERTIMESTAMP` is a REAL count of seconds since 2001-01-01 UTC,
//! the conversation name is `ZUSERDEFINEDNAME`.
//! v2: `ZSERVERTIMESTAMPMS` holds Unix milliseconds, the name column is `ZNAME`.

use crate::intermediate::{
    split_members, ConversationRow, EpochMillis, Field, FieldError, MemberRow, MessageKind,
    MessageRow, SourceRef,
};
use crate::source::{Platform, PlaintextStore, RawRow, RowKey};

use super::SchemaAdapter;

/// Seconds between 1970-01-01 and 2001-01-01.
const APPLE_EPOCH_OFFSET_SECS: f64 = 978_307_200.0;

const REMOTE_ID: &str = "ZREMOTEIDENTIFIER";
const MEMBER_COLUMNS: &[&str] = &["ZCONVERSATION", "ZUSER"];

// ZMSystemMessageType codes
const SYSTEM_PARTICIPANTS_ADDED: i64 = 1;
const SYSTEM_PARTICIPANTS_REMOVED: i64 = 2;

pub static V1: SchemaAdapter = SchemaAdapter {
    platform: Platform::Ios,
    version: 1,
    conversation_columns: &["Z_PK", REMOTE_ID, "ZUSERDEFINEDNAME"],
    message_columns: &[
        "Z_PK",
        "ZCONVERSATION",
        "ZSYSTEMMESSAGETYPE",
        "ZSENDER",
        "ZUSERS",
        "ZSERVERTIMESTAMP",
    ],
    member_columns: MEMBER_COLUMNS,
    conversation: conversation_v1,
    message: message_v1,
    member,
};

pub static V2: SchemaAdapter = SchemaAdapter {
    platform: Platform::Ios,
    version: 2,
    conversation_columns: &["Z_PK", REMOTE_ID, "ZNAME"],
    message_columns: &[
        "Z_PK",
        "ZCONVERSATION",
        "ZSYSTEMMESSAGETYPE",
        "ZSENDER",
        "ZUSERS",
        "ZSERVERTIMESTAMPMS",
    ],
    member_columns: MEMBER_COLUMNS,
    conversation: conversation_v2,
    message: message_v2,
    member,
};

fn conversation_v1(source: SourceRef, row: &RawRow) -> ConversationRow {
    ConversationRow {
        source,
        id: row.text(REMOTE_ID),
        name: row.optional_text("ZUSERDEFINEDNAME"),
    }
}

fn conversation_v2(source: SourceRef, row: &RawRow) -> ConversationRow {
    ConversationRow {
        source,
        id: row.text(REMOTE_ID),
        name: row.optional_text("ZNAME"),
    }
}

fn member(source: SourceRef, row: &RawRow, store: &PlaintextStore) -> MemberRow {
    MemberRow {
        source,
        conversation_id: conversation_reference(row, store),
        user_id: row.text("ZUSER"),
    }
}

fn message_v1(source: SourceRef, row: &RawRow, store: &PlaintextStore) -> MessageRow {
    MessageRow {
        source,
        conversation_id: conversation_reference(row, store),
        kind: kind(row),
        user_id: row.text("ZSENDER"),
        members: members(row),
        time: row
            .real("ZSERVERTIMESTAMP")
            .and_then(|secs| apple_seconds_to_millis("ZSERVERTIMESTAMP", secs)),
    }
}

fn message_v2(source: SourceRef, row: &RawRow, store: &PlaintextStore) -> MessageRow {
    MessageRow {
        source,
        conversation_id: conversation_reference(row, store),
        kind: kind(row),
        user_id: row.text("ZSENDER"),
        members: members(row),
        time: row.integer("ZSERVERTIMESTAMPMS").map(EpochMillis),
    }
}

/// Resolve the `ZCONVERSATION` foreign key to the conversation's remote id.
fn conversation_reference(row: &RawRow, store: &PlaintextStore) -> Field<String> {
    let column = "ZCONVERSATION";
    let key = RowKey::from(row.get(column)?);
    let conversation = store
        .conversation(&key)
        .ok_or(FieldError::Unresolved { column, key })?;
    conversation.text(REMOTE_ID)
}

/// NULL marks an ordinary (non-system) message.
fn kind(row: &RawRow) -> Field<MessageKind> {
    Ok(match row.optional_integer("ZSYSTEMMESSAGETYPE")? {
        None => MessageKind::Text,
        Some(SYSTEM_PARTICIPANTS_ADDED) => MessageKind::MemberJoin,
        Some(SYSTEM_PARTICIPANTS_REMOVED) => MessageKind::MemberLeave,
        Some(code) => MessageKind::Other(format!("system:{code}")),
    })
}

fn members(row: &RawRow) -> Field<Vec<String>> {
    row.optional_text("ZUSERS")
        .map(|joined| joined.as_deref().map(split_members).unwrap_or_default())
}

fn apple_seconds_to_millis(column: &'static str, secs: f64) -> Field<EpochMillis> {
    let millis = ((secs + APPLE_EPOCH_OFFSET_SECS) * 1000.0).round();
    if !millis.is_finite() || millis < i64::MIN as f64 || millis > i64::MAX as f64 {
        return Err(FieldError::Invalid {
            column,
            reason: format!("timestamp {secs} out of range"),
        });
    }
    Ok(EpochMillis(millis as i64))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::source::{RawValue, IOS_LAYOUT};

    fn row(key: i64, columns: &[(&str, RawValue)]) -> RawRow {
        RawRow::new(
            RowKey::Integer(key),
            columns
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    fn store_with_conversation() -> PlaintextStore {
        let conversation = row(
            7,
            &[
                ("Z_PK", RawValue::Integer(7)),
                (REMOTE_ID, RawValue::Text("c-remote".into())),
            ],
        );
        PlaintextStore::new(&IOS_LAYOUT, vec![conversation], vec![], BTreeMap::new())
    }

    fn source() -> SourceRef {
        SourceRef {
            table: "ZMESSAGE",
            key: RowKey::Integer(1),
        }
    }

    #[test]
    fn apple_epoch_is_shifted_to_unix_millis() {
        assert_eq!(
            apple_seconds_to_millis("t", 0.0).unwrap(),
            EpochMillis(978_307_200_000)
        );
        assert_eq!(
            apple_seconds_to_millis("t", 1.5).unwrap(),
            EpochMillis(978_307_201_500)
        );
        assert!(apple_seconds_to_millis("t", f64::NAN).is_err());
        assert!(apple_seconds_to_millis("t", 1e300).is_err());
    }

    #[test]
    fn system_codes_map_to_kinds() {
        let added = row(1, &[("ZSYSTEMMESSAGETYPE", RawValue::Integer(1))]);
        let removed = row(2, &[("ZSYSTEMMESSAGETYPE", RawValue::Integer(2))]);
        let plain = row(3, &[("ZSYSTEMMESSAGETYPE", RawValue::Null)]);
        let renamed = row(4, &[("ZSYSTEMMESSAGETYPE", RawValue::Integer(3))]);
        assert_eq!(kind(&added), Ok(MessageKind::MemberJoin));
        assert_eq!(kind(&removed), Ok(MessageKind::MemberLeave));
        assert_eq!(kind(&plain), Ok(MessageKind::Text));
        assert_eq!(kind(&renamed), Ok(MessageKind::Other("system:3".into())));
    }

    #[test]
    fn conversation_reference_resolves_or_reports_the_miss() {
        let store = store_with_conversation();
        let hit = row(1, &[("ZCONVERSATION", RawValue::Integer(7))]);
        let miss = row(2, &[("ZCONVERSATION", RawValue::Integer(8))]);
        assert_eq!(conversation_reference(&hit, &store), Ok("c-remote".into()));
        assert_eq!(
            conversation_reference(&miss, &store),
            Err(FieldError::Unresolved {
                column: "ZCONVERSATION",
                key: RowKey::Integer(8)
            })
        );
    }

    #[test]
    fn v1_message_uses_apple_seconds() {
        let store = store_with_conversation();
        let message = row(
            1,
            &[
                ("ZCONVERSATION", RawValue::Integer(7)),
                ("ZSYSTEMMESSAGETYPE", RawValue::Integer(1)),
                ("ZSENDER", RawValue::Text("u0".into())),
                ("ZUSERS", RawValue::Text("u1,u2".into())),
                ("ZSERVERTIMESTAMP", RawValue::Real(10.0)),
            ],
        );
        let adapted = message_v1(source(), &message, &store);
        assert_eq!(adapted.time, Ok(EpochMillis(978_307_210_000)));
        assert_eq!(adapted.members, Ok(vec!["u1".into(), "u2".into()]));
        assert_eq!(adapted.conversation_id, Ok("c-remote".into()));
    }
}
