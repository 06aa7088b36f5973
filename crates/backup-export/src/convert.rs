//! Normalizer: intermediate rows to canonical DTOs, one row at a time.
//!
//! Every converter returns a [`Converted`] batch. A row either yields one
//! record or one [`ConversionFailure`]; nothing a single row does can stop
//! the rest of the batch. Only cancellation ends a batch early, and then the
//! partial batch is discarded.

use std::collections::{BTreeSet, HashMap};

use backup_envelope::{Cancelled, CancellationToken};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::intermediate::{
    ConversationRow, EpochMillis, Field, FieldError, IntermediateRows, MembershipGroup,
    MessageKind, MessageRow, SourceRef,
};
use crate::model::{
    ConversationAddMember, ConversationLeaveMembers, ConversationMembers, DirectConversation,
    MembershipEvent, NamedConversation,
};
use crate::report::{ConversionFailure, RecordCategory};

/// Why one row was excluded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("{field} is not a UUID: {value:?}")]
    InvalidUuid { field: &'static str, value: String },

    #[error("timestamp {0} ms is out of range")]
    Timestamp(i64),

    #[error("duplicate conversation id {0}")]
    DuplicateConversation(Uuid),

    #[error("no membership rows for conversation")]
    MissingMembership,

    #[error("exporting user is not a participant")]
    NotParticipant,

    #[error("expected exactly one other participant, found {0}")]
    AmbiguousParticipants(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted<T> {
    pub category: RecordCategory,
    pub records: Vec<T>,
    pub failures: Vec<ConversionFailure>,
}

impl<T> Converted<T> {
    fn new(category: RecordCategory) -> Self {
        Self {
            category,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Records plus failures: the number of inputs this batch consumed.
    pub fn total(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    fn push(&mut self, source: &SourceRef, outcome: Result<T, RowError>) {
        match outcome {
            Ok(record) => self.records.push(record),
            Err(e) => {
                warn!(
                    category = %self.category,
                    table = source.table,
                    key = %source.key,
                    reason = %e,
                    "row excluded from export"
                );
                self.failures.push(ConversionFailure {
                    category: self.category,
                    source: source.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Anything that can be traced back to a source row.
trait Sourced {
    fn source(&self) -> &SourceRef;
}

impl Sourced for ConversationRow {
    fn source(&self) -> &SourceRef {
        &self.source
    }
}

impl Sourced for MessageRow {
    fn source(&self) -> &SourceRef {
        &self.source
    }
}

impl Sourced for MembershipGroup {
    fn source(&self) -> &SourceRef {
        &self.source
    }
}

/// Run `convert` over every input, isolating failures per row and checking
/// `cancel` before each one.
fn isolate<'a, I, T, F>(
    category: RecordCategory,
    inputs: impl IntoIterator<Item = &'a I>,
    cancel: &CancellationToken,
    mut convert: F,
) -> Result<Converted<T>, Cancelled>
where
    I: Sourced + 'a,
    F: FnMut(&I) -> Result<T, RowError>,
{
    let mut batch = Converted::new(category);
    for input in inputs {
        cancel.check()?;
        let outcome = convert(input);
        batch.push(input.source(), outcome);
    }
    debug!(
        category = %category,
        converted = batch.records.len(),
        failed = batch.failures.len(),
        "category converted"
    );
    Ok(batch)
}

// ── Conversations ───────────────────────────────────────────────────────────

/// Conversations with a name. A name that cannot be read is a failure here
/// rather than a silent reclassification as direct.
pub fn convert_named(
    rows: &IntermediateRows,
    cancel: &CancellationToken,
) -> Result<Converted<NamedConversation>, Cancelled> {
    let owners = claim_conversation_ids(rows);
    isolate(
        RecordCategory::NamedConversation,
        rows.conversations
            .iter()
            .filter(|c| !matches!(c.name, Ok(None))),
        cancel,
        |c| {
            let name = c.name.clone()?.unwrap_or_default();
            let id = owned_id(&owners, c)?;
            Ok(NamedConversation { id, name })
        },
    )
}

/// Conversations without a name whose roster is the exporting user plus
/// exactly one other user.
pub fn convert_direct(
    rows: &IntermediateRows,
    exporting_user: Uuid,
    cancel: &CancellationToken,
) -> Result<Converted<DirectConversation>, Cancelled> {
    let owners = claim_conversation_ids(rows);
    isolate(
        RecordCategory::DirectConversation,
        rows.conversations
            .iter()
            .filter(|c| matches!(c.name, Ok(None))),
        cancel,
        |c| {
            let id = owned_id(&owners, c)?;
            let group = rows
                .memberships
                .get(&c.source.key)
                .ok_or(RowError::MissingMembership)?;
            let other_user = other_participant(group, exporting_user)?;
            Ok(DirectConversation { id, other_user })
        },
    )
}

/// First conversation row, in source order, to carry each UUID. Named and
/// direct share one id space, so a later row with the same id is a duplicate
/// whichever category it falls into.
fn claim_conversation_ids(rows: &IntermediateRows) -> HashMap<Uuid, &ConversationRow> {
    let mut owners = HashMap::new();
    for row in &rows.conversations {
        if let Some(id) = row.id.as_deref().ok().and_then(|s| Uuid::parse_str(s).ok()) {
            owners.entry(id).or_insert(row);
        }
    }
    owners
}

fn owned_id(
    owners: &HashMap<Uuid, &ConversationRow>,
    row: &ConversationRow,
) -> Result<Uuid, RowError> {
    let id = parse_uuid("conversation id", required(&row.id)?)?;
    match owners.get(&id) {
        Some(owner) if std::ptr::eq(*owner, row) => Ok(id),
        _ => Err(RowError::DuplicateConversation(id)),
    }
}

fn other_participant(group: &MembershipGroup, exporting_user: Uuid) -> Result<Uuid, RowError> {
    let mut participants = BTreeSet::new();
    for member in &group.members {
        participants.insert(parse_uuid("member user id", required(&member.user_id)?)?);
    }
    if !participants.remove(&exporting_user) {
        return Err(RowError::NotParticipant);
    }
    let mut others = participants.into_iter();
    match (others.next(), others.len()) {
        (Some(other), 0) => Ok(other),
        (None, _) => Err(RowError::AmbiguousParticipants(0)),
        (Some(_), rest) => Err(RowError::AmbiguousParticipants(rest + 1)),
    }
}

// ── Membership snapshots ────────────────────────────────────────────────────

/// One roster per membership group, users in source order. Any unreadable
/// member fails the whole group.
pub fn convert_members(
    rows: &IntermediateRows,
    cancel: &CancellationToken,
) -> Result<Converted<ConversationMembers>, Cancelled> {
    isolate(
        RecordCategory::MembershipSnapshot,
        rows.memberships.values(),
        cancel,
        |group| {
            let first = group.members.first().ok_or(RowError::MissingMembership)?;
            let conversation_id =
                parse_uuid("conversation id", required(&first.conversation_id)?)?;
            let users = group
                .members
                .iter()
                .map(|m| parse_uuid("member user id", required(&m.user_id)?))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ConversationMembers {
                conversation_id,
                users,
            })
        },
    )
}

// ── Membership events ───────────────────────────────────────────────────────

/// Add/leave events from membership-typed messages only, ordered by
/// conversation then timestamp (source order breaks ties).
pub fn convert_events(
    rows: &IntermediateRows,
    cancel: &CancellationToken,
) -> Result<Converted<MembershipEvent>, Cancelled> {
    let mut batch = isolate(
        RecordCategory::MembershipEvent,
        rows.messages.iter().filter(|m| is_membership_message(m)),
        cancel,
        membership_event,
    )?;
    batch
        .records
        .sort_by_key(|e| (e.conversation_id(), e.time_stamp()));
    Ok(batch)
}

fn is_membership_message(message: &MessageRow) -> bool {
    match &message.kind {
        Ok(kind) => kind.is_membership_change(),
        Err(e) => {
            debug!(key = %message.source.key, reason = %e, "message kind unreadable, skipped");
            false
        }
    }
}

fn membership_event(message: &MessageRow) -> Result<MembershipEvent, RowError> {
    let conversation_id = parse_uuid("conversation id", required(&message.conversation_id)?)?;
    let time_stamp = to_timestamp(message.time.clone()?)?;
    let users = affected_users(message)?;
    match message.kind {
        Ok(MessageKind::MemberJoin) => Ok(MembershipEvent::Added(ConversationAddMember {
            conversation_id,
            time_stamp,
            adding_user: parse_uuid("user id", required(&message.user_id)?)?,
            added_users: users,
        })),
        _ => Ok(MembershipEvent::Left(ConversationLeaveMembers {
            conversation_id,
            time_stamp,
            leaving_members: users,
        })),
    }
}

/// An unreadable list degrades the event to zero users; a malformed id in a
/// readable list fails the row.
fn affected_users(message: &MessageRow) -> Result<Vec<Uuid>, RowError> {
    match &message.members {
        Ok(tokens) => tokens
            .iter()
            .map(|t| parse_uuid("affected user id", t))
            .collect(),
        Err(e) => {
            debug!(key = %message.source.key, reason = %e, "member list unreadable, event kept without users");
            Ok(Vec::new())
        }
    }
}

// ── Field helpers ───────────────────────────────────────────────────────────

fn required(field: &Field<String>) -> Result<&str, RowError> {
    field
        .as_deref()
        .map_err(|e| RowError::Field(e.clone()))
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, RowError> {
    Uuid::parse_str(value).map_err(|_| RowError::InvalidUuid {
        field,
        value: value.to_string(),
    })
}

fn to_timestamp(time: EpochMillis) -> Result<DateTime<Utc>, RowError> {
    DateTime::from_timestamp_millis(time.0).ok_or(RowError::Timestamp(time.0))
}
