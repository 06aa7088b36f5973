//! Canonical export model. Versionless and platform-agnostic; this is what
//! the report generator and the packager consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedConversation {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectConversation {
    pub id: Uuid,
    /// The participant who is not the exporting user.
    pub other_user: Uuid,
}

/// Current roster of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMembers {
    pub conversation_id: Uuid,
    pub users: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAddMember {
    pub conversation_id: Uuid,
    pub time_stamp: DateTime<Utc>,
    pub adding_user: Uuid,
    pub added_users: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationLeaveMembers {
    pub conversation_id: Uuid,
    pub time_stamp: DateTime<Utc>,
    pub leaving_members: Vec<Uuid>,
}

/// A roster change derived from a membership-typed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Added(ConversationAddMember),
    Left(ConversationLeaveMembers),
}

impl MembershipEvent {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            MembershipEvent::Added(e) => e.conversation_id,
            MembershipEvent::Left(e) => e.conversation_id,
        }
    }

    pub fn time_stamp(&self) -> DateTime<Utc> {
        match self {
            MembershipEvent::Added(e) => e.time_stamp,
            MembershipEvent::Left(e) => e.time_stamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalExport {
    pub named_conversations: Vec<NamedConversation>,
    pub direct_conversations: Vec<DirectConversation>,
    pub conversation_members: Vec<ConversationMembers>,
    pub added_members: Vec<ConversationAddMember>,
    pub left_members: Vec<ConversationLeaveMembers>,
}
