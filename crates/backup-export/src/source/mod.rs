//! Source loaders: open a decrypted backup database read-only and index its
//! raw conversation, message and membership rows.
//!
//! The Android and iOS clients store the same facts under different table
//! and column names. [`TableLayout`] captures where each platform keeps
//! them; everything above this module sees only [`PlaintextStore`].

mod store;
mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use store::{PlaintextStore, SourceStore};
pub use value::{RawRow, RawValue, RowKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn layout(self) -> &'static TableLayout {
        match self {
            Platform::Android => &ANDROID_LAYOUT,
            Platform::Ios => &IOS_LAYOUT,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => f.write_str("android"),
            Platform::Ios => f.write_str("ios"),
        }
    }
}

/// A table plus the column its rows are indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub key_column: &'static str,
}

/// Optional key/value table holding the schema version marker row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataSpec {
    pub table: &'static str,
    pub key_column: &'static str,
    pub value_column: &'static str,
    pub version_key: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub platform: Platform,
    pub conversations: TableSpec,
    pub messages: TableSpec,
    /// Membership rows, grouped by the conversation reference in `key_column`.
    pub members: TableSpec,
    pub metadata: MetadataSpec,
}

impl TableLayout {
    pub fn required_tables(&self) -> [&'static str; 3] {
        [
            self.conversations.name,
            self.messages.name,
            self.members.name,
        ]
    }
}

pub static ANDROID_LAYOUT: TableLayout = TableLayout {
    platform: Platform::Android,
    conversations: TableSpec {
        name: "Conversations",
        key_column: "_id",
    },
    messages: TableSpec {
        name: "Messages",
        key_column: "_id",
    },
    members: TableSpec {
        name: "ConversationMembers",
        key_column: "conv_id",
    },
    metadata: MetadataSpec {
        table: "BackupMetadata",
        key_column: "key",
        value_column: "value",
        version_key: "schema_version",
    },
};

pub static IOS_LAYOUT: TableLayout = TableLayout {
    platform: Platform::Ios,
    conversations: TableSpec {
        name: "ZCONVERSATION",
        key_column: "Z_PK",
    },
    messages: TableSpec {
        name: "ZMESSAGE",
        key_column: "Z_PK",
    },
    members: TableSpec {
        name: "ZPARTICIPANTROLE",
        key_column: "ZCONVERSATION",
    },
    metadata: MetadataSpec {
        table: "ZBACKUPMETADATA",
        key_column: "ZKEY",
        value_column: "ZVALUE",
        version_key: "schema_version",
    },
};
