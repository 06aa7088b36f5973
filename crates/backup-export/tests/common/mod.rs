//! Fixture backups: small Android and iOS databases written with sqlx and
//! sealed into containers with cheap KDF costs.

#![allow(dead_code)]

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use backup_envelope::{seal, KdfParams, SealSettings};
use backup_export::{ExportConfig, ExportRequest, Platform};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tempfile::TempDir;
use uuid::Uuid;

pub const PASSPHRASE: &str = "correct horse battery staple";

pub const ME: &str = "00000000-0000-4000-8000-00000000000a";
pub const BOB: &str = "00000000-0000-4000-8000-00000000000b";
pub const CAROL: &str = "00000000-0000-4000-8000-00000000000c";

pub const CONV_TEAM: &str = "11111111-0000-4000-8000-000000000001";
pub const CONV_DM: &str = "11111111-0000-4000-8000-000000000002";
pub const CONV_BROKEN: &str = "not-a-uuid";

/// Seconds since 2001-01-01 are whole for every fixture time, so iOS v1 REAL
/// timestamps convert back exactly.
pub const T_JOIN: i64 = 1_600_000_000_000;
pub const T_LEAVE_UNKNOWN: i64 = 1_600_000_050_000;
pub const T_LEAVE: i64 = 1_600_000_100_000;
pub const T_BAD_JOIN: i64 = 1_600_000_200_000;

pub fn uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap()
}

pub fn cheap_settings() -> SealSettings {
    SealSettings {
        chunk_size: 4096,
        kdf: KdfParams {
            time_cost: 1,
            memory_cost_kib: 64,
            parallelism: 1,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Join,
    Leave,
    Text,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: &'static str,
    pub name: Option<&'static str>,
    pub members: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct Message {
    /// Index into `Dataset::conversations`.
    pub conversation: usize,
    pub kind: Kind,
    pub user: &'static str,
    /// Comma-joined user ids, as the clients store them.
    pub members: Option<String>,
    pub time_ms: i64,
}

/// Platform-neutral description of a backup's contents.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
}

/// Shared by every platform and version:
///  - "Team" (named, three members) with a join, a text, a leave without a
///    member list and a leave by Carol
///  - a direct conversation between me and Bob whose only join names a
///    malformed user id
///  - a named conversation whose id is not a UUID and has no members
pub fn standard_dataset() -> Dataset {
    Dataset {
        conversations: vec![
            Conversation {
                id: CONV_TEAM,
                name: Some("Team"),
                members: vec![ME, BOB, CAROL],
            },
            Conversation {
                id: CONV_DM,
                name: None,
                members: vec![ME, BOB],
            },
            Conversation {
                id: CONV_BROKEN,
                name: Some("Broken"),
                members: vec![],
            },
        ],
        messages: vec![
            Message {
                conversation: 0,
                kind: Kind::Join,
                user: ME,
                members: Some(format!("{BOB},{CAROL}")),
                time_ms: T_JOIN,
            },
            Message {
                conversation: 0,
                kind: Kind::Text,
                user: BOB,
                members: None,
                time_ms: T_JOIN + 1_000,
            },
            Message {
                conversation: 0,
                kind: Kind::Leave,
                user: CAROL,
                members: Some(CAROL.into()),
                time_ms: T_LEAVE,
            },
            Message {
                conversation: 1,
                kind: Kind::Join,
                user: ME,
                members: Some("garbage-user".into()),
                time_ms: T_BAD_JOIN,
            },
            Message {
                conversation: 0,
                kind: Kind::Leave,
                user: BOB,
                members: None,
                time_ms: T_LEAVE_UNKNOWN,
            },
        ],
    }
}

// ── Database builders ───────────────────────────────────────────────────────

pub async fn create_db(path: &Path) -> SqlitePool {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    SqlitePool::connect_with(opts).await.expect("create fixture db")
}

pub async fn exec(pool: &SqlitePool, sql: &str) {
    sqlx::query(sql).execute(pool).await.expect(sql);
}

pub async fn set_metadata(pool: &SqlitePool, platform: Platform, version: &str) {
    let layout = platform.layout();
    let meta = &layout.metadata;
    exec(
        pool,
        &format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT, {} TEXT)",
            meta.table, meta.key_column, meta.value_column
        ),
    )
    .await;
    sqlx::query(&format!(
        "INSERT INTO {} ({}, {}) VALUES (?, ?)",
        meta.table, meta.key_column, meta.value_column
    ))
    .bind(meta.version_key)
    .bind(version)
    .execute(pool)
    .await
    .expect("insert version marker");
}

/// Android schema. v1 has no metadata table at all.
pub async fn write_android(pool: &SqlitePool, version: u32, data: &Dataset) {
    let time_column = if version >= 2 { "server_time" } else { "time" };
    exec(pool, "CREATE TABLE Conversations (_id TEXT PRIMARY KEY, name TEXT)").await;
    exec(
        pool,
        &format!(
            "CREATE TABLE Messages (_id TEXT PRIMARY KEY, conv_id TEXT, msg_type TEXT, \
             user_id TEXT, members TEXT, {time_column} INTEGER)"
        ),
    )
    .await;
    exec(pool, "CREATE TABLE ConversationMembers (conv_id TEXT, user_id TEXT)").await;

    for conversation in &data.conversations {
        sqlx::query("INSERT INTO Conversations (_id, name) VALUES (?, ?)")
            .bind(conversation.id)
            .bind(conversation.name)
            .execute(pool)
            .await
            .expect("insert conversation");
        for member in &conversation.members {
            sqlx::query("INSERT INTO ConversationMembers (conv_id, user_id) VALUES (?, ?)")
                .bind(conversation.id)
                .bind(*member)
                .execute(pool)
                .await
                .expect("insert member");
        }
    }

    for (i, message) in data.messages.iter().enumerate() {
        let msg_type = match (version >= 2, message.kind) {
            (false, Kind::Join) => "MemberJoin",
            (false, Kind::Leave) => "MemberLeave",
            (false, Kind::Text) => "Text",
            (true, Kind::Join) => "MEMBER_JOIN",
            (true, Kind::Leave) => "MEMBER_LEAVE",
            (true, Kind::Text) => "TEXT",
        };
        sqlx::query(&format!(
            "INSERT INTO Messages (_id, conv_id, msg_type, user_id, members, {time_column}) \
             VALUES (?, ?, ?, ?, ?, ?)"
        ))
        .bind(format!("m{}", i + 1))
        .bind(data.conversations[message.conversation].id)
        .bind(msg_type)
        .bind(message.user)
        .bind(message.members.as_deref())
        .bind(message.time_ms)
        .execute(pool)
        .await
        .expect("insert message");
    }

    if version >= 2 {
        set_metadata(pool, Platform::Android, &version.to_string()).await;
    }
}

/// iOS Core Data schema. Rows point at conversations by `Z_PK`.
pub async fn write_ios(pool: &SqlitePool, version: u32, data: &Dataset) {
    let (name_column, time_column, time_type) = if version >= 2 {
        ("ZNAME", "ZSERVERTIMESTAMPMS", "INTEGER")
    } else {
        ("ZUSERDEFINEDNAME", "ZSERVERTIMESTAMP", "REAL")
    };
    exec(
        pool,
        &format!(
            "CREATE TABLE ZCONVERSATION (Z_PK INTEGER PRIMARY KEY, ZREMOTEIDENTIFIER TEXT, \
             {name_column} TEXT)"
        ),
    )
    .await;
    exec(
        pool,
        &format!(
            "CREATE TABLE ZMESSAGE (Z_PK INTEGER PRIMARY KEY, ZCONVERSATION INTEGER, \
             ZSYSTEMMESSAGETYPE INTEGER, ZSENDER TEXT, ZUSERS TEXT, {time_column} {time_type})"
        ),
    )
    .await;
    exec(
        pool,
        "CREATE TABLE ZPARTICIPANTROLE (Z_PK INTEGER PRIMARY KEY, ZCONVERSATION INTEGER, ZUSER TEXT)",
    )
    .await;

    for (i, conversation) in data.conversations.iter().enumerate() {
        let pk = i as i64 + 1;
        sqlx::query(&format!(
            "INSERT INTO ZCONVERSATION (Z_PK, ZREMOTEIDENTIFIER, {name_column}) VALUES (?, ?, ?)"
        ))
        .bind(pk)
        .bind(conversation.id)
        .bind(conversation.name)
        .execute(pool)
        .await
        .expect("insert conversation");
        for member in &conversation.members {
            sqlx::query("INSERT INTO ZPARTICIPANTROLE (ZCONVERSATION, ZUSER) VALUES (?, ?)")
                .bind(pk)
                .bind(*member)
                .execute(pool)
                .await
                .expect("insert participant");
        }
    }

    for message in &data.messages {
        let system_type: Option<i64> = match message.kind {
            Kind::Join => Some(1),
            Kind::Leave => Some(2),
            Kind::Text => None,
        };
        let query = format!(
            "INSERT INTO ZMESSAGE (ZCONVERSATION, ZSYSTEMMESSAGETYPE, ZSENDER, ZUSERS, {time_column}) \
             VALUES (?, ?, ?, ?, ?)"
        );
        let query = sqlx::query(&query)
            .bind(message.conversation as i64 + 1)
            .bind(system_type)
            .bind(message.user)
            .bind(message.members.as_deref());
        let query = if version >= 2 {
            query.bind(message.time_ms)
        } else {
            query.bind(message.time_ms as f64 / 1000.0 - 978_307_200.0)
        };
        query.execute(pool).await.expect("insert message");
    }

    if version >= 2 {
        set_metadata(pool, Platform::Ios, &version.to_string()).await;
    }
}

// ── Containers ──────────────────────────────────────────────────────────────

pub fn seal_file(plaintext: &Path, container: &Path) {
    let input = BufReader::new(File::open(plaintext).expect("open plaintext"));
    let output = File::create(container).expect("create container");
    seal(input, output, PASSPHRASE.as_bytes(), &cheap_settings()).expect("seal");
}

pub fn seal_bytes(plaintext: &[u8], container: &Path) {
    let output = File::create(container).expect("create container");
    seal(plaintext, output, PASSPHRASE.as_bytes(), &cheap_settings()).expect("seal");
}

/// A sealed backup plus the directories the export job needs.
pub struct Fixture {
    pub dir: TempDir,
    pub container: PathBuf,
    pub scratch: PathBuf,
}

impl Fixture {
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let container = dir.path().join("backup.enc");
        let scratch = dir.path().join("scratch");
        Self {
            dir,
            container,
            scratch,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("plain.db")
    }

    /// Build the database with `build`, then seal it.
    pub async fn sealed_with<F, Fut>(build: F) -> Self
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: std::future::Future<Output = SqlitePool>,
    {
        let fixture = Self::empty();
        let pool = build(create_db(&fixture.db_path()).await).await;
        pool.close().await;
        seal_file(&fixture.db_path(), &fixture.container);
        fixture
    }

    pub async fn standard(platform: Platform, version: u32) -> Self {
        Self::sealed_with(|pool| async move {
            let data = standard_dataset();
            match platform {
                Platform::Android => write_android(&pool, version, &data).await,
                Platform::Ios => write_ios(&pool, version, &data).await,
            }
            pool
        })
        .await
    }

    pub fn request(&self, platform: Platform) -> ExportRequest {
        ExportRequest::new(self.container.clone(), PASSPHRASE, platform, uuid(ME))
    }

    pub fn config(&self) -> ExportConfig {
        ExportConfig {
            scratch_dir: Some(self.scratch.clone()),
            ..ExportConfig::default()
        }
    }
}
