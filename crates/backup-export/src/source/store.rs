//! Read-only access to a decrypted backup database via sqlx.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::value::{RawRow, RawValue, RowKey};
use super::{Platform, TableLayout, TableSpec};
use crate::error::ExportError;

/// Open handle on the decrypted database. Owned by one export job.
pub struct SourceStore {
    pool: SqlitePool,
    layout: &'static TableLayout,
}

impl SourceStore {
    /// Open `path` read-only and check that the platform's tables exist.
    pub async fn open(path: &Path, platform: Platform) -> Result<Self, ExportError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .immutable(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| ExportError::UnreadableStore(format!("open: {e}")))?;
        let store = Self {
            pool,
            layout: platform.layout(),
        };
        let checked = store.check_tables().await;
        if let Err(e) = checked {
            store.close().await;
            return Err(e);
        }
        info!(%platform, path = %path.display(), "backup store opened");
        Ok(store)
    }

    pub fn platform(&self) -> Platform {
        self.layout.platform
    }

    pub fn layout(&self) -> &'static TableLayout {
        self.layout
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn table_names(&self) -> Result<BTreeSet<String>, ExportError> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ExportError::UnreadableStore(format!("schema: {e}")))?;
        Ok(names.into_iter().collect())
    }

    async fn check_tables(&self) -> Result<(), ExportError> {
        let present = self.table_names().await?;
        for table in self.layout.required_tables() {
            if !present.contains(table) {
                return Err(ExportError::MissingTable { table });
            }
        }
        Ok(())
    }

    /// Read the schema version marker. Reads nothing but the metadata table;
    /// no marker table or no marker row means version 1.
    pub async fn detect_version(&self) -> Result<u32, ExportError> {
        let meta = &self.layout.metadata;
        if !self.table_names().await?.contains(meta.table) {
            debug!(table = meta.table, "no metadata table, assuming schema version 1");
            return Ok(1);
        }
        let sql = format!(
            "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ? LIMIT 1",
            meta.value_column, meta.table, meta.key_column
        );
        let row = sqlx::query(&sql)
            .bind(meta.version_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExportError::UnreadableStore(format!("metadata: {e}")))?;
        let Some(row) = row else {
            debug!(table = meta.table, "no version marker row, assuming schema version 1");
            return Ok(1);
        };
        let value = raw_value(&row, 0)?;
        parse_version(self.layout.platform, &value)
    }

    /// Fail with `MissingColumn` unless every listed column exists in `table`.
    pub async fn require_columns(
        &self,
        table: &'static str,
        columns: &[&'static str],
    ) -> Result<(), ExportError> {
        let present: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExportError::UnreadableStore(format!("columns of {table}: {e}")))?;
        for column in columns {
            if !present.iter().any(|name| name == column) {
                return Err(ExportError::MissingColumn { table, column });
            }
        }
        Ok(())
    }

    /// Read the three source tables into memory.
    pub async fn load(&self) -> Result<PlaintextStore, ExportError> {
        let layout = self.layout;
        let conversations = self.read_table(&layout.conversations).await?;
        let messages = self.read_table(&layout.messages).await?;
        let member_rows = self.read_table(&layout.members).await?;

        let mut memberships: BTreeMap<RowKey, Vec<RawRow>> = BTreeMap::new();
        for row in member_rows {
            memberships.entry(row.key.clone()).or_default().push(row);
        }

        let store = PlaintextStore::new(layout, conversations, messages, memberships);
        info!(
            conversations = store.conversations().len(),
            messages = store.messages().len(),
            membership_groups = store.memberships().len(),
            "backup store loaded"
        );
        Ok(store)
    }

    /// Rows in source order: rowid order, or primary-key order for a
    /// `WITHOUT ROWID` table.
    async fn read_table(&self, spec: &TableSpec) -> Result<Vec<RawRow>, ExportError> {
        let sql = if self.has_rowid(spec.name).await? {
            format!("SELECT * FROM \"{}\" ORDER BY rowid", spec.name)
        } else {
            debug!(table = spec.name, "table has no rowid, reading in key order");
            format!("SELECT * FROM \"{}\"", spec.name)
        };
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExportError::UnreadableStore(format!("{}: {e}", spec.name)))?;
        rows.iter().map(|row| raw_row(row, spec.key_column)).collect()
    }

    async fn has_rowid(&self, table: &'static str) -> Result<bool, ExportError> {
        let ddl: Option<Option<String>> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ExportError::UnreadableStore(format!("schema of {table}: {e}")))?;
        Ok(!ddl.flatten().as_deref().is_some_and(declares_without_rowid))
    }
}

fn raw_row(row: &SqliteRow, key_column: &str) -> Result<RawRow, ExportError> {
    let mut columns = BTreeMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        columns.insert(column.name().to_string(), raw_value(row, index)?);
    }
    let key = columns
        .get(key_column)
        .map(RowKey::from)
        .unwrap_or(RowKey::Null);
    Ok(RawRow::new(key, columns))
}

fn raw_value(row: &SqliteRow, index: usize) -> Result<RawValue, ExportError> {
    let value = row.try_get_raw(index)?;
    if value.is_null() {
        return Ok(RawValue::Null);
    }
    let storage_class = value.type_info().name().to_ascii_uppercase();
    let raw = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => RawValue::Integer(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" => RawValue::Real(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => RawValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(index)?),
        _ => RawValue::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(raw)
}

fn declares_without_rowid(ddl: &str) -> bool {
    let words: Vec<String> = ddl
        .split(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';'))
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();
    words.windows(2).any(|pair| pair[0] == "WITHOUT" && pair[1] == "ROWID")
}

fn parse_version(platform: Platform, value: &RawValue) -> Result<u32, ExportError> {
    let parsed = match value {
        RawValue::Integer(n) => u32::try_from(*n).ok(),
        RawValue::Text(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ExportError::UnsupportedSchemaVersion {
        platform,
        version: match value {
            RawValue::Text(s) => s.clone(),
            RawValue::Integer(n) => n.to_string(),
            other => other.type_name().to_string(),
        },
    })
}

/// Decrypted store contents: raw rows indexed by their source keys. Read-only.
#[derive(Debug, Clone)]
pub struct PlaintextStore {
    layout: &'static TableLayout,
    conversations: Vec<RawRow>,
    conversation_index: BTreeMap<RowKey, usize>,
    messages: Vec<RawRow>,
    message_index: BTreeMap<RowKey, usize>,
    memberships: BTreeMap<RowKey, Vec<RawRow>>,
}

impl PlaintextStore {
    pub fn new(
        layout: &'static TableLayout,
        conversations: Vec<RawRow>,
        messages: Vec<RawRow>,
        memberships: BTreeMap<RowKey, Vec<RawRow>>,
    ) -> Self {
        let conversation_index = first_index(&conversations);
        let message_index = first_index(&messages);
        Self {
            layout,
            conversations,
            conversation_index,
            messages,
            message_index,
            memberships,
        }
    }

    pub fn layout(&self) -> &'static TableLayout {
        self.layout
    }

    pub fn platform(&self) -> Platform {
        self.layout.platform
    }

    /// Conversation rows in source order.
    pub fn conversations(&self) -> &[RawRow] {
        &self.conversations
    }

    pub fn conversation(&self, key: &RowKey) -> Option<&RawRow> {
        self.conversation_index
            .get(key)
            .and_then(|&i| self.conversations.get(i))
    }

    /// Message rows in source order.
    pub fn messages(&self) -> &[RawRow] {
        &self.messages
    }

    pub fn message(&self, key: &RowKey) -> Option<&RawRow> {
        self.message_index
            .get(key)
            .and_then(|&i| self.messages.get(i))
    }

    pub fn memberships(&self) -> &BTreeMap<RowKey, Vec<RawRow>> {
        &self.memberships
    }

    pub fn members_of(&self, conversation: &RowKey) -> &[RawRow] {
        self.memberships
            .get(conversation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn first_index(rows: &[RawRow]) -> BTreeMap<RowKey, usize> {
    let mut index = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        index.entry(row.key.clone()).or_insert(i);
    }
    index
}
