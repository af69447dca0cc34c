use std::path::Path;

use pagemark_core::{
    apply_write, check_batch_len, error::Error, Change, DocId, Document, DocumentStore, Fields,
    LiveQuery, Query, SubscriberHub, Subscription, WriteBatch, WriteKind, DEFAULT_MAX_BATCH_OPS,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::debug;

/// SQLite-backed `DocumentStore` keeping every collection in one `documents` table with the
/// body stored as JSON text; filters and ordering go through `json_extract`.
pub struct SqliteStore {
    conn: Connection,
    hub: SubscriberHub,
    max_batch_ops: usize,
}

impl SqliteStore {
    pub fn new_in_memory() -> pagemark_core::Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    pub fn new(path: impl AsRef<Path>) -> pagemark_core::Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> pagemark_core::Result<Self> {
        let mut store = Self {
            conn,
            hub: SubscriberHub::default(),
            max_batch_ops: DEFAULT_MAX_BATCH_OPS,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn with_max_batch_ops(mut self, max_batch_ops: usize) -> Self {
        self.max_batch_ops = max_batch_ops;
        self
    }

    fn ensure_schema(&mut self) -> pagemark_core::Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS documents (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    revision INTEGER NOT NULL,
                    body TEXT NOT NULL,
                    PRIMARY KEY (collection, id)
                );
                CREATE TABLE IF NOT EXISTS retired_revisions (
                    collection TEXT NOT NULL,
                    id TEXT NOT NULL,
                    revision INTEGER NOT NULL,
                    PRIMARY KEY (collection, id)
                );",
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<(String, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode((id, revision, body): (String, i64, String)) -> pagemark_core::Result<Document> {
    let revision =
        u64::try_from(revision).map_err(|_| Error::Storage(format!("negative revision on {id}")))?;
    let fields: Fields = serde_json::from_str(&body).map_err(|e| Error::Storage(e.to_string()))?;
    Ok(Document::new(id, revision, fields))
}

fn load(
    conn: &Connection,
    collection: &str,
    id: &DocId,
) -> pagemark_core::Result<Option<Document>> {
    let row = conn
        .query_row(
            "SELECT id, revision, body FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id.as_str()],
            row_to_document,
        )
        .optional()
        .map_err(|e| Error::Storage(e.to_string()))?;
    row.map(decode).transpose()
}

/// Revision `id` held when it was last deleted, 0 when it never was.
fn retired_revision(
    conn: &Connection,
    collection: &str,
    id: &DocId,
) -> pagemark_core::Result<u64> {
    let revision: Option<i64> = conn
        .query_row(
            "SELECT revision FROM retired_revisions WHERE collection = ?1 AND id = ?2",
            params![collection, id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Storage(e.to_string()))?;
    revision
        .map(|revision| {
            u64::try_from(revision).map_err(|_| Error::Storage(format!("negative revision on {id}")))
        })
        .transpose()
        .map(Option::unwrap_or_default)
}

/// JSON path for a top-level field. Only plain identifiers are accepted so the path never
/// needs quoting.
fn json_path(field: &str) -> pagemark_core::Result<String> {
    let plain = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !plain {
        return Err(Error::InvalidOperation(format!(
            "field name {field:?} cannot be queried"
        )));
    }
    Ok(format!("$.{field}"))
}

/// Positional parameters collected while the statement text is assembled.
#[derive(Default)]
struct Binds(Vec<SqlValue>);

impl Binds {
    fn push(&mut self, value: impl Into<SqlValue>) -> String {
        self.0.push(value.into());
        format!("?{}", self.0.len())
    }
}

fn number_value(number: &serde_json::Number) -> SqlValue {
    match number.as_i64() {
        Some(n) => SqlValue::Integer(n),
        None => SqlValue::Real(number.as_f64().unwrap_or_default()),
    }
}

fn build_select(query: &Query) -> pagemark_core::Result<(String, Binds)> {
    let mut binds = Binds::default();
    let mut sql = format!(
        "SELECT id, revision, body FROM documents WHERE collection = {}",
        binds.push(query.collection.clone())
    );

    if let Some(filter) = &query.filter {
        let path = binds.push(json_path(&filter.field)?);
        let kind = format!("json_type(body, {path})");
        let clause = match &filter.value {
            Value::Null => format!("({kind} IS NULL OR {kind} = 'null')"),
            Value::Bool(true) => format!("{kind} = 'true'"),
            Value::Bool(false) => format!("{kind} = 'false'"),
            Value::Number(n) => format!(
                "{kind} IN ('integer', 'real') AND json_extract(body, {path}) = {}",
                binds.push(number_value(n))
            ),
            Value::String(s) => format!(
                "{kind} = 'text' AND json_extract(body, {path}) = {}",
                binds.push(s.clone())
            ),
            Value::Array(_) | Value::Object(_) => {
                return Err(Error::InvalidOperation(format!(
                    "cannot filter {} on a nested value",
                    filter.field
                )))
            }
        };
        sql.push_str(" AND ");
        sql.push_str(&clause);
    }

    match &query.order_by {
        Some(field) => {
            let path = binds.push(json_path(field)?);
            // Same ranking as the in-memory store: missing/null, bool, number, text, nested.
            sql.push_str(&format!(
                " ORDER BY CASE COALESCE(json_type(body, {path}), 'null')
                    WHEN 'null' THEN 0
                    WHEN 'true' THEN 1 WHEN 'false' THEN 1
                    WHEN 'integer' THEN 2 WHEN 'real' THEN 2
                    WHEN 'text' THEN 3
                    ELSE 4 END,
                  json_extract(body, {path}), id"
            ));
        }
        None => sql.push_str(" ORDER BY id"),
    }

    if let Some(limit) = query.limit {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sql.push_str(&format!(" LIMIT {}", binds.push(limit)));
    }
    Ok((sql, binds))
}

impl DocumentStore for SqliteStore {
    fn query(&self, query: &Query) -> pagemark_core::Result<Vec<Document>> {
        let (sql, binds) = build_select(query)?;
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(binds.0.iter()), row_to_document)
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(decode(row.map_err(|e| Error::Storage(e.to_string()))?)?);
        }
        Ok(docs)
    }

    fn get(&self, collection: &str, id: &DocId) -> pagemark_core::Result<Option<Document>> {
        load(&self.conn, collection, id)
    }

    fn commit(&mut self, batch: WriteBatch) -> pagemark_core::Result<()> {
        check_batch_len(&batch, self.max_batch_ops)?;
        if batch.is_empty() {
            return Ok(());
        }

        let len = batch.len();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut changes = Vec::with_capacity(len);
        for op in batch.into_ops() {
            let collection = op.target.collection.as_str();
            let before = load(&tx, collection, &op.target.id)?;
            let retired = retired_revision(&tx, collection, &op.target.id)?;
            let after = apply_write(before.as_ref(), retired, &op)?;
            match (&after, &op.kind) {
                (Some(doc), _) => {
                    let revision = i64::try_from(doc.revision)
                        .map_err(|_| Error::Storage("revision overflow".into()))?;
                    let body = serde_json::to_string(&doc.fields)
                        .map_err(|e| Error::Storage(e.to_string()))?;
                    tx.execute(
                        "INSERT OR REPLACE INTO documents (collection, id, revision, body)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![collection, doc.id.as_str(), revision, body],
                    )
                    .map_err(|e| Error::Storage(e.to_string()))?;
                    if retired > 0 {
                        tx.execute(
                            "DELETE FROM retired_revisions WHERE collection = ?1 AND id = ?2",
                            params![collection, doc.id.as_str()],
                        )
                        .map_err(|e| Error::Storage(e.to_string()))?;
                    }
                }
                (None, WriteKind::Delete) => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection, op.target.id.as_str()],
                    )
                    .map_err(|e| Error::Storage(e.to_string()))?;
                    if let Some(doc) = &before {
                        let revision = i64::try_from(doc.revision)
                            .map_err(|_| Error::Storage("revision overflow".into()))?;
                        tx.execute(
                            "INSERT OR REPLACE INTO retired_revisions (collection, id, revision)
                             VALUES (?1, ?2, ?3)",
                            params![collection, doc.id.as_str(), revision],
                        )
                        .map_err(|e| Error::Storage(e.to_string()))?;
                    }
                }
                (None, _) => {
                    return Err(Error::Storage(format!(
                        "{} vanished while applying a write",
                        op.target
                    )))
                }
            }
            changes.push(Change {
                collection: op.target.collection.clone(),
                before,
                after,
            });
        }
        tx.commit().map_err(|e| Error::Storage(e.to_string()))?;
        debug!(ops = len, "sqlite batch committed");

        self.hub.publish(&changes);
        Ok(())
    }

    fn max_batch_ops(&self) -> usize {
        self.max_batch_ops
    }
}

impl LiveQuery for SqliteStore {
    fn subscribe(&mut self, query: Query) -> pagemark_core::Result<Subscription> {
        let initial = self.query(&query)?;
        Ok(self.hub.register(query, initial))
    }
}
