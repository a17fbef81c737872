use anyhow::{bail, Context, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::schema::MARKET_VERSIONED_SCHEMAS;
use super::{known_columns, ImportMode, MarketStore, MarketTable, Row};
use crate::sqlite_persistence::{VersionedSchema, BASE_DB_VERSION};

pub struct SqliteMarketStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMarketStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open marketplace database")?;

        if is_new_db {
            info!("Creating new marketplace database at {:?}", path);
            latest_schema()?.create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;
            if db_version < 1 {
                bail!(
                    "Marketplace database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let schema = MARKET_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown marketplace database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Marketplace database schema validation failed for version {}",
                    db_version
                )
            })?;

            let current_version = latest_schema()?.version;
            if (db_version as usize) < current_version {
                Self::migrate(&mut conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        latest_schema()?.create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest = from_version;
        for schema in MARKET_VERSIONED_SCHEMAS.iter().filter(|s| s.version > from_version) {
            info!(
                "Migrating marketplace database from version {} to {}",
                latest, schema.version
            );
            if let Some(migration) = schema.migration {
                migration(&tx)
                    .with_context(|| format!("Failed to run migration to version {}", schema.version))?;
            }
            latest = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn latest_schema() -> Result<&'static VersionedSchema> {
    MARKET_VERSIONED_SCHEMAS
        .last()
        .context("No marketplace schema declared")
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::from(b.to_vec()),
    }
}

impl MarketStore for SqliteMarketStore {
    fn count_rows(&self, table: MarketTable) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM {}", table.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn export_rows(&self, table: MarketTable) -> Result<Vec<Row>> {
        let columns = table.schema().column_names();
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            table.as_str(),
            table.key_column()
        ))?;
        let rows = stmt
            .query_map([], |row| {
                let mut out = Row::new();
                for (i, name) in columns.iter().enumerate() {
                    out.insert(name.to_string(), sql_to_json(row.get_ref(i)?));
                }
                Ok(out)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to export table {}", table))?;
        Ok(rows)
    }

    fn clear_table(&self, table: MarketTable) -> Result<()> {
        let deleted = self
            .conn()
            .execute(&format!("DELETE FROM {}", table.as_str()), [])?;
        debug!("Cleared {} rows from {}", deleted, table);
        Ok(())
    }

    fn import_rows(&self, table: MarketTable, rows: &[Row], mode: ImportMode) -> Result<usize> {
        let verb = match mode {
            ImportMode::Replace => "INSERT OR REPLACE",
            ImportMode::Merge => "INSERT OR IGNORE",
        };

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0;
        for row in rows {
            let row = known_columns(row, table);
            if row.is_empty() {
                continue;
            }
            let names: Vec<&str> = row.keys().map(|k| k.as_str()).collect();
            let placeholders = vec!["?"; names.len()].join(", ");
            let sql = format!(
                "{} INTO {} ({}) VALUES ({})",
                verb,
                table.as_str(),
                names.join(", "),
                placeholders
            );
            written += tx
                .execute(&sql, params_from_iter(row.values().map(json_to_sql)))
                .with_context(|| format!("Failed to import row into {}", table))?;
        }
        tx.commit()?;
        Ok(written)
    }

    fn get_row(&self, table: MarketTable, key: &str) -> Result<Option<Row>> {
        let columns = table.schema().column_names();
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    columns.join(", "),
                    table.as_str(),
                    table.key_column()
                ),
                [key],
                |row| {
                    let mut out = Row::new();
                    for (i, name) in columns.iter().enumerate() {
                        out.insert(name.to_string(), sql_to_json(row.get_ref(i)?));
                    }
                    Ok(out)
                },
            )
            .optional()?;
        Ok(row)
    }
}
