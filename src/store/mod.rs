mod mem_market_store;
mod schema;
mod sqlite_market_store;

pub use mem_market_store::MemMarketStore;
pub use schema::MARKET_VERSIONED_SCHEMAS;
pub use sqlite_market_store::SqliteMarketStore;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sqlite_persistence::Table;

/// A database row as it travels through an archive: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketTable {
    Beats,
    Genres,
    Users,
    Purchases,
    Customers,
    Payments,
    Settings,
}

impl MarketTable {
    pub const ALL: [MarketTable; 7] = [
        MarketTable::Beats,
        MarketTable::Genres,
        MarketTable::Users,
        MarketTable::Purchases,
        MarketTable::Customers,
        MarketTable::Payments,
        MarketTable::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        self.schema().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn schema(&self) -> &'static Table {
        match self {
            MarketTable::Beats => &schema::BEATS_TABLE_V1,
            MarketTable::Genres => &schema::GENRES_TABLE_V1,
            MarketTable::Users => &schema::USERS_TABLE_V1,
            MarketTable::Purchases => &schema::PURCHASES_TABLE_V1,
            MarketTable::Customers => &schema::CUSTOMERS_TABLE_V1,
            MarketTable::Payments => &schema::PAYMENTS_TABLE_V1,
            MarketTable::Settings => &schema::SETTINGS_TABLE_V1,
        }
    }

    /// Column identifying a row; every marketplace table has a single-column key.
    pub fn key_column(&self) -> &'static str {
        self.schema().primary_key().unwrap_or("id")
    }
}

impl fmt::Display for MarketTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How archived rows meet rows already in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Archived rows win on key conflicts.
    Replace,
    /// Existing rows win on key conflicts.
    Merge,
}

pub trait MarketStore: Send + Sync {
    fn count_rows(&self, table: MarketTable) -> Result<u64>;

    /// All rows of a table, ordered by key.
    fn export_rows(&self, table: MarketTable) -> Result<Vec<Row>>;

    fn clear_table(&self, table: MarketTable) -> Result<()>;

    /// Writes archived rows and returns how many were written. Columns unknown
    /// to the table are ignored.
    fn import_rows(&self, table: MarketTable, rows: &[Row], mode: ImportMode) -> Result<usize>;

    fn get_row(&self, table: MarketTable, key: &str) -> Result<Option<Row>>;
}

/// Textual form of a row key, shared by both stores.
pub(crate) fn key_of(row: &Row, table: MarketTable) -> Option<String> {
    match row.get(table.key_column())? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Drops columns the table does not declare.
pub(crate) fn known_columns(row: &Row, table: MarketTable) -> Row {
    let schema = table.schema();
    row.iter()
        .filter(|(name, _)| schema.columns.iter().any(|c| c.name == name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
