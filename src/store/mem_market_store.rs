use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{key_of, known_columns, ImportMode, MarketStore, MarketTable, Row};

/// Map-backed store, rows keyed by their primary key.
#[derive(Default)]
pub struct MemMarketStore {
    tables: Mutex<HashMap<MarketTable, BTreeMap<String, Row>>>,
}

impl MemMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<MarketTable, BTreeMap<String, Row>>> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MarketStore for MemMarketStore {
    fn count_rows(&self, table: MarketTable) -> Result<u64> {
        Ok(self.tables().get(&table).map(|t| t.len() as u64).unwrap_or(0))
    }

    fn export_rows(&self, table: MarketTable) -> Result<Vec<Row>> {
        Ok(self
            .tables()
            .get(&table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    fn clear_table(&self, table: MarketTable) -> Result<()> {
        self.tables().remove(&table);
        Ok(())
    }

    fn import_rows(&self, table: MarketTable, rows: &[Row], mode: ImportMode) -> Result<usize> {
        let mut tables = self.tables();
        let target = tables.entry(table).or_default();
        let mut written = 0;
        for row in rows {
            let row = known_columns(row, table);
            let key = key_of(&row, table)
                .with_context(|| format!("Row for {} has no {}", table, table.key_column()))?;
            if mode == ImportMode::Merge && target.contains_key(&key) {
                continue;
            }
            target.insert(key, row);
            written += 1;
        }
        Ok(written)
    }

    fn get_row(&self, table: MarketTable, key: &str) -> Result<Option<Row>> {
        Ok(self.tables().get(&table).and_then(|t| t.get(key).cloned()))
    }
}
