//! Seed data for the marketplace database and the uploads directory

use super::constants::*;
use anyhow::Result;
use beatvault::store::{ImportMode, MarketStore, MarketTable, Row, SqliteMarketStore};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

/// Deterministic bytes that deflate poorly, so archives keep their size.
pub fn media_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

pub fn seed_market(store: &dyn MarketStore) -> Result<()> {
    store.import_rows(
        MarketTable::Genres,
        &rows(vec![
            json!({"id": GENRE_TRAP_ID, "name": "Trap", "description": "808s and hi-hats"}),
            json!({"id": GENRE_LOFI_ID, "name": "Lo-fi"}),
        ]),
        ImportMode::Replace,
    )?;
    store.import_rows(
        MarketTable::Beats,
        &rows(vec![
            json!({"id": BEAT_1_ID, "title": BEAT_1_TITLE, "producer": "K. Vale",
                   "genre_id": GENRE_TRAP_ID, "bpm": 140, "musical_key": "F# minor",
                   "price_cents": 2999, "audio_path": "beats/beat-1.mp3",
                   "artwork_path": "artwork/beat-1.jpg"}),
            json!({"id": BEAT_2_ID, "title": "Rainy Tape", "producer": "K. Vale",
                   "genre_id": GENRE_LOFI_ID, "bpm": 82, "price_cents": 1999,
                   "audio_path": "beats/beat-2.mp3"}),
            json!({"id": BEAT_3_ID, "title": "Warehouse", "producer": "Nox",
                   "genre_id": GENRE_TRAP_ID, "price_cents": 4999,
                   "audio_path": "beats/beat-3.wav"}),
        ]),
        ImportMode::Replace,
    )?;
    store.import_rows(
        MarketTable::Users,
        &rows(vec![
            json!({"id": USER_ADMIN_ID, "username": "admin", "password_hash": "$argon2id$x", "role": "admin"}),
            json!({"id": "user-editor", "username": "editor", "password_hash": "$argon2id$y", "role": "editor"}),
        ]),
        ImportMode::Replace,
    )?;
    store.import_rows(
        MarketTable::Customers,
        &rows(vec![
            json!({"id": CUSTOMER_1_ID, "email": "ada@example.com", "name": "Ada"}),
        ]),
        ImportMode::Replace,
    )?;
    store.import_rows(
        MarketTable::Purchases,
        &rows(vec![json!({"id": PURCHASE_1_ID, "beat_id": BEAT_1_ID,
                          "customer_id": CUSTOMER_1_ID, "license_type": "exclusive",
                          "amount_cents": 2999})]),
        ImportMode::Replace,
    )?;
    store.import_rows(
        MarketTable::Payments,
        &rows(vec![json!({"id": PAYMENT_1_ID, "purchase_id": PURCHASE_1_ID,
                          "provider": "stripe", "status": "succeeded",
                          "amount_cents": 2999})]),
        ImportMode::Replace,
    )?;
    store.import_rows(
        MarketTable::Settings,
        &rows(vec![
            json!({"key": "store_name", "value": "Vale Beats"}),
            json!({"key": "currency", "value": "EUR"}),
        ]),
        ImportMode::Replace,
    )?;
    Ok(())
}

pub fn seed_uploads(uploads_path: &Path) -> Result<()> {
    for (i, (relative, size)) in SEEDED_MEDIA.iter().enumerate() {
        let path = uploads_path.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, media_bytes(i as u64 + 1, *size))?;
    }
    Ok(())
}

/// Creates a data directory with a database and an uploads directory.
/// Returns (temp_dir, store, uploads_path)
pub fn create_test_data_dir(seeded: bool) -> Result<(TempDir, SqliteMarketStore, PathBuf)> {
    let dir = TempDir::new()?;
    let uploads_path = dir.path().join("uploads");
    fs::create_dir_all(&uploads_path)?;

    let store = SqliteMarketStore::new(dir.path().join("beatvault.db"))?;
    if seeded {
        seed_market(&store)?;
        seed_uploads(&uploads_path)?;
    }
    Ok((dir, store, uploads_path))
}
