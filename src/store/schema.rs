//! SQLite schema of the marketplace database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

// =============================================================================
// Version 1
// =============================================================================

pub const GENRES_TABLE_V1: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
    ],
    indices: &[],
};

pub const BEATS_TABLE_V1: Table = Table {
    name: "beats",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("producer", &SqlType::Text, non_null = true),
        sqlite_column!("genre_id", &SqlType::Text),
        sqlite_column!("bpm", &SqlType::Integer),
        sqlite_column!("musical_key", &SqlType::Text),
        sqlite_column!("price_cents", &SqlType::Integer, non_null = true),
        sqlite_column!("audio_path", &SqlType::Text),
        sqlite_column!("artwork_path", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_beats_genre", "genre_id")],
};

pub const USERS_TABLE_V1: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("username", &SqlType::Text, non_null = true),
        sqlite_column!("password_hash", &SqlType::Text, non_null = true),
        sqlite_column!("role", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

pub const CUSTOMERS_TABLE_V1: Table = Table {
    name: "customers",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_customers_email", "email")],
};

pub const PURCHASES_TABLE_V1: Table = Table {
    name: "purchases",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("beat_id", &SqlType::Text, non_null = true),
        sqlite_column!("customer_id", &SqlType::Text, non_null = true),
        sqlite_column!("license_type", &SqlType::Text, non_null = true),
        sqlite_column!("amount_cents", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "purchased_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_purchases_customer", "customer_id")],
};

pub const PAYMENTS_TABLE_V1: Table = Table {
    name: "payments",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("purchase_id", &SqlType::Text, non_null = true),
        sqlite_column!("provider", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("amount_cents", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_payments_purchase", "purchase_id")],
};

pub const SETTINGS_TABLE_V1: Table = Table {
    name: "settings",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const MARKET_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        GENRES_TABLE_V1,
        BEATS_TABLE_V1,
        USERS_TABLE_V1,
        CUSTOMERS_TABLE_V1,
        PURCHASES_TABLE_V1,
        PAYMENTS_TABLE_V1,
        SETTINGS_TABLE_V1,
    ],
    migration: None,
}];
