//! Shared constants for end-to-end tests
//!
//! When the seeded marketplace changes, update only this file.

// ============================================================================
// Server
// ============================================================================

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Token configured on servers spawned with admin auth.
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Part size small enough to split the seeded backup into several parts.
pub const SMALL_PART_SIZE: u64 = 16 * 1024;

/// Delay between part deliveries used by test clients.
pub const FAST_PART_INTERVAL_MS: u64 = 20;

// ============================================================================
// Seeded marketplace
// ============================================================================

pub const GENRE_TRAP_ID: &str = "genre-trap";
pub const GENRE_LOFI_ID: &str = "genre-lofi";

pub const BEAT_1_ID: &str = "beat-1";
pub const BEAT_1_TITLE: &str = "Midnight Drive";
pub const BEAT_2_ID: &str = "beat-2";
pub const BEAT_3_ID: &str = "beat-3";

pub const USER_ADMIN_ID: &str = "user-admin";
pub const CUSTOMER_1_ID: &str = "customer-1";
pub const PURCHASE_1_ID: &str = "purchase-1";
pub const PAYMENT_1_ID: &str = "payment-1";

pub const SEEDED_GENRES: u64 = 2;
pub const SEEDED_BEATS: u64 = 3;
pub const SEEDED_USERS: u64 = 2;
pub const SEEDED_CUSTOMERS: u64 = 1;
pub const SEEDED_PURCHASES: u64 = 1;
pub const SEEDED_PAYMENTS: u64 = 1;
pub const SEEDED_SETTINGS: u64 = 2;

/// Uploaded media, relative to the uploads directory, with their sizes.
pub const SEEDED_MEDIA: &[(&str, usize)] = &[
    ("beats/beat-1.mp3", 24 * 1024),
    ("beats/beat-2.mp3", 20 * 1024),
    ("beats/beat-3.wav", 12 * 1024),
    ("artwork/beat-1.jpg", 6 * 1024),
];
