//! The telehealth bucket catalog.

use carestate_store::StoreBuilder;
use serde_json::json;

/// Keyed records: accounts, profiles, sessions, and lookup tables.
pub const MAPPINGS: &[&str] = &[
    "users",
    "doctors",
    "patients",
    "consultations",
    "video_rooms",
    "refresh_tokens",
    "translations",
];

/// Append-mostly logs.
pub const SEQUENCES: &[&str] = &["appointments", "messages", "prescriptions", "audit_log"];

/// Register every catalog bucket with an empty default.
pub fn register_catalog(mut builder: StoreBuilder) -> StoreBuilder {
    for name in MAPPINGS {
        builder = builder.mapping(*name, json!({}));
    }
    for name in SEQUENCES {
        builder = builder.sequence(*name, json!([]));
    }
    builder
}
