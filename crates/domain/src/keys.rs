//! Key formats shared with other services. These strings are read by
//! processes written against the same store, so they must not change.

use crate::ResourceKind;

/// Common prefix of every write-flag key.
pub const WRITE_FLAG_KEY_PREFIX: &str = "db_last_write_flag";

/// Flag key marking a recent write to one entity.
#[must_use]
pub fn write_flag_key_by_id(kind: ResourceKind, id: &str) -> String {
    format!("{WRITE_FLAG_KEY_PREFIX}:resource:{}:{id}", kind.as_str())
}

/// Flag key marking a recent write somewhere inside one search scope.
#[must_use]
pub fn write_flag_key_by_scope(kind: ResourceKind, scope: &str) -> String {
    format!("{WRITE_FLAG_KEY_PREFIX}:search:{}:{scope}", kind.as_str())
}

/// Lock key guarding the uniqueness check and insert of a new tag.
#[must_use]
pub fn create_tag_lock_key(space_id: i64, tag_name: &str) -> String {
    format!("create_tag_key_{space_id}_{tag_name}")
}

/// Lock key guarding update sequences of an existing tag key.
#[must_use]
pub fn update_tag_lock_key(space_id: i64, tag_key_id: i64) -> String {
    format!("update_tag_key_{space_id}_{tag_key_id}")
}
