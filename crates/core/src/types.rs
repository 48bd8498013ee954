/// Jobs, storyboards and shots are keyed by opaque string ids.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a prefixed short id such as `job_3f2a9c1e0b7d`.
///
/// `hex_len` characters of a v4 UUID's simple form are kept after the
/// prefix and underscore.
pub fn prefixed_id(prefix: &str, hex_len: usize) -> EntityId {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &simple[..hex_len.min(simple.len())])
}
