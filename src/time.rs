//! Wall-clock helpers shared by every component that stamps documents.

/// Current time in milliseconds since the Unix epoch, the resolution used
/// throughout Iceberg metadata (`last-updated-ms`, `timestamp-ms`, ...).
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
