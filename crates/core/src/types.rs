/// Job and batch identifiers are opaque strings (UUIDv4 at the HTTP boundary).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
