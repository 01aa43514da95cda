/// Remote records (jobs, outfits, owners) are keyed by UUID.
pub type RecordId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
