/// All platform primary keys are integer serials.
pub type DbId = i64;

/// Timestamps as emitted by the platform: naive ISO-8601, always UTC.
pub type Timestamp = chrono::NaiveDateTime;
