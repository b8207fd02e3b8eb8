use std::time::Duration;

/// Commutative hash over a record's key set; the bucketing key for matching.
pub type ShapeHash = u64;
/// Distinguishes otherwise-equal waiting templates.
pub type TemplateId = u64;
pub type TransactionId = u64;

/// Return after at most one match attempt.
pub const NO_WAIT: Option<Duration> = Some(Duration::ZERO);
/// Block until a match arrives or the space closes.
pub const WAIT_FOREVER: Option<Duration> = None;
/// A tuple lifetime without expiry.
pub const FOREVER: Option<Duration> = None;

pub const DEFAULT_SPACE: &str = "default";
