//! Decides whether a cache lookup can be trusted or the backend must be asked.

use broker_core::cache::UserRecord;

use crate::error::PamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Ask the backend. A stale record is kept as an offline fallback.
    QueryProvider { retained: Option<UserRecord> },
    /// Nothing cached and the backend was already asked.
    NotFound,
    UseCached(UserRecord),
}

/// A record is stale once `last_update + timeout < now`. Missing timestamps
/// count as the epoch.
pub fn is_stale(record: &UserRecord, now: i64, timeout_secs: i64) -> bool {
    record.last_update.unwrap_or(0).saturating_add(timeout_secs) < now
}

pub fn evaluate(
    user: &str,
    mut records: Vec<UserRecord>,
    check_provider: bool,
    now: i64,
    timeout_secs: i64,
) -> Result<GateDecision, PamError> {
    if records.len() > 1 {
        return Err(PamError::MultipleMatches {
            user: user.to_string(),
            count: records.len(),
        });
    }

    let decision = match (records.pop(), check_provider) {
        (None, true) => GateDecision::QueryProvider { retained: None },
        (None, false) => GateDecision::NotFound,
        (Some(record), true) if is_stale(&record, now, timeout_secs) => {
            GateDecision::QueryProvider {
                retained: Some(record),
            }
        }
        (Some(record), _) => GateDecision::UseCached(record),
    };
    Ok(decision)
}
