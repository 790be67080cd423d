//! Session credential deadline check.
//!
//! Pure function of the clock and the configured expiry; the caller
//! mutates run state on the Expired answer. Repeated calls after expiry
//! keep returning Expired.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Valid,
    Expired,
}

/// A missing expiry means the credential never expires.
pub fn credential_status(
    now: DateTime<Utc>,
    expiry: Option<DateTime<Utc>>,
) -> CredentialStatus {
    match expiry {
        Some(deadline) if now > deadline => CredentialStatus::Expired,
        _ => CredentialStatus::Valid,
    }
}
