//! Accounts and their premium-claim state.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::Timestamp;

/// Minimum length of a pseudo, in characters.
pub const MIN_PSEUDO_LEN: usize = 3;

/// A persisted account. `pseudo` is the identity carried by claim tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub pseudo: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    pub is_premium: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub premium_claimed_at: Option<Timestamp>,
}

impl Account {
    /// Fresh account: not premium, never claimed.
    pub fn new(pseudo: impl Into<String>, created_at: Timestamp) -> Self {
        let pseudo = pseudo.into();
        Self {
            id: account_id_for(&pseudo),
            pseudo,
            created_at,
            is_premium: false,
            premium_claimed_at: None,
        }
    }

    pub fn claim_state(&self) -> AccountClaimState {
        AccountClaimState {
            identity: self.pseudo.clone(),
            is_premium: self.is_premium,
            premium_claimed_at: self.premium_claimed_at,
        }
    }
}

/// The slice of an account the claim workflow reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountClaimState {
    pub identity: String,
    pub is_premium: bool,
    pub premium_claimed_at: Option<Timestamp>,
}

impl AccountClaimState {
    /// Time left before another claim is allowed, or `None` when the account
    /// may claim now.
    pub fn cooldown_remaining(&self, now: Timestamp, cooldown: Duration) -> Option<Duration> {
        let claimed_at = self.premium_claimed_at?;
        let elapsed = now - claimed_at;
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }
}

/// Result of a conditional claim commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimCommit {
    /// The update applied; carries the state after the write.
    Committed(AccountClaimState),
    /// `premium_claimed_at` no longer matched the expected value.
    Stale,
}

/// Deterministic account id: UUIDv5 of the pseudo in the DNS namespace.
pub fn account_id_for(pseudo: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, pseudo.as_bytes())
}

/// Trim and check a requested pseudo.
pub fn validate_pseudo(raw: &str) -> Result<String, ValidationError> {
    let pseudo = raw.trim();
    if pseudo.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "pseudo".to_string(),
        });
    }
    if pseudo.chars().count() < MIN_PSEUDO_LEN {
        return Err(ValidationError::InvalidValue {
            field: "pseudo".to_string(),
            reason: format!("must be at least {} characters", MIN_PSEUDO_LEN),
        });
    }
    Ok(pseudo.to_string())
}
