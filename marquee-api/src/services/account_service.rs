//! Account Service
//!
//! Account creation, login-by-id and lookup over the account store.

use std::sync::Arc;

use marquee_core::{validate_pseudo, Account, Clock};
use marquee_storage::AccountStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Outcome of a login attempt. An unknown id is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AccountService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountService")
            .field("accounts", &"<AccountStore>")
            .field("clock", &self.clock)
            .finish()
    }
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountStore>, clock: Arc<dyn Clock>) -> Self {
        Self { accounts, clock }
    }

    /// Create an account for `raw_pseudo`.
    ///
    /// # Errors
    /// `MissingField` / `ValidationFailed` for an empty or short pseudo,
    /// `EntityAlreadyExists` when the pseudo is taken.
    pub async fn create(&self, raw_pseudo: &str) -> ApiResult<Account> {
        let pseudo = validate_pseudo(raw_pseudo)?;
        let account = Account::new(pseudo, self.clock.now());
        self.accounts.create_account(&account).await?;
        tracing::info!(account_id = %account.id, pseudo = %account.pseudo, "Account created");
        Ok(account)
    }

    /// Check that an account with `raw_id` exists.
    pub async fn login(&self, raw_id: Option<&str>) -> ApiResult<LoginOutcome> {
        let raw_id = raw_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::missing_field("id"))?;

        let found = match Uuid::parse_str(raw_id) {
            Ok(id) => self.accounts.account_by_id(id).await?.is_some(),
            Err(_) => false,
        };

        Ok(if found {
            LoginOutcome {
                success: true,
                message: None,
            }
        } else {
            LoginOutcome {
                success: false,
                message: Some("User not found".to_string()),
            }
        })
    }

    /// Full account by id.
    pub async fn get(&self, id: Uuid) -> ApiResult<Account> {
        self.accounts
            .account_by_id(id)
            .await?
            .ok_or_else(|| ApiError::account_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use marquee_test_utils::fixtures::manual_clock;
    use marquee_test_utils::{account_id_for, InMemoryAccountStore};

    fn service() -> (InMemoryAccountStore, AccountService) {
        let store = InMemoryAccountStore::new();
        let service = AccountService::new(Arc::new(store.clone()), Arc::new(manual_clock()));
        (store, service)
    }

    #[tokio::test]
    async fn test_create_account() -> ApiResult<()> {
        let (store, service) = service();
        let account = service.create(" alice ").await?;

        assert_eq!(account.pseudo, "alice");
        assert_eq!(account.id, account_id_for("alice"));
        assert!(!account.is_premium);
        assert_eq!(store.account_count()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_rejects_short_and_duplicate_pseudo() -> ApiResult<()> {
        let (_, service) = service();

        let err = service.create("al").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);

        service.create("alice").await?;
        let err = service.create("alice").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityAlreadyExists);
        Ok(())
    }

    #[tokio::test]
    async fn test_login() -> ApiResult<()> {
        let (_, service) = service();
        let account = service.create("alice").await?;

        let ok = service.login(Some(&account.id.to_string())).await?;
        assert!(ok.success);

        let unknown = service.login(Some("not-a-uuid")).await?;
        assert!(!unknown.success);
        assert!(unknown.message.is_some());

        let err = service.login(None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_unknown_account() {
        let (_, service) = service();
        let err = service.get(Uuid::nil()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AccountNotFound);
    }
}
