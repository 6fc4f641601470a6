//! Staff management of accounts and the corporate review queue.

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use bazaar_core::{CorporateStatus, TokenId, UserId, UserRole};

use crate::db::{Page, RepositoryError, TokenRepository, UserRepository};
use crate::models::User;

/// Errors from account administration.
#[derive(Debug, Error)]
pub enum UserAdminError {
    #[error("user not found")]
    NotFound,

    #[error("user is not a corporate account")]
    NotCorporate,

    #[error("corporate account is already {current}")]
    InvalidTransition { current: CorporateStatus },

    #[error("you cannot delete your own account")]
    SelfDelete,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Whether a corporate account in `current` may move to `next`.
///
/// Review decisions are made on pending accounts. A rejected account may
/// still be approved later; nothing else moves.
#[must_use]
pub const fn corporate_transition_allowed(current: CorporateStatus, next: CorporateStatus) -> bool {
    matches!(
        (current, next),
        (CorporateStatus::Pending, CorporateStatus::Approved | CorporateStatus::Rejected)
            | (CorporateStatus::Rejected, CorporateStatus::Approved)
    )
}

/// Account administration service.
pub struct UserAdminService<'a> {
    users: UserRepository<'a>,
    tokens: TokenRepository<'a>,
}

impl<'a> UserAdminService<'a> {
    /// Create a new account administration service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens: TokenRepository::new(pool),
        }
    }

    /// List accounts, optionally by role.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::Repository` if the query fails.
    pub async fn list(
        &self,
        role: Option<UserRole>,
        page: Page,
    ) -> Result<(Vec<User>, i64), UserAdminError> {
        Ok(self.users.list(role, page).await?)
    }

    /// List corporate accounts, optionally by review state.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::Repository` if the query fails.
    pub async fn list_corporate(
        &self,
        status: Option<CorporateStatus>,
        page: Page,
    ) -> Result<(Vec<User>, i64), UserAdminError> {
        Ok(self.users.list_corporate(status, page).await?)
    }

    /// Approve a corporate account so it can sign in.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::NotFound` / `NotCorporate` for the wrong user
    /// and `UserAdminError::InvalidTransition` if it is already approved.
    #[instrument(skip(self), fields(staff_id = %staff.id))]
    pub async fn approve_corporate(&self, id: UserId, staff: &User) -> Result<User, UserAdminError> {
        let user = self
            .review(id, CorporateStatus::Approved, None)
            .await?;
        tracing::info!(user_id = %id, company = ?user.company_name, "Corporate account approved");
        Ok(user)
    }

    /// Reject a corporate account, keeping `reason` for the record.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::NotFound` / `NotCorporate` for the wrong user
    /// and `UserAdminError::InvalidTransition` unless it is pending.
    #[instrument(skip(self, reason), fields(staff_id = %staff.id))]
    pub async fn reject_corporate(
        &self,
        id: UserId,
        reason: Option<&str>,
        staff: &User,
    ) -> Result<User, UserAdminError> {
        let user = self
            .review(id, CorporateStatus::Rejected, reason)
            .await?;
        tracing::info!(user_id = %id, company = ?user.company_name, "Corporate account rejected");
        Ok(user)
    }

    async fn review(
        &self,
        id: UserId,
        next: CorporateStatus,
        note: Option<&str>,
    ) -> Result<User, UserAdminError> {
        let user = self
            .users
            .get_by_id(id)
            .await?
            .ok_or(UserAdminError::NotFound)?;
        if user.role != UserRole::Corporate {
            return Err(UserAdminError::NotCorporate);
        }

        let current = user.corporate_status.unwrap_or_default();
        if !corporate_transition_allowed(current, next) {
            return Err(UserAdminError::InvalidTransition { current });
        }

        Ok(self.users.set_corporate_status(id, next, note).await?)
    }

    /// Soft delete an account and revoke its tokens.
    ///
    /// Returns the revoked token IDs so cached sessions can be dropped.
    ///
    /// # Errors
    ///
    /// Returns `UserAdminError::SelfDelete` when staff target themselves and
    /// `UserAdminError::NotFound` if the user does not exist.
    #[instrument(skip(self), fields(staff_id = %staff.id))]
    pub async fn delete_user(&self, id: UserId, staff: &User) -> Result<Vec<TokenId>, UserAdminError> {
        if id == staff.id {
            return Err(UserAdminError::SelfDelete);
        }

        let revoked = self.tokens.ids_for_user(id).await?;
        self.users.soft_delete(id).await.map_err(|e| match e {
            RepositoryError::NotFound => UserAdminError::NotFound,
            other => UserAdminError::Repository(other),
        })?;

        tracing::info!(user_id = %id, tokens_revoked = revoked.len(), "User deleted");
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_accounts_can_be_decided() {
        assert!(corporate_transition_allowed(
            CorporateStatus::Pending,
            CorporateStatus::Approved
        ));
        assert!(corporate_transition_allowed(
            CorporateStatus::Pending,
            CorporateStatus::Rejected
        ));
    }

    #[test]
    fn test_rejected_accounts_can_be_approved_later() {
        assert!(corporate_transition_allowed(
            CorporateStatus::Rejected,
            CorporateStatus::Approved
        ));
    }

    #[test]
    fn test_repeat_decisions_are_refused() {
        assert!(!corporate_transition_allowed(
            CorporateStatus::Approved,
            CorporateStatus::Approved
        ));
        assert!(!corporate_transition_allowed(
            CorporateStatus::Approved,
            CorporateStatus::Rejected
        ));
        assert!(!corporate_transition_allowed(
            CorporateStatus::Rejected,
            CorporateStatus::Rejected
        ));
    }
}
