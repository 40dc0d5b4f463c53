// Credits domain - pure decisions, the repository applies them atomically
use serde::{Deserialize, Serialize};

use crate::db::models::AccountId;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckInOutcome {
    /// First check-in of the day; bonus applied
    Granted { balance: i64 },
    /// Already checked in today; nothing changed
    AlreadyCheckedIn { balance: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnlockOutcome {
    /// Grant recorded and credits moved
    Unlocked { balance: i64, cost: i64 },
    /// A grant already existed; nothing charged
    AlreadyUnlocked,
    /// Content is open to everyone; nothing charged
    NotGated,
    /// Viewer owns the content; nothing charged
    OwnContent,
}

/// Per (account, content) pair. `Unlocked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockState {
    Locked,
    Unlocked,
}

impl UnlockState {
    pub fn resolve(
        gated: bool,
        owner: Option<AccountId>,
        viewer: AccountId,
        has_grant: bool,
    ) -> Self {
        if !gated || has_grant || owner == Some(viewer) {
            Self::Unlocked
        } else {
            Self::Locked
        }
    }

    pub fn is_unlocked(self) -> bool {
        self == Self::Unlocked
    }
}

/// Everything the unlock decision depends on, read inside one transaction.
#[derive(Debug, Clone, Copy)]
pub struct UnlockRequest {
    pub viewer: AccountId,
    pub owner: Option<AccountId>,
    pub gated: bool,
    pub cost: i64,
    pub has_grant: bool,
    pub balance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockPlan {
    /// Nothing to write
    Skip(UnlockOutcome),
    /// Record the grant, debit the viewer, credit the owner (if any)
    Transfer { owner: Option<AccountId>, cost: i64 },
}

impl UnlockRequest {
    pub fn plan(&self) -> AppResult<UnlockPlan> {
        if !self.gated {
            return Ok(UnlockPlan::Skip(UnlockOutcome::NotGated));
        }
        if self.owner == Some(self.viewer) {
            return Ok(UnlockPlan::Skip(UnlockOutcome::OwnContent));
        }
        if self.has_grant {
            return Ok(UnlockPlan::Skip(UnlockOutcome::AlreadyUnlocked));
        }
        if self.balance < self.cost {
            return Err(AppError::InsufficientCredits {
                balance: self.balance,
                cost: self.cost,
            });
        }
        Ok(UnlockPlan::Transfer {
            owner: self.owner,
            cost: self.cost,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub college: String,
}

impl NewAccount {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("Name cannot be empty".into()));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(AppError::BadRequest("Enter a valid email address".into())),
        }
    }
}
