//! User records and their lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a user record.
pub type UserId = Uuid;

/// Privilege attached to an account. Orthogonal to the approval lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Annotator,
    Admin,
}

/// Derived lifecycle position of an account.
///
/// `pending` and `revoked` both mean "not approved"; they differ only in whether the account was
/// ever approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Pending,
    Approved,
    Revoked,
}

/// Who approved an account, and when. Both halves are always present together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved_by: UserId,
    pub approved_at: DateTime<Utc>,
}

/// A durable user record as held by the credential store.
///
/// `password_hash` is a PHC-format hash string; the clear password is never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_approved: bool,
    pub approval: Option<Approval>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A freshly registered, pending annotator.
    pub fn pending(full_name: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            full_name,
            email,
            password_hash,
            role: Role::Annotator,
            is_approved: false,
            approval: None,
            revoked_at: None,
            created_at: Utc::now(),
        }
    }

    /// An approved admin, as created by bootstrap. Admins carry no approval stamp.
    pub fn admin(full_name: String, email: String, password_hash: String) -> Self {
        Self {
            role: Role::Admin,
            is_approved: true,
            ..Self::pending(full_name, email, password_hash)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn state(&self) -> AccountState {
        if self.is_approved {
            AccountState::Approved
        } else if self.revoked_at.is_some() {
            AccountState::Revoked
        } else {
            AccountState::Pending
        }
    }

    /// Non-secret projection of this record.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: self.role,
            is_approved: self.is_approved,
            state: self.state(),
            approved_by: self.approval.as_ref().map(|a| a.approved_by),
            approved_at: self.approval.as_ref().map(|a| a.approved_at),
            created_at: self.created_at,
        }
    }
}

/// The non-secret projection of a [`User`] returned across the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub is_approved: bool,
    pub state: AccountState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Trim and lower-case an email so lookups and uniqueness checks agree.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
