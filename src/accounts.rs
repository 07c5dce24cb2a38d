//! Account lifecycle: registration, login, approval, revocation, deletion.
//!
//! ```text
//! register ──▶ pending ──approve──▶ approved ◀──approve── revoked
//!                 │                    │                     ▲
//!                 │                    └───────revoke────────┘
//!                 └──────── delete (any non-admin state) ──────▶ gone
//! ```
//!
//! Admins sit outside this machine: they are always approved, and the standard revoke and
//! delete paths refuse them so the system can never run out of admins.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::Identity;
use crate::credential_store::{CredentialStore, UserCheck, UserEdit};
use crate::opts::Opts;
use crate::password::PasswordHasher;
use crate::upstream::bounded;
use crate::user::{Approval, Role, User, UserId, UserSummary, normalize_email};
use crate::{Error, Result};

/// Which users an admin listing includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserFilter {
    /// An empty `filter=` also means all.
    #[default]
    #[serde(alias = "")]
    All,
    Pending,
    Approved,
}

impl UserFilter {
    fn admits(self, user: &User) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !user.is_approved,
            Self::Approved => user.is_approved,
        }
    }
}

/// Aggregate counts over *all* records, regardless of the listing filter.
///
/// The categories overlap (an admin is also approved), so they need not sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total: usize,
    /// Approved non-admins.
    pub active: usize,
    /// Not approved (pending or revoked).
    pub pending: usize,
    pub admins: usize,
}

impl UserStats {
    fn tally(users: &[User]) -> Self {
        let mut stats = Self {
            total: users.len(),
            ..Self::default()
        };
        for user in users {
            if user.is_approved && !user.is_admin() {
                stats.active += 1;
            }
            if !user.is_approved {
                stats.pending += 1;
            }
            if user.is_admin() {
                stats.admins += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserListing {
    pub users: Vec<UserSummary>,
    pub stats: UserStats,
}

/// Self-registration input. Every field is mandatory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// The single source of truth for who may act, and as what.
pub struct AccountManager<S: CredentialStore> {
    store: Arc<S>,
    hasher: Arc<dyn PasswordHasher>,
    /// Verified against on an unknown email so both login misses cost one hash check.
    decoy_hash: Option<String>,
    min_password_len: usize,
    upstream_timeout: Duration,
}

impl<S: CredentialStore> AccountManager<S> {
    pub fn new(store: Arc<S>, hasher: Arc<dyn PasswordHasher>, opts: &Opts) -> Self {
        let decoy_hash = hasher.hash("decoy-password").ok();
        Self {
            store,
            hasher,
            decoy_hash,
            min_password_len: opts.min_password_len,
            upstream_timeout: opts.upstream_timeout,
        }
    }

    /// Create a pending annotator. Never auto-approves.
    pub async fn register(&self, reg: Registration) -> Result<UserSummary> {
        let full_name = reg.full_name.trim();
        let email = normalize_email(&reg.email);

        if full_name.is_empty()
            || email.is_empty()
            || reg.password.is_empty()
            || reg.confirm_password.is_empty()
        {
            return Err(Error::validation("All fields are required"));
        }
        if reg.password != reg.confirm_password {
            return Err(Error::validation("Passwords do not match"));
        }
        if reg.password.chars().count() < self.min_password_len {
            return Err(Error::validation(format!(
                "Password must be at least {} characters",
                self.min_password_len
            )));
        }

        let existing = bounded(
            self.upstream_timeout,
            "credential lookup",
            self.store.find_by_email(&email),
        )
        .await?;
        if existing.is_some() {
            return Err(Error::conflict("Email already registered"));
        }

        let hash = self.hasher.hash(&reg.password)?;
        let user = User::pending(full_name.to_owned(), email, hash);
        let summary = user.summary();

        // The store re-checks uniqueness, which covers a racing registration.
        bounded(self.upstream_timeout, "credential insert", self.store.insert(user)).await?;

        info!(user_id = %summary.id, "registered pending account");
        Ok(summary)
    }

    /// Check an email/password pair. Unknown email and wrong password are indistinguishable.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserSummary> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(Error::validation("Email and password are required"));
        }

        let found = bounded(
            self.upstream_timeout,
            "credential lookup",
            self.store.find_by_email(&email),
        )
        .await?;
        let user = match found {
            Some(user) if self.hasher.verify(password, &user.password_hash) => user,
            Some(_) => return Err(Error::unauthorized("Invalid email or password")),
            None => {
                if let Some(decoy) = &self.decoy_hash {
                    let _ = self.hasher.verify(password, decoy);
                }
                return Err(Error::unauthorized("Invalid email or password"));
            }
        };

        if !user.is_approved {
            return Err(Error::forbidden("Your account is pending admin approval"));
        }

        info!(user_id = %user.id, "login succeeded");
        Ok(user.summary())
    }

    /// Fetch one user's summary.
    pub async fn get(&self, id: UserId) -> Result<UserSummary> {
        bounded(self.upstream_timeout, "credential lookup", self.store.get(id))
            .await?
            .map(|u| u.summary())
            .ok_or_else(|| Error::not_found("User not found"))
    }

    /// Approve `target`. Approving an already-approved account changes nothing.
    pub async fn approve(&self, actor: &Identity, target: UserId) -> Result<UserSummary> {
        actor.require_role(Role::Admin)?;
        let actor_id = actor.id();

        let edit: UserEdit = Box::new(move |user: &mut User| {
            if user.is_approved {
                return Ok(());
            }
            user.is_approved = true;
            user.approval = Some(Approval {
                approved_by: actor_id,
                approved_at: Utc::now(),
            });
            user.revoked_at = None;
            Ok(())
        });
        let user = bounded(
            self.upstream_timeout,
            "credential update",
            self.store.modify(target, edit),
        )
        .await?;

        info!(user_id = %target, actor_id = %actor_id, "approved account");
        Ok(user.summary())
    }

    /// Withdraw approval from a non-admin account.
    pub async fn revoke(&self, actor: &Identity, target: UserId) -> Result<UserSummary> {
        actor.require_role(Role::Admin)?;

        let edit: UserEdit = Box::new(|user: &mut User| {
            if user.is_admin() {
                return Err(Error::forbidden("Cannot revoke an admin account"));
            }
            if user.is_approved {
                user.is_approved = false;
                user.approval = None;
                user.revoked_at = Some(Utc::now());
            }
            Ok(())
        });
        let user = bounded(
            self.upstream_timeout,
            "credential update",
            self.store.modify(target, edit),
        )
        .await?;

        info!(user_id = %target, actor_id = %actor.id(), "revoked account");
        Ok(user.summary())
    }

    /// Permanently remove a non-admin account. Also serves as "reject" for pending accounts.
    pub async fn delete_user(&self, actor: &Identity, target: UserId) -> Result<()> {
        actor.require_role(Role::Admin)?;

        let check: UserCheck = Box::new(|user: &User| {
            if user.is_admin() {
                Err(Error::forbidden("Cannot delete an admin account"))
            } else {
                Ok(())
            }
        });
        bounded(
            self.upstream_timeout,
            "credential delete",
            self.store.remove(target, check),
        )
        .await?;

        info!(user_id = %target, actor_id = %actor.id(), "deleted account");
        Ok(())
    }

    /// Users admitted by `filter`, in registration order, plus counts over all users.
    pub async fn list_users(&self, filter: UserFilter) -> Result<UserListing> {
        let users = bounded(self.upstream_timeout, "credential list", self.store.list()).await?;
        let stats = UserStats::tally(&users);
        let users = users
            .iter()
            .filter(|u| filter.admits(u))
            .map(User::summary)
            .collect();
        Ok(UserListing { users, stats })
    }

    /// The approval queue.
    pub async fn list_pending(&self) -> Result<Vec<UserSummary>> {
        Ok(self.list_users(UserFilter::Pending).await?.users)
    }

    /// Create an approved admin unless one already exists; returns whichever admin is in place.
    pub async fn ensure_admin(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserSummary> {
        let existing = bounded(
            self.upstream_timeout,
            "credential lookup",
            self.store.any_with_role(Role::Admin),
        )
        .await?;
        if let Some(admin) = existing {
            info!(user_id = %admin.id, "admin account already present");
            return Ok(admin.summary());
        }

        let email = normalize_email(email);
        if email.is_empty() || password.chars().count() < self.min_password_len {
            return Err(Error::validation(
                "admin bootstrap needs an email and a long enough password",
            ));
        }

        let full_name = match full_name.trim() {
            "" => "Admin User",
            name => name,
        };
        let admin = User::admin(full_name.to_owned(), email, self.hasher.hash(password)?);
        let summary = admin.summary();
        bounded(self.upstream_timeout, "credential insert", self.store.insert(admin)).await?;

        info!(user_id = %summary.id, "created bootstrap admin");
        Ok(summary)
    }
}
