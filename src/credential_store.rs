//! Durable user records.
//!
//! The store is the only place user records live. Every mutation goes through a single
//! read-modify-write call so a record is never observed half-updated (e.g. an approval stamp
//! without `is_approved`).

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::user::{Role, User, UserId};
use crate::{Error, Result};

/// An in-place edit applied to one record under the store's lock.
///
/// Returning an error aborts the edit and leaves the record exactly as it was.
pub type UserEdit = Box<dyn FnOnce(&mut User) -> Result<()> + Send>;

/// A precondition checked against a record before it is removed.
pub type UserCheck = Box<dyn FnOnce(&User) -> Result<()> + Send>;

/// Storage for user records. Implementations own email uniqueness and per-record atomicity.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new record. Fails with [`Error::Conflict`] if the email is taken.
    async fn insert(&self, user: User) -> Result<()>;

    async fn get(&self, id: UserId) -> Result<Option<User>>;

    /// Look up by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Atomically apply `edit` to the record and return the result.
    ///
    /// Fails with [`Error::NotFound`] if the record is absent.
    async fn modify(&self, id: UserId, edit: UserEdit) -> Result<User>;

    /// Atomically remove the record if `check` passes, returning the removed record.
    async fn remove(&self, id: UserId, check: UserCheck) -> Result<User>;

    /// All records in insertion (registration) order.
    async fn list(&self) -> Result<Vec<User>>;

    async fn any_with_role(&self, role: Role) -> Result<Option<User>> {
        Ok(self.list().await?.into_iter().find(|u| u.role == role))
    }
}

/// A process-local [`CredentialStore`] backed by a `Vec` in insertion order.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<Vec<User>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn user_not_found() -> Error {
    Error::not_found("User not found")
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(Error::conflict("Email already registered"));
        }
        users.push(user);
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn modify(&self, id: UserId, edit: UserEdit) -> Result<User> {
        let mut users = self.users.write().await;
        let slot = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(user_not_found)?;

        // Edit a copy so a failed edit cannot leave partial changes behind.
        let mut draft = slot.clone();
        edit(&mut draft)?;
        *slot = draft.clone();
        Ok(draft)
    }

    async fn remove(&self, id: UserId, check: UserCheck) -> Result<User> {
        let mut users = self.users.write().await;
        let idx = users
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(user_not_found)?;
        check(&users[idx])?;
        Ok(users.remove(idx))
    }

    async fn list(&self) -> Result<Vec<User>> {
        Ok(self.users.read().await.clone())
    }
}
