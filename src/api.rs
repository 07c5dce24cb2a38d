//! Transport-agnostic request/response contracts.
//!
//! `Api` is what the HTTP server calls: one method per external operation, each taking the
//! caller's bearer token (if the operation needs one) and a typed request. Authentication and
//! role checks happen here, before any account or catalog work.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::access::{AccessControl, Identity};
use crate::accounts::{AccountManager, Registration, UserFilter, UserStats};
use crate::catalog::{BatchId, Catalog, FileId, MemoryCatalog};
use crate::credential_store::{CredentialStore, MemoryCredentialStore};
use crate::navigator::Navigator;
use crate::opts::Opts;
use crate::password::{Argon2Hasher, PasswordHasher};
use crate::save::SaveOrchestrator;
use crate::segments::Segment;
use crate::user::{UserId, UserSummary};
use crate::{Error, Result};

pub type RegisterRequest = Registration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub filter: UserFilter,
}

/// Body of a markup save. `rsml` is accepted as an alias for `markup`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "rsml")]
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub message: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfResponse {
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllUsersResponse {
    pub users: Vec<UserSummary>,
    pub stats: UserStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchesResponse {
    pub max_batch: BatchId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub message: String,
    pub id: String,
}

fn message(text: &str) -> MessageResponse {
    MessageResponse {
        message: text.to_owned(),
    }
}

fn parse_user_id(raw: &str) -> Result<UserId> {
    Uuid::parse_str(raw.trim()).map_err(|_| Error::validation(format!("invalid user id '{raw}'")))
}

/// The whole core behind one handle.
pub struct Api<S: CredentialStore = MemoryCredentialStore, C: Catalog = MemoryCatalog> {
    access: AccessControl<S>,
    accounts: AccountManager<S>,
    navigator: Navigator<C>,
    saver: SaveOrchestrator<C>,
}

impl Api<MemoryCredentialStore, MemoryCatalog> {
    /// In-memory stores with argon2 hashing.
    pub fn in_memory(secret: &[u8], catalog: MemoryCatalog, opts: &Opts) -> Self {
        Self::new(
            secret,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(catalog),
            Arc::new(Argon2Hasher),
            opts,
        )
    }
}

impl<S: CredentialStore, C: Catalog> Api<S, C> {
    pub fn new(
        secret: &[u8],
        store: Arc<S>,
        catalog: Arc<C>,
        hasher: Arc<dyn PasswordHasher>,
        opts: &Opts,
    ) -> Self {
        Self {
            access: AccessControl::new(secret, store.clone(), opts),
            accounts: AccountManager::new(store, hasher, opts),
            navigator: Navigator::new(catalog.clone(), opts),
            saver: SaveOrchestrator::new(catalog, opts),
        }
    }

    pub fn access(&self) -> &AccessControl<S> {
        &self.access
    }

    pub fn accounts(&self) -> &AccountManager<S> {
        &self.accounts
    }

    pub fn navigator(&self) -> &Navigator<C> {
        &self.navigator
    }

    pub fn saver(&self) -> &SaveOrchestrator<C> {
        &self.saver
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<UserResponse> {
        let user = self.accounts.register(req).await?;
        Ok(UserResponse {
            message: "Registration successful. Please wait for admin approval.".to_owned(),
            user,
        })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse> {
        let user = self.accounts.login(&req.email, &req.password).await?;
        let token = self.access.issue_credential(user.id)?;
        Ok(LoginResponse {
            message: "Login successful".to_owned(),
            token,
            user,
        })
    }

    pub async fn get_self(&self, token: Option<&str>) -> Result<SelfResponse> {
        let identity = self.access.authenticate(token).await?;
        Ok(SelfResponse {
            user: identity.user,
        })
    }

    pub async fn list_pending_users(&self, token: Option<&str>) -> Result<UsersResponse> {
        self.access.authenticate_admin(token).await?;
        Ok(UsersResponse {
            users: self.accounts.list_pending().await?,
        })
    }

    pub async fn list_all_users(
        &self,
        token: Option<&str>,
        query: ListUsersQuery,
    ) -> Result<AllUsersResponse> {
        self.access.authenticate_admin(token).await?;
        let listing = self.accounts.list_users(query.filter).await?;
        Ok(AllUsersResponse {
            users: listing.users,
            stats: listing.stats,
        })
    }

    pub async fn approve_user(&self, token: Option<&str>, target: &str) -> Result<UserResponse> {
        let (actor, target) = self.admin_and_target(token, target).await?;
        let user = self.accounts.approve(&actor, target).await?;
        Ok(UserResponse {
            message: "User approved successfully".to_owned(),
            user,
        })
    }

    pub async fn revoke_user(&self, token: Option<&str>, target: &str) -> Result<UserResponse> {
        let (actor, target) = self.admin_and_target(token, target).await?;
        let user = self.accounts.revoke(&actor, target).await?;
        Ok(UserResponse {
            message: "User access revoked".to_owned(),
            user,
        })
    }

    pub async fn delete_user(&self, token: Option<&str>, target: &str) -> Result<MessageResponse> {
        let (actor, target) = self.admin_and_target(token, target).await?;
        self.accounts.delete_user(&actor, target).await?;
        Ok(message("User deleted"))
    }

    /// Same operation as [`Api::delete_user`], worded for the approval queue.
    pub async fn reject_user(&self, token: Option<&str>, target: &str) -> Result<MessageResponse> {
        let (actor, target) = self.admin_and_target(token, target).await?;
        self.accounts.delete_user(&actor, target).await?;
        Ok(message("User rejected and removed"))
    }

    pub async fn list_batches(&self, token: Option<&str>) -> Result<BatchesResponse> {
        self.access.authenticate(token).await?;
        Ok(BatchesResponse {
            max_batch: self.navigator.max_batch().await?,
        })
    }

    pub async fn list_files(&self, token: Option<&str>, batch: BatchId) -> Result<FilesResponse> {
        self.access.authenticate(token).await?;
        Ok(FilesResponse {
            files: self.navigator.files(batch).await?,
        })
    }

    pub async fn load_file(
        &self,
        token: Option<&str>,
        batch: BatchId,
        file: FileId,
    ) -> Result<Vec<Segment>> {
        self.access.authenticate(token).await?;
        self.navigator.segments(batch, file).await
    }

    pub async fn save_segment(&self, token: Option<&str>, req: SaveRequest) -> Result<SaveResponse> {
        let identity = self.access.authenticate(token).await?;
        self.saver.persist(&req.id, &req.markup).await?;
        debug!(segment_id = %req.id, user_id = %identity.id(), "segment markup saved");
        Ok(SaveResponse {
            message: "Saved".to_owned(),
            id: req.id,
        })
    }

    async fn admin_and_target(&self, token: Option<&str>, target: &str) -> Result<(Identity, UserId)> {
        let actor = self.access.authenticate_admin(token).await?;
        Ok((actor, parse_user_id(target)?))
    }
}
