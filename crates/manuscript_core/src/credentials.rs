//! crates/manuscript_core/src/credentials.rs
//!
//! The shared table of login accounts.
//!
//! The table is loaded once through a `UserRepository` and kept in memory. Every
//! mutation goes through one async mutex and is written back through the repository
//! before the lock is released, so concurrent administrators cannot interleave. Whether
//! anything survives a restart depends entirely on the repository: the in-memory one
//! forgets every change.

use std::collections::BTreeMap;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{Role, UserRecord};
use crate::ports::{PortError, PortResult, UserRepository};

/// The account that can never be deleted.
pub const PROTECTED_USERNAME: &str = "admin";

const DEFAULT_ADMIN_DISPLAY_NAME: &str = "管理者";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Why a login was rejected. Only logged; users see one generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("user not found")]
    UserNotFound,
    #[error("wrong password")]
    WrongPassword,
}

/// Hashes a password with Argon2 and a fresh random salt.
pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortError::Unexpected(format!("Failed to hash password: {}", e)))
}

/// Checks a password against a stored PHC hash string.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash could not be parsed: {}", e);
            false
        }
    }
}

fn default_admin() -> PortResult<UserRecord> {
    Ok(UserRecord {
        username: PROTECTED_USERNAME.to_string(),
        display_name: DEFAULT_ADMIN_DISPLAY_NAME.to_string(),
        password_hash: hash_password(DEFAULT_ADMIN_PASSWORD)?,
        role: Role::Admin,
    })
}

pub struct CredentialStore {
    users: Mutex<BTreeMap<String, UserRecord>>,
    repository: Arc<dyn UserRepository>,
}

impl CredentialStore {
    /// Loads the table. An empty repository gets the built-in administrator.
    pub async fn open(repository: Arc<dyn UserRepository>) -> PortResult<Self> {
        let mut records = repository.load().await?;
        if records.is_empty() {
            warn!(
                "No user accounts configured; seeding the built-in '{}' account with the default password.",
                PROTECTED_USERNAME
            );
            records.push(default_admin()?);
            repository.save(&records).await?;
        }
        info!("Credential store opened with {} accounts.", records.len());

        let users = records
            .into_iter()
            .map(|record| (record.username.clone(), record))
            .collect();
        Ok(Self {
            users: Mutex::new(users),
            repository,
        })
    }

    /// A snapshot of every account, keyed by username.
    pub async fn get(&self) -> BTreeMap<String, UserRecord> {
        self.users.lock().await.clone()
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.users.lock().await.contains_key(username)
    }

    /// Inserts or silently overwrites an account.
    pub async fn add(
        &self,
        username: &str,
        display_name: &str,
        password: &str,
        role: Role,
    ) -> PortResult<()> {
        let record = new_record(username, display_name, password, role)?;
        let mut users = self.users.lock().await;
        let mut next = users.clone();
        next.insert(record.username.clone(), record);
        self.commit(&mut users, next).await
    }

    /// Inserts an account, refusing a username that is already taken.
    ///
    /// The check and the insert happen under the same lock.
    pub async fn create(
        &self,
        username: &str,
        display_name: &str,
        password: &str,
        role: Role,
    ) -> PortResult<()> {
        let record = new_record(username, display_name, password, role)?;
        let mut users = self.users.lock().await;
        if users.contains_key(username) {
            return Err(PortError::AlreadyExists(username.to_string()));
        }
        let mut next = users.clone();
        next.insert(record.username.clone(), record);
        self.commit(&mut users, next).await?;
        info!("Account '{}' created.", username);
        Ok(())
    }

    /// Deletes an account. Returns `false` for the protected account or an unknown name.
    pub async fn remove(&self, username: &str) -> PortResult<bool> {
        if username == PROTECTED_USERNAME {
            warn!("Refusing to delete the protected '{}' account.", PROTECTED_USERNAME);
            return Ok(false);
        }
        let mut users = self.users.lock().await;
        if !users.contains_key(username) {
            return Ok(false);
        }
        let mut next = users.clone();
        next.remove(username);
        self.commit(&mut users, next).await?;
        info!("Account '{}' deleted.", username);
        Ok(true)
    }

    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserRecord, AuthFailure> {
        let record = self
            .users
            .lock()
            .await
            .get(username)
            .cloned()
            .ok_or(AuthFailure::UserNotFound)?;

        if verify_password(password, &record.password_hash) {
            Ok(record)
        } else {
            Err(AuthFailure::WrongPassword)
        }
    }

    pub async fn verify(&self, username: &str, password: &str) -> bool {
        self.authenticate(username, password).await.is_ok()
    }

    /// Persists `next` and only then makes it the live table.
    async fn commit(
        &self,
        users: &mut BTreeMap<String, UserRecord>,
        next: BTreeMap<String, UserRecord>,
    ) -> PortResult<()> {
        let records: Vec<UserRecord> = next.values().cloned().collect();
        self.repository.save(&records).await?;
        *users = next;
        Ok(())
    }
}

fn new_record(
    username: &str,
    display_name: &str,
    password: &str,
    role: Role,
) -> PortResult<UserRecord> {
    Ok(UserRecord {
        username: username.to_string(),
        display_name: display_name.to_string(),
        password_hash: hash_password(password)?,
        role,
    })
}
