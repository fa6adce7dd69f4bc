//! services/api/src/adapters/users.rs
//!
//! Concrete implementations of the `UserRepository` port.
//!
//! `MemoryUserRepository` holds the seed table for the process lifetime only: every
//! account added or deleted through the admin page is gone after a restart.
//! `JsonFileUserRepository` keeps the table in a JSON file and survives restarts.
//!
//! Both use the same JSON shape, a map from username to account:
//!
//! ```json
//! { "yamada": { "display_name": "山田太郎", "password_hash": "$argon2id$...", "role": "user" } }
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use manuscript_core::domain::{Role, UserRecord};
use manuscript_core::ports::{PortError, PortResult, UserRepository};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

//=========================================================================================
// "Impure" Stored Record Struct
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct StoredUser {
    display_name: String,
    password_hash: String,
    role: String,
}

impl StoredUser {
    fn to_domain(self, username: String) -> PortResult<UserRecord> {
        let role = self.role.parse::<Role>().map_err(|e| {
            PortError::Unexpected(format!("Account '{}' has an invalid role: {}", username, e))
        })?;
        Ok(UserRecord {
            username,
            display_name: self.display_name,
            password_hash: self.password_hash,
            role,
        })
    }

    fn from_domain(record: &UserRecord) -> Self {
        Self {
            display_name: record.display_name.clone(),
            password_hash: record.password_hash.clone(),
            role: record.role.as_str().to_string(),
        }
    }
}

/// Parses a JSON user table.
pub fn parse_user_table(json: &str) -> PortResult<Vec<UserRecord>> {
    let table: BTreeMap<String, StoredUser> = serde_json::from_str(json)
        .map_err(|e| PortError::Unexpected(format!("Invalid user table: {}", e)))?;
    table
        .into_iter()
        .map(|(username, stored)| stored.to_domain(username))
        .collect()
}

fn render_user_table(users: &[UserRecord]) -> PortResult<String> {
    let table: BTreeMap<&str, StoredUser> = users
        .iter()
        .map(|record| (record.username.as_str(), StoredUser::from_domain(record)))
        .collect();
    serde_json::to_string_pretty(&table).map_err(|e| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// In-Memory (Seed-Only) Repository
//=========================================================================================

/// Non-durable repository: changes last until the process exits.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<UserRecord>>,
}

impl MemoryUserRepository {
    pub fn new(seed: Vec<UserRecord>) -> Self {
        Self {
            users: Mutex::new(seed),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn load(&self) -> PortResult<Vec<UserRecord>> {
        Ok(self.users.lock().await.clone())
    }

    async fn save(&self, users: &[UserRecord]) -> PortResult<()> {
        *self.users.lock().await = users.to_vec();
        Ok(())
    }
}

//=========================================================================================
// JSON File Repository
//=========================================================================================

/// Durable repository backed by a single JSON file.
#[derive(Clone, Debug)]
pub struct JsonFileUserRepository {
    path: PathBuf,
}

impl JsonFileUserRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl UserRepository for JsonFileUserRepository {
    /// A missing file is an empty table.
    async fn load(&self) -> PortResult<Vec<UserRecord>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => parse_user_table(&json),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("User file {} does not exist yet.", self.path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(PortError::Unexpected(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Writes a sibling temporary file and renames it over the table.
    async fn save(&self, users: &[UserRecord]) -> PortResult<()> {
        let json = render_user_table(users)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let write = async {
            tokio::fs::write(&tmp_path, json).await?;
            tokio::fs::rename(&tmp_path, &self.path).await
        };
        write.await.map_err(|e| {
            PortError::Unexpected(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}
