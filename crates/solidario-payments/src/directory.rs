//! User Directory
//!
//! Read-only access to user records. Accounts are owned by the user
//! service; payments only need to resolve payer and payee profiles.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use solidario_core::User;

use crate::error::Result;

/// User lookup trait
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Get a user by ID; `Ok(None)` when absent
    async fn get_user(&self, id: i64) -> Result<Option<User>>;
}

/// In-memory user directory (for development and tests)
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<i64, User>>,
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
    
    /// Create pre-populated with users
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }
    
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
