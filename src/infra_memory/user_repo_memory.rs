use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

struct StoredUser {
    user: User,
    password_hash: String,
}

pub struct MemoryUserRepo {
    users: DashMap<String, StoredUser>,
    next_id: AtomicU64,
    credential_hasher: Arc<dyn CredentialHasher>,
}

impl MemoryUserRepo {
    pub fn new(credential_hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
            credential_hasher,
        }
    }

    /// Seeds a user with a fixed id.
    pub async fn insert_with_id(
        &self,
        user_id: UserId,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let password_hash = self.credential_hasher.hash_password(password).await?;
        let user = User {
            id: user_id,
            username: username.to_owned(),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        };
        match self.users.entry(username.to_owned()) {
            Entry::Occupied(_) => Err(AuthError::Persistence(format!(
                "duplicate username {username}"
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(StoredUser {
                    user: user.clone(),
                    password_hash,
                });
                self.next_id.fetch_max(user_id.0 + 1, Ordering::AcqRel);
                Ok(user)
            }
        }
    }

    pub fn find_by_username(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|stored| stored.user.clone())
    }
}

#[async_trait::async_trait]
impl UserRepo for MemoryUserRepo {
    async fn verify_password(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let (user, password_hash) = match self.users.get(username) {
            Some(stored) => (stored.user.clone(), stored.password_hash.clone()),
            None => return Err(AuthError::AuthenticationFailed),
        };
        if !user.is_active {
            return Err(AuthError::AuthenticationFailed);
        }
        if !self
            .credential_hasher
            .verify_password(password, &password_hash)
            .await?
        {
            return Err(AuthError::AuthenticationFailed);
        }
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<(), AuthError> {
        match self.users.get_mut(&user.username) {
            Some(mut stored) if stored.user.id == user.id => {
                stored.user = user.clone();
                Ok(())
            }
            _ => Err(AuthError::UserNotFound),
        }
    }

    async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user_id = UserId(self.next_id.fetch_add(1, Ordering::AcqRel));
        self.insert_with_id(user_id, username, password).await
    }
}
