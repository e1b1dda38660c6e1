use crate::application_port::*;
use crate::domain_model::*;

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `AuthenticationFailed` for unknown users, inactive users and
    /// wrong passwords alike.
    async fn verify_password(&self, username: &str, password: &str) -> Result<User, AuthError>;

    async fn update_user(&self, user: &User) -> Result<(), AuthError>;

    async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError>;
}
