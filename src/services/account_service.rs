use crate::auth::{self, TokenManager};
use crate::error::{AppError, AppResult, StoreError};
use crate::models::{User, UserProfile};
use crate::repositories::UserStore;
use std::sync::Arc;
use tracing::info;

/// Issued session for a logged-in user
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub access_token: String,
    pub user: UserProfile,
}

/// Registration and login
pub struct AccountService {
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenManager>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, tokens: Arc<TokenManager>) -> Self {
        Self { users, tokens }
    }

    pub async fn register(&self, email: &str, password: &str) -> AppResult<User> {
        let email = email.trim();
        auth::validate_email(email)?;
        auth::validate_password(password)?;

        if self.users.find_by_email(email).await?.is_some() {
            return Err(AppError::Validation("Email already registered".to_string()));
        }

        let password_hash = auth::hash_password(password)?;
        let user = self
            .users
            .create(email, &password_hash)
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration
                StoreError::Duplicate(_) => {
                    AppError::Validation("Email already registered".to_string())
                }
                other => AppError::Store(other),
            })?;

        info!("Registered user {}", user.email);
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginSession> {
        let email = email.trim();
        auth::validate_email(email)?;

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid email".to_string()))?;

        if !auth::verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized("Invalid password".to_string()));
        }

        let access_token = self.tokens.issue_token(&user.email)?;
        info!("User {} logged in", user.email);

        Ok(LoginSession {
            access_token,
            user: user.profile(),
        })
    }
}
