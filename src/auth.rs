use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::AppState;
use argon2::{
    password_hash::{
        rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher,
        PasswordVerifier, SaltString,
    },
    Argon2,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Access token claims. `email` doubles as the ledger owner id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Hash a password into an argon2 PHC string
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Message(format!("Failed to hash password: {}", e)))
}

/// Check a candidate password against a stored hash.
/// Returns `Ok(false)` on mismatch and errors only on malformed hashes.
pub fn verify_password(candidate: &str, stored_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Message(format!("Stored password hash is invalid: {}", e)))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(AppError::Message(format!("Password verification failed: {}", e))),
    }
}

lazy_static! {
    /// Format: local@domain.tld, the domain part may carry further labels
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+$")
            .expect("Invalid regex pattern");
}

pub fn validate_email(email: &str) -> AppResult<()> {
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(AppError::Validation("Invalid email format".to_string()))
    }
}

pub fn validate_password(password: &str) -> AppResult<()> {
    let strong = password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit());

    if strong {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Password must be at least {} characters long and contain at least one uppercase letter, one lowercase letter, and one digit",
            MIN_PASSWORD_LEN
        )))
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn extract_bearer_token(header: Option<&str>) -> AppResult<&str> {
    let header =
        header.ok_or_else(|| AppError::Unauthorized("Authorization token is missing.".to_string()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format.".to_string()))
}

/// Issues and validates HS256 access tokens
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl TokenManager {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(&config.jwt_secret),
            decoding_key: DecodingKey::from_secret(&config.jwt_secret),
            validation,
            token_ttl: config.access_token_ttl(),
        }
    }

    pub fn issue_token(&self, email: &str) -> AppResult<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            email: email.to_string(),
            iat: now,
            exp: now + self.token_ttl.as_secs() as i64,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Message(format!("Failed to sign token: {}", e)))
    }

    /// Validate a token and return its claims
    pub fn resolve_user(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token has expired.".to_string())
                }
                _ => AppError::Unauthorized("Invalid token.".to_string()),
            })
    }
}

/// Authenticated caller, resolved from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str())
            .transpose()
            .map_err(|_| AppError::Unauthorized("Invalid authorization header format.".to_string()))?;

        let token = extract_bearer_token(header)?;
        let claims = state.tokens.resolve_user(token)?;
        Ok(AuthUser {
            email: claims.email,
        })
    }
}
