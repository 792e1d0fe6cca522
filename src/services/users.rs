//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{LoginRequest, Role, SignUp, User, UserClaims, UserQuery},
    repository::{Deletable, EntityRepository, Repository},
    transaction::TxManager,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    tx: TxManager,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, tx: TxManager, config: AuthConfig) -> Self {
        Self { repository, tx, config }
    }

    /// Register a new reader account
    pub async fn sign_up(&self, request: SignUp) -> AppResult<User> {
        request.validate()?;

        let email = request.email.trim().to_lowercase();
        if self.repository.users.email_exists(&email).await? {
            return Err(AppError::BadRequest("Email already exists".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: request.name.trim().to_string(),
            email,
            password_hash: hash_password(&request.password)?,
            role: Role::User,
            last_activity_date: now,
            created_at: now,
            deleted_at: None,
        };

        let users = self.repository.users.clone();
        let created = user.clone();
        self.tx
            .with_tx(move |conn| Box::pin(async move { users.create(conn, &created).await }))
            .await
            .map_err(|e| e.or_unexpected("Failed to create user"))?;

        tracing::info!(user_id = %user.id, "User signed up");
        Ok(user)
    }

    /// Check credentials and return a bearer token with the user
    pub async fn login(&self, request: LoginRequest) -> AppResult<(String, User)> {
        request.validate()?;

        let mut user = self
            .repository
            .users
            .find_by_email(request.email.trim())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if !verify_password(&user.password_hash, &request.password)? {
            return Err(AppError::BadRequest("Invalid password".to_string()));
        }

        let now = Utc::now();
        self.repository.users.touch_activity(user.id, now).await?;
        user.last_activity_date = now;

        let token = self.create_token(&user)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok((token, user))
    }

    /// Token lifetime in seconds
    pub fn token_lifetime(&self) -> i64 {
        self.config.jwt_expiration_hours as i64 * 3600
    }

    fn create_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + self.token_lifetime(),
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// List users with filters, search, sort and pagination
    pub async fn find_all(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        super::find_page(
            &self.repository.users,
            query,
            "Failed to get users",
            "Failed to get total users",
        )
        .await
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.repository
            .users
            .find_by_id(id)
            .await
            .map_err(|e| e.or_unexpected("Failed to get user"))?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Promote a user to admin; an admin cannot be promoted again
    pub async fn assign_admin(&self, id: Uuid) -> AppResult<User> {
        let mut user = self.get_by_id(id).await?;
        if user.is_admin() {
            return Err(AppError::BadRequest("User already has admin role".to_string()));
        }
        user.role = Role::Admin;

        let users = self.repository.users.clone();
        let promoted = user.clone();
        self.tx
            .with_tx(move |conn| Box::pin(async move { users.update(conn, &promoted).await }))
            .await
            .map_err(|e| e.or_unexpected("Failed to assign admin"))?;

        tracing::info!(user_id = %id, "Admin role assigned");
        Ok(user)
    }

    /// Soft-delete a user who has no book on loan
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.get_by_id(id).await?;

        let active = self
            .repository
            .borrows
            .count_active_by_user(id)
            .await
            .map_err(|e| e.or_unexpected("Failed to get borrowed books"))?;
        if active > 0 {
            return Err(AppError::BadRequest(format!(
                "User still has {} borrowed books",
                active
            )));
        }

        let users = self.repository.users.clone();
        let deleted = self
            .tx
            .with_tx(move |conn| Box::pin(async move { users.delete(conn, id).await }))
            .await
            .map_err(|e| e.or_unexpected("Failed to delete user"))?;

        if !deleted {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
