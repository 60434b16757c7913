use crate::error::{is_duplicate_key, ApiError, ApiResult};
use crate::metrics::AUTH_EVENTS_TOTAL;
use crate::middlewares::auth::JwtService;
use crate::models::datetime::to_bson;
use crate::models::user::{
    normalize_email, AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, User,
    UserProfile, UserStatus,
};
use crate::models::USERS;
use anyhow::{anyhow, Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::{Collection, Database};

pub const DUPLICATE_EMAIL: &str = "User already exists with this email";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Hash a password using bcrypt with the default cost
pub fn hash_password(password: &str) -> Result<String> {
    hash(password, DEFAULT_COST).context("Failed to hash password")
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    verify(password, hash).context("Failed to verify password")
}

pub struct AuthService<'a> {
    mongo: Database,
    jwt: &'a JwtService,
}

impl<'a> AuthService<'a> {
    pub fn new(mongo: Database, jwt: &'a JwtService) -> Self {
        Self { mongo, jwt }
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection::<User>(USERS)
    }

    fn issue_for(&self, user: &User) -> Result<String> {
        let id = user.id.ok_or_else(|| anyhow!("User without id"))?;
        self.jwt
            .issue(&id, user.role)
            .map_err(|e| anyhow!("Failed to sign token: {}", e))
    }

    /// Public self-registration, student or instructor only
    pub async fn register(&self, req: RegisterRequest) -> ApiResult<AuthResponse> {
        let role = req.role.unwrap_or_default();
        if !role.is_self_assignable() {
            AUTH_EVENTS_TOTAL
                .with_label_values(&["register", "rejected"])
                .inc();
            return Err(ApiError::bad_request(
                "Invalid role. Only student or instructor accounts can be self-registered",
            ));
        }

        let email = normalize_email(&req.email);
        let existing = self
            .users()
            .find_one(doc! { "email": email.as_str() })
            .await
            .context("Failed to check existing user")?;
        if existing.is_some() {
            AUTH_EVENTS_TOTAL
                .with_label_values(&["register", "duplicate"])
                .inc();
            return Err(ApiError::bad_request(DUPLICATE_EMAIL));
        }

        let now = Utc::now();
        let mut user = User {
            id: None,
            email,
            password_hash: hash_password(&req.password)?,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            role,
            status: UserStatus::Active,
            avatar: None,
            enrolled_courses: Vec::new(),
            last_login: Some(now),
            created_at: now,
            updated_at: now,
        };

        let inserted = match self.users().insert_one(&user).await {
            Ok(result) => result,
            Err(e) if is_duplicate_key(&e) => return Err(ApiError::bad_request(DUPLICATE_EMAIL)),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to insert user").into()),
        };
        user.id = inserted.inserted_id.as_object_id();

        let token = self.issue_for(&user)?;
        tracing::info!(user_id = ?user.id, role = role.as_str(), "User registered");
        AUTH_EVENTS_TOTAL
            .with_label_values(&["register", "success"])
            .inc();

        Ok(AuthResponse {
            success: true,
            token,
            user: user.into(),
        })
    }

    pub async fn login(&self, req: LoginRequest) -> ApiResult<AuthResponse> {
        let email = normalize_email(&req.email);
        let Some(mut user) = self
            .users()
            .find_one(doc! { "email": email.as_str() })
            .await
            .context("Failed to query user")?
        else {
            AUTH_EVENTS_TOTAL
                .with_label_values(&["login", "unknown_email"])
                .inc();
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        };

        if !verify_password(&req.password, &user.password_hash)? {
            tracing::warn!(user_id = ?user.id, "Login with wrong password");
            AUTH_EVENTS_TOTAL
                .with_label_values(&["login", "bad_password"])
                .inc();
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }

        if user.status == UserStatus::Inactive {
            AUTH_EVENTS_TOTAL
                .with_label_values(&["login", "inactive"])
                .inc();
            return Err(ApiError::forbidden(
                "Account is inactive. Please contact an administrator.",
            ));
        }

        let now = Utc::now();
        self.users()
            .update_one(
                doc! { "_id": user.id },
                doc! { "$set": { "lastLogin": to_bson(&now) } },
            )
            .await
            .context("Failed to update last login")?;
        user.last_login = Some(now);

        let token = self.issue_for(&user)?;
        AUTH_EVENTS_TOTAL
            .with_label_values(&["login", "success"])
            .inc();

        Ok(AuthResponse {
            success: true,
            token,
            user: user.into(),
        })
    }

    pub async fn profile(&self, user_id: &ObjectId) -> ApiResult<UserProfile> {
        let user = self
            .users()
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        Ok(user.into())
    }

    pub async fn change_password(
        &self,
        user_id: &ObjectId,
        req: ChangePasswordRequest,
    ) -> ApiResult<()> {
        let user = self
            .users()
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        if !verify_password(&req.current_password, &user.password_hash)? {
            return Err(ApiError::unauthorized("Current password is incorrect"));
        }

        let hashed = hash_password(&req.new_password)?;
        self.users()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "password": hashed, "updatedAt": to_bson(&Utc::now()) } },
            )
            .await
            .context("Failed to update password")?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hashed = hash("secret1", 4).unwrap();
        assert!(verify_password("secret1", &hashed).unwrap());
        assert!(!verify_password("secret2", &hashed).unwrap());
    }
}
