use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::models::user::UserRole;
use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String, // user id (ObjectId hex)
    pub role: UserRole,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("No token, authorization denied")]
    MissingToken,
    #[error("Invalid token signature")]
    InvalidSignature,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::unauthorized(err.to_string())
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl JwtService {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    pub fn issue(&self, user_id: &ObjectId, role: UserRole) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            sub: user_id.to_hex(),
            role,
            iat: now as usize,
            exp: (now + self.ttl_seconds) as usize,
        };
        self.generate_token(claims)
    }

    pub fn generate_token(&self, claims: JwtClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// Rejects requests without a valid bearer token; stores the claims for handlers
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers).ok_or(AuthError::MissingToken)?;

    let claims = state.jwt.validate_token(&token).map_err(|e| {
        tracing::warn!(error = %e, "JWT validation failed");
        e
    })?;

    tracing::debug!(user_id = %claims.sub, role = claims.role.as_str(), "Authenticated request");

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Optional auth - allows requests without token, but validates if present
pub async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&headers) {
        match state.jwt.validate_token(&token) {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
            }
            Err(e) => tracing::debug!(error = %e, "Ignoring invalid optional token"),
        }
    }

    next.run(request).await
}

/// Caller identity resolved from the token claims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: ObjectId,
    pub role: UserRole,
}

impl AuthUser {
    pub fn from_claims(claims: &JwtClaims) -> Result<Self, AuthError> {
        let id = ObjectId::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            id,
            role: claims.role,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_role(&self, allowed: &[UserRole]) -> ApiResult<()> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        tracing::warn!(user_id = %self.id, role = self.role.as_str(), "Role not permitted");
        Err(ApiError::forbidden(format!(
            "User role {} is not authorized to access this route",
            self.role.as_str()
        )))
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        self.require_role(&[UserRole::Admin])
    }

    /// Admins pass; everybody else must be `owner`
    pub fn require_owner_or_admin(&self, owner: &ObjectId) -> ApiResult<()> {
        if self.is_admin() || &self.id == owner {
            return Ok(());
        }
        tracing::warn!(user_id = %self.id, owner = %owner, "Ownership check failed");
        Err(ApiError::forbidden("Access denied"))
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<JwtClaims>()
            .ok_or(AuthError::MissingToken)?;
        Ok(AuthUser::from_claims(claims)?)
    }
}

/// Identity for routes behind `optional_auth_middleware`
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<JwtClaims>()
            .and_then(|claims| AuthUser::from_claims(claims).ok());
        Ok(MaybeAuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = JwtService::new("test-secret", 3600);
        let user_id = ObjectId::new();

        let token = service.issue(&user_id, UserRole::Instructor).unwrap();
        let validated = service.validate_token(&token).unwrap();

        assert_eq!(validated.sub, user_id.to_hex());
        assert_eq!(validated.role, UserRole::Instructor);
        assert_eq!(validated.exp - validated.iat, 3600);
    }

    #[test]
    fn test_expired_and_foreign_tokens() {
        let service = JwtService::new("test-secret", 3600);
        let now = chrono::Utc::now().timestamp() as usize;
        let expired = service
            .generate_token(JwtClaims {
                sub: ObjectId::new().to_hex(),
                role: UserRole::Student,
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();
        assert_eq!(
            service.validate_token(&expired).unwrap_err(),
            AuthError::ExpiredToken
        );

        let other = JwtService::new("other-secret", 3600)
            .issue(&ObjectId::new(), UserRole::Admin)
            .unwrap();
        assert_eq!(
            service.validate_token(&other).unwrap_err(),
            AuthError::InvalidSignature
        );
        assert_eq!(
            service.validate_token("garbage").unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_role_and_ownership_guards() {
        let owner = ObjectId::new();
        let instructor = AuthUser {
            id: owner,
            role: UserRole::Instructor,
        };
        let student = AuthUser {
            id: ObjectId::new(),
            role: UserRole::Student,
        };
        let admin = AuthUser {
            id: ObjectId::new(),
            role: UserRole::Admin,
        };

        assert!(instructor
            .require_role(&[UserRole::Instructor, UserRole::Admin])
            .is_ok());
        let err = student
            .require_role(&[UserRole::Instructor, UserRole::Admin])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "User role student is not authorized to access this route"
        );

        assert!(instructor.require_owner_or_admin(&owner).is_ok());
        assert!(admin.require_owner_or_admin(&owner).is_ok());
        assert!(student.require_owner_or_admin(&owner).is_err());
    }

    #[test]
    fn test_claims_with_bad_subject_are_rejected() {
        let claims = JwtClaims {
            sub: "not-an-object-id".into(),
            role: UserRole::Student,
            exp: 0,
            iat: 0,
        };
        assert_eq!(
            AuthUser::from_claims(&claims).unwrap_err(),
            AuthError::InvalidToken
        );
    }
}
