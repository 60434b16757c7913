use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use validator::Validate;

use super::datetime::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};
use super::validation::not_blank;

/// User model stored in MongoDB "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    /// bcrypt hash
    #[serde(rename = "password")]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub enrolled_courses: Vec<UserEnrollment>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_enrolled_in(&self, course_id: &ObjectId) -> bool {
        self.enrolled_courses
            .iter()
            .any(|e| &e.course_id == course_id)
    }
}

/// Mirror of a course enrollment kept on the user document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEnrollment {
    pub course_id: ObjectId,
    #[serde(with = "bson_datetime_as_chrono")]
    pub enrollment_date: DateTime<Utc>,
    #[serde(default)]
    pub progress: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Instructor,
    #[default]
    Student,
    ContentCreator,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Instructor => "instructor",
            UserRole::Student => "student",
            UserRole::ContentCreator => "content_creator",
        }
    }

    /// Roles a visitor may pick for themselves on the public register endpoint
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, UserRole::Student | UserRole::Instructor)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Instructor)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "instructor" => Ok(UserRole::Instructor),
            "student" => Ok(UserRole::Student),
            "content_creator" => Ok(UserRole::ContentCreator),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User profile returned to client (without sensitive data)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub enrolled_courses: Vec<EnrollmentView>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    pub course_id: String,
    /// Populated on the single-user endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    pub enrollment_date: DateTime<Utc>,
    pub progress: i32,
}

impl From<&UserEnrollment> for EnrollmentView {
    fn from(e: &UserEnrollment) -> Self {
        EnrollmentView {
            course_id: e.course_id.to_hex(),
            course_title: None,
            instructor: None,
            enrollment_date: e.enrollment_date,
            progress: e.progress,
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            enrolled_courses: user.enrolled_courses.iter().map(EnrollmentView::from).collect(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            status: user.status,
            avatar: user.avatar,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// Minimal user shape used when populating references
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Reference to a user: populated when the user still exists, bare id otherwise
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UserRef {
    Populated(UserSummary),
    Id(String),
}

pub type UserLookup = HashMap<ObjectId, UserSummary>;

impl UserRef {
    pub fn resolve(id: &ObjectId, lookup: &UserLookup) -> Self {
        match lookup.get(id) {
            Some(summary) => UserRef::Populated(summary.clone()),
            None => UserRef::Id(id.to_hex()),
        }
    }
}

/// Request to register a new user
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    #[validate(custom(function = "not_blank", message = "First name is required"))]
    pub first_name: String,

    #[validate(custom(function = "not_blank", message = "Last name is required"))]
    pub last_name: String,

    /// Defaults to student; only student or instructor may be self-assigned
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "not_blank", message = "Please provide both email and password"))]
    pub email: String,

    #[validate(length(min = 1, message = "Please provide both email and password"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,
}

/// Request to create a user (admin only)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    #[validate(custom(function = "not_blank", message = "First name is required"))]
    pub first_name: String,

    #[validate(custom(function = "not_blank", message = "Last name is required"))]
    pub last_name: String,

    pub role: UserRole,

    pub status: Option<UserStatus>,
}

/// Partial update; `role`, `status` and `password` are honoured for admins only
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(custom(function = "not_blank", message = "First name cannot be empty"))]
    pub first_name: Option<String>,

    #[validate(custom(function = "not_blank", message = "Last name cannot be empty"))]
    pub last_name: Option<String>,

    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,

    pub avatar: Option<String>,

    pub role: Option<UserRole>,

    pub status: Option<UserStatus>,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
}

impl UpdateUserRequest {
    /// Drops fields the caller is not allowed to change
    pub fn restrict_to_self_service(mut self) -> Self {
        self.role = None;
        self.status = None;
        self.password = None;
        self
    }
}

/// Query params for listing users
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub users: Vec<UserProfile>,
    pub total_pages: u64,
    pub current_page: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsResponse {
    pub total_users: u64,
    pub active_users: u64,
    pub inactive_users: u64,
    pub users_by_role: Vec<RoleCount>,
    pub recent_users: Vec<UserProfile>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RoleCount {
    pub role: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UserMessageResponse {
    pub message: String,
    pub user: UserProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(
            serde_json::to_string(&UserRole::ContentCreator).unwrap(),
            "\"content_creator\""
        );
        assert_eq!("instructor".parse::<UserRole>(), Ok(UserRole::Instructor));
        assert!("teacher".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_self_assignable_roles() {
        assert!(UserRole::Student.is_self_assignable());
        assert!(UserRole::Instructor.is_self_assignable());
        assert!(!UserRole::Admin.is_self_assignable());
        assert!(!UserRole::ContentCreator.is_self_assignable());
    }

    #[test]
    fn test_register_validation() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "not-an-email",
            "password": "123",
            "firstName": "  ",
            "lastName": "Doe"
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("first_name"));
        assert!(!fields.contains_key("last_name"));
    }

    #[test]
    fn test_restrict_to_self_service_drops_privileged_fields() {
        let req = UpdateUserRequest {
            first_name: Some("Ann".into()),
            role: Some(UserRole::Admin),
            status: Some(UserStatus::Inactive),
            password: Some("hunter22".into()),
            ..Default::default()
        }
        .restrict_to_self_service();
        assert_eq!(req.first_name.as_deref(), Some("Ann"));
        assert!(req.role.is_none());
        assert!(req.status.is_none());
        assert!(req.password.is_none());
    }

    #[test]
    fn test_user_ref_falls_back_to_id() {
        let known = ObjectId::new();
        let missing = ObjectId::new();
        let mut lookup = UserLookup::new();
        lookup.insert(
            known,
            UserSummary {
                id: known.to_hex(),
                first_name: "Ada".into(),
                last_name: "L".into(),
                email: "ada@example.com".into(),
            },
        );
        let json = serde_json::to_value(UserRef::resolve(&known, &lookup)).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(
            serde_json::to_value(UserRef::resolve(&missing, &lookup)).unwrap(),
            serde_json::json!(missing.to_hex())
        );
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ann@Example.COM "), "ann@example.com");
    }

    #[test]
    fn test_profile_omits_password() {
        let now = Utc::now();
        let user = User {
            id: Some(ObjectId::new()),
            email: "a@b.c".into(),
            password_hash: "$2b$hash".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            role: UserRole::Student,
            status: UserStatus::Active,
            avatar: None,
            enrolled_courses: vec![],
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(UserProfile::from(user)).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["firstName"], "A");
        assert_eq!(json["role"], "student");
    }
}
