use crate::error::{is_duplicate_key, parse_object_id, ApiError, ApiResult};
use crate::middlewares::auth::AuthUser;
use crate::models::datetime::to_bson;
use crate::models::user::{
    normalize_email, CreateUserRequest, EnrollmentView, ListUsersQuery, RoleCount,
    UpdateUserRequest, User, UserListResponse, UserProfile, UserRole, UserStatsResponse,
    UserStatus,
};
use crate::models::{COURSES, USERS};
use crate::services::auth_service::{hash_password, DUPLICATE_EMAIL};
use crate::services::course_service::CourseService;
use crate::services::notification_service::NotificationService;
use crate::utils::pagination::{contains_ci, search_term, Pagination};
use anyhow::Context;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use std::collections::HashMap;
use std::str::FromStr;

const RECENT_USERS: i64 = 5;

pub fn list_filter(query: &ListUsersQuery) -> ApiResult<Document> {
    let mut filter = Document::new();
    if let Some(term) = search_term(&query.search) {
        let regex = contains_ci(term);
        filter.insert(
            "$or",
            vec![
                doc! { "firstName": regex.clone() },
                doc! { "lastName": regex.clone() },
                doc! { "email": regex },
            ],
        );
    }
    if let Some(role) = search_term(&query.role) {
        let role = UserRole::from_str(role)
            .map_err(|_| ApiError::bad_request(format!("Invalid role: {}", role)))?;
        filter.insert("role", role.as_str());
    }
    Ok(filter)
}

pub struct UserService {
    mongo: Database,
}

impl UserService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection::<User>(USERS)
    }

    async fn find(&self, id: &ObjectId) -> ApiResult<User> {
        self.users()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    async fn email_taken(&self, email: &str, except: Option<&ObjectId>) -> ApiResult<bool> {
        let mut filter = doc! { "email": email };
        if let Some(id) = except {
            filter.insert("_id", doc! { "$ne": id });
        }
        let count = self
            .users()
            .count_documents(filter)
            .await
            .context("Failed to check email")?;
        Ok(count > 0)
    }

    pub async fn list(&self, query: ListUsersQuery) -> ApiResult<UserListResponse> {
        let pagination = Pagination::from_query(query.page, query.limit);
        let filter = list_filter(&query)?;

        let users: Vec<User> = self
            .users()
            .find(filter.clone())
            .sort(doc! { "createdAt": -1 })
            .skip(pagination.skip())
            .limit(pagination.limit_i64())
            .await
            .context("Failed to query users")?
            .try_collect()
            .await
            .context("Failed to read users")?;

        let total = self
            .users()
            .count_documents(filter)
            .await
            .context("Failed to count users")?;

        Ok(UserListResponse {
            users: users.into_iter().map(UserProfile::from).collect(),
            total_pages: pagination.total_pages(total),
            current_page: pagination.page,
            total,
        })
    }

    pub async fn stats(&self) -> ApiResult<UserStatsResponse> {
        let users = self.users();
        let total_users = users
            .count_documents(doc! {})
            .await
            .context("Failed to count users")?;
        let active_users = users
            .count_documents(doc! { "status": UserStatus::Active.as_str() })
            .await
            .context("Failed to count active users")?;

        let grouped: Vec<Document> = users
            .aggregate(vec![
                doc! { "$group": { "_id": "$role", "count": { "$sum": 1 } } },
                doc! { "$sort": { "_id": 1 } },
            ])
            .await
            .context("Failed to aggregate users by role")?
            .try_collect()
            .await
            .context("Failed to read role aggregation")?;
        let users_by_role = grouped
            .iter()
            .filter_map(|d| {
                let role = d.get_str("_id").ok()?.to_string();
                let count = match d.get("count")? {
                    bson::Bson::Int32(n) => i64::from(*n),
                    bson::Bson::Int64(n) => *n,
                    _ => return None,
                };
                Some(RoleCount { role, count })
            })
            .collect();

        let recent: Vec<User> = users
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .limit(RECENT_USERS)
            .await
            .context("Failed to query recent users")?
            .try_collect()
            .await
            .context("Failed to read recent users")?;

        Ok(UserStatsResponse {
            total_users,
            active_users,
            inactive_users: total_users.saturating_sub(active_users),
            users_by_role,
            recent_users: recent.into_iter().map(UserProfile::from).collect(),
        })
    }

    /// Profile with each enrollment's course title and instructor filled in
    pub async fn get(&self, caller: &AuthUser, id: &str) -> ApiResult<UserProfile> {
        let id = parse_object_id(id, "user id")?;
        caller.require_owner_or_admin(&id)?;
        let user = self.find(&id).await?;

        let course_ids: Vec<ObjectId> = user.enrolled_courses.iter().map(|e| e.course_id).collect();
        let mut courses: HashMap<ObjectId, (String, Option<String>)> = HashMap::new();
        if !course_ids.is_empty() {
            let docs: Vec<Document> = self
                .mongo
                .collection::<Document>(COURSES)
                .find(doc! { "_id": { "$in": course_ids } })
                .projection(doc! { "title": 1, "instructor": 1 })
                .await
                .context("Failed to query enrolled courses")?
                .try_collect()
                .await
                .context("Failed to read enrolled courses")?;
            for d in docs {
                if let Ok(course_id) = d.get_object_id("_id") {
                    let title = d.get_str("title").unwrap_or_default().to_string();
                    let instructor = d.get_object_id("instructor").ok().map(|i| i.to_hex());
                    courses.insert(course_id, (title, instructor));
                }
            }
        }

        let enrolled: Vec<EnrollmentView> = user
            .enrolled_courses
            .iter()
            .map(|e| {
                let mut view = EnrollmentView::from(e);
                if let Some((title, instructor)) = courses.get(&e.course_id) {
                    view.course_title = Some(title.clone());
                    view.instructor = instructor.clone();
                }
                view
            })
            .collect();

        let mut profile = UserProfile::from(user);
        profile.enrolled_courses = enrolled;
        Ok(profile)
    }

    pub async fn create(&self, req: CreateUserRequest) -> ApiResult<UserProfile> {
        let email = normalize_email(&req.email);
        if self.email_taken(&email, None).await? {
            return Err(ApiError::bad_request(DUPLICATE_EMAIL));
        }

        let now = Utc::now();
        let mut user = User {
            id: None,
            email,
            password_hash: hash_password(&req.password)?,
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            role: req.role,
            status: req.status.unwrap_or_default(),
            avatar: None,
            enrolled_courses: Vec::new(),
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        let inserted = match self.users().insert_one(&user).await {
            Ok(result) => result,
            Err(e) if is_duplicate_key(&e) => return Err(ApiError::bad_request(DUPLICATE_EMAIL)),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to insert user").into()),
        };
        user.id = inserted.inserted_id.as_object_id();
        tracing::info!(user_id = ?user.id, role = user.role.as_str(), "User created by admin");
        Ok(user.into())
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: &str,
        req: UpdateUserRequest,
    ) -> ApiResult<UserProfile> {
        let id = parse_object_id(id, "user id")?;
        caller.require_owner_or_admin(&id)?;
        let req = if caller.is_admin() {
            req
        } else {
            req.restrict_to_self_service()
        };

        let mut set = Document::new();
        if let Some(first_name) = &req.first_name {
            set.insert("firstName", first_name.trim());
        }
        if let Some(last_name) = &req.last_name {
            set.insert("lastName", last_name.trim());
        }
        if let Some(email) = &req.email {
            let email = normalize_email(email);
            if self.email_taken(&email, Some(&id)).await? {
                return Err(ApiError::bad_request(DUPLICATE_EMAIL));
            }
            set.insert("email", email);
        }
        if let Some(avatar) = &req.avatar {
            set.insert("avatar", avatar.as_str());
        }
        if let Some(role) = req.role {
            set.insert("role", role.as_str());
        }
        if let Some(status) = req.status {
            set.insert("status", status.as_str());
        }
        if let Some(password) = &req.password {
            set.insert("password", hash_password(password)?);
        }

        if set.is_empty() {
            return Ok(self.find(&id).await?.into());
        }
        set.insert("updatedAt", to_bson(&Utc::now()));

        let updated = match self
            .users()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
        {
            Ok(user) => user,
            Err(e) if is_duplicate_key(&e) => return Err(ApiError::bad_request(DUPLICATE_EMAIL)),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to update user").into()),
        };
        let updated = updated.ok_or_else(|| ApiError::not_found("User not found"))?;

        tracing::info!(user_id = %id, by = %caller.id, "User updated");
        Ok(updated.into())
    }

    /// Removes the account with its course enrollments and notifications
    pub async fn delete(&self, caller: &AuthUser, id: &str) -> ApiResult<()> {
        let id = parse_object_id(id, "user id")?;
        if id == caller.id {
            return Err(ApiError::bad_request("You cannot delete your own account"));
        }

        let result = self
            .users()
            .delete_one(doc! { "_id": id })
            .await
            .context("Failed to delete user")?;
        if result.deleted_count == 0 {
            return Err(ApiError::not_found("User not found"));
        }

        let courses = CourseService::new(self.mongo.clone())
            .remove_student_everywhere(&id)
            .await?;
        let notifications = NotificationService::new(self.mongo.clone())
            .delete_for_recipient(&id)
            .await?;
        tracing::info!(
            user_id = %id,
            by = %caller.id,
            courses,
            notifications,
            "User deleted"
        );
        Ok(())
    }

    /// Enrolls the given user; admins may enroll anyone, others only themselves
    pub async fn enroll(&self, caller: &AuthUser, id: &str, course_id: &str) -> ApiResult<()> {
        let id = parse_object_id(id, "user id")?;
        caller.require_owner_or_admin(&id)?;
        let student = self.find(&id).await?;
        CourseService::new(self.mongo.clone())
            .enroll(&student, course_id, id == caller.id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(search: Option<&str>, role: Option<&str>) -> ListUsersQuery {
        ListUsersQuery {
            page: None,
            limit: None,
            search: search.map(str::to_string),
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn test_list_filter_search_and_role() {
        assert_eq!(list_filter(&query(None, None)).unwrap(), doc! {});

        let filter = list_filter(&query(Some("ada"), Some("instructor"))).unwrap();
        assert_eq!(filter.get_str("role").unwrap(), "instructor");
        assert_eq!(filter.get_array("$or").unwrap().len(), 3);

        // blank values are ignored
        assert_eq!(list_filter(&query(Some("  "), Some(""))).unwrap(), doc! {});
    }

    #[test]
    fn test_list_filter_rejects_unknown_role() {
        let err = list_filter(&query(None, Some("wizard"))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid role: wizard");
    }
}
