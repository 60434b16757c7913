use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::assignment::{TitleLookup, TitledRef};
use super::datetime::bson_datetime_as_chrono;
use super::user::{UserLookup, UserRef};

/// Notification stored in MongoDB "notifications" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub recipient: ObjectId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_course: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_assignment: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_user: Option<ObjectId>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    CourseCreated,
    CourseAssigned,
    AssignmentCreated,
    AssignmentGraded,
    CoursePublished,
    NewEnrollment,
    SubmissionReceived,
    General,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::CourseCreated => "course_created",
            NotificationType::CourseAssigned => "course_assigned",
            NotificationType::AssignmentCreated => "assignment_created",
            NotificationType::AssignmentGraded => "assignment_graded",
            NotificationType::CoursePublished => "course_published",
            NotificationType::NewEnrollment => "new_enrollment",
            NotificationType::SubmissionReceived => "submission_received",
            NotificationType::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    pub limit: Option<i64>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_course: Option<TitledRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_assignment: Option<TitledRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_user: Option<UserRef>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

/// Lookups used to populate notification references
#[derive(Debug, Default)]
pub struct NotificationRefs {
    pub courses: TitleLookup,
    pub assignments: TitleLookup,
    pub users: UserLookup,
}

impl NotificationResponse {
    pub fn build(notification: Notification, refs: &NotificationRefs) -> Self {
        NotificationResponse {
            id: notification.id.map(|id| id.to_hex()).unwrap_or_default(),
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            related_course: notification
                .related_course
                .map(|id| TitledRef::resolve(&id, &refs.courses)),
            related_assignment: notification
                .related_assignment
                .map(|id| TitledRef::resolve(&id, &refs.assignments)),
            related_user: notification
                .related_user
                .map(|id| UserRef::resolve(&id, &refs.users)),
            is_read: notification.is_read,
            link: notification.link,
            priority: notification.priority,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
    pub unread_count: u64,
}

#[derive(Debug, Serialize)]
pub struct NotificationMessageResponse {
    pub message: String,
    pub notification: NotificationResponse,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub message: String,
    pub modified: u64,
}
