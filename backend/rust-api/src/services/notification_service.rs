use crate::error::{parse_object_id, ApiError, ApiResult};
use crate::metrics::{track_db_operation, NOTIFICATIONS_CREATED_TOTAL};
use crate::models::assignment::Assignment;
use crate::models::course::Course;
use crate::models::datetime::to_bson;
use crate::models::notification::{
    ListNotificationsQuery, MarkAllReadResponse, Notification, NotificationListResponse,
    NotificationRefs, NotificationResponse, NotificationType, Priority,
};
use crate::models::user::{User, UserRole};
use crate::models::{ASSIGNMENTS, NOTIFICATIONS, USERS};
use crate::services::lookup;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

/// Event payload shared by every recipient of one fan-out
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_course: Option<ObjectId>,
    pub related_assignment: Option<ObjectId>,
    pub related_user: Option<ObjectId>,
    pub link: Option<String>,
    pub priority: Priority,
}

impl NotificationDraft {
    pub fn for_recipients(&self, recipients: &[ObjectId], now: DateTime<Utc>) -> Vec<Notification> {
        recipients
            .iter()
            .map(|recipient| Notification {
                id: None,
                recipient: *recipient,
                kind: self.kind,
                title: self.title.clone(),
                message: self.message.clone(),
                related_course: self.related_course,
                related_assignment: self.related_assignment,
                related_user: self.related_user,
                is_read: false,
                link: self.link.clone(),
                priority: self.priority,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }
}

fn course_link(course: &Course) -> Option<String> {
    course.id.map(|id| format!("/courses/{}", id.to_hex()))
}

fn assignment_link(assignment: &Assignment) -> Option<String> {
    assignment.id.map(|id| format!("/assignments/{}", id.to_hex()))
}

pub fn course_created(admin: &User, course: &Course) -> NotificationDraft {
    NotificationDraft {
        kind: NotificationType::CourseCreated,
        title: "New Course Available".to_string(),
        message: format!(
            "Admin {} has created a new course: \"{}\"",
            admin.full_name(),
            course.title
        ),
        related_course: course.id,
        related_assignment: None,
        related_user: admin.id,
        link: course_link(course),
        priority: Priority::Medium,
    }
}

pub fn course_published(instructor: &User, course: &Course) -> NotificationDraft {
    NotificationDraft {
        kind: NotificationType::CoursePublished,
        title: "New Course Published".to_string(),
        message: format!(
            "{} has published a new course: \"{}\"",
            instructor.full_name(),
            course.title
        ),
        related_course: course.id,
        related_assignment: None,
        related_user: instructor.id,
        link: course_link(course),
        priority: Priority::Medium,
    }
}

pub fn course_assigned(assigned_by: &User, course: &Course) -> NotificationDraft {
    NotificationDraft {
        kind: NotificationType::CourseAssigned,
        title: "Course Assigned to You".to_string(),
        message: format!(
            "{} has assigned you to teach \"{}\"",
            assigned_by.full_name(),
            course.title
        ),
        related_course: course.id,
        related_assignment: None,
        related_user: assigned_by.id,
        link: course_link(course),
        priority: Priority::High,
    }
}

pub fn assignment_created(
    instructor: &User,
    assignment: &Assignment,
    course_title: &str,
) -> NotificationDraft {
    NotificationDraft {
        kind: NotificationType::AssignmentCreated,
        title: "New Assignment Posted".to_string(),
        message: format!(
            "{} has posted a new assignment \"{}\" for {}. Due: {}",
            instructor.full_name(),
            assignment.title,
            course_title,
            assignment.due_date.format("%-m/%-d/%Y")
        ),
        related_course: Some(assignment.course),
        related_assignment: assignment.id,
        related_user: instructor.id,
        link: assignment_link(assignment),
        priority: Priority::High,
    }
}

pub fn submission_received(student: &User, assignment: &Assignment) -> NotificationDraft {
    NotificationDraft {
        kind: NotificationType::SubmissionReceived,
        title: "New Assignment Submission".to_string(),
        message: format!(
            "{} has submitted \"{}\"",
            student.full_name(),
            assignment.title
        ),
        related_course: Some(assignment.course),
        related_assignment: assignment.id,
        related_user: student.id,
        link: assignment_link(assignment),
        priority: Priority::Medium,
    }
}

pub fn assignment_graded(assignment: &Assignment, points: f64) -> NotificationDraft {
    NotificationDraft {
        kind: NotificationType::AssignmentGraded,
        title: "Assignment Graded".to_string(),
        message: format!(
            "Your assignment \"{}\" has been graded. Score: {}/{}",
            assignment.title, points, assignment.max_points
        ),
        related_course: Some(assignment.course),
        related_assignment: assignment.id,
        related_user: Some(assignment.instructor),
        link: assignment_link(assignment),
        priority: Priority::High,
    }
}

pub fn new_enrollment(student: &User, course: &Course) -> NotificationDraft {
    NotificationDraft {
        kind: NotificationType::NewEnrollment,
        title: "New Student Enrollment".to_string(),
        message: format!(
            "{} has enrolled in your course \"{}\"",
            student.full_name(),
            course.title
        ),
        related_course: course.id,
        related_assignment: None,
        related_user: student.id,
        link: course_link(course),
        priority: Priority::Low,
    }
}

pub struct NotificationService {
    mongo: Database,
}

impl NotificationService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn notifications(&self) -> Collection<Notification> {
        self.mongo.collection::<Notification>(NOTIFICATIONS)
    }

    /// One `insert_many` for all recipients; no round-trip when there are none
    pub async fn fan_out(&self, recipients: &[ObjectId], draft: &NotificationDraft) -> Result<usize> {
        if recipients.is_empty() {
            return Ok(0);
        }
        let batch = draft.for_recipients(recipients, Utc::now());
        let result = track_db_operation("insert_many", NOTIFICATIONS, async {
            self.notifications().insert_many(&batch).await
        })
        .await
        .context("Failed to insert notifications")?;
        let inserted = result.inserted_ids.len();
        NOTIFICATIONS_CREATED_TOTAL
            .with_label_values(&[draft.kind.as_str()])
            .inc_by(inserted as u64);
        Ok(inserted)
    }

    /// Fan-out whose failure is logged and swallowed
    pub async fn notify(&self, recipients: &[ObjectId], draft: NotificationDraft) {
        match self.fan_out(recipients, &draft).await {
            Ok(count) => tracing::debug!(
                kind = draft.kind.as_str(),
                count,
                "Notifications created"
            ),
            Err(e) => tracing::error!(
                kind = draft.kind.as_str(),
                error = %e,
                "Failed to create notifications"
            ),
        }
    }

    pub async fn notify_role(&self, role: UserRole, draft: NotificationDraft) {
        match self.active_user_ids(role).await {
            Ok(recipients) => self.notify(&recipients, draft).await,
            Err(e) => tracing::error!(
                role = role.as_str(),
                error = %e,
                "Failed to resolve notification recipients"
            ),
        }
    }

    async fn active_user_ids(&self, role: UserRole) -> Result<Vec<ObjectId>> {
        let docs: Vec<Document> = self
            .mongo
            .collection::<Document>(USERS)
            .find(doc! { "role": role.as_str(), "status": "active" })
            .projection(doc! { "_id": 1 })
            .await
            .context("Failed to query recipients")?
            .try_collect()
            .await
            .context("Failed to read recipients")?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok())
            .collect())
    }

    pub async fn list(
        &self,
        recipient: &ObjectId,
        query: ListNotificationsQuery,
    ) -> ApiResult<NotificationListResponse> {
        let limit = query
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT);

        let mut filter = doc! { "recipient": recipient };
        if query.unread_only {
            filter.insert("isRead", false);
        }

        let notifications: Vec<Notification> = self
            .notifications()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .limit(limit)
            .await
            .context("Failed to query notifications")?
            .try_collect()
            .await
            .context("Failed to read notifications")?;

        let unread_count = self
            .notifications()
            .count_documents(doc! { "recipient": recipient, "isRead": false })
            .await
            .context("Failed to count unread notifications")?;

        let refs = self.populate(&notifications).await?;
        Ok(NotificationListResponse {
            notifications: notifications
                .into_iter()
                .map(|n| NotificationResponse::build(n, &refs))
                .collect(),
            unread_count,
        })
    }

    async fn populate(&self, notifications: &[Notification]) -> Result<NotificationRefs> {
        Ok(NotificationRefs {
            courses: lookup::course_titles(
                &self.mongo,
                notifications.iter().filter_map(|n| n.related_course),
            )
            .await?,
            assignments: lookup::titles(
                &self.mongo,
                ASSIGNMENTS,
                notifications.iter().filter_map(|n| n.related_assignment),
            )
            .await?,
            users: lookup::user_summaries(
                &self.mongo,
                notifications.iter().filter_map(|n| n.related_user),
            )
            .await?,
        })
    }

    pub async fn mark_read(&self, recipient: &ObjectId, id: &str) -> ApiResult<NotificationResponse> {
        let id = parse_object_id(id, "notification id")?;
        let notification = self
            .notifications()
            .find_one_and_update(
                doc! { "_id": id, "recipient": recipient },
                doc! { "$set": { "isRead": true, "updatedAt": to_bson(&Utc::now()) } },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update notification")?
            .ok_or_else(|| ApiError::not_found("Notification not found"))?;

        let refs = self.populate(std::slice::from_ref(&notification)).await?;
        Ok(NotificationResponse::build(notification, &refs))
    }

    pub async fn mark_all_read(&self, recipient: &ObjectId) -> ApiResult<MarkAllReadResponse> {
        let result = self
            .notifications()
            .update_many(
                doc! { "recipient": recipient, "isRead": false },
                doc! { "$set": { "isRead": true, "updatedAt": to_bson(&Utc::now()) } },
            )
            .await
            .context("Failed to update notifications")?;
        Ok(MarkAllReadResponse {
            message: "All notifications marked as read".to_string(),
            modified: result.modified_count,
        })
    }

    pub async fn delete(&self, recipient: &ObjectId, id: &str) -> ApiResult<()> {
        let id = parse_object_id(id, "notification id")?;
        let result = self
            .notifications()
            .delete_one(doc! { "_id": id, "recipient": recipient })
            .await
            .context("Failed to delete notification")?;
        if result.deleted_count == 0 {
            return Err(ApiError::not_found("Notification not found"));
        }
        Ok(())
    }

    /// Removes everything addressed to a user that is being deleted
    pub async fn delete_for_recipient(&self, recipient: &ObjectId) -> Result<u64> {
        let result = self
            .notifications()
            .delete_many(doc! { "recipient": recipient })
            .await
            .context("Failed to delete user notifications")?;
        Ok(result.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assignment::{AssignmentSettings, AssignmentType};
    use crate::models::course::{CourseCategory, CourseDuration, CourseLevel};
    use crate::models::user::UserStatus;

    fn user(first: &str, last: &str, role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: Some(ObjectId::new()),
            email: format!("{}@example.com", first.to_lowercase()),
            password_hash: String::new(),
            first_name: first.into(),
            last_name: last.into(),
            role,
            status: UserStatus::Active,
            avatar: None,
            enrolled_courses: vec![],
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn course(instructor: &User) -> Course {
        let now = Utc::now();
        Course {
            id: Some(ObjectId::new()),
            title: "Intro to Rust".into(),
            description: "d".into(),
            instructor: instructor.id.unwrap(),
            category: CourseCategory::Programming,
            level: CourseLevel::Beginner,
            duration: CourseDuration {
                weeks: 1,
                hours_per_week: 1,
            },
            max_students: 10,
            price: 0.0,
            tags: vec![],
            thumbnail: None,
            is_published: false,
            published_date: None,
            enrolled_students: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn assignment(course: &Course) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: Some(ObjectId::new()),
            title: "Borrowing".into(),
            description: "d".into(),
            instructions: "i".into(),
            course: course.id.unwrap(),
            instructor: course.instructor,
            kind: AssignmentType::Essay,
            max_points: 10,
            due_date: DateTime::parse_from_rfc3339("2030-03-05T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            attachments: vec![],
            quiz_questions: vec![],
            settings: AssignmentSettings::default(),
            is_published: true,
            publish_date: None,
            submissions: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_graded_message() {
        let instructor = user("Grace", "Hopper", UserRole::Instructor);
        let a = assignment(&course(&instructor));
        let draft = assignment_graded(&a, 8.0);
        assert_eq!(
            draft.message,
            "Your assignment \"Borrowing\" has been graded. Score: 8/10"
        );
        assert_eq!(draft.priority, Priority::High);
        assert_eq!(
            draft.link,
            Some(format!("/assignments/{}", a.id.unwrap().to_hex()))
        );
        assert_eq!(assignment_graded(&a, 7.5).message.split("Score: ").nth(1), Some("7.5/10"));
    }

    #[test]
    fn test_course_messages() {
        let admin = user("Ada", "Lovelace", UserRole::Admin);
        let instructor = user("Grace", "Hopper", UserRole::Instructor);
        let c = course(&instructor);

        assert_eq!(
            course_created(&admin, &c).message,
            "Admin Ada Lovelace has created a new course: \"Intro to Rust\""
        );
        assert_eq!(
            course_published(&instructor, &c).message,
            "Grace Hopper has published a new course: \"Intro to Rust\""
        );
        let assigned = course_assigned(&admin, &c);
        assert_eq!(
            assigned.message,
            "Ada Lovelace has assigned you to teach \"Intro to Rust\""
        );
        assert_eq!(assigned.priority, Priority::High);

        let student = user("Linus", "T", UserRole::Student);
        let enrolled = new_enrollment(&student, &c);
        assert_eq!(
            enrolled.message,
            "Linus T has enrolled in your course \"Intro to Rust\""
        );
        assert_eq!(enrolled.priority, Priority::Low);
        assert_eq!(enrolled.related_user, student.id);
    }

    #[test]
    fn test_assignment_messages() {
        let instructor = user("Grace", "Hopper", UserRole::Instructor);
        let c = course(&instructor);
        let a = assignment(&c);
        assert_eq!(
            assignment_created(&instructor, &a, &c.title).message,
            "Grace Hopper has posted a new assignment \"Borrowing\" for Intro to Rust. Due: 3/5/2030"
        );
        let student = user("Linus", "T", UserRole::Student);
        assert_eq!(
            submission_received(&student, &a).message,
            "Linus T has submitted \"Borrowing\""
        );
    }

    #[test]
    fn test_draft_expands_per_recipient() {
        let instructor = user("Grace", "Hopper", UserRole::Instructor);
        let c = course(&instructor);
        let draft = course_published(&instructor, &c);
        let recipients = vec![ObjectId::new(), ObjectId::new(), ObjectId::new()];
        let batch = draft.for_recipients(&recipients, Utc::now());
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|n| !n.is_read && n.kind == NotificationType::CoursePublished));
        let got: Vec<ObjectId> = batch.iter().map(|n| n.recipient).collect();
        assert_eq!(got, recipients);
        assert!(draft.for_recipients(&[], Utc::now()).is_empty());
    }
}
