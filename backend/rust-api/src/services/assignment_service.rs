use crate::error::{parse_object_id, ApiError, ApiResult, FieldError};
use crate::metrics::{track_db_operation, GRADES_TOTAL, SUBMISSIONS_TOTAL};
use crate::middlewares::auth::AuthUser;
use crate::models::assignment::{
    check_quiz_questions, Assignment, AssignmentListResponse, AssignmentResponse, Audience,
    CreateAssignmentRequest, Grade, GradeRequest, GradeResponse, GradeView, ListAssignmentsQuery,
    Submission, SubmissionListResponse, SubmissionStatus, SubmissionView, SubmitRequest,
    SubmitResponse, UpdateAssignmentRequest,
};
use crate::models::course::{Course, PublishResponse};
use crate::models::datetime::{parse_flexible, to_bson};
use crate::models::user::UserRole;
use crate::models::{empty_array_filter, ASSIGNMENTS, COURSES};
use crate::services::lookup;
use crate::services::notification_service::{self, NotificationService};
use crate::utils::pagination::Pagination;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

/// Which assignments a caller may list
#[derive(Debug, Clone, PartialEq)]
pub enum ListScope {
    Admin,
    Instructor(ObjectId),
    /// Courses the student is enrolled in
    Student(Vec<ObjectId>),
}

/// Start and end of the UTC day named by `raw`
pub fn due_day_window(raw: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let parsed = parse_flexible(raw)?;
    let start = parsed.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
    Some((start, start + Duration::days(1)))
}

pub fn list_filter(
    scope: &ListScope,
    course: Option<ObjectId>,
    due: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Document {
    let mut filter = Document::new();
    match scope {
        ListScope::Admin => {
            if let Some(course) = course {
                filter.insert("course", course);
            }
        }
        ListScope::Instructor(instructor) => {
            filter.insert("instructor", *instructor);
            if let Some(course) = course {
                filter.insert("course", course);
            }
        }
        ListScope::Student(enrolled) => {
            // a course filter can only narrow the enrolled set
            let courses: Vec<ObjectId> = match course {
                Some(course) if enrolled.contains(&course) => vec![course],
                Some(_) => Vec::new(),
                None => enrolled.clone(),
            };
            filter.insert("course", doc! { "$in": courses });
            filter.insert("isPublished", true);
        }
    }
    if let Some((start, end)) = due {
        filter.insert("dueDate", doc! { "$gte": to_bson(&start), "$lt": to_bson(&end) });
    }
    filter
}

pub fn attempts_exhausted_message(max_attempts: i32) -> String {
    if max_attempts <= 1 {
        "Assignment already submitted. Multiple attempts not allowed.".to_string()
    } else {
        format!(
            "You have reached the maximum number of attempts ({})",
            max_attempts
        )
    }
}

pub struct AssignmentService {
    mongo: Database,
}

impl AssignmentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn assignments(&self) -> Collection<Assignment> {
        self.mongo.collection::<Assignment>(ASSIGNMENTS)
    }

    fn courses(&self) -> Collection<Course> {
        self.mongo.collection::<Course>(COURSES)
    }

    fn notifications(&self) -> NotificationService {
        NotificationService::new(self.mongo.clone())
    }

    async fn find(&self, id: &ObjectId) -> ApiResult<Assignment> {
        self.assignments()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query assignment")?
            .ok_or_else(|| ApiError::not_found("Assignment not found"))
    }

    async fn find_course(&self, id: &ObjectId) -> ApiResult<Course> {
        self.courses()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query course")?
            .ok_or_else(|| ApiError::not_found("Course not found"))
    }

    async fn enrolled_course_ids(&self, student: &ObjectId) -> anyhow::Result<Vec<ObjectId>> {
        let docs: Vec<Document> = self
            .mongo
            .collection::<Document>(COURSES)
            .find(doc! { "enrolledStudents.student": student })
            .projection(doc! { "_id": 1 })
            .await
            .context("Failed to query enrolled courses")?
            .try_collect()
            .await
            .context("Failed to read enrolled courses")?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok())
            .collect())
    }

    fn audience_for(caller: &AuthUser) -> Audience {
        if caller.role == UserRole::Student {
            Audience::Student(caller.id)
        } else {
            Audience::Staff
        }
    }

    async fn respond_many(
        &self,
        assignments: Vec<Assignment>,
        audience: Audience,
    ) -> ApiResult<Vec<AssignmentResponse>> {
        let courses =
            lookup::course_titles(&self.mongo, assignments.iter().map(|a| a.course)).await?;
        let mut user_ids: Vec<ObjectId> = assignments.iter().map(|a| a.instructor).collect();
        for assignment in &assignments {
            for submission in &assignment.submissions {
                if let Audience::Student(me) = audience {
                    if submission.student != me {
                        continue;
                    }
                }
                user_ids.push(submission.student);
                if let Some(grade) = &submission.grade {
                    user_ids.push(grade.graded_by);
                }
            }
        }
        let users = lookup::user_summaries(&self.mongo, user_ids).await?;
        Ok(assignments
            .into_iter()
            .map(|a| AssignmentResponse::build(a, &courses, &users, audience))
            .collect())
    }

    async fn respond(&self, assignment: Assignment, audience: Audience) -> ApiResult<AssignmentResponse> {
        let mut built = self.respond_many(vec![assignment], audience).await?;
        built
            .pop()
            .ok_or_else(|| ApiError::Internal(anyhow!("Assignment response missing")))
    }

    /// Loads the assignment and checks the caller may change it
    async fn find_owned(&self, caller: &AuthUser, id: &str) -> ApiResult<Assignment> {
        let id = parse_object_id(id, "assignment id")?;
        let assignment = self.find(&id).await?;
        caller.require_owner_or_admin(&assignment.instructor)?;
        Ok(assignment)
    }

    pub async fn list(
        &self,
        caller: &AuthUser,
        query: ListAssignmentsQuery,
    ) -> ApiResult<AssignmentListResponse> {
        let pagination = Pagination::from_query(query.page, query.limit);
        let course = match query.course_id.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(raw) => Some(parse_object_id(raw.trim(), "courseId")?),
            None => None,
        };
        let due = match query.due_date.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(raw) => Some(
                due_day_window(raw.trim())
                    .ok_or_else(|| ApiError::bad_request("Invalid dueDate"))?,
            ),
            None => None,
        };

        let scope = match caller.role {
            UserRole::Admin => ListScope::Admin,
            UserRole::Student => ListScope::Student(self.enrolled_course_ids(&caller.id).await?),
            _ => ListScope::Instructor(caller.id),
        };
        let filter = list_filter(&scope, course, due);

        let assignments: Vec<Assignment> = self
            .assignments()
            .find(filter.clone())
            .sort(doc! { "dueDate": 1 })
            .skip(pagination.skip())
            .limit(pagination.limit_i64())
            .await
            .context("Failed to query assignments")?
            .try_collect()
            .await
            .context("Failed to read assignments")?;

        let total = self
            .assignments()
            .count_documents(filter)
            .await
            .context("Failed to count assignments")?;

        Ok(AssignmentListResponse {
            assignments: self
                .respond_many(assignments, Self::audience_for(caller))
                .await?,
            total_pages: pagination.total_pages(total),
            current_page: pagination.page,
            total,
        })
    }

    pub async fn get(&self, caller: &AuthUser, id: &str) -> ApiResult<AssignmentResponse> {
        let id = parse_object_id(id, "assignment id")?;
        let assignment = self.find(&id).await?;

        match caller.role {
            UserRole::Admin => {}
            UserRole::Student => {
                let course = self.find_course(&assignment.course).await?;
                if !assignment.is_published || !course.has_student(&caller.id) {
                    return Err(ApiError::forbidden("Access denied"));
                }
            }
            _ => {
                if !assignment.is_owned_by(&caller.id) {
                    return Err(ApiError::forbidden("Access denied"));
                }
            }
        }

        self.respond(assignment, Self::audience_for(caller)).await
    }

    pub async fn create(
        &self,
        caller: &AuthUser,
        req: CreateAssignmentRequest,
    ) -> ApiResult<AssignmentResponse> {
        caller.require_role(&[UserRole::Instructor, UserRole::Admin])?;
        let course_id = parse_object_id(&req.course, "course")?;
        let course = self.find_course(&course_id).await?;
        if !caller.is_admin() && !course.is_owned_by(&caller.id) {
            return Err(ApiError::forbidden(
                "Access denied. You can only create assignments for your courses.",
            ));
        }

        let now = Utc::now();
        let mut assignment = Assignment {
            id: None,
            title: req.title.trim().to_string(),
            description: req.description,
            instructions: req.instructions,
            course: course_id,
            instructor: course.instructor,
            kind: req.kind,
            max_points: req.max_points,
            due_date: req.due_date,
            attachments: req.attachments,
            quiz_questions: req.quiz_questions,
            settings: req.settings,
            is_published: req.is_published,
            publish_date: req.is_published.then_some(now),
            submissions: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let inserted = self
            .assignments()
            .insert_one(&assignment)
            .await
            .context("Failed to insert assignment")?;
        assignment.id = inserted.inserted_id.as_object_id();
        tracing::info!(assignment_id = ?assignment.id, course_id = %course_id, "Assignment created");

        if assignment.is_published {
            self.announce(caller, &assignment, &course).await?;
        }

        self.respond(assignment, Audience::Staff).await
    }

    /// Tells every enrolled student about a newly published assignment
    async fn announce(&self, caller: &AuthUser, assignment: &Assignment, course: &Course) -> ApiResult<()> {
        let Some(author) = lookup::find_user(&self.mongo, &caller.id).await? else {
            tracing::warn!(user_id = %caller.id, "Publishing user no longer exists");
            return Ok(());
        };
        self.notifications()
            .notify(
                &course.student_ids(),
                notification_service::assignment_created(&author, assignment, &course.title),
            )
            .await;
        Ok(())
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: &str,
        req: UpdateAssignmentRequest,
    ) -> ApiResult<AssignmentResponse> {
        let assignment = self.find_owned(caller, id).await?;

        let kind = req.kind.unwrap_or(assignment.kind);
        let questions = req
            .quiz_questions
            .as_deref()
            .unwrap_or(&assignment.quiz_questions);
        if let Err(err) = check_quiz_questions(kind, questions) {
            let message = err
                .message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Invalid quiz questions".to_string());
            return Err(ApiError::Validation(vec![FieldError::new(
                "quizQuestions",
                message,
            )]));
        }

        let mut set = req.set_document()?;
        if set.is_empty() {
            return self.respond(assignment, Audience::Staff).await;
        }
        set.insert("updatedAt", to_bson(&Utc::now()));

        let updated = self
            .assignments()
            .find_one_and_update(doc! { "_id": assignment.id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update assignment")?
            .ok_or_else(|| ApiError::not_found("Assignment not found"))?;

        self.respond(updated, Audience::Staff).await
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> ApiResult<()> {
        let assignment = self.find_owned(caller, id).await?;
        let assignment_id = assignment
            .id
            .ok_or_else(|| anyhow!("Assignment without id"))?;
        let result = self
            .assignments()
            .delete_one(empty_array_filter(assignment_id, "submissions"))
            .await
            .context("Failed to delete assignment")?;
        if result.deleted_count == 0 {
            return Err(ApiError::bad_request(
                "Cannot delete assignment with submissions. Please grade all submissions first.",
            ));
        }
        tracing::info!(assignment_id = %assignment_id, by = %caller.id, "Assignment deleted");
        Ok(())
    }

    pub async fn toggle_publish(&self, caller: &AuthUser, id: &str) -> ApiResult<PublishResponse> {
        let assignment = self.find_owned(caller, id).await?;
        let now = Utc::now();
        let publish = !assignment.is_published;
        let mut first_publish = false;

        if publish && assignment.publish_date.is_none() {
            let stamped = self
                .assignments()
                .update_one(
                    doc! { "_id": assignment.id, "publishDate": Bson::Null },
                    doc! { "$set": {
                        "isPublished": true,
                        "publishDate": to_bson(&now),
                        "updatedAt": to_bson(&now),
                    } },
                )
                .await
                .context("Failed to publish assignment")?;
            first_publish = stamped.modified_count == 1;
        }

        if !first_publish {
            self.assignments()
                .update_one(
                    doc! { "_id": assignment.id },
                    doc! { "$set": { "isPublished": publish, "updatedAt": to_bson(&now) } },
                )
                .await
                .context("Failed to update assignment publication")?;
        } else {
            let course = self.find_course(&assignment.course).await?;
            self.announce(caller, &assignment, &course).await?;
        }

        Ok(PublishResponse {
            message: format!(
                "Assignment {} successfully",
                if publish { "published" } else { "unpublished" }
            ),
            is_published: publish,
        })
    }

    pub async fn submit(
        &self,
        caller: &AuthUser,
        id: &str,
        req: SubmitRequest,
    ) -> ApiResult<SubmitResponse> {
        caller.require_role(&[UserRole::Student])?;
        let id = parse_object_id(id, "assignment id")?;
        let assignment = self.find(&id).await?;

        if !assignment.is_published {
            return Err(ApiError::bad_request("Assignment is not published yet"));
        }
        let course = self.find_course(&assignment.course).await?;
        if !course.has_student(&caller.id) {
            return Err(ApiError::forbidden(
                "You must be enrolled in the course to submit assignments",
            ));
        }

        let now = Utc::now();
        let is_late = assignment.is_late_at(now);
        if is_late && !assignment.settings.allow_late_submission {
            return Err(ApiError::bad_request(
                "Late submissions are not allowed for this assignment",
            ));
        }

        let attempt = assignment
            .next_attempt(&caller.id)
            .ok_or_else(|| {
                ApiError::bad_request(attempts_exhausted_message(assignment.settings.max_attempts))
            })?;

        let quiz_score = assignment.score_quiz(&req.content.answers);
        let submission = Submission {
            id: ObjectId::new(),
            student: caller.id,
            submission_date: now,
            attempt,
            content: req.content,
            is_late,
            status: SubmissionStatus::Submitted,
            quiz_score,
            grade: None,
        };
        let entry = bson::to_bson(&submission)?;

        // each filter pins the state next_attempt was computed from
        let (filter, update) = if attempt == 1 {
            (
                doc! { "_id": id, "submissions.student": { "$ne": caller.id } },
                doc! { "$push": { "submissions": entry } },
            )
        } else {
            (
                doc! {
                    "_id": id,
                    "submissions": { "$elemMatch": { "student": caller.id, "attempt": attempt - 1 } },
                },
                doc! { "$set": { "submissions.$": entry } },
            )
        };
        let result = track_db_operation("update_one", ASSIGNMENTS, async {
            self.assignments().update_one(filter, update).await
        })
        .await
        .context("Failed to store submission")?;
        if result.modified_count == 0 {
            return Err(ApiError::bad_request(attempts_exhausted_message(
                assignment.settings.max_attempts,
            )));
        }

        SUBMISSIONS_TOTAL
            .with_label_values(&[if is_late { "true" } else { "false" }])
            .inc();
        tracing::info!(
            assignment_id = %id,
            student_id = %caller.id,
            attempt,
            is_late,
            "Assignment submitted"
        );

        if let Some(student) = lookup::find_user(&self.mongo, &caller.id).await? {
            self.notifications()
                .notify(
                    &[assignment.instructor],
                    notification_service::submission_received(&student, &assignment),
                )
                .await;
        }

        Ok(SubmitResponse {
            message: "Assignment submitted successfully".to_string(),
            is_late,
            attempt,
            quiz_score,
        })
    }

    pub async fn submissions(&self, caller: &AuthUser, id: &str) -> ApiResult<SubmissionListResponse> {
        caller.require_role(&[UserRole::Instructor, UserRole::Admin])?;
        let assignment = self.find_owned(caller, id).await?;

        let mut user_ids: Vec<ObjectId> = Vec::new();
        for submission in &assignment.submissions {
            user_ids.push(submission.student);
            if let Some(grade) = &submission.grade {
                user_ids.push(grade.graded_by);
            }
        }
        let users = lookup::user_summaries(&self.mongo, user_ids).await?;

        Ok(SubmissionListResponse {
            assignment_id: assignment.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: assignment.title,
            max_points: assignment.max_points,
            submissions: assignment
                .submissions
                .into_iter()
                .map(|s| SubmissionView::build(s, &users))
                .collect(),
        })
    }

    pub async fn grade(
        &self,
        caller: &AuthUser,
        id: &str,
        submission_id: &str,
        req: GradeRequest,
    ) -> ApiResult<GradeResponse> {
        caller.require_role(&[UserRole::Instructor, UserRole::Admin])?;
        let assignment = self.find_owned(caller, id).await?;
        let submission_id = parse_object_id(submission_id, "submission id")?;
        let submission = assignment
            .submission(&submission_id)
            .ok_or_else(|| ApiError::not_found("Submission not found"))?;
        let student = submission.student;

        assignment
            .check_grade_points(req.points)
            .map_err(ApiError::bad_request)?;

        let grade = Grade {
            points: req.points,
            feedback: req.feedback.unwrap_or_default(),
            graded_by: caller.id,
            graded_date: Utc::now(),
        };

        let result = self
            .assignments()
            .update_one(
                doc! { "_id": assignment.id, "submissions._id": submission_id },
                doc! { "$set": {
                    "submissions.$.grade": bson::to_bson(&grade)?,
                    "submissions.$.status": bson::to_bson(&SubmissionStatus::Graded)?,
                    "updatedAt": to_bson(&grade.graded_date),
                } },
            )
            .await
            .context("Failed to store grade")?;
        if result.matched_count == 0 {
            // replaced by a resubmission in the meantime
            return Err(ApiError::not_found("Submission not found"));
        }

        GRADES_TOTAL
            .with_label_values(&[assignment.kind.as_str()])
            .inc();
        tracing::info!(
            assignment_id = ?assignment.id,
            submission_id = %submission_id,
            points = grade.points,
            "Submission graded"
        );

        self.notifications()
            .notify(
                &[student],
                notification_service::assignment_graded(&assignment, grade.points),
            )
            .await;

        let users = lookup::user_summaries(&self.mongo, [caller.id]).await?;
        Ok(GradeResponse {
            message: "Assignment graded successfully".to_string(),
            grade: GradeView::build(grade, &users),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_course_filter_never_widens() {
        let enrolled = vec![ObjectId::new(), ObjectId::new()];
        let scope = ListScope::Student(enrolled.clone());

        let all = list_filter(&scope, None, None);
        assert_eq!(
            all,
            doc! { "course": { "$in": enrolled.clone() }, "isPublished": true }
        );

        let narrowed = list_filter(&scope, Some(enrolled[1]), None);
        assert_eq!(
            narrowed,
            doc! { "course": { "$in": [enrolled[1]] }, "isPublished": true }
        );

        let foreign = list_filter(&scope, Some(ObjectId::new()), None);
        let courses = foreign.get_document("course").unwrap().get_array("$in").unwrap();
        assert!(courses.is_empty());
    }

    #[test]
    fn test_instructor_and_admin_scopes() {
        let me = ObjectId::new();
        let course = ObjectId::new();
        assert_eq!(
            list_filter(&ListScope::Instructor(me), Some(course), None),
            doc! { "instructor": me, "course": course }
        );
        assert_eq!(list_filter(&ListScope::Admin, None, None), doc! {});
    }

    #[test]
    fn test_due_day_window() {
        let (start, end) = due_day_window("2030-01-15").unwrap();
        assert_eq!(start.to_rfc3339(), "2030-01-15T00:00:00+00:00");
        assert_eq!(end - start, Duration::days(1));

        let (start, _) = due_day_window("2030-01-15T18:30:00Z").unwrap();
        assert_eq!(start.to_rfc3339(), "2030-01-15T00:00:00+00:00");

        assert!(due_day_window("next tuesday").is_none());

        let filter = list_filter(&ListScope::Admin, None, due_day_window("2030-01-15"));
        let due = filter.get_document("dueDate").unwrap();
        assert!(due.contains_key("$gte") && due.contains_key("$lt"));
    }

    #[test]
    fn test_attempt_messages() {
        assert_eq!(
            attempts_exhausted_message(1),
            "Assignment already submitted. Multiple attempts not allowed."
        );
        assert_eq!(
            attempts_exhausted_message(3),
            "You have reached the maximum number of attempts (3)"
        );
    }
}
