use crate::error::{parse_object_id, ApiError, ApiResult};
use crate::metrics::{track_db_operation, ENROLLMENTS_TOTAL};
use crate::middlewares::auth::AuthUser;
use crate::models::course::{
    enroll_filter, Course, CourseEnrollment, CourseListResponse, CourseResponse,
    CreateCourseRequest, ListCoursesQuery, ProgressRequest, ProgressResponse, PublishResponse,
    UnenrollRequest, UpdateCourseRequest,
};
use crate::models::datetime::to_bson;
use crate::models::user::{User, UserEnrollment, UserRole};
use crate::models::{empty_array_filter, ASSIGNMENTS, COURSES, USERS};
use crate::services::lookup;
use crate::services::notification_service::{self, NotificationService};
use crate::utils::pagination::{contains_ci, search_term, Pagination};
use anyhow::{anyhow, Context};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

/// Query filter for the public course listing.
/// Unpublished courses are only listed when staff ask for them explicitly:
/// admins see every draft, instructors only their own.
pub fn list_filter(query: &ListCoursesQuery, caller: Option<&AuthUser>) -> Document {
    let mut clauses: Vec<Document> = Vec::new();

    let wants_unpublished = query.published == Some(false);
    match caller {
        Some(user) if wants_unpublished && user.is_admin() => {}
        Some(user) if wants_unpublished && user.role == UserRole::Instructor => {
            clauses.push(doc! { "$or": [ { "isPublished": true }, { "instructor": user.id } ] });
        }
        _ => clauses.push(doc! { "isPublished": true }),
    }

    if let Some(term) = search_term(&query.search) {
        let regex = contains_ci(term);
        clauses.push(doc! {
            "$or": [
                { "title": regex.clone() },
                { "description": regex.clone() },
                { "tags": regex },
            ]
        });
    }
    if let Some(category) = search_term(&query.category) {
        clauses.push(doc! { "category": category });
    }
    if let Some(level) = search_term(&query.level) {
        clauses.push(doc! { "level": level });
    }

    match clauses.len() {
        0 => Document::new(),
        1 => clauses.remove(0),
        _ => doc! { "$and": clauses },
    }
}

/// Reason a student cannot join the course, if any
pub fn enrollment_block(course: &Course, student: &ObjectId, self_service: bool) -> Option<String> {
    if !course.is_published {
        return Some("Course is not published yet".to_string());
    }
    if course.has_student(student) {
        return Some(if self_service {
            "You are already enrolled in this course".to_string()
        } else {
            "User is already enrolled in this course".to_string()
        });
    }
    if course.is_full() {
        return Some("Course is full".to_string());
    }
    None
}

pub struct CourseService {
    mongo: Database,
}

impl CourseService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn courses(&self) -> Collection<Course> {
        self.mongo.collection::<Course>(COURSES)
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection::<User>(USERS)
    }

    fn notifications(&self) -> NotificationService {
        NotificationService::new(self.mongo.clone())
    }

    pub async fn find(&self, id: &ObjectId) -> ApiResult<Course> {
        self.courses()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query course")?
            .ok_or_else(|| ApiError::not_found("Course not found"))
    }

    async fn load_user(&self, id: &ObjectId) -> ApiResult<User> {
        lookup::find_user(&self.mongo, id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    /// Instructor and enrolled students populated
    async fn respond(&self, course: Course) -> ApiResult<CourseResponse> {
        let mut ids = course.student_ids();
        ids.push(course.instructor);
        let users = lookup::user_summaries(&self.mongo, ids).await?;
        Ok(CourseResponse::build(course, &users))
    }

    /// Instructors populated, students left as ids
    async fn respond_many(&self, courses: Vec<Course>) -> ApiResult<Vec<CourseResponse>> {
        let users =
            lookup::user_summaries(&self.mongo, courses.iter().map(|c| c.instructor)).await?;
        Ok(courses
            .into_iter()
            .map(|c| CourseResponse::build(c, &users))
            .collect())
    }

    pub async fn list(
        &self,
        caller: Option<&AuthUser>,
        query: ListCoursesQuery,
    ) -> ApiResult<CourseListResponse> {
        let pagination = Pagination::from_query(query.page, query.limit);
        let filter = list_filter(&query, caller);

        let courses: Vec<Course> = self
            .courses()
            .find(filter.clone())
            .sort(doc! { "createdAt": -1 })
            .skip(pagination.skip())
            .limit(pagination.limit_i64())
            .await
            .context("Failed to query courses")?
            .try_collect()
            .await
            .context("Failed to read courses")?;

        let total = self
            .courses()
            .count_documents(filter)
            .await
            .context("Failed to count courses")?;

        Ok(CourseListResponse {
            courses: self.respond_many(courses).await?,
            total_pages: pagination.total_pages(total),
            current_page: pagination.page,
            total,
        })
    }

    pub async fn get(&self, id: &str) -> ApiResult<CourseResponse> {
        let id = parse_object_id(id, "course id")?;
        let course = self.find(&id).await?;
        self.respond(course).await
    }

    pub async fn by_instructor(
        &self,
        caller: Option<&AuthUser>,
        instructor_id: &str,
    ) -> ApiResult<Vec<CourseResponse>> {
        let instructor_id = parse_object_id(instructor_id, "instructor id")?;
        let mut filter = doc! { "instructor": instructor_id };
        let sees_drafts = caller.is_some_and(|u| u.is_admin() || u.id == instructor_id);
        if !sees_drafts {
            filter.insert("isPublished", true);
        }

        let courses: Vec<Course> = self
            .courses()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await
            .context("Failed to query instructor courses")?
            .try_collect()
            .await
            .context("Failed to read instructor courses")?;

        self.respond_many(courses).await
    }

    /// The named user must exist and hold the instructor role
    async fn resolve_instructor(&self, raw: &str) -> ApiResult<User> {
        let id = parse_object_id(raw, "instructor id")?;
        match lookup::find_user(&self.mongo, &id).await? {
            Some(user) if user.role == UserRole::Instructor => Ok(user),
            _ => Err(ApiError::bad_request(
                "Assigned instructor must be an existing instructor",
            )),
        }
    }

    pub async fn create(&self, caller: &AuthUser, req: CreateCourseRequest) -> ApiResult<CourseResponse> {
        caller.require_role(&[UserRole::Instructor, UserRole::Admin])?;

        let assigned = match req.instructor.as_deref() {
            Some(raw) if caller.is_admin() => Some(self.resolve_instructor(raw).await?),
            _ => None,
        };
        let instructor = assigned
            .as_ref()
            .and_then(|u| u.id)
            .unwrap_or(caller.id);

        let now = Utc::now();
        let mut course = Course {
            id: None,
            title: req.title.trim().to_string(),
            description: req.description,
            instructor,
            category: req.category,
            level: req.level,
            duration: req.duration,
            max_students: req.max_students,
            price: req.price,
            tags: req.tags,
            thumbnail: req.thumbnail,
            is_published: false,
            published_date: None,
            enrolled_students: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let inserted = self
            .courses()
            .insert_one(&course)
            .await
            .context("Failed to insert course")?;
        course.id = inserted.inserted_id.as_object_id();
        tracing::info!(course_id = ?course.id, instructor = %instructor, "Course created");

        if caller.is_admin() {
            let admin = self.load_user(&caller.id).await?;
            let notifications = self.notifications();
            notifications
                .notify_role(
                    UserRole::Instructor,
                    notification_service::course_created(&admin, &course),
                )
                .await;
            if instructor != caller.id {
                notifications
                    .notify(
                        &[instructor],
                        notification_service::course_assigned(&admin, &course),
                    )
                    .await;
            }
        }

        self.respond(course).await
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: &str,
        req: UpdateCourseRequest,
    ) -> ApiResult<CourseResponse> {
        let id = parse_object_id(id, "course id")?;
        let course = self.find(&id).await?;
        if !caller.is_admin() && !course.is_owned_by(&caller.id) {
            return Err(ApiError::forbidden(
                "Access denied. You can only edit your own courses.",
            ));
        }

        let mut set = req.set_document()?;
        let mut reassigned_to = None;
        if let Some(raw) = req.instructor.as_deref() {
            if caller.is_admin() {
                let target = self.resolve_instructor(raw).await?;
                if let Some(target_id) = target.id.filter(|t| *t != course.instructor) {
                    set.insert("instructor", target_id);
                    reassigned_to = Some(target_id);
                }
            } else {
                tracing::warn!(user_id = %caller.id, course_id = %id, "Ignoring instructor change from non-admin");
            }
        }

        if set.is_empty() {
            return self.respond(course).await;
        }
        set.insert("updatedAt", to_bson(&Utc::now()));

        let updated = self
            .courses()
            .find_one_and_update(doc! { "_id": id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update course")?
            .ok_or_else(|| ApiError::not_found("Course not found"))?;

        if let Some(target) = reassigned_to {
            let admin = self.load_user(&caller.id).await?;
            self.notifications()
                .notify(
                    &[target],
                    notification_service::course_assigned(&admin, &updated),
                )
                .await;
        }

        self.respond(updated).await
    }

    pub async fn delete(&self, caller: &AuthUser, id: &str) -> ApiResult<()> {
        let id = parse_object_id(id, "course id")?;
        let course = self.find(&id).await?;
        if !caller.is_admin() && !course.is_owned_by(&caller.id) {
            return Err(ApiError::forbidden(
                "Access denied. You can only delete your own courses.",
            ));
        }

        // the enrollment guard lives in the filter so a concurrent enroll is not lost
        let result = self
            .courses()
            .delete_one(empty_array_filter(id, "enrolledStudents"))
            .await
            .context("Failed to delete course")?;
        if result.deleted_count == 0 {
            return Err(ApiError::bad_request(
                "Cannot delete course with enrolled students. Please unenroll all students first.",
            ));
        }

        let removed = self
            .mongo
            .collection::<Document>(ASSIGNMENTS)
            .delete_many(doc! { "course": id })
            .await
            .context("Failed to delete course assignments")?;
        tracing::info!(course_id = %id, assignments = removed.deleted_count, "Course deleted");
        Ok(())
    }

    /// Adds `student` to the course and mirrors it on the user document
    pub async fn enroll(&self, student: &User, course_id: &str, self_service: bool) -> ApiResult<()> {
        let course_id = parse_object_id(course_id, "course id")?;
        let student_id = student.id.ok_or_else(|| anyhow!("User without id"))?;
        if student.role != UserRole::Student {
            return Err(ApiError::bad_request("Only students can enroll in courses"));
        }

        let course = self.find(&course_id).await?;
        if let Some(reason) = enrollment_block(&course, &student_id, self_service) {
            return Err(ApiError::bad_request(reason));
        }

        let now = Utc::now();
        let entry = CourseEnrollment {
            student: student_id,
            enrollment_date: now,
            progress: 0,
            completed_lessons: Vec::new(),
        };

        let filter = enroll_filter(course_id, student_id);
        let update = doc! {
            "$push": { "enrolledStudents": bson::to_bson(&entry)? },
            "$set": { "updatedAt": to_bson(&now) },
        };
        let pushed = track_db_operation("update_one", COURSES, async {
            self.courses().update_one(filter, update).await
        })
        .await
        .context("Failed to enroll student")?;

        if pushed.modified_count == 0 {
            // lost a race; report whatever blocks it now
            let current = self.find(&course_id).await?;
            let reason = enrollment_block(&current, &student_id, self_service)
                .unwrap_or_else(|| "Unable to enroll in this course".to_string());
            return Err(ApiError::bad_request(reason));
        }

        let mirror = UserEnrollment {
            course_id,
            enrollment_date: now,
            progress: 0,
        };
        self.users()
            .update_one(
                doc! { "_id": student_id, "enrolledCourses.courseId": { "$ne": course_id } },
                doc! { "$push": { "enrolledCourses": bson::to_bson(&mirror)? } },
            )
            .await
            .context("Failed to record enrollment on user")?;

        ENROLLMENTS_TOTAL.with_label_values(&["enroll"]).inc();
        tracing::info!(course_id = %course_id, student_id = %student_id, "Student enrolled");

        self.notifications()
            .notify(
                &[course.instructor],
                notification_service::new_enrollment(student, &course),
            )
            .await;
        Ok(())
    }

    pub async fn unenroll(
        &self,
        caller: &AuthUser,
        course_id: &str,
        req: UnenrollRequest,
    ) -> ApiResult<()> {
        let course_id = parse_object_id(course_id, "course id")?;
        let course = self.find(&course_id).await?;

        let target = match req.student_id.as_deref() {
            Some(raw) => {
                let target = parse_object_id(raw, "studentId")?;
                if target != caller.id && !caller.is_admin() && !course.is_owned_by(&caller.id) {
                    return Err(ApiError::forbidden("Access denied"));
                }
                target
            }
            None => caller.id,
        };

        let pulled = self
            .courses()
            .update_one(
                doc! { "_id": course_id, "enrolledStudents.student": target },
                doc! {
                    "$pull": { "enrolledStudents": { "student": target } },
                    "$set": { "updatedAt": to_bson(&Utc::now()) },
                },
            )
            .await
            .context("Failed to unenroll student")?;
        if pulled.modified_count == 0 {
            return Err(ApiError::bad_request(if target == caller.id {
                "You are not enrolled in this course"
            } else {
                "Student is not enrolled in this course"
            }));
        }

        self.users()
            .update_one(
                doc! { "_id": target },
                doc! { "$pull": { "enrolledCourses": { "courseId": course_id } } },
            )
            .await
            .context("Failed to remove enrollment from user")?;

        ENROLLMENTS_TOTAL.with_label_values(&["unenroll"]).inc();
        tracing::info!(course_id = %course_id, student_id = %target, by = %caller.id, "Student unenrolled");
        Ok(())
    }

    pub async fn toggle_publish(&self, caller: &AuthUser, id: &str) -> ApiResult<PublishResponse> {
        let id = parse_object_id(id, "course id")?;
        let course = self.find(&id).await?;
        caller.require_owner_or_admin(&course.instructor)?;

        let now = Utc::now();
        let publish = !course.is_published;
        let mut first_publish = false;

        if publish && course.published_date.is_none() {
            // only one caller can stamp publishedDate
            let stamped = self
                .courses()
                .update_one(
                    doc! { "_id": id, "publishedDate": Bson::Null },
                    doc! { "$set": {
                        "isPublished": true,
                        "publishedDate": to_bson(&now),
                        "updatedAt": to_bson(&now),
                    } },
                )
                .await
                .context("Failed to publish course")?;
            first_publish = stamped.modified_count == 1;
        }

        if !first_publish {
            self.courses()
                .update_one(
                    doc! { "_id": id },
                    doc! { "$set": { "isPublished": publish, "updatedAt": to_bson(&now) } },
                )
                .await
                .context("Failed to update course publication")?;
        }

        if first_publish {
            let publisher = self.load_user(&caller.id).await?;
            self.notifications()
                .notify_role(
                    UserRole::Student,
                    notification_service::course_published(&publisher, &course),
                )
                .await;
        }

        Ok(PublishResponse {
            message: format!(
                "Course {} successfully",
                if publish { "published" } else { "unpublished" }
            ),
            is_published: publish,
        })
    }

    pub async fn update_progress(
        &self,
        caller: &AuthUser,
        id: &str,
        req: ProgressRequest,
    ) -> ApiResult<ProgressResponse> {
        let course_id = parse_object_id(id, "course id")?;

        let mut update = doc! {
            "$set": {
                "enrolledStudents.$.progress": req.progress,
                "updatedAt": to_bson(&Utc::now()),
            }
        };
        if let Some(lesson) = req.completed_lesson.as_deref() {
            update.insert(
                "$addToSet",
                doc! { "enrolledStudents.$.completedLessons": lesson.trim() },
            );
        }

        let updated = self
            .courses()
            .find_one_and_update(
                doc! { "_id": course_id, "enrolledStudents.student": caller.id },
                update,
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to update progress")?;

        let Some(course) = updated else {
            // distinguish a missing course from a missing enrollment
            self.find(&course_id).await?;
            return Err(ApiError::forbidden("You are not enrolled in this course"));
        };

        self.users()
            .update_one(
                doc! { "_id": caller.id, "enrolledCourses.courseId": course_id },
                doc! { "$set": { "enrolledCourses.$.progress": req.progress } },
            )
            .await
            .context("Failed to mirror progress on user")?;

        let completed_lessons = course
            .enrolled_students
            .into_iter()
            .find(|e| e.student == caller.id)
            .map(|e| e.completed_lessons)
            .unwrap_or_default();

        Ok(ProgressResponse {
            message: "Progress updated successfully".to_string(),
            progress: req.progress,
            completed_lessons,
        })
    }

    /// Drops a deleted user from every course roster
    pub async fn remove_student_everywhere(&self, student: &ObjectId) -> anyhow::Result<u64> {
        let result = self
            .courses()
            .update_many(
                doc! { "enrolledStudents.student": student },
                doc! { "$pull": { "enrolledStudents": { "student": student } } },
            )
            .await
            .context("Failed to remove student from courses")?;
        Ok(result.modified_count)
    }
}
