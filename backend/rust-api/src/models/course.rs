use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::datetime::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};
use super::user::{UserLookup, UserRef};
use super::validation::{not_blank, object_id};

/// Course model stored in MongoDB "courses" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    pub instructor: ObjectId,
    pub category: CourseCategory,
    pub level: CourseLevel,
    pub duration: CourseDuration,
    pub max_students: i32,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enrolled_students: Vec<CourseEnrollment>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_owned_by(&self, user_id: &ObjectId) -> bool {
        &self.instructor == user_id
    }

    pub fn has_student(&self, student_id: &ObjectId) -> bool {
        self.enrolled_students
            .iter()
            .any(|e| &e.student == student_id)
    }

    pub fn is_full(&self) -> bool {
        self.enrolled_students.len() as i64 >= i64::from(self.max_students)
    }

    pub fn student_ids(&self) -> Vec<ObjectId> {
        self.enrolled_students.iter().map(|e| e.student).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEnrollment {
    pub student: ObjectId,
    #[serde(with = "bson_datetime_as_chrono")]
    pub enrollment_date: DateTime<Utc>,
    #[serde(default)]
    pub progress: i32,
    #[serde(default)]
    pub completed_lessons: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourseCategory {
    Programming,
    Design,
    Business,
    Marketing,
    #[serde(rename = "Data Science")]
    DataScience,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseDuration {
    #[validate(range(min = 1, message = "Duration in weeks must be at least 1"))]
    pub weeks: i32,
    #[validate(range(min = 1, message = "Hours per week must be at least 1"))]
    pub hours_per_week: i32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    #[validate(custom(function = "not_blank", message = "Course title is required"))]
    pub title: String,

    #[validate(custom(function = "not_blank", message = "Course description is required"))]
    pub description: String,

    pub category: CourseCategory,

    pub level: CourseLevel,

    #[validate(nested)]
    pub duration: CourseDuration,

    #[validate(range(min = 1, message = "Max students must be at least 1"))]
    pub max_students: i32,

    #[validate(range(min = 0.0, message = "Price must be 0 or greater"))]
    #[serde(default)]
    pub price: f64,

    #[serde(default)]
    pub tags: Vec<String>,

    pub thumbnail: Option<String>,

    /// Only honoured when an admin creates the course
    #[validate(custom(function = "object_id", message = "Invalid instructor id"))]
    pub instructor: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseRequest {
    #[validate(custom(function = "not_blank", message = "Course title cannot be empty"))]
    pub title: Option<String>,

    #[validate(custom(function = "not_blank", message = "Course description cannot be empty"))]
    pub description: Option<String>,

    pub category: Option<CourseCategory>,

    pub level: Option<CourseLevel>,

    #[validate(nested)]
    pub duration: Option<CourseDuration>,

    #[validate(range(min = 1, message = "Max students must be at least 1"))]
    pub max_students: Option<i32>,

    #[validate(range(min = 0.0, message = "Price must be 0 or greater"))]
    pub price: Option<f64>,

    pub tags: Option<Vec<String>>,

    pub thumbnail: Option<String>,

    /// Reassignment, admins only
    #[validate(custom(function = "object_id", message = "Invalid instructor id"))]
    pub instructor: Option<String>,
}

impl UpdateCourseRequest {
    /// `$set` body for the editable fields present in the request.
    /// `instructor` is applied separately after the role check.
    pub fn set_document(&self) -> Result<Document, bson::ser::Error> {
        let mut set = Document::new();
        if let Some(title) = &self.title {
            set.insert("title", title.trim());
        }
        if let Some(description) = &self.description {
            set.insert("description", description.as_str());
        }
        if let Some(category) = &self.category {
            set.insert("category", bson::to_bson(category)?);
        }
        if let Some(level) = &self.level {
            set.insert("level", bson::to_bson(level)?);
        }
        if let Some(duration) = &self.duration {
            set.insert("duration", bson::to_bson(duration)?);
        }
        if let Some(max_students) = self.max_students {
            set.insert("maxStudents", max_students);
        }
        if let Some(price) = self.price {
            set.insert("price", price);
        }
        if let Some(tags) = &self.tags {
            set.insert("tags", tags.clone());
        }
        if let Some(thumbnail) = &self.thumbnail {
            set.insert("thumbnail", thumbnail.as_str());
        }
        Ok(set)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCoursesQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub published: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnenrollRequest {
    pub student_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress: i32,

    #[validate(custom(function = "not_blank", message = "Lesson id cannot be empty"))]
    pub completed_lesson: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEnrollmentView {
    pub student: UserRef,
    pub enrollment_date: DateTime<Utc>,
    pub progress: i32,
    pub completed_lessons: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub instructor: UserRef,
    pub category: CourseCategory,
    pub level: CourseLevel,
    pub duration: CourseDuration,
    pub max_students: i32,
    pub price: f64,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub is_published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    pub enrolled_students: Vec<CourseEnrollmentView>,
    pub enrolled_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseResponse {
    pub fn build(course: Course, users: &UserLookup) -> Self {
        let enrolled_students: Vec<CourseEnrollmentView> = course
            .enrolled_students
            .into_iter()
            .map(|e| CourseEnrollmentView {
                student: UserRef::resolve(&e.student, users),
                enrollment_date: e.enrollment_date,
                progress: e.progress,
                completed_lessons: e.completed_lessons,
            })
            .collect();

        CourseResponse {
            id: course.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: course.title,
            description: course.description,
            instructor: UserRef::resolve(&course.instructor, users),
            category: course.category,
            level: course.level,
            duration: course.duration,
            max_students: course.max_students,
            price: course.price,
            tags: course.tags,
            thumbnail: course.thumbnail,
            is_published: course.is_published,
            published_date: course.published_date,
            enrolled_count: enrolled_students.len(),
            enrolled_students,
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseListResponse {
    pub courses: Vec<CourseResponse>,
    pub total_pages: u64,
    pub current_page: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct CourseMessageResponse {
    pub message: String,
    pub course: CourseResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub message: String,
    pub is_published: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub message: String,
    pub progress: i32,
    pub completed_lessons: Vec<String>,
}

/// Filter that only matches a published course with a free seat that `student` is not on
pub fn enroll_filter(course_id: ObjectId, student: ObjectId) -> Document {
    doc! {
        "_id": course_id,
        "enrolledStudents.student": { "$ne": student },
        "isPublished": true,
        "$expr": {
            "$lt": [ { "$size": { "$ifNull": ["$enrolledStudents", []] } }, "$maxStudents" ]
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_course(max_students: i32) -> Course {
        let now = Utc::now();
        Course {
            id: Some(ObjectId::new()),
            title: "Rust".into(),
            description: "Systems".into(),
            instructor: ObjectId::new(),
            category: CourseCategory::Programming,
            level: CourseLevel::Beginner,
            duration: CourseDuration {
                weeks: 4,
                hours_per_week: 3,
            },
            max_students,
            price: 0.0,
            tags: vec![],
            thumbnail: None,
            is_published: true,
            published_date: None,
            enrolled_students: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_category_wire_names() {
        assert_eq!(
            serde_json::to_value(CourseCategory::DataScience).unwrap(),
            json!("Data Science")
        );
        assert!(serde_json::from_value::<CourseCategory>(json!("Cooking")).is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let req: CreateCourseRequest = serde_json::from_value(json!({
            "title": " ",
            "description": "d",
            "category": "Design",
            "level": "Advanced",
            "duration": { "weeks": 0, "hoursPerWeek": 2 },
            "maxStudents": 0,
            "price": -1.0
        }))
        .unwrap();
        let errors = crate::error::flatten_validation_errors(&req.validate().unwrap_err());
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.contains(&"Course title is required"));
        assert!(messages.contains(&"Duration in weeks must be at least 1"));
        assert!(messages.contains(&"Max students must be at least 1"));
        assert!(messages.contains(&"Price must be 0 or greater"));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_capacity_and_membership() {
        let mut course = sample_course(1);
        let student = ObjectId::new();
        assert!(!course.is_full());
        course.enrolled_students.push(CourseEnrollment {
            student,
            enrollment_date: Utc::now(),
            progress: 0,
            completed_lessons: vec![],
        });
        assert!(course.is_full());
        assert!(course.has_student(&student));
        assert!(!course.has_student(&ObjectId::new()));
    }

    #[test]
    fn test_update_set_document_skips_protected_fields() {
        let req: UpdateCourseRequest = serde_json::from_value(json!({
            "title": "  New title ",
            "price": 10.5,
            "instructor": "507f1f77bcf86cd799439011",
            "enrolledStudents": [],
            "_id": "507f1f77bcf86cd799439011"
        }))
        .unwrap();
        let set = req.set_document().unwrap();
        assert_eq!(set.get_str("title").unwrap(), "New title");
        assert_eq!(set.get_f64("price").unwrap(), 10.5);
        assert!(!set.contains_key("instructor"));
        assert!(!set.contains_key("enrolledStudents"));
        assert!(!set.contains_key("_id"));
    }

    #[test]
    fn test_response_counts_and_populates() {
        let mut course = sample_course(10);
        let student = ObjectId::new();
        course.enrolled_students.push(CourseEnrollment {
            student,
            enrollment_date: Utc::now(),
            progress: 40,
            completed_lessons: vec!["intro".into()],
        });
        let response = CourseResponse::build(course, &UserLookup::new());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["enrolledCount"], 1);
        assert_eq!(json["enrolledStudents"][0]["student"], json!(student.to_hex()));
        assert!(json.get("_id").is_none());
    }

    #[test]
    fn test_enroll_filter_guards_duplicates_capacity_and_publication() {
        let course_id = ObjectId::new();
        let student = ObjectId::new();
        let filter = enroll_filter(course_id, student);

        assert_eq!(filter.get_object_id("_id").unwrap(), course_id);
        assert_eq!(
            filter.get_document("enrolledStudents.student").unwrap(),
            &doc! { "$ne": student }
        );
        assert!(filter.get_bool("isPublished").unwrap());
        assert_eq!(
            filter.get_document("$expr").unwrap(),
            &doc! {
                "$lt": [ { "$size": { "$ifNull": ["$enrolledStudents", []] } }, "$maxStudents" ]
            }
        );
    }
}
