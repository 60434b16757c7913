use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::{Validate, ValidationError};

use super::datetime::{
    bson_datetime_as_chrono, bson_datetime_as_chrono_option, flexible, flexible_option, to_bson,
};
use super::user::{UserLookup, UserRef};
use super::validation::{not_blank, object_id};

/// Assignment model stored in MongoDB "assignments" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    pub instructions: String,
    pub course: ObjectId,
    pub instructor: ObjectId,
    #[serde(rename = "type")]
    pub kind: AssignmentType,
    pub max_points: i32,
    #[serde(with = "bson_datetime_as_chrono")]
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub quiz_questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub settings: AssignmentSettings,
    #[serde(default)]
    pub is_published: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub publish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_owned_by(&self, user_id: &ObjectId) -> bool {
        &self.instructor == user_id
    }

    pub fn submission_by(&self, student: &ObjectId) -> Option<&Submission> {
        self.submissions.iter().find(|s| &s.student == student)
    }

    pub fn submission(&self, submission_id: &ObjectId) -> Option<&Submission> {
        self.submissions.iter().find(|s| &s.id == submission_id)
    }

    pub fn is_late_at(&self, at: DateTime<Utc>) -> bool {
        at > self.due_date
    }

    /// Attempt number the student's next submission would carry,
    /// `None` once `settings.maxAttempts` is used up.
    pub fn next_attempt(&self, student: &ObjectId) -> Option<i32> {
        match self.submission_by(student) {
            None => Some(1),
            Some(previous) if previous.attempt >= self.settings.max_attempts => None,
            Some(previous) => Some(previous.attempt + 1),
        }
    }

    pub fn check_grade_points(&self, points: f64) -> Result<(), String> {
        if !points.is_finite() || points < 0.0 {
            return Err("Points must be 0 or greater".to_string());
        }
        if points > f64::from(self.max_points) {
            return Err(format!(
                "Points cannot exceed maximum of {}",
                self.max_points
            ));
        }
        Ok(())
    }

    /// Auto-scores quiz answers; `None` for non-quiz assignments
    pub fn score_quiz(&self, answers: &[Option<i32>]) -> Option<QuizScore> {
        if self.kind != AssignmentType::Quiz || self.quiz_questions.is_empty() {
            return None;
        }
        let total = self.quiz_questions.len() as i32;
        let correct = self
            .quiz_questions
            .iter()
            .zip(answers.iter())
            .filter(|(question, answer)| **answer == Some(question.correct_answer))
            .count() as i32;
        let raw = f64::from(correct) / f64::from(total) * f64::from(self.max_points);
        Some(QuizScore {
            correct,
            total,
            points: (raw * 100.0).round() / 100.0,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentType {
    Quiz,
    Project,
    Essay,
    Presentation,
    Other,
}

impl AssignmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentType::Quiz => "quiz",
            AssignmentType::Project => "project",
            AssignmentType::Essay => "essay",
            AssignmentType::Presentation => "presentation",
            AssignmentType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[validate(custom(function = "not_blank", message = "Attachment filename is required"))]
    pub filename: String,
    #[validate(custom(function = "not_blank", message = "Attachment url is required"))]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "answer_in_range", skip_on_field_errors = false))]
pub struct QuizQuestion {
    #[validate(custom(function = "not_blank", message = "Question text is required"))]
    pub question: String,
    #[validate(length(min = 2, message = "Each question needs at least 2 options"))]
    pub options: Vec<String>,
    pub correct_answer: i32,
}

fn answer_in_range(question: &QuizQuestion) -> Result<(), ValidationError> {
    let in_range = usize::try_from(question.correct_answer)
        .map(|index| index < question.options.len())
        .unwrap_or(false);
    if in_range {
        Ok(())
    } else {
        let mut err = ValidationError::new("correct_answer");
        err.message = Some("Correct answer must reference one of the options".into());
        Err(err)
    }
}

fn default_max_attempts() -> i32 {
    1
}

fn default_allow_late() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSettings {
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, message = "Max attempts must be at least 1"))]
    pub max_attempts: i32,
    #[serde(default = "default_allow_late")]
    pub allow_late_submission: bool,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            allow_late_submission: default_allow_late(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student: ObjectId,
    #[serde(with = "bson_datetime_as_chrono")]
    pub submission_date: DateTime<Utc>,
    #[serde(default = "default_max_attempts")]
    pub attempt: i32,
    #[serde(default)]
    pub content: SubmissionContent,
    #[serde(default)]
    pub is_late: bool,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<QuizScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub answers: Vec<Option<i32>>,
    #[serde(default)]
    #[validate(nested)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Submitted,
    Graded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QuizScore {
    pub correct: i32,
    pub total: i32,
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub points: f64,
    #[serde(default)]
    pub feedback: String,
    pub graded_by: ObjectId,
    #[serde(with = "bson_datetime_as_chrono")]
    pub graded_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "quiz_has_questions"))]
pub struct CreateAssignmentRequest {
    #[validate(custom(function = "not_blank", message = "Assignment title is required"))]
    pub title: String,

    #[validate(custom(function = "not_blank", message = "Assignment description is required"))]
    pub description: String,

    #[validate(custom(function = "not_blank", message = "Instructions are required"))]
    pub instructions: String,

    #[validate(custom(function = "object_id", message = "Valid course ID is required"))]
    pub course: String,

    #[serde(rename = "type")]
    pub kind: AssignmentType,

    #[validate(range(min = 1, message = "Max points must be at least 1"))]
    pub max_points: i32,

    #[serde(deserialize_with = "flexible::deserialize")]
    pub due_date: DateTime<Utc>,

    #[serde(default)]
    #[validate(nested)]
    pub attachments: Vec<Attachment>,

    #[serde(default)]
    #[validate(nested)]
    pub quiz_questions: Vec<QuizQuestion>,

    #[serde(default)]
    #[validate(nested)]
    pub settings: AssignmentSettings,

    #[serde(default)]
    pub is_published: bool,
}

fn quiz_has_questions(req: &CreateAssignmentRequest) -> Result<(), ValidationError> {
    check_quiz_questions(req.kind, &req.quiz_questions)
}

pub fn check_quiz_questions(
    kind: AssignmentType,
    questions: &[QuizQuestion],
) -> Result<(), ValidationError> {
    if kind == AssignmentType::Quiz && questions.is_empty() {
        let mut err = ValidationError::new("quiz_questions");
        err.message = Some("Quiz assignments need at least one question".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssignmentRequest {
    #[validate(custom(function = "not_blank", message = "Assignment title cannot be empty"))]
    pub title: Option<String>,

    #[validate(custom(function = "not_blank", message = "Assignment description cannot be empty"))]
    pub description: Option<String>,

    #[validate(custom(function = "not_blank", message = "Instructions cannot be empty"))]
    pub instructions: Option<String>,

    #[serde(rename = "type")]
    pub kind: Option<AssignmentType>,

    #[validate(range(min = 1, message = "Max points must be at least 1"))]
    pub max_points: Option<i32>,

    #[serde(default, deserialize_with = "flexible_option::deserialize")]
    pub due_date: Option<DateTime<Utc>>,

    #[validate(nested)]
    pub attachments: Option<Vec<Attachment>>,

    #[validate(nested)]
    pub quiz_questions: Option<Vec<QuizQuestion>>,

    #[validate(nested)]
    pub settings: Option<AssignmentSettings>,
}

impl UpdateAssignmentRequest {
    pub fn set_document(&self) -> Result<Document, bson::ser::Error> {
        let mut set = Document::new();
        if let Some(title) = &self.title {
            set.insert("title", title.trim());
        }
        if let Some(description) = &self.description {
            set.insert("description", description.as_str());
        }
        if let Some(instructions) = &self.instructions {
            set.insert("instructions", instructions.as_str());
        }
        if let Some(kind) = &self.kind {
            set.insert("type", bson::to_bson(kind)?);
        }
        if let Some(max_points) = self.max_points {
            set.insert("maxPoints", max_points);
        }
        if let Some(due_date) = &self.due_date {
            set.insert("dueDate", to_bson(due_date));
        }
        if let Some(attachments) = &self.attachments {
            set.insert("attachments", bson::to_bson(attachments)?);
        }
        if let Some(questions) = &self.quiz_questions {
            set.insert("quizQuestions", bson::to_bson(questions)?);
        }
        if let Some(settings) = &self.settings {
            set.insert("settings", bson::to_bson(settings)?);
        }
        Ok(set)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubmitRequest {
    #[serde(default)]
    #[validate(nested)]
    pub content: SubmissionContent,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GradeRequest {
    #[serde(alias = "grade")]
    #[validate(range(min = 0.0, message = "Points must be 0 or greater"))]
    pub points: f64,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAssignmentsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub course_id: Option<String>,
    pub due_date: Option<String>,
}

/// Reference to a titled document (course, assignment), populated when found
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TitledRef {
    Populated { id: String, title: String },
    Id(String),
}

pub type TitleLookup = HashMap<ObjectId, String>;

impl TitledRef {
    pub fn resolve(id: &ObjectId, titles: &TitleLookup) -> Self {
        match titles.get(id) {
            Some(title) => TitledRef::Populated {
                id: id.to_hex(),
                title: title.clone(),
            },
            None => TitledRef::Id(id.to_hex()),
        }
    }
}

/// Who an assignment is being rendered for
#[derive(Debug, Clone, Copy)]
pub enum Audience {
    /// Owner or admin: everything
    Staff,
    /// A student: only their own submission, no answer key
    Student(ObjectId),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestionView {
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeView {
    pub points: f64,
    pub feedback: String,
    pub graded_by: UserRef,
    pub graded_date: DateTime<Utc>,
}

impl GradeView {
    pub fn build(grade: Grade, users: &UserLookup) -> Self {
        GradeView {
            points: grade.points,
            feedback: grade.feedback,
            graded_by: UserRef::resolve(&grade.graded_by, users),
            graded_date: grade.graded_date,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub id: String,
    pub student: UserRef,
    pub submission_date: DateTime<Utc>,
    pub attempt: i32,
    pub content: SubmissionContent,
    pub is_late: bool,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<QuizScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<GradeView>,
}

impl SubmissionView {
    pub fn build(submission: Submission, users: &UserLookup) -> Self {
        SubmissionView {
            id: submission.id.to_hex(),
            student: UserRef::resolve(&submission.student, users),
            submission_date: submission.submission_date,
            attempt: submission.attempt,
            content: submission.content,
            is_late: submission.is_late,
            status: submission.status,
            quiz_score: submission.quiz_score,
            grade: submission.grade.map(|g| GradeView::build(g, users)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub instructions: String,
    pub course: TitledRef,
    pub instructor: UserRef,
    #[serde(rename = "type")]
    pub kind: AssignmentType,
    pub max_points: i32,
    pub due_date: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    pub quiz_questions: Vec<QuizQuestionView>,
    pub settings: AssignmentSettings,
    pub is_published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
    pub submissions: Vec<SubmissionView>,
    pub submission_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentResponse {
    pub fn build(
        assignment: Assignment,
        courses: &TitleLookup,
        users: &UserLookup,
        audience: Audience,
    ) -> Self {
        let (submissions, show_answers) = match audience {
            Audience::Staff => (assignment.submissions, true),
            Audience::Student(student) => (
                assignment
                    .submissions
                    .into_iter()
                    .filter(|s| s.student == student)
                    .collect(),
                false,
            ),
        };
        let quiz_questions = assignment
            .quiz_questions
            .into_iter()
            .map(|q| QuizQuestionView {
                question: q.question,
                options: q.options,
                correct_answer: show_answers.then_some(q.correct_answer),
            })
            .collect();

        AssignmentResponse {
            id: assignment.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: assignment.title,
            description: assignment.description,
            instructions: assignment.instructions,
            course: TitledRef::resolve(&assignment.course, courses),
            instructor: UserRef::resolve(&assignment.instructor, users),
            kind: assignment.kind,
            max_points: assignment.max_points,
            due_date: assignment.due_date,
            attachments: assignment.attachments,
            quiz_questions,
            settings: assignment.settings,
            is_published: assignment.is_published,
            publish_date: assignment.publish_date,
            submission_count: submissions.len(),
            submissions: submissions
                .into_iter()
                .map(|s| SubmissionView::build(s, users))
                .collect(),
            created_at: assignment.created_at,
            updated_at: assignment.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentListResponse {
    pub assignments: Vec<AssignmentResponse>,
    pub total_pages: u64,
    pub current_page: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct AssignmentMessageResponse {
    pub message: String,
    pub assignment: AssignmentResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub message: String,
    pub is_late: bool,
    pub attempt: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<QuizScore>,
}

#[derive(Debug, Serialize)]
pub struct GradeResponse {
    pub message: String,
    pub grade: GradeView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionListResponse {
    pub assignment_id: String,
    pub title: String,
    pub max_points: i32,
    pub submissions: Vec<SubmissionView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn quiz() -> Assignment {
        let now = Utc::now();
        Assignment {
            id: Some(ObjectId::new()),
            title: "Quiz 1".into(),
            description: "d".into(),
            instructions: "i".into(),
            course: ObjectId::new(),
            instructor: ObjectId::new(),
            kind: AssignmentType::Quiz,
            max_points: 10,
            due_date: now + Duration::days(1),
            attachments: vec![],
            quiz_questions: vec![
                QuizQuestion {
                    question: "1+1".into(),
                    options: vec!["1".into(), "2".into()],
                    correct_answer: 1,
                },
                QuizQuestion {
                    question: "2+2".into(),
                    options: vec!["4".into(), "5".into()],
                    correct_answer: 0,
                },
                QuizQuestion {
                    question: "3+3".into(),
                    options: vec!["6".into(), "7".into()],
                    correct_answer: 0,
                },
            ],
            settings: AssignmentSettings::default(),
            is_published: true,
            publish_date: Some(now),
            submissions: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn submission(student: ObjectId, attempt: i32) -> Submission {
        Submission {
            id: ObjectId::new(),
            student,
            submission_date: Utc::now(),
            attempt,
            content: SubmissionContent::default(),
            is_late: false,
            status: SubmissionStatus::Submitted,
            quiz_score: None,
            grade: None,
        }
    }

    #[test]
    fn test_quiz_scoring() {
        let assignment = quiz();
        let score = assignment
            .score_quiz(&[Some(1), Some(1), None])
            .unwrap();
        assert_eq!(score.correct, 1);
        assert_eq!(score.total, 3);
        assert_eq!(score.points, 3.33);

        let perfect = assignment.score_quiz(&[Some(1), Some(0), Some(0)]).unwrap();
        assert_eq!(perfect.points, 10.0);
    }

    #[test]
    fn test_non_quiz_is_not_scored() {
        let mut assignment = quiz();
        assignment.kind = AssignmentType::Essay;
        assert!(assignment.score_quiz(&[Some(1)]).is_none());
    }

    #[test]
    fn test_attempt_limits() {
        let student = ObjectId::new();
        let mut assignment = quiz();
        assert_eq!(assignment.next_attempt(&student), Some(1));

        assignment.submissions.push(submission(student, 1));
        assert_eq!(assignment.next_attempt(&student), None);

        assignment.settings.max_attempts = 3;
        assert_eq!(assignment.next_attempt(&student), Some(2));
        assert_eq!(assignment.next_attempt(&ObjectId::new()), Some(1));
    }

    #[test]
    fn test_grade_bounds() {
        let assignment = quiz();
        assert!(assignment.check_grade_points(0.0).is_ok());
        assert!(assignment.check_grade_points(10.0).is_ok());
        assert_eq!(
            assignment.check_grade_points(10.5).unwrap_err(),
            "Points cannot exceed maximum of 10"
        );
        assert!(assignment.check_grade_points(-1.0).is_err());
        assert!(assignment.check_grade_points(f64::NAN).is_err());
    }

    #[test]
    fn test_lateness() {
        let assignment = quiz();
        assert!(!assignment.is_late_at(Utc::now()));
        assert!(assignment.is_late_at(assignment.due_date + Duration::seconds(1)));
    }

    #[test]
    fn test_quiz_request_validation() {
        let req: CreateAssignmentRequest = serde_json::from_value(json!({
            "title": "Q",
            "description": "d",
            "instructions": "i",
            "course": "507f1f77bcf86cd799439011",
            "type": "quiz",
            "maxPoints": 5,
            "dueDate": "2030-01-01T00:00"
        }))
        .unwrap();
        let errors = crate::error::flatten_validation_errors(&req.validate().unwrap_err());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Quiz assignments need at least one question");

        let bad_question: CreateAssignmentRequest = serde_json::from_value(json!({
            "title": "Q",
            "description": "d",
            "instructions": "i",
            "course": "nope",
            "type": "quiz",
            "maxPoints": 5,
            "dueDate": "2030-01-01",
            "quizQuestions": [{ "question": "x", "options": ["a"], "correctAnswer": 3 }]
        }))
        .unwrap();
        let errors =
            crate::error::flatten_validation_errors(&bad_question.validate().unwrap_err());
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.contains(&"Valid course ID is required"));
        assert!(messages.contains(&"Each question needs at least 2 options"));
        assert!(messages.contains(&"Correct answer must reference one of the options"));
    }

    #[test]
    fn test_grade_request_accepts_grade_alias() {
        let req: GradeRequest =
            serde_json::from_value(json!({ "grade": 7, "feedback": "ok" })).unwrap();
        assert_eq!(req.points, 7.0);
        let negative: GradeRequest = serde_json::from_value(json!({ "points": -2 })).unwrap();
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_student_audience_hides_answers_and_other_submissions() {
        let me = ObjectId::new();
        let mut assignment = quiz();
        assignment.submissions.push(submission(me, 1));
        assignment.submissions.push(submission(ObjectId::new(), 1));

        let view = AssignmentResponse::build(
            assignment.clone(),
            &TitleLookup::new(),
            &UserLookup::new(),
            Audience::Student(me),
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["submissions"].as_array().unwrap().len(), 1);
        assert_eq!(json["submissions"][0]["student"], json!(me.to_hex()));
        assert!(json["quizQuestions"][0].get("correctAnswer").is_none());

        let staff = AssignmentResponse::build(
            assignment,
            &TitleLookup::new(),
            &UserLookup::new(),
            Audience::Staff,
        );
        assert_eq!(staff.submissions.len(), 2);
        assert_eq!(staff.quiz_questions[0].correct_answer, Some(1));
    }

    #[test]
    fn test_settings_defaults() {
        let settings: AssignmentSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, AssignmentSettings::default());
        assert_eq!(settings.max_attempts, 1);
        assert!(settings.allow_late_submission);
    }
}
