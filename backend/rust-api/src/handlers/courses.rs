use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    extractors::{AppQuery, OptionalJson, ValidatedJson},
    middlewares::auth::{AuthUser, MaybeAuthUser},
    models::course::{
        CourseMessageResponse, CreateCourseRequest, ListCoursesQuery, ProgressRequest,
        UnenrollRequest, UpdateCourseRequest,
    },
    models::user::UserRole,
    services::{course_service::CourseService, lookup, AppState},
};

/// GET /api/courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    AppQuery(query): AppQuery<ListCoursesQuery>,
) -> ApiResult<impl IntoResponse> {
    let courses = CourseService::new(state.mongo.clone())
        .list(caller.as_ref(), query)
        .await?;
    Ok(Json(courses))
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(CourseService::new(state.mongo.clone()).get(&id).await?))
}

/// GET /api/courses/instructor/{instructor_id}
pub async fn instructor_courses(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(caller): MaybeAuthUser,
    Path(instructor_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let courses = CourseService::new(state.mongo.clone())
        .by_instructor(caller.as_ref(), &instructor_id)
        .await?;
    Ok(Json(courses))
}

pub async fn create_course(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateCourseRequest>,
) -> ApiResult<impl IntoResponse> {
    let course = CourseService::new(state.mongo.clone())
        .create(&caller, req)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CourseMessageResponse {
            message: "Course created successfully".to_string(),
            course,
        }),
    ))
}

pub async fn update_course(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateCourseRequest>,
) -> ApiResult<impl IntoResponse> {
    let course = CourseService::new(state.mongo.clone())
        .update(&caller, &id, req)
        .await?;
    Ok(Json(CourseMessageResponse {
        message: "Course updated successfully".to_string(),
        course,
    }))
}

pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    CourseService::new(state.mongo.clone())
        .delete(&caller, &id)
        .await?;
    Ok(Json(json!({ "message": "Course deleted successfully" })))
}

/// POST /api/courses/{id}/enroll (student)
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    caller.require_role(&[UserRole::Student])?;
    let student = lookup::find_user(&state.mongo, &caller.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    CourseService::new(state.mongo.clone())
        .enroll(&student, &id, true)
        .await?;
    Ok(Json(json!({ "message": "Successfully enrolled in course" })))
}

pub async fn unenroll(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    OptionalJson(req): OptionalJson<UnenrollRequest>,
) -> ApiResult<impl IntoResponse> {
    CourseService::new(state.mongo.clone())
        .unenroll(&caller, &id, req)
        .await?;
    Ok(Json(json!({ "message": "Successfully unenrolled from course" })))
}

pub async fn toggle_publish(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let response = CourseService::new(state.mongo.clone())
        .toggle_publish(&caller, &id)
        .await?;
    Ok(Json(response))
}

/// PUT /api/courses/{id}/progress (enrolled student)
pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<ProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = CourseService::new(state.mongo.clone())
        .update_progress(&caller, &id, req)
        .await?;
    Ok(Json(response))
}
