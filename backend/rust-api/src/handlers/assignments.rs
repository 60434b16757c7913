use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiResult,
    extractors::{AppQuery, ValidatedJson, ValidatedOptionalJson},
    middlewares::auth::AuthUser,
    models::assignment::{
        AssignmentMessageResponse, CreateAssignmentRequest, GradeRequest, ListAssignmentsQuery,
        SubmitRequest, UpdateAssignmentRequest,
    },
    services::{assignment_service::AssignmentService, AppState},
};

/// GET /api/assignments
pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    AppQuery(query): AppQuery<ListAssignmentsQuery>,
) -> ApiResult<impl IntoResponse> {
    let assignments = AssignmentService::new(state.mongo.clone())
        .list(&caller, query)
        .await?;
    Ok(Json(assignments))
}

pub async fn get_assignment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let assignment = AssignmentService::new(state.mongo.clone())
        .get(&caller, &id)
        .await?;
    Ok(Json(assignment))
}

pub async fn create_assignment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateAssignmentRequest>,
) -> ApiResult<impl IntoResponse> {
    let assignment = AssignmentService::new(state.mongo.clone())
        .create(&caller, req)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AssignmentMessageResponse {
            message: "Assignment created successfully".to_string(),
            assignment,
        }),
    ))
}

pub async fn update_assignment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateAssignmentRequest>,
) -> ApiResult<impl IntoResponse> {
    let assignment = AssignmentService::new(state.mongo.clone())
        .update(&caller, &id, req)
        .await?;
    Ok(Json(AssignmentMessageResponse {
        message: "Assignment updated successfully".to_string(),
        assignment,
    }))
}

pub async fn delete_assignment(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    AssignmentService::new(state.mongo.clone())
        .delete(&caller, &id)
        .await?;
    Ok(Json(json!({ "message": "Assignment deleted successfully" })))
}

pub async fn toggle_publish(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let response = AssignmentService::new(state.mongo.clone())
        .toggle_publish(&caller, &id)
        .await?;
    Ok(Json(response))
}

/// POST /api/assignments/{id}/submit (student)
pub async fn submit(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    ValidatedOptionalJson(req): ValidatedOptionalJson<SubmitRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = AssignmentService::new(state.mongo.clone())
        .submit(&caller, &id, req)
        .await?;
    Ok(Json(response))
}

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let submissions = AssignmentService::new(state.mongo.clone())
        .submissions(&caller, &id)
        .await?;
    Ok(Json(submissions))
}

/// POST /api/assignments/{id}/grade/{submission_id}
/// and PUT /api/assignments/{id}/submissions/{submission_id}/grade
pub async fn grade_submission(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path((id, submission_id)): Path<(String, String)>,
    ValidatedJson(req): ValidatedJson<GradeRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = AssignmentService::new(state.mongo.clone())
        .grade(&caller, &id, &submission_id, req)
        .await?;
    Ok(Json(response))
}
